//! Flat append log for note-taking mode
//!
//! One line per dictated sentence: `[YYYY-MM-DD HH:MM:SS] - Text`.

use anyhow::{Context, Result};
use chrono::Local;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Append-only notes file
#[derive(Debug, Clone)]
pub struct NoteLog {
    path: PathBuf,
}

impl NoteLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped line
    pub fn append(&self, text: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create notes directory")?;
        }

        let line = format!(
            "[{}] - {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            capitalize(text.trim())
        );

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .context("Failed to append note")?;

        debug!("Appended note to {}", self.path.display());
        Ok(())
    }

    /// Whole notes file, empty if none was written yet
    pub fn read_all(&self) -> Result<String> {
        if !self.path.exists() {
            return Ok(String::new());
        }
        std::fs::read_to_string(&self.path).context("Failed to read notes")
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_format() {
        let dir = tempdir().unwrap();
        let log = NoteLog::new(dir.path().join("nested").join("notes.txt"));

        log.append("buy milk").unwrap();
        log.append("  ñandú feathers").unwrap();

        let contents = log.read_all().unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] - Buy milk"));
        assert!(lines[1].ends_with("] - Ñandú feathers"));
    }
}
