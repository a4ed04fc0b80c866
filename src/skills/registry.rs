//! Registry of learned skills
//!
//! A learned skill is a task phrase mapped to a Rhai script on disk. The whole
//! mapping lives in `skills.json` next to the scripts and is rewritten in full
//! on every change, under a single writer lock.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::lang;

/// Name of the mapping file inside the skills directory
pub const REGISTRY_FILE: &str = "skills.json";

/// A registered skill
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnedSkill {
    /// Normalized task phrase
    pub key: String,
    pub script_path: PathBuf,
}

/// Task phrase → script file name, persisted as JSON
///
/// Iteration (and therefore matching) order is the keys' lexical order.
#[derive(Debug, Clone)]
pub struct SkillRegistry {
    skills: Arc<Mutex<BTreeMap<String, String>>>,
    skills_dir: PathBuf,
}

impl SkillRegistry {
    /// Empty registry rooted at `dir`, ignoring anything on disk
    pub fn with_dir(dir: PathBuf) -> Self {
        Self {
            skills: Arc::new(Mutex::new(BTreeMap::new())),
            skills_dir: dir,
        }
    }

    /// Registry rooted at `dir`, populated from its mapping file
    ///
    /// An unreadable mapping is logged and treated as empty.
    pub fn load(dir: PathBuf) -> Self {
        let registry = Self::with_dir(dir);
        match registry.read_mapping() {
            Ok(map) => {
                info!("Loaded {} learned skill(s)", map.len());
                *registry.lock() = map;
            }
            Err(e) => warn!("Could not load learned skills: {:#}", e),
        }
        registry
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.skills.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn skills_dir(&self) -> &Path {
        &self.skills_dir
    }

    pub fn registry_file(&self) -> PathBuf {
        self.skills_dir.join(REGISTRY_FILE)
    }

    /// Canonical key for a task phrase
    pub fn normalize_key(task: &str) -> String {
        lang::normalize(task)
            .trim_end_matches('.')
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `skill_<key>.rhai` with only `[a-z0-9_]` kept
    pub fn script_file_name(key: &str) -> String {
        let sanitized: String = key
            .to_lowercase()
            .replace(' ', "_")
            .chars()
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
            .collect();
        format!("skill_{}.rhai", sanitized)
    }

    /// Script file for `key` that no other key already owns
    ///
    /// A key keeps its current file. Keys that sanitize to the same name get
    /// a numeric suffix.
    fn unique_file_name(skills: &BTreeMap<String, String>, key: &str) -> String {
        if let Some(existing) = skills.get(key) {
            return existing.clone();
        }

        let base = Self::script_file_name(key);
        let taken = |name: &str| skills.values().any(|file| file == name);
        if !taken(&base) {
            return base;
        }

        let stem = base.trim_end_matches(".rhai");
        (2..)
            .map(|n| format!("{}_{}.rhai", stem, n))
            .find(|name| !taken(name))
            .unwrap_or(base)
    }

    /// Store a script under a task phrase
    ///
    /// Re-registering a key overwrites its script. If the script was written
    /// but the mapping file was not, the skill stays usable for this session
    /// and the error is returned.
    pub fn register(&self, task: &str, code: &str) -> Result<LearnedSkill> {
        let key = Self::normalize_key(task);
        if key.is_empty() {
            bail!("Cannot register a skill without a task phrase");
        }

        let mut skills = self.lock();

        let file_name = Self::unique_file_name(&skills, &key);
        let script_path = self.skills_dir.join(&file_name);

        std::fs::create_dir_all(&self.skills_dir)
            .context("Failed to create skills directory")?;
        std::fs::write(&script_path, code)
            .with_context(|| format!("Failed to write {}", script_path.display()))?;

        skills.insert(key.clone(), file_name);
        self.write_mapping(&skills)?;

        info!("Learned skill '{}' -> {}", key, script_path.display());
        Ok(LearnedSkill { key, script_path })
    }

    /// First skill whose key occurs in the normalized text
    ///
    /// Skills whose script file has gone missing are passed over.
    pub fn find_match(&self, normalized: &str) -> Option<LearnedSkill> {
        let skills = self.lock();
        skills
            .iter()
            .filter(|(key, _)| normalized.contains(key.as_str()))
            .map(|(key, file)| LearnedSkill {
                key: key.clone(),
                script_path: self.skills_dir.join(file),
            })
            .find(|skill| {
                let present = skill.script_path.exists();
                if !present {
                    debug!("Skipping '{}': {} is missing", skill.key, skill.script_path.display());
                }
                present
            })
    }

    pub fn get(&self, key: &str) -> Option<LearnedSkill> {
        let key = Self::normalize_key(key);
        let skills = self.lock();
        skills.get(&key).map(|file| LearnedSkill {
            key: key.clone(),
            script_path: self.skills_dir.join(file),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn list(&self) -> Vec<LearnedSkill> {
        let skills = self.lock();
        skills
            .iter()
            .map(|(key, file)| LearnedSkill {
                key: key.clone(),
                script_path: self.skills_dir.join(file),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Source text of a skill's script
    pub fn load_script(&self, skill: &LearnedSkill) -> Result<String> {
        std::fs::read_to_string(&skill.script_path)
            .with_context(|| format!("Failed to read {}", skill.script_path.display()))
    }

    /// Remove a skill and its script; false if it was not registered
    pub fn forget(&self, key: &str) -> Result<bool> {
        let key = Self::normalize_key(key);
        let mut skills = self.lock();

        let Some(file) = skills.remove(&key) else {
            return Ok(false);
        };

        let path = self.skills_dir.join(&file);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to delete {}", path.display()))?;
        }
        self.write_mapping(&skills)?;

        info!("Forgot skill '{}'", key);
        Ok(true)
    }

    fn read_mapping(&self) -> Result<BTreeMap<String, String>> {
        let path = self.registry_file();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let raw: BTreeMap<String, String> = serde_json::from_str(&content)
            .context("Skill registry is not a JSON object of strings")?;

        // Keys written by hand may not be normalized
        Ok(raw
            .into_iter()
            .map(|(k, v)| (Self::normalize_key(&k), v))
            .filter(|(k, _)| !k.is_empty())
            .collect())
    }

    fn write_mapping(&self, skills: &BTreeMap<String, String>) -> Result<()> {
        let path = self.registry_file();
        let content = serde_json::to_string_pretty(skills)?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Wrote {} skill(s) to {}", skills.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_script_file_name() {
        assert_eq!(SkillRegistry::script_file_name("open my notes"), "skill_open_my_notes.rhai");
        assert_eq!(SkillRegistry::script_file_name("crear carpeta ñ-2"), "skill_crear_carpeta_2.rhai");
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(SkillRegistry::normalize_key("  Clean   My Desktop! "), "clean my desktop");
        assert_eq!(SkillRegistry::normalize_key("¿Abrir notas?."), "abrir notas");
    }

    #[test]
    fn test_register_and_reload() {
        let dir = tempdir().unwrap();
        let registry = SkillRegistry::with_dir(dir.path().to_path_buf());

        let skill = registry.register("Say Hello", "print(\"hello\");").unwrap();
        assert_eq!(skill.key, "say hello");
        assert!(skill.script_path.exists());

        let reloaded = SkillRegistry::load(dir.path().to_path_buf());
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.load_script(&skill).unwrap(), "print(\"hello\");");

        let mapping = std::fs::read_to_string(reloaded.registry_file()).unwrap();
        assert!(mapping.contains("\"say hello\": \"skill_say_hello.rhai\""));
    }

    #[test]
    fn test_substring_match_in_key_order() {
        let dir = tempdir().unwrap();
        let registry = SkillRegistry::with_dir(dir.path().to_path_buf());
        registry.register("water plants", "1").unwrap();
        registry.register("backup", "2").unwrap();

        let found = registry.find_match("please backup and water plants now").unwrap();
        assert_eq!(found.key, "backup");
        assert!(registry.find_match("nothing here").is_none());
    }

    #[test]
    fn test_missing_script_falls_through_to_next_match() {
        let dir = tempdir().unwrap();
        let registry = SkillRegistry::with_dir(dir.path().to_path_buf());
        let backup = registry.register("backup", "1").unwrap();
        registry.register("water plants", "2").unwrap();

        std::fs::remove_file(&backup.script_path).unwrap();

        let found = registry.find_match("please backup and water plants now").unwrap();
        assert_eq!(found.key, "water plants");
        assert!(registry.find_match("just backup").is_none());
        assert!(registry.contains("backup"));
    }

    #[test]
    fn test_relearning_overwrites() {
        let dir = tempdir().unwrap();
        let registry = SkillRegistry::with_dir(dir.path().to_path_buf());
        registry.register("tidy up", "old").unwrap();
        let skill = registry.register("Tidy up", "new").unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.load_script(&skill).unwrap(), "new");
    }

    #[test]
    fn test_colliding_keys_get_distinct_scripts() {
        let dir = tempdir().unwrap();
        let registry = SkillRegistry::with_dir(dir.path().to_path_buf());

        let accented = registry.register("abre el menú", "print(\"menu\");").unwrap();
        let plain = registry.register("abre el men", "print(\"other\");").unwrap();
        let third = registry.register("abre el me-nú", "print(\"third\");").unwrap();

        assert_eq!(accented.script_path.file_name().unwrap(), "skill_abre_el_men.rhai");
        assert_eq!(plain.script_path.file_name().unwrap(), "skill_abre_el_men_2.rhai");
        assert_ne!(third.script_path, accented.script_path);
        assert_ne!(third.script_path, plain.script_path);

        let reloaded = SkillRegistry::load(dir.path().to_path_buf());
        let accented = reloaded.get("abre el menú").unwrap();
        assert_eq!(reloaded.load_script(&accented).unwrap(), "print(\"menu\");");
        let plain = reloaded.get("abre el men").unwrap();
        assert_eq!(reloaded.load_script(&plain).unwrap(), "print(\"other\");");

        // Re-learning keeps the key's own file
        let again = reloaded.register("abre el men", "print(\"again\");").unwrap();
        assert_eq!(again.script_path, plain.script_path);
        assert_eq!(reloaded.load_script(&accented).unwrap(), "print(\"menu\");");
    }

    #[test]
    fn test_forget_removes_script() {
        let dir = tempdir().unwrap();
        let registry = SkillRegistry::with_dir(dir.path().to_path_buf());
        let skill = registry.register("ping", "1").unwrap();

        assert!(registry.forget("ping").unwrap());
        assert!(!skill.script_path.exists());
        assert!(!registry.forget("ping").unwrap());
        assert!(SkillRegistry::load(dir.path().to_path_buf()).is_empty());
    }

    #[test]
    fn test_corrupt_mapping_loads_empty() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(REGISTRY_FILE), "not json").unwrap();
        assert!(SkillRegistry::load(dir.path().to_path_buf()).is_empty());
    }
}
