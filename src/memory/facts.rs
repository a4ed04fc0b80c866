//! SQLite-backed store of natural-language facts about each user

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Summary used when nothing is known about a user
pub const NO_FACTS_SUMMARY: &str = "No specific facts are known about the user.";

/// A remembered fact
#[derive(Debug, Clone, PartialEq)]
pub struct Fact {
    pub user_id: String,
    pub fact: String,
    pub timestamp: DateTime<Utc>,
}

/// Durable per-user fact table
///
/// Each (user, fact) pair is stored at most once; inserting it again is a
/// no-op. Reads come back newest first.
#[derive(Clone)]
pub struct FactStore {
    conn: Arc<Mutex<Connection>>,
}

impl FactStore {
    /// Open (or create) the store at the given path
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open fact store at {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::from_connection(conn)
    }

    /// Store that lives only as long as the process
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Open the file store, degrading to memory when the file is unusable
    pub async fn open_or_memory<P: AsRef<Path>>(path: P) -> Result<Self> {
        match Self::open(path.as_ref()).await {
            Ok(store) => Ok(store),
            Err(e) => {
                warn!("Fact store unavailable ({:#}); facts will not survive restart", e);
                Self::in_memory()
            }
        }
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS user_facts (
                user_id TEXT NOT NULL,
                fact TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                PRIMARY KEY (user_id, fact)
            );

            CREATE INDEX IF NOT EXISTS idx_user_facts_time ON user_facts(user_id, timestamp DESC);
            "#,
        )
        .context("Failed to initialize fact schema")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert facts, silently skipping ones already known
    ///
    /// Returns how many were new.
    pub async fn record_facts(&self, user_id: &str, facts: &[String]) -> Result<usize> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let mut inserted = 0;

        for fact in facts.iter().map(|f| f.trim()).filter(|f| !f.is_empty()) {
            let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
            inserted += tx.execute(
                "INSERT OR IGNORE INTO user_facts (user_id, fact, timestamp) VALUES (?1, ?2, ?3)",
                params![user_id, fact, now],
            )?;
        }

        tx.commit()?;
        debug!("Recorded {} new fact(s) for {}", inserted, user_id);
        Ok(inserted)
    }

    /// All facts for a user, newest first
    pub async fn list_facts(&self, user_id: &str) -> Result<Vec<Fact>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT user_id, fact, timestamp FROM user_facts
             WHERE user_id = ?1
             ORDER BY timestamp DESC, rowid DESC",
        )?;

        let rows = stmt.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut facts = Vec::new();
        for row in rows {
            let (user_id, fact, ts) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&ts)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());
            facts.push(Fact { user_id, fact, timestamp });
        }

        Ok(facts)
    }

    pub async fn count(&self, user_id: &str) -> Result<usize> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM user_facts WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Bullet list of what is known, newest first
    pub async fn facts_summary(&self, user_id: &str) -> Result<String> {
        let facts = self.list_facts(user_id).await?;
        if facts.is_empty() {
            return Ok(NO_FACTS_SUMMARY.to_string());
        }

        let mut summary = format!("Known facts about the user (total {}):", facts.len());
        for fact in &facts {
            summary.push_str("\n- ");
            summary.push_str(&fact.fact);
        }
        Ok(summary)
    }
}
