//! Configuration management
//!
//! The on-disk record is a TOML file holding assistant identity, voice
//! settings, the active language and the remote reasoning credential.
//! At runtime it is owned by [`Settings`], a lock-guarded handle shared by
//! every component; mutations go through setters that persist immediately.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

use crate::lang::Language;

/// Environment variable consulted when no key is stored in the config file
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "AUTODIDACT_DATA_DIR";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Identity, voice and language
    #[serde(default)]
    pub assistant: AssistantConfig,
    /// Remote reasoning endpoint
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Learned skill execution limits
    #[serde(default)]
    pub skills: SkillsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Name the assistant introduces itself with
    #[serde(default = "default_assistant_name")]
    pub name: String,
    #[serde(default)]
    pub language: Language,
    #[serde(default = "default_true")]
    pub tts_enabled: bool,
    #[serde(default)]
    pub wake_word_enabled: bool,
    /// Index of the synthesizer voice
    #[serde(default)]
    pub voice_id: usize,
    /// Identity facts are recorded under ("guest" when unset)
    #[serde(default)]
    pub user_name: Option<String>,
}

fn default_assistant_name() -> String {
    "Autodidact".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: default_assistant_name(),
            language: Language::default(),
            tts_enabled: true,
            wake_word_enabled: false,
            voice_id: 0,
            user_name: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Credential; empty means "use the environment"
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: u32,
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_timeout_secs() -> u64 {
    25
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_factor() -> u32 {
    2
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsConfig {
    /// Wall-clock budget for one script run
    #[serde(default = "default_skill_timeout")]
    pub timeout_secs: u64,
    /// Rhai operation budget for one script run
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,
}

fn default_skill_timeout() -> u64 {
    30
}

fn default_max_operations() -> u64 {
    1_000_000
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_skill_timeout(),
            max_operations: default_max_operations(),
        }
    }
}

impl Config {
    /// Load configuration from a file, writing defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .context("Failed to read config file")?;
            let config: Config = toml::from_str(&contents)
                .context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let parent = path.parent()
            .context("Config path has no parent")?;

        std::fs::create_dir_all(parent)
            .context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Credential from the file, else from the environment
    pub fn resolved_api_key(&self) -> Option<String> {
        let stored = self.remote.api_key.trim();
        if !stored.is_empty() {
            return Some(stored.to_string());
        }
        std::env::var(API_KEY_ENV)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }

    /// Identity used for fact storage
    pub fn user_id(&self) -> String {
        self.assistant
            .user_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or("guest")
            .to_string()
    }
}

/// Filesystem locations used by the assistant
#[derive(Debug, Clone)]
pub struct Paths {
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
}

impl Paths {
    /// Resolve paths from explicit overrides, the environment and the platform defaults
    pub fn resolve(config_file: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "autodidact");

        let config_file = match config_file {
            Some(p) => p,
            None => dirs
                .as_ref()
                .map(|d| d.config_dir().join("config.toml"))
                .context("Failed to get project directories")?,
        };

        let data_dir = match data_dir.or_else(|| std::env::var_os(DATA_DIR_ENV).map(PathBuf::from)) {
            Some(p) => p,
            None => dirs
                .as_ref()
                .map(|d| d.data_dir().to_path_buf())
                .context("Failed to get project directories")?,
        };

        Ok(Self { config_file, data_dir })
    }

    /// Everything under one root (tests, portable installs)
    pub fn rooted(root: &Path) -> Self {
        Self {
            config_file: root.join("config.toml"),
            data_dir: root.join("data"),
        }
    }

    pub fn facts_db(&self) -> PathBuf {
        self.data_dir.join("facts.db")
    }

    pub fn skills_dir(&self) -> PathBuf {
        self.data_dir.join("skills")
    }

    pub fn notes_file(&self) -> PathBuf {
        self.data_dir.join("notes.txt")
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.data_dir.join("screenshots")
    }
}

/// Shared, lock-guarded configuration
///
/// Cloning is cheap; every clone observes the same record. Setters apply the
/// change in memory first and then persist; when the save fails the error is
/// returned but the new value stays in effect.
#[derive(Debug, Clone)]
pub struct Settings {
    inner: Arc<RwLock<Config>>,
    path: Option<PathBuf>,
}

impl Settings {
    /// Settings backed by a config file
    pub fn open(path: &Path) -> Result<Self> {
        let config = Config::load_from(path)?;
        Ok(Self {
            inner: Arc::new(RwLock::new(config)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Settings that never touch the filesystem
    pub fn in_memory(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
            path: None,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Config> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Config> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of the whole record
    pub fn snapshot(&self) -> Config {
        self.read().clone()
    }

    pub fn language(&self) -> Language {
        self.read().assistant.language
    }

    pub fn assistant_name(&self) -> String {
        self.read().assistant.name.clone()
    }

    pub fn user_id(&self) -> String {
        self.read().user_id()
    }

    pub fn api_key(&self) -> Option<String> {
        self.read().resolved_api_key()
    }

    pub fn remote(&self) -> RemoteConfig {
        self.read().remote.clone()
    }

    pub fn skills(&self) -> SkillsConfig {
        self.read().skills.clone()
    }

    pub fn tts_enabled(&self) -> bool {
        self.read().assistant.tts_enabled
    }

    pub fn wake_word_enabled(&self) -> bool {
        self.read().assistant.wake_word_enabled
    }

    pub fn voice_id(&self) -> usize {
        self.read().assistant.voice_id
    }

    pub fn set_api_key(&self, key: &str) -> Result<()> {
        self.update(|c| c.remote.api_key = key.trim().to_string())
    }

    pub fn set_language(&self, language: Language) -> Result<()> {
        self.update(|c| c.assistant.language = language)
    }

    pub fn set_assistant_name(&self, name: &str) -> Result<()> {
        self.update(|c| c.assistant.name = name.trim().to_string())
    }

    pub fn set_user_name(&self, name: &str) -> Result<()> {
        let name = name.trim();
        self.update(|c| {
            c.assistant.user_name = if name.is_empty() { None } else { Some(name.to_string()) }
        })
    }

    pub fn set_tts_enabled(&self, enabled: bool) -> Result<()> {
        self.update(|c| c.assistant.tts_enabled = enabled)
    }

    pub fn set_wake_word_enabled(&self, enabled: bool) -> Result<()> {
        self.update(|c| c.assistant.wake_word_enabled = enabled)
    }

    pub fn set_voice_id(&self, voice_id: usize) -> Result<()> {
        self.update(|c| c.assistant.voice_id = voice_id)
    }

    fn update(&self, apply: impl FnOnce(&mut Config)) -> Result<()> {
        let snapshot = {
            let mut guard = self.write();
            apply(&mut guard);
            guard.clone()
        };

        let Some(path) = &self.path else {
            return Ok(());
        };

        debug!("Persisting settings to {}", path.display());
        snapshot.save_to(path).map_err(|e| {
            warn!("Settings changed in memory but could not be saved: {:#}", e);
            e
        })
    }
}

/// Commented template written by `config init`
pub fn default_config_toml() -> String {
    r#"# Autodidact configuration

[assistant]
name = "Autodidact"
# "en" or "es"
language = "en"
tts_enabled = true
wake_word_enabled = false
voice_id = 0
# user_name = "Ana"

[remote]
# Leave empty to read GEMINI_API_KEY from the environment
api_key = ""
model = "gemini-2.5-flash"
endpoint = "https://generativelanguage.googleapis.com/v1beta"
timeout_secs = 25
max_attempts = 3
backoff_base_ms = 1000
backoff_factor = 2

[skills]
timeout_secs = 30
max_operations = 1000000
"#
    .to_string()
}
