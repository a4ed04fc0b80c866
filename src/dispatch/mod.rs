//! Command dispatcher
//!
//! Turns one utterance into one reply. In order:
//!
//! 1. recognition-failure codes are reworded by the remote model
//! 2. an active session mode (translator, notes) takes the input
//! 3. the language's rule table, first match wins
//! 4. learned skills whose key occurs in the input
//! 5. grounded open conversation, followed by detached fact extraction
//!
//! Handlers always receive the original text and extract their own
//! parameters from it.

pub mod rules;

use anyhow::Result;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};
use url::form_urlencoded;

use crate::agent::{AskRequest, ReasoningClient};
use crate::assistant::Frontend;
use crate::config::Settings;
use crate::lang::{self, Language, Phrase};
use crate::memory::{spawn_extraction, FactStore, NoteLog};
use crate::security::{Action, ActionType, ApprovalManager};
use crate::skills::{LearnedSkill, ScriptExecutor, ScriptGenerator, SkillAcquisition, SkillRegistry};
use crate::tools::{calc, language_code, Desktop, MediaKey, Translator};
use crate::types::ConversationTurn;

pub use rules::{CommandRule, Intent, Matcher, RuleTable};

/// Exclusive interaction state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionMode {
    #[default]
    Idle,
    /// Every input is translated into this ISO language code
    Translating(String),
    /// Every input is appended to the notes file
    NoteTaking,
}

/// Collaborators the dispatcher drives
pub struct Services {
    pub client: ReasoningClient,
    pub facts: FactStore,
    pub registry: SkillRegistry,
    pub executor: ScriptExecutor,
    pub desktop: Arc<dyn Desktop>,
    pub translator: Arc<dyn Translator>,
    pub notes: NoteLog,
    pub screenshots_dir: PathBuf,
}

pub struct Dispatcher {
    settings: Settings,
    client: ReasoningClient,
    facts: FactStore,
    registry: SkillRegistry,
    executor: ScriptExecutor,
    acquisition: SkillAcquisition,
    approvals: ApprovalManager,
    desktop: Arc<dyn Desktop>,
    translator: Arc<dyn Translator>,
    notes: NoteLog,
    screenshots_dir: PathBuf,
    rules: RwLock<Arc<RuleTable>>,
    mode: Mutex<SessionMode>,
}

impl Dispatcher {
    pub fn new(settings: Settings, services: Services) -> Result<Self> {
        let rules = RuleTable::for_language(settings.language())?;
        let approvals = ApprovalManager::new();
        let generator = ScriptGenerator::new(services.client.clone(), services.executor.capabilities().clone());
        let acquisition = SkillAcquisition::new(
            generator,
            services.executor.clone(),
            services.registry.clone(),
            approvals.clone(),
        );

        Ok(Self {
            settings,
            client: services.client,
            facts: services.facts,
            registry: services.registry,
            executor: services.executor,
            acquisition,
            approvals,
            desktop: services.desktop,
            translator: services.translator,
            notes: services.notes,
            screenshots_dir: services.screenshots_dir,
            rules: RwLock::new(Arc::new(rules)),
            mode: Mutex::new(SessionMode::Idle),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn client(&self) -> &ReasoningClient {
        &self.client
    }

    pub fn registry(&self) -> &SkillRegistry {
        &self.registry
    }

    pub fn facts(&self) -> &FactStore {
        &self.facts
    }

    pub fn approvals(&self) -> &ApprovalManager {
        &self.approvals
    }

    pub fn mode(&self) -> SessionMode {
        self.mode.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_mode(&self, mode: SessionMode) {
        info!("Session mode: {:?}", mode);
        *self.mode.lock().unwrap_or_else(|e| e.into_inner()) = mode;
    }

    fn rules(&self) -> Arc<RuleTable> {
        self.rules.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Persist a new language and swap in its rule table
    pub fn set_language(&self, language: Language) -> Result<()> {
        let table = Arc::new(RuleTable::for_language(language)?);
        let saved = self.settings.set_language(language);
        *self.rules.write().unwrap_or_else(|e| e.into_inner()) = table;
        info!("Language switched to {}", language);
        saved
    }

    /// Answer one utterance; `None` means stay silent
    pub async fn dispatch(&self, raw: &str, frontend: &dyn Frontend) -> Option<String> {
        let normalized = lang::normalize(raw);
        if normalized.is_empty() {
            return None;
        }

        let rules = self.rules();
        let language = rules.language();

        let failure = match normalized.as_str() {
            "timeout" => return None,
            "error_not_understood" => Some(Phrase::NotUnderstood),
            "error_service" => Some(Phrase::RecognitionServiceDown),
            "error_unknown" => Some(Phrase::RecognitionUnknown),
            _ => None,
        };
        if let Some(phrase) = failure {
            return Some(self.reword(language, phrase).await);
        }

        match self.mode() {
            SessionMode::Translating(target) => {
                return Some(self.translator_turn(raw, &normalized, &target, language).await);
            }
            SessionMode::NoteTaking => return Some(self.note_turn(raw, &normalized, language)),
            SessionMode::Idle => {}
        }

        if let Some(rule) = rules.first_match(&normalized) {
            debug!("Rule matched: {:?}", rule.intent);
            return Some(self.handle_rule(rule, &rules, raw, &normalized, language, frontend).await);
        }

        if let Some(skill) = self.registry.find_match(&normalized) {
            debug!("Skill matched: {}", skill.key);
            return Some(self.replay_skill(&skill, language, frontend).await);
        }

        Some(self.converse(raw).await)
    }

    async fn reword(&self, language: Language, phrase: Phrase) -> String {
        let message = language.phrase(phrase);
        let prompt = language.format(Phrase::RespondFriendly, &[("message", message)]);
        self.client.ask(AskRequest::text(prompt)).await.into_text()
    }

    async fn converse(&self, raw: &str) -> String {
        let reply = self.client.ask(AskRequest::conversation(raw)).await;
        let failed = reply.is_failure();
        let text = reply.into_text();

        if !failed {
            spawn_extraction(
                self.client.clone(),
                self.facts.clone(),
                self.settings.user_id(),
                ConversationTurn::new(raw, text.clone()),
            );
        }
        text
    }

    async fn handle_rule(
        &self,
        rule: &CommandRule,
        rules: &RuleTable,
        raw: &str,
        normalized: &str,
        language: Language,
        frontend: &dyn Frontend,
    ) -> String {
        let param = rule.matcher.capture(raw);
        let not_understood = || language.phrase(Phrase::NotUnderstood).to_string();

        match rule.intent {
            Intent::Learn => {
                let task = param.unwrap_or_default();
                self.acquisition.learn(&task, language, frontend).await.message(language)
            }
            Intent::OpenApp => match param {
                Some(app) => self.open_app(&app, language),
                None => not_understood(),
            },
            Intent::CloseApp => match param {
                Some(app) => self.close_app(&app, language),
                None => not_understood(),
            },
            Intent::WebSearch => match param {
                Some(query) => {
                    let url = format!("https://www.google.com/search?q={}", encode_query(&query));
                    self.browse(&url, Phrase::Searching, &query, language)
                }
                None => not_understood(),
            },
            Intent::YouTube => match param {
                Some(query) => {
                    let url = format!("https://www.youtube.com/results?search_query={}", encode_query(&query));
                    self.browse(&url, Phrase::SearchingVideo, &query, language)
                }
                None => not_understood(),
            },
            Intent::Music => match param {
                Some(query) => self.play_music(&query, language),
                None => not_understood(),
            },
            Intent::Calculate => match param.map(|expr| calc::evaluate(&expr)) {
                Some(Ok(value)) => {
                    language.format(Phrase::CalcResult, &[("value", &calc::format_number(value))])
                }
                Some(Err(e)) => {
                    debug!("Calculation failed: {:#}", e);
                    language.phrase(Phrase::CalcFailed).to_string()
                }
                None => language.phrase(Phrase::CalcFailed).to_string(),
            },
            Intent::SystemStatus => match self.desktop.system_status() {
                Ok(status) => language.format(
                    Phrase::SystemStatus,
                    &[
                        ("cpu", &format!("{:.1}", status.cpu_percent)),
                        ("ram", &format!("{:.1}", status.ram_percent)),
                    ],
                ),
                Err(e) => {
                    debug!("System status unavailable: {:#}", e);
                    language.phrase(Phrase::SystemUnavailable).to_string()
                }
            },
            Intent::Screenshot => match self.desktop.screenshot(&self.screenshots_dir) {
                Ok(path) => {
                    let file = path
                        .file_name()
                        .map(|f| f.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string());
                    language.format(Phrase::ScreenshotSaved, &[("file", &file)])
                }
                Err(e) => language.format(Phrase::ScreenshotFailed, &[("error", &format!("{:#}", e))]),
            },
            Intent::Media => self.press(media_key_for(normalized), Phrase::MediaDone, language),
            Intent::Volume => self.press(volume_key_for(normalized), Phrase::VolumeDone, language),
            Intent::StartTranslator => self.start_translator(rules, raw, language),
            Intent::StartNote => {
                self.set_mode(SessionMode::NoteTaking);
                language.phrase(Phrase::NoteStarted).to_string()
            }
            Intent::EndNote => language.phrase(Phrase::NoNoteInProgress).to_string(),
        }
    }

    fn open_app(&self, app: &str, language: Language) -> String {
        match self.desktop.open_application(app) {
            Ok(()) => language.format(Phrase::Opening, &[("app", app)]),
            Err(e) => {
                warn!("Could not open {}: {:#}", app, e);
                language.format(Phrase::OpenFailed, &[("app", app)])
            }
        }
    }

    fn close_app(&self, app: &str, language: Language) -> String {
        match self.desktop.close_application(app) {
            Ok(true) => language.format(Phrase::Closing, &[("app", app)]),
            Ok(false) => language.format(Phrase::CloseNotFound, &[("app", app)]),
            Err(e) => language.format(Phrase::DesktopFailed, &[("error", &format!("{:#}", e))]),
        }
    }

    fn browse(&self, url: &str, phrase: Phrase, query: &str, language: Language) -> String {
        match self.desktop.open_url(url) {
            Ok(()) => language.format(phrase, &[("query", query)]),
            Err(e) => {
                warn!("Could not open browser: {:#}", e);
                language.phrase(Phrase::BrowserFailed).to_string()
            }
        }
    }

    fn play_music(&self, query: &str, language: Language) -> String {
        let encoded = encode_query(query).replace('+', "%20");
        if let Err(e) = self.desktop.open_url(&format!("spotify:search:{}", encoded)) {
            debug!("Spotify URI handler failed, using web player: {:#}", e);
            return self.browse(
                &format!("https://open.spotify.com/search/{}", encoded),
                Phrase::SearchingMusic,
                query,
                language,
            );
        }
        language.format(Phrase::SearchingMusic, &[("query", query)])
    }

    fn press(&self, key: MediaKey, done: Phrase, language: Language) -> String {
        match self.desktop.press_media_key(key) {
            Ok(()) => language.phrase(done).to_string(),
            Err(e) => language.format(Phrase::DesktopFailed, &[("error", &format!("{:#}", e))]),
        }
    }

    fn start_translator(&self, rules: &RuleTable, raw: &str, language: Language) -> String {
        let target = rules.translator_target(raw);
        match target.as_deref().and_then(language_code) {
            Some(code) => {
                self.set_mode(SessionMode::Translating(code.to_string()));
                let name = target.unwrap_or_default();
                language.format(Phrase::TranslatorOn, &[("language", &name)])
            }
            None => language.phrase(Phrase::UnknownLanguage).to_string(),
        }
    }

    async fn translator_turn(&self, raw: &str, normalized: &str, target: &str, language: Language) -> String {
        if language.translator_exit_phrases().iter().any(|p| normalized.contains(p)) {
            self.set_mode(SessionMode::Idle);
            return language.phrase(Phrase::TranslatorOff).to_string();
        }

        match self.translator.translate(raw.trim(), target).await {
            Ok(text) => language.format(Phrase::Translation, &[("text", &text)]),
            Err(e) => {
                warn!("Translation failed: {:#}", e);
                language.phrase(Phrase::TranslationFailed).to_string()
            }
        }
    }

    fn note_turn(&self, raw: &str, normalized: &str, language: Language) -> String {
        if language.note_exit_phrases().iter().any(|p| normalized.contains(p)) {
            self.set_mode(SessionMode::Idle);
            return language.phrase(Phrase::NoteEnded).to_string();
        }

        match self.notes.append(raw) {
            Ok(()) => language.phrase(Phrase::NoteSaved).to_string(),
            Err(e) => {
                warn!("Could not write note: {:#}", e);
                language.phrase(Phrase::NoteFailed).to_string()
            }
        }
    }

    async fn replay_skill(&self, skill: &LearnedSkill, language: Language, frontend: &dyn Frontend) -> String {
        let decision = self
            .approvals
            .request(Action::new(ActionType::SkillReplay, &skill.key), &skill.key, frontend)
            .await;
        if !decision.allowed() {
            return language.phrase(Phrase::LearnDeclined).to_string();
        }

        let result = match self.registry.load_script(skill) {
            Ok(code) => self.executor.run_blocking(code).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => {
                let done = language.format(Phrase::SkillDone, &[("task", &skill.key)]);
                let summary = outcome.summary();
                if summary.trim().is_empty() {
                    done
                } else {
                    format!("{}\n{}", done, summary)
                }
            }
            Err(e) => {
                warn!("Skill '{}' failed: {:#}", skill.key, e);
                language.format(Phrase::SkillFailed, &[("error", &format!("{:#}", e))])
            }
        }
    }
}

fn encode_query(query: &str) -> String {
    form_urlencoded::byte_serialize(query.as_bytes()).collect()
}

fn has_word(normalized: &str, words: &[&str]) -> bool {
    normalized.split_whitespace().any(|w| words.contains(&w))
}

fn media_key_for(normalized: &str) -> MediaKey {
    if has_word(normalized, &["next", "siguiente"]) {
        MediaKey::Next
    } else if has_word(normalized, &["previous", "anterior"]) {
        MediaKey::Previous
    } else {
        MediaKey::PlayPause
    }
}

fn volume_key_for(normalized: &str) -> MediaKey {
    if has_word(normalized, &["up", "sube"]) {
        MediaKey::VolumeUp
    } else if has_word(normalized, &["down", "baja"]) {
        MediaKey::VolumeDown
    } else {
        MediaKey::Mute
    }
}
