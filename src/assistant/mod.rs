//! Assistant facade
//!
//! Wires configuration, memory, skills and desktop tools into a
//! [`Dispatcher`], and runs commands one at a time through a
//! [`CommandWorker`] so a slow remote call never overlaps the next command.

pub mod frontend;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::agent::{AskRequest, ReasoningClient};
use crate::config::{Paths, Settings};
use crate::dispatch::{Dispatcher, Services};
use crate::lang::{Language, Phrase};
use crate::memory::{FactStore, NoteLog};
use crate::skills::{ScriptExecutor, SkillRegistry};
use crate::tools::{SystemDesktop, WebTranslator};
use crate::types::{Channel, Role};
use crate::voice::SpeechQueue;

pub use frontend::{ConsoleFrontend, Frontend, ScriptedFrontend};

/// Queue depth before `submit` starts waiting
const COMMAND_QUEUE_SIZE: usize = 32;

#[derive(Clone)]
pub struct Assistant {
    dispatcher: Arc<Dispatcher>,
}

impl Assistant {
    /// Assemble the assistant from files under `paths`
    pub async fn open(paths: &Paths) -> Result<Self> {
        let settings = Settings::open(&paths.config_file)?;
        std::fs::create_dir_all(&paths.data_dir)
            .with_context(|| format!("Failed to create {}", paths.data_dir.display()))?;

        let facts = FactStore::open_or_memory(paths.facts_db()).await?;
        let client = ReasoningClient::from_settings(settings.clone())?.with_facts(facts.clone());
        let timeout = Duration::from_secs(settings.remote().timeout_secs);

        let services = Services {
            client,
            facts,
            registry: SkillRegistry::load(paths.skills_dir()),
            executor: ScriptExecutor::from_config(&settings.skills()),
            desktop: Arc::new(SystemDesktop),
            translator: Arc::new(WebTranslator::new(timeout)?),
            notes: NoteLog::new(paths.notes_file()),
            screenshots_dir: paths.screenshots_dir(),
        };

        info!("Assistant data in {}", paths.data_dir.display());
        Self::from_services(settings, services)
    }

    pub fn from_services(settings: Settings, services: Services) -> Result<Self> {
        Ok(Self {
            dispatcher: Arc::new(Dispatcher::new(settings, services)?),
        })
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn settings(&self) -> &Settings {
        self.dispatcher.settings()
    }

    /// Short self-introduction in the active language
    pub async fn greet(&self) -> String {
        let settings = self.dispatcher.settings();
        let prompt = settings
            .language()
            .format(Phrase::Greeting, &[("name", &settings.assistant_name())]);
        self.dispatcher.client().ask(AskRequest::text(prompt)).await.into_text()
    }

    pub fn set_language(&self, language: Language) -> Result<()> {
        self.dispatcher.set_language(language)
    }

    pub async fn handle(&self, text: &str, frontend: &dyn Frontend) -> Option<String> {
        self.dispatcher.dispatch(text, frontend).await
    }
}

/// Serial command queue in front of the dispatcher
#[derive(Clone)]
pub struct CommandWorker {
    tx: mpsc::Sender<String>,
}

impl CommandWorker {
    /// Start the worker; it stops once every sender is dropped
    pub fn spawn(
        assistant: Assistant,
        frontend: Arc<dyn Frontend>,
        speech: Option<SpeechQueue>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<String>(COMMAND_QUEUE_SIZE);

        let handle = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                frontend.render(&command, Role::User, Channel::Conversation);

                let Some(reply) = assistant.handle(&command, frontend.as_ref()).await else {
                    debug!("No reply for '{}'", command);
                    continue;
                };
                frontend.render(&reply, Role::Assistant, Channel::Conversation);

                if let Some(speech) = &speech {
                    let settings = assistant.settings();
                    if settings.tts_enabled() && !speech.say(&reply) {
                        let notice = settings.language().phrase(Phrase::SpeechStopped);
                        frontend.render(notice, Role::System, Channel::System);
                    }
                }
            }
            debug!("Command worker stopped");
        });

        (Self { tx }, handle)
    }

    pub async fn submit(&self, command: impl Into<String>) -> Result<()> {
        self.tx
            .send(command.into())
            .await
            .map_err(|_| anyhow::anyhow!("Command worker is not running"))
    }

    /// Raw sender, for producers like the wake listener
    pub fn sender(&self) -> mpsc::Sender<String> {
        self.tx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::transport::MockTransport;
    use crate::config::Config;
    use crate::skills::CapabilitySet;
    use crate::tools::{RecordingDesktop, Translator};
    use crate::voice::Synthesizer;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct NoTranslator;

    #[async_trait]
    impl Translator for NoTranslator {
        async fn translate(&self, _text: &str, _target: &str) -> Result<String> {
            anyhow::bail!("offline")
        }
    }

    #[derive(Clone, Default)]
    struct Spoken(Arc<Mutex<Vec<String>>>);

    impl Synthesizer for Spoken {
        fn select_voice(&mut self, _voice_id: usize) -> Result<()> {
            Ok(())
        }

        fn speak(&mut self, text: &str) -> Result<()> {
            self.0.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn assistant(transport: MockTransport, dir: &std::path::Path) -> Assistant {
        let mut config = Config::default();
        config.remote.api_key = "k".into();
        config.assistant.name = "Nova".into();
        let settings = Settings::in_memory(config);

        let services = Services {
            client: ReasoningClient::new(settings.clone(), Arc::new(transport)),
            facts: FactStore::in_memory().unwrap(),
            registry: SkillRegistry::with_dir(dir.join("skills")),
            executor: ScriptExecutor::new(CapabilitySet::standard(), Duration::from_secs(5), 100_000),
            desktop: Arc::new(RecordingDesktop::new()),
            translator: Arc::new(NoTranslator),
            notes: NoteLog::new(dir.join("notes.txt")),
            screenshots_dir: dir.join("shots"),
        };
        Assistant::from_services(settings, services).unwrap()
    }

    #[tokio::test]
    async fn test_greet_uses_name_and_language() {
        let dir = tempfile::tempdir().unwrap();
        let mut transport = MockTransport::new();
        transport
            .expect_post_json()
            .withf(|_, _, body| {
                body["contents"][0]["parts"][0]["text"]
                    .as_str()
                    .is_some_and(|t| t.contains("Nova") && t.starts_with("Preséntate"))
            })
            .times(1)
            .returning(|_, _, _| Ok(json!({ "candidates": [{ "content": { "parts": [{ "text": "¡Hola, soy Nova!" }] } }] })));
        let assistant = assistant(transport, dir.path());

        assistant.set_language(Language::Spanish).unwrap();

        assert_eq!(assistant.greet().await, "¡Hola, soy Nova!");
    }

    #[tokio::test]
    async fn test_worker_processes_in_order_and_speaks() {
        let dir = tempfile::tempdir().unwrap();
        let mut transport = MockTransport::new();
        transport.expect_post_json().times(0);
        let assistant = assistant(transport, dir.path());

        let frontend = Arc::new(ScriptedFrontend::answering(&[]));
        let spoken = Spoken::default();
        let (speech, speech_worker) = SpeechQueue::spawn(spoken.clone());
        let (worker, handle) = CommandWorker::spawn(assistant, frontend.clone(), Some(speech));

        worker.submit("calculate 1 + 1").await.unwrap();
        worker.submit("timeout").await.unwrap();
        worker.submit("calculate 2 * 3").await.unwrap();
        drop(worker);
        handle.await.unwrap();
        speech_worker.await.unwrap();

        let rendered: Vec<(String, Role)> = frontend.rendered().into_iter().map(|(t, r, _)| (t, r)).collect();
        assert_eq!(
            rendered,
            vec![
                ("calculate 1 + 1".to_string(), Role::User),
                ("The result is 2".to_string(), Role::Assistant),
                ("timeout".to_string(), Role::User),
                ("calculate 2 * 3".to_string(), Role::User),
                ("The result is 6".to_string(), Role::Assistant),
            ]
        );
        assert_eq!(*spoken.0.lock().unwrap(), vec!["The result is 2", "The result is 6"]);
    }

    struct Broken;

    impl Synthesizer for Broken {
        fn select_voice(&mut self, _voice_id: usize) -> Result<()> {
            Ok(())
        }

        fn speak(&mut self, _text: &str) -> Result<()> {
            panic!("audio device lost");
        }
    }

    #[tokio::test]
    async fn test_stopped_speech_is_reported_in_active_language() {
        let dir = tempfile::tempdir().unwrap();
        let mut transport = MockTransport::new();
        transport.expect_post_json().times(0);
        let assistant = assistant(transport, dir.path());
        assistant.set_language(Language::Spanish).unwrap();

        let (speech, speech_worker) = SpeechQueue::spawn(Broken);
        assert!(speech.say("hola"));
        assert!(speech_worker.await.is_err());

        let frontend = Arc::new(ScriptedFrontend::answering(&[]));
        let (worker, handle) = CommandWorker::spawn(assistant, frontend.clone(), Some(speech));
        worker.submit("calcula 1 + 1").await.unwrap();
        drop(worker);
        handle.await.unwrap();

        let rendered: Vec<(String, Role)> = frontend.rendered().into_iter().map(|(t, r, _)| (t, r)).collect();
        assert_eq!(
            rendered.last().unwrap(),
            &("La salida de voz se detuvo.".to_string(), Role::System)
        );
        assert!(rendered.contains(&("El resultado es 2".to_string(), Role::Assistant)));
    }
}
