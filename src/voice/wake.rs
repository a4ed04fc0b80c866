//! Passive wake-phrase listening
//!
//! Polls a [`Recognizer`] while the shared flag is set. An utterance that
//! contains a wake phrase forwards whatever follows it as a command, or the
//! next utterance when nothing follows. A recognizer error is unrecoverable:
//! the flag is cleared and the loop ends.

use anyhow::Result;
use async_trait::async_trait;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::Sender;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::lang;

/// Source of recognized utterances
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Next utterance; `Ok(None)` when nothing usable was heard
    async fn listen(&self) -> Result<Option<String>>;
}

/// Treats each line of a reader as one recognized utterance
///
/// End of input is reported as an error, which stops the listener.
pub struct LineRecognizer<R> {
    reader: Arc<Mutex<R>>,
}

impl<R: BufRead + Send + 'static> LineRecognizer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Arc::new(Mutex::new(reader)),
        }
    }
}

#[async_trait]
impl<R: BufRead + Send + 'static> Recognizer for LineRecognizer<R> {
    async fn listen(&self) -> Result<Option<String>> {
        let reader = self.reader.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<String>> {
            let mut line = String::new();
            let read = reader
                .lock()
                .map_err(|_| anyhow::anyhow!("Recognizer input poisoned"))?
                .read_line(&mut line)?;
            if read == 0 {
                anyhow::bail!("Recognizer input closed");
            }
            let line = line.trim().to_string();
            Ok(if line.is_empty() { None } else { Some(line) })
        })
        .await?
    }
}

pub struct WakeListener {
    recognizer: Arc<dyn Recognizer>,
    settings: Settings,
    active: Arc<AtomicBool>,
}

impl WakeListener {
    /// Wake on the active language's phrase or the assistant's own name
    ///
    /// Both are read from `settings` per utterance, so a language switch or
    /// rename applies to the next thing heard.
    pub fn new(recognizer: Arc<dyn Recognizer>, settings: Settings) -> Self {
        Self {
            recognizer,
            settings,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current wake phrases
    pub fn phrases(&self) -> Vec<String> {
        let mut phrases = vec![self.settings.language().wake_phrase().to_string()];
        let name = lang::normalize(&self.settings.assistant_name());
        if !name.is_empty() && !phrases.contains(&name) {
            phrases.push(name);
        }
        phrases
    }

    /// Flag shared with whoever may stop the listener
    pub fn flag(&self) -> Arc<AtomicBool> {
        self.active.clone()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Text following the first wake phrase, if the utterance has one
    pub fn after_wake_phrase(&self, utterance: &str) -> Option<String> {
        let normalized = lang::normalize(utterance);
        self.phrases().iter().find_map(|phrase| {
            normalized.find(phrase.as_str()).map(|at| {
                normalized[at + phrase.len()..]
                    .trim_start_matches([',', '.', ' '])
                    .trim()
                    .to_string()
            })
        })
    }

    /// Listen until stopped, the recognizer fails, or `commands` closes
    pub async fn run(&self, commands: Sender<String>) {
        self.active.store(true, Ordering::SeqCst);
        info!("Wake listener started ({})", self.phrases().join(", "));

        let mut awaiting_command = false;
        while self.is_active() {
            let utterance = match self.recognizer.listen().await {
                Ok(Some(text)) => text,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Recognizer failed, stopping wake listener: {:#}", e);
                    self.stop();
                    break;
                }
            };

            let command = if awaiting_command {
                awaiting_command = false;
                Some(utterance)
            } else {
                match self.after_wake_phrase(&utterance) {
                    Some(rest) if rest.is_empty() => {
                        debug!("Wake phrase heard, waiting for command");
                        awaiting_command = true;
                        None
                    }
                    Some(rest) => Some(rest),
                    None => None,
                }
            };

            if let Some(command) = command {
                if commands.send(command).await.is_err() {
                    debug!("Command queue closed");
                    self.stop();
                    break;
                }
            }
        }

        info!("Wake listener stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::lang::Language;
    use std::collections::VecDeque;
    use tokio::sync::mpsc;

    struct Scripted(Mutex<VecDeque<Result<Option<String>>>>);

    impl Scripted {
        fn new(items: Vec<Result<Option<String>>>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(items.into())))
        }
    }

    #[async_trait]
    impl Recognizer for Scripted {
        async fn listen(&self) -> Result<Option<String>> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")))
        }
    }

    fn settings(language: Language, name: &str) -> Settings {
        let mut config = Config::default();
        config.assistant.language = language;
        config.assistant.name = name.into();
        Settings::in_memory(config)
    }

    #[test]
    fn test_after_wake_phrase() {
        let listener = WakeListener::new(Scripted::new(vec![]), settings(Language::Spanish, "Jarvis"));
        assert_eq!(listener.after_wake_phrase("Oye asistente, abre firefox").as_deref(), Some("abre firefox"));
        assert_eq!(listener.after_wake_phrase("jarvis qué hora es?").as_deref(), Some("qué hora es"));
        assert_eq!(listener.after_wake_phrase("oye asistente").as_deref(), Some(""));
        assert_eq!(listener.after_wake_phrase("abre firefox"), None);
    }

    #[tokio::test]
    async fn test_run_forwards_commands_then_stops_on_error() {
        let recognizer = Scripted::new(vec![
            Ok(Some("just talking".into())),
            Ok(Some("hey assistant open firefox".into())),
            Ok(None),
            Ok(Some("hey assistant".into())),
            Ok(Some("calculate 2 + 2".into())),
            Err(anyhow::anyhow!("microphone unplugged")),
            Ok(Some("hey assistant never reached".into())),
        ]);
        let listener = WakeListener::new(recognizer, settings(Language::English, "Autodidact"));
        let (tx, mut rx) = mpsc::channel(8);

        listener.run(tx).await;

        assert!(!listener.is_active());
        assert_eq!(rx.recv().await.as_deref(), Some("open firefox"));
        assert_eq!(rx.recv().await.as_deref(), Some("calculate 2 + 2"));
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_language_switch_applies_to_wake_phrase() {
        let settings = settings(Language::English, "Autodidact");
        let listener = WakeListener::new(Scripted::new(vec![]), settings.clone());
        assert_eq!(listener.after_wake_phrase("hey assistant open notes").as_deref(), Some("open notes"));

        settings.set_language(Language::Spanish).unwrap();

        assert_eq!(listener.after_wake_phrase("oye asistente abre notas").as_deref(), Some("abre notas"));
        assert_eq!(listener.after_wake_phrase("hey assistant open notes"), None);
        assert_eq!(listener.after_wake_phrase("autodidact abre notas").as_deref(), Some("abre notas"));
    }

    #[tokio::test]
    async fn test_line_recognizer_ends_at_eof() {
        let recognizer = LineRecognizer::new(std::io::Cursor::new("hello\n\n"));
        assert_eq!(recognizer.listen().await.unwrap().as_deref(), Some("hello"));
        assert_eq!(recognizer.listen().await.unwrap(), None);
        assert!(recognizer.listen().await.is_err());
    }
}
