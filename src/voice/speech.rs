//! Speech output queue
//!
//! Replies and voice changes go through one FIFO channel drained by a single
//! blocking worker, so a voice switch takes effect exactly between the
//! utterances it was queued between.

use anyhow::{bail, Context, Result};
use std::process::Command;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::lang::Language;

/// One item on the speech queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechTask {
    Say(String),
    SelectVoice(usize),
}

/// Something that can turn text into audible speech
pub trait Synthesizer: Send {
    fn select_voice(&mut self, voice_id: usize) -> Result<()>;

    /// Speak and block until finished
    fn speak(&mut self, text: &str) -> Result<()>;
}

/// Drop markdown emphasis and code marks that engines would read aloud
pub fn clean_for_speech(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '*' | '#' | '`' | '_'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Handle for enqueueing speech
#[derive(Debug, Clone)]
pub struct SpeechQueue {
    tx: UnboundedSender<SpeechTask>,
}

impl SpeechQueue {
    /// Start the worker; it stops once every handle is dropped
    pub fn spawn<S: Synthesizer + 'static>(mut synthesizer: S) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<SpeechTask>();

        let worker = tokio::task::spawn_blocking(move || {
            while let Some(task) = rx.blocking_recv() {
                let result = match &task {
                    SpeechTask::Say(text) => synthesizer.speak(text),
                    SpeechTask::SelectVoice(id) => synthesizer.select_voice(*id),
                };
                if let Err(e) = result {
                    warn!("Speech task {:?} failed: {:#}", task, e);
                }
            }
            debug!("Speech worker stopped");
        });

        (Self { tx }, worker)
    }

    /// Queue text; false once the worker is gone
    pub fn say(&self, text: &str) -> bool {
        let text = clean_for_speech(text);
        if text.is_empty() {
            return true;
        }
        self.tx.send(SpeechTask::Say(text)).is_ok()
    }

    pub fn select_voice(&self, voice_id: usize) -> bool {
        self.tx.send(SpeechTask::SelectVoice(voice_id)).is_ok()
    }
}

/// System speech command: `say` on macOS, `espeak-ng`/`espeak` elsewhere
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    language: Language,
    voice_id: usize,
}

const MAC_VOICES: &[(&str, &str)] = &[("Samantha", "Monica"), ("Daniel", "Jorge"), ("Karen", "Paulina")];
const ESPEAK_VARIANTS: &[&str] = &["m3", "f3", "m1", "f2"];

impl CommandSynthesizer {
    pub fn new(language: Language, voice_id: usize) -> Self {
        Self { language, voice_id }
    }

    fn command(&self, text: &str) -> Command {
        if cfg!(target_os = "macos") {
            let (english, spanish) = MAC_VOICES[self.voice_id % MAC_VOICES.len()];
            let voice = match self.language {
                Language::English => english,
                Language::Spanish => spanish,
            };
            let mut cmd = Command::new("say");
            cmd.args(["-v", voice, text]);
            cmd
        } else {
            let variant = ESPEAK_VARIANTS[self.voice_id % ESPEAK_VARIANTS.len()];
            let program = if which_exists("espeak-ng") { "espeak-ng" } else { "espeak" };
            let voice = format!("{}+{}", self.language.code(), variant);
            let mut cmd = Command::new(program);
            cmd.args(["-v", voice.as_str(), text]);
            cmd
        }
    }
}

impl Synthesizer for CommandSynthesizer {
    fn select_voice(&mut self, voice_id: usize) -> Result<()> {
        self.voice_id = voice_id;
        Ok(())
    }

    fn speak(&mut self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            bail!("Cannot speak empty text");
        }
        let status = self
            .command(text)
            .status()
            .context("Failed to start speech command")?;
        if !status.success() {
            bail!("Speech command exited with {}", status);
        }
        Ok(())
    }
}

fn which_exists(program: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}
