//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

use autodidact::agent::{ReasoningClient, RemoteError, RetryPolicy, Transport};
use autodidact::config::{Config, Settings};
use autodidact::dispatch::{Dispatcher, Services};
use autodidact::lang::Language;
use autodidact::memory::{FactStore, NoteLog};
use autodidact::skills::{CapabilitySet, ScriptExecutor, SkillRegistry};
use autodidact::tools::{RecordingDesktop, Translator};

/// A recorded request
#[derive(Debug, Clone)]
pub struct Call {
    pub at: Instant,
    pub api_key: String,
    pub body: Value,
}

/// Transport replaying canned responses in order
///
/// Once the script runs out every call fails with a 503.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<Value, RemoteError>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<Result<Value, RemoteError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post_json(&self, _url: &str, api_key: &str, body: &Value) -> Result<Value, RemoteError> {
        self.calls.lock().unwrap().push(Call {
            at: Instant::now(),
            api_key: api_key.to_string(),
            body: body.clone(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(RemoteError::Status(503)))
    }
}

pub fn text_response(text: &str) -> Result<Value, RemoteError> {
    Ok(json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] }))
}

/// Translator that tags text with the target code
pub struct TaggingTranslator;

#[async_trait]
impl Translator for TaggingTranslator {
    async fn translate(&self, text: &str, target: &str) -> anyhow::Result<String> {
        Ok(format!("<{}>{}", target, text))
    }
}

pub fn settings(language: Language) -> Settings {
    let mut config = Config::default();
    config.remote.api_key = "test-key".into();
    config.assistant.language = language;
    Settings::in_memory(config)
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1), 2)
}

pub struct Harness {
    pub dispatcher: Dispatcher,
    pub transport: Arc<ScriptedTransport>,
    pub desktop: Arc<RecordingDesktop>,
    pub facts: FactStore,
    pub registry: SkillRegistry,
    pub dir: TempDir,
}

pub fn harness(responses: Vec<Result<Value, RemoteError>>, language: Language) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(language);
    let transport = ScriptedTransport::new(responses);
    let facts = FactStore::in_memory().unwrap();
    let registry = SkillRegistry::with_dir(dir.path().join("skills"));
    let desktop = Arc::new(RecordingDesktop::new());

    let client = ReasoningClient::new(settings.clone(), transport.clone())
        .with_retry_policy(fast_retry())
        .with_facts(facts.clone());

    let services = Services {
        client,
        facts: facts.clone(),
        registry: registry.clone(),
        executor: ScriptExecutor::new(CapabilitySet::standard(), Duration::from_secs(5), 100_000),
        desktop: desktop.clone(),
        translator: Arc::new(TaggingTranslator),
        notes: NoteLog::new(dir.path().join("notes.txt")),
        screenshots_dir: dir.path().join("screenshots"),
    };

    Harness {
        dispatcher: Dispatcher::new(settings, services).unwrap(),
        transport,
        desktop,
        facts,
        registry,
        dir,
    }
}
