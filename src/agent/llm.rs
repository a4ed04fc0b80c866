//! Remote reasoning client (Gemini `generateContent`)
//!
//! [`ReasoningClient::ask`] is the single choke point between the assistant
//! and the network: it never returns an error. Transport failures, retry
//! exhaustion and missing credentials all come back as a localized
//! [`Reply::Failed`] sentence that can be shown to the user as-is.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::prompts;
use super::retry::{RemoteError, RetryPolicy};
use super::transport::{HttpTransport, Transport};
use crate::config::Settings;
use crate::lang::Phrase;
use crate::memory::facts::{FactStore, NO_FACTS_SUMMARY};

/// Which system instruction accompanies a request
#[derive(Debug, Clone, PartialEq)]
pub enum Preamble {
    /// Assistant persona plus the current facts summary
    Persona,
    /// Caller-supplied instruction
    Custom(String),
    /// Nested instructions (code generation, extraction) carry their own framing
    None,
}

/// One question for the remote model
#[derive(Debug, Clone)]
pub struct AskRequest {
    pub query: String,
    /// Let the model consult live search results
    pub grounding: bool,
    /// JSON schema the reply must conform to
    pub schema: Option<Value>,
    pub preamble: Preamble,
}

impl AskRequest {
    /// Plain text question answered in persona
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            grounding: false,
            schema: None,
            preamble: Preamble::Persona,
        }
    }

    /// Open conversation: persona plus search grounding
    pub fn conversation(query: impl Into<String>) -> Self {
        Self::text(query).grounded()
    }

    /// Schema-constrained request without persona
    pub fn structured(query: impl Into<String>, schema: Value) -> Self {
        Self {
            query: query.into(),
            grounding: false,
            schema: Some(schema),
            preamble: Preamble::None,
        }
    }

    pub fn grounded(mut self) -> Self {
        self.grounding = true;
        self
    }

    pub fn with_preamble(mut self, preamble: Preamble) -> Self {
        self.preamble = preamble;
        self
    }
}

/// Outcome of [`ReasoningClient::ask`]
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Structured(Value),
    /// User-safe failure sentence
    Failed(String),
}

impl Reply {
    pub fn is_failure(&self) -> bool {
        matches!(self, Reply::Failed(_))
    }

    /// Render any variant as text
    pub fn into_text(self) -> String {
        match self {
            Reply::Text(text) | Reply::Failed(text) => text,
            Reply::Structured(value) => value.to_string(),
        }
    }
}

/// Retrying client for the generative endpoint
#[derive(Clone)]
pub struct ReasoningClient {
    transport: Arc<dyn Transport>,
    settings: Settings,
    policy: RetryPolicy,
    facts: Option<FactStore>,
}

impl ReasoningClient {
    /// Client with an explicit transport; retry policy comes from settings
    pub fn new(settings: Settings, transport: Arc<dyn Transport>) -> Self {
        let policy = RetryPolicy::from(&settings.remote());
        Self {
            transport,
            settings,
            policy,
            facts: None,
        }
    }

    /// Client talking HTTP with the configured timeout
    pub fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(settings.remote().timeout_secs);
        let transport = HttpTransport::new(timeout)?;
        Ok(Self::new(settings, Arc::new(transport)))
    }

    /// Embed this store's summary in the persona preamble
    pub fn with_facts(mut self, facts: FactStore) -> Self {
        self.facts = Some(facts);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Ask the remote model; never fails
    pub async fn ask(&self, request: AskRequest) -> Reply {
        let language = self.settings.language();

        // Read on every call so a rotated key applies immediately
        let Some(api_key) = self.settings.api_key() else {
            warn!("Remote call skipped: no API key configured");
            return Reply::Failed(language.phrase(Phrase::MissingCredential).to_string());
        };

        let remote = self.settings.remote();
        let url = format!(
            "{}/models/{}:generateContent",
            remote.endpoint.trim_end_matches('/'),
            remote.model
        );

        let preamble = self.resolve_preamble(&request.preamble).await;
        let body = build_body(&request, preamble.as_deref());

        debug!(
            "Remote call: grounding={}, schema={}, preamble={}",
            request.grounding,
            request.schema.is_some(),
            preamble.is_some()
        );

        let result = self
            .policy
            .run(|attempt| {
                debug!("Remote attempt {}", attempt);
                self.transport.post_json(&url, &api_key, &body)
            })
            .await
            .and_then(|response| interpret(&response, request.schema.is_some()));

        match result {
            Ok(reply) => reply,
            Err(e) => {
                let phrase = match e {
                    RemoteError::RateLimited => Phrase::RemoteNoResponse,
                    RemoteError::MissingCredential => Phrase::MissingCredential,
                    _ => Phrase::RemoteUnreachable,
                };
                info!("Remote call failed: {}", e);
                Reply::Failed(language.phrase(phrase).to_string())
            }
        }
    }

    async fn resolve_preamble(&self, preamble: &Preamble) -> Option<String> {
        match preamble {
            Preamble::None => None,
            Preamble::Custom(text) => Some(text.clone()),
            Preamble::Persona => {
                let summary = match &self.facts {
                    Some(store) => {
                        let user_id = self.settings.user_id();
                        store.facts_summary(&user_id).await.unwrap_or_else(|e| {
                            warn!("Could not read facts summary: {:#}", e);
                            NO_FACTS_SUMMARY.to_string()
                        })
                    }
                    None => NO_FACTS_SUMMARY.to_string(),
                };
                Some(prompts::persona(
                    &self.settings.assistant_name(),
                    self.settings.language(),
                    &summary,
                ))
            }
        }
    }
}

/// Build the `generateContent` payload
pub fn build_body(request: &AskRequest, preamble: Option<&str>) -> Value {
    let mut body = json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": request.query }]
        }]
    });

    if let Some(text) = preamble {
        body["systemInstruction"] = json!({ "parts": [{ "text": text }] });
    }

    if request.grounding {
        body["tools"] = json!([{ "google_search": {} }]);
    }

    if let Some(schema) = &request.schema {
        body["generationConfig"] = json!({
            "responseMimeType": "application/json",
            "responseSchema": schema
        });
    }

    body
}

/// Pull the reply text out of a response and parse it when a schema was requested
fn interpret(response: &Value, structured: bool) -> Result<Reply, RemoteError> {
    let text = response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| RemoteError::Malformed("response has no candidate text".to_string()))?;

    if !structured {
        return Ok(Reply::Text(text.trim().to_string()));
    }

    serde_json::from_str(strip_code_fence(&text))
        .map(Reply::Structured)
        .map_err(|e| RemoteError::Malformed(format!("structured reply is not JSON: {}", e)))
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}
