//! Background fact extraction from conversation turns
//!
//! Runs detached after an open-conversation reply. Its completion is not
//! ordered with respect to the next user turn, so a fact learned from one
//! turn may not yet be in the summary used for the next.

use anyhow::Result;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::facts::FactStore;
use crate::agent::{prompts, AskRequest, ReasoningClient, Reply};
use crate::types::ConversationTurn;

/// Output schema: a list of short fact strings
pub fn extraction_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": { "type": "STRING" }
    })
}

/// Ask the remote model which user facts a turn reveals
pub async fn extract_facts(client: &ReasoningClient, turn: &ConversationTurn) -> Vec<String> {
    let request = AskRequest::structured(
        prompts::fact_extraction(&turn.input, &turn.output),
        extraction_schema(),
    );

    match client.ask(request).await {
        Reply::Structured(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty())
            .collect(),
        Reply::Failed(reason) => {
            debug!("Fact extraction skipped: {}", reason);
            Vec::new()
        }
        other => {
            debug!("Fact extraction returned unexpected shape: {:?}", other);
            Vec::new()
        }
    }
}

/// Extract facts from a turn and store them
pub async fn extract_and_record(
    client: &ReasoningClient,
    store: &FactStore,
    user_id: &str,
    turn: &ConversationTurn,
) -> Result<usize> {
    let facts = extract_facts(client, turn).await;
    if facts.is_empty() {
        return Ok(0);
    }
    store.record_facts(user_id, &facts).await
}

/// Fire-and-forget extraction; nothing reports back to the caller
pub fn spawn_extraction(
    client: ReasoningClient,
    store: FactStore,
    user_id: String,
    turn: ConversationTurn,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = extract_and_record(&client, &store, &user_id, &turn).await {
            warn!("Could not store extracted facts: {:#}", e);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::transport::MockTransport;
    use crate::config::{Config, Settings};
    use std::sync::Arc;

    fn client_returning(text: &'static str) -> ReasoningClient {
        let mut transport = MockTransport::new();
        transport
            .expect_post_json()
            .withf(|_, _, body| body["generationConfig"]["responseSchema"]["type"] == "ARRAY")
            .returning(move |_, _, _| {
                Ok(json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] }))
            });

        let mut config = Config::default();
        config.remote.api_key = "k".to_string();
        ReasoningClient::new(Settings::in_memory(config), Arc::new(transport))
    }

    #[tokio::test]
    async fn test_extracted_facts_are_recorded_once() {
        let client = client_returning(r#"["The user is called Ana", "The user is called Ana", ""]"#);
        let store = FactStore::in_memory().unwrap();
        let turn = ConversationTurn::new("I'm Ana", "Nice to meet you, Ana!");

        let inserted = extract_and_record(&client, &store, "guest", &turn).await.unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(store.count("guest").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_list_records_nothing() {
        let client = client_returning("[]");
        let store = FactStore::in_memory().unwrap();
        let turn = ConversationTurn::new("what time is it", "It's noon.");

        spawn_extraction(client, store.clone(), "guest".into(), turn).await.unwrap();
        assert_eq!(store.count("guest").await.unwrap(), 0);
    }
}
