//! Reasoning client retry and credential behavior

mod common;

use autodidact::agent::{AskRequest, ReasoningClient, RemoteError, Reply, RetryPolicy};
use autodidact::lang::Language;
use common::{settings, text_response, ScriptedTransport};
use std::time::Duration;

#[tokio::test]
async fn three_rate_limits_then_give_up() {
    let transport = ScriptedTransport::new(vec![
        Err(RemoteError::RateLimited),
        Err(RemoteError::RateLimited),
        Err(RemoteError::RateLimited),
        text_response("never sent"),
    ]);
    let policy = RetryPolicy::new(3, Duration::from_millis(25), 4);
    let client = ReasoningClient::new(settings(Language::English), transport.clone()).with_retry_policy(policy.clone());

    let reply = client.ask(AskRequest::text("hello")).await;

    assert_eq!(
        reply,
        Reply::Failed("The remote model did not respond. Check your connection.".into())
    );

    let calls = transport.calls();
    assert_eq!(calls.len(), 3);

    let first_wait = calls[1].at - calls[0].at;
    let second_wait = calls[2].at - calls[1].at;
    assert!(first_wait >= Duration::from_millis(25));
    assert!(second_wait >= Duration::from_millis(100));
    assert!(second_wait > first_wait);

    let schedule = policy.schedule();
    assert!(schedule.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn other_statuses_are_terminal() {
    let transport = ScriptedTransport::new(vec![Err(RemoteError::Status(500)), text_response("unused")]);
    let client = ReasoningClient::new(settings(Language::Spanish), transport.clone());

    let reply = client.ask(AskRequest::text("hola")).await;

    assert!(reply.is_failure());
    assert_eq!(
        reply.into_text(),
        "No puedo conectar con mi cerebro. Revisa la conexión y la clave de API."
    );
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn rotated_key_applies_to_next_call() {
    let transport = ScriptedTransport::new(vec![text_response("one"), text_response("two")]);
    let settings = settings(Language::English);
    let client = ReasoningClient::new(settings.clone(), transport.clone());

    client.ask(AskRequest::text("first")).await;
    settings.set_api_key("rotated-key").unwrap();
    client.ask(AskRequest::text("second")).await;

    let keys: Vec<String> = transport.calls().into_iter().map(|c| c.api_key).collect();
    assert_eq!(keys, vec!["test-key".to_string(), "rotated-key".to_string()]);
}

#[tokio::test]
async fn structured_request_has_no_persona() {
    let transport = ScriptedTransport::new(vec![text_response("```json\n{\"code\": \"1\"}\n```")]);
    let client = ReasoningClient::new(settings(Language::English), transport.clone());

    let reply = client
        .ask(AskRequest::structured("write code", serde_json::json!({ "type": "OBJECT" })))
        .await;

    assert_eq!(reply, Reply::Structured(serde_json::json!({ "code": "1" })));
    let body = &transport.calls()[0].body;
    assert!(body.get("systemInstruction").is_none());
    assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
}
