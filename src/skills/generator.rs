//! Script generation through the reasoning endpoint

use serde_json::{json, Value};
use tracing::{debug, warn};

use super::executor::CapabilitySet;
use crate::agent::{prompts, AskRequest, ReasoningClient, Reply};
use crate::lang::Language;

/// Output schema: a single `code` string
pub fn code_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "code": { "type": "STRING" }
        },
        "required": ["code"]
    })
}

/// Asks the remote model for a Rhai script restricted to a capability set
#[derive(Clone)]
pub struct ScriptGenerator {
    client: ReasoningClient,
    capabilities: CapabilitySet,
}

impl ScriptGenerator {
    pub fn new(client: ReasoningClient, capabilities: CapabilitySet) -> Self {
        Self { client, capabilities }
    }

    /// Generated source, or `None` if the model gave nothing usable
    pub async fn generate(&self, task: &str, language: Language) -> Option<String> {
        let prompt = prompts::code_generation(task, &self.capabilities.describe(), language);
        let reply = self.client.ask(AskRequest::structured(prompt, code_schema())).await;
        extract_code(reply)
    }
}

/// Pull a non-empty `code` field out of a structured reply
pub fn extract_code(reply: Reply) -> Option<String> {
    match reply {
        Reply::Structured(value) => {
            let code = value
                .get("code")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string);
            if code.is_none() {
                warn!("Generated reply has no code field");
            }
            code
        }
        Reply::Failed(reason) => {
            debug!("Code generation failed: {}", reason);
            None
        }
        Reply::Text(_) => {
            warn!("Code generation returned free text instead of structured output");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_code() {
        assert_eq!(
            extract_code(Reply::Structured(json!({ "code": " print(1); " }))),
            Some("print(1);".to_string())
        );
        assert_eq!(extract_code(Reply::Structured(json!({ "script": "x" }))), None);
        assert_eq!(extract_code(Reply::Structured(json!({ "code": "" }))), None);
        assert_eq!(extract_code(Reply::Failed("offline".into())), None);
        assert_eq!(extract_code(Reply::Text("print(1);".into())), None);
    }
}
