//! Learning a new skill
//!
//! ```text
//! Proposed -> AwaitingConfirmation -> Executing -> Persisted
//!                                  |            \-> ExecutionFailed
//!                                  \-> Declined
//! ```
//!
//! A script is written to the registry only after the user approved it and
//! its trial run finished without error. Every failure along the way ends
//! the workflow with a user-facing message; nothing propagates to the caller.

use tracing::{info, warn};

use super::executor::ScriptExecutor;
use super::generator::ScriptGenerator;
use super::registry::{LearnedSkill, SkillRegistry};
use crate::assistant::Frontend;
use crate::lang::{Language, Phrase};
use crate::security::{Action, ActionType, ApprovalManager};

/// Intermediate states, logged as the workflow advances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningState {
    Proposed,
    AwaitingConfirmation,
    Executing,
}

/// How a learning attempt ended
#[derive(Debug, Clone, PartialEq)]
pub enum LearningOutcome {
    /// No task phrase could be extracted
    NotUnderstood,
    /// The model produced no usable code
    GenerationFailed { task: String },
    /// The user said no; nothing ran, nothing was written
    Declined { task: String },
    /// The trial run raised; nothing was written
    ExecutionFailed { task: String, error: String },
    /// Trial succeeded and the skill is registered
    Persisted { skill: LearnedSkill },
    /// Trial succeeded but registering the skill failed
    PersistFailed { task: String, error: String },
}

impl LearningOutcome {
    pub fn learned(&self) -> bool {
        matches!(self, LearningOutcome::Persisted { .. })
    }

    /// Localized sentence for the user
    pub fn message(&self, language: Language) -> String {
        match self {
            LearningOutcome::NotUnderstood => language.phrase(Phrase::LearnNotUnderstood).to_string(),
            LearningOutcome::GenerationFailed { .. } => language.phrase(Phrase::GenerationFailed).to_string(),
            LearningOutcome::Declined { .. } => language.phrase(Phrase::LearnDeclined).to_string(),
            LearningOutcome::ExecutionFailed { error, .. } => {
                language.format(Phrase::TrialFailed, &[("error", error)])
            }
            LearningOutcome::Persisted { skill } => {
                language.format(Phrase::Learned, &[("task", &skill.key)])
            }
            LearningOutcome::PersistFailed { .. } => language.phrase(Phrase::LearnedNotSaved).to_string(),
        }
    }
}

/// Generate, confirm, try, and remember
#[derive(Clone)]
pub struct SkillAcquisition {
    generator: ScriptGenerator,
    executor: ScriptExecutor,
    registry: SkillRegistry,
    approvals: ApprovalManager,
}

impl SkillAcquisition {
    pub fn new(
        generator: ScriptGenerator,
        executor: ScriptExecutor,
        registry: SkillRegistry,
        approvals: ApprovalManager,
    ) -> Self {
        Self {
            generator,
            executor,
            registry,
            approvals,
        }
    }

    pub async fn learn(&self, task: &str, language: Language, frontend: &dyn Frontend) -> LearningOutcome {
        let task = task.trim().trim_end_matches('.').trim();
        if task.is_empty() {
            return LearningOutcome::NotUnderstood;
        }
        let task = task.to_string();
        self.advance(&task, LearningState::Proposed);

        let Some(code) = self.generator.generate(&task, language).await else {
            return LearningOutcome::GenerationFailed { task };
        };

        self.advance(&task, LearningState::AwaitingConfirmation);
        let prompt = language.format(Phrase::ConfirmCode, &[("task", &task), ("code", &code)]);
        let decision = self
            .approvals
            .request(Action::new(ActionType::CodeExecution, &task), &prompt, frontend)
            .await;

        if !decision.allowed() {
            info!("Learning '{}' declined by user", task);
            return LearningOutcome::Declined { task };
        }

        self.advance(&task, LearningState::Executing);
        if let Err(e) = self.executor.run_blocking(code.clone()).await {
            warn!("Trial run for '{}' failed: {:#}", task, e);
            return LearningOutcome::ExecutionFailed {
                task,
                error: format!("{:#}", e),
            };
        }

        match self.registry.register(&task, &code) {
            Ok(skill) => LearningOutcome::Persisted { skill },
            Err(e) => {
                warn!("Could not persist skill '{}': {:#}", task, e);
                LearningOutcome::PersistFailed {
                    task,
                    error: format!("{:#}", e),
                }
            }
        }
    }

    fn advance(&self, task: &str, state: LearningState) {
        info!("Learning '{}': {:?}", task, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::transport::MockTransport;
    use crate::agent::ReasoningClient;
    use crate::assistant::ScriptedFrontend;
    use crate::config::{Config, Settings};
    use crate::skills::executor::CapabilitySet;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn acquisition_with(reply_text: &'static str, dir: &std::path::Path) -> (SkillAcquisition, SkillRegistry) {
        let mut transport = MockTransport::new();
        transport.expect_post_json().returning(move |_, _, _| {
            Ok(json!({ "candidates": [{ "content": { "parts": [{ "text": reply_text }] } }] }))
        });

        let mut config = Config::default();
        config.remote.api_key = "k".into();
        let client = ReasoningClient::new(Settings::in_memory(config), Arc::new(transport));

        let executor = ScriptExecutor::new(CapabilitySet::standard(), Duration::from_secs(5), 100_000);
        let registry = SkillRegistry::with_dir(dir.to_path_buf());
        let acquisition = SkillAcquisition::new(
            ScriptGenerator::new(client, CapabilitySet::standard()),
            executor,
            registry.clone(),
            ApprovalManager::new(),
        );
        (acquisition, registry)
    }

    #[tokio::test]
    async fn test_approved_successful_trial_is_persisted() {
        let dir = tempdir().unwrap();
        let (acquisition, registry) = acquisition_with(r#"{"code": "print(\"hi\");"}"#, dir.path());
        let frontend = ScriptedFrontend::answering(&[true]);

        let outcome = acquisition.learn("say hi", Language::English, &frontend).await;

        assert!(outcome.learned());
        assert!(registry.contains("say hi"));
        assert!(frontend.prompts()[0].contains("print(\"hi\");"));
        assert!(outcome.message(Language::English).contains("'say hi'"));
    }

    #[tokio::test]
    async fn test_declined_leaves_no_trace() {
        let dir = tempdir().unwrap();
        let (acquisition, registry) = acquisition_with(r#"{"code": "print(\"hi\");"}"#, dir.path());
        let frontend = ScriptedFrontend::answering(&[false]);

        let outcome = acquisition.learn("say hi", Language::English, &frontend).await;

        assert_eq!(outcome, LearningOutcome::Declined { task: "say hi".into() });
        assert!(registry.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_trial_is_not_persisted() {
        let dir = tempdir().unwrap();
        let (acquisition, registry) = acquisition_with(r#"{"code": "throw \"disk full\";"}"#, dir.path());
        let frontend = ScriptedFrontend::answering(&[true]);

        let outcome = acquisition.learn("fill disk", Language::Spanish, &frontend).await;

        assert!(matches!(outcome, LearningOutcome::ExecutionFailed { .. }));
        assert!(outcome.message(Language::Spanish).contains("disk full"));
        assert!(!registry.contains("fill disk"));
    }

    #[tokio::test]
    async fn test_missing_code_field_fails_generation() {
        let dir = tempdir().unwrap();
        let (acquisition, registry) = acquisition_with(r#"{"script": "1"}"#, dir.path());
        let frontend = ScriptedFrontend::answering(&[true]);

        let outcome = acquisition.learn("do things", Language::English, &frontend).await;

        assert_eq!(outcome, LearningOutcome::GenerationFailed { task: "do things".into() });
        assert!(frontend.prompts().is_empty());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_empty_task_not_understood() {
        let dir = tempdir().unwrap();
        let (acquisition, _) = acquisition_with("{}", dir.path());
        let frontend = ScriptedFrontend::answering(&[]);

        let outcome = acquisition.learn("  ", Language::English, &frontend).await;
        assert_eq!(outcome, LearningOutcome::NotUnderstood);
    }
}
