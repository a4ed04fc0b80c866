//! Learned skills
//!
//! - [`registry`]: task phrase → script mapping on disk
//! - [`executor`]: Rhai engine with an explicit capability allow-list
//! - [`generator`]: asks the remote model for a script
//! - [`acquisition`]: the confirm-then-try-then-remember workflow

pub mod acquisition;
pub mod executor;
pub mod generator;
pub mod registry;

pub use acquisition::{LearningOutcome, LearningState, SkillAcquisition};
pub use executor::{Capability, CapabilitySet, ScriptExecutor, ScriptOutcome};
pub use generator::ScriptGenerator;
pub use registry::{LearnedSkill, SkillRegistry};
