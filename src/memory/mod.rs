//! Persistent memory
//!
//! - [`facts`]: per-user natural-language facts in SQLite
//! - [`extraction`]: detached extraction of facts from conversation turns
//! - [`notes`]: the flat notes file written in note-taking mode

pub mod extraction;
pub mod facts;
pub mod notes;

pub use extraction::spawn_extraction;
pub use facts::{Fact, FactStore, NO_FACTS_SUMMARY};
pub use notes::NoteLog;
