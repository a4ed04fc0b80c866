//! Autodidact - desktop voice/text assistant library
//!
//! An assistant that:
//! - routes each utterance through an ordered, per-language rule table
//! - falls back to a search-grounded remote model with a small fact memory
//! - learns new skills as Rhai scripts, after explicit confirmation and a
//!   successful trial run
//!
//! # Example
//!
//! ```ignore
//! use autodidact::assistant::{Assistant, ConsoleFrontend};
//! use autodidact::config::Paths;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let assistant = Assistant::open(&Paths::resolve(None, None)?).await?;
//!     let reply = assistant.handle("calculate 2 + 2", &ConsoleFrontend).await;
//!     println!("{:?}", reply);
//!     Ok(())
//! }
//! ```

// Core modules (order matters for cross-module dependencies)
pub mod types;
pub mod lang;
pub mod config;
pub mod memory;
pub mod agent;
pub mod security;
pub mod skills;
pub mod tools;
pub mod dispatch;
pub mod voice;
pub mod assistant;
pub mod cli;

pub use assistant::{Assistant, CommandWorker, Frontend};
pub use config::{Config, Paths, Settings};
pub use dispatch::{Dispatcher, SessionMode};
pub use lang::Language;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Desktop assistant library", NAME, VERSION)
}

/// Truncate to at most `max` bytes without splitting a character
pub fn truncate_safe(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_safe_respects_char_boundaries() {
        assert_eq!(truncate_safe("hello", 10), "hello");
        assert_eq!(truncate_safe("hello", 3), "hel");
        assert_eq!(truncate_safe("añb", 2), "a");
    }

    #[test]
    fn test_info() {
        assert!(info().starts_with("autodidact v"));
    }
}
