//! Agent module - remote reasoning
//!
//! - [`llm`]: the retrying, never-failing reasoning client
//! - [`transport`]: one HTTP round trip to the endpoint
//! - [`retry`]: backoff policy and failure classification
//! - [`prompts`]: system preambles and nested instructions

pub mod llm;
pub mod prompts;
pub mod retry;
pub mod transport;

pub use llm::{AskRequest, Preamble, ReasoningClient, Reply};
pub use retry::{RemoteError, RetryPolicy};
pub use transport::{HttpTransport, Transport};
