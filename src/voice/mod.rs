//! Voice I/O workers
//!
//! - [`speech`]: FIFO synthesis queue with interleaved voice changes
//! - [`wake`]: passive wake-phrase listener feeding the command queue
//!
//! Audio capture and synthesis engines stay behind the [`Recognizer`] and
//! [`Synthesizer`] traits.

pub mod speech;
pub mod wake;

pub use speech::{clean_for_speech, CommandSynthesizer, SpeechQueue, SpeechTask, Synthesizer};
pub use wake::{LineRecognizer, Recognizer, WakeListener};
