//! Local capabilities behind the command rules

pub mod calc;
pub mod desktop;
pub mod translate;

pub use desktop::{Desktop, DesktopCall, MediaKey, RecordingDesktop, SystemDesktop, SystemStatus};
pub use translate::{language_code, Translator, WebTranslator};
