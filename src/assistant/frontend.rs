//! The caller-facing seam
//!
//! Whatever surface hosts the assistant (console, GUI, voice loop) implements
//! [`Frontend`]: it answers yes/no questions and shows replies.

use async_trait::async_trait;
use std::io::{self, Write};
use std::sync::Mutex;

use crate::types::{Channel, Role};

#[async_trait]
pub trait Frontend: Send + Sync {
    /// Ask the user a yes/no question; block until answered
    async fn confirm(&self, message: &str) -> bool;

    /// Show text to the user
    fn render(&self, text: &str, role: Role, channel: Channel);
}

/// Terminal frontend: prints replies and reads y/n from stdin
#[derive(Debug, Default)]
pub struct ConsoleFrontend;

#[async_trait]
impl Frontend for ConsoleFrontend {
    async fn confirm(&self, message: &str) -> bool {
        let message = message.to_string();
        tokio::task::spawn_blocking(move || prompt_yes_no(&message))
            .await
            .unwrap_or(false)
    }

    fn render(&self, text: &str, role: Role, channel: Channel) {
        match (role, channel) {
            (_, Channel::System) => println!("\x1b[90m[{}]\x1b[0m", text),
            (Role::User, _) => println!("\x1b[36mYou:\x1b[0m {}", text),
            _ => println!("\x1b[32mAssistant:\x1b[0m {}", text),
        }
    }
}

fn prompt_yes_no(message: &str) -> bool {
    println!();
    println!("{}", message);
    println!();

    loop {
        print!("Your choice [y/n]: ");
        if io::stdout().flush().is_err() {
            return false;
        }

        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(0) | Err(_) => return false,
            Ok(_) => {}
        }

        match input.trim().to_lowercase().as_str() {
            "y" | "yes" | "s" | "si" | "sí" => return true,
            "n" | "no" => return false,
            _ => println!("Invalid option. Please enter y or n."),
        }
    }
}

/// Frontend that records everything and answers confirmations from a script
///
/// Used by tests and headless runs.
#[derive(Debug, Default)]
pub struct ScriptedFrontend {
    answers: Mutex<Vec<bool>>,
    prompts: Mutex<Vec<String>>,
    rendered: Mutex<Vec<(String, Role, Channel)>>,
}

impl ScriptedFrontend {
    /// Answers are consumed in order; once exhausted every question gets "no"
    pub fn answering(answers: &[bool]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().rev().copied().collect()),
            ..Self::default()
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn rendered(&self) -> Vec<(String, Role, Channel)> {
        self.rendered.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Frontend for ScriptedFrontend {
    async fn confirm(&self, message: &str) -> bool {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(message.to_string());
        }
        self.answers
            .lock()
            .ok()
            .and_then(|mut a| a.pop())
            .unwrap_or(false)
    }

    fn render(&self, text: &str, role: Role, channel: Channel) {
        if let Ok(mut rendered) = self.rendered.lock() {
            rendered.push((text.to_string(), role, channel));
        }
    }
}
