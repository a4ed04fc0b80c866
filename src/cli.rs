//! CLI interface for autodidact

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::assistant::{Assistant, CommandWorker, ConsoleFrontend, Frontend};
use crate::config::{Config, Paths, Settings};
use crate::lang::Language;
use crate::memory::FactStore;
use crate::skills::SkillRegistry;
use crate::types::{Channel, Role};
use crate::voice::{CommandSynthesizer, LineRecognizer, SpeechQueue, WakeListener};

#[derive(Parser)]
#[command(name = "autodidact")]
#[command(about = "Voice and text desktop assistant that learns new skills", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for facts, skills, notes and screenshots
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive console session (default)
    Chat,
    /// Handle a single command and print the reply
    Ask {
        /// The command text
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Show or change configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Manage learned skills
    Skills {
        #[command(subcommand)]
        command: SkillCommands,
    },
    /// Inspect remembered facts
    Facts {
        #[command(subcommand)]
        command: FactCommands,
    },
    /// Wake-phrase listening; each stdin line is one recognized utterance
    Listen,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the current configuration (API key masked)
    Show,
    /// Store the API key for the reasoning service
    SetKey { key: String },
    /// Switch the interaction language (en, es)
    Language { language: Language },
    /// Rename the assistant
    Name { name: String },
    /// Set the user identity used for remembered facts
    User { name: String },
}

#[derive(Subcommand)]
pub enum SkillCommands {
    /// List learned skills
    List,
    /// Forget a learned skill and delete its script
    Forget {
        #[arg(required = true, trailing_var_arg = true)]
        key: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum FactCommands {
    /// List facts about the current user, newest first
    List,
}

pub async fn run(cli: Cli) -> Result<()> {
    let paths = Paths::resolve(cli.config, cli.data_dir)?;

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_chat(&paths).await,
        Commands::Ask { text } => {
            let assistant = Assistant::open(&paths).await?;
            let frontend = ConsoleFrontend;
            if let Some(reply) = assistant.handle(&text.join(" "), &frontend).await {
                println!("{}", reply);
            }
            Ok(())
        }
        Commands::Config { command } => run_config(&paths, command),
        Commands::Skills { command } => run_skills(&paths, command),
        Commands::Facts { command } => run_facts(&paths, command).await,
        Commands::Listen => run_listen(&paths).await,
    }
}

async fn run_chat(paths: &Paths) -> Result<()> {
    let assistant = Assistant::open(paths).await?;
    let frontend = ConsoleFrontend;

    println!("\x1b[1m{}\x1b[0m  (/help for commands, /quit to exit)", assistant.settings().assistant_name());
    println!();
    let greeting = assistant.greet().await;
    frontend.render(&greeting, Role::Assistant, Channel::Conversation);

    let config = rustyline::Config::builder()
        .edit_mode(rustyline::EditMode::Emacs)
        .auto_add_history(true)
        .build();
    let mut rl = rustyline::DefaultEditor::with_config(config).context("Failed to start line editor")?;

    loop {
        let line = match rl.readline("\x1b[32m❯\x1b[0m ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted) => continue,
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(command) = input.strip_prefix('/') {
            if !handle_slash(command, &assistant, &frontend).await {
                break;
            }
            continue;
        }

        if let Some(reply) = assistant.handle(input, &frontend).await {
            frontend.render(&reply, Role::Assistant, Channel::Conversation);
        }
    }

    Ok(())
}

/// Returns false when the session should end
async fn handle_slash(command: &str, assistant: &Assistant, frontend: &ConsoleFrontend) -> bool {
    let mut parts = command.split_whitespace();
    match parts.next().unwrap_or_default() {
        "quit" | "exit" | "q" => return false,
        "help" => {
            println!("  /lang <en|es>   switch language");
            println!("  /skills         list learned skills");
            println!("  /facts          list remembered facts");
            println!("  /mode           show the session mode");
            println!("  /quit           leave");
        }
        "lang" => match parts.next().map(str::parse::<Language>) {
            Some(Ok(language)) => match assistant.set_language(language) {
                Ok(()) => frontend.render(&format!("Language: {}", language), Role::System, Channel::System),
                Err(e) => frontend.render(&format!("Language switched but not saved: {:#}", e), Role::System, Channel::System),
            },
            Some(Err(e)) => frontend.render(&e.to_string(), Role::System, Channel::System),
            None => frontend.render("Usage: /lang <en|es>", Role::System, Channel::System),
        },
        "skills" => print_skills(assistant.dispatcher().registry()),
        "facts" => {
            let dispatcher = assistant.dispatcher();
            if let Err(e) = print_facts(dispatcher.facts(), &dispatcher.settings().user_id()).await {
                frontend.render(&format!("{:#}", e), Role::System, Channel::System);
            }
        }
        "mode" => {
            let mode = assistant.dispatcher().mode();
            frontend.render(&format!("{:?}", mode), Role::System, Channel::System);
        }
        other => frontend.render(&format!("Unknown command: /{}", other), Role::System, Channel::System),
    }
    true
}

fn run_config(paths: &Paths, command: ConfigCommands) -> Result<()> {
    let settings = Settings::open(&paths.config_file)?;

    match command {
        ConfigCommands::Show => {
            let mut config: Config = settings.snapshot();
            config.remote.api_key = mask_key(&config.remote.api_key);
            println!("# {}", paths.config_file.display());
            println!("{}", toml::to_string_pretty(&config)?);
            println!("# data: {}", paths.data_dir.display());
        }
        ConfigCommands::SetKey { key } => {
            settings.set_api_key(key.trim())?;
            println!("API key saved.");
        }
        ConfigCommands::Language { language } => {
            settings.set_language(language)?;
            println!("Language set to {}.", language);
        }
        ConfigCommands::Name { name } => {
            settings.set_assistant_name(&name)?;
            println!("Assistant renamed to {}.", name);
        }
        ConfigCommands::User { name } => {
            settings.set_user_name(&name)?;
            println!("User set to {}.", settings.user_id());
        }
    }
    Ok(())
}

fn run_skills(paths: &Paths, command: SkillCommands) -> Result<()> {
    let registry = SkillRegistry::load(paths.skills_dir());

    match command {
        SkillCommands::List => print_skills(&registry),
        SkillCommands::Forget { key } => {
            let key = key.join(" ");
            if registry.forget(&key)? {
                println!("Forgot '{}'.", SkillRegistry::normalize_key(&key));
            } else {
                println!("No skill named '{}'.", key);
            }
        }
    }
    Ok(())
}

async fn run_facts(paths: &Paths, command: FactCommands) -> Result<()> {
    let settings = Settings::open(&paths.config_file)?;
    let store = FactStore::open(paths.facts_db()).await?;

    match command {
        FactCommands::List => print_facts(&store, &settings.user_id()).await,
    }
}

async fn run_listen(paths: &Paths) -> Result<()> {
    let assistant = Assistant::open(paths).await?;
    let settings = assistant.settings().clone();

    let (speech, speech_worker) = SpeechQueue::spawn(CommandSynthesizer::new(settings.language(), settings.voice_id()));
    let frontend: Arc<dyn Frontend> = Arc::new(ConsoleFrontend);
    let (worker, worker_handle) = CommandWorker::spawn(assistant.clone(), frontend, Some(speech.clone()));

    let greeting = assistant.greet().await;
    println!("{}", greeting);
    if settings.tts_enabled() {
        speech.say(&greeting);
    }

    let recognizer = Arc::new(LineRecognizer::new(std::io::BufReader::new(std::io::stdin())));
    let listener = WakeListener::new(recognizer, settings.clone());
    println!("Listening for '{}'. Ctrl-D to stop.", settings.language().wake_phrase());
    listener.run(worker.sender()).await;

    drop(worker);
    drop(speech);
    worker_handle.await?;
    speech_worker.await?;
    Ok(())
}

fn print_skills(registry: &SkillRegistry) {
    let skills = registry.list();
    if skills.is_empty() {
        println!("No learned skills yet.");
        return;
    }
    println!("Learned skills ({}):", skills.len());
    for skill in skills {
        println!("  {:<40} {}", skill.key, skill.script_path.display());
    }
}

async fn print_facts(store: &FactStore, user_id: &str) -> Result<()> {
    let facts = store.list_facts(user_id).await?;
    if facts.is_empty() {
        println!("Nothing remembered about {} yet.", user_id);
        return Ok(());
    }
    println!("Facts about {} ({}):", user_id, facts.len());
    for fact in facts {
        println!("  [{}] {}", fact.timestamp.format("%Y-%m-%d %H:%M"), fact.fact);
    }
    Ok(())
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    match chars.len() {
        0 => String::new(),
        n if n <= 8 => "*".repeat(n),
        n => format!("{}…{}", chars[..4].iter().collect::<String>(), chars[n - 4..].iter().collect::<String>()),
    }
}
