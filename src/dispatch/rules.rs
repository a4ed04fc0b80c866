//! Per-language command rules
//!
//! A [`RuleTable`] is an ordered list of matcher/intent pairs built once per
//! language. It is never edited in place; a language switch builds a new one.

use anyhow::{Context, Result};
use regex::Regex;

use crate::lang::Language;

/// What a matched rule asks the dispatcher to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Learn,
    OpenApp,
    CloseApp,
    WebSearch,
    YouTube,
    Music,
    Calculate,
    SystemStatus,
    Screenshot,
    Media,
    Volume,
    StartTranslator,
    StartNote,
    EndNote,
}

/// How a rule recognizes its input
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Regex searched anywhere in the normalized text
    Pattern(Regex),
    /// Any keyword occurring as a substring
    Keywords(Vec<&'static str>),
}

impl Matcher {
    fn pattern(source: &str) -> Result<Self> {
        let regex = Regex::new(&format!("(?i){}", source))
            .with_context(|| format!("Invalid rule pattern: {}", source))?;
        Ok(Matcher::Pattern(regex))
    }

    pub fn matches(&self, normalized: &str) -> bool {
        match self {
            Matcher::Pattern(regex) => regex.is_match(normalized),
            Matcher::Keywords(words) => words.iter().any(|w| normalized.contains(w)),
        }
    }

    /// The parameter a pattern captures from `text`
    ///
    /// Takes the first non-empty group and trims surrounding punctuation.
    /// Keyword matchers capture nothing.
    pub fn capture(&self, text: &str) -> Option<String> {
        let Matcher::Pattern(regex) = self else {
            return None;
        };
        let caps = regex.captures(text)?;
        caps.iter()
            .skip(1)
            .flatten()
            .map(|m| trim_param(m.as_str()))
            .find(|s| !s.is_empty())
    }
}

fn trim_param(param: &str) -> String {
    param
        .trim()
        .trim_matches(|c: char| matches!(c, '?' | '!' | '¿' | '¡' | '.' | ',' | '"' | '\''))
        .trim()
        .to_string()
}

#[derive(Debug, Clone)]
pub struct CommandRule {
    pub intent: Intent,
    pub matcher: Matcher,
}

/// Ordered rules for one language; the first match wins
#[derive(Debug, Clone)]
pub struct RuleTable {
    language: Language,
    rules: Vec<CommandRule>,
    translator_target: Regex,
}

impl RuleTable {
    pub fn for_language(language: Language) -> Result<Self> {
        let table: Vec<(Intent, Matcher)> = match language {
            Language::English => vec![
                (Intent::Learn, Matcher::pattern(r"\b(?:learn to|new skill for|teach yourself to)\s+(.+)")?),
                (Intent::OpenApp, Matcher::pattern(r"\b(?:open|launch|run)\s+(.+)")?),
                (Intent::CloseApp, Matcher::pattern(r"\b(?:close|terminate)\s+(.+)")?),
                (Intent::WebSearch, Matcher::pattern(r"\b(?:search|google|look for|information on)\s+(.+)")?),
                (Intent::YouTube, Matcher::pattern(r"\b(?:youtube|play a video|i want to watch)\s+(.+)")?),
                (Intent::Music, Matcher::pattern(r"\b(?:music|spotify|play music|listen to|play)\s+(.+)")?),
                (Intent::Calculate, Matcher::pattern(r"\b(?:calculate\s+(.+)|what is\s+([\d(.\-].*))")?),
                (Intent::SystemStatus, Matcher::Keywords(vec!["system status", "system information"])),
                (Intent::Screenshot, Matcher::Keywords(vec!["screenshot", "take a screenshot"])),
                (
                    Intent::Media,
                    Matcher::Keywords(vec!["pause", "play", "next song", "previous song", "media control"]),
                ),
                (Intent::Volume, Matcher::Keywords(vec!["volume up", "volume down", "mute"])),
                (Intent::StartTranslator, Matcher::Keywords(vec!["translator to", "translate to"])),
                (Intent::StartNote, Matcher::Keywords(vec!["take a note", "write a note"])),
                (Intent::EndNote, Matcher::Keywords(vec!["end note", "finish note"])),
            ],
            Language::Spanish => vec![
                (Intent::Learn, Matcher::pattern(r"\b(?:aprende a|nueva habilidad para|enséñate a)\s+(.+)")?),
                (Intent::OpenApp, Matcher::pattern(r"\b(?:abre|lanza|ejecuta)\s+(.+)")?),
                (Intent::CloseApp, Matcher::pattern(r"\b(?:cierra|termina)\s+(.+)")?),
                (Intent::WebSearch, Matcher::pattern(r"\b(?:busca|googlea|buscar|información de)\s+(.+)")?),
                (Intent::YouTube, Matcher::pattern(r"\b(?:youtube|pon un video|quiero ver)\s+(.+)")?),
                (Intent::Music, Matcher::pattern(r"\b(?:música|spotify|pon música|escuchar|reproduce)\s+(.+)")?),
                (Intent::Calculate, Matcher::pattern(r"\b(?:calcula\s+(.+)|cu[aá]nto es\s+([\d(.\-].*))")?),
                (Intent::SystemStatus, Matcher::Keywords(vec!["estado del sistema", "información del sistema"])),
                (Intent::Screenshot, Matcher::Keywords(vec!["captura de pantalla", "pantallazo"])),
                (
                    Intent::Media,
                    Matcher::Keywords(vec![
                        "pausa",
                        "reproduce",
                        "siguiente canción",
                        "anterior canción",
                        "control multimedia",
                    ]),
                ),
                (Intent::Volume, Matcher::Keywords(vec!["sube el volumen", "baja el volumen", "silencio", "mudo"])),
                (Intent::StartTranslator, Matcher::Keywords(vec!["traductor al", "traduce al"])),
                (Intent::StartNote, Matcher::Keywords(vec!["tomar nota", "escribe una nota"])),
                (Intent::EndNote, Matcher::Keywords(vec!["terminar nota", "finalizar nota"])),
            ],
        };

        let rules = table
            .into_iter()
            .map(|(intent, matcher)| CommandRule { intent, matcher })
            .collect();

        Ok(Self {
            language,
            rules,
            translator_target: Regex::new(r"(?i)\b(?:to|al)\s+(\w+)")?,
        })
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn rules(&self) -> &[CommandRule] {
        &self.rules
    }

    pub fn first_match(&self, normalized: &str) -> Option<&CommandRule> {
        self.rules.iter().find(|rule| rule.matcher.matches(normalized))
    }

    /// Language name following "to"/"al" in a translator command
    pub fn translator_target(&self, text: &str) -> Option<String> {
        self.translator_target
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent_of(table: &RuleTable, text: &str) -> Option<Intent> {
        table.first_match(&crate::lang::normalize(text)).map(|r| r.intent)
    }

    #[test]
    fn test_first_match_wins() {
        let table = RuleTable::for_language(Language::English).unwrap();
        assert_eq!(intent_of(&table, "open calculator and search cats"), Some(Intent::OpenApp));
        assert_eq!(intent_of(&table, "learn to open the downloads folder"), Some(Intent::Learn));
    }

    #[test]
    fn test_english_intents() {
        let table = RuleTable::for_language(Language::English).unwrap();
        assert_eq!(intent_of(&table, "Calculate 2 + 2"), Some(Intent::Calculate));
        assert_eq!(intent_of(&table, "What is 7 times 6?"), Some(Intent::Calculate));
        assert_eq!(intent_of(&table, "play music daft punk"), Some(Intent::Music));
        assert_eq!(intent_of(&table, "play"), Some(Intent::Media));
        assert_eq!(intent_of(&table, "volume up"), Some(Intent::Volume));
        assert_eq!(intent_of(&table, "translator to french"), Some(Intent::StartTranslator));
        assert_eq!(intent_of(&table, "take a note"), Some(Intent::StartNote));
        assert_eq!(intent_of(&table, "what is the meaning of life"), None);
        assert_eq!(intent_of(&table, "hello there"), None);
    }

    #[test]
    fn test_spanish_intents() {
        let table = RuleTable::for_language(Language::Spanish).unwrap();
        assert_eq!(intent_of(&table, "¿Cuánto es 5 por 3?"), Some(Intent::Calculate));
        assert_eq!(intent_of(&table, "abre firefox"), Some(Intent::OpenApp));
        assert_eq!(intent_of(&table, "buscar recetas"), Some(Intent::WebSearch));
        assert_eq!(intent_of(&table, "terminar nota"), Some(Intent::EndNote));
        assert_eq!(intent_of(&table, "traductor al francés"), Some(Intent::StartTranslator));
    }

    #[test]
    fn test_capture_reads_original_text() {
        let table = RuleTable::for_language(Language::English).unwrap();
        let rule = table.first_match("open visual studio code").unwrap();
        assert_eq!(rule.matcher.capture("Open Visual Studio Code!").as_deref(), Some("Visual Studio Code"));

        let calc = table.first_match("what is 3 x 4").unwrap();
        assert_eq!(calc.matcher.capture("What is 3 x 4?").as_deref(), Some("3 x 4"));
    }

    #[test]
    fn test_translator_target() {
        let table = RuleTable::for_language(Language::Spanish).unwrap();
        assert_eq!(table.translator_target("Traductor al Francés").as_deref(), Some("francés"));
        assert_eq!(table.translator_target("traductor"), None);
    }
}
