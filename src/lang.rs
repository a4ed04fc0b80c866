//! Localization
//!
//! Every user-facing sentence the assistant produces lives here, keyed by
//! [`Phrase`]. Templates use `{name}` placeholders filled by [`fill`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Active interaction language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "es")]
    Spanish,
}

impl Language {
    /// ISO 639-1 code
    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Spanish => "es",
        }
    }

    pub fn all() -> &'static [Language] {
        &[Language::English, Language::Spanish]
    }

    /// Phrase that wakes the assistant from passive listening
    pub fn wake_phrase(self) -> &'static str {
        match self {
            Language::English => "hey assistant",
            Language::Spanish => "oye asistente",
        }
    }

    /// Phrases that leave translation mode
    pub fn translator_exit_phrases(self) -> &'static [&'static str] {
        match self {
            Language::English => &["exit translator mode", "exit translation mode"],
            Language::Spanish => &["sal del modo traductor", "salir del modo traductor"],
        }
    }

    /// Phrases that close a note session
    pub fn note_exit_phrases(self) -> &'static [&'static str] {
        match self {
            Language::English => &["end note", "finish note"],
            Language::Spanish => &["terminar nota", "finalizar nota"],
        }
    }

    pub fn phrase(self, phrase: Phrase) -> &'static str {
        match self {
            Language::English => english(phrase),
            Language::Spanish => spanish(phrase),
        }
    }

    /// Look up a template and fill its placeholders
    pub fn format(self, phrase: Phrase, args: &[(&str, &str)]) -> String {
        fill(self.phrase(phrase), args)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" | "english" | "inglés" | "ingles" => Ok(Language::English),
            "es" | "spanish" | "español" | "espanol" => Ok(Language::Spanish),
            other => anyhow::bail!("Unsupported language: {}", other),
        }
    }
}

/// Canonical form of an utterance for matching
///
/// Drops question and exclamation marks (both orientations), lowercases and trims.
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '?' | '!' | '¿' | '¡'))
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

/// Replace `{key}` placeholders in a template
///
/// Single pass: text substituted for one placeholder is never scanned again,
/// and unknown placeholders are left as they are.
pub fn fill(template: &str, args: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let key = &after[..close];
            args.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, close))
        });

        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Identifier of every localized sentence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phrase {
    // Recognition failures
    NotUnderstood,
    RecognitionServiceDown,
    RecognitionUnknown,
    RespondFriendly,

    // Remote reasoning failures
    RemoteNoResponse,
    RemoteUnreachable,
    MissingCredential,

    // Session
    Greeting,

    // Applications
    Opening,
    OpenFailed,
    Closing,
    CloseNotFound,

    // Web
    Searching,
    SearchingVideo,
    SearchingMusic,
    BrowserFailed,

    // Arithmetic
    CalcResult,
    CalcFailed,

    // Desktop
    SystemStatus,
    SystemUnavailable,
    ScreenshotSaved,
    ScreenshotFailed,
    MediaDone,
    VolumeDone,
    DesktopFailed,

    // Translator mode
    TranslatorOn,
    TranslatorOff,
    UnknownLanguage,
    Translation,
    TranslationFailed,

    // Note mode
    NoteStarted,
    NoteSaved,
    NoteEnded,
    NoNoteInProgress,
    NoteFailed,

    // Voice output
    SpeechStopped,

    // Learned skills
    SkillDone,
    SkillFailed,

    // Skill acquisition
    LearnNotUnderstood,
    GenerationFailed,
    ConfirmCode,
    LearnDeclined,
    TrialFailed,
    Learned,
    LearnedNotSaved,
}

fn english(phrase: Phrase) -> &'static str {
    use Phrase::*;
    match phrase {
        NotUnderstood => "Sorry, I didn't understand you. Could you repeat that?",
        RecognitionServiceDown => "Sorry, the speech recognition service is not available right now.",
        RecognitionUnknown => "An unexpected error occurred while I was listening.",
        RespondFriendly => "Respond friendly: {message}",

        RemoteNoResponse => "The remote model did not respond. Check your connection.",
        RemoteUnreachable => "I can't connect to my brain. Check the connection and the API key.",
        MissingCredential => "Error: the API key for the reasoning service is not configured.",

        Greeting => "Introduce yourself very briefly as {name} and ask how you can help today.",

        Opening => "Opening {app}.",
        OpenFailed => "I couldn't open {app}.",
        Closing => "Closing {app}.",
        CloseNotFound => "I didn't find any process named {app}.",

        Searching => "Searching for '{query}' on Google.",
        SearchingVideo => "Searching YouTube for '{query}'.",
        SearchingMusic => "Searching Spotify for '{query}'.",
        BrowserFailed => "I couldn't open the browser.",

        CalcResult => "The result is {value}",
        CalcFailed => "I couldn't perform the calculation.",

        SystemStatus => "CPU at **{cpu}%**, RAM at **{ram}%**.",
        SystemUnavailable => "System information is not available on this platform.",
        ScreenshotSaved => "Screenshot saved as {file}.",
        ScreenshotFailed => "I couldn't take the screenshot: {error}",
        MediaDone => "Media command executed.",
        VolumeDone => "Volume control executed.",
        DesktopFailed => "I couldn't control the desktop: {error}",

        TranslatorOn => "Translator mode activated to {language}. Say 'exit translator mode' to finish.",
        TranslatorOff => "Translator mode deactivated.",
        UnknownLanguage => "I don't know that language.",
        Translation => "The translation is: {text}",
        TranslationFailed => "I couldn't translate that.",

        NoteStarted => "Note mode activated. Everything you say will be saved. Say 'end note' to finish.",
        NoteSaved => "Noted.",
        NoteEnded => "Note finished and saved.",
        NoNoteInProgress => "There is no note in progress.",
        NoteFailed => "I couldn't save the note.",

        SpeechStopped => "Speech output stopped.",

        SkillDone => "Done, I executed the task '{task}'.",
        SkillFailed => "I tried to use a learned skill, but it failed: {error}",

        LearnNotUnderstood => "I didn't understand what new skill you want me to learn. Try 'learn to ...'.",
        GenerationFailed => "My attempt to generate code failed. I couldn't find a solution.",
        ConfirmCode => "I have generated the following script to try '{task}'.\n\n--- CODE ---\n{code}\n--------------\n\nWARNING: Running unknown code can be risky.\nDo you want me to execute it?",
        LearnDeclined => "Okay, I will not execute the code. Canceling the operation.",
        TrialFailed => "The code executed but failed with an error: {error}. I have not learned the skill.",
        Learned => "Done! I've learned to '{task}' and will remember it for the future.",
        LearnedNotSaved => "I was able to perform the action, but I had a problem saving it for the future.",
    }
}

fn spanish(phrase: Phrase) -> &'static str {
    use Phrase::*;
    match phrase {
        NotUnderstood => "Lo siento, no te entendí. ¿Puedes repetirlo?",
        RecognitionServiceDown => "Lo siento, el servicio de reconocimiento de voz no está disponible ahora.",
        RecognitionUnknown => "Ocurrió un error inesperado mientras escuchaba.",
        RespondFriendly => "Responde amablemente: {message}",

        RemoteNoResponse => "El modelo remoto no respondió. Revisa tu conexión.",
        RemoteUnreachable => "No puedo conectar con mi cerebro. Revisa la conexión y la clave de API.",
        MissingCredential => "Error: la clave de API del servicio de razonamiento no está configurada.",

        Greeting => "Preséntate muy brevemente como {name} y pregunta en qué puedes ayudar hoy.",

        Opening => "Abriendo {app}.",
        OpenFailed => "No pude abrir {app}.",
        Closing => "Cerrando {app}.",
        CloseNotFound => "No encontré ningún proceso llamado {app}.",

        Searching => "Buscando '{query}' en Google.",
        SearchingVideo => "Buscando '{query}' en YouTube.",
        SearchingMusic => "Buscando '{query}' en Spotify.",
        BrowserFailed => "No pude abrir el navegador.",

        CalcResult => "El resultado es {value}",
        CalcFailed => "No pude realizar el cálculo.",

        SystemStatus => "CPU al **{cpu}%**, RAM al **{ram}%**.",
        SystemUnavailable => "La información del sistema no está disponible en esta plataforma.",
        ScreenshotSaved => "Captura guardada como {file}.",
        ScreenshotFailed => "No pude tomar la captura: {error}",
        MediaDone => "Comando multimedia ejecutado.",
        VolumeDone => "Control de volumen ejecutado.",
        DesktopFailed => "No pude controlar el escritorio: {error}",

        TranslatorOn => "Modo traductor activado al {language}. Di 'sal del modo traductor' para terminar.",
        TranslatorOff => "Modo traductor desactivado.",
        UnknownLanguage => "No conozco ese idioma.",
        Translation => "La traducción es: {text}",
        TranslationFailed => "No pude traducir eso.",

        NoteStarted => "Modo nota activado. Todo lo que digas se guardará. Di 'terminar nota' para finalizar.",
        NoteSaved => "Anotado.",
        NoteEnded => "Nota terminada y guardada.",
        NoNoteInProgress => "No hay ninguna nota en curso.",
        NoteFailed => "No pude guardar la nota.",

        SpeechStopped => "La salida de voz se detuvo.",

        SkillDone => "Listo, ejecuté la tarea '{task}'.",
        SkillFailed => "Intenté usar una habilidad aprendida, pero falló: {error}",

        LearnNotUnderstood => "No entendí qué nueva habilidad quieres que aprenda. Prueba con 'aprende a ...'.",
        GenerationFailed => "Mi intento de generar código falló. No encontré una solución.",
        ConfirmCode => "He generado el siguiente script para intentar '{task}'.\n\n--- CÓDIGO ---\n{code}\n--------------\n\nADVERTENCIA: Ejecutar código desconocido puede ser riesgoso.\n¿Quieres que lo ejecute?",
        LearnDeclined => "De acuerdo, no ejecutaré el código. Cancelando la operación.",
        TrialFailed => "El código se ejecutó pero falló con un error: {error}. No he aprendido la habilidad.",
        Learned => "¡Listo! He aprendido a '{task}' y lo recordaré para el futuro.",
        LearnedNotSaved => "Pude realizar la acción, pero tuve un problema al guardarla para el futuro.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_replaces_all_placeholders() {
        let text = Language::English.format(Phrase::ConfirmCode, &[("task", "open notes"), ("code", "print(1);")]);
        assert!(text.contains("'open notes'"));
        assert!(text.contains("print(1);"));
        assert!(!text.contains("{code}"));
    }

    #[test]
    fn test_fill_does_not_rescan_substituted_text() {
        let text = fill("'{task}' -> {code}", &[("task", "say {code}"), ("code", "print(1);")]);
        assert_eq!(text, "'say {code}' -> print(1);");

        assert_eq!(fill("{a}{b}", &[("a", "{b}"), ("b", "x")]), "{b}x");
        assert_eq!(fill("keep {unknown} and {", &[("task", "t")]), "keep {unknown} and {");
        assert_eq!(fill("ñ{task}ñ", &[("task", "é")]), "ñéñ");
    }

    #[test]
    fn test_normalize_strips_marks() {
        assert_eq!(normalize("  ¿Qué HORA es?  "), "qué hora es");
        assert_eq!(normalize("Open Firefox!!"), "open firefox");
    }

    #[test]
    fn test_language_parse() {
        assert_eq!("es".parse::<Language>().unwrap(), Language::Spanish);
        assert_eq!("English".parse::<Language>().unwrap(), Language::English);
        assert!("klingon".parse::<Language>().is_err());
    }

    #[test]
    fn test_language_serde_codes() {
        let json = serde_json::to_string(&Language::Spanish).unwrap();
        assert_eq!(json, "\"es\"");
    }
}
