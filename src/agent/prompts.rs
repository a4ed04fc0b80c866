//! Prompt templates sent to the reasoning endpoint

use crate::lang::Language;

fn language_name(language: Language) -> &'static str {
    match language {
        Language::English => "English",
        Language::Spanish => "Spanish",
    }
}

/// System preamble for open conversation
///
/// `facts` is the verbatim summary from the fact store.
pub fn persona(name: &str, language: Language, facts: &str) -> String {
    format!(
        r#"You are {name}, a friendly and helpful virtual assistant running on the user's computer.
Always answer in {lang}.

CONTEXTUAL MEMORY:
{facts}

Use this memory naturally to personalize your answers. Never mention a database, stored facts or that you keep a memory about the user.
Be concise: your answers may be read aloud."#,
        name = name,
        lang = language_name(language),
        facts = facts,
    )
}

/// Instruction for pulling durable user facts out of one exchange
pub fn fact_extraction(input: &str, output: &str) -> String {
    format!(
        r#"You are an information extractor. Read the following exchange between a user and an assistant and extract short, durable facts about the USER (name, preferences, profession, location, relationships, plans).

Rules:
- Each fact is one short sentence in the third person, e.g. "The user likes jazz".
- Ignore facts about the assistant and anything temporary or trivial.
- If there is nothing worth remembering, return an empty JSON list: []

USER: {input}
ASSISTANT: {output}"#
    )
}

/// Instruction for writing a learned-skill script
///
/// `capabilities` lists the functions the script may call, one per line.
pub fn code_generation(task: &str, capabilities: &str, language: Language) -> String {
    format!(
        r#"You are an expert author of Rhai scripts. Write a script that accomplishes this task on the user's computer:

TASK: {task}

Rules:
1. The script must be self-contained and run top to bottom.
2. You may ONLY call the following functions plus Rhai's built-in language features:
{capabilities}
3. Do not try to install packages, import modules or call `eval`.
4. Do not define functions unless the task genuinely needs them.
5. If the script reports something to the user, use `print`. Messages must be in {lang}.
6. Return JSON with a single key "code" whose value is the complete script."#,
        task = task,
        capabilities = capabilities,
        lang = language_name(language),
    )
}
