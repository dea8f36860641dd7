//! Prompts for the LLM translation provider.
//!
//! Centralised so prompt regressions are caught by unit tests without a
//! live model.

use crate::lang::Language;

/// System prompt for the LLM provider.
pub const TRANSLATOR_SYSTEM_PROMPT: &str = r#"You are a professional translator working between Hindi and English.

Rules:
- Translate faithfully and naturally; keep the register of the source (formal stays formal).
- Tokens of the form ⟦n⟧ are placeholders for numbers, links and codes. Copy every placeholder exactly once, unchanged, at the grammatically correct position.
- Do not add explanations, notes, transliterations or quotation marks.
- Keep proper nouns, acronyms and product names as they are unless a standard translation exists.
- Output only what is asked for."#;

/// Prompt for a batch of texts, sent as a JSON array. The model must answer
/// with a JSON array of the same length.
pub fn batch_prompt(texts_json: &str, count: usize, source: Option<Language>, target: Language) -> String {
    let from = match source {
        Some(l) => l.name(),
        None => "the detected language",
    };
    format!(
        "Translate each string in the following JSON array from {from} to {to}.\n\
         Respond with ONLY a JSON array of exactly {count} strings, in the same order, \
         with no code fences.\n\n{texts_json}",
        to = target.name(),
    )
}

/// Prompt for a single text, used when a batch reply could not be matched.
pub fn single_prompt(text: &str, source: Option<Language>, target: Language) -> String {
    let from = match source {
        Some(l) => l.name(),
        None => "the detected language",
    };
    format!(
        "Translate the following text from {from} to {to}. Respond with the translation only.\n\n{text}",
        to = target.name(),
    )
}
