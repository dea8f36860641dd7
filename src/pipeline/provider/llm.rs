//! Chat-model translation through edgequake-llm.
//!
//! A batch goes out as one JSON array and must come back as a JSON array of
//! the same length. Models occasionally wrap the array in code fences or add
//! a sentence around it; [`parse_array`] digs the array out. When the reply
//! still does not line up, the client retries the batch one unit at a time.
//!
//! Backend errors are mapped onto [`ProviderError`] by kind: rejected keys
//! and requests the model cannot serve fail at once, while rate limits,
//! timeouts and network trouble go back to the retry loop.

use super::BatchLimits;
use crate::error::ProviderError;
use crate::lang::Language;
use crate::prompts::{batch_prompt, single_prompt, TRANSLATOR_SYSTEM_PROMPT};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, LlmError};
use std::sync::Arc;
use tracing::debug;

pub struct LlmProvider {
    llm: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl LlmProvider {
    pub const LIMITS: BatchLimits = BatchLimits {
        max_units: 20,
        max_chars: 6_000,
    };

    pub fn new(llm: Arc<dyn LLMProvider>) -> Self {
        Self {
            llm,
            temperature: 0.3,
            max_tokens: 8192,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }

    pub async fn translate_batch(
        &self,
        texts: &[String],
        source: Option<Language>,
        target: Language,
    ) -> Result<Vec<String>, ProviderError> {
        if let [single] = texts {
            let messages = vec![
                ChatMessage::system(TRANSLATOR_SYSTEM_PROMPT),
                ChatMessage::user(single_prompt(single, source, target)),
            ];
            let response = self
                .llm
                .chat(&messages, Some(&self.options()))
                .await
                .map_err(classify)?;
            return Ok(vec![clean_single(&response.content)]);
        }

        let array = serde_json::to_string(texts).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let messages = vec![
            ChatMessage::system(TRANSLATOR_SYSTEM_PROMPT),
            ChatMessage::user(batch_prompt(&array, texts.len(), source, target)),
        ];
        let response = self
            .llm
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(classify)?;
        debug!(
            "llm batch: {} texts, {} prompt tokens, {} completion tokens",
            texts.len(),
            response.prompt_tokens,
            response.completion_tokens
        );

        let out = parse_array(&response.content)?;
        if out.len() != texts.len() {
            return Err(ProviderError::Malformed(format!(
                "model returned {} items for {} texts",
                out.len(),
                texts.len()
            )));
        }
        Ok(out)
    }
}

fn classify(e: LlmError) -> ProviderError {
    match e {
        LlmError::AuthError(detail) => ProviderError::Auth { status: 401, detail },
        LlmError::InvalidRequest(detail)
        | LlmError::ModelNotFound(detail)
        | LlmError::ConfigError(detail)
        | LlmError::NotSupported(detail) => ProviderError::BadRequest { status: 400, detail },
        e @ LlmError::TokenLimitExceeded { .. } => ProviderError::BadRequest {
            status: 400,
            detail: e.to_string(),
        },
        LlmError::RateLimited(_) => ProviderError::RateLimited {
            retry_after_secs: None,
        },
        LlmError::Timeout => ProviderError::Timeout { secs: 0 },
        LlmError::NetworkError(detail) => ProviderError::Transport(detail),
        other => ProviderError::Backend(other.to_string()),
    }
}

/// Extract a JSON string array from a chat reply.
pub(crate) fn parse_array(content: &str) -> Result<Vec<String>, ProviderError> {
    let start = content.find('[');
    let end = content.rfind(']');
    let (Some(s), Some(e)) = (start, end) else {
        return Err(ProviderError::Malformed("no JSON array in reply".into()));
    };
    if e < s {
        return Err(ProviderError::Malformed("no JSON array in reply".into()));
    }
    serde_json::from_str::<Vec<String>>(&content[s..=e])
        .map_err(|err| ProviderError::Malformed(format!("reply is not a string array: {err}")))
}

/// Strip code fences and wrapping quotes from a single-text reply.
fn clean_single(content: &str) -> String {
    let mut s = content.trim();
    if let Some(rest) = s.strip_prefix("```") {
        s = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
        s = s.trim_end().strip_suffix("```").unwrap_or(s).trim();
    }
    for (open, close) in [('"', '"'), ('“', '”')] {
        if s.len() > 1 && s.starts_with(open) && s.ends_with(close) {
            s = &s[open.len_utf8()..s.len() - close.len_utf8()];
        }
    }
    s.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_array() {
        let reply = "```json\n[\"नमस्ते\", \"दुनिया\"]\n```";
        assert_eq!(parse_array(reply).unwrap(), vec!["नमस्ते", "दुनिया"]);
    }

    #[test]
    fn parses_array_with_chatter() {
        let reply = "Here you go: [\"a\", \"b\"] Hope this helps.";
        assert_eq!(parse_array(reply).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn non_array_is_malformed() {
        assert!(matches!(parse_array("sorry"), Err(ProviderError::Malformed(_))));
        assert!(matches!(parse_array("[1, 2]"), Err(ProviderError::Malformed(_))));
    }

    #[test]
    fn backend_errors_keep_their_kind() {
        let auth = classify(LlmError::AuthError("bad key".into()));
        assert!(matches!(auth, ProviderError::Auth { status: 401, .. }));
        assert!(!auth.is_transient());

        for e in [
            LlmError::InvalidRequest("bad".into()),
            LlmError::ModelNotFound("gpt-0".into()),
            LlmError::TokenLimitExceeded { max: 10, got: 20 },
        ] {
            let mapped = classify(e);
            assert!(matches!(mapped, ProviderError::BadRequest { .. }), "{mapped:?}");
            assert!(!mapped.is_transient());
        }

        assert!(classify(LlmError::RateLimited("slow down".into())).is_transient());
        assert!(classify(LlmError::Timeout).is_transient());
        assert!(matches!(
            classify(LlmError::NetworkError("reset".into())),
            ProviderError::Transport(_)
        ));
        assert!(matches!(
            classify(LlmError::ApiError("500".into())),
            ProviderError::Backend(_)
        ));
    }

    #[test]
    fn single_reply_cleanup() {
        assert_eq!(clean_single("  \"Hello\"  "), "Hello");
        assert_eq!(clean_single("```\nनमस्ते\n```"), "नमस्ते");
        assert_eq!(clean_single("plain"), "plain");
    }
}
