//! Translation backends.
//!
//! The set is closed, so it is an enum rather than a trait object: the
//! client matches on it once per batch and every backend is visible here.
//!
//! | Provider   | Wire                               | Batch limit        |
//! |------------|------------------------------------|--------------------|
//! | Google     | v2 REST with a key, `translate_a/single` without | 128 units / 30k chars (1 unit without key) |
//! | DeepL      | `/v2/translate` JSON               | 50 units / 60k chars |
//! | OpenAI     | edgequake-llm chat, JSON array in/out | 20 units / 6k chars |
//! | Dictionary | in-memory phrase table             | unbounded          |
//!
//! Providers only translate. Retry, timeouts, batching and masking live in
//! [`crate::pipeline::client`].

pub mod deepl;
pub mod dictionary;
pub mod google;
pub mod llm;
#[cfg(test)]
pub(crate) mod scripted;

use crate::config::{ProviderKind, TranslationConfig};
use crate::error::{ProviderError, TranslateError};
use crate::lang::Language;
use edgequake_llm::{LLMProvider, ProviderFactory};
use reqwest::header::RETRY_AFTER;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub use deepl::DeepLProvider;
pub use dictionary::DictionaryProvider;
pub use google::GoogleProvider;
pub use llm::LlmProvider;

/// Default chat model when none is configured.
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// How much one request may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_units: usize,
    pub max_chars: usize,
}

/// Credentials supplied by the caller. The library never reads key files.
#[derive(Clone, Default)]
pub struct Credentials {
    pub google_api_key: Option<String>,
    pub deepl_api_key: Option<String>,
    /// Pre-built chat provider; skips edgequake-llm resolution entirely.
    pub llm_provider: Option<Arc<dyn LLMProvider>>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("google_api_key", &self.google_api_key.as_ref().map(|_| "<set>"))
            .field("deepl_api_key", &self.deepl_api_key.as_ref().map(|_| "<set>"))
            .field("llm_provider", &self.llm_provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .finish()
    }
}

impl Credentials {
    /// Read `GOOGLE_TRANSLATE_API_KEY` and `DEEPL_API_KEY`. LLM keys are
    /// resolved by edgequake-llm itself.
    pub fn from_env() -> Self {
        let non_empty = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());
        Self {
            google_api_key: non_empty("GOOGLE_TRANSLATE_API_KEY"),
            deepl_api_key: non_empty("DEEPL_API_KEY"),
            llm_provider: None,
        }
    }
}

/// The run's translation backend.
pub enum TranslationProvider {
    Google(GoogleProvider),
    DeepL(DeepLProvider),
    OpenAi(LlmProvider),
    Dictionary(DictionaryProvider),
    #[cfg(test)]
    Scripted(scripted::ScriptedProvider),
}

impl fmt::Debug for TranslationProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TranslationProvider({})", self.name())
    }
}

impl TranslationProvider {
    /// Build the configured provider. Fails with
    /// [`TranslateError::ProviderNotConfigured`] when credentials are missing.
    pub fn resolve(config: &TranslationConfig, credentials: &Credentials) -> Result<Self, TranslateError> {
        let provider = match config.provider {
            ProviderKind::Google => {
                let http = http_client(config.api_timeout_secs)?;
                TranslationProvider::Google(GoogleProvider::new(http, credentials.google_api_key.clone()))
            }
            ProviderKind::DeepL => {
                let key = credentials.deepl_api_key.clone().ok_or_else(|| {
                    TranslateError::ProviderNotConfigured {
                        provider: "deepl".into(),
                        hint: "Set DEEPL_API_KEY or pass a DeepL key in Credentials.".into(),
                    }
                })?;
                TranslationProvider::DeepL(DeepLProvider::new(http_client(config.api_timeout_secs)?, key))
            }
            ProviderKind::OpenAi => {
                TranslationProvider::OpenAi(LlmProvider::new(resolve_llm(config, credentials)?))
            }
            ProviderKind::Dictionary => {
                TranslationProvider::Dictionary(DictionaryProvider::new(&config.dictionary))
            }
        };
        info!("Translation provider: {}", provider.name());
        Ok(provider)
    }

    pub fn name(&self) -> &'static str {
        match self {
            TranslationProvider::Google(_) => "google",
            TranslationProvider::DeepL(_) => "deepl",
            TranslationProvider::OpenAi(_) => "openai",
            TranslationProvider::Dictionary(_) => "dictionary",
            #[cfg(test)]
            TranslationProvider::Scripted(_) => "scripted",
        }
    }

    pub fn limits(&self) -> BatchLimits {
        match self {
            TranslationProvider::Google(p) => p.limits(),
            TranslationProvider::DeepL(_) => DeepLProvider::LIMITS,
            TranslationProvider::OpenAi(_) => LlmProvider::LIMITS,
            TranslationProvider::Dictionary(_) => DictionaryProvider::LIMITS,
            #[cfg(test)]
            TranslationProvider::Scripted(_) => scripted::ScriptedProvider::LIMITS,
        }
    }

    /// Provider-reported confidence. Only the dictionary can vouch for its
    /// output.
    pub fn confidence(&self) -> Option<f32> {
        match self {
            TranslationProvider::Dictionary(_) => Some(1.0),
            _ => None,
        }
    }

    /// Whether a reply that does not line up with the request should be
    /// retried unit by unit.
    pub fn splits_malformed_batches(&self) -> bool {
        matches!(self, TranslationProvider::OpenAi(_))
    }

    /// Translate `texts`, one output per input, in order.
    pub async fn translate_batch(
        &self,
        texts: &[String],
        source: Option<Language>,
        target: Language,
    ) -> Result<Vec<String>, ProviderError> {
        let out = match self {
            TranslationProvider::Google(p) => p.translate_batch(texts, source, target).await?,
            TranslationProvider::DeepL(p) => p.translate_batch(texts, source, target).await?,
            TranslationProvider::OpenAi(p) => p.translate_batch(texts, source, target).await?,
            TranslationProvider::Dictionary(p) => p.translate_batch(texts),
            #[cfg(test)]
            TranslationProvider::Scripted(p) => p.translate_batch(texts)?,
        };
        if out.len() != texts.len() {
            return Err(ProviderError::Malformed(format!(
                "expected {} translations, got {}",
                texts.len(),
                out.len()
            )));
        }
        Ok(out)
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client, TranslateError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .user_agent(concat!("pdf-translate/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| TranslateError::Internal(format!("HTTP client: {e}")))
}

fn create_llm(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, TranslateError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| TranslateError::ProviderNotConfigured {
        provider: name.to_string(),
        hint: format!("{e}"),
    })
}

/// Resolve the chat provider, from most-specific to least-specific:
///
/// 1. a pre-built provider in [`Credentials::llm_provider`];
/// 2. `config.llm_backend` plus `config.model`;
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set;
/// 4. OpenAI when `OPENAI_API_KEY` is set;
/// 5. whatever [`ProviderFactory::from_env`] detects.
fn resolve_llm(config: &TranslationConfig, credentials: &Credentials) -> Result<Arc<dyn LLMProvider>, TranslateError> {
    if let Some(p) = &credentials.llm_provider {
        return Ok(Arc::clone(p));
    }

    if let Some(name) = &config.llm_backend {
        let model = config.model.as_deref().unwrap_or(match name.as_str() {
            "ollama" => "llama3",
            _ => DEFAULT_LLM_MODEL,
        });
        debug!("LLM backend {} / {}", name, model);
        return create_llm(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_llm(&prov, &model);
        }
    }

    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        if !key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_LLM_MODEL);
            return create_llm("openai", model);
        }
    }

    let (llm, _embedding) = ProviderFactory::from_env().map_err(|e| TranslateError::ProviderNotConfigured {
        provider: "openai".to_string(),
        hint: format!(
            "No LLM provider could be auto-detected from environment.\n\
             Set OPENAI_API_KEY, or choose a backend with --llm-backend.\n\
             Error: {}",
            e
        ),
    })?;
    Ok(llm)
}

/// Turn a non-2xx response into a [`ProviderError`], keeping `Retry-After`.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let retry_after = resp
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok());
    let mut body = resp.text().await.unwrap_or_default();
    if body.len() > 300 {
        let cut = (0..=300).rev().find(|&i| body.is_char_boundary(i)).unwrap_or(0);
        body.truncate(cut);
    }
    let mut err = ProviderError::from_status(status.as_u16(), body);
    if let ProviderError::RateLimited { retry_after_secs } = &mut err {
        *retry_after_secs = retry_after;
    }
    Err(err)
}
