//! DeepL `/v2/translate`.
//!
//! Free-tier keys end in `:fx` and must use `api-free.deepl.com`. DeepL
//! insists on a regional variant for English targets; `EN` is sent as
//! `EN-US`.

use super::{check_status, BatchLimits};
use crate::error::ProviderError;
use crate::lang::Language;
use serde::{Deserialize, Serialize};

const PRO_ENDPOINT: &str = "https://api.deepl.com/v2/translate";
const FREE_ENDPOINT: &str = "https://api-free.deepl.com/v2/translate";

pub struct DeepLProvider {
    http: reqwest::Client,
    api_key: String,
    endpoint: &'static str,
}

#[derive(Serialize)]
struct Request<'a> {
    text: &'a [String],
    target_lang: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_lang: Option<&'a str>,
}

#[derive(Deserialize)]
struct Response {
    translations: Vec<Translation>,
}

#[derive(Deserialize)]
struct Translation {
    text: String,
}

impl DeepLProvider {
    pub const LIMITS: BatchLimits = BatchLimits {
        max_units: 50,
        max_chars: 60_000,
    };

    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        let endpoint = endpoint_for(&api_key);
        Self {
            http,
            api_key,
            endpoint,
        }
    }

    pub async fn translate_batch(
        &self,
        texts: &[String],
        source: Option<Language>,
        target: Language,
    ) -> Result<Vec<String>, ProviderError> {
        let body = Request {
            text: texts,
            target_lang: target_code(target),
            source_lang: source.map(source_code),
        };
        let resp = self
            .http
            .post(self.endpoint)
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .json(&body)
            .send()
            .await?;
        let resp: Response = check_status(resp).await?.json().await?;
        Ok(resp.translations.into_iter().map(|t| t.text).collect())
    }
}

fn endpoint_for(key: &str) -> &'static str {
    if key.trim_end().ends_with(":fx") {
        FREE_ENDPOINT
    } else {
        PRO_ENDPOINT
    }
}

fn target_code(lang: Language) -> &'static str {
    match lang {
        Language::English => "EN-US",
        Language::Hindi => "HI",
    }
}

fn source_code(lang: Language) -> &'static str {
    match lang {
        Language::English => "EN",
        Language::Hindi => "HI",
    }
}
