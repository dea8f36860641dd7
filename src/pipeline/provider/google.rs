//! Google Translate.
//!
//! With an API key the official v2 endpoint is used and whole batches go in
//! one request. Without a key the keyless `translate_a/single` endpoint
//! takes one text per request and answers with nested arrays:
//!
//! ```text
//! [[["translated sentence 1","source 1",...],["translated 2","source 2",...]],null,"hi",...]
//! ```

use super::{check_status, BatchLimits};
use crate::error::ProviderError;
use crate::lang::Language;
use serde::{Deserialize, Serialize};
use tracing::debug;

const V2_ENDPOINT: &str = "https://translation.googleapis.com/language/translate/v2";
const PUBLIC_ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";

pub struct GoogleProvider {
    http: reqwest::Client,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct V2Request<'a> {
    q: &'a [String],
    target: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
    format: &'a str,
}

#[derive(Deserialize)]
struct V2Response {
    data: V2Data,
}

#[derive(Deserialize)]
struct V2Data {
    translations: Vec<V2Translation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct V2Translation {
    translated_text: String,
}

impl GoogleProvider {
    pub fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        Self { http, api_key }
    }

    pub fn limits(&self) -> BatchLimits {
        if self.api_key.is_some() {
            BatchLimits {
                max_units: 128,
                max_chars: 30_000,
            }
        } else {
            BatchLimits {
                max_units: 1,
                max_chars: 5_000,
            }
        }
    }

    pub async fn translate_batch(
        &self,
        texts: &[String],
        source: Option<Language>,
        target: Language,
    ) -> Result<Vec<String>, ProviderError> {
        match &self.api_key {
            Some(key) => self.translate_v2(key, texts, source, target).await,
            None => {
                let mut out = Vec::with_capacity(texts.len());
                for t in texts {
                    out.push(self.translate_public(t, source, target).await?);
                }
                Ok(out)
            }
        }
    }

    async fn translate_v2(
        &self,
        key: &str,
        texts: &[String],
        source: Option<Language>,
        target: Language,
    ) -> Result<Vec<String>, ProviderError> {
        let body = V2Request {
            q: texts,
            target: target.code(),
            source: source.map(|l| l.code()),
            format: "text",
        };
        let resp = self
            .http
            .post(V2_ENDPOINT)
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await?;
        let resp: V2Response = check_status(resp).await?.json().await?;
        debug!("google v2: {} translations", resp.data.translations.len());
        Ok(resp
            .data
            .translations
            .into_iter()
            .map(|t| t.translated_text)
            .collect())
    }

    async fn translate_public(
        &self,
        text: &str,
        source: Option<Language>,
        target: Language,
    ) -> Result<String, ProviderError> {
        let sl = source.map(|l| l.code()).unwrap_or("auto");
        let resp = self
            .http
            .get(PUBLIC_ENDPOINT)
            .query(&[
                ("client", "gtx"),
                ("sl", sl),
                ("tl", target.code()),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await?;
        let value: serde_json::Value = check_status(resp).await?.json().await?;
        parse_public(&value)
    }
}

/// Concatenate the translated sentence fragments of a `translate_a/single`
/// reply.
fn parse_public(value: &serde_json::Value) -> Result<String, ProviderError> {
    let sentences = value
        .get(0)
        .and_then(|v| v.as_array())
        .ok_or_else(|| ProviderError::Malformed("missing sentence array".into()))?;
    let mut out = String::new();
    for s in sentences {
        if let Some(part) = s.get(0).and_then(|p| p.as_str()) {
            out.push_str(part);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_public_reply() {
        let v = json!([[["Hello, ", "नमस्ते, ", null], ["world", "दुनिया", null]], null, "hi"]);
        assert_eq!(parse_public(&v).unwrap(), "Hello, world");
    }

    #[test]
    fn rejects_unexpected_shape() {
        let v = json!({"error": "nope"});
        assert!(matches!(parse_public(&v), Err(ProviderError::Malformed(_))));
    }

    #[test]
    fn v2_request_shape() {
        let texts = vec!["a".to_string()];
        let body = V2Request {
            q: &texts,
            target: "hi",
            source: None,
            format: "text",
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v, json!({"q": ["a"], "target": "hi", "format": "text"}));
    }

    #[test]
    fn keyed_provider_batches() {
        let p = GoogleProvider::new(reqwest::Client::new(), Some("k".into()));
        assert_eq!(p.limits().max_units, 128);
    }
}
