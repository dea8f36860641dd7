//! Batch translation with masking, retry and bounded concurrency.
//!
//! ## Flow
//!
//! 1. Each unit gets its `(source, target)` pair. Units that need no
//!    translation (same language, formula blocks, only protected text) are
//!    marked `Skipped` without a provider call.
//! 2. Protected spans are replaced by `⟦n⟧` placeholders.
//! 3. Units are grouped by language pair and packed into batches up to the
//!    provider's unit and character limits.
//! 4. Batches run through `buffer_unordered(max_workers)`.
//! 5. Output is normalised, unmasked and put back in submission order.
//!
//! ## Retry Strategy
//!
//! Transient failures (429, timeouts, transport errors, 5xx) back off
//! `retry_backoff_ms * 2^(attempt-1)`: with 500 ms base and 3 retries the
//! wait sequence is 500 ms → 1 s → 2 s. A `Retry-After` header replaces the
//! computed delay. Auth, quota and bad-request errors fail at once.

use crate::config::TranslationConfig;
use crate::context::CancelSignal;
use crate::error::{MaskingError, ProviderError};
use crate::lang::{resolve_pair, Language};
use crate::pipeline::mask::{is_protected_only, mask, unmask, Masked};
use crate::pipeline::postprocess::normalise_translation;
use crate::pipeline::provider::{BatchLimits, TranslationProvider};
use crate::pipeline::units::TranslationUnit;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Outcome of one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationStatus {
    Translated,
    /// No provider call was needed; `text` is the source text.
    Skipped,
    /// Retries exhausted or a non-transient error; `text` is the source text.
    Failed { reason: String },
}

/// One result per submitted unit, in submission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationResult {
    pub unit_id: usize,
    pub text: String,
    pub status: TranslationStatus,
    pub provider: String,
    pub confidence: Option<f32>,
    pub latency_ms: u64,
    pub detected_source: Option<Language>,
    /// The source contained a placeholder delimiter and was sent unmasked.
    pub masking_skipped: bool,
}

impl TranslationResult {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, TranslationStatus::Failed { .. })
    }
}

/// Shared, read-only translation client for one run.
#[derive(Debug, Clone)]
pub struct TranslationClient {
    provider: Arc<TranslationProvider>,
    source_lang: Option<Language>,
    max_workers: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout: Duration,
}

/// A unit that will be sent to the provider.
struct Pending {
    index: usize,
    masked: Masked,
    masking_skipped: bool,
    source: Option<Language>,
    target: Language,
}

struct Batch {
    source: Option<Language>,
    target: Language,
    /// Indices into the pending list.
    items: Vec<usize>,
}

enum Outcome {
    Done(String),
    Failed(ProviderError),
    Cancelled,
}

impl From<Result<String, ProviderError>> for Outcome {
    fn from(r: Result<String, ProviderError>) -> Self {
        match r {
            Ok(t) => Outcome::Done(t),
            Err(e) => Outcome::Failed(e),
        }
    }
}

/// `(pending index, outcome, latency_ms)` per unit of a batch.
type BatchOutcome = Vec<(usize, Outcome, u64)>;

impl TranslationClient {
    pub fn new(provider: Arc<TranslationProvider>, config: &TranslationConfig) -> Self {
        Self {
            provider,
            source_lang: config.source_lang,
            max_workers: config.max_workers.max(1),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout: Duration::from_secs(config.api_timeout_secs.max(1)),
        }
    }

    pub fn provider(&self) -> &TranslationProvider {
        &self.provider
    }

    /// Translate `units`. Never fails as a whole: each unit ends up
    /// `Translated`, `Skipped` or `Failed`.
    ///
    /// Batches not yet dispatched when `cancel` fires are reported as
    /// `Failed` with reason "cancelled".
    pub async fn translate_batch(
        &self,
        units: &[TranslationUnit],
        cancel: &CancelSignal,
    ) -> Vec<TranslationResult> {
        let provider_name = self.provider.name().to_string();
        let mut results: Vec<Option<TranslationResult>> = vec![None; units.len()];
        let mut pending: Vec<Pending> = Vec::new();

        for (index, unit) in units.iter().enumerate() {
            let (source, target) = resolve_pair(&unit.text, self.source_lang, unit.target_lang);
            let skip = !unit.is_translatable()
                || source == Some(target)
                || unit.text.trim().is_empty()
                || is_protected_only(&unit.text, &unit.protected);
            if skip {
                results[index] = Some(TranslationResult {
                    unit_id: unit.id,
                    text: unit.text.clone(),
                    status: TranslationStatus::Skipped,
                    provider: provider_name.clone(),
                    confidence: None,
                    latency_ms: 0,
                    detected_source: source,
                    masking_skipped: false,
                });
                continue;
            }

            let (masked, masking_skipped) = match mask(&unit.text, &unit.protected) {
                Ok(m) => (m, false),
                Err(MaskingError::Collision { marker }) => {
                    warn!(
                        "Page {} unit {}: text contains {:?}; sending unmasked",
                        unit.page_index + 1,
                        unit.id,
                        marker
                    );
                    (Masked::plain(&unit.text), true)
                }
            };
            pending.push(Pending {
                index,
                masked,
                masking_skipped,
                source,
                target,
            });
        }

        let batches = plan_batches(&pending, self.provider.limits());
        debug!(
            "{} units: {} skipped, {} in {} batches via {}",
            units.len(),
            units.len() - pending.len(),
            pending.len(),
            batches.len(),
            provider_name
        );

        let outcomes: Vec<BatchOutcome> = stream::iter(batches)
            .map(|batch| {
                let pending = &pending;
                async move {
                    if cancel.is_cancelled() {
                        return batch.items.iter().map(|&i| (i, Outcome::Cancelled, 0)).collect();
                    }
                    self.run_batch(&batch, pending).await
                }
            })
            .buffer_unordered(self.max_workers)
            .collect()
            .await;

        let confidence = self.provider.confidence();
        for (p_index, outcome, latency_ms) in outcomes.into_iter().flatten() {
            let p = &pending[p_index];
            let unit = &units[p.index];
            let (text, status, confidence) = match outcome {
                Outcome::Done(translated) => {
                    let normalised = normalise_translation(&translated);
                    (
                        unmask(&normalised, &p.masked),
                        TranslationStatus::Translated,
                        confidence,
                    )
                }
                Outcome::Failed(e) => {
                    let reason = e.to_string();
                    (unit.text.clone(), TranslationStatus::Failed { reason }, None)
                }
                Outcome::Cancelled => {
                    let reason = "cancelled".to_string();
                    (unit.text.clone(), TranslationStatus::Failed { reason }, None)
                }
            };
            results[p.index] = Some(TranslationResult {
                unit_id: unit.id,
                text,
                status,
                provider: provider_name.clone(),
                confidence,
                latency_ms,
                detected_source: p.source,
                masking_skipped: p.masking_skipped,
            });
        }

        results
            .into_iter()
            .zip(units)
            .map(|(r, unit)| {
                r.unwrap_or_else(|| TranslationResult {
                    unit_id: unit.id,
                    text: unit.text.clone(),
                    status: TranslationStatus::Failed {
                        reason: "no result produced".into(),
                    },
                    provider: provider_name.clone(),
                    confidence: None,
                    latency_ms: 0,
                    detected_source: None,
                    masking_skipped: false,
                })
            })
            .collect()
    }

    async fn run_batch(&self, batch: &Batch, pending: &[Pending]) -> BatchOutcome {
        let texts: Vec<String> = batch
            .items
            .iter()
            .map(|&i| pending[i].masked.text.clone())
            .collect();
        let start = Instant::now();

        match self.call_with_retry(&texts, batch.source, batch.target).await {
            Ok(out) => {
                let ms = start.elapsed().as_millis() as u64;
                batch
                    .items
                    .iter()
                    .zip(out)
                    .map(|(&i, t)| (i, Outcome::Done(t), ms))
                    .collect()
            }
            Err(ProviderError::Malformed(detail))
                if texts.len() > 1 && self.provider.splits_malformed_batches() =>
            {
                warn!(
                    "Batch of {} did not line up ({}); retrying unit by unit",
                    texts.len(),
                    detail
                );
                let mut out = Vec::with_capacity(texts.len());
                for (&i, text) in batch.items.iter().zip(&texts) {
                    let started = Instant::now();
                    let r = self
                        .call_with_retry(std::slice::from_ref(text), batch.source, batch.target)
                        .await
                        .and_then(|mut v| {
                            v.pop()
                                .ok_or_else(|| ProviderError::Malformed("empty reply".into()))
                        });
                    out.push((i, r.into(), started.elapsed().as_millis() as u64));
                }
                out
            }
            Err(e) => {
                let ms = start.elapsed().as_millis() as u64;
                batch
                    .items
                    .iter()
                    .map(|&i| (i, Outcome::Failed(e.clone()), ms))
                    .collect()
            }
        }
    }

    async fn call_with_retry(
        &self,
        texts: &[String],
        source: Option<Language>,
        target: Language,
    ) -> Result<Vec<String>, ProviderError> {
        let mut last_err = ProviderError::Backend("no attempt made".into());

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(attempt, self.retry_backoff_ms, &last_err);
                warn!(
                    "Provider {}: retry {}/{} after {}ms",
                    self.provider.name(),
                    attempt,
                    self.max_retries,
                    delay.as_millis()
                );
                sleep(delay).await;
            }

            match timeout(self.api_timeout, self.provider.translate_batch(texts, source, target)).await {
                Ok(Ok(out)) => return Ok(out),
                Ok(Err(e)) => {
                    warn!(
                        "Provider {}: attempt {} failed: {}",
                        self.provider.name(),
                        attempt + 1,
                        e
                    );
                    if !e.is_transient() {
                        return Err(e);
                    }
                    last_err = e;
                }
                Err(_) => {
                    let secs = self.api_timeout.as_secs();
                    warn!(
                        "Provider {}: attempt {} timed out after {}s",
                        self.provider.name(),
                        attempt + 1,
                        secs
                    );
                    last_err = ProviderError::Timeout { secs };
                }
            }
        }

        Err(last_err)
    }
}

/// Delay before retry `attempt` (1-based).
fn backoff_delay(attempt: u32, base_ms: u64, last_err: &ProviderError) -> Duration {
    if let ProviderError::RateLimited {
        retry_after_secs: Some(secs),
    } = last_err
    {
        return Duration::from_secs(*secs);
    }
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(base_ms.saturating_mul(factor))
}

/// Group pending units by language pair and pack each group into batches.
/// Groups appear in order of first occurrence; within a group order is kept.
fn plan_batches(pending: &[Pending], limits: BatchLimits) -> Vec<Batch> {
    let mut groups: Vec<((Option<Language>, Language), Vec<usize>)> = Vec::new();
    for (i, p) in pending.iter().enumerate() {
        let key = (p.source, p.target);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, items)) => items.push(i),
            None => groups.push((key, vec![i])),
        }
    }

    let max_units = limits.max_units.max(1);
    let mut batches = Vec::new();
    for ((source, target), items) in groups {
        let mut current: Vec<usize> = Vec::new();
        let mut chars = 0usize;
        for i in items {
            let len = pending[i].masked.text.chars().count();
            let full = current.len() >= max_units || chars.saturating_add(len) > limits.max_chars;
            if full && !current.is_empty() {
                batches.push(Batch {
                    source,
                    target,
                    items: std::mem::take(&mut current),
                });
                chars = 0;
            }
            current.push(i);
            chars = chars.saturating_add(len);
        }
        if !current.is_empty() {
            batches.push(Batch {
                source,
                target,
                items: current,
            });
        }
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use crate::geometry::Rect;
    use crate::page::BlockLabel;
    use crate::pipeline::mask::SpanFinder;
    use crate::pipeline::provider::scripted::ScriptedProvider;
    use crate::pipeline::provider::Credentials;
    use std::collections::BTreeMap;

    fn unit(id: usize, text: &str, target: Option<Language>) -> TranslationUnit {
        let finder = SpanFinder::new(&Default::default()).unwrap();
        TranslationUnit {
            id,
            page_index: 0,
            block_ids: vec![id],
            part: 0,
            text: text.to_string(),
            regions: vec![Rect::new(0.0, 0.0, 100.0, 20.0)],
            font_size: 12.0,
            bold: false,
            color: [0, 0, 0],
            rank: id,
            column: None,
            label: BlockLabel::Paragraph,
            target_lang: target,
            protected: finder.find(text),
        }
    }

    fn pending(text: &str, source: Language, target: Language) -> Pending {
        Pending {
            index: 0,
            masked: Masked::plain(text),
            masking_skipped: false,
            source: Some(source),
            target,
        }
    }

    fn dictionary_client() -> TranslationClient {
        let mut table = BTreeMap::new();
        table.insert("call".to_string(), "कॉल करें".to_string());
        table.insert("now".to_string(), "अभी".to_string());
        table.insert("hello".to_string(), "नमस्ते".to_string());
        let config = TranslationConfig::builder()
            .provider(ProviderKind::Dictionary)
            .dictionary(table)
            .build()
            .unwrap();
        let provider = TranslationProvider::resolve(&config, &Credentials::default()).unwrap();
        TranslationClient::new(Arc::new(provider), &config)
    }

    fn scripted_client(errors: Vec<ProviderError>) -> TranslationClient {
        let config = TranslationConfig::builder()
            .max_retries(2)
            .retry_backoff_ms(1)
            .build()
            .unwrap();
        let provider = TranslationProvider::Scripted(ScriptedProvider::failing(errors));
        TranslationClient::new(Arc::new(provider), &config)
    }

    fn calls(client: &TranslationClient) -> usize {
        match client.provider() {
            TranslationProvider::Scripted(p) => p.calls(),
            other => panic!("not scripted: {other:?}"),
        }
    }

    fn server_error() -> ProviderError {
        ProviderError::Server {
            status: 503,
            body: "busy".into(),
        }
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let client = scripted_client(vec![server_error(), ProviderError::Transport("reset".into())]);
        let out = client
            .translate_batch(&[unit(0, "hello", None)], &CancelSignal::default())
            .await;
        assert_eq!(calls(&client), 3);
        assert_eq!(out[0].status, TranslationStatus::Translated);
        assert_eq!(out[0].text, "HELLO");
    }

    #[tokio::test]
    async fn exhausted_retries_fail_with_source_text() {
        let client = scripted_client(vec![server_error(), server_error(), server_error(), server_error()]);
        let out = client
            .translate_batch(&[unit(0, "hello", None)], &CancelSignal::default())
            .await;
        assert_eq!(calls(&client), 3);
        assert!(out[0].is_failed());
        assert_eq!(out[0].text, "hello");
        match &out[0].status {
            TranslationStatus::Failed { reason } => assert!(reason.contains("503"), "{reason}"),
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[tokio::test]
    async fn auth_errors_are_not_retried() {
        let client = scripted_client(vec![ProviderError::Auth {
            status: 401,
            detail: "bad key".into(),
        }]);
        let out = client
            .translate_batch(&[unit(0, "hello", None)], &CancelSignal::default())
            .await;
        assert_eq!(calls(&client), 1);
        assert!(out[0].is_failed());
        assert_eq!(out[0].text, "hello");
    }

    #[test]
    fn backoff_doubles() {
        let err = ProviderError::Timeout { secs: 1 };
        assert_eq!(backoff_delay(1, 500, &err), Duration::from_millis(500));
        assert_eq!(backoff_delay(2, 500, &err), Duration::from_millis(1000));
        assert_eq!(backoff_delay(3, 500, &err), Duration::from_millis(2000));
    }

    #[test]
    fn retry_after_overrides_backoff() {
        let err = ProviderError::RateLimited {
            retry_after_secs: Some(7),
        };
        assert_eq!(backoff_delay(1, 500, &err), Duration::from_secs(7));
    }

    #[test]
    fn batches_respect_limits_and_pairs() {
        let p = vec![
            pending("aaaa", Language::English, Language::Hindi),
            pending("नमस्ते", Language::Hindi, Language::English),
            pending("bbbb", Language::English, Language::Hindi),
            pending("cccc", Language::English, Language::Hindi),
        ];
        let limits = BatchLimits {
            max_units: 2,
            max_chars: 1000,
        };
        let batches = plan_batches(&p, limits);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].items, vec![0, 2]);
        assert_eq!(batches[1].items, vec![3]);
        assert_eq!(batches[2].items, vec![1]);
    }

    #[test]
    fn oversized_text_gets_its_own_batch() {
        let p = vec![
            pending("aaaaaaaaaa", Language::English, Language::Hindi),
            pending("bb", Language::English, Language::Hindi),
        ];
        let limits = BatchLimits {
            max_units: 10,
            max_chars: 5,
        };
        let batches = plan_batches(&p, limits);
        assert_eq!(batches.len(), 2);
    }

    #[tokio::test]
    async fn keeps_protected_number() {
        let client = dictionary_client();
        let units = vec![unit(0, "Call 555-1234 now", None)];
        let out = client.translate_batch(&units, &CancelSignal::default()).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].status, TranslationStatus::Translated);
        assert!(out[0].text.contains("555-1234"), "got {}", out[0].text);
        assert!(out[0].text.contains("अभी"));
        assert_eq!(out[0].detected_source, Some(Language::English));
    }

    #[tokio::test]
    async fn skips_same_language_and_numbers_only() {
        let client = dictionary_client();
        let units = vec![
            unit(0, "hello", Some(Language::English)),
            unit(1, "2024-01-05", None),
            unit(2, "hello", None),
        ];
        let out = client.translate_batch(&units, &CancelSignal::default()).await;
        assert_eq!(out[0].status, TranslationStatus::Skipped);
        assert_eq!(out[1].status, TranslationStatus::Skipped);
        assert_eq!(out[1].text, "2024-01-05");
        assert_eq!(out[2].status, TranslationStatus::Translated);
        assert_eq!(out[2].text, "नमस्ते");
    }

    #[tokio::test]
    async fn results_in_submission_order() {
        let client = dictionary_client();
        let units: Vec<_> = (0..20)
            .map(|i| unit(i, if i % 2 == 0 { "hello" } else { "नमस्ते" }, None))
            .collect();
        let out = client.translate_batch(&units, &CancelSignal::default()).await;
        let ids: Vec<_> = out.iter().map(|r| r.unit_id).collect();
        assert_eq!(ids, (0..20).collect::<Vec<_>>());
        assert_eq!(out[1].text, "hello");
    }

    #[tokio::test]
    async fn collision_skips_masking_only() {
        let client = dictionary_client();
        let units = vec![unit(0, "hello ⟦0⟧ 42", None)];
        let out = client.translate_batch(&units, &CancelSignal::default()).await;
        assert!(out[0].masking_skipped);
        assert_eq!(out[0].status, TranslationStatus::Translated);
    }

    #[tokio::test]
    async fn cancelled_before_dispatch() {
        let client = dictionary_client();
        let cancel = CancelSignal::default();
        cancel.cancel();
        let out = client.translate_batch(&[unit(0, "hello", None)], &cancel).await;
        assert_eq!(
            out[0].status,
            TranslationStatus::Failed {
                reason: "cancelled".into()
            }
        );
        assert_eq!(out[0].text, "hello");
    }

    #[test]
    fn formula_units_are_not_sent() {
        let client = dictionary_client();
        let mut u = unit(0, "hello", None);
        u.label = BlockLabel::Formula;
        let out = tokio_test::block_on(client.translate_batch(&[u], &CancelSignal::default()));
        assert_eq!(out[0].status, TranslationStatus::Skipped);
        assert_eq!(out[0].text, "hello");
    }
}
