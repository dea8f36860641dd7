//! Provider that fails on cue, then answers in upper case.

use super::BatchLimits;
use crate::error::ProviderError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct ScriptedProvider {
    failures: Mutex<VecDeque<ProviderError>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub const LIMITS: BatchLimits = BatchLimits {
        max_units: 16,
        max_chars: 10_000,
    };

    /// Return `errors` in order, one per call, before succeeding.
    pub fn failing(errors: impl IntoIterator<Item = ProviderError>) -> Self {
        Self {
            failures: Mutex::new(errors.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `translate_batch` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn translate_batch(&self, texts: &[String]) -> Result<Vec<String>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.failures.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(e) => Err(e),
            None => Ok(texts.iter().map(|t| t.to_uppercase()).collect()),
        }
    }
}
