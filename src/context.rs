//! Run-scoped shared state.
//!
//! A [`PipelineContext`] is built once per run with
//! [`PipelineContext::initialize`] and passed by reference to every
//! `translate*` entry point. It owns the things that are expensive to create
//! or must be shared between pages: the provider client, the layout model
//! handle, font metrics and the cancellation signal. Everything in it is
//! read-only after construction apart from the signal.

use crate::config::{LayoutMode, TranslationConfig};
use crate::error::TranslateError;
use crate::pipeline::client::TranslationClient;
use crate::pipeline::debug::DebugRenderer;
use crate::pipeline::layout::{HeuristicDetector, LayoutDetector, LearnedLayoutDetector};
use crate::pipeline::metrics::TextMeasurer;
use crate::pipeline::provider::{Credentials, TranslationProvider};
use crate::pipeline::reassemble::PageReassembler;
use crate::pipeline::units::UnitBuilder;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Cooperative cancellation flag shared by every clone.
///
/// Setting it stops the dispatch of new pages and batches; work already in
/// flight runs to completion or times out.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct PipelineContext {
    pub(crate) client: Arc<TranslationClient>,
    pub(crate) detector: Arc<LayoutDetector>,
    pub(crate) units: Arc<UnitBuilder>,
    pub(crate) reassembler: Arc<PageReassembler>,
    pub(crate) debug: Option<Arc<DebugRenderer>>,
    cancel: CancelSignal,
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("provider", &self.client.provider().name())
            .field("detector", &self.detector.name())
            .field("render_mode", &self.reassembler.mode())
            .field("debug_images", &self.debug.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl PipelineContext {
    /// Resolve the provider and prepare the layout detector.
    ///
    /// Fails only when the provider cannot be built. A learned layout model
    /// that cannot be prepared leaves the detector in its unavailable state,
    /// and every page then falls back to the heuristic.
    pub async fn initialize(
        config: &TranslationConfig,
        credentials: &Credentials,
    ) -> Result<Self, TranslateError> {
        let provider = TranslationProvider::resolve(config, credentials)?;
        let heuristic = HeuristicDetector::new(config.heuristic.clone(), config.direction);
        let detector = match config.layout {
            LayoutMode::Heuristic => LayoutDetector::Heuristic(heuristic),
            LayoutMode::Learned => {
                LayoutDetector::Learned(LearnedLayoutDetector::initialize(&config.learned, heuristic).await)
            }
        };
        Self::with_parts(config, provider, detector)
    }

    /// Assemble a context from an already-built provider and detector.
    ///
    /// Fails with [`TranslateError::InvalidConfig`] when a pass-through
    /// pattern does not compile.
    pub fn with_parts(
        config: &TranslationConfig,
        provider: TranslationProvider,
        detector: LayoutDetector,
    ) -> Result<Self, TranslateError> {
        let units = UnitBuilder::new(config)?;
        let measurer = Arc::new(TextMeasurer::from_fonts(&config.fonts));
        let client = TranslationClient::new(Arc::new(provider), config);
        let debug = config
            .debug_images
            .then(|| Arc::new(DebugRenderer::new(&config.fonts, config.debug_dpi)));
        info!(
            "Pipeline ready: provider={}, layout={}, mode={:?}",
            client.provider().name(),
            detector.name(),
            config.render_mode
        );
        Ok(Self {
            client: Arc::new(client),
            detector: Arc::new(detector),
            units: Arc::new(units),
            reassembler: Arc::new(PageReassembler::new(config, measurer)),
            debug,
            cancel: CancelSignal::new(),
        })
    }

    /// A handle that cancels this context's runs.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn detector(&self) -> &LayoutDetector {
        &self.detector
    }

    pub fn client(&self) -> &TranslationClient {
        &self.client
    }

    /// Raster DPI the detector and debug renderer need, if any.
    pub(crate) fn raster_dpi(&self) -> Option<u32> {
        let learned = match self.detector.as_ref() {
            LayoutDetector::Learned(l) if l.is_available() => Some(l.dpi()),
            _ => None,
        };
        let debug = self.debug.as_ref().map(|d| d.dpi());
        learned.into_iter().chain(debug).max()
    }

    /// Cancel outstanding work and release the context.
    pub fn shutdown(self) {
        self.cancel.cancel();
        info!("Pipeline shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;

    fn dictionary_config() -> TranslationConfig {
        TranslationConfig::builder()
            .provider(ProviderKind::Dictionary)
            .dictionary_entry("hello", "नमस्ते")
            .build()
            .unwrap()
    }

    #[test]
    fn cancel_signal_is_shared_between_clones() {
        let a = CancelSignal::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[tokio::test]
    async fn initialize_with_dictionary() {
        let config = dictionary_config();
        let ctx = PipelineContext::initialize(&config, &Credentials::default())
            .await
            .unwrap();
        assert_eq!(ctx.client().provider().name(), "dictionary");
        assert_eq!(ctx.detector().name(), "heuristic");
        assert_eq!(ctx.raster_dpi(), None);

        let signal = ctx.cancel_signal();
        ctx.shutdown();
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn learned_without_command_is_unavailable() {
        let config = TranslationConfig::builder()
            .provider(ProviderKind::Dictionary)
            .dictionary_entry("hello", "नमस्ते")
            .layout(LayoutMode::Learned)
            .build()
            .unwrap();
        let ctx = PipelineContext::initialize(&config, &Credentials::default())
            .await
            .unwrap();
        match ctx.detector() {
            LayoutDetector::Learned(l) => assert!(!l.is_available()),
            _ => panic!("expected learned detector"),
        }
        assert_eq!(ctx.raster_dpi(), None);
    }
}
