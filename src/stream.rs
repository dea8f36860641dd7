//! Streaming API: emit pages as they complete.
//!
//! [`crate::translate_pages`] returns only after every page is done.
//! [`translate_stream`] yields each [`PageOutput`] as soon as its page
//! finishes, so callers can show partial results or persist pages
//! incrementally. Pages arrive in completion order; sort by
//! [`PageOutput::index`] if order matters.

use crate::config::TranslationConfig;
use crate::context::PipelineContext;
use crate::output::PageOutput;
use crate::page::{PageInput, PageSource};
use crate::translate::process_page;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of finished pages.
pub type PageStream<'a> = Pin<Box<dyn Stream<Item = PageOutput> + Send + 'a>>;

/// Translate `sources`, yielding pages in completion order.
///
/// Up to `max_workers` pages are in flight at once. Cancelling the
/// context's signal makes every page not yet started come out as
/// [`crate::PageError::Cancelled`]; dropping the stream stops the run.
///
/// # Example
/// ```rust,no_run
/// use futures::StreamExt;
/// use pdf_translate::{translate_stream, Credentials, MemoryPage, PipelineContext, TranslationConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = TranslationConfig::default();
/// let ctx = PipelineContext::initialize(&config, &Credentials::from_env()).await?;
/// let mut page = MemoryPage::new(0, 612.0, 792.0);
/// page.push_line("नमस्ते दुनिया", 72.0, 72.0, 12.0);
///
/// let mut pages = translate_stream(&[page], &config, &ctx);
/// while let Some(p) = pages.next().await {
///     println!("page {}: {} blocks", p.page_num(), p.rendered.len());
/// }
/// # Ok(())
/// # }
/// ```
pub fn translate_stream<'a, S: PageSource>(
    sources: &[S],
    config: &'a TranslationConfig,
    ctx: &'a PipelineContext,
) -> PageStream<'a> {
    let inputs: Vec<PageInput> = sources.iter().map(PageInput::load).collect();
    let total = inputs.len();
    info!("Streaming translation of {} page(s)", total);
    if let Some(cb) = &config.progress_callback {
        cb.on_run_start(total);
    }

    let s = stream::iter(inputs)
        .map(move |input| async move { process_page(input, total, config, ctx).await.0 })
        .buffer_unordered(config.max_workers.max(1));
    Box::pin(s)
}
