//! Pipeline stages for layout-preserving translation.
//!
//! Each submodule implements one step; the orchestrator in
//! [`crate::translate`] wires them together per page.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ pdf ──▶ layout ──▶ units ──▶ client ──▶ reassemble ──▶ pdf
//! (bytes)  (extract) (blocks)  (mask)   (provider)  (fit, ops)    (write)
//! ```
//!
//! 1. [`input`]: read a local path or download a URL, check `%PDF`
//! 2. [`pdf`]: pdfium extraction and writing; blocking, run in `spawn_blocking`
//! 3. [`layout`]: heuristic or learned detection of ordered text blocks
//! 4. [`units`]: merge and split blocks into translation units; [`mask`]
//!    protects numbers, URLs and pass-through patterns
//! 5. [`client`]: batching, retry and concurrency over a [`provider`];
//!    [`postprocess`] tidies provider output
//! 6. [`reassemble`]: font-size fitting ([`fit`], [`metrics`]) and draw
//!    operations; [`overlay`] handles user-supplied placements
//! 7. [`debug`]: optional PNGs of the detected layout

pub mod client;
pub mod debug;
pub mod encode;
pub mod fit;
pub mod input;
pub mod layout;
pub mod mask;
pub mod metrics;
pub mod overlay;
pub mod pdf;
pub mod postprocess;
pub mod provider;
pub mod reassemble;
pub mod units;
