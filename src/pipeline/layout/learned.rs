//! Layout detection backed by an external layout model.
//!
//! The model sees a page raster and answers with labelled polygons in pixel
//! space. We scale those onto the page, hand each word to the tightest
//! polygon containing its centre and let the heuristic detector pick up any
//! words the model missed. A page without a raster is not sent to the model.
//!
//! ## Order
//!
//! Without explicit `order` fields every block goes through the shared
//! reading-order routine. With them, model blocks keep the model's sequence
//! and each leftover block is placed just before the first model block that
//! follows it in reading order, so a missed page header still comes first.
//!
//! ## Command protocol
//!
//! [`CommandLayoutModel`] runs an executable once per page:
//!
//! ```text
//! stdin : {"image_png_base64": "...", "width": 1275, "height": 1650}
//! stdout: {"regions": [{"polygon": [[x,y],...], "label": "text", "order": 0}]}
//! ```
//!
//! `order` and `confidence` are optional. A non-zero exit status or a spawn
//! failure means the model is unavailable; unparseable stdout is an invalid
//! response. Both make the orchestrator fall back to the heuristic detector.

use super::assets::ModelAssets;
use super::heuristic::HeuristicDetector;
use super::{apply_order, find_columns, reading_order};
use crate::config::LearnedLayoutParams;
use crate::error::LayoutModelError;
use crate::geometry::Polygon;
use crate::page::{BlockLabel, PageModel, TextBlock, Word};
use crate::pipeline::encode::encode_png_base64;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One region reported by a layout model, in pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutRegion {
    pub polygon: Polygon,
    pub label: String,
    #[serde(default)]
    pub order: Option<usize>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// An inference capability that turns a page raster into regions.
pub trait LayoutModel: Send + Sync {
    fn name(&self) -> &str;

    fn infer(&self, raster: &DynamicImage) -> Result<Vec<LayoutRegion>, LayoutModelError>;
}

/// Learned detector. Holds `None` for the model when initialisation failed,
/// in which case every page reports [`LayoutModelError::Unavailable`].
pub struct LearnedLayoutDetector {
    model: Option<Arc<dyn LayoutModel>>,
    unavailable_reason: String,
    fallback: HeuristicDetector,
    dpi: u32,
}

impl LearnedLayoutDetector {
    pub fn with_model(model: Arc<dyn LayoutModel>, fallback: HeuristicDetector, dpi: u32) -> Self {
        Self {
            model: Some(model),
            unavailable_reason: String::new(),
            fallback,
            dpi: dpi.max(1),
        }
    }

    pub fn unavailable(reason: impl Into<String>, fallback: HeuristicDetector) -> Self {
        Self {
            model: None,
            unavailable_reason: reason.into(),
            fallback,
            dpi: 72,
        }
    }

    /// Build the command-backed detector, fetching model weights on first use.
    ///
    /// Never fails: a missing command or a failed download yields a detector
    /// that reports itself unavailable, so each page falls back on its own.
    pub async fn initialize(params: &LearnedLayoutParams, fallback: HeuristicDetector) -> Self {
        let Some(program) = params.command.clone() else {
            warn!("Learned layout selected but no model command configured");
            return Self::unavailable("no layout-model command configured", fallback);
        };

        let assets = ModelAssets::from_params(params);
        let weights = match assets.ensure().await {
            Ok(w) => w,
            Err(e) => {
                warn!("Layout model weights unavailable: {}", e);
                return Self::unavailable(e.to_string(), fallback);
            }
        };

        info!("Layout model: {} (weights: {:?})", program, weights);
        let model = CommandLayoutModel::new(
            program,
            params.args.clone(),
            weights,
            Duration::from_secs(params.timeout_secs.max(1)),
        );
        Self::with_model(Arc::new(model), fallback, params.dpi)
    }

    pub fn is_available(&self) -> bool {
        self.model.is_some()
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    pub fn fallback(&self) -> &HeuristicDetector {
        &self.fallback
    }

    /// Map model regions onto the page's words.
    pub fn detect(
        &self,
        page: &PageModel,
        raster: Option<&DynamicImage>,
    ) -> Result<Vec<TextBlock>, LayoutModelError> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| LayoutModelError::Unavailable(self.unavailable_reason.clone()))?;

        let img = raster.ok_or_else(|| LayoutModelError::Unavailable("no page raster".into()))?;
        if img.width() == 0 || img.height() == 0 {
            return Err(LayoutModelError::InvalidOutput("empty raster".into()));
        }

        let regions = model.infer(img)?;
        debug!(
            "Page {}: {} returned {} regions",
            page.index + 1,
            model.name(),
            regions.len()
        );

        let sx = page.width / img.width() as f32;
        let sy = page.height / img.height() as f32;
        let scaled: Vec<(Polygon, f32)> = regions
            .iter()
            .map(|r| {
                let p = r.polygon.scale(sx, sy);
                let area = p.area();
                (p, area)
            })
            .collect();

        let mut buckets: Vec<Vec<Word>> = vec![Vec::new(); regions.len()];
        let mut leftover: Vec<Word> = Vec::new();
        for w in page.words() {
            let (cx, cy) = w.bbox.center();
            let best = scaled
                .iter()
                .enumerate()
                .filter(|(_, (p, _))| p.contains(cx, cy))
                .min_by(|(_, (_, a)), (_, (_, b))| a.total_cmp(b))
                .map(|(i, _)| i);
            match best {
                Some(i) => buckets[i].push(w.clone()),
                None => leftover.push(w.clone()),
            }
        }

        // (block, explicit model order)
        let mut placed: Vec<(TextBlock, Option<usize>)> = Vec::new();
        for (region, words) in regions.iter().zip(buckets) {
            if words.is_empty() {
                continue;
            }
            let words: Vec<Word> = self.fallback.lines(words).into_iter().flatten().collect();
            if let Some(block) = TextBlock::from_words(words, None, BlockLabel::parse(&region.label)) {
                placed.push((block, region.order));
            }
        }
        if !leftover.is_empty() {
            debug!(
                "Page {}: {} words outside model regions",
                page.index + 1,
                leftover.len()
            );
        }
        let rest = self.fallback.detect_words(leftover);

        let params = self.fallback.params();
        let boxes: Vec<_> = placed
            .iter()
            .map(|(b, _)| b.bbox)
            .chain(rest.iter().map(|b| b.bbox))
            .collect();
        let columns = find_columns(
            &boxes,
            params.narrow_segment_ratio,
            params.min_gutter,
            params.max_columns,
        );
        let tol = params.min_gutter / 2.0;

        let explicit: Vec<Option<usize>> = placed.iter().map(|(_, o)| *o).collect();
        let mut blocks: Vec<TextBlock> = placed.into_iter().map(|(b, _)| b).chain(rest).collect();
        for b in &mut blocks {
            b.column = columns.assign(&b.bbox, tol);
        }

        let geometric = reading_order(&blocks, self.fallback.direction(), params.tie_tolerance);
        let order = if explicit.iter().any(Option::is_some) {
            interleave(&geometric, &explicit)
        } else {
            geometric
        };
        apply_order(&mut blocks, order);
        Ok(blocks)
    }
}

/// Merge model blocks (indices `0..explicit.len()`, sequenced by their
/// explicit order) with leftover blocks (the remaining indices). `geometric`
/// is the reading order over all of them.
fn interleave(geometric: &[usize], explicit: &[Option<usize>]) -> Vec<usize> {
    let n_model = explicit.len();
    let mut pos = vec![0usize; geometric.len()];
    for (p, &i) in geometric.iter().enumerate() {
        pos[i] = p;
    }

    let mut model: Vec<usize> = (0..n_model).collect();
    model.sort_by_key(|&i| (explicit[i].unwrap_or(usize::MAX), pos[i]));

    let mut before: Vec<Vec<usize>> = vec![Vec::new(); n_model];
    let mut tail = Vec::new();
    for &l in geometric.iter().filter(|&&i| i >= n_model) {
        let next = (0..n_model)
            .filter(|&m| pos[m] > pos[l])
            .min_by_key(|&m| pos[m]);
        match next {
            Some(m) => before[m].push(l),
            None => tail.push(l),
        }
    }

    let mut out = Vec::with_capacity(geometric.len());
    for m in model {
        out.append(&mut before[m]);
        out.push(m);
    }
    out.extend(tail);
    out
}

// ── Command-backed model ─────────────────────────────────────────────────

#[derive(Serialize)]
struct InferRequest<'a> {
    image_png_base64: &'a str,
    width: u32,
    height: u32,
}

#[derive(Deserialize)]
struct InferResponse {
    regions: Vec<LayoutRegion>,
}

/// Layout model run as an external process per page.
#[derive(Debug, Clone)]
pub struct CommandLayoutModel {
    program: String,
    args: Vec<String>,
    weights: Option<PathBuf>,
    timeout: Duration,
}

impl CommandLayoutModel {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        weights: Option<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            weights,
            timeout,
        }
    }

    fn run(&self, input: Vec<u8>) -> Result<Vec<u8>, LayoutModelError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(w) = &self.weights {
            cmd.arg("--weights").arg(w);
        }
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| LayoutModelError::Unavailable(format!("spawn {}: {}", self.program, e)))?;

        // stdin, stdout and stderr are pumped on their own threads so a
        // large request cannot deadlock against a full stdout pipe.
        let writer = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || {
                let _ = stdin.write_all(&input);
            })
        });
        let stdout = child.stdout.take().map(|mut out| {
            std::thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = out.read_to_end(&mut buf);
                buf
            })
        });
        let stderr = child.stderr.take().map(|mut err| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = err.read_to_string(&mut buf);
                buf
            })
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(LayoutModelError::Unavailable(format!(
                        "{} timed out after {}s",
                        self.program,
                        self.timeout.as_secs()
                    )));
                }
                Ok(None) => std::thread::sleep(Duration::from_millis(20)),
                Err(e) => return Err(LayoutModelError::Unavailable(e.to_string())),
            }
        };

        if let Some(w) = writer {
            let _ = w.join();
        }
        let out = stdout.and_then(|h| h.join().ok()).unwrap_or_default();
        let err = stderr.and_then(|h| h.join().ok()).unwrap_or_default();

        if !status.success() {
            return Err(LayoutModelError::Unavailable(format!(
                "{} exited with {}: {}",
                self.program,
                status,
                err.trim()
            )));
        }
        Ok(out)
    }
}

impl LayoutModel for CommandLayoutModel {
    fn name(&self) -> &str {
        &self.program
    }

    fn infer(&self, raster: &DynamicImage) -> Result<Vec<LayoutRegion>, LayoutModelError> {
        let b64 = encode_png_base64(raster)
            .map_err(|e| LayoutModelError::InvalidOutput(format!("encode raster: {e}")))?;
        let request = serde_json::to_vec(&InferRequest {
            image_png_base64: &b64,
            width: raster.width(),
            height: raster.height(),
        })
        .map_err(|e| LayoutModelError::InvalidOutput(e.to_string()))?;

        let out = self.run(request)?;
        let resp: InferResponse = serde_json::from_slice(&out)
            .map_err(|e| LayoutModelError::InvalidOutput(format!("bad model response: {e}")))?;
        Ok(resp.regions)
    }
}
