//! Page-level OCR driven by external engines.
//!
//! This module provides:
//! - the [`OcrEngine`] capability and its two adapters (Surya and the LLM caller)
//! - engine selection for interactive and pinned strategies
//! - Ghostscript page splitting and rasterization
//! - the resumable [`OcrPipeline`] that ties them together

mod engine;
mod engine_cache;
mod llm;
mod pipeline;
mod splitter;
mod surya;

pub use engine::{
    AutoSelector, EngineChoice, EngineKind, EngineSelector, available_engines, create_engine,
    resolve_engine,
};
pub use engine_cache::{CachedEngine, EngineCache};
pub use llm::LlmCallerEngine;
pub use pipeline::{OcrPipeline, aggregate_pages};
pub use splitter::PageSplitter;
pub use surya::{SuryaEngine, SuryaPage, SuryaTextLine, parse_results};

use std::path::Path;

use crate::error::Result;
use crate::exec::ExecContext;
use crate::store::ScratchSpace;

/// An external OCR backend.
///
/// Implementations are stateless with respect to documents: everything a
/// call needs arrives through its arguments, so one engine can serve many
/// pages concurrently.
pub trait OcrEngine: Send + Sync {
    /// Stable identifier, also used as the engine cache namespace.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Whether the engine reads single-page PDFs directly; otherwise pages
    /// are rasterized first.
    fn supports_direct_pages(&self) -> bool;

    /// Recognize text in a single-page document file.
    fn extract_from_page(
        &self,
        ctx: &ExecContext,
        scratch: &ScratchSpace,
        page: &Path,
    ) -> Result<String>;

    /// Recognize text in a raster image.
    fn extract_from_image(
        &self,
        ctx: &ExecContext,
        scratch: &ScratchSpace,
        image: &Path,
    ) -> Result<String>;
}
