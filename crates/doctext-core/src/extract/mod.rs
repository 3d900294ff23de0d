//! Extraction strategies.
//!
//! Each strategy turns one input file into text. The orchestrator decides
//! which strategies a file goes through and in what order; a strategy only
//! reports whether it can handle a file and does the work when asked.

mod converter;
mod ebook;
mod html;
mod ocr;
mod text;

pub use converter::ConverterExtractor;
pub use ebook::EbookExtractor;
pub use html::{HtmlExtractor, extract_html_from_mhtml, html_to_text};
pub use ocr::OcrExtractor;
pub use text::TextExtractor;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::exec::ExecContext;
use crate::models::{DoctextConfig, FileInfo};
use crate::ocr::EngineSelector;
use crate::store::{ArtifactStore, ScratchSpace};

/// Identifies a strategy in chains and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Text,
    Html,
    Ebook,
    Calibre,
    Ocr,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::Text,
        StrategyKind::Html,
        StrategyKind::Ebook,
        StrategyKind::Calibre,
        StrategyKind::Ocr,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::Text => "text",
            StrategyKind::Html => "html",
            StrategyKind::Ebook => "ebook",
            StrategyKind::Calibre => "calibre",
            StrategyKind::Ocr => "ocr",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a strategy needs to process one input.
#[derive(Clone, Copy)]
pub struct ExtractJob<'a> {
    pub ctx: &'a ExecContext,
    pub input: &'a Path,
    pub info: &'a FileInfo,
    pub store: &'a ArtifactStore,
    pub scratch: &'a ScratchSpace,
}

/// A way of turning a file into text.
pub trait Extractor: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn name(&self) -> &str {
        self.kind().name()
    }

    /// Whether this strategy can handle the file at all.
    fn supports(&self, info: &FileInfo) -> bool;

    fn extract(&self, job: &ExtractJob<'_>) -> Result<String>;
}

/// Strategies available to the orchestrator, keyed by kind.
#[derive(Default)]
pub struct ExtractorRegistry {
    extractors: HashMap<StrategyKind, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in strategy.
    pub fn with_defaults(config: &DoctextConfig, selector: Arc<dyn EngineSelector>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TextExtractor));
        registry.register(Arc::new(HtmlExtractor));
        registry.register(Arc::new(EbookExtractor::new(
            config.tools.ebook_convert.clone(),
        )));
        registry.register(Arc::new(ConverterExtractor::new(
            config.tools.ebook_convert.clone(),
            config.extraction.min_text_threshold,
        )));
        registry.register(Arc::new(OcrExtractor::new(config.clone(), selector)));
        registry
    }

    /// Add or replace the strategy for its kind.
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        self.extractors.insert(extractor.kind(), extractor);
    }

    pub fn get(&self, kind: StrategyKind) -> Option<&Arc<dyn Extractor>> {
        self.extractors.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}
