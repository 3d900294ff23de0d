//! OCR strategy: resolves an engine once and hands documents to the page pipeline.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::Result;
use crate::models::{DoctextConfig, FileClass, FileInfo, MediaCategory};
use crate::ocr::{EngineSelector, OcrEngine, OcrPipeline, resolve_engine};
use crate::store::lock;

use super::{ExtractJob, Extractor, StrategyKind};

/// Text recognition for scanned documents and images.
///
/// The engine is chosen on first use and reused for every later file, so an
/// interactive selector is asked at most once per extractor.
pub struct OcrExtractor {
    config: DoctextConfig,
    selector: Arc<dyn EngineSelector>,
    engine: Mutex<Option<Arc<dyn OcrEngine>>>,
}

impl OcrExtractor {
    pub fn new(config: DoctextConfig, selector: Arc<dyn EngineSelector>) -> Self {
        Self {
            config,
            selector,
            engine: Mutex::new(None),
        }
    }

    /// Use `engine` instead of resolving one from the configured tools.
    pub fn with_engine(config: DoctextConfig, engine: Arc<dyn OcrEngine>) -> Self {
        Self {
            config,
            selector: Arc::new(crate::ocr::AutoSelector),
            engine: Mutex::new(Some(engine)),
        }
    }

    fn engine(&self) -> Result<Arc<dyn OcrEngine>> {
        let mut slot = lock(&self.engine);
        if let Some(engine) = slot.as_ref() {
            return Ok(Arc::clone(engine));
        }
        let engine = resolve_engine(&self.config, self.selector.as_ref())?;
        *slot = Some(Arc::clone(&engine));
        Ok(engine)
    }
}

impl Extractor for OcrExtractor {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Ocr
    }

    /// PDFs and images only. Other unknown formats are left to the converter.
    fn supports(&self, info: &FileInfo) -> bool {
        matches!(info.class, FileClass::Pdf | FileClass::Image)
            || info.media_category == MediaCategory::Image
    }

    fn extract(&self, job: &ExtractJob<'_>) -> Result<String> {
        let engine = self.engine()?;
        debug!("Running OCR on {} with {}", job.input.display(), engine.name());
        OcrPipeline::new(engine, &self.config).run(job)
    }
}
