//! Resumable page-level OCR.
//!
//! A document moves through four stages:
//! 1. cached: a non-empty `text.txt` short-circuits everything
//! 2. splitting: PDFs become `pages/page_N.pdf`, reusing a previous split
//! 3. per-page extraction: `pages/page_N.txt` marks a finished page
//! 4. aggregation: page texts joined in page order and written to `text.txt`

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::{Error, ErrorKind, Result};
use crate::extract::ExtractJob;
use crate::models::config::DoctextConfig;
use crate::retry::{Recovery, RetryExecutor, RetryPolicy};
use crate::store::artifacts::PAGES_DIR;
use crate::store::{PageUnit, lock, write_atomic};

use super::{CachedEngine, EngineCache, OcrEngine, PageSplitter};

/// Where a page's content comes from.
#[derive(Debug, Clone)]
enum PageInput {
    /// A split page PDF at `PageUnit::pdf_path`.
    SplitPdf,
    /// An image input processed as a single page.
    Image(PathBuf),
}

#[derive(Debug, Clone)]
struct PageTask {
    unit: PageUnit,
    input: PageInput,
}

/// Drives an [`OcrEngine`] over the pages of one document.
pub struct OcrPipeline {
    engine: Arc<dyn OcrEngine>,
    splitter: PageSplitter,
    page_retry: RetryExecutor,
    split_retry: RetryExecutor,
    max_concurrency: usize,
    skip_existing: bool,
    min_text_threshold: usize,
}

impl OcrPipeline {
    pub fn new(engine: Arc<dyn OcrEngine>, config: &DoctextConfig) -> Self {
        let delay = config.extraction.retry_delay();
        Self {
            engine,
            splitter: PageSplitter::new(config.tools.ghostscript.clone(), config.ocr.raster_dpi),
            page_retry: RetryExecutor::new(RetryPolicy::new(config.ocr.page_retries, delay))
                .with_hook(ErrorKind::Timeout, |e| {
                    warn!("Page OCR timed out, retrying: {}", e);
                    Recovery::Retry
                }),
            split_retry: RetryExecutor::new(RetryPolicy::new(config.ocr.split_retries, delay)),
            max_concurrency: config.ocr.max_concurrency.max(1),
            skip_existing: config.extraction.skip_existing,
            min_text_threshold: config.extraction.min_text_threshold,
        }
    }

    pub fn engine(&self) -> &Arc<dyn OcrEngine> {
        &self.engine
    }

    /// Produce the document text, resuming from any persisted artifacts.
    pub fn run(&self, job: &ExtractJob<'_>) -> Result<String> {
        let store = job.store;
        let text_path = store.text_path();

        if self.skip_existing {
            if let Some(text) = read_usable(&text_path, self.min_text_threshold) {
                info!("Using cached OCR text from {}", text_path.display());
                return Ok(text);
            }
        }

        store.ensure_base_dir()?;
        let start = Instant::now();

        let tasks = if job.info.is_pdf() {
            let count = self.prepare_pages(job)?;
            (1..=count)
                .map(|n| PageTask {
                    unit: store.page(n),
                    input: PageInput::SplitPdf,
                })
                .collect()
        } else {
            store.create_dir(PAGES_DIR)?;
            vec![PageTask {
                unit: store.page(1),
                input: PageInput::Image(job.input.to_path_buf()),
            }]
        };

        let engine = CachedEngine::new(
            Arc::clone(&self.engine),
            EngineCache::new(store.ocr_data_path()),
        );
        let results = self.process_pages(job, &engine, &tasks);
        job.ctx.check()?;

        let completed = results.iter().filter(|r| r.is_some()).count();
        let text = aggregate_pages(
            tasks
                .iter()
                .zip(&results)
                .filter_map(|(task, text)| text.as_deref().map(|t| (task.unit.number, t))),
        );
        if text.is_empty() {
            return Err(Error::ocr(format!(
                "no text extracted from any page of {}",
                job.input.display()
            )));
        }
        // Text that would be rejected must not become a cache hit for the next run.
        let chars = text.chars().count();
        if chars < self.min_text_threshold {
            return Err(Error::validation(format!(
                "OCR text below minimum threshold ({chars} < {} chars)",
                self.min_text_threshold
            )));
        }

        if let Err(e) = write_atomic(&text_path, &text) {
            warn!("Failed to cache document text: {}", e);
        }
        info!(
            "OCR finished: {}/{} pages in {:?}",
            completed,
            tasks.len(),
            start.elapsed()
        );
        Ok(text)
    }

    /// Reuse an existing split or split the document now.
    fn prepare_pages(&self, job: &ExtractJob<'_>) -> Result<u32> {
        let existing = job.store.count_contiguous_pages();
        if existing > 0 {
            info!("Reusing {} previously split pages", existing);
            return Ok(existing);
        }

        let pages_dir = job.store.create_dir(PAGES_DIR)?;
        let count = self.split_retry.run(job.ctx, "page split", || {
            self.splitter.split(job.ctx, job.input, job.scratch, &pages_dir)
        })?;
        if count == 0 {
            return Err(Error::validation(format!(
                "no pages produced from {}",
                job.input.display()
            )));
        }
        Ok(count)
    }

    /// Process every task on a bounded pool of workers.
    ///
    /// Result slots are indexed by task, so completion order does not matter.
    /// A failed page leaves its slot empty and never stops other workers.
    fn process_pages(
        &self,
        job: &ExtractJob<'_>,
        engine: &CachedEngine,
        tasks: &[PageTask],
    ) -> Vec<Option<String>> {
        let slots: Vec<Mutex<Option<String>>> = tasks.iter().map(|_| Mutex::new(None)).collect();
        let next = AtomicUsize::new(0);
        let workers = self.max_concurrency.min(tasks.len()).max(1);
        debug!("Processing {} pages with {} workers", tasks.len(), workers);

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    while job.ctx.check().is_ok() {
                        let index = next.fetch_add(1, Ordering::SeqCst);
                        let Some(task) = tasks.get(index) else {
                            break;
                        };
                        let text = self.process_page(job, engine, task);
                        *lock(&slots[index]) = text;
                    }
                });
            }
        });

        slots
            .into_iter()
            .map(|slot| slot.into_inner().unwrap_or_else(PoisonError::into_inner))
            .collect()
    }

    fn process_page(
        &self,
        job: &ExtractJob<'_>,
        engine: &CachedEngine,
        task: &PageTask,
    ) -> Option<String> {
        let unit = &task.unit;
        if unit.is_done() {
            match std::fs::read_to_string(&unit.text_path) {
                Ok(text) => {
                    debug!("Page {} loaded from cache", unit.number);
                    return Some(text);
                }
                Err(e) => warn!("Cannot read cached page {}, re-running OCR: {}", unit.number, e),
            }
        }
        if matches!(task.input, PageInput::SplitPdf) && !unit.pdf_path.is_file() {
            warn!("Page {} file is missing, skipping", unit.number);
            return None;
        }

        let label = format!("OCR of page {}", unit.number);
        match self.page_retry.run(job.ctx, &label, || self.extract_page(job, engine, task)) {
            Ok(text) if text.trim().is_empty() => {
                debug!("Page {} has no text", unit.number);
                Some(String::new())
            }
            Ok(text) => {
                if let Err(e) = write_atomic(&unit.text_path, &text) {
                    warn!("Failed to save text of page {}: {}", unit.number, e);
                }
                info!("Page {} done ({} characters)", unit.number, text.chars().count());
                Some(text)
            }
            Err(e) => {
                if job.ctx.check().is_ok() {
                    warn!("Skipping page {}: {}", unit.number, e);
                }
                None
            }
        }
    }

    fn extract_page(
        &self,
        job: &ExtractJob<'_>,
        engine: &CachedEngine,
        task: &PageTask,
    ) -> Result<String> {
        let unit = &task.unit;
        match &task.input {
            PageInput::Image(image) => engine.extract_from_image(job.ctx, job.scratch, image),
            PageInput::SplitPdf if engine.supports_direct_pages() => {
                engine.extract_from_page(job.ctx, job.scratch, &unit.pdf_path)
            }
            PageInput::SplitPdf => {
                if !unit.image_path.is_file() {
                    self.splitter
                        .rasterize(job.ctx, &unit.pdf_path, &unit.image_path)?;
                }
                engine.extract_from_image(job.ctx, job.scratch, &unit.image_path)
            }
        }
    }
}

/// Join page texts with `--- Page N ---` markers in ascending page order.
///
/// Pages whose text is blank are left out entirely; the result is trimmed.
pub fn aggregate_pages<'a>(pages: impl IntoIterator<Item = (u32, &'a str)>) -> String {
    let mut pages: Vec<(u32, &str)> = pages
        .into_iter()
        .filter(|(_, text)| !text.trim().is_empty())
        .collect();
    pages.sort_by_key(|(number, _)| *number);

    let mut out = String::new();
    for (number, text) in pages {
        out.push_str(&format!("--- Page {number} ---\n{text}\n\n"));
    }
    out.trim().to_string()
}

/// Cached text, if present and long enough to count as a result.
fn read_usable(path: &Path, min_chars: usize) -> Option<String> {
    let text = std::fs::read_to_string(path).ok()?;
    let chars = text.trim().chars().count();
    if chars == 0 || chars < min_chars {
        debug!("Ignoring cached text at {} ({} chars)", path.display(), chars);
        return None;
    }
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ExecContext;
    use crate::models::{FileClass, FileInfo, MediaCategory};
    use crate::store::{ArtifactStore, ScratchSpace};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    /// Engine returning canned text keyed by page file content.
    struct ScriptedEngine {
        texts: HashMap<String, String>,
        calls: Mutex<Vec<String>>,
        direct: bool,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedEngine {
        fn new(texts: &[(&str, &str)], direct: bool) -> Self {
            Self {
                texts: texts
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
                direct,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> Vec<String> {
            let mut calls = lock(&self.calls).clone();
            calls.sort();
            calls
        }

        fn recognize(&self, path: &Path) -> Result<String> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(10));
            self.active.fetch_sub(1, Ordering::SeqCst);

            let content = std::fs::read_to_string(path)?;
            lock(&self.calls).push(content.clone());
            match self.texts.get(&content) {
                Some(text) => Ok(text.clone()),
                None => Err(Error::ocr(format!("cannot read {content}"))),
            }
        }
    }

    impl OcrEngine for ScriptedEngine {
        fn name(&self) -> &str {
            "scripted"
        }

        fn description(&self) -> &str {
            "scripted test engine"
        }

        fn supports_direct_pages(&self) -> bool {
            self.direct
        }

        fn extract_from_page(&self, _: &ExecContext, _: &ScratchSpace, page: &Path) -> Result<String> {
            self.recognize(page)
        }

        fn extract_from_image(&self, _: &ExecContext, _: &ScratchSpace, image: &Path) -> Result<String> {
            self.recognize(image)
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        input: PathBuf,
        info: FileInfo,
        store: ArtifactStore,
        scratch: ScratchSpace,
        ctx: ExecContext,
    }

    impl Fixture {
        /// A PDF input whose pages are already split, one file per content entry.
        fn pdf(pages: &[&str]) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let input = dir.path().join("scan.pdf");
            std::fs::write(&input, b"%PDF-1.4").unwrap();
            let info = FileInfo {
                fingerprint: "f00d".to_string(),
                extension: "pdf".to_string(),
                mime_type: "application/pdf".to_string(),
                size: 8,
                media_category: MediaCategory::Document,
                class: FileClass::Pdf,
            };
            let store = ArtifactStore::new(dir.path(), &info.fingerprint);
            store.create_dir(PAGES_DIR).unwrap();
            for (i, content) in pages.iter().enumerate() {
                std::fs::write(store.page(i as u32 + 1).pdf_path, content).unwrap();
            }
            let scratch = store.scratch();
            Self {
                _dir: dir,
                input,
                info,
                store,
                scratch,
                ctx: ExecContext::new(),
            }
        }

        fn job(&self) -> ExtractJob<'_> {
            ExtractJob {
                ctx: &self.ctx,
                input: &self.input,
                info: &self.info,
                store: &self.store,
                scratch: &self.scratch,
            }
        }
    }

    fn config(concurrency: usize) -> DoctextConfig {
        let mut config = DoctextConfig::default();
        config.ocr.max_concurrency = concurrency;
        config.extraction.retry_delay_ms = 1;
        config
    }

    #[test]
    fn test_aggregate_orders_and_marks_pages() {
        let text = aggregate_pages([(2, "second"), (1, "first"), (3, "  ")]);
        assert_eq!(text, "--- Page 1 ---\nfirst\n\n--- Page 2 ---\nsecond");
    }

    #[test]
    fn test_full_run_writes_pages_and_document() {
        let fx = Fixture::pdf(&["p1", "p2", "p3"]);
        let engine = Arc::new(ScriptedEngine::new(
            &[("p1", "alpha"), ("p2", "beta"), ("p3", "gamma")],
            true,
        ));
        let pipeline = OcrPipeline::new(engine.clone(), &config(1));

        let text = pipeline.run(&fx.job()).unwrap();

        assert_eq!(
            text,
            "--- Page 1 ---\nalpha\n\n--- Page 2 ---\nbeta\n\n--- Page 3 ---\ngamma"
        );
        assert_eq!(std::fs::read_to_string(fx.store.text_path()).unwrap(), text);
        assert_eq!(
            std::fs::read_to_string(&fx.store.page(2).text_path).unwrap(),
            "beta"
        );
    }

    #[test]
    fn test_resume_only_processes_missing_pages() {
        let fx = Fixture::pdf(&["p1", "p2", "p3", "p4"]);
        let texts = [("p1", "alpha"), ("p2", "beta"), ("p3", "gamma"), ("p4", "delta")];

        let full = {
            let other = Fixture::pdf(&["p1", "p2", "p3", "p4"]);
            let engine = Arc::new(ScriptedEngine::new(&texts, true));
            OcrPipeline::new(engine, &config(2)).run(&other.job()).unwrap()
        };

        std::fs::write(&fx.store.page(1).text_path, "alpha").unwrap();
        std::fs::write(&fx.store.page(2).text_path, "beta").unwrap();
        let engine = Arc::new(ScriptedEngine::new(&texts, true));
        let resumed = OcrPipeline::new(engine.clone(), &config(2))
            .run(&fx.job())
            .unwrap();

        assert_eq!(resumed, full);
        assert_eq!(engine.calls(), vec!["p3".to_string(), "p4".to_string()]);
    }

    #[test]
    fn test_cached_document_skips_everything() {
        let fx = Fixture::pdf(&["p1"]);
        std::fs::write(fx.store.text_path(), "previous result").unwrap();
        let engine = Arc::new(ScriptedEngine::new(&[], true));

        let text = OcrPipeline::new(engine.clone(), &config(1))
            .run(&fx.job())
            .unwrap();

        assert_eq!(text, "previous result");
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn test_failed_page_is_skipped() {
        let fx = Fixture::pdf(&["p1", "broken", "p3"]);
        let engine = Arc::new(ScriptedEngine::new(&[("p1", "alpha"), ("p3", "gamma")], true));

        let text = OcrPipeline::new(engine, &config(3)).run(&fx.job()).unwrap();

        assert_eq!(text, "--- Page 1 ---\nalpha\n\n--- Page 3 ---\ngamma");
        assert!(!fx.store.page(2).is_done());
    }

    #[test]
    fn test_empty_aggregate_is_rejected() {
        let fx = Fixture::pdf(&["p1", "p2"]);
        let engine = Arc::new(ScriptedEngine::new(&[("p1", ""), ("p2", "  \n")], true));

        let err = OcrPipeline::new(engine, &config(1)).run(&fx.job()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Ocr);
        assert!(err.message().starts_with("no text extracted"));
        assert!(!fx.store.text_path().exists());
        assert!(!fx.store.page(1).is_done());
    }

    #[test]
    fn test_concurrent_run_matches_sequential() {
        let pages: Vec<String> = (1..=8).map(|n| format!("p{n}")).collect();
        let page_refs: Vec<&str> = pages.iter().map(String::as_str).collect();
        let texts: Vec<(String, String)> =
            pages.iter().map(|p| (p.clone(), format!("text {p}"))).collect();
        let text_refs: Vec<(&str, &str)> =
            texts.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();

        let sequential = Fixture::pdf(&page_refs);
        let seq_text = OcrPipeline::new(Arc::new(ScriptedEngine::new(&text_refs, true)), &config(1))
            .run(&sequential.job())
            .unwrap();

        let parallel = Fixture::pdf(&page_refs);
        let engine = Arc::new(ScriptedEngine::new(&text_refs, true));
        let par_text = OcrPipeline::new(engine.clone(), &config(4))
            .run(&parallel.job())
            .unwrap();

        assert_eq!(par_text, seq_text);
        assert!(engine.peak.load(Ordering::SeqCst) <= 4);
    }

    #[test]
    fn test_existing_image_is_reused_for_rasterizing_engines() {
        let fx = Fixture::pdf(&["p1"]);
        std::fs::write(&fx.store.page(1).image_path, "img1").unwrap();
        let engine = Arc::new(ScriptedEngine::new(&[("img1", "from image")], false));

        let text = OcrPipeline::new(engine.clone(), &config(1))
            .run(&fx.job())
            .unwrap();

        assert_eq!(text, "--- Page 1 ---\nfrom image");
        assert_eq!(engine.calls(), vec!["img1".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_rasterizing_engine_renders_missing_images() {
        let fx = Fixture::pdf(&["p1", "p2"]);
        let mut config = config(2);
        config.ocr.raster_dpi = 150;
        config.tools.ghostscript =
            crate::ocr::splitter::tests::fake_rasterizer(fx._dir.path(), true, 0, "");
        let engine = Arc::new(ScriptedEngine::new(
            &[("-r150 p1", "first raster"), ("-r150 p2", "second raster")],
            false,
        ));

        let text = OcrPipeline::new(engine.clone(), &config).run(&fx.job()).unwrap();

        assert_eq!(
            text,
            "--- Page 1 ---\nfirst raster\n\n--- Page 2 ---\nsecond raster"
        );
        assert_eq!(
            std::fs::read_to_string(&fx.store.page(2).image_path).unwrap(),
            "-r150 p2"
        );
        assert_eq!(
            engine.calls(),
            vec!["-r150 p1".to_string(), "-r150 p2".to_string()]
        );
    }

    #[test]
    fn test_short_text_is_not_cached() {
        let fx = Fixture::pdf(&["p1"]);
        let mut config = config(1);
        config.extraction.min_text_threshold = 50;
        let engine = Arc::new(ScriptedEngine::new(&[("p1", "short")], true));
        let pipeline = OcrPipeline::new(engine.clone(), &config);

        let err = pipeline.run(&fx.job()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.message().contains("below minimum threshold"));
        assert!(!fx.store.text_path().exists());

        let err = pipeline.run(&fx.job()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!fx.store.text_path().exists());
    }

    #[test]
    fn test_short_cached_document_is_ignored() {
        let fx = Fixture::pdf(&["p1"]);
        std::fs::write(fx.store.text_path(), "tiny").unwrap();
        let engine = Arc::new(ScriptedEngine::new(&[("p1", "alpha")], true));

        let text = OcrPipeline::new(engine.clone(), &config(1))
            .run(&fx.job())
            .unwrap();

        assert_eq!(text, "--- Page 1 ---\nalpha");
        assert_eq!(engine.calls(), vec!["p1".to_string()]);
        assert_eq!(std::fs::read_to_string(fx.store.text_path()).unwrap(), text);
    }

    #[test]
    fn test_image_input_is_single_page() {
        let mut fx = Fixture::pdf(&[]);
        let image = fx.input.with_file_name("photo.png");
        std::fs::write(&image, "photo").unwrap();
        fx.input = image;
        fx.info.class = FileClass::Image;
        fx.info.extension = "png".to_string();

        let engine = Arc::new(ScriptedEngine::new(&[("photo", "caption")], true));
        let text = OcrPipeline::new(engine, &config(4)).run(&fx.job()).unwrap();

        assert_eq!(text, "--- Page 1 ---\ncaption");
        assert!(fx.store.page(1).is_done());
    }

    #[test]
    fn test_engine_cache_is_written() {
        let fx = Fixture::pdf(&["p1"]);
        let engine = Arc::new(ScriptedEngine::new(&[("p1", "alpha")], true));
        OcrPipeline::new(engine, &config(1)).run(&fx.job()).unwrap();

        let cache = std::fs::read_to_string(fx.store.ocr_data_path()).unwrap();
        assert!(cache.contains("\"scripted\""));
        assert!(cache.contains("alpha"));
    }
}
