//! Single-file processing: validation, caching, extraction and persistence.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::exec::ExecContext;
use crate::extract::{ExtractJob, ExtractorRegistry};
use crate::models::{CACHED_EXTRACTOR, DoctextConfig, ExtractionResult, FileInfo};
use crate::ocr::EngineSelector;
use crate::orchestrator::Orchestrator;
use crate::retry::{Recovery, RetryExecutor};
use crate::store::{ArtifactStore, identify, write_atomic};

const WRITE_PROBE: &str = ".write_test";

/// Processes files through the extraction chain and stores the results.
pub struct FileProcessor {
    config: DoctextConfig,
    orchestrator: Orchestrator,
    retry: RetryExecutor,
}

impl FileProcessor {
    /// Processor with the built-in strategies.
    pub fn new(config: DoctextConfig, selector: Arc<dyn EngineSelector>) -> Result<Self> {
        let registry = ExtractorRegistry::with_defaults(&config, selector);
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: DoctextConfig, registry: ExtractorRegistry) -> Result<Self> {
        config.validate()?;
        info!(
            "Processor ready: content mode {}, OCR strategy {}, min text {} chars",
            config.extraction.content_mode,
            config.ocr.strategy,
            config.extraction.min_text_threshold
        );
        let retry = RetryExecutor::new(config.extraction.retry_policy()).with_hook(
            ErrorKind::Io,
            |err| {
                warn!("I/O error, checking file accessibility: {}", err);
                Recovery::Retry
            },
        );
        Ok(Self {
            orchestrator: Orchestrator::new(&config, registry),
            config,
            retry,
        })
    }

    pub fn config(&self) -> &DoctextConfig {
        &self.config
    }

    /// Extract text from `input`.
    ///
    /// Without an explicit `output`, text goes to `{input_dir}/{fingerprint}/text.txt`.
    pub fn process_file(
        &self,
        ctx: &ExecContext,
        input: &Path,
        output: Option<&Path>,
    ) -> Result<ExtractionResult> {
        let start = Instant::now();
        info!("Processing {}", input.display());

        validate_input(input)?;
        let info = self.retry.run(ctx, "reading file info", || identify(input))?;
        debug!(
            "File info: extension '{}', MIME {}, {} bytes, {} category, fingerprint {}",
            info.extension, info.mime_type, info.size, info.class, info.fingerprint
        );
        self.check_size(&info)?;

        let store = ArtifactStore::for_input(input, &info.fingerprint);
        let output = self.resolve_output(&store, output)?;

        if self.config.extraction.skip_existing {
            if let Some(text) =
                read_existing(&output, self.config.extraction.min_text_threshold)
            {
                info!("Output {} already exists, skipping extraction", output.display());
                return Ok(ExtractionResult {
                    text,
                    source: input.to_path_buf(),
                    output_path: Some(output),
                    extractor_used: CACHED_EXTRACTOR.to_string(),
                    fallback_used: false,
                    attempted_extractors: Vec::new(),
                    process_time_ms: elapsed_ms(start),
                    error: None,
                    completed_at: Utc::now(),
                });
            }
        }

        let scratch = store.scratch();
        let outcome = scratch.run_with_scoped_cleanup(|scratch| {
            let job = ExtractJob {
                ctx,
                input,
                info: &info,
                store: &store,
                scratch,
            };
            self.orchestrator.extract(&job).map_err(|failure| {
                warn!(
                    "Extraction failed after trying [{}]",
                    failure.attempted_extractors.join(", ")
                );
                Error::from(failure)
            })
        })?;

        self.retry.run(ctx, "saving output", || write_atomic(&output, &outcome.text))?;
        info!("Text saved to {}", output.display());

        let cache_path = store.text_path();
        if output != cache_path {
            let cached = store
                .ensure_base_dir()
                .and_then(|_| write_atomic(&cache_path, &outcome.text));
            if let Err(e) = cached {
                warn!("Failed to cache text at {}: {}", cache_path.display(), e);
            }
        }

        let result = ExtractionResult {
            text: outcome.text,
            source: input.to_path_buf(),
            output_path: Some(output),
            extractor_used: outcome.extractor_used.name().to_string(),
            fallback_used: outcome.fallback_used,
            attempted_extractors: outcome.attempted_extractors,
            process_time_ms: elapsed_ms(start),
            error: None,
            completed_at: Utc::now(),
        };
        info!(
            "Extracted {} characters with {} in {} ms",
            result.text.chars().count(),
            result.extractor_used,
            result.process_time_ms
        );
        Ok(result)
    }

    fn check_size(&self, info: &FileInfo) -> Result<()> {
        let limits = &self.config.extraction;
        if info.size > limits.max_file_size {
            return Err(Error::validation(format!(
                "file size ({} bytes) exceeds maximum limit ({} bytes)",
                info.size, limits.max_file_size
            )));
        }
        if info.size > limits.large_file_warning {
            warn!(
                "Large file detected ({} bytes), processing may take longer",
                info.size
            );
        }
        Ok(())
    }

    /// Default or explicit output path, with a writable parent directory.
    fn resolve_output(&self, store: &ArtifactStore, output: Option<&Path>) -> Result<PathBuf> {
        let output = match output {
            None => {
                store.ensure_base_dir()?;
                store.text_path()
            }
            Some(path) if path.is_dir() => {
                return Err(Error::validation(format!(
                    "output path {} is a directory",
                    path.display()
                )));
            }
            Some(path) => path.to_path_buf(),
        };

        let parent = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent)
            .context(format!("failed to create output directory {}", parent.display()))?;
        let probe = parent.join(WRITE_PROBE);
        std::fs::write(&probe, b"")
            .with_kind(
                ErrorKind::Permission,
                format!("output directory {} is not writable", parent.display()),
            )?;
        if let Err(e) = std::fs::remove_file(&probe) {
            debug!("Failed to remove write probe {}: {}", probe.display(), e);
        }
        Ok(output)
    }
}

fn validate_input(input: &Path) -> Result<()> {
    if input.as_os_str().is_empty() {
        return Err(Error::validation("input file path cannot be empty"));
    }
    let metadata = std::fs::metadata(input).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::with_source(
                ErrorKind::NotFound,
                format!("input file not found: {}", input.display()),
                e,
            )
        } else {
            Error::from(e).context(format!("cannot stat input file {}", input.display()))
        }
    })?;
    if metadata.is_dir() {
        return Err(Error::validation(format!(
            "input path {} is a directory",
            input.display()
        )));
    }
    std::fs::File::open(input).with_kind(
        ErrorKind::Permission,
        format!("cannot read input file {}", input.display()),
    )?;
    Ok(())
}

/// Existing output that still passes the minimum length check.
fn read_existing(output: &Path, min_chars: usize) -> Option<String> {
    if !output.is_file() {
        return None;
    }
    match std::fs::read_to_string(output) {
        Ok(text) if text.trim().chars().count() >= min_chars => Some(text),
        Ok(_) => {
            warn!("Existing output {} is too short, extracting again", output.display());
            None
        }
        Err(e) => {
            warn!("Cannot read existing output {}: {}", output.display(), e);
            None
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ExecContext;
    use crate::extract::{HtmlExtractor, OcrExtractor, TextExtractor};
    use crate::ocr::{AutoSelector, OcrEngine};
    use crate::store::{ScratchSpace, artifacts::PAGES_DIR};
    use pretty_assertions::assert_eq;

    struct EchoEngine;

    impl OcrEngine for EchoEngine {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "returns the file content"
        }

        fn supports_direct_pages(&self) -> bool {
            true
        }

        fn extract_from_page(&self, _: &ExecContext, _: &ScratchSpace, page: &Path) -> Result<String> {
            Ok(std::fs::read_to_string(page)?)
        }

        fn extract_from_image(&self, _: &ExecContext, _: &ScratchSpace, image: &Path) -> Result<String> {
            Ok(std::fs::read_to_string(image)?)
        }
    }

    fn config() -> DoctextConfig {
        let mut config = DoctextConfig::default();
        config.extraction.retry_delay_ms = 1;
        config
    }

    fn processor() -> FileProcessor {
        processor_with(config())
    }

    fn processor_with(config: DoctextConfig) -> FileProcessor {
        let mut registry = ExtractorRegistry::new();
        registry.register(Arc::new(TextExtractor));
        registry.register(Arc::new(HtmlExtractor));
        registry.register(Arc::new(OcrExtractor::with_engine(
            config.clone(),
            Arc::new(EchoEngine),
        )));
        FileProcessor::with_registry(config, registry).unwrap()
    }

    #[test]
    fn test_text_file_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("notes.md");
        std::fs::write(&input, "# Notes\n\nSome meeting notes.\n").unwrap();

        let result = processor()
            .process_file(&ExecContext::new(), &input, None)
            .unwrap();

        assert_eq!(result.extractor_used, "text");
        assert_eq!(result.attempted_extractors, vec!["text"]);
        assert!(!result.fallback_used);
        let output = result.output_path.unwrap();
        assert!(output.ends_with("text.txt"));
        assert_eq!(std::fs::read_to_string(output).unwrap(), result.text);
        assert!(!dir.path().read_dir().unwrap().any(|e| e.unwrap().path().join("temp").exists()));
    }

    #[test]
    fn test_second_run_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("page.html");
        std::fs::write(&input, "<html><body><p>Hello from the archive</p></body></html>").unwrap();
        let explicit = dir.path().join("out").join("page.txt");
        let processor = processor();

        let first = processor
            .process_file(&ExecContext::new(), &input, Some(&explicit))
            .unwrap();
        assert_eq!(first.extractor_used, "html");
        assert_eq!(first.text, "Hello from the archive");

        let second = processor
            .process_file(&ExecContext::new(), &input, Some(&explicit))
            .unwrap();
        assert!(second.is_cached());
        assert_eq!(second.text, first.text);
        assert!(second.attempted_extractors.is_empty());
    }

    #[test]
    fn test_explicit_output_also_caches_text() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.txt");
        std::fs::write(&input, "plain text content").unwrap();
        let explicit = dir.path().join("result.txt");

        processor()
            .process_file(&ExecContext::new(), &input, Some(&explicit))
            .unwrap();

        let info = identify(&input).unwrap();
        let store = ArtifactStore::for_input(&input, &info.fingerprint);
        assert_eq!(
            std::fs::read_to_string(store.text_path()).unwrap(),
            "plain text content"
        );
        assert!(!dir.path().join(WRITE_PROBE).exists());
    }

    #[test]
    fn test_image_pdf_through_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.pdf");
        std::fs::write(&input, b"%PDF-1.4 scanned").unwrap();
        let info = identify(&input).unwrap();
        let store = ArtifactStore::for_input(&input, &info.fingerprint);
        store.create_dir(PAGES_DIR).unwrap();
        std::fs::write(store.page(1).pdf_path, "first page text").unwrap();
        std::fs::write(store.page(2).pdf_path, "second page text").unwrap();

        let result = processor()
            .process_file(&ExecContext::new(), &input, None)
            .unwrap();

        assert_eq!(result.extractor_used, "ocr");
        assert_eq!(
            result.text,
            "--- Page 1 ---\nfirst page text\n\n--- Page 2 ---\nsecond page text"
        );
    }

    #[test]
    fn test_short_ocr_text_never_becomes_cached() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.pdf");
        std::fs::write(&input, b"%PDF-1.4 scanned").unwrap();
        let info = identify(&input).unwrap();
        let store = ArtifactStore::for_input(&input, &info.fingerprint);
        store.create_dir(PAGES_DIR).unwrap();
        std::fs::write(store.page(1).pdf_path, "short").unwrap();

        let mut config = config();
        config.extraction.min_text_threshold = 50;
        let processor = processor_with(config);

        for _ in 0..2 {
            let err = processor
                .process_file(&ExecContext::new(), &input, None)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
            assert!(!store.text_path().exists());
        }
    }

    #[test]
    fn test_short_existing_output_is_extracted_again() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("notes.txt");
        std::fs::write(&input, "Meeting notes for Monday").unwrap();
        let explicit = dir.path().join("notes.out");
        std::fs::write(&explicit, "tiny").unwrap();

        let result = processor()
            .process_file(&ExecContext::new(), &input, Some(&explicit))
            .unwrap();

        assert_eq!(result.extractor_used, "text");
        assert_eq!(
            std::fs::read_to_string(&explicit).unwrap(),
            "Meeting notes for Monday"
        );
    }

    #[test]
    fn test_unknown_document_skips_ocr() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("report.docx");
        std::fs::write(&input, b"PK\x03\x04word/document.xml").unwrap();
        let info = identify(&input).unwrap();
        let store = ArtifactStore::for_input(&input, &info.fingerprint);

        let err = processor()
            .process_file(&ExecContext::new(), &input, None)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(err.to_string().contains("does not support"));
        assert!(!store.pages_dir().exists());
        assert!(!store.ocr_data_path().exists());
    }

    #[test]
    fn test_missing_input() {
        let err = processor()
            .process_file(&ExecContext::new(), Path::new("/nonexistent/in.txt"), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_empty_and_directory_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let processor = processor();
        let ctx = ExecContext::new();

        let err = processor.process_file(&ctx, Path::new(""), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = processor.process_file(&ctx, dir.path(), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_directory_output_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.txt");
        std::fs::write(&input, "plain text content").unwrap();

        let err = processor()
            .process_file(&ExecContext::new(), &input, Some(dir.path()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_oversized_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("big.txt");
        std::fs::write(&input, "x".repeat(64)).unwrap();

        let mut config = config();
        config.extraction.max_file_size = 32;
        config.extraction.large_file_warning = 16;
        let mut registry = ExtractorRegistry::new();
        registry.register(Arc::new(TextExtractor));
        let processor = FileProcessor::with_registry(config, registry).unwrap();

        let err = processor
            .process_file(&ExecContext::new(), &input, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_failed_chain_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("short.txt");
        std::fs::write(&input, "tiny").unwrap();
        let explicit = dir.path().join("short.out");

        let err = processor()
            .process_file(&ExecContext::new(), &input, Some(&explicit))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!explicit.exists());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = config();
        config.ocr.max_concurrency = 0;
        assert!(FileProcessor::new(config, Arc::new(AutoSelector)).is_err());
    }
}
