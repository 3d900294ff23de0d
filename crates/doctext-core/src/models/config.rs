//! Configuration structures for extraction and the OCR pipeline.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::retry::RetryPolicy;

/// Upper bound accepted for `ocr.max_concurrency`.
pub const MAX_CONCURRENCY_LIMIT: usize = 20;

/// Main configuration for the doctext pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DoctextConfig {
    /// External tool locations.
    pub tools: ToolsConfig,

    /// OCR engine and page pipeline configuration.
    pub ocr: OcrConfig,

    /// Strategy chain and output configuration.
    pub extraction: ExtractionConfig,

    /// Overall time budget for processing one file, in minutes.
    pub timeout_minutes: u64,
}

impl Default for DoctextConfig {
    fn default() -> Self {
        Self {
            tools: ToolsConfig::default(),
            ocr: OcrConfig::default(),
            extraction: ExtractionConfig::default(),
            timeout_minutes: 30,
        }
    }
}

/// Paths (or bare names resolved through `PATH`) of external tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Ghostscript, used to split and rasterize PDFs.
    pub ghostscript: PathBuf,

    /// Surya OCR command line tool.
    pub surya_ocr: PathBuf,

    /// Prompt-driven LLM caller.
    pub llm_caller: PathBuf,

    /// Calibre's `ebook-convert`.
    pub ebook_convert: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ghostscript: PathBuf::from("gs"),
            surya_ocr: PathBuf::from("surya_ocr"),
            llm_caller: PathBuf::from("llm-caller"),
            ebook_convert: PathBuf::from("ebook-convert"),
        }
    }
}

/// How the OCR engine is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OcrStrategy {
    /// Ask an [`EngineSelector`](crate::ocr::EngineSelector) when a document needs OCR.
    #[default]
    #[serde(rename = "interactive")]
    Interactive,
    /// Always use Surya.
    #[serde(rename = "surya_ocr")]
    Surya,
    /// Always use the LLM caller.
    #[serde(rename = "llm-caller")]
    LlmCaller,
}

impl OcrStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            OcrStrategy::Interactive => "interactive",
            OcrStrategy::Surya => "surya_ocr",
            OcrStrategy::LlmCaller => "llm-caller",
        }
    }

    /// Whether the caller fixed an engine up front.
    pub fn is_pinned(self) -> bool {
        self != OcrStrategy::Interactive
    }
}

impl fmt::Display for OcrStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OcrStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "interactive" => Ok(OcrStrategy::Interactive),
            "surya_ocr" | "surya" => Ok(OcrStrategy::Surya),
            "llm-caller" | "llm_caller" => Ok(OcrStrategy::LlmCaller),
            other => Err(Error::config(format!(
                "invalid OCR strategy '{other}' (expected interactive, surya_ocr or llm-caller)"
            ))),
        }
    }
}

/// OCR engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Engine selection strategy.
    pub strategy: OcrStrategy,

    /// Template name passed to the LLM caller.
    pub llm_template: Option<String>,

    /// Whether the LLM caller receives page PDFs directly instead of rasterized pages.
    pub llm_direct_pages: bool,

    /// DPI for rasterizing PDF pages.
    pub raster_dpi: u32,

    /// Attempts per page before the page is skipped.
    pub page_retries: u32,

    /// Attempts for splitting a document into pages.
    pub split_retries: u32,

    /// Number of pages processed in parallel.
    pub max_concurrency: usize,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            strategy: OcrStrategy::Interactive,
            llm_template: None,
            llm_direct_pages: true,
            raster_dpi: 300,
            page_retries: 2,
            split_retries: 3,
            max_concurrency: 4,
        }
    }
}

/// Which PDF strategy chain applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    /// Try document conversion before OCR.
    Text,
    /// Treat PDFs as scanned images and OCR them.
    #[default]
    Image,
}

impl ContentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentMode::Text => "text",
            ContentMode::Image => "image",
        }
    }
}

impl fmt::Display for ContentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(ContentMode::Text),
            "image" => Ok(ContentMode::Image),
            other => Err(Error::config(format!(
                "invalid content mode '{other}' (expected text or image)"
            ))),
        }
    }
}

/// Strategy chain and output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// PDF content mode.
    pub content_mode: ContentMode,

    /// Minimum number of characters a strategy must return.
    pub min_text_threshold: usize,

    /// Reuse existing outputs and cached text.
    pub skip_existing: bool,

    /// Attempts per strategy and per file operation.
    pub max_retries: u32,

    /// Base delay between attempts, in milliseconds.
    pub retry_delay_ms: u64,

    /// Files larger than this are rejected.
    pub max_file_size: u64,

    /// Files larger than this are processed with a warning.
    pub large_file_warning: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            content_mode: ContentMode::Image,
            min_text_threshold: 10,
            skip_existing: true,
            max_retries: 3,
            retry_delay_ms: 1000,
            max_file_size: 100 * 1024 * 1024,
            large_file_warning: 10 * 1024 * 1024,
        }
    }
}

impl ExtractionConfig {
    /// Retry policy for strategies and file operations.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl DoctextConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_kind(ErrorKind::Config, format!("invalid config {}", path.display()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check numeric ranges and cross-field requirements.
    pub fn validate(&self) -> Result<()> {
        if self.ocr.max_concurrency == 0 || self.ocr.max_concurrency > MAX_CONCURRENCY_LIMIT {
            return Err(Error::config(format!(
                "ocr.max_concurrency must be between 1 and {MAX_CONCURRENCY_LIMIT}, got {}",
                self.ocr.max_concurrency
            )));
        }
        if self.ocr.page_retries == 0 || self.ocr.split_retries == 0 {
            return Err(Error::config("OCR retry counts must be at least 1"));
        }
        if self.ocr.raster_dpi == 0 {
            return Err(Error::config("ocr.raster_dpi must be positive"));
        }
        if self.extraction.min_text_threshold == 0 {
            return Err(Error::config("extraction.min_text_threshold must be at least 1"));
        }
        if self.extraction.max_retries == 0 {
            return Err(Error::config("extraction.max_retries must be at least 1"));
        }
        if self.extraction.large_file_warning > self.extraction.max_file_size {
            return Err(Error::config(
                "extraction.large_file_warning must not exceed extraction.max_file_size",
            ));
        }
        if self.timeout_minutes == 0 {
            return Err(Error::config("timeout_minutes must be at least 1"));
        }
        if self.ocr.strategy == OcrStrategy::LlmCaller && self.llm_template().is_none() {
            return Err(Error::config(
                "ocr.llm_template is required when the llm-caller strategy is selected",
            ));
        }
        Ok(())
    }

    /// Configured LLM template, ignoring blank values.
    pub fn llm_template(&self) -> Option<&str> {
        self.ocr
            .llm_template
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Time budget for processing one file.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_minutes * 60)
    }
}
