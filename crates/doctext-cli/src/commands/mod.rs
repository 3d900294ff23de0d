//! Subcommands and the plumbing they share.

pub mod batch;
pub mod config;
pub mod engines;
pub mod extract;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use console::style;

use doctext_core::{ContentMode, DoctextConfig, ExecContext, FileProcessor, OcrStrategy};

use crate::prompt::PromptSelector;

/// `$CONFIG_DIR/doctext/config.json`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("doctext")
        .join("config.json")
}

/// Explicit config file, else the default file if present, else defaults.
pub fn load_config(config_path: Option<&Path>) -> anyhow::Result<DoctextConfig> {
    match config_path {
        Some(path) => Ok(DoctextConfig::from_file(path)?),
        None => {
            let path = default_config_path();
            if path.exists() {
                Ok(DoctextConfig::from_file(&path)?)
            } else {
                Ok(DoctextConfig::default())
            }
        }
    }
}

/// Per-run overrides shared by `extract` and `batch`.
#[derive(Args, Debug, Clone)]
pub struct ExtractOptions {
    /// How PDFs are treated: text (convert first) or image (OCR)
    #[arg(long, value_parser = parse_content_mode)]
    content_mode: Option<ContentMode>,

    /// OCR engine: interactive, surya_ocr or llm-caller
    #[arg(long, value_parser = parse_ocr_strategy)]
    ocr: Option<OcrStrategy>,

    /// Prompt template for llm-caller
    #[arg(long)]
    llm_template: Option<String>,

    /// Pages processed in parallel
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Minimum characters a strategy must return
    #[arg(long)]
    min_text: Option<usize>,

    /// Re-extract even when output already exists
    #[arg(short, long)]
    force: bool,

    /// Time budget per file, in minutes
    #[arg(long)]
    timeout: Option<u64>,
}

impl ExtractOptions {
    pub fn apply(&self, config: &mut DoctextConfig) {
        if let Some(mode) = self.content_mode {
            config.extraction.content_mode = mode;
        }
        if let Some(strategy) = self.ocr {
            config.ocr.strategy = strategy;
        }
        if let Some(template) = &self.llm_template {
            config.ocr.llm_template = Some(template.clone());
        }
        if let Some(concurrency) = self.concurrency {
            config.ocr.max_concurrency = concurrency;
        }
        if let Some(min_text) = self.min_text {
            config.extraction.min_text_threshold = min_text;
        }
        if self.force {
            config.extraction.skip_existing = false;
        }
        if let Some(minutes) = self.timeout {
            config.timeout_minutes = minutes;
        }
    }
}

fn parse_content_mode(s: &str) -> Result<ContentMode, String> {
    s.parse().map_err(|e: doctext_core::Error| e.to_string())
}

fn parse_ocr_strategy(s: &str) -> Result<OcrStrategy, String> {
    s.parse().map_err(|e: doctext_core::Error| e.to_string())
}

/// Build a processor for the effective configuration.
pub fn build_processor(config: DoctextConfig) -> anyhow::Result<Arc<FileProcessor>> {
    let selector = Arc::new(PromptSelector::new(config.llm_template().is_some()));
    Ok(Arc::new(FileProcessor::new(config, selector)?))
}

/// Run blocking work with Ctrl-C wired to `ctx`.
pub async fn run_cancellable<T, F>(ctx: ExecContext, work: F) -> anyhow::Result<T>
where
    F: FnOnce(&ExecContext) -> T + Send + 'static,
    T: Send + 'static,
{
    let worker_ctx = ctx.clone();
    let mut task = tokio::task::spawn_blocking(move || work(&worker_ctx));

    tokio::select! {
        joined = &mut task => Ok(joined?),
        _ = tokio::signal::ctrl_c() => {
            eprintln!("{} Interrupted, stopping...", style("!").yellow());
            ctx.cancel();
            Ok(task.await?)
        }
    }
}
