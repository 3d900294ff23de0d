//! Core library for document text extraction.
//!
//! This crate provides:
//! - content identity (SHA-256 fingerprints, MIME sniffing, file classes)
//! - an artifact store with resumable per-page OCR state
//! - extraction strategies and the ordered fallback chain that drives them
//! - a page-level OCR pipeline over external engines (Surya, llm-caller)
//! - bounded retry with per-kind recovery hooks

pub mod error;
pub mod exec;
pub mod extract;
pub mod models;
pub mod ocr;
pub mod orchestrator;
pub mod processor;
pub mod retry;
pub mod store;

pub use error::{Error, ErrorKind, Result, ResultExt};
pub use exec::{ExecContext, ToolCommand, tool_available};
pub use extract::{ExtractJob, Extractor, ExtractorRegistry, StrategyKind};
pub use models::{
    ContentMode, DoctextConfig, ExtractionResult, FileClass, FileInfo, MediaCategory, OcrStrategy,
};
pub use ocr::{
    AutoSelector, EngineChoice, EngineKind, EngineSelector, OcrEngine, OcrPipeline,
    available_engines,
};
pub use orchestrator::{ChainFailure, ChainOutcome, Orchestrator, chain_for};
pub use processor::FileProcessor;
pub use retry::{Recovery, RetryExecutor, RetryPolicy};
pub use store::{ArtifactStore, identify};
