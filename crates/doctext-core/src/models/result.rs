//! Outcome of processing a single file.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// `extractor_used` value reported when text came from a previous run.
pub const CACHED_EXTRACTOR: &str = "cached";

/// Result of extracting text from one input.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    /// Extracted text.
    pub text: String,

    /// Input file.
    pub source: PathBuf,

    /// Where the text was written.
    pub output_path: Option<PathBuf>,

    /// Name of the strategy that produced the text, or [`CACHED_EXTRACTOR`].
    pub extractor_used: String,

    /// Whether a strategy other than the first one in the chain succeeded.
    pub fallback_used: bool,

    /// Strategies tried, in order.
    pub attempted_extractors: Vec<String>,

    /// Wall time spent, in milliseconds.
    pub process_time_ms: u64,

    /// Error message, for results reported after a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub completed_at: DateTime<Utc>,
}

impl ExtractionResult {
    /// Whether the text was served from a previous run without running any strategy.
    pub fn is_cached(&self) -> bool {
        self.extractor_used == CACHED_EXTRACTOR
    }
}
