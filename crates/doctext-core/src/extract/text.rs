//! Plain and structured text files.

use tracing::debug;

use crate::error::{Result, ResultExt};
use crate::models::{FileClass, FileInfo};

use super::{ExtractJob, Extractor, StrategyKind};

/// Reads the file as UTF-8, replacing invalid sequences.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextExtractor;

impl Extractor for TextExtractor {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Text
    }

    fn supports(&self, info: &FileInfo) -> bool {
        info.class == FileClass::PlainText
            || info.mime_type.starts_with("text/plain")
            || info.mime_type == "application/json"
    }

    fn extract(&self, job: &ExtractJob<'_>) -> Result<String> {
        job.ctx.check()?;
        let bytes = std::fs::read(job.input)
            .context(format!("failed to read {}", job.input.display()))?;
        debug!("Read {} bytes of text from {}", bytes.len(), job.input.display());
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
