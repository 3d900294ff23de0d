//! E-books (EPUB and MOBI).

use std::path::PathBuf;

use tracing::info;

use crate::error::Result;
use crate::models::{FileClass, FileInfo};

use super::converter::convert_to_text;
use super::{ExtractJob, Extractor, StrategyKind};

const EBOOK_MIME_TYPES: &[&str] = &["application/epub+zip", "application/x-mobipocket-ebook"];

/// E-book text through `ebook-convert`.
#[derive(Debug, Clone)]
pub struct EbookExtractor {
    program: PathBuf,
}

impl EbookExtractor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Extractor for EbookExtractor {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Ebook
    }

    fn supports(&self, info: &FileInfo) -> bool {
        info.class == FileClass::Ebook || EBOOK_MIME_TYPES.contains(&info.mime_type.as_str())
    }

    fn extract(&self, job: &ExtractJob<'_>) -> Result<String> {
        info!("Processing e-book {}", job.input.display());
        let text = convert_to_text(&self.program, job, "ebook")?;
        info!("E-book conversion produced {} characters", text.chars().count());
        Ok(text)
    }
}
