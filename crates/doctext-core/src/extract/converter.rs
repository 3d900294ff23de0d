//! Generic document conversion through Calibre's `ebook-convert`.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result, ResultExt};
use crate::exec::ToolCommand;
use crate::models::{FileClass, FileInfo};

use super::{ExtractJob, Extractor, StrategyKind};

const CONVERTIBLE_EXTENSIONS: &[&str] = &[
    "epub", "mobi", "azw", "azw3", "fb2", "lit", "lrf", "pdb", "pdf", "html", "htm", "mhtml",
    "mht", "doc", "docx", "rtf", "odt", "txt",
];

/// Convert `job.input` to plain text in a scratch file and read it back.
pub(crate) fn convert_to_text(
    program: &Path,
    job: &ExtractJob<'_>,
    prefix: &str,
) -> Result<String> {
    let output = job.scratch.create_file(prefix, ".txt")?;
    debug!("Converting {} to {}", job.input.display(), output.display());

    ToolCommand::new(program)
        .arg(job.input)
        .arg(&output)
        .run_checked(job.ctx)
        .map_err(|e| e.context(format!("ebook-convert failed on {}", job.input.display())))?;

    let bytes = std::fs::read(&output)
        .context(format!("failed to read converted text {}", output.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Last-resort conversion for anything Calibre can read.
#[derive(Debug, Clone)]
pub struct ConverterExtractor {
    program: PathBuf,
    min_text_threshold: usize,
}

impl ConverterExtractor {
    pub fn new(program: impl Into<PathBuf>, min_text_threshold: usize) -> Self {
        Self {
            program: program.into(),
            min_text_threshold,
        }
    }
}

impl Extractor for ConverterExtractor {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Calibre
    }

    fn supports(&self, info: &FileInfo) -> bool {
        info.class == FileClass::Unknown
            || CONVERTIBLE_EXTENSIONS.contains(&info.extension.as_str())
    }

    fn extract(&self, job: &ExtractJob<'_>) -> Result<String> {
        info!("Converting {} with Calibre", job.input.display());
        let text = convert_to_text(&self.program, job, "calibre_output_")?;
        let text = text.trim();

        let chars = text.chars().count();
        if chars < self.min_text_threshold {
            return Err(Error::conversion(format!(
                "converted text is too short ({chars} chars, minimum {})",
                self.min_text_threshold
            )));
        }
        debug!("Calibre conversion produced {} characters", chars);
        Ok(text.to_string())
    }
}
