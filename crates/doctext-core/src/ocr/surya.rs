//! Surya OCR adapter.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::exec::{ExecContext, ToolCommand};
use crate::store::ScratchSpace;

use super::OcrEngine;
use super::engine::EngineKind;

const RESULTS_DIR_PREFIX: &str = "surya_ocr_results";
const RESULTS_FILE: &str = "results.json";

/// A text line recognized by Surya.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuryaTextLine {
    /// Recognized text.
    pub text: String,

    /// Recognition confidence (0.0 - 1.0).
    #[serde(default)]
    pub confidence: Option<f64>,

    /// Corner points of the line polygon.
    #[serde(default)]
    pub polygon: Vec<Vec<f64>>,

    /// Axis-aligned bounding box (x1, y1, x2, y2).
    #[serde(default)]
    pub bbox: Vec<f64>,
}

/// One page of Surya output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuryaPage {
    /// Lines in reading order.
    #[serde(default)]
    pub text_lines: Vec<SuryaTextLine>,

    #[serde(default)]
    pub languages: Option<Vec<String>>,

    #[serde(default)]
    pub image_bbox: Vec<f64>,

    /// 1-based page number within the source file.
    #[serde(default)]
    pub page: Option<u32>,
}

/// Extract the text of a Surya `results.json` document.
///
/// The document maps source file names to page records. Non-blank line texts
/// are joined with newlines in file, page, then line order.
pub fn parse_results(json: &str) -> Result<String> {
    let files: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)
        .with_kind(ErrorKind::Conversion, "invalid Surya results")?;

    let mut lines = Vec::new();
    for (name, pages) in files {
        let pages: Vec<SuryaPage> = serde_json::from_value(pages).with_kind(
            ErrorKind::Conversion,
            format!("invalid Surya page records for '{name}'"),
        )?;
        lines.extend(
            pages
                .into_iter()
                .flat_map(|page| page.text_lines)
                .map(|line| line.text)
                .filter(|text| !text.trim().is_empty()),
        );
    }

    Ok(lines.join("\n").trim().to_string())
}

/// Local Surya OCR command line tool.
#[derive(Debug, Clone)]
pub struct SuryaEngine {
    program: PathBuf,
}

impl SuryaEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn recognize(&self, ctx: &ExecContext, scratch: &ScratchSpace, input: &Path) -> Result<String> {
        let output_dir = scratch.create_dir(RESULTS_DIR_PREFIX)?;

        ToolCommand::new(&self.program)
            .arg("--output_dir")
            .arg(&output_dir)
            .arg(input)
            .run_checked(ctx)
            .map_err(|e| e.context(format!("surya_ocr failed on {}", input.display())))?;

        let results = find_results(&output_dir, input).ok_or_else(|| {
            Error::ocr(format!("surya_ocr produced no results for {}", input.display()))
        })?;
        debug!("Reading Surya results from {}", results.display());

        let json = std::fs::read_to_string(&results)
            .context(format!("failed to read {}", results.display()))?;
        let text = parse_results(&json)?;
        if text.is_empty() {
            return Err(Error::ocr(format!(
                "surya_ocr recognized no text in {}",
                input.display()
            )));
        }
        Ok(text)
    }
}

impl OcrEngine for SuryaEngine {
    fn name(&self) -> &str {
        EngineKind::Surya.name()
    }

    fn description(&self) -> &str {
        EngineKind::Surya.description()
    }

    fn supports_direct_pages(&self) -> bool {
        true
    }

    fn extract_from_page(
        &self,
        ctx: &ExecContext,
        scratch: &ScratchSpace,
        page: &Path,
    ) -> Result<String> {
        self.recognize(ctx, scratch, page)
    }

    fn extract_from_image(
        &self,
        ctx: &ExecContext,
        scratch: &ScratchSpace,
        image: &Path,
    ) -> Result<String> {
        self.recognize(ctx, scratch, image)
    }
}

/// `<dir>/<input stem>/results.json`, or the first JSON file found under `dir`.
fn find_results(dir: &Path, input: &Path) -> Option<PathBuf> {
    if let Some(stem) = input.file_stem() {
        let expected = dir.join(stem).join(RESULTS_FILE);
        if expected.is_file() {
            return Some(expected);
        }
    }
    first_json(dir)
}

fn first_json(dir: &Path) -> Option<PathBuf> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    if let Some(file) = entries
        .iter()
        .find(|p| p.is_file() && p.extension().is_some_and(|e| e == "json"))
    {
        return Some(file.clone());
    }
    entries.iter().filter(|p| p.is_dir()).find_map(|p| first_json(p))
}
