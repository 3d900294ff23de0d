//! Prompt-driven OCR through `llm-caller`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::exec::{ExecContext, ToolCommand};
use crate::store::ScratchSpace;
use crate::store::artifacts::sanitize_name;

use super::OcrEngine;
use super::engine::EngineKind;

const PAGE_RESULTS_PREFIX: &str = "llm_caller_results";
const IMAGE_RESULTS_PREFIX: &str = "llm_caller_image_results";

/// OCR through an LLM prompt template.
#[derive(Debug, Clone)]
pub struct LlmCallerEngine {
    program: PathBuf,
    template: String,
    direct_pages: bool,
}

impl LlmCallerEngine {
    /// Fails with a configuration error when `template` is blank.
    pub fn new(program: impl Into<PathBuf>, template: &str, direct_pages: bool) -> Result<Self> {
        let template = template.trim();
        if template.is_empty() {
            return Err(Error::config(
                "an LLM template is required for the llm-caller engine",
            ));
        }
        Ok(Self {
            program: program.into(),
            template: template.to_string(),
            direct_pages,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    fn call(
        &self,
        ctx: &ExecContext,
        scratch: &ScratchSpace,
        input: &Path,
        variable: OsString,
        results_prefix: &str,
    ) -> Result<String> {
        let output_dir = scratch.create_dir(results_prefix)?;
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        let output = output_dir.join(format!("{}_output.txt", sanitize_name(&stem)));

        debug!("Calling llm-caller template '{}' for {}", self.template, input.display());
        ToolCommand::new(&self.program)
            .arg("call")
            .arg(&self.template)
            .arg("--var")
            .arg(variable)
            .arg("-o")
            .arg(&output)
            .run_checked(ctx)
            .map_err(|e| e.context(format!("llm-caller failed on {}", input.display())))?;

        let text = std::fs::read_to_string(&output).with_kind(
            ErrorKind::Ocr,
            format!("llm-caller wrote no output for {}", input.display()),
        )?;
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::ocr(format!(
                "llm-caller returned no text for {}",
                input.display()
            )));
        }
        Ok(text.to_string())
    }
}

impl OcrEngine for LlmCallerEngine {
    fn name(&self) -> &str {
        EngineKind::LlmCaller.name()
    }

    fn description(&self) -> &str {
        EngineKind::LlmCaller.description()
    }

    fn supports_direct_pages(&self) -> bool {
        self.direct_pages
    }

    fn extract_from_page(
        &self,
        ctx: &ExecContext,
        scratch: &ScratchSpace,
        page: &Path,
    ) -> Result<String> {
        let mut variable = OsString::from("file:file:");
        variable.push(page);
        self.call(ctx, scratch, page, variable, PAGE_RESULTS_PREFIX)
    }

    fn extract_from_image(
        &self,
        ctx: &ExecContext,
        scratch: &ScratchSpace,
        image: &Path,
    ) -> Result<String> {
        let uri = image_data_uri(image)?;
        self.call(
            ctx,
            scratch,
            image,
            OsString::from(format!("image_url:text:{uri}")),
            IMAGE_RESULTS_PREFIX,
        )
    }
}

/// `data:<mime>;base64,<content>` for an image file.
pub fn image_data_uri(image: &Path) -> Result<String> {
    let bytes =
        std::fs::read(image).context(format!("failed to read image {}", image.display()))?;
    let mime = image::guess_format(&bytes)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| mime_guess::from_path(image).first_or_octet_stream().to_string());
    if !mime.starts_with("image/") {
        return Err(Error::unsupported(format!(
            "{} is not an image ({mime})",
            image.display()
        )));
    }
    Ok(format!("data:{mime};base64,{}", STANDARD.encode(&bytes)))
}
