//! Ghostscript page splitting and rasterization.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result, ResultExt};
use crate::exec::{ExecContext, ToolCommand};
use crate::store::ScratchSpace;
use crate::store::artifacts::{count_contiguous_pages_in, page_pdf_name};

/// Ghostscript messages that only mean the page range was over-specified.
const BENIGN_SPLIT_MESSAGES: &[&str] = &["exceeds page count", "Invalid page"];

/// Splits documents into single-page PDFs and renders pages to PNG.
#[derive(Debug, Clone)]
pub struct PageSplitter {
    program: PathBuf,
    dpi: u32,
}

impl PageSplitter {
    pub fn new(program: impl Into<PathBuf>, dpi: u32) -> Self {
        Self {
            program: program.into(),
            dpi,
        }
    }

    /// Split `input` into `pages_dir/page_N.pdf` and return the page count.
    ///
    /// Pages are rendered into a scratch directory first and moved into
    /// place from the last page down, so `page_1.pdf` only appears once the
    /// whole run is present.
    pub fn split(
        &self,
        ctx: &ExecContext,
        input: &Path,
        scratch: &ScratchSpace,
        pages_dir: &Path,
    ) -> Result<u32> {
        let staging = scratch.create_dir("split_")?;
        let mut output_arg = OsString::from("-sOutputFile=");
        output_arg.push(staging.join("page_%d.pdf"));

        info!("Splitting {} into pages", input.display());
        let output = ToolCommand::new(&self.program)
            .args([
                "-dNOPAUSE",
                "-dBATCH",
                "-sDEVICE=pdfwrite",
                "-dFirstPage=1",
                "-dLastPage=999999",
            ])
            .arg(output_arg)
            .arg(input)
            .run(ctx)?;

        if !output.success() {
            let combined = output.combined();
            if BENIGN_SPLIT_MESSAGES.iter().any(|m| combined.contains(m)) {
                debug!("Ignoring page range warning from ghostscript");
            } else {
                return Err(Error::system(format!(
                    "ghostscript failed to split {}: {}",
                    input.display(),
                    combined.trim()
                )));
            }
        }

        let count = count_contiguous_pages_in(&staging);
        std::fs::create_dir_all(pages_dir)
            .context(format!("failed to create {}", pages_dir.display()))?;
        for number in (1..=count).rev() {
            let name = page_pdf_name(number);
            let target = pages_dir.join(&name);
            if target.exists() {
                std::fs::remove_file(&target)?;
            }
            std::fs::rename(staging.join(&name), &target)
                .context(format!("failed to move page {number} into place"))?;
        }

        info!("Split {} into {} pages", input.display(), count);
        Ok(count)
    }

    /// Render a single-page PDF to a PNG at the configured DPI.
    pub fn rasterize(&self, ctx: &ExecContext, page: &Path, image: &Path) -> Result<()> {
        let partial = image.with_extension("png.part");
        let mut output_arg = OsString::from("-sOutputFile=");
        output_arg.push(&partial);

        ToolCommand::new(&self.program)
            .args(["-sDEVICE=png16m", "-dNOPAUSE", "-dBATCH", "-dSAFER"])
            .arg(format!("-r{}", self.dpi))
            .arg(output_arg)
            .arg(page)
            .run_checked(ctx)
            .map_err(|e| e.context(format!("failed to rasterize {}", page.display())))?;

        if !partial.is_file() {
            return Err(Error::system(format!(
                "ghostscript produced no image for {}",
                page.display()
            )));
        }
        std::fs::rename(&partial, image)
            .context(format!("failed to move {} into place", image.display()))?;
        debug!("Rasterized {} at {} dpi", page.display(), self.dpi);
        Ok(())
    }
}
