//! Content-addressed persistent artifacts.
//!
//! Every path is a pure function of the input directory, the content
//! fingerprint and a logical name. A file existing at its path is the only
//! record that the work producing it has completed.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, ResultExt};
use crate::store::ScratchSpace;

/// Final aggregated document text.
pub const TEXT_FILE: &str = "text.txt";
/// Engine-level results cache.
pub const OCR_DATA_FILE: &str = "ocr_data.json";
/// Directory holding per-page artifacts.
pub const PAGES_DIR: &str = "pages";
/// Ephemeral scratch directory.
pub const TEMP_DIR: &str = "temp";

/// Upper bound when counting split pages.
pub const MAX_PAGES: u32 = 10_000;

/// Artifact layout for one input file, rooted at `{input_dir}/{fingerprint}`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    fingerprint: String,
}

impl ArtifactStore {
    pub fn new(input_dir: impl AsRef<Path>, fingerprint: impl Into<String>) -> Self {
        let fingerprint = fingerprint.into();
        Self {
            root: input_dir.as_ref().join(&fingerprint),
            fingerprint,
        }
    }

    /// Store placed next to `input`.
    pub fn for_input(input: &Path, fingerprint: &str) -> Self {
        let dir = input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self::new(dir, fingerprint)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Create the base directory if needed.
    pub fn ensure_base_dir(&self) -> Result<&Path> {
        std::fs::create_dir_all(&self.root)
            .context(format!("failed to create {}", self.root.display()))?;
        Ok(&self.root)
    }

    /// Path of a logical artifact. Performs no I/O.
    pub fn path(&self, logical_name: &str) -> PathBuf {
        self.root.join(logical_name)
    }

    /// Create (idempotently) a named intermediate directory.
    pub fn create_dir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.root.join(sanitize_name(name));
        std::fs::create_dir_all(&dir)
            .context(format!("failed to create {}", dir.display()))?;
        debug!("Intermediate directory ready: {}", dir.display());
        Ok(dir)
    }

    pub fn text_path(&self) -> PathBuf {
        self.path(TEXT_FILE)
    }

    pub fn ocr_data_path(&self) -> PathBuf {
        self.path(OCR_DATA_FILE)
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.path(PAGES_DIR)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.path(TEMP_DIR)
    }

    /// Artifact paths for page `number` (1-based).
    pub fn page(&self, number: u32) -> PageUnit {
        let pages = self.pages_dir();
        PageUnit {
            number,
            pdf_path: pages.join(page_pdf_name(number)),
            text_path: pages.join(format!("page_{number}.txt")),
            image_path: pages.join(format!("page_{number}.png")),
        }
    }

    /// Number of split page files present as a dense run starting at page 1.
    pub fn count_contiguous_pages(&self) -> u32 {
        count_contiguous_pages_in(&self.pages_dir())
    }

    /// Scratch space for one run, under `temp/`.
    pub fn scratch(&self) -> ScratchSpace {
        ScratchSpace::new(self.temp_dir())
    }
}

/// One page of a split document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageUnit {
    /// 1-based page number.
    pub number: u32,
    pub pdf_path: PathBuf,
    /// Existence of this file marks the page as done.
    pub text_path: PathBuf,
    /// Only created when the engine needs a raster image.
    pub image_path: PathBuf,
}

impl PageUnit {
    pub fn is_done(&self) -> bool {
        self.text_path.is_file()
    }
}

/// File name the splitter gives page `number`.
pub fn page_pdf_name(number: u32) -> String {
    format!("page_{number}.pdf")
}

/// Count `page_1.pdf`, `page_2.pdf`, ... in `dir`, stopping at the first gap.
pub fn count_contiguous_pages_in(dir: &Path) -> u32 {
    let mut count = 0;
    while count < MAX_PAGES && dir.join(page_pdf_name(count + 1)).is_file() {
        count += 1;
    }
    count
}

/// Write `contents` through a sibling temporary file and rename it into place,
/// so readers never observe a partially written artifact.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).context(format!("failed to create {}", parent.display()))?;

    let mut file = tempfile::Builder::new()
        .prefix(".doctext-")
        .suffix(".part")
        .tempfile_in(parent)
        .context(format!("failed to write {}", path.display()))?;
    file.write_all(contents.as_bytes())
        .context(format!("failed to write {}", path.display()))?;
    file.persist(path)
        .map_err(|e| e.error)
        .context(format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Replace characters outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match sanitized.trim_matches('.') {
        "" => "_".to_string(),
        _ => sanitized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_paths_are_deterministic() {
        let a = ArtifactStore::new("/data/in", "abc123");
        let b = ArtifactStore::new("/data/in", "abc123");

        assert_eq!(a.text_path(), PathBuf::from("/data/in/abc123/text.txt"));
        assert_eq!(a.ocr_data_path(), b.ocr_data_path());
        assert_eq!(a.page(3), b.page(3));
        assert_eq!(
            a.page(3).image_path,
            PathBuf::from("/data/in/abc123/pages/page_3.png")
        );
    }

    #[test]
    fn test_for_input_uses_parent_dir() {
        let store = ArtifactStore::for_input(Path::new("docs/report.pdf"), "ff00");
        assert_eq!(store.root(), Path::new("docs/ff00"));

        let store = ArtifactStore::for_input(Path::new("report.pdf"), "ff00");
        assert_eq!(store.root(), Path::new("./ff00"));
    }

    #[test]
    fn test_count_contiguous_pages_stops_at_gap() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), "fp");
        store.create_dir(PAGES_DIR).unwrap();

        assert_eq!(store.count_contiguous_pages(), 0);
        for n in [1, 2, 4] {
            std::fs::write(store.page(n).pdf_path, b"%PDF-1.4").unwrap();
        }
        assert_eq!(store.count_contiguous_pages(), 2);
    }

    #[test]
    fn test_create_dir_is_idempotent_and_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), "fp");

        let first = store.create_dir("surya results/v1").unwrap();
        let second = store.create_dir("surya results/v1").unwrap();
        assert_eq!(first, second);
        assert!(first.ends_with("surya_results_v1"));
        assert!(first.is_dir());
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fp").join("text.txt");

        write_atomic(&path, "first").unwrap();
        write_atomic(&path, "second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("fp"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("page 1.pdf"), "page_1.pdf");
        assert_eq!(sanitize_name("../etc"), ".._etc");
        assert_eq!(sanitize_name(".."), "_");
    }
}
