//! Engine-level results cache stored in `ocr_data.json`.
//!
//! This layer sits below the pipeline's page cache and is best-effort: a
//! missing, unreadable or corrupt cache file only costs a fresh engine call.
//!
//! Keys are the fingerprint of the file the engine actually consumed: a split
//! page PDF, a rasterized page or an image input. Only for a single image
//! input does that equal the document fingerprint; a PDF gets one entry per
//! page, never one entry for the whole document.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::exec::ExecContext;
use crate::store::{ScratchSpace, fingerprint_file, lock, write_atomic};

use super::OcrEngine;

/// `{ engine name: { content fingerprint: text } }`
type CacheData = BTreeMap<String, BTreeMap<String, String>>;

/// Persistent map from (engine, input fingerprint) to recognized text.
#[derive(Debug)]
pub struct EngineCache {
    path: PathBuf,
    guard: Mutex<()>,
}

impl EngineCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, engine: &str, fingerprint: &str) -> Option<String> {
        let _guard = lock(&self.guard);
        self.load()
            .get(engine)
            .and_then(|entries| entries.get(fingerprint))
            .cloned()
    }

    pub fn put(&self, engine: &str, fingerprint: &str, text: &str) {
        let _guard = lock(&self.guard);
        let mut data = self.load();
        data.entry(engine.to_string())
            .or_default()
            .insert(fingerprint.to_string(), text.to_string());

        let result = serde_json::to_string_pretty(&data)
            .map_err(Error::from)
            .and_then(|json| write_atomic(&self.path, &json));
        if let Err(e) = result {
            warn!("Failed to update engine cache {}: {}", self.path.display(), e);
        }
    }

    fn load(&self) -> CacheData {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return CacheData::new(),
            Err(e) => {
                warn!("Cannot read engine cache {}: {}", self.path.display(), e);
                return CacheData::new();
            }
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Ignoring corrupt engine cache {}: {}", self.path.display(), e);
            CacheData::new()
        })
    }
}

/// Wraps an engine with an [`EngineCache`].
///
/// Entries are keyed by the fingerprint of the file handed to the engine,
/// so each split page or image gets its own entry.
pub struct CachedEngine {
    inner: Arc<dyn OcrEngine>,
    cache: EngineCache,
}

impl CachedEngine {
    pub fn new(inner: Arc<dyn OcrEngine>, cache: EngineCache) -> Self {
        Self { inner, cache }
    }

    fn cached(&self, input: &Path, call: impl FnOnce() -> Result<String>) -> Result<String> {
        let key = match fingerprint_file(input) {
            Ok(key) => Some(key),
            Err(e) => {
                debug!("Engine cache disabled for {}: {}", input.display(), e);
                None
            }
        };

        if let Some(text) = key.as_deref().and_then(|k| self.cache.get(self.inner.name(), k)) {
            debug!("Engine cache hit for {}", input.display());
            return Ok(text);
        }

        let text = call()?;
        if let Some(key) = key.as_deref() {
            if !text.trim().is_empty() {
                self.cache.put(self.inner.name(), key, &text);
            }
        }
        Ok(text)
    }
}

impl OcrEngine for CachedEngine {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn supports_direct_pages(&self) -> bool {
        self.inner.supports_direct_pages()
    }

    fn extract_from_page(
        &self,
        ctx: &ExecContext,
        scratch: &ScratchSpace,
        page: &Path,
    ) -> Result<String> {
        self.cached(page, || self.inner.extract_from_page(ctx, scratch, page))
    }

    fn extract_from_image(
        &self,
        ctx: &ExecContext,
        scratch: &ScratchSpace,
        image: &Path,
    ) -> Result<String> {
        self.cached(image, || self.inner.extract_from_image(ctx, scratch, image))
    }
}
