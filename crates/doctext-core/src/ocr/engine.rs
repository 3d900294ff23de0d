//! Engine kinds, selection and construction.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::exec::tool_available;
use crate::models::config::{ContentMode, DoctextConfig, OcrStrategy, ToolsConfig};

use super::{LlmCallerEngine, OcrEngine, SuryaEngine};

/// Known OCR engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Surya,
    LlmCaller,
}

impl EngineKind {
    /// Every engine, in order of preference for automatic selection.
    pub const ALL: [EngineKind; 2] = [EngineKind::Surya, EngineKind::LlmCaller];

    pub fn name(self) -> &'static str {
        match self {
            EngineKind::Surya => "surya_ocr",
            EngineKind::LlmCaller => "llm-caller",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            EngineKind::Surya => "Surya OCR (local OCR tool)",
            EngineKind::LlmCaller => "LLM Caller (OCR with configurable AI models)",
        }
    }

    /// Engine fixed by a strategy, if any.
    pub fn from_strategy(strategy: OcrStrategy) -> Option<Self> {
        match strategy {
            OcrStrategy::Interactive => None,
            OcrStrategy::Surya => Some(EngineKind::Surya),
            OcrStrategy::LlmCaller => Some(EngineKind::LlmCaller),
        }
    }

    /// Configured executable backing this engine.
    pub fn tool_path(self, tools: &ToolsConfig) -> &Path {
        match self {
            EngineKind::Surya => &tools.surya_ocr,
            EngineKind::LlmCaller => &tools.llm_caller,
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of engine selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineChoice {
    pub kind: EngineKind,
    /// Template chosen alongside the LLM caller; overrides the configured one.
    pub llm_template: Option<String>,
}

impl EngineChoice {
    pub fn new(kind: EngineKind) -> Self {
        Self {
            kind,
            llm_template: None,
        }
    }
}

/// Picks an engine when the strategy is interactive.
pub trait EngineSelector: Send + Sync {
    /// Choose among `available`, which is never empty.
    fn select(&self, available: &[EngineKind]) -> Result<EngineChoice>;
}

/// Non-interactive selection: Surya when installed, otherwise the first available engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoSelector;

impl EngineSelector for AutoSelector {
    fn select(&self, available: &[EngineKind]) -> Result<EngineChoice> {
        EngineKind::ALL
            .into_iter()
            .find(|kind| available.contains(kind))
            .map(EngineChoice::new)
            .ok_or_else(|| Error::not_found("no OCR tools available"))
    }
}

/// Engines whose executables can be found.
pub fn available_engines(tools: &ToolsConfig) -> Vec<EngineKind> {
    EngineKind::ALL
        .into_iter()
        .filter(|kind| tool_available(kind.tool_path(tools)))
        .collect()
}

/// Resolve the engine for a run.
///
/// A pinned strategy must name an installed tool. Interactive selection is
/// automatic in text content mode and delegated to `selector` otherwise.
pub fn resolve_engine(
    config: &DoctextConfig,
    selector: &dyn EngineSelector,
) -> Result<Arc<dyn OcrEngine>> {
    let choice = match EngineKind::from_strategy(config.ocr.strategy) {
        Some(kind) => {
            let tool = kind.tool_path(&config.tools);
            if !tool_available(tool) {
                return Err(Error::not_found(format!(
                    "OCR tool '{}' is not available ({})",
                    kind,
                    tool.display()
                )));
            }
            EngineChoice::new(kind)
        }
        None => {
            let available = available_engines(&config.tools);
            if available.is_empty() {
                return Err(Error::not_found(
                    "no OCR tools available; install surya_ocr or llm-caller",
                ));
            }
            debug!("Available OCR engines: {:?}", available);
            if config.extraction.content_mode == ContentMode::Text {
                AutoSelector.select(&available)?
            } else {
                selector.select(&available)?
            }
        }
    };

    info!("Using OCR engine: {}", choice.kind.description());
    create_engine(choice.kind, config, choice.llm_template.as_deref())
}

/// Construct an engine. `llm_template` overrides the configured template.
pub fn create_engine(
    kind: EngineKind,
    config: &DoctextConfig,
    llm_template: Option<&str>,
) -> Result<Arc<dyn OcrEngine>> {
    match kind {
        EngineKind::Surya => Ok(Arc::new(SuryaEngine::new(config.tools.surya_ocr.clone()))),
        EngineKind::LlmCaller => {
            let template = llm_template
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .or_else(|| config.llm_template())
                .unwrap_or_default();
            let engine = LlmCallerEngine::new(
                config.tools.llm_caller.clone(),
                template,
                config.ocr.llm_direct_pages,
            )?;
            Ok(Arc::new(engine))
        }
    }
}
