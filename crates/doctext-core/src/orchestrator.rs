//! Strategy chain selection and ordered fallback.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::extract::{ExtractJob, Extractor, ExtractorRegistry, StrategyKind};
use crate::models::{ContentMode, DoctextConfig, FileClass};
use crate::retry::RetryExecutor;

/// Ordered strategies for a file class under a content mode.
pub fn chain_for(class: FileClass, mode: ContentMode) -> Vec<StrategyKind> {
    use StrategyKind::*;
    match (class, mode) {
        (FileClass::PlainText, _) => vec![Text],
        (FileClass::Html, _) => vec![Html, Calibre],
        (FileClass::Ebook, _) => vec![Ebook],
        (FileClass::Pdf, ContentMode::Text) => vec![Calibre, Ocr],
        (FileClass::Pdf, ContentMode::Image) => vec![Ocr],
        (FileClass::Image, _) => vec![Ocr],
        (FileClass::Unknown, _) => vec![Ocr, Calibre],
    }
}

/// Text produced by a chain, with how it was obtained.
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    pub text: String,
    pub extractor_used: StrategyKind,
    pub fallback_used: bool,
    pub attempted_extractors: Vec<String>,
}

/// A chain that produced no text.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ChainFailure {
    pub error: Error,
    pub attempted_extractors: Vec<String>,
    pub fallback_used: bool,
}

impl From<ChainFailure> for Error {
    fn from(failure: ChainFailure) -> Self {
        failure.error
    }
}

/// Runs a file through its strategy chain.
pub struct Orchestrator {
    registry: ExtractorRegistry,
    retry: RetryExecutor,
    content_mode: ContentMode,
    min_text_threshold: usize,
    pinned_engine: bool,
}

impl Orchestrator {
    pub fn new(config: &DoctextConfig, registry: ExtractorRegistry) -> Self {
        Self {
            registry,
            retry: RetryExecutor::new(config.extraction.retry_policy()),
            content_mode: config.extraction.content_mode,
            min_text_threshold: config.extraction.min_text_threshold,
            pinned_engine: config.ocr.strategy.is_pinned(),
        }
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    /// Strategies that will be tried for `class`, skipping unregistered ones.
    pub fn chain(&self, class: FileClass) -> Result<Vec<Arc<dyn Extractor>>> {
        let chain: Vec<Arc<dyn Extractor>> = chain_for(class, self.content_mode)
            .into_iter()
            .filter_map(|kind| self.registry.get(kind).cloned())
            .collect();
        if chain.is_empty() {
            return Err(Error::unsupported(format!(
                "no suitable extractors found for {class} files"
            )));
        }
        Ok(chain)
    }

    /// Try each strategy in order until one returns enough text.
    pub fn extract(&self, job: &ExtractJob<'_>) -> std::result::Result<ChainOutcome, ChainFailure> {
        let mut attempted = Vec::new();
        let mut fallback_used = false;

        let chain = self.chain(job.info.class).map_err(|error| ChainFailure {
            error,
            attempted_extractors: Vec::new(),
            fallback_used: false,
        })?;
        debug!(
            "Strategy chain for {}: {:?}",
            job.input.display(),
            chain.iter().map(|e| e.name()).collect::<Vec<_>>()
        );

        let mut last_error = None;
        for (index, extractor) in chain.iter().enumerate() {
            let name = extractor.name().to_string();
            attempted.push(name.clone());
            if index > 0 {
                fallback_used = true;
                warn!("Previous extractor failed, falling back to {}", name);
            }
            info!(
                "Attempting extraction with {} ({}/{})",
                name,
                index + 1,
                chain.len()
            );

            let err = match self.attempt(extractor.as_ref(), job) {
                Ok(text) => {
                    info!(
                        "Extractor {} succeeded with {} characters",
                        name,
                        text.chars().count()
                    );
                    return Ok(ChainOutcome {
                        text,
                        extractor_used: extractor.kind(),
                        fallback_used,
                        attempted_extractors: attempted,
                    });
                }
                Err(err) => err,
            };

            if let Err(stop) = job.ctx.check() {
                warn!("Extraction interrupted during {}", name);
                return Err(ChainFailure {
                    error: stop,
                    attempted_extractors: attempted,
                    fallback_used,
                });
            }
            warn!("Extractor {} failed: {}", name, err);

            if extractor.kind() == StrategyKind::Ocr {
                let reason = if job.info.is_pdf() && self.content_mode == ContentMode::Image {
                    Some("OCR failed for image-based PDF; no fallback attempted")
                } else if self.pinned_engine {
                    Some("OCR failed with an explicitly chosen engine; no fallback attempted")
                } else {
                    None
                };
                if let Some(reason) = reason {
                    error!("{}", reason);
                    return Err(ChainFailure {
                        error: err.context(reason),
                        attempted_extractors: attempted,
                        fallback_used,
                    });
                }
            }
            last_error = Some(err);
        }

        let tried = attempted.join(", ");
        let error = match last_error {
            Some(err) => err.context(format!("all extractors failed (tried {tried})")),
            None => Error::unsupported("no suitable extractors found"),
        };
        error!("{}", error);
        Err(ChainFailure {
            error,
            attempted_extractors: attempted,
            fallback_used,
        })
    }

    /// One strategy under retry, including the minimum length check.
    fn attempt(&self, extractor: &dyn Extractor, job: &ExtractJob<'_>) -> Result<String> {
        if !extractor.supports(job.info) {
            return Err(Error::unsupported(format!(
                "extractor '{}' does not support {} files",
                extractor.name(),
                job.info.class
            )));
        }

        let label = format!("extractor '{}'", extractor.name());
        self.retry.run(job.ctx, &label, || {
            let text = extractor.extract(job)?;
            let chars = text.trim().chars().count();
            if chars < self.min_text_threshold {
                return Err(Error::validation(format!(
                    "extracted text below minimum threshold ({chars} < {} chars)",
                    self.min_text_threshold
                )));
            }
            Ok(text)
        })
    }
}
