//! Data models shared across the pipeline.

pub mod config;
pub mod file_info;
pub mod result;

pub use config::{ContentMode, DoctextConfig, ExtractionConfig, OcrConfig, OcrStrategy, ToolsConfig};
pub use file_info::{FileClass, FileInfo, MediaCategory};
pub use result::{CACHED_EXTRACTOR, ExtractionResult};
