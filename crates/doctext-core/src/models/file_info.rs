//! Input file metadata and classification.

use std::fmt;

use serde::{Deserialize, Serialize};

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "xml", "json", "csv", "py", "js", "ts", "c", "cpp", "h", "java", "sh",
];
const HTML_EXTENSIONS: &[&str] = &["html", "htm", "mhtml", "mht"];
const EBOOK_EXTENSIONS: &[&str] = &["epub", "mobi"];
const OCR_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp"];

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "svg", "webp", "tiff", "tif",
];
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mov", "mkv", "wmv", "flv", "webm", "m4v", "mpg", "mpeg",
];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac", "aac", "m4a", "wma"];

/// Coarse media category of an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaCategory {
    Document,
    Image,
    Video,
    Audio,
}

impl MediaCategory {
    /// Derive the category from the extension, falling back to the MIME type.
    pub fn detect(extension: &str, mime_type: &str) -> Self {
        if IMAGE_EXTENSIONS.contains(&extension) {
            MediaCategory::Image
        } else if VIDEO_EXTENSIONS.contains(&extension) {
            MediaCategory::Video
        } else if AUDIO_EXTENSIONS.contains(&extension) {
            MediaCategory::Audio
        } else if mime_type.starts_with("image/") {
            MediaCategory::Image
        } else if mime_type.starts_with("video/") {
            MediaCategory::Video
        } else if mime_type.starts_with("audio/") {
            MediaCategory::Audio
        } else {
            MediaCategory::Document
        }
    }
}

/// Classification that selects the strategy chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileClass {
    /// Plain or structured text, including source code.
    PlainText,
    /// HTML and MHTML web archives.
    Html,
    /// EPUB and MOBI e-books.
    Ebook,
    Pdf,
    /// Raster images handled by OCR.
    Image,
    /// Anything else.
    Unknown,
}

impl FileClass {
    pub fn from_extension(extension: &str) -> Self {
        if TEXT_EXTENSIONS.contains(&extension) {
            FileClass::PlainText
        } else if HTML_EXTENSIONS.contains(&extension) {
            FileClass::Html
        } else if EBOOK_EXTENSIONS.contains(&extension) {
            FileClass::Ebook
        } else if extension == "pdf" {
            FileClass::Pdf
        } else if OCR_IMAGE_EXTENSIONS.contains(&extension) {
            FileClass::Image
        } else {
            FileClass::Unknown
        }
    }
}

impl fmt::Display for FileClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileClass::PlainText => "plain text",
            FileClass::Html => "html",
            FileClass::Ebook => "ebook",
            FileClass::Pdf => "pdf",
            FileClass::Image => "image",
            FileClass::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Metadata computed once per input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Lowercase hex SHA-256 of the file content.
    pub fingerprint: String,

    /// Lowercased extension without the dot.
    pub extension: String,

    /// MIME type sniffed from the start of the file.
    pub mime_type: String,

    /// Size in bytes.
    pub size: u64,

    pub media_category: MediaCategory,

    pub class: FileClass,
}

impl FileInfo {
    pub fn is_pdf(&self) -> bool {
        self.class == FileClass::Pdf
    }
}
