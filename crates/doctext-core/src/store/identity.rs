//! Content fingerprinting and MIME sniffing.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{FileClass, FileInfo, MediaCategory};

/// Number of leading bytes inspected for MIME detection.
pub const SNIFF_LEN: usize = 512;

const EPUB_MARKER: &[u8] = b"mimetypeapplication/epub+zip";
const MOBI_MARKER: &[u8] = b"BOOKMOBI";
const MOBI_MARKER_OFFSET: usize = 60;

/// Compute [`FileInfo`] for a readable file.
///
/// The file is read once: the first [`SNIFF_LEN`] bytes feed both the MIME
/// sniffer and the hasher, the rest is streamed into the hasher.
pub fn identify(path: &Path) -> Result<FileInfo> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| Error::from(e).context(format!("cannot stat {}", path.display())))?;
    if !metadata.is_file() {
        return Err(Error::validation(format!("{} is not a regular file", path.display())));
    }

    let mut file = File::open(path)
        .map_err(|e| Error::from(e).context(format!("cannot open {}", path.display())))?;

    let mut prefix = Vec::with_capacity(SNIFF_LEN);
    (&mut file).take(SNIFF_LEN as u64).read_to_end(&mut prefix)?;

    let mut hasher = Sha256::new();
    hasher.update(&prefix);
    io::copy(&mut file, &mut hasher)?;
    let fingerprint = hex::encode(hasher.finalize());

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    let mime_type = sniff_mime(&prefix, &extension);
    let media_category = MediaCategory::detect(&extension, &mime_type);
    let class = FileClass::from_extension(&extension);

    debug!(
        "Identified {}: {} ({}, {} bytes, {})",
        path.display(),
        &fingerprint[..12],
        mime_type,
        metadata.len(),
        class
    );

    Ok(FileInfo {
        fingerprint,
        extension,
        mime_type,
        size: metadata.len(),
        media_category,
        class,
    })
}

/// SHA-256 of a file's full content, lowercase hex.
pub fn fingerprint_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Detect a MIME type from the leading bytes of a file.
///
/// Falls back to a guess from the extension, then to `application/octet-stream`.
pub fn sniff_mime(prefix: &[u8], extension: &str) -> String {
    if prefix.starts_with(b"%PDF-") {
        return "application/pdf".to_string();
    }
    if prefix.starts_with(b"PK\x03\x04") {
        if contains(prefix, EPUB_MARKER) {
            return "application/epub+zip".to_string();
        }
        return "application/zip".to_string();
    }
    if prefix.len() >= MOBI_MARKER_OFFSET + MOBI_MARKER.len()
        && &prefix[MOBI_MARKER_OFFSET..MOBI_MARKER_OFFSET + MOBI_MARKER.len()] == MOBI_MARKER
    {
        return "application/x-mobipocket-ebook".to_string();
    }
    if let Some(text) = utf8_prefix(prefix) {
        return sniff_text(text).to_string();
    }
    if let Ok(format) = image::guess_format(prefix) {
        return format.to_mime_type().to_string();
    }

    mime_guess::from_ext(extension)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

fn sniff_text(text: &str) -> &'static str {
    let head = text.trim_start_matches('\u{feff}').trim_start().to_ascii_lowercase();
    if head.starts_with("mime-version:") || head.contains("content-type: multipart/related") {
        "multipart/related"
    } else if head.starts_with("<!doctype html") || head.contains("<html") {
        "text/html"
    } else if head.contains("<svg") {
        "image/svg+xml"
    } else if head.starts_with("<?xml") {
        "application/xml"
    } else if head.starts_with('{') || head.starts_with('[') {
        "application/json"
    } else {
        "text/plain"
    }
}

/// The prefix as text, tolerating a multi-byte character cut at the end.
fn utf8_prefix(prefix: &[u8]) -> Option<&str> {
    if prefix.is_empty() || prefix.contains(&0) {
        return None;
    }
    match std::str::from_utf8(prefix) {
        Ok(text) => Some(text),
        Err(e) if e.error_len().is_none() => std::str::from_utf8(&prefix[..e.valid_up_to()]).ok(),
        Err(_) => None,
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
