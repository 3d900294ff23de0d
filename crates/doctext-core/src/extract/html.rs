//! HTML and MHTML web archives.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::error::{Result, ResultExt};
use crate::models::{FileClass, FileInfo};

use super::{ExtractJob, Extractor, StrategyKind};

const MHTML_EXTENSIONS: &[&str] = &["mhtml", "mht"];

lazy_static! {
    // First text/html part of a MIME archive: headers, blank line, body up to the next boundary.
    static ref MHTML_HTML_PART: Regex = Regex::new(
        r"(?is)content-type:\s*text/html[^\r\n]*\r?\n((?:[^\r\n]+\r?\n)*)\r?\n(.*?)(?:\r?\n--|\z)"
    ).unwrap();

    static ref QUOTED_PRINTABLE: Regex = Regex::new(
        r"(?i)content-transfer-encoding:\s*quoted-printable"
    ).unwrap();

    static ref SCRIPT: Regex = Regex::new(r"(?is)<script\b.*?</script\s*>").unwrap();
    static ref STYLE: Regex = Regex::new(r"(?is)<style\b.*?</style\s*>").unwrap();
    static ref HEAD: Regex = Regex::new(r"(?is)<head\b.*?</head\s*>").unwrap();
    static ref COMMENT: Regex = Regex::new(r"(?s)<!--.*?-->").unwrap();

    static ref BLOCK_TAG: Regex = Regex::new(
        r"(?i)</?(?:p|div|h[1-6]|blockquote|pre|article|section|header|footer|nav|aside|main|ul|ol|li|table|tr|td|th|form|fieldset|address|br|hr)\b[^>]*>"
    ).unwrap();
    static ref INLINE_OPEN: Regex = Regex::new(r"(?i)<(?:a|span)\b[^>]*>").unwrap();
    static ref ANY_TAG: Regex = Regex::new(r"(?s)<[^>]+>").unwrap();

    static ref HORIZONTAL_SPACE: Regex = Regex::new(r"[ \t]+").unwrap();
    static ref BLANK_LINES: Regex = Regex::new(r"\n\s*\n\s*\n+").unwrap();
    static ref SPACE_AROUND_NEWLINE: Regex = Regex::new(r" *\n *").unwrap();
    static ref SENTENCE_JOIN: Regex = Regex::new(r"\.([A-Z])").unwrap();
}

/// Extracts readable text from HTML markup.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlExtractor;

impl Extractor for HtmlExtractor {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Html
    }

    fn supports(&self, info: &FileInfo) -> bool {
        info.class == FileClass::Html
            || info.mime_type == "text/html"
            || info.mime_type == "multipart/related"
    }

    fn extract(&self, job: &ExtractJob<'_>) -> Result<String> {
        job.ctx.check()?;
        let bytes = std::fs::read(job.input)
            .context(format!("failed to read {}", job.input.display()))?;
        let content = String::from_utf8_lossy(&bytes);

        let is_archive = MHTML_EXTENSIONS.contains(&job.info.extension.as_str())
            || job.info.mime_type == "multipart/related";
        let html = if is_archive {
            debug!("Extracting HTML part from web archive {}", job.input.display());
            extract_html_from_mhtml(&content)
        } else {
            content.into_owned()
        };

        Ok(html_to_text(&html))
    }
}

/// HTML body of the first `text/html` part, or the whole archive when there is none.
pub fn extract_html_from_mhtml(archive: &str) -> String {
    let Some(caps) = MHTML_HTML_PART.captures(archive) else {
        return archive.to_string();
    };
    let headers = caps.get(1).map_or("", |m| m.as_str());
    let body = caps.get(2).map_or("", |m| m.as_str());
    if QUOTED_PRINTABLE.is_match(headers) {
        decode_quoted_printable(body)
    } else {
        body.to_string()
    }
}

/// Strip markup and normalize whitespace.
pub fn html_to_text(html: &str) -> String {
    let text = SCRIPT.replace_all(html, "");
    let text = STYLE.replace_all(&text, "");
    let text = HEAD.replace_all(&text, "");
    let text = COMMENT.replace_all(&text, "");
    let text = BLOCK_TAG.replace_all(&text, "\n");
    let text = INLINE_OPEN.replace_all(&text, " ");
    let text = ANY_TAG.replace_all(&text, "");
    let text = html_escape::decode_html_entities(&text);

    let text = HORIZONTAL_SPACE.replace_all(&text, " ");
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    let text = SPACE_AROUND_NEWLINE.replace_all(&text, "\n");
    let text = SENTENCE_JOIN.replace_all(&text, ". $1");
    text.trim().to_string()
}

fn decode_quoted_printable(body: &str) -> String {
    let bytes = body.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'=' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        // soft line break
        if bytes[i + 1..].starts_with(b"\r\n") {
            i += 3;
            continue;
        }
        if bytes[i + 1..].starts_with(b"\n") {
            i += 2;
            continue;
        }
        match bytes
            .get(i + 1..i + 3)
            .and_then(|hex| std::str::from_utf8(hex).ok())
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
        {
            Some(byte) => {
                out.push(byte);
                i += 3;
            }
            None => {
                out.push(b'=');
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
