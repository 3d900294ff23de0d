//! Error types for the doctext-core library.

use std::fmt;

use thiserror::Error;

/// Boxed cause attached to an [`Error`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Classification of every error raised by the library.
///
/// The kind drives retry decisions and recovery hooks, so wrapping an error
/// with more context keeps its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid input, output location or extracted content.
    Validation,
    /// Transient filesystem or pipe failure.
    Io,
    /// Access to a file or directory was denied.
    Permission,
    /// A file or external tool does not exist.
    NotFound,
    /// The execution deadline passed.
    Timeout,
    /// Network failure reported by an external tool.
    Network,
    /// OCR engine failure or empty OCR output.
    Ocr,
    /// Document conversion or result parsing failure.
    Conversion,
    /// No strategy can handle the input.
    Unsupported,
    /// External tool exited unsuccessfully.
    System,
    /// Invalid or incomplete configuration.
    Config,
    /// The execution context was cancelled.
    Cancelled,
}

impl ErrorKind {
    /// Stable lowercase name used in messages.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Io => "io",
            ErrorKind::Permission => "permission",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Network => "network",
            ErrorKind::Ocr => "ocr",
            ErrorKind::Conversion => "conversion",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::System => "system",
            ErrorKind::Config => "config",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    /// Whether an operation failing with this kind may succeed when repeated.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Timeout | ErrorKind::Io | ErrorKind::Network)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the doctext library.
#[derive(Error, Debug)]
#[error("{kind}: {message}{}", caused_by(.source))]
pub struct Error {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

fn caused_by(source: &Option<BoxError>) -> String {
    source
        .as_ref()
        .map(|cause| format!(" (caused by: {cause})"))
        .unwrap_or_default()
}

impl Error {
    /// Create an error without an underlying cause.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create an error wrapping an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permission, message)
    }

    pub fn ocr(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Ocr, message)
    }

    pub fn conversion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conversion, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::System, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation cancelled")
    }

    pub fn timeout() -> Self {
        Self::new(ErrorKind::Timeout, "operation timed out")
    }

    /// Wrap this error with an outer message, keeping its kind.
    pub fn context(self, message: impl Into<String>) -> Self {
        let kind = self.kind;
        Self::with_source(kind, message, self)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Whether the error stems from cancellation or an expired deadline.
    pub fn is_interrupted(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled | ErrorKind::Timeout)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::Permission,
            std::io::ErrorKind::TimedOut => ErrorKind::Timeout,
            _ => ErrorKind::Io,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorKind::Conversion, "invalid JSON", err)
    }
}

/// Attach context to fallible results.
pub trait ResultExt<T> {
    /// Wrap the error with a message, keeping its kind.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Wrap the error with a message and an explicit kind.
    fn with_kind(self, kind: ErrorKind, message: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(message))
    }

    fn with_kind(self, kind: ErrorKind, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::with_source(kind, message, e.into()))
    }
}

/// Result type for the doctext library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::Io.is_retryable());
        assert!(ErrorKind::Network.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::Permission.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
        assert!(!ErrorKind::Ocr.is_retryable());
    }

    #[test]
    fn test_display_includes_cause() {
        let inner = Error::system("gs exited with status 1");
        let outer = inner.context("failed to split PDF");

        assert_eq!(outer.kind(), ErrorKind::System);
        assert_eq!(
            outer.to_string(),
            "system: failed to split PDF (caused by: system: gs exited with status 1)"
        );
    }

    #[test]
    fn test_io_error_mapping() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err: Error =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert_eq!(err.kind(), ErrorKind::Permission);

        let err: Error = std::io::Error::other("broken pipe").into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_with_kind_overrides() {
        let result: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::other("disk full"));
        let err = result.with_kind(ErrorKind::Ocr, "failed to save page").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Ocr);
        assert_eq!(err.message(), "failed to save page");
    }
}
