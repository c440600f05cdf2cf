//! Error types for the Gemini PDF MCP server

use serde::Serialize;
use thiserror::Error;

/// Result type alias for the Gemini PDF MCP server
pub type Result<T> = std::result::Result<T, Error>;

/// Stable error kind reported to MCP callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    ConfigurationError,
    ValidationError,
    DownloadFailed,
    InvalidContentType,
    PayloadTooLarge,
    UploadRejected,
    HandleExpired,
    RateLimitExceeded,
    RemoteTimeout,
    RemoteServiceError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigurationError => "ConfigurationError",
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::DownloadFailed => "DownloadFailed",
            ErrorKind::InvalidContentType => "InvalidContentType",
            ErrorKind::PayloadTooLarge => "PayloadTooLarge",
            ErrorKind::UploadRejected => "UploadRejected",
            ErrorKind::HandleExpired => "HandleExpired",
            ErrorKind::RateLimitExceeded => "RateLimitExceeded",
            ErrorKind::RemoteTimeout => "RemoteTimeout",
            ErrorKind::RemoteServiceError => "RemoteServiceError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error types for the Gemini PDF MCP server
#[derive(Error, Debug)]
pub enum Error {
    /// API key missing or an override is malformed
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// Bad tool input
    #[error("Invalid request: {reason}")]
    Validation { reason: String },

    /// URL resolves to a private/reserved address
    #[error("SSRF blocked: {url}")]
    SsrfBlocked { url: String },

    /// Network failure or non-2xx response while downloading
    #[error("Failed to download {url}: {reason}")]
    DownloadFailed {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    /// Downloaded content is not a PDF
    #[error("{url} is not a PDF (content type: {content_type})")]
    InvalidContentType { url: String, content_type: String },

    /// Download exceeds the configured ceiling
    #[error("Download too large: {url} is {size} bytes (max: {max_size} bytes)")]
    PayloadTooLarge { url: String, size: u64, max_size: u64 },

    /// File API refused the upload
    #[error("Upload of {url} rejected: {reason}")]
    UploadRejected { url: String, reason: String },

    /// A previously uploaded file is no longer available remotely
    #[error("Remote file handle expired: {}", .handle.as_deref().unwrap_or("<unknown>"))]
    HandleExpired { handle: Option<String> },

    /// HTTP 429 from the Gemini API
    #[error("Rate limit exceeded during {operation}: {message}")]
    RateLimitExceeded { operation: String, message: String },

    /// Gemini API did not answer in time
    #[error("Timed out during {operation}")]
    RemoteTimeout { operation: String },

    /// Any other Gemini API failure
    #[error("Gemini API error during {operation}{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    RemoteService {
        operation: String,
        status: Option<u16>,
        message: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration { .. } => ErrorKind::ConfigurationError,
            Error::Validation { .. } | Error::SsrfBlocked { .. } => ErrorKind::ValidationError,
            Error::DownloadFailed { .. } => ErrorKind::DownloadFailed,
            Error::InvalidContentType { .. } => ErrorKind::InvalidContentType,
            Error::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            Error::UploadRejected { .. } => ErrorKind::UploadRejected,
            Error::HandleExpired { .. } => ErrorKind::HandleExpired,
            Error::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            Error::RemoteTimeout { .. } => ErrorKind::RemoteTimeout,
            Error::RemoteService { .. } | Error::Serialization(_) => {
                ErrorKind::RemoteServiceError
            }
        }
    }

    /// The PDF URL this error is about, if any
    pub fn url(&self) -> Option<&str> {
        match self {
            Error::SsrfBlocked { url }
            | Error::DownloadFailed { url, .. }
            | Error::InvalidContentType { url, .. }
            | Error::PayloadTooLarge { url, .. }
            | Error::UploadRejected { url, .. } => Some(url),
            _ => None,
        }
    }

    /// Whether another download attempt could succeed
    pub fn is_retryable_download(&self) -> bool {
        match self {
            Error::DownloadFailed { status: None, .. } => true,
            Error::DownloadFailed {
                status: Some(status),
                ..
            } => *status == 429 || (500..=599).contains(status),
            _ => false,
        }
    }

    /// Return a sanitized error message safe to send to clients.
    /// Library errors and remote response bodies are omitted.
    /// Full details should be logged via tracing before calling this.
    pub fn client_message(&self) -> String {
        match self {
            Error::Configuration { reason } => reason.clone(),
            Error::Validation { reason } => reason.clone(),
            Error::SsrfBlocked { .. } => "URL not allowed".to_string(),
            Error::DownloadFailed {
                status: Some(status),
                ..
            } => format!("Failed to download PDF: HTTP {}", status),
            Error::DownloadFailed { .. } => "Failed to download PDF".to_string(),
            Error::InvalidContentType { content_type, .. } => {
                format!("URL did not return a PDF (content type: {})", content_type)
            }
            Error::PayloadTooLarge { max_size, .. } => {
                format!("Download exceeds maximum size of {} bytes", max_size)
            }
            Error::UploadRejected { .. } => "Gemini File API rejected the PDF".to_string(),
            Error::HandleExpired { .. } => "Uploaded file is no longer available".to_string(),
            Error::RateLimitExceeded { .. } => "Gemini API rate limit exceeded".to_string(),
            Error::RemoteTimeout { operation } => format!("Gemini API timed out ({})", operation),
            Error::RemoteService {
                status: Some(status),
                ..
            } => format!("Gemini API error (HTTP {})", status),
            Error::RemoteService { message, .. } => message.clone(),
            Error::Serialization(_) => "Unexpected response from Gemini API".to_string(),
        }
    }
}
