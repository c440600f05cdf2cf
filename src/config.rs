//! Server configuration loaded from the environment

use crate::error::{Error, Result};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const API_KEY_HELP: &str = "GEMINI_API_KEY is not configured. Please set it in your environment \
or .env file. Get a key at: https://aistudio.google.com/app/apikey";

/// How PDF bytes are handed to Gemini
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    /// Upload once through the File API and reference the returned URI
    Files,
    /// Send the PDF as base64 inline data with every request
    Inline,
}

impl FromStr for UploadMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "files" | "file" => Ok(UploadMode::Files),
            "inline" => Ok(UploadMode::Inline),
            other => Err(Error::Configuration {
                reason: format!("Unknown upload mode: {:?} (expected \"files\" or \"inline\")", other),
            }),
        }
    }
}

/// Runtime configuration for the Gemini PDF MCP server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Gemini API key; `None` makes every tool call fail with a configuration error
    pub api_key: Option<String>,
    /// Model used when the caller does not pass one
    pub default_model: String,
    /// Base URL of the Gemini REST API (without version path)
    pub api_base_url: String,
    /// File API upload or inline data (default: files)
    pub upload_mode: UploadMode,
    /// Maximum download size in bytes per PDF (default: 50MB)
    pub max_download_bytes: u64,
    /// Maximum number of URLs in one request (default: 10)
    pub max_urls: usize,
    /// Reject requests that repeat a URL (default: false)
    pub require_unique_urls: bool,
    /// Allow URLs that resolve to private/reserved IPs (default: false)
    pub allow_private_urls: bool,
    /// Timeout for every HTTP request (default: 120s)
    pub http_timeout: Duration,
    /// Download attempts per URL, including the first (default: 2)
    pub download_attempts: u32,
    /// Base delay between download attempts, multiplied by the attempt number (default: 500ms)
    pub retry_backoff: Duration,
    /// Polls of an uploaded file while it is still PROCESSING (default: 10)
    pub file_poll_attempts: u32,
    /// Delay between those polls (default: 1s)
    pub file_poll_interval: Duration,
    /// Maximum number of cached uploads (default: 256)
    pub cache_max_entries: usize,
    /// Maximum inline bytes held by the cache (default: 256MB)
    pub cache_max_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_model: DEFAULT_MODEL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            upload_mode: UploadMode::Files,
            max_download_bytes: 50 * 1024 * 1024, // 50MB
            max_urls: 10,
            require_unique_urls: false,
            allow_private_urls: false,
            http_timeout: Duration::from_secs(120),
            download_attempts: 2,
            retry_backoff: Duration::from_millis(500),
            file_poll_attempts: 10,
            file_poll_interval: Duration::from_secs(1),
            cache_max_entries: 256,
            cache_max_bytes: 256 * 1024 * 1024, // 256MB
        }
    }
}

impl ServerConfig {
    /// Read configuration from the process environment, loading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenv::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        Ok(Self {
            api_key: get("GEMINI_API_KEY"),
            default_model: get("GEMINI_PDF_DEFAULT_MODEL").unwrap_or(defaults.default_model),
            api_base_url: get("GEMINI_API_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base_url),
            upload_mode: parse_var(&get, "GEMINI_PDF_UPLOAD_MODE")?
                .unwrap_or(defaults.upload_mode),
            max_download_bytes: parse_var(&get, "GEMINI_PDF_MAX_DOWNLOAD_BYTES")?
                .unwrap_or(defaults.max_download_bytes),
            max_urls: parse_var(&get, "GEMINI_PDF_MAX_URLS")?.unwrap_or(defaults.max_urls),
            require_unique_urls: parse_var(&get, "GEMINI_PDF_REQUIRE_UNIQUE_URLS")?
                .unwrap_or(defaults.require_unique_urls),
            allow_private_urls: parse_var(&get, "GEMINI_PDF_ALLOW_PRIVATE_URLS")?
                .unwrap_or(defaults.allow_private_urls),
            http_timeout: parse_var(&get, "GEMINI_PDF_HTTP_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
            download_attempts: parse_var(&get, "GEMINI_PDF_DOWNLOAD_ATTEMPTS")?
                .map(|n: u32| n.max(1))
                .unwrap_or(defaults.download_attempts),
            retry_backoff: parse_var(&get, "GEMINI_PDF_RETRY_BACKOFF_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff),
            file_poll_attempts: parse_var(&get, "GEMINI_PDF_FILE_POLL_ATTEMPTS")?
                .unwrap_or(defaults.file_poll_attempts),
            file_poll_interval: parse_var(&get, "GEMINI_PDF_FILE_POLL_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.file_poll_interval),
            cache_max_entries: parse_var(&get, "GEMINI_PDF_CACHE_MAX_ENTRIES")?
                .unwrap_or(defaults.cache_max_entries),
            cache_max_bytes: parse_var(&get, "GEMINI_PDF_CACHE_MAX_BYTES")?
                .unwrap_or(defaults.cache_max_bytes),
        })
    }

    /// The API key, or the error every tool call reports when it is missing.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| Error::Configuration {
            reason: API_KEY_HELP.to_string(),
        })
    }
}

fn parse_var<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| Error::Configuration {
                reason: format!("Invalid value for {}: {:?} ({})", key, raw, e),
            })
        })
        .transpose()
}
