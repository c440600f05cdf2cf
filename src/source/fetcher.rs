//! PDF download over HTTP

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use std::net::IpAddr;
use std::time::Duration;

const PDF_MAGIC: &[u8] = b"%PDF";

/// Downloaded PDF bytes
#[derive(Debug, Clone)]
pub struct FetchedPdf {
    pub source_url: String,
    pub data: Vec<u8>,
    pub content_type: String,
    /// SHA-256 of `data`, lowercase hex
    pub content_hash: String,
}

impl FetchedPdf {
    pub fn new(source_url: impl Into<String>, data: Vec<u8>, content_type: impl Into<String>) -> Self {
        let content_hash = format!("{:x}", Sha256::digest(&data));
        Self {
            source_url: source_url.into(),
            data,
            content_type: content_type.into(),
            content_hash,
        }
    }
}

/// Source of PDF bytes for a URL
#[async_trait]
pub trait PdfFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPdf>;
}

/// Fetcher settings
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub allow_private_urls: bool,
    pub max_download_bytes: u64,
    pub attempts: u32,
    pub backoff: Duration,
}

impl From<&ServerConfig> for FetchPolicy {
    fn from(config: &ServerConfig) -> Self {
        Self {
            allow_private_urls: config.allow_private_urls,
            max_download_bytes: config.max_download_bytes,
            attempts: config.download_attempts.max(1),
            backoff: config.retry_backoff,
        }
    }
}

/// Redirect hops followed per download, each one SSRF-checked
const MAX_REDIRECTS: usize = 5;

/// `reqwest` based fetcher with SSRF protection, size limits and bounded retry
pub struct HttpFetcher {
    client: reqwest::Client,
    policy: FetchPolicy,
}

impl HttpFetcher {
    /// Build a fetcher whose client never follows redirects on its own.
    pub fn new(timeout: Duration, policy: FetchPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Configuration {
                reason: format!("Failed to build download client: {}", e),
            })?;
        Ok(Self { client, policy })
    }

    /// Send a GET for `url`, following up to `MAX_REDIRECTS` hops by hand.
    ///
    /// `url` itself must already be vetted; every redirect target is checked here.
    async fn send(&self, url: &str) -> Result<reqwest::Response> {
        let download_failed = |status: Option<u16>, reason: String| Error::DownloadFailed {
            url: url.to_string(),
            status,
            reason,
        };

        let mut current = url::Url::parse(url).map_err(|e| Error::Validation {
            reason: format!("Invalid URL {:?}: {}", url, e),
        })?;

        let mut hops = 0;
        loop {
            if hops > 0 && !self.policy.allow_private_urls {
                check_ssrf(current.as_str()).await.map_err(|e| match e {
                    Error::SsrfBlocked { .. } => {
                        tracing::warn!(url = %url, target = %current, "Redirect to private address blocked");
                        Error::SsrfBlocked {
                            url: url.to_string(),
                        }
                    }
                    other => other,
                })?;
            }

            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| download_failed(None, e.to_string()))?;

            let status = response.status();
            if !matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308) {
                return Ok(response);
            }
            if hops == MAX_REDIRECTS {
                return Err(download_failed(
                    Some(status.as_u16()),
                    format!("Too many redirects (max: {})", MAX_REDIRECTS),
                ));
            }

            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    download_failed(Some(status.as_u16()), "Redirect without Location header".to_string())
                })?;
            let next = current.join(location).map_err(|e| {
                download_failed(Some(status.as_u16()), format!("Invalid redirect target {:?}: {}", location, e))
            })?;
            if !matches!(next.scheme(), "http" | "https") {
                return Err(download_failed(
                    Some(status.as_u16()),
                    format!("Redirect to unsupported scheme {:?}", next.scheme()),
                ));
            }

            tracing::debug!(url = %url, from = %current, to = %next, "Following redirect");
            current = next;
            hops += 1;
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<FetchedPdf> {
        let download_failed = |status: Option<u16>, reason: String| Error::DownloadFailed {
            url: url.to_string(),
            status,
            reason,
        };

        let response = self.send(url).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(download_failed(
                Some(status.as_u16()),
                format!("HTTP request failed with status: {}", status),
            ));
        }

        let max_size = self.policy.max_download_bytes;

        // Check Content-Length header for early rejection
        if let Some(content_length) = response.content_length() {
            if content_length > max_size {
                return Err(Error::PayloadTooLarge {
                    url: url.to_string(),
                    size: content_length,
                    max_size,
                });
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase())
            .unwrap_or_default();

        // Stream the response body with incremental size checking to prevent OOM
        let mut data = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| download_failed(None, e.to_string()))?;
            data.extend_from_slice(&chunk);
            if data.len() as u64 > max_size {
                return Err(Error::PayloadTooLarge {
                    url: url.to_string(),
                    size: data.len() as u64,
                    max_size,
                });
            }
        }

        check_pdf(url, &content_type, &data)?;

        tracing::info!(
            url = %url,
            size_mb = %format!("{:.2}", data.len() as f64 / (1024.0 * 1024.0)),
            "Downloaded PDF"
        );

        Ok(FetchedPdf::new(url, data, "application/pdf"))
    }
}

#[async_trait]
impl PdfFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPdf> {
        // SSRF check
        if !self.policy.allow_private_urls {
            check_ssrf(url).await?;
        }

        let mut attempt = 1;
        loop {
            tracing::debug!(url = %url, attempt, "Downloading PDF");
            match self.fetch_once(url).await {
                Ok(pdf) => return Ok(pdf),
                Err(e) if e.is_retryable_download() && attempt < self.policy.attempts => {
                    let delay = self.policy.backoff * attempt;
                    tracing::warn!(url = %url, attempt, error = %e, ?delay, "Download failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Accept a declared PDF, or undeclared content that carries the PDF magic bytes.
fn check_pdf(url: &str, content_type: &str, data: &[u8]) -> Result<()> {
    let has_magic = data.starts_with(PDF_MAGIC);

    if content_type.contains("pdf") {
        if !has_magic {
            tracing::warn!(url = %url, "Content-Type says PDF but body lacks %PDF header");
        }
        return Ok(());
    }

    if has_magic {
        tracing::warn!(
            url = %url,
            content_type = %content_type,
            "Content-Type is not PDF but body is; proceeding"
        );
        return Ok(());
    }

    Err(Error::InvalidContentType {
        url: url.to_string(),
        content_type: if content_type.is_empty() {
            "<missing>".to_string()
        } else {
            content_type.to_string()
        },
    })
}

/// Check if an IP address is private/reserved (loopback, link-local, private ranges, etc.)
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local() // 169.254/16, cloud metadata
                || v4.is_broadcast()
                || v4.is_unspecified()
                || v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64 // CGNAT 100.64/10
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(mapped));
            }
            let segments = v6.segments();
            v6.is_loopback()
                || v6.is_unspecified()
                || (segments[0] & 0xFE00) == 0xFC00 // fc00::/7
                || (segments[0] & 0xFFC0) == 0xFE80 // fe80::/10
        }
    }
}

/// Check URL for SSRF by resolving DNS and verifying IPs are public
async fn check_ssrf(url_str: &str) -> Result<()> {
    let parsed = url::Url::parse(url_str).map_err(|e| Error::Validation {
        reason: format!("Invalid URL {:?}: {}", url_str, e),
    })?;

    let host = parsed.host_str().ok_or_else(|| Error::Validation {
        reason: format!("URL has no host: {}", url_str),
    })?;

    // IPv6 literals come back bracketed
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = parsed.port_or_known_default().unwrap_or(443);

    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| Error::DownloadFailed {
            url: url_str.to_string(),
            status: None,
            reason: format!("DNS resolution failed for {}: {}", host, e),
        })?;

    for addr in addrs {
        if is_private_ip(&addr.ip()) {
            return Err(Error::SsrfBlocked {
                url: url_str.to_string(),
            });
        }
    }

    Ok(())
}
