//! Tool input normalization

use crate::error::{Error, Result};
use rmcp::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// `pdf_url` as sent by the caller: one URL or an ordered list of URLs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum PdfUrlInput {
    /// A single publicly accessible PDF URL
    Single(String),
    /// Several PDF URLs, analyzed together in this order
    Many(Vec<String>),
}

impl From<&str> for PdfUrlInput {
    fn from(url: &str) -> Self {
        PdfUrlInput::Single(url.to_string())
    }
}

impl From<Vec<String>> for PdfUrlInput {
    fn from(urls: Vec<String>) -> Self {
        PdfUrlInput::Many(urls)
    }
}

/// Limits applied while normalizing a request
#[derive(Debug, Clone, Copy)]
pub struct RequestLimits {
    pub max_urls: usize,
    pub require_unique: bool,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_urls: 10,
            require_unique: false,
        }
    }
}

/// Validated request: at least one URL, a non-empty prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfRequest {
    pub urls: Vec<String>,
    pub prompt: String,
    pub model: Option<String>,
}

impl PdfRequest {
    pub fn new(
        input: PdfUrlInput,
        prompt: &str,
        model: Option<&str>,
        limits: &RequestLimits,
    ) -> Result<Self> {
        let urls = normalize(input, limits)?;

        if prompt.trim().is_empty() {
            return Err(Error::Validation {
                reason: "prompt must not be empty".to_string(),
            });
        }

        let model = model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        if let Some(model) = &model {
            validate_model(model)?;
        }

        Ok(Self {
            urls,
            prompt: prompt.to_string(),
            model,
        })
    }
}

/// Turn the caller's `pdf_url` into an ordered, validated list of URLs.
pub fn normalize(input: PdfUrlInput, limits: &RequestLimits) -> Result<Vec<String>> {
    let raw = match input {
        PdfUrlInput::Single(url) => vec![url],
        PdfUrlInput::Many(urls) => urls,
    };

    if raw.is_empty() {
        return Err(Error::Validation {
            reason: "pdf_url must contain at least one URL".to_string(),
        });
    }

    if raw.len() > limits.max_urls {
        return Err(Error::Validation {
            reason: format!(
                "Too many PDFs: {} (max: {})",
                raw.len(),
                limits.max_urls
            ),
        });
    }

    let mut seen = HashSet::new();
    let mut urls = Vec::with_capacity(raw.len());

    for (idx, url) in raw.into_iter().enumerate() {
        let url = url.trim().to_string();
        if url.is_empty() {
            return Err(Error::Validation {
                reason: format!("pdf_url entry {} is empty", idx + 1),
            });
        }

        validate_url(&url)?;

        if limits.require_unique && !seen.insert(url.clone()) {
            return Err(Error::Validation {
                reason: format!("Duplicate PDF URL: {}", url),
            });
        }

        urls.push(url);
    }

    Ok(urls)
}

/// Model names end up in the request path, so only plain identifiers pass.
/// An optional `models/` prefix is allowed.
fn validate_model(model: &str) -> Result<()> {
    let name = model.strip_prefix("models/").unwrap_or(model);
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !valid {
        return Err(Error::Validation {
            reason: format!("Invalid model name: {:?}", model),
        });
    }
    Ok(())
}

fn validate_url(url_str: &str) -> Result<()> {
    let parsed = url::Url::parse(url_str).map_err(|e| Error::Validation {
        reason: format!("Invalid URL {:?}: {}", url_str, e),
    })?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(Error::Validation {
                reason: format!("Unsupported URL scheme {:?} in {}", scheme, url_str),
            })
        }
    }

    if parsed.host_str().is_none() {
        return Err(Error::Validation {
            reason: format!("URL has no host: {}", url_str),
        });
    }

    Ok(())
}
