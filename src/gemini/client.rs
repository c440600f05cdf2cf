//! REST client for the Gemini File API and `generateContent`

use super::types::{
    Content, FileEnvelope, FileResource, FileState, GenerateContentRequest,
    GenerateContentResponse, Part,
};
use super::{GeminiApi, RemoteHandle};
use crate::config::{ServerConfig, UploadMode};
use crate::error::{Error, Result};
use crate::source::FetchedPdf;
use async_trait::async_trait;
use base64::Engine;
use reqwest::multipart::{Form, Part as FormPart};
use reqwest::StatusCode;
use std::time::Duration;

const API_KEY_HEADER: &str = "x-goog-api-key";
const PDF_MIME: &str = "application/pdf";

/// Gemini REST client
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    upload_mode: UploadMode,
    poll_attempts: u32,
    poll_interval: Duration,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>, config: &ServerConfig) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            upload_mode: config.upload_mode,
            poll_attempts: config.file_poll_attempts,
            poll_interval: config.file_poll_interval,
        }
    }

    fn inline_handle(pdf: &FetchedPdf) -> RemoteHandle {
        RemoteHandle::Inline {
            mime_type: PDF_MIME.to_string(),
            data_base64: base64::engine::general_purpose::STANDARD.encode(&pdf.data),
        }
    }

    async fn upload_file(&self, pdf: &FetchedPdf) -> Result<RemoteHandle> {
        let upload_url = format!("{}/upload/v1beta/files", self.base_url);
        let metadata = serde_json::json!({ "file": { "display_name": pdf.source_url } });

        let form = Form::new()
            .part(
                "metadata",
                FormPart::text(metadata.to_string())
                    .mime_str("application/json")
                    .map_err(|e| remote_error("file upload", e))?,
            )
            .part(
                "file",
                FormPart::bytes(pdf.data.clone())
                    .file_name("document.pdf")
                    .mime_str(PDF_MIME)
                    .map_err(|e| remote_error("file upload", e))?,
            );

        tracing::info!(url = %pdf.source_url, size = pdf.data.len(), "Uploading PDF to Gemini File API");

        let response = self
            .http
            .post(&upload_url)
            .header(API_KEY_HEADER, &self.api_key)
            .header("X-Goog-Upload-Protocol", "multipart")
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error("file upload", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_upload_error(&pdf.source_url, status, &body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| transport_error("file upload", e))?;
        let mut file = serde_json::from_str::<FileEnvelope>(&body)?.into_inner();

        tracing::debug!(file_name = %file.name, state = ?file.state, "File uploaded");

        let mut polls = 0;
        while file.state == Some(FileState::Processing) {
            if polls >= self.poll_attempts {
                return Err(Error::RemoteTimeout {
                    operation: format!("processing of {}", file.name),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
            polls += 1;
            file = self.get_file(&file.name).await?;
        }

        if file.state == Some(FileState::Failed) {
            return Err(Error::UploadRejected {
                url: pdf.source_url.clone(),
                reason: format!("File processing failed for {}", file.name),
            });
        }

        Ok(RemoteHandle::File {
            mime_type: file.mime_type.unwrap_or_else(|| PDF_MIME.to_string()),
            name: file.name,
            uri: file.uri,
            expires_at: file.expiration_time,
        })
    }

    async fn get_file(&self, name: &str) -> Result<FileResource> {
        let url = format!("{}/v1beta/{}", self.base_url, name);
        let response = self
            .http
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| transport_error("file status", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error("file status", e))?;
        if !status.is_success() {
            return Err(map_http_error(status, &body, "file status"));
        }

        Ok(serde_json::from_str::<FileEnvelope>(&body)?.into_inner())
    }
}

#[async_trait]
impl GeminiApi for GeminiClient {
    async fn upload_pdf(&self, pdf: &FetchedPdf) -> Result<RemoteHandle> {
        match self.upload_mode {
            UploadMode::Inline => Ok(Self::inline_handle(pdf)),
            UploadMode::Files => self.upload_file(pdf).await,
        }
    }

    async fn generate(&self, model: &str, prompt: &str, files: &[RemoteHandle]) -> Result<String> {
        let model = model.strip_prefix("models/").unwrap_or(model);
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);

        // Documents first, then the instruction
        let mut parts: Vec<Part> = files.iter().map(RemoteHandle::to_part).collect();
        parts.push(Part::Text {
            text: prompt.to_string(),
        });
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
        };

        tracing::info!(model = %model, files = files.len(), "Generating content");

        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error("generate", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error("generate", e))?;

        if !status.is_success() {
            if let Some(expired) = detect_expired_handle(status, &body, files) {
                return Err(expired);
            }
            return Err(map_http_error(status, &body, "generate"));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body)?;
        if let Some(text) = parsed.text() {
            return Ok(text);
        }

        let reason = parsed
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .or_else(|| {
                parsed
                    .candidates
                    .first()
                    .and_then(|c| c.finish_reason.clone())
            });
        tracing::warn!(reason = ?reason, "Gemini returned no text");

        Err(Error::RemoteService {
            operation: "generate".to_string(),
            status: None,
            message: match reason {
                Some(reason) => format!("No response generated from Gemini ({})", reason),
                None => "No response generated from Gemini".to_string(),
            },
        })
    }
}

fn remote_error(operation: &str, e: impl std::fmt::Display) -> Error {
    Error::RemoteService {
        operation: operation.to_string(),
        status: None,
        message: e.to_string(),
    }
}

fn transport_error(operation: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::RemoteTimeout {
            operation: operation.to_string(),
        }
    } else {
        remote_error(operation, e)
    }
}

/// A failed `generateContent` that points at one of our files means the file is gone.
fn detect_expired_handle(status: StatusCode, body: &str, files: &[RemoteHandle]) -> Option<Error> {
    if !matches!(status.as_u16(), 400 | 403 | 404) || !body.contains("files/") {
        return None;
    }
    let handle = files
        .iter()
        .filter_map(RemoteHandle::name)
        .find(|name| body.contains(name))
        .map(str::to_string);
    Some(Error::HandleExpired { handle })
}

fn map_upload_error(url: &str, status: StatusCode, body: &str) -> Error {
    match status.as_u16() {
        400 | 413 | 415 => Error::UploadRejected {
            url: url.to_string(),
            reason: format!("HTTP {}: {}", status, body),
        },
        _ => map_http_error(status, body, "file upload"),
    }
}

/// Maps HTTP status codes to error kinds
fn map_http_error(status: StatusCode, body: &str, operation: &str) -> Error {
    match status.as_u16() {
        429 => Error::RateLimitExceeded {
            operation: operation.to_string(),
            message: body.to_string(),
        },
        408 | 504 => Error::RemoteTimeout {
            operation: operation.to_string(),
        },
        code => Error::RemoteService {
            operation: operation.to_string(),
            status: Some(code),
            message: body.to_string(),
        },
    }
}
