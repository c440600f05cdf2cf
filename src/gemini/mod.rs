//! Gemini API access
//!
//! [`GeminiApi`] is the seam between the server and the remote service:
//! uploading PDFs and running `generateContent` over the resulting handles.

mod client;
mod types;

pub use client::GeminiClient;
pub use types::RemoteHandle;

use crate::error::Result;
use crate::source::FetchedPdf;
use async_trait::async_trait;

#[async_trait]
pub trait GeminiApi: Send + Sync {
    /// Make `pdf` available to the model and return a reusable handle.
    async fn upload_pdf(&self, pdf: &FetchedPdf) -> Result<RemoteHandle>;

    /// Run `prompt` against the given files and return the model's text.
    async fn generate(&self, model: &str, prompt: &str, files: &[RemoteHandle]) -> Result<String>;
}
