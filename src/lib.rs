//! Gemini PDF MCP Server Library
//!
//! This crate exposes one MCP tool, `understand_pdf_from_url`, which downloads
//! PDFs from public URLs, hands them to Google Gemini and returns the model's
//! answer to a natural-language prompt. Uploads are cached per URL.

pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gemini;
pub mod server;
pub mod source;

pub use config::{ServerConfig, UploadMode};
pub use dispatcher::{Dispatcher, PdfResult};
pub use error::{Error, ErrorKind, Result};
pub use server::{run_server, run_server_with_config, GeminiPdfServer, UnderstandPdfParams};
pub use source::{PdfRequest, PdfUrlInput};
