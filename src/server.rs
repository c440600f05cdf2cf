//! MCP Server implementation using rmcp

use crate::cache::{FileCache, MemoryStore};
use crate::config::ServerConfig;
use crate::dispatcher::{Dispatcher, PdfResult};
use crate::gemini::GeminiClient;
use crate::source::{FetchPolicy, HttpFetcher, PdfRequest, PdfUrlInput, RequestLimits};
use anyhow::Result;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*,
    schemars::JsonSchema, tool, tool_handler, tool_router, ServerHandler, ServiceExt,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UnderstandPdfParams {
    /// URL of the PDF to analyze, or a list of URLs to analyze together (all must be publicly accessible)
    pub pdf_url: PdfUrlInput,
    /// What you want to do with the PDF(s): summarize, extract key points, answer questions, compare, translate, etc.
    pub prompt: String,
    /// Gemini model to use (default: server configured model)
    #[serde(default)]
    pub model: Option<String>,
}

/// Gemini PDF MCP Server
#[derive(Clone)]
pub struct GeminiPdfServer {
    config: Arc<ServerConfig>,
    /// `None` until an API key is configured
    dispatcher: Option<Arc<Dispatcher>>,
    tool_router: ToolRouter<Self>,
}

// ============================================================================
// Tool implementations
// ============================================================================

#[tool_router]
impl GeminiPdfServer {
    /// Create a server wired to the real Gemini API and HTTP downloads
    pub fn with_config(config: ServerConfig) -> crate::error::Result<Self> {
        let dispatcher = match config.api_key.as_deref() {
            Some(api_key) => {
                let http = reqwest::Client::builder()
                    .timeout(config.http_timeout)
                    .build()
                    .map_err(|e| crate::error::Error::Configuration {
                        reason: format!("Failed to build HTTP client: {}", e),
                    })?;

                let api = Arc::new(GeminiClient::new(http, api_key, &config));
                let fetcher = Arc::new(HttpFetcher::new(
                    config.http_timeout,
                    FetchPolicy::from(&config),
                )?);
                let store = MemoryStore::new(config.cache_max_entries, config.cache_max_bytes);
                let cache = Arc::new(FileCache::new(Box::new(store), fetcher, api.clone()));

                Some(Arc::new(Dispatcher::new(
                    cache,
                    api,
                    config.default_model.clone(),
                )))
            }
            None => None,
        };

        Ok(Self::with_dispatcher(config, dispatcher))
    }

    /// Create a server around an existing dispatcher
    pub fn with_dispatcher(config: ServerConfig, dispatcher: Option<Arc<Dispatcher>>) -> Self {
        Self {
            config: Arc::new(config),
            dispatcher,
            tool_router: Self::tool_router(),
        }
    }

    /// Understand one or more PDFs from URLs with Gemini
    #[tool(
        name = "understand_pdf_from_url",
        description = "Use this tool when you need to understand the content of one or more PDFs from public URLs. It can summarize a document, answer specific questions about its content, extract key information like names, dates, or figures, or compare several documents and synthesize a combined analysis.

pdf_url: a single URL string, or a list of URL strings analyzed together in that order. Returns the generated text analysis."
    )]
    async fn understand_pdf_from_url(
        &self,
        Parameters(params): Parameters<UnderstandPdfParams>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        match self.process_understand(&params).await {
            Ok(result) => Ok(CallToolResult::success(vec![Content::text(result.text)])),
            Err(e) => {
                tracing::warn!(error = %e, kind = %e.kind(), "understand_pdf_from_url failed");
                Ok(CallToolResult::error(vec![Content::text(error_payload(&e))]))
            }
        }
    }
}

impl GeminiPdfServer {
    fn limits(&self) -> RequestLimits {
        RequestLimits {
            max_urls: self.config.max_urls,
            require_unique: self.config.require_unique_urls,
        }
    }

    /// Validate the call and run it; the configuration check comes before any input handling.
    pub async fn process_understand(
        &self,
        params: &UnderstandPdfParams,
    ) -> crate::error::Result<PdfResult> {
        self.config.require_api_key()?;
        let dispatcher = self
            .dispatcher
            .as_ref()
            .ok_or_else(|| crate::error::Error::Configuration {
                reason: "Gemini client is not initialized".to_string(),
            })?;

        let request = PdfRequest::new(
            params.pdf_url.clone(),
            &params.prompt,
            params.model.as_deref(),
            &self.limits(),
        )?;

        tracing::info!(pdfs = request.urls.len(), model = ?request.model, "Processing PDF request");
        dispatcher.run(&request).await
    }
}

/// JSON body of a failed tool call
fn error_payload(error: &crate::error::Error) -> String {
    let mut payload = serde_json::json!({
        "kind": error.kind(),
        "message": error.client_message(),
    });
    if let Some(url) = error.url() {
        payload["url"] = serde_json::Value::String(url.to_string());
    }
    payload.to_string()
}

#[tool_handler]
impl ServerHandler for GeminiPdfServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Gemini PDF MCP Server answers prompts about PDF documents at public URLs. \
                 Pass one URL or a list of URLs plus a prompt to understand_pdf_from_url; \
                 repeated URLs reuse the earlier upload."
                    .into(),
            ),
        }
    }
}

/// Run the MCP server with configuration from the environment
pub async fn run_server() -> Result<()> {
    run_server_with_config(ServerConfig::from_env()?).await
}

/// Run the MCP server with full configuration
pub async fn run_server_with_config(config: ServerConfig) -> Result<()> {
    let server = GeminiPdfServer::with_config(config)?;

    tracing::info!("Gemini PDF MCP Server ready, waiting for connections...");

    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    Ok(())
}
