//! Integration tests for the Gemini PDF MCP server
//!
//! A single mockito server plays both the PDF host and the Gemini API.

use gemini_pdf_mcp::{Error, ErrorKind, GeminiPdfServer, ServerConfig, UnderstandPdfParams, UploadMode};
use mockito::{Matcher, Server, ServerGuard};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const GENERATE_PATH: &str = "/v1beta/models/gemini-2.5-flash:generateContent";
const UPLOAD_PATH: &str = "/upload/v1beta/files";

fn config(server: &ServerGuard, api_key: Option<&str>) -> ServerConfig {
    ServerConfig {
        api_key: api_key.map(str::to_string),
        api_base_url: server.url(),
        allow_private_urls: true,
        download_attempts: 1,
        retry_backoff: Duration::from_millis(1),
        file_poll_interval: Duration::from_millis(1),
        ..ServerConfig::default()
    }
}

fn params(json: serde_json::Value) -> UnderstandPdfParams {
    serde_json::from_value(json).expect("valid tool params")
}

fn upload_body(name: &str) -> String {
    serde_json::json!({
        "file": {
            "name": name,
            "uri": format!("https://generativelanguage.googleapis.com/v1beta/{}", name),
            "mimeType": "application/pdf",
            "state": "ACTIVE"
        }
    })
    .to_string()
}

fn text_response(text: &str) -> String {
    serde_json::json!({
        "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
    })
    .to_string()
}

async fn pdf_mock(server: &mut ServerGuard, path: &str, hits: usize) -> mockito::Mock {
    server
        .mock("GET", path)
        .with_status(200)
        .with_header("content-type", "application/pdf")
        .with_body(format!("%PDF-1.4 {}", path))
        .expect(hits)
        .create_async()
        .await
}

#[tokio::test]
async fn test_summarize_then_reuse_upload() {
    let mut server = Server::new_async().await;
    let pdf = pdf_mock(&mut server, "/doc.pdf", 1).await;
    let upload = server
        .mock("POST", UPLOAD_PATH)
        .match_header("x-goog-api-key", "test-key")
        .with_status(200)
        .with_body(upload_body("files/h1"))
        .expect(1)
        .create_async()
        .await;
    let generate = server
        .mock("POST", GENERATE_PATH)
        .match_header("x-goog-api-key", "test-key")
        .match_body(Matcher::Regex("files/h1".to_string()))
        .with_status(200)
        .with_body(text_response("Three sentences..."))
        .expect(2)
        .create_async()
        .await;

    let tool = GeminiPdfServer::with_config(config(&server, Some("test-key"))).unwrap();
    let p = params(serde_json::json!({
        "pdf_url": format!("{}/doc.pdf", server.url()),
        "prompt": "Summarize in 3 sentences"
    }));

    let first = tool.process_understand(&p).await.unwrap();
    let second = tool.process_understand(&p).await.unwrap();

    assert_eq!(first.text, "Three sentences...");
    assert_eq!(second.text, "Three sentences...");
    assert_eq!(first.model_used, "gemini-2.5-flash");

    pdf.assert_async().await;
    upload.assert_async().await;
    generate.assert_async().await;
}

#[tokio::test]
async fn test_second_download_404_aborts_comparison() {
    let mut server = Server::new_async().await;
    let _first = pdf_mock(&mut server, "/1.pdf", 1).await;
    let _second = server
        .mock("GET", "/2.pdf")
        .with_status(404)
        .create_async()
        .await;
    let _upload = server
        .mock("POST", UPLOAD_PATH)
        .with_status(200)
        .with_body(upload_body("files/h1"))
        .expect_at_most(1)
        .create_async()
        .await;
    let generate = server
        .mock("POST", GENERATE_PATH)
        .expect(0)
        .create_async()
        .await;

    let tool = GeminiPdfServer::with_config(config(&server, Some("test-key"))).unwrap();
    let second_url = format!("{}/2.pdf", server.url());
    let p = params(serde_json::json!({
        "pdf_url": [format!("{}/1.pdf", server.url()), second_url.clone()],
        "prompt": "Compare"
    }));

    let err = tool.process_understand(&p).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DownloadFailed);
    assert_eq!(err.url(), Some(second_url.as_str()));
    generate.assert_async().await;
}

#[tokio::test]
async fn test_missing_api_key_makes_no_requests() {
    let mut server = Server::new_async().await;
    let pdf = pdf_mock(&mut server, "/doc.pdf", 0).await;

    let tool = GeminiPdfServer::with_config(config(&server, None)).unwrap();
    let p = params(serde_json::json!({
        "pdf_url": format!("{}/doc.pdf", server.url()),
        "prompt": "Summarize"
    }));

    let err = tool.process_understand(&p).await.unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    pdf.assert_async().await;
}

#[tokio::test]
async fn test_non_pdf_content_rejected() {
    let mut server = Server::new_async().await;
    let _page = server
        .mock("GET", "/index.html")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html><body>not a pdf</body></html>")
        .create_async()
        .await;
    let upload = server
        .mock("POST", UPLOAD_PATH)
        .expect(0)
        .create_async()
        .await;

    let tool = GeminiPdfServer::with_config(config(&server, Some("test-key"))).unwrap();
    let p = params(serde_json::json!({
        "pdf_url": format!("{}/index.html", server.url()),
        "prompt": "Summarize"
    }));

    let err = tool.process_understand(&p).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidContentType);
    upload.assert_async().await;
}

#[tokio::test]
async fn test_inline_mode_sends_pdf_data() {
    let mut server = Server::new_async().await;
    let _pdf = pdf_mock(&mut server, "/doc.pdf", 1).await;
    let upload = server
        .mock("POST", UPLOAD_PATH)
        .expect(0)
        .create_async()
        .await;
    let generate = server
        .mock("POST", GENERATE_PATH)
        .match_body(Matcher::Regex("\"inline_data\"".to_string()))
        .with_status(200)
        .with_body(text_response("Inline answer"))
        .expect(1)
        .create_async()
        .await;

    let tool = GeminiPdfServer::with_config(ServerConfig {
        upload_mode: UploadMode::Inline,
        ..config(&server, Some("test-key"))
    })
    .unwrap();
    let p = params(serde_json::json!({
        "pdf_url": format!("{}/doc.pdf", server.url()),
        "prompt": "Summarize"
    }));

    let result = tool.process_understand(&p).await.unwrap();
    assert_eq!(result.text, "Inline answer");
    upload.assert_async().await;
    generate.assert_async().await;
}

#[tokio::test]
async fn test_expired_handle_is_reuploaded_once() {
    let mut server = Server::new_async().await;
    let pdf = pdf_mock(&mut server, "/doc.pdf", 2).await;

    let uploads = Arc::new(AtomicUsize::new(0));
    let counter = uploads.clone();
    let upload = server
        .mock("POST", UPLOAD_PATH)
        .with_status(200)
        .with_body_from_request(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            upload_body(&format!("files/h{}", n)).into_bytes()
        })
        .expect(2)
        .create_async()
        .await;
    let expired = server
        .mock("POST", GENERATE_PATH)
        .match_body(Matcher::Regex("files/h1".to_string()))
        .with_status(403)
        .with_body(
            r#"{"error": {"code": 403, "message": "You do not have permission to access the File files/h1 or it may not exist.", "status": "PERMISSION_DENIED"}}"#,
        )
        .expect(1)
        .create_async()
        .await;
    let fresh = server
        .mock("POST", GENERATE_PATH)
        .match_body(Matcher::Regex("files/h2".to_string()))
        .with_status(200)
        .with_body(text_response("Recovered"))
        .expect(1)
        .create_async()
        .await;

    let tool = GeminiPdfServer::with_config(config(&server, Some("test-key"))).unwrap();
    let p = params(serde_json::json!({
        "pdf_url": format!("{}/doc.pdf", server.url()),
        "prompt": "Summarize"
    }));

    let result = tool.process_understand(&p).await.unwrap();
    assert_eq!(result.text, "Recovered");
    assert_eq!(uploads.load(Ordering::SeqCst), 2);

    pdf.assert_async().await;
    upload.assert_async().await;
    expired.assert_async().await;
    fresh.assert_async().await;
}

#[tokio::test]
async fn test_rate_limit_surfaces_kind() {
    let mut server = Server::new_async().await;
    let _pdf = pdf_mock(&mut server, "/doc.pdf", 1).await;
    let _upload = server
        .mock("POST", UPLOAD_PATH)
        .with_status(200)
        .with_body(upload_body("files/h1"))
        .create_async()
        .await;
    let _generate = server
        .mock("POST", GENERATE_PATH)
        .with_status(429)
        .with_body(r#"{"error": {"code": 429, "status": "RESOURCE_EXHAUSTED"}}"#)
        .create_async()
        .await;

    let tool = GeminiPdfServer::with_config(config(&server, Some("test-key"))).unwrap();
    let p = params(serde_json::json!({
        "pdf_url": format!("{}/doc.pdf", server.url()),
        "prompt": "Summarize"
    }));

    let err = tool.process_understand(&p).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
}
