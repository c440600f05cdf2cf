//! Prompt dispatch: resolve every PDF, then run one inference call

use crate::cache::FileCache;
use crate::error::{Error, Result};
use crate::gemini::{GeminiApi, RemoteHandle};
use crate::source::PdfRequest;
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;

/// Answer for one tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdfResult {
    pub text: String,
    pub model_used: String,
    pub file_count: usize,
}

pub struct Dispatcher {
    cache: Arc<FileCache>,
    api: Arc<dyn GeminiApi>,
    default_model: String,
}

impl Dispatcher {
    pub fn new(cache: Arc<FileCache>, api: Arc<dyn GeminiApi>, default_model: impl Into<String>) -> Self {
        Self {
            cache,
            api,
            default_model: default_model.into(),
        }
    }

    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    pub async fn run(&self, request: &PdfRequest) -> Result<PdfResult> {
        let model = request.model.as_deref().unwrap_or(&self.default_model);

        let handles = self.resolve_all(&request.urls).await?;

        let text = match self.api.generate(model, &request.prompt, &handles).await {
            Err(Error::HandleExpired { handle }) => {
                tracing::warn!(handle = ?handle, "Remote file expired, re-uploading once");
                match handle.as_deref() {
                    Some(name) if self.cache.invalidate_handle(&request.urls, name) > 0 => {}
                    _ => {
                        for url in &request.urls {
                            self.cache.invalidate(url);
                        }
                    }
                }
                let handles = self.resolve_all(&request.urls).await?;
                self.api.generate(model, &request.prompt, &handles).await?
            }
            other => other?,
        };

        tracing::info!(model = %model, files = handles.len(), "PDFs processed successfully");

        Ok(PdfResult {
            text: strip_control_chars(&text),
            model_used: model.to_string(),
            file_count: handles.len(),
        })
    }

    /// Resolve all URLs concurrently, failing with the first error in input order.
    async fn resolve_all(&self, urls: &[String]) -> Result<Vec<RemoteHandle>> {
        let total = urls.len();
        let results = join_all(urls.iter().enumerate().map(|(idx, url)| async move {
            tracing::info!(url = %url, "Processing PDF {}/{}", idx + 1, total);
            self.cache.get_or_upload(url).await
        }))
        .await;

        results
            .into_iter()
            .zip(urls)
            .enumerate()
            .map(|(idx, (result, url))| {
                result.map_err(|e| {
                    tracing::warn!(url = %url, index = idx + 1, error = %e, "Failed to resolve PDF");
                    e
                })
            })
            .collect()
    }
}

/// Drop control characters the model may emit, keeping line breaks and tabs.
fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::{test_cache, FakeFetcher, FakeGemini};
    use crate::source::{PdfUrlInput, RequestLimits};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;

    fn setup(fetcher: FakeFetcher, api: FakeGemini) -> (Dispatcher, Arc<FakeFetcher>, Arc<FakeGemini>) {
        let fetcher = Arc::new(fetcher);
        let api = Arc::new(api);
        let cache = Arc::new(test_cache(fetcher.clone(), api.clone()));
        (
            Dispatcher::new(cache, api.clone(), "gemini-2.5-flash"),
            fetcher,
            api,
        )
    }

    fn request(urls: &[&str], prompt: &str, model: Option<&str>) -> PdfRequest {
        let input = PdfUrlInput::Many(urls.iter().map(|u| u.to_string()).collect());
        PdfRequest::new(input, prompt, model, &RequestLimits::default()).unwrap()
    }

    #[test]
    fn test_strip_control_chars() {
        assert_eq!(strip_control_chars("a\u{0}b\u{7}\nc\td\r\n"), "ab\nc\td\r\n");
        assert_eq!(strip_control_chars("Three sentences..."), "Three sentences...");
    }

    #[tokio::test]
    async fn test_run_uses_default_model_and_caches() {
        let (dispatcher, _, api) = setup(FakeFetcher::default(), FakeGemini::default());
        let req = request(&["https://a.test/doc.pdf"], "Summarize", None);

        let first = dispatcher.run(&req).await.unwrap();
        let second = dispatcher.run(&req).await.unwrap();

        assert_eq!(first.model_used, "gemini-2.5-flash");
        assert_eq!(first.file_count, 1);
        assert_eq!(first.text, "answer to \"Summarize\" over 1 file(s)");
        assert_eq!(first, second);
        assert_eq!(api.uploads.load(Ordering::SeqCst), 1);
        assert_eq!(
            *api.seen_files.lock(),
            vec![vec!["files/h1".to_string()], vec!["files/h1".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_run_model_override() {
        let (dispatcher, _, api) = setup(FakeFetcher::default(), FakeGemini::default());
        let req = request(&["https://a.test/doc.pdf"], "Summarize", Some("gemini-2.5-pro"));

        let result = dispatcher.run(&req).await.unwrap();
        assert_eq!(result.model_used, "gemini-2.5-pro");
        assert_eq!(*api.seen_models.lock(), vec!["gemini-2.5-pro".to_string()]);
    }

    #[tokio::test]
    async fn test_run_preserves_file_order() {
        let (dispatcher, _, api) = setup(FakeFetcher::default(), FakeGemini::default());
        // Warm the cache for the second URL so handle numbers differ from input order
        dispatcher
            .run(&request(&["https://a.test/2.pdf"], "warm", None))
            .await
            .unwrap();

        dispatcher
            .run(&request(&["https://a.test/1.pdf", "https://a.test/2.pdf"], "Compare", None))
            .await
            .unwrap();

        let seen = api.seen_files.lock();
        assert_eq!(seen[1], vec!["files/h2".to_string(), "files/h1".to_string()]);
    }

    #[tokio::test]
    async fn test_run_aborts_on_failed_download() {
        let (dispatcher, _, api) = setup(
            FakeFetcher {
                missing: vec!["https://a.test/2.pdf".to_string()],
                ..FakeFetcher::default()
            },
            FakeGemini::default(),
        );

        let err = dispatcher
            .run(&request(&["https://a.test/1.pdf", "https://a.test/2.pdf"], "Compare", None))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DownloadFailed { .. }));
        assert_eq!(err.url(), Some("https://a.test/2.pdf"));
        assert_eq!(api.generations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_first_error_in_input_order_wins() {
        let (dispatcher, _, _) = setup(
            FakeFetcher {
                missing: vec![
                    "https://a.test/2.pdf".to_string(),
                    "https://a.test/3.pdf".to_string(),
                ],
                ..FakeFetcher::default()
            },
            FakeGemini::default(),
        );

        let err = dispatcher
            .run(&request(
                &["https://a.test/1.pdf", "https://a.test/3.pdf", "https://a.test/2.pdf"],
                "Compare",
                None,
            ))
            .await
            .unwrap_err();
        assert_eq!(err.url(), Some("https://a.test/3.pdf"));
    }

    #[tokio::test]
    async fn test_expired_handle_reuploads_once() {
        let api = FakeGemini::default();
        api.expire_first.store(1, Ordering::SeqCst);
        let (dispatcher, fetcher, api) = setup(FakeFetcher::default(), api);

        let result = dispatcher
            .run(&request(&["https://a.test/doc.pdf"], "Summarize", None))
            .await
            .unwrap();

        assert_eq!(result.file_count, 1);
        assert_eq!(api.uploads.load(Ordering::SeqCst), 2);
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(api.generations.load(Ordering::SeqCst), 2);
        assert_eq!(
            dispatcher
                .cache()
                .entry("https://a.test/doc.pdf")
                .unwrap()
                .handle
                .name(),
            Some("files/h2")
        );
    }

    #[tokio::test]
    async fn test_expired_twice_is_surfaced() {
        let api = FakeGemini::default();
        api.expire_first.store(2, Ordering::SeqCst);
        let (dispatcher, _, api) = setup(FakeFetcher::default(), api);

        let err = dispatcher
            .run(&request(&["https://a.test/doc.pdf"], "Summarize", None))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::HandleExpired { .. }));
        assert_eq!(api.generations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unnamed_expiry_reuploads_every_url() {
        let api = FakeGemini {
            anonymous_expiry: true,
            ..FakeGemini::default()
        };
        api.expire_first.store(1, Ordering::SeqCst);
        let (dispatcher, fetcher, api) = setup(FakeFetcher::default(), api);

        let result = dispatcher
            .run(&request(
                &["https://a.test/1.pdf", "https://a.test/2.pdf", "https://a.test/3.pdf"],
                "Compare",
                None,
            ))
            .await
            .unwrap();

        assert_eq!(result.file_count, 3);
        assert_eq!(api.uploads.load(Ordering::SeqCst), 6);
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 6);
        assert_eq!(api.generations.load(Ordering::SeqCst), 2);

        let seen = api.seen_files.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].iter().all(|name| !seen[0].contains(name)));
    }
}
