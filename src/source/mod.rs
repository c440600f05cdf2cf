//! PDF sources: tool input normalization and HTTP download

pub mod fetcher;
pub mod request;

pub use fetcher::{FetchPolicy, FetchedPdf, HttpFetcher, PdfFetcher};
pub use request::{normalize, PdfRequest, PdfUrlInput, RequestLimits};
