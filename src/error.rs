//! Typed adapter errors
//!
//! Every adapter failure is reported as an [`AdapterError`] carrying the
//! adapter name and a stable code. The aggregator logs these uniformly and
//! continues the round; they never propagate to HTTP responses.

use std::fmt;
use thiserror::Error;

/// Stable error codes propagated in logs and envelope responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Adapter credentials are not configured.
    AuthMissing,
    /// Upstream rejected the configured credentials.
    AuthFailed,
    /// Generic network or protocol failure.
    FetchFailed,
    /// Upstream returned a non-2xx status.
    HttpError,
    /// Upstream anti-bot layer denied the request.
    Blocked,
    /// Upstream served a CAPTCHA challenge.
    Captcha,
    /// Parsing failure, or empty result after structural checks passed.
    ScrapeFailed,
    /// The third-party fetch proxy returned a non-200.
    ScraperApiError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AuthMissing => "AUTH_MISSING",
            ErrorCode::AuthFailed => "AUTH_FAILED",
            ErrorCode::FetchFailed => "FETCH_FAILED",
            ErrorCode::HttpError => "HTTP_ERROR",
            ErrorCode::Blocked => "BLOCKED",
            ErrorCode::Captcha => "CAPTCHA",
            ErrorCode::ScrapeFailed => "SCRAPE_FAILED",
            ErrorCode::ScraperApiError => "SCRAPER_API_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An adapter-scoped failure: which adapter, what class, human detail.
#[derive(Debug, Error)]
#[error("[{adapter}] {code}: {message}")]
pub struct AdapterError {
    pub adapter: &'static str,
    pub code: ErrorCode,
    pub message: String,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AdapterError {
    pub fn new(adapter: &'static str, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            adapter,
            code,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(
        mut self,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn auth_missing(adapter: &'static str, message: impl Into<String>) -> Self {
        Self::new(adapter, ErrorCode::AuthMissing, message)
    }

    pub fn auth_failed(adapter: &'static str, message: impl Into<String>) -> Self {
        Self::new(adapter, ErrorCode::AuthFailed, message)
    }

    pub fn fetch_failed(adapter: &'static str, message: impl Into<String>) -> Self {
        Self::new(adapter, ErrorCode::FetchFailed, message)
    }

    pub fn http_error(adapter: &'static str, status: u16) -> Self {
        Self::new(
            adapter,
            ErrorCode::HttpError,
            format!("upstream returned HTTP {status}"),
        )
    }

    pub fn blocked(adapter: &'static str, message: impl Into<String>) -> Self {
        Self::new(adapter, ErrorCode::Blocked, message)
    }

    pub fn captcha(adapter: &'static str, message: impl Into<String>) -> Self {
        Self::new(adapter, ErrorCode::Captcha, message)
    }

    pub fn scrape_failed(adapter: &'static str, message: impl Into<String>) -> Self {
        Self::new(adapter, ErrorCode::ScrapeFailed, message)
    }

    pub fn scraper_api(adapter: &'static str, message: impl Into<String>) -> Self {
        Self::new(adapter, ErrorCode::ScraperApiError, message)
    }
}
