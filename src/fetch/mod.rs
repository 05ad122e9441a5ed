//! HTTP fetch substrate
//!
//! Shared machinery for high-success GETs against hostile endpoints:
//! browser-like header randomization, per-vendor session cookies, optional
//! proxy routing, retry with backoff, and the third-party fetch proxy.

mod proxy;
mod retry;
mod scraperapi;
mod stealth;

pub use proxy::{ProxyEndpoint, ProxyPool, ProxyScheme};
pub use retry::{fetch_with_retry, DEFAULT_RETRY_ATTEMPTS};
pub use scraperapi::ScraperApiClient;
pub use stealth::{synth_session_cookie, FetchOptions, RotatingClient, StealthClient};
