//! Stealth HTTP client
//!
//! Wraps a reqwest client with randomized browser fingerprints. A stealth
//! client pins one proxy for its lifetime (or the explicit `proxy_url`);
//! the rotating variant draws a fresh proxy from the pool per request.

use anyhow::{Context, Result};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use std::time::Duration;

use super::proxy::ProxyPool;

/// Per-request deadline applied when the caller does not override it.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Options recognized by the fetch substrate.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Route through a proxy drawn from the pool.
    pub use_proxy: bool,
    /// Pin a specific proxy, overriding the pool.
    pub proxy_url: Option<String>,
    pub timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            use_proxy: false,
            proxy_url: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

struct BrowserProfile {
    user_agent: &'static str,
    accept_language: &'static str,
    /// Chromium client hints; None for Firefox/Safari.
    sec_ch_ua: Option<&'static str>,
    sec_ch_platform: Option<&'static str>,
}

static PROFILES: &[BrowserProfile] = &[
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
        accept_language: "en-US,en;q=0.9",
        sec_ch_ua: Some("\"Not/A)Brand\";v=\"8\", \"Chromium\";v=\"126\", \"Google Chrome\";v=\"126\""),
        sec_ch_platform: Some("\"Windows\""),
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
        accept_language: "en-US,en;q=0.9",
        sec_ch_ua: Some("\"Chromium\";v=\"125\", \"Google Chrome\";v=\"125\", \"Not.A/Brand\";v=\"24\""),
        sec_ch_platform: Some("\"macOS\""),
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
        accept_language: "en-US,en;q=0.5",
        sec_ch_ua: None,
        sec_ch_platform: None,
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
        accept_language: "en-US,en;q=0.9",
        sec_ch_ua: None,
        sec_ch_platform: None,
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36 Edg/126.0.0.0",
        accept_language: "en-US,en;q=0.8",
        sec_ch_ua: Some("\"Not/A)Brand\";v=\"8\", \"Chromium\";v=\"126\", \"Microsoft Edge\";v=\"126\""),
        sec_ch_platform: Some("\"Windows\""),
    },
];

fn pick_profile() -> &'static BrowserProfile {
    let idx = rand::thread_rng().gen_range(0..PROFILES.len());
    &PROFILES[idx]
}

/// Build a plausible browser header set from a random fingerprint.
fn browser_headers(referer: Option<&str>) -> HeaderMap {
    let profile = pick_profile();
    let mut headers = HeaderMap::new();

    headers.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_static(profile.user_agent),
    );
    headers.insert(
        reqwest::header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        reqwest::header::ACCEPT_LANGUAGE,
        HeaderValue::from_static(profile.accept_language),
    );
    headers.insert(
        reqwest::header::ACCEPT_ENCODING,
        HeaderValue::from_static("gzip, deflate"),
    );
    headers.insert(
        reqwest::header::CONNECTION,
        HeaderValue::from_static("keep-alive"),
    );
    headers.insert(
        HeaderName::from_static("upgrade-insecure-requests"),
        HeaderValue::from_static("1"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("document"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("navigate"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static(if referer.is_some() { "same-origin" } else { "none" }),
    );

    if let Some(ua) = profile.sec_ch_ua {
        if let Ok(value) = HeaderValue::from_str(ua) {
            headers.insert(HeaderName::from_static("sec-ch-ua"), value);
        }
        headers.insert(
            HeaderName::from_static("sec-ch-ua-mobile"),
            HeaderValue::from_static("?0"),
        );
    }
    if let Some(platform) = profile.sec_ch_platform {
        if let Ok(value) = HeaderValue::from_str(platform) {
            headers.insert(HeaderName::from_static("sec-ch-ua-platform"), value);
        }
    }

    if let Some(r) = referer {
        if let Ok(value) = HeaderValue::from_str(r) {
            headers.insert(reqwest::header::REFERER, value);
        }
    }

    headers
}

/// Synthesize a plausible per-vendor session cookie header. Call once per
/// burst and reuse so the session looks stable within it.
pub fn synth_session_cookie(vendor: &str) -> String {
    let mut rng = rand::thread_rng();
    let hex: String = (0..16)
        .map(|_| format!("{:x}", rng.gen_range(0..16)))
        .collect();
    let digits: String = (0..17).map(|_| rng.gen_range(0..10).to_string()).collect();

    match vendor {
        "amazon" => format!("session-id={digits}; i18n-prefs=USD; lc-main=en_US"),
        "newegg" => format!("NV%5FW57=USA; NVTC={hex}"),
        "bestbuy" => format!("intl_splash=false; vt={hex}; locDestZip=10001"),
        "bhphoto" => format!("sessionKey={hex}; ipCountry=US"),
        _ => format!("session={hex}"),
    }
}

/// HTTP client with randomized browser-like headers, optional proxy, and a
/// per-request deadline.
pub struct StealthClient {
    client: reqwest::Client,
}

impl StealthClient {
    /// Build a client; pins `proxy_url` when given, otherwise draws one
    /// endpoint from the pool when `use_proxy` is set.
    pub fn new(options: &FetchOptions, pool: Option<&ProxyPool>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(options.timeout)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(5));

        let pinned = options.proxy_url.clone().or_else(|| {
            if options.use_proxy {
                pool.and_then(|p| p.next_proxy()).map(|e| e.url.clone())
            } else {
                None
            }
        });
        if let Some(url) = pinned {
            let proxy = reqwest::Proxy::all(&url)
                .with_context(|| format!("Invalid proxy url: {url}"))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    /// GET with a fresh fingerprint; `referer` is wired from the caller.
    pub async fn get(
        &self,
        url: &str,
        referer: Option<&str>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .get(url)
            .headers(browser_headers(referer))
            .send()
            .await
    }

    /// GET carrying an explicit cookie header on top of the fingerprint.
    pub async fn get_with_cookies(
        &self,
        url: &str,
        referer: Option<&str>,
        cookies: &str,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut headers = browser_headers(referer);
        if let Ok(value) = HeaderValue::from_str(cookies) {
            headers.insert(reqwest::header::COOKIE, value);
        }
        self.client.get(url).headers(headers).send().await
    }
}

/// Variant that builds a fresh client (and so picks a fresh proxy) for
/// every request.
pub struct RotatingClient {
    pool: Arc<ProxyPool>,
    timeout: Duration,
}

impl RotatingClient {
    pub fn new(pool: Arc<ProxyPool>, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub async fn get(
        &self,
        url: &str,
        referer: Option<&str>,
    ) -> Result<reqwest::Response> {
        let options = FetchOptions {
            use_proxy: !self.pool.is_empty(),
            proxy_url: None,
            timeout: self.timeout,
        };
        let client = StealthClient::new(&options, Some(&self.pool))?;
        client
            .get(url, referer)
            .await
            .context("rotating fetch failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_contain_core_fields() {
        let headers = browser_headers(Some("https://www.newegg.com/"));
        assert!(headers.contains_key(reqwest::header::USER_AGENT));
        assert!(headers.contains_key(reqwest::header::ACCEPT_LANGUAGE));
        assert!(headers.contains_key("sec-fetch-mode"));
        assert_eq!(headers.get("sec-fetch-site").unwrap(), "same-origin");
        assert_eq!(
            headers.get(reqwest::header::REFERER).unwrap(),
            "https://www.newegg.com/"
        );
    }

    #[test]
    fn test_no_referer_means_direct_navigation() {
        let headers = browser_headers(None);
        assert_eq!(headers.get("sec-fetch-site").unwrap(), "none");
        assert!(!headers.contains_key(reqwest::header::REFERER));
    }

    #[tokio::test]
    async fn test_rotating_client_surfaces_connection_errors() {
        let client = RotatingClient::new(Arc::new(ProxyPool::empty()), Duration::from_secs(2));
        assert!(client.get("http://127.0.0.1:1/", None).await.is_err());
    }

    #[test]
    fn test_session_cookie_shape() {
        let cookie = synth_session_cookie("amazon");
        assert!(cookie.contains("session-id="));
        assert!(cookie.contains("i18n-prefs=USD"));
        // Distinct bursts get distinct sessions (overwhelmingly likely).
        assert_ne!(synth_session_cookie("newegg"), synth_session_cookie("newegg"));
    }
}
