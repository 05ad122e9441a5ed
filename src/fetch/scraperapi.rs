//! Third-party fetch proxy
//!
//! When a ScraperAPI key is configured, scraper fetches are redirected
//! through the service, which returns the upstream HTML. Rendering of
//! JavaScript-heavy pages is delegated to the service via `render`.

use std::time::Duration;

use crate::error::AdapterError;

const SCRAPER_API_URL: &str = "https://api.scraperapi.com/";

/// ScraperAPI responses can take a while when rendering is on.
const SCRAPER_API_TIMEOUT: Duration = Duration::from_secs(70);

pub struct ScraperApiClient {
    key: String,
    client: reqwest::Client,
}

impl ScraperApiClient {
    pub fn new(key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(SCRAPER_API_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            key: key.into(),
            client,
        }
    }

    /// Fetch `url` through the proxy service and return the upstream body.
    pub async fn fetch(
        &self,
        adapter: &'static str,
        url: &str,
        render_js: bool,
        country: &str,
    ) -> Result<String, AdapterError> {
        let mut query: Vec<(&str, &str)> = vec![
            ("api_key", self.key.as_str()),
            ("url", url),
            ("country_code", country),
        ];
        if render_js {
            query.push(("render", "true"));
        }

        let response = self
            .client
            .get(SCRAPER_API_URL)
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                AdapterError::scraper_api(adapter, "fetch proxy request failed").with_cause(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::scraper_api(
                adapter,
                format!("fetch proxy returned HTTP {}", status.as_u16()),
            ));
        }

        response.text().await.map_err(|e| {
            AdapterError::scraper_api(adapter, "fetch proxy body read failed").with_cause(e)
        })
    }
}
