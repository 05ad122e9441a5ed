//! HTML scraping adapters
//!
//! Shared machinery for the per-vendor scrapers: session warm-up, block
//! detection, selector-family fallback, and embedded structured-data
//! parsing. Vendor modules supply URLs, selector families, and block
//! markers.

mod amazon;
mod bestbuy;
mod bhphoto;
mod newegg;

pub use amazon::AmazonScraper;
pub use bestbuy::BestBuyScraper;
pub use bhphoto::BhPhotoScraper;
pub use newegg::NeweggScraper;

use rand::Rng;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::AppConfig;
use crate::error::AdapterError;
use crate::fetch::{
    fetch_with_retry, synth_session_cookie, FetchOptions, ProxyPool, ScraperApiClient,
    StealthClient, DEFAULT_RETRY_ATTEMPTS,
};
use crate::types::{Asset, Condition, ListingMeta, Observation};

use super::relevance;

/// Static CSS selectors are validated by tests; a parse failure here is a
/// programming error, not a runtime condition.
pub(crate) fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("valid static selector")
}

/// One way a vendor lays out its result page.
pub(crate) struct SelectorFamily {
    pub item: &'static str,
    pub title: &'static str,
    pub price: &'static str,
}

/// Vendor-specific block and structure markers.
pub(crate) struct BlockMarkers {
    pub captcha: &'static [&'static str],
    pub blocked: &'static [&'static str],
    /// At least one must appear in a healthy page.
    pub landmarks: &'static [&'static str],
}

/// Shared fetch plumbing for one scraper.
pub(crate) struct ScrapeContext {
    adapter: &'static str,
    vendor: &'static str,
    homepage: &'static str,
    client: StealthClient,
    scraper_api: Option<ScraperApiClient>,
}

impl ScrapeContext {
    pub fn new(
        adapter: &'static str,
        vendor: &'static str,
        homepage: &'static str,
        config: &AppConfig,
        pool: &Arc<ProxyPool>,
    ) -> anyhow::Result<Self> {
        let options = FetchOptions {
            use_proxy: config.use_proxy,
            proxy_url: None,
            ..FetchOptions::default()
        };
        let client = StealthClient::new(&options, Some(pool))?;
        let scraper_api = config
            .scraper_api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(ScraperApiClient::new);
        Ok(Self {
            adapter,
            vendor,
            homepage,
            client,
            scraper_api,
        })
    }

    /// Hit the homepage and idle briefly so the search request does not
    /// arrive cold. Failures are irrelevant; this is warm-up only.
    async fn warm_up(&self) {
        if let Err(err) = self.client.get(self.homepage, None).await {
            tracing::debug!(adapter = self.adapter, error = %err, "warm-up request failed");
        }
        let pause = rand::thread_rng().gen_range(800..2500);
        sleep(Duration::from_millis(pause)).await;
    }

    /// Fetch the search page, either via the third-party fetch proxy (one
    /// proxied GET, no warm-up) or via the stealth client with a warmed
    /// session and a synthesized vendor cookie.
    pub async fn fetch_search(
        &self,
        url: &str,
        render_js: bool,
    ) -> Result<(u16, String), AdapterError> {
        if let Some(api) = &self.scraper_api {
            let html = api.fetch(self.adapter, url, render_js, "us").await?;
            return Ok((200, html));
        }

        self.warm_up().await;
        let cookies = synth_session_cookie(self.vendor);
        let response = fetch_with_retry(
            &self.client,
            self.adapter,
            url,
            Some(self.homepage),
            Some(&cookies),
            DEFAULT_RETRY_ATTEMPTS,
        )
        .await?;

        let status = response.status().as_u16();
        let html = response.text().await.map_err(|e| {
            AdapterError::fetch_failed(self.adapter, "response body read failed").with_cause(e)
        })?;
        Ok((status, html))
    }
}

/// Raise a typed error when the page smells like an anti-bot response.
/// On block, callers return no partial data.
pub(crate) fn check_block(
    adapter: &'static str,
    status: u16,
    html: &str,
    markers: &BlockMarkers,
) -> Result<(), AdapterError> {
    if status == 403 || status == 429 {
        return Err(AdapterError::blocked(
            adapter,
            format!("HTTP {status} anti-bot response"),
        ));
    }
    if !(200..300).contains(&status) {
        return Err(AdapterError::http_error(adapter, status));
    }

    let lower = html.to_lowercase();
    for marker in markers.captcha {
        if lower.contains(&marker.to_lowercase()) {
            return Err(AdapterError::captcha(
                adapter,
                format!("challenge marker present: {marker}"),
            ));
        }
    }
    for marker in markers.blocked {
        if lower.contains(&marker.to_lowercase()) {
            return Err(AdapterError::blocked(
                adapter,
                format!("block marker present: {marker}"),
            ));
        }
    }
    if !markers.landmarks.is_empty() && !markers.landmarks.iter().any(|l| html.contains(l)) {
        return Err(AdapterError::blocked(
            adapter,
            "expected page landmarks missing",
        ));
    }
    Ok(())
}

/// Space-to-plus query encoding; search terms are plain keywords.
pub(crate) fn encode_query(q: &str) -> String {
    q.replace(' ', "+")
}

/// Pull the leading price out of a text node like `"$1,599.99 – $1,699.00"`.
pub(crate) fn parse_price_text(raw: &str) -> Option<f64> {
    let mut cleaned = String::new();
    let mut seen_digit = false;
    let mut seen_dot = false;
    for c in raw.chars() {
        match c {
            '0'..='9' => {
                cleaned.push(c);
                seen_digit = true;
            }
            ',' if seen_digit => {}
            '.' if seen_digit && !seen_dot => {
                cleaned.push('.');
                seen_dot = true;
            }
            _ if seen_digit => break,
            _ => {}
        }
    }
    let value: f64 = cleaned.parse().ok()?;
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Walk the selector families in order; the first one that yields listings
/// wins. Later families exist to survive layout variants.
pub(crate) fn extract_listings(doc: &Html, families: &[SelectorFamily]) -> Vec<(String, f64)> {
    for family in families {
        let item_sel = sel(family.item);
        let title_sel = sel(family.title);
        let price_sel = sel(family.price);

        let mut found = Vec::new();
        for item in doc.select(&item_sel) {
            let title = item
                .select(&title_sel)
                .next()
                .map(|t| t.text().collect::<String>().trim().to_string());
            let price = item
                .select(&price_sel)
                .next()
                .and_then(|p| parse_price_text(&p.text().collect::<String>()));
            if let (Some(title), Some(price)) = (title, price) {
                if !title.is_empty() {
                    found.push((title, price));
                }
            }
        }
        if !found.is_empty() {
            return found;
        }
    }
    Vec::new()
}

/// Product entries from embedded `application/ld+json` blocks; survives
/// layout changes that break the CSS families.
pub(crate) fn json_ld_products(doc: &Html) -> Vec<(String, f64)> {
    let script_sel = sel(r#"script[type="application/ld+json"]"#);
    let mut out = Vec::new();
    for script in doc.select(&script_sel) {
        let text: String = script.text().collect();
        if let Ok(value) = serde_json::from_str::<Value>(&text) {
            collect_ld_products(&value, &mut out);
        }
    }
    out
}

fn ld_offer_price(offers: &Value) -> Option<f64> {
    let offer = match offers {
        Value::Array(items) => items.first()?,
        other => other,
    };
    let currency = offer.get("priceCurrency").and_then(Value::as_str);
    if matches!(currency, Some(c) if c != "USD") {
        return None;
    }
    let price = offer.get("price").or_else(|| offer.get("lowPrice"))?;
    match price {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_price_text(s),
        _ => None,
    }
}

fn collect_ld_products(value: &Value, out: &mut Vec<(String, f64)>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_ld_products(item, out);
            }
        }
        Value::Object(map) => {
            if let Some(graph) = map.get("@graph") {
                collect_ld_products(graph, out);
            }
            if let Some(elements) = map.get("itemListElement") {
                if let Value::Array(items) = elements {
                    for element in items {
                        collect_ld_products(element.get("item").unwrap_or(element), out);
                    }
                }
            }
            if map.get("@type").and_then(Value::as_str) == Some("Product") {
                let name = map.get("name").and_then(Value::as_str);
                let price = map.get("offers").and_then(ld_offer_price);
                if let (Some(name), Some(price)) = (name, price) {
                    if price > 0.0 {
                        out.push((name.to_string(), price));
                    }
                }
            }
        }
        _ => {}
    }
}

/// Turn raw `(title, price)` listings into observations, applying the
/// relevance predicate, price floor, and new-condition gate.
pub(crate) fn observations_from_listings(
    source: &'static str,
    asset: Asset,
    listings: Vec<(String, f64)>,
    now: i64,
) -> Vec<Observation> {
    listings
        .into_iter()
        .filter(|(title, price)| {
            relevance::is_relevant(asset, title)
                && relevance::passes_floor(*price)
                && Condition::from_listing(title) == Condition::New
        })
        .map(|(title, price)| {
            Observation::new(asset, price, source, now).with_meta(ListingMeta {
                title,
                seller: None,
                condition: Condition::New,
                url: None,
            })
        })
        .collect()
}
