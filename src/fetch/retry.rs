//! Retry with exponential backoff
//!
//! Up to N attempts; between attempts sleeps `2^attempt * 1000ms` plus
//! jitter. A 403/429 forces an additional longer jitter before the next
//! attempt. The final attempt surfaces whatever response was received.

use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::AdapterError;

use super::stealth::StealthClient;

pub const DEFAULT_RETRY_ATTEMPTS: usize = 3;

fn backoff_ms(attempt: usize) -> u64 {
    let jitter = rand::thread_rng().gen_range(500..1500);
    (1u64 << attempt) * 1000 + jitter
}

fn rate_limit_jitter_ms() -> u64 {
    rand::thread_rng().gen_range(3000..6000)
}

/// GET `url` through the stealth client, retrying transient failures.
/// `cookies`, when given, rides along on every attempt so the burst keeps
/// one session.
pub async fn fetch_with_retry(
    client: &StealthClient,
    adapter: &'static str,
    url: &str,
    referer: Option<&str>,
    cookies: Option<&str>,
    attempts: usize,
) -> Result<reqwest::Response, AdapterError> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = match cookies {
            Some(c) => client.get_with_cookies(url, referer, c).await,
            None => client.get(url, referer).await,
        };
        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                if (status == 403 || status == 429) && attempt < attempts {
                    let pause = backoff_ms(attempt) + rate_limit_jitter_ms();
                    tracing::debug!(
                        adapter,
                        status,
                        attempt,
                        pause_ms = pause,
                        "rate-limited, backing off"
                    );
                    sleep(Duration::from_millis(pause)).await;
                    attempt += 1;
                    continue;
                }
                return Ok(response);
            }
            Err(err) if attempt < attempts => {
                let pause = backoff_ms(attempt);
                tracing::debug!(adapter, attempt, pause_ms = pause, error = %err, "fetch failed, retrying");
                sleep(Duration::from_millis(pause)).await;
                attempt += 1;
            }
            Err(err) => {
                return Err(
                    AdapterError::fetch_failed(adapter, format!("GET {url} failed"))
                        .with_cause(err),
                );
            }
        }
    }
}
