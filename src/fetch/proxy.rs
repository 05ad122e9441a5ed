//! Proxy pool
//!
//! Parsed once from configuration; hands out endpoints round-robin or at
//! random. The cursor is a single atomic counter, so occasional same-proxy
//! repeats under contention are possible and acceptable.

use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyScheme {
    Http,
    Https,
    Socks4,
    Socks5,
}

#[derive(Debug, Clone)]
pub struct ProxyEndpoint {
    pub url: String,
    pub scheme: ProxyScheme,
}

impl ProxyEndpoint {
    /// Parse a single endpoint; bare `host:port` entries default to http.
    fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let (scheme, url) = if trimmed.starts_with("socks5://") {
            (ProxyScheme::Socks5, trimmed.to_string())
        } else if trimmed.starts_with("socks4://") {
            (ProxyScheme::Socks4, trimmed.to_string())
        } else if trimmed.starts_with("https://") {
            (ProxyScheme::Https, trimmed.to_string())
        } else if trimmed.starts_with("http://") {
            (ProxyScheme::Http, trimmed.to_string())
        } else {
            (ProxyScheme::Http, format!("http://{trimmed}"))
        };
        Some(Self { url, scheme })
    }
}

/// Fixed set of proxy endpoints with a rotating cursor.
pub struct ProxyPool {
    entries: Vec<ProxyEndpoint>,
    cursor: AtomicUsize,
}

impl ProxyPool {
    /// Build from a comma-separated configuration value.
    pub fn from_list(raw: &str) -> Self {
        let entries = raw.split(',').filter_map(ProxyEndpoint::parse).collect();
        Self {
            entries,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Round-robin selection.
    pub fn next_proxy(&self) -> Option<&ProxyEndpoint> {
        if self.entries.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.entries.len();
        Some(&self.entries[idx])
    }

    /// Uniform random selection.
    pub fn random_proxy(&self) -> Option<&ProxyEndpoint> {
        if self.entries.is_empty() {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..self.entries.len());
        Some(&self.entries[idx])
    }
}
