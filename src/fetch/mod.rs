//! Rate-limit aware JSON fetching.
//!
//! Every request carries the configured default headers (the API token).
//! HTTP 429 responses are retried after the server's `Retry-After` delay.
//! Payloads that never change once published (finished matches) can be
//! served from an on-disk cache so re-runs don't spend rate limit on them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};
use url::Url;

/// Errors that can occur during fetching.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Still rate limited by {host} after retries (last wait {retry_after_secs}s)")]
    RateLimited { host: String, retry_after_secs: u64 },

    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Response of {size} bytes exceeds limit of {max_size}")]
    ContentTooLarge { size: usize, max_size: usize },

    #[error("Malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration for the HTTP fetcher.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Root of the payload cache
    pub cache_dir: PathBuf,

    /// Cached payloads older than this are fetched again
    pub cache_ttl: Duration,

    /// Largest accepted response body
    pub max_content_size: usize,

    pub timeout: Duration,

    pub user_agent: String,

    /// Headers sent with every request (e.g. API tokens)
    pub default_headers: HashMap<String, String>,

    /// Retries after a 429 before giving up
    pub max_retries: u32,

    /// Wait used when a 429 carries no Retry-After header
    pub default_retry_after: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./data/raw"),
            cache_ttl: Duration::from_secs(30 * 24 * 3600),
            max_content_size: 10 * 1024 * 1024,
            timeout: Duration::from_secs(30),
            user_agent: format!("comp-meta/{}", env!("CARGO_PKG_VERSION")),
            default_headers: HashMap::new(),
            max_retries: 3,
            default_retry_after: Duration::from_secs(10),
        }
    }
}

/// Sidecar record written next to each cached payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedPayload {
    pub url: String,
    pub stored_at: DateTime<Utc>,
    pub bytes: usize,
}

/// On-disk locations of one cached URL.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheSlot {
    body: PathBuf,
    sidecar: PathBuf,
}

/// Payload cache keyed by URL, laid out as `<root>/<host>/<sha256 prefix>.json`.
#[derive(Debug, Clone)]
struct PayloadCache {
    root: PathBuf,
    ttl: Duration,
}

impl PayloadCache {
    /// First 8 bytes of the URL's SHA-256, hex encoded.
    fn key(url: &Url) -> String {
        let digest = Sha256::digest(url.as_str().as_bytes());
        hex::encode(&digest[..8])
    }

    fn slot(&self, url: &Url) -> CacheSlot {
        let dir = self.root.join(url.host_str().unwrap_or("unknown"));
        let key = Self::key(url);
        CacheSlot {
            body: dir.join(format!("{key}.json")),
            sidecar: dir.join(format!("{key}.meta.json")),
        }
    }

    /// Cached body for `url`, if present and within the TTL.
    async fn load(&self, url: &Url) -> Result<Option<Vec<u8>>, FetchError> {
        let slot = self.slot(url);
        if !slot.body.exists() || !slot.sidecar.exists() {
            return Ok(None);
        }

        let sidecar = fs::read_to_string(&slot.sidecar).await?;
        let Ok(record) = serde_json::from_str::<CachedPayload>(&sidecar) else {
            debug!("Ignoring unreadable cache sidecar for {}", url);
            return Ok(None);
        };

        // Clock skew (a future timestamp) counts as fresh
        let age = (Utc::now() - record.stored_at).to_std().unwrap_or_default();
        if age > self.ttl {
            debug!("Cached payload for {} is stale", url);
            return Ok(None);
        }

        Ok(Some(fs::read(&slot.body).await?))
    }

    async fn store(&self, url: &Url, body: &[u8]) -> Result<(), FetchError> {
        let slot = self.slot(url);
        if let Some(dir) = slot.body.parent() {
            fs::create_dir_all(dir).await?;
        }

        fs::write(&slot.body, body).await?;
        let record = CachedPayload {
            url: url.to_string(),
            stored_at: Utc::now(),
            bytes: body.len(),
        };
        fs::write(&slot.sidecar, serde_json::to_vec(&record)?).await?;
        Ok(())
    }
}

/// Parse a `Retry-After` header given in whole seconds.
fn retry_after(headers: &HeaderMap) -> Option<u64> {
    headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()
}

fn header_error(name: &str, reason: impl ToString) -> FetchError {
    FetchError::InvalidHeader {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// HTTP JSON fetcher.
pub struct Fetcher {
    client: Client,
    cache: PayloadCache,
    config: FetcherConfig,
}

impl Fetcher {
    /// Build a fetcher. Default header values are marked sensitive so they
    /// never show up in debug output.
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| header_error(USER_AGENT.as_str(), e))?,
        );

        for (name, value) in &config.default_headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| header_error(name, e))?;
            let mut header_value = HeaderValue::from_str(value).map_err(|e| header_error(name, e))?;
            header_value.set_sensitive(true);
            headers.insert(header_name, header_value);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        let cache = PayloadCache {
            root: config.cache_dir.clone(),
            ttl: config.cache_ttl,
        };

        Ok(Self {
            client,
            cache,
            config,
        })
    }

    /// Fetch and decode JSON from the network, never touching the cache.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, FetchError> {
        let body = self.get_with_retry(url).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Fetch and decode JSON, serving from cache when fresh.
    ///
    /// Only use for payloads that never change once published.
    pub async fn get_json_cached<T: DeserializeOwned>(&self, url: &Url) -> Result<T, FetchError> {
        if let Some(body) = self.cache.load(url).await? {
            match serde_json::from_slice(&body) {
                Ok(value) => return Ok(value),
                Err(e) => warn!("Discarding unreadable cache entry for {}: {}", url, e),
            }
        }

        let body = self.get_with_retry(url).await?;
        let value = serde_json::from_slice(&body)?;
        if let Err(e) = self.cache.store(url, &body).await {
            warn!("Could not cache {}: {}", url, e);
        }
        Ok(value)
    }

    /// GET with retries on 429, honouring Retry-After.
    async fn get_with_retry(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let mut attempt = 0u32;
        loop {
            match self.get_once(url).await {
                Err(FetchError::RateLimited {
                    retry_after_secs, ..
                }) if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        "Rate limited on {}, retry {}/{} in {}s",
                        url, attempt, self.config.max_retries, retry_after_secs
                    );
                    tokio::time::sleep(Duration::from_secs(retry_after_secs)).await;
                }
                other => return other,
            }
        }
    }

    async fn get_once(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        debug!("GET {}", url);
        let response = self.client.get(url.clone()).send().await?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                let wait = retry_after(response.headers())
                    .unwrap_or(self.config.default_retry_after.as_secs());
                return Err(FetchError::RateLimited {
                    host: url.host_str().unwrap_or("unknown").to_string(),
                    retry_after_secs: wait,
                });
            }
            status if !status.is_success() => {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    message: status.canonical_reason().unwrap_or("Unknown").to_string(),
                });
            }
            _ => {}
        }

        let body = response.bytes().await?;
        let limit = self.config.max_content_size;
        if body.len() > limit {
            return Err(FetchError::ContentTooLarge {
                size: body.len(),
                max_size: limit,
            });
        }
        Ok(body.to_vec())
    }
}
