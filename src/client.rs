use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Desktop browser identity sent with every request.
pub const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                              (KHTML, like Gecko) Chrome/100.0.4896.60 Safari/537.36";

/// Minimum-interval gate shared by all fetch tasks of one crawl phase.
/// Each acquire reserves the next send slot, so concurrent workers are
/// spaced `interval` apart no matter which task reaches the gate first.
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    pub async fn acquire(&self) {
        let wait = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = (*next).max(now);
            *next = slot + self.interval;
            slot - now
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

/// Rate-limited HTTP getter with an immutable base header set. Per-call
/// headers (referer, cookie) are passed as an overlay instead of mutating
/// shared state.
pub struct Http {
    client: reqwest::Client,
    base_headers: HeaderMap,
    limiter: RateLimiter,
}

impl Http {
    pub fn new(base_headers: HeaderMap, delay: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_headers,
            limiter: RateLimiter::new(delay),
        })
    }

    /// Base header set carrying only the browser identity.
    pub fn plain(delay: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
        Self::new(headers, delay)
    }

    async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        overlay: &[(HeaderName, String)],
    ) -> Result<reqwest::Response> {
        self.limiter.acquire().await;

        let mut headers = self.base_headers.clone();
        for (name, value) in overlay {
            let value = HeaderValue::from_str(value)
                .map_err(|_| Error::Config(format!("header value for {name}")))?;
            headers.insert(name.clone(), value);
        }

        let response = self
            .client
            .get(url)
            .headers(headers)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(url, format!("status {status}")));
        }
        Ok(response)
    }

    pub async fn get_text(
        &self,
        url: &str,
        query: &[(&str, String)],
        overlay: &[(HeaderName, String)],
    ) -> Result<String> {
        self.get(url, query, overlay)
            .await?
            .text()
            .await
            .map_err(|e| Error::fetch(url, e))
    }

    pub async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        overlay: &[(HeaderName, String)],
    ) -> Result<serde_json::Value> {
        let body = self.get_text(url, query, overlay).await?;
        serde_json::from_str(&body).map_err(|e| Error::parse(format!("{url}: {e}")))
    }

    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get(url, &[], &[]).await?;
        let bytes = response.bytes().await.map_err(|e| Error::fetch(url, e))?;
        Ok(bytes.to_vec())
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn limiter_spaces_acquires() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        // First acquire is free, the next two are spaced one interval each.
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn limiter_first_acquire_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(5));
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
