//! Loading raw dataset bytes from a local path or over HTTP.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result};
use tracing::debug;

/// Downloads `url`, failing on non-success status codes.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let resp = client.get(url.parse()?).await?;
    Ok(resp.bytes().await?.to_vec())
}

pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Loads dataset bytes from a local file path or fetches them over HTTP.
#[tracing::instrument(skip(client))]
pub async fn load_source<C: HttpClient>(client: &C, source: &str) -> Result<Vec<u8>> {
    let bytes = if is_url(source) {
        fetch_bytes(client, source)
            .await
            .with_context(|| format!("Failed to fetch '{source}'"))?
    } else {
        std::fs::read(source).with_context(|| format!("Failed to read '{source}'"))?
    };
    debug!(bytes = bytes.len(), "Source loaded");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every request with a fixed status and body, counting calls.
    struct Canned {
        status: u16,
        body: &'static str,
        requests: AtomicUsize,
    }

    impl Canned {
        fn new(status: u16, body: &'static str) -> Self {
            Self {
                status,
                body,
                requests: AtomicUsize::new(0),
            }
        }

        fn requests(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpClient for Canned {
        async fn execute(&self, _req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let resp = http::Response::builder()
                .status(self.status)
                .body(self.body)
                .unwrap();
            Ok(resp.into())
        }
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.org/data.csv"));
        assert!(is_url("http://localhost/data.csv"));
        assert!(!is_url("data/httpdump.csv"));
    }

    #[tokio::test]
    async fn test_load_local_file() {
        let path = format!("{}/aq_explorer_fetch_test.csv", std::env::temp_dir().display());
        std::fs::write(&path, "PM2.5\n12\n").unwrap();

        let client = Canned::new(200, "unused");
        let bytes = load_source(&client, &path).await.unwrap();

        assert_eq!(bytes, b"PM2.5\n12\n");
        assert_eq!(client.requests(), 0);
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let client = Canned::new(200, "unused");
        assert!(load_source(&client, "/nonexistent/air.csv").await.is_err());
    }

    #[tokio::test]
    async fn test_load_url_returns_body() {
        let client = Canned::new(200, "PM2.5,station\n12,Dongsi\n");
        let bytes = load_source(&client, "https://example.org/air.csv").await.unwrap();

        assert_eq!(bytes, b"PM2.5,station\n12,Dongsi\n");
        assert_eq!(client.requests(), 1);
    }

    #[tokio::test]
    async fn test_load_url_rejects_error_status() {
        let client = Canned::new(404, "not found");
        let err = load_source(&client, "https://example.org/missing.csv").await.unwrap_err();

        assert!(format!("{err:#}").contains("missing.csv"));
        assert_eq!(client.requests(), 1);
    }

    #[tokio::test]
    async fn test_fetch_rejects_invalid_url() {
        let client = Canned::new(200, "unused");
        assert!(fetch_bytes(&client, "https://exa mple.org/").await.is_err());
        assert_eq!(client.requests(), 0);
    }
}
