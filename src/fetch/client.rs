use async_trait::async_trait;
use reqwest::{Method, Request, Response, Url};

/// Transport seam for dataset downloads; tests substitute their own.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;

    /// Issues a GET and rejects non-success status codes.
    async fn get(&self, url: Url) -> reqwest::Result<Response> {
        self.execute(Request::new(Method::GET, url))
            .await?
            .error_for_status()
    }
}
