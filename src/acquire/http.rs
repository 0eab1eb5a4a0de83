//! HTTP plumbing shared by the acquisition clients.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response>;
}

pub struct BasicClient(reqwest::Client);

impl BasicClient {
    pub fn new() -> Self {
        Self(reqwest::Client::new())
    }
}

impl Default for BasicClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.0.execute(req).await
    }
}

/// An [`HttpClient`] wrapper that appends an API key as a URL query
/// parameter, the scheme the census API uses (`...&key=<value>`).
pub struct UrlParam<C> {
    pub inner: C,
    pub param_name: String,
    pub key: String,
}

#[async_trait]
impl<C: HttpClient> HttpClient for UrlParam<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.url_mut()
            .query_pairs_mut()
            .append_pair(&self.param_name, &self.key);
        self.inner.execute(req).await
    }
}

/// GETs `url`, returning the body bytes. Non-success statuses are errors
/// carrying the status and response body.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(anyhow!("request failed with status {status}: {body}"));
    }
    Ok(resp.bytes().await?.to_vec())
}

/// GETs `url` and parses the body as JSON.
pub async fn fetch_json<C: HttpClient>(client: &C, url: &str) -> Result<Value> {
    let bytes = fetch_bytes(client, url).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
