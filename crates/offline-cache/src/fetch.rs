//! Network collaborator

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::error::Result;
use crate::types::{Request, Response};

/// Performs the real network request for an intercepted request.
///
/// Any HTTP status is a successful fetch; only transport failures are errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// reqwest-backed fetcher
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// `timeout` is the host-level ceiling on a single fetch
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let upstream = builder.send().await?;
        let status = upstream.status();

        let mut response = Response::new(status.as_u16(), Vec::new());
        response.status_text = status.canonical_reason().unwrap_or_default().to_string();
        for (name, value) in upstream.headers() {
            if let Ok(value) = value.to_str() {
                response.set_header(name.as_str(), value);
            }
        }
        response.body = upstream.bytes().await?.to_vec();

        debug!(
            url = %request.url,
            status = response.status,
            size = response.body.len(),
            "Fetched from network"
        );
        Ok(response)
    }
}
