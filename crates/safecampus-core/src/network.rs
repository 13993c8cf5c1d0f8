//! Network access for the strategies.
//!
//! `Network` is the seam the fetch strategies and the installer go through.
//! `HttpNetwork` is the real implementation backed by `reqwest`; tests use
//! the scripted fake in `crate::testing`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::{Result, WorkerError};
use crate::models::{Method, Request, Response};

#[async_trait]
pub trait Network: Send + Sync {
    /// Fetch `request`. Any HTTP status is a successful fetch; only transport
    /// failures (including timeouts) are errors.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Network provider for the host. Clone is cheap - reqwest::Client uses Arc internally.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WorkerError::network(e.to_string()))?;
        Ok(Self { client })
    }

    fn to_reqwest_method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Options => reqwest::Method::OPTIONS,
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let response = self
            .client
            .request(Self::to_reqwest_method(request.method), request.url.clone())
            .send()
            .await
            .map_err(|e| WorkerError::network(format!("{}: {}", request.url, e)))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| WorkerError::network(format!("{}: {}", request.url, e)))?
            .to_vec();

        debug!(url = %request.url, status = status, bytes = body.len(), "Network fetch complete");
        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
