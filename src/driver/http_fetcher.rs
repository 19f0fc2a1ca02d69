use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder};
use tracing::{debug, warn};

use super::traits::{FetchResponse, Fetcher};

/// `Fetcher` backed by a shared reqwest client.
pub struct HttpFetcher {
    client: Client,
    headers: Arc<RwLock<HashMap<String, String>>>,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, headers: HashMap<String, String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| anyhow!("building http client: {}", e))?;
        Ok(Self {
            client,
            headers: Arc::new(RwLock::new(headers)),
        })
    }

    /// Replace the extra request headers (e.g. refreshed cookies).
    pub fn update_headers(&self, new_headers: HashMap<String, String>) {
        *self.headers.write() = new_headers;
    }

    fn build_request(&self, url: &str) -> RequestBuilder {
        let headers = self.headers.read().clone();
        let mut req = self.client.get(url);
        for (k, v) in &headers {
            req = req.header(k.as_str(), v.as_str());
        }
        req
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str) -> Result<FetchResponse> {
        let resp = self.build_request(url).send().await?;

        let status = resp.status().as_u16();
        if resp.status().is_success() {
            debug!("http get status={} url={}", status, url);
        } else {
            warn!("http get failed status={} url={}", status, url);
        }

        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| anyhow!("reading response body: {}", e)))
            .boxed();

        Ok(FetchResponse { status, body })
    }
}
