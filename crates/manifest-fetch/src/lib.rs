//! Retrieval of hosted manifests over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    /// Largest manifest body accepted, in bytes.
    pub max_bytes: usize,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_bytes: 2 * 1024 * 1024,
            user_agent: concat!("manifest-refresh/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

/// Raw manifest as served by the app's origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedManifest {
    pub url: String,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid manifest URL `{url}`: {detail}")]
    InvalidUrl { url: String, detail: String },
    #[error("HTTP client setup failed: {0}")]
    Client(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server responded with status {0}")]
    Status(u16),
    #[error("manifest larger than {limit} bytes")]
    TooLarge { limit: usize },
}

#[async_trait]
pub trait ManifestFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedManifest, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpManifestFetcher {
    config: FetchConfig,
    client: Client,
}

impl HttpManifestFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { config, client })
    }
}

fn parse_url(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        detail: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(FetchError::InvalidUrl {
            url: url.to_string(),
            detail: format!("unsupported scheme `{other}`"),
        }),
    }
}

#[async_trait]
impl ManifestFetcher for HttpManifestFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedManifest, FetchError> {
        let target = parse_url(url)?;
        let limit = self.config.max_bytes;
        let mut response = self
            .client
            .get(target)
            .header(ACCEPT, "application/x-web-app-manifest+json, application/json;q=0.9, */*;q=0.1")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        if response
            .content_length()
            .is_some_and(|len| len > limit as u64)
        {
            return Err(FetchError::TooLarge { limit });
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(String::from);

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > limit {
                return Err(FetchError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }
        debug!(url, bytes = body.len(), "manifest fetched");

        Ok(FetchedManifest {
            url: url.to_string(),
            body,
            content_type,
        })
    }
}
