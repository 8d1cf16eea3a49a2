//! Regulation sources: local file and HTTP feed

use adcomply_core::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::regulation::Regulation;

/// A fetched set of regulations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegulationFeed {
    /// Feed-level version or timestamp, when the source provides one
    pub version: Option<String>,
    pub regulations: Vec<Regulation>,
}

/// Accepted wire shapes: a bare array, or `{"version": .., "regulations": [..]}`
#[derive(Deserialize)]
#[serde(untagged)]
enum FeedDocument {
    Versioned {
        #[serde(default)]
        version: Option<serde_json::Value>,
        regulations: Vec<serde_json::Value>,
    },
    Bare(Vec<serde_json::Value>),
}

impl RegulationFeed {
    /// Parse a feed document.
    ///
    /// Entries that do not deserialize are skipped with a warning; a document
    /// that is not one of the accepted shapes is an error.
    pub fn parse(raw: &str) -> Result<Self> {
        let document: FeedDocument = serde_json::from_str(raw)
            .map_err(|e| Error::regulatory_fetch(format!("invalid regulation feed: {e}")))?;

        let (version, entries) = match document {
            FeedDocument::Versioned { version, regulations } => {
                let version = version.map(|v| match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                });
                (version, regulations)
            }
            FeedDocument::Bare(entries) => (None, entries),
        };

        let mut regulations = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<Regulation>(entry) {
                Ok(mut regulation) => {
                    if regulation.source_version.is_none() {
                        regulation.source_version = version.clone();
                    }
                    regulations.push(regulation);
                }
                Err(e) => tracing::warn!(error = %e, "Skipping malformed regulation entry"),
            }
        }
        Ok(Self { version, regulations })
    }
}

/// Where regulations come from
#[async_trait]
pub trait RegulationSource: Send + Sync {
    async fn fetch(&self) -> Result<RegulationFeed>;

    /// Human-readable location for logs
    fn describe(&self) -> String;
}

/// JSON file on local disk
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RegulationSource for FileSource {
    async fn fetch(&self) -> Result<RegulationFeed> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::regulatory_fetch(format!("failed to read {}: {e}", self.path.display()))
        })?;
        RegulationFeed::parse(&raw)
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// HTTP feed authenticated with a bearer token
pub struct HttpSource {
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build regulatory client: {e}")))?;
        Ok(Self {
            url: url.into(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl RegulationSource for HttpSource {
    async fn fetch(&self) -> Result<RegulationFeed> {
        let mut request = self.client.get(&self.url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::regulatory_fetch(format!("request to {} failed: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::regulatory_fetch(format!("{} returned {status}", self.url)));
        }
        let body = response
            .text()
            .await
            .map_err(|e| Error::regulatory_fetch(format!("failed to read body from {}: {e}", self.url)))?;
        RegulationFeed::parse(&body)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
