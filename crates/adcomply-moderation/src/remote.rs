//! Remote inference adapter
//!
//! Posts artifacts to a model server as JSON:
//!
//! ```json
//! {"category": "toxicity", "inputs": [{"text": "...", "image_uri": "..."}]}
//! ```
//!
//! and expects `{"scores": [0.12, ...]}` back, one score per input.

use crate::adapter::ModerationAdapter;
use adcomply_core::{CampaignArtifact, Error, ModerationCategory, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    category: &'a str,
    inputs: Vec<InferenceInput<'a>>,
}

#[derive(Debug, Serialize)]
struct InferenceInput<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_uri: Option<&'a str>,
    #[serde(skip_serializing_if = "no_labels")]
    image_labels: &'a [String],
}

fn no_labels(labels: &&[String]) -> bool {
    labels.is_empty()
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    scores: Vec<f32>,
    #[serde(default)]
    model_version: Option<String>,
}

/// Adapter backed by an HTTP inference endpoint
pub struct RemoteModelAdapter {
    category: ModerationCategory,
    endpoint: String,
    model_version: String,
    requires_image: bool,
    client: reqwest::Client,
}

impl RemoteModelAdapter {
    pub fn new(category: ModerationCategory, endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::model_unavailable(category.as_str(), format!("failed to build client: {e}")))?;
        Ok(Self {
            category,
            model_version: format!("remote:{}", endpoint),
            endpoint,
            requires_image: category == ModerationCategory::ObjectDetection,
            client,
        })
    }

    /// Override the model version used in cache keys
    pub fn with_model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = version.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn unavailable(&self, reason: impl Into<String>) -> Error {
        Error::model_unavailable(self.category.as_str(), reason)
    }

    async fn infer(&self, artifacts: &[&CampaignArtifact]) -> Result<Vec<f32>> {
        let request = InferenceRequest {
            category: self.category.as_str(),
            inputs: artifacts
                .iter()
                .map(|a| InferenceInput {
                    text: &a.text,
                    image_uri: a.image.as_ref().map(|i| i.uri.as_str()),
                    image_labels: a.image.as_ref().map_or(&[][..], |i| i.labels.as_slice()),
                })
                .collect(),
        };

        let started = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.unavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.unavailable(format!("model server returned {status}")));
        }

        let body: InferenceResponse = response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("invalid response body: {e}")))?;

        if body.scores.len() != artifacts.len() {
            return Err(self.unavailable(format!(
                "expected {} scores, got {}",
                artifacts.len(),
                body.scores.len()
            )));
        }
        if body.scores.iter().any(|s| !s.is_finite()) {
            return Err(self.unavailable("non-finite score"));
        }

        debug!(
            category = %self.category,
            endpoint = %self.endpoint,
            remote_version = body.model_version.as_deref().unwrap_or("unknown"),
            batch = artifacts.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Remote inference complete"
        );
        Ok(body.scores.into_iter().map(|s| s.clamp(0.0, 1.0)).collect())
    }
}

#[async_trait]
impl ModerationAdapter for RemoteModelAdapter {
    async fn score(&self, artifact: &CampaignArtifact) -> Result<f32> {
        let scores = self.infer(&[artifact]).await?;
        scores
            .into_iter()
            .next()
            .ok_or_else(|| self.unavailable("empty score list"))
    }

    async fn score_batch(&self, artifacts: &[&CampaignArtifact]) -> Result<Vec<f32>> {
        if artifacts.is_empty() {
            return Ok(Vec::new());
        }
        self.infer(artifacts).await
    }

    fn category(&self) -> ModerationCategory {
        self.category
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }

    fn requires_image(&self) -> bool {
        self.requires_image
    }
}
