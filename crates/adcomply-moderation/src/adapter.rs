//! Moderation adapter trait

use adcomply_core::{CampaignArtifact, ModerationCategory, Result};
use async_trait::async_trait;

/// A model that scores artifacts for one moderation category
#[async_trait]
pub trait ModerationAdapter: Send + Sync {
    /// Confidence in [0, 1] that the artifact belongs to the category
    async fn score(&self, artifact: &CampaignArtifact) -> Result<f32>;

    /// Score several artifacts in one call; results follow input order
    async fn score_batch(&self, artifacts: &[&CampaignArtifact]) -> Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            scores.push(self.score(artifact).await?);
        }
        Ok(scores)
    }

    /// Category this adapter serves
    fn category(&self) -> ModerationCategory;

    /// Model version, part of the cache key
    fn model_version(&self) -> &str;

    /// Artifacts without an image are not scored by this adapter
    fn requires_image(&self) -> bool {
        false
    }
}
