//! Built-in NSFW adapter
//!
//! Scores the ad copy and, when present, the image labels.

use crate::adapter::ModerationAdapter;
use crate::lexicon::Lexicon;
use adcomply_core::{CampaignArtifact, ModerationCategory, Result};
use async_trait::async_trait;

const NSFW_TERMS: &[&str] = &[
    "nude", "nudity", "naked", "porn", "explicit", "xxx", "sex", "sexy", "erotic", "lingerie",
    "topless", "fetish", "escort", "adult content",
];

pub struct NsfwAdapter {
    lexicon: Lexicon,
}

impl NsfwAdapter {
    pub const MODEL_VERSION: &'static str = "nsfw-lexicon-v1";

    pub fn new() -> Result<Self> {
        Ok(Self {
            lexicon: Lexicon::new(ModerationCategory::Nsfw, NSFW_TERMS)?,
        })
    }
}

#[async_trait]
impl ModerationAdapter for NsfwAdapter {
    async fn score(&self, artifact: &CampaignArtifact) -> Result<f32> {
        let mut hits = self.lexicon.distinct_hits(&artifact.text);
        if let Some(image) = &artifact.image {
            hits += self.lexicon.distinct_hits(&image.labels.join(" . "));
        }
        Ok((hits as f32 * 0.4).clamp(0.0, 0.95))
    }

    fn category(&self) -> ModerationCategory {
        ModerationCategory::Nsfw
    }

    fn model_version(&self) -> &str {
        Self::MODEL_VERSION
    }
}
