//! Built-in toxicity adapter
//!
//! Lexicon scoring used when no remote model is configured.

use crate::adapter::ModerationAdapter;
use crate::lexicon::Lexicon;
use adcomply_core::{CampaignArtifact, ModerationCategory, Result};
use async_trait::async_trait;

const TOXIC_TERMS: &[&str] = &[
    "hate", "stupid", "idiot", "dumb", "kill", "die", "loser", "moron", "trash", "garbage",
    "shit", "fuck", "damn", "asshole", "bastard", "bitch", "scum", "pathetic", "worthless",
];

pub struct ToxicityAdapter {
    lexicon: Lexicon,
}

impl ToxicityAdapter {
    pub const MODEL_VERSION: &'static str = "toxicity-lexicon-v1";

    pub fn new() -> Result<Self> {
        Ok(Self {
            lexicon: Lexicon::new(ModerationCategory::Toxicity, TOXIC_TERMS)?,
        })
    }

    fn score_text(&self, text: &str) -> f32 {
        let hits = self.lexicon.distinct_hits(text) as f32;
        // Lexicon-only evidence never reaches full confidence
        (hits * 0.35).clamp(0.0, 0.95)
    }
}

#[async_trait]
impl ModerationAdapter for ToxicityAdapter {
    async fn score(&self, artifact: &CampaignArtifact) -> Result<f32> {
        Ok(self.score_text(&artifact.text))
    }

    fn category(&self) -> ModerationCategory {
        ModerationCategory::Toxicity
    }

    fn model_version(&self) -> &str {
        Self::MODEL_VERSION
    }
}
