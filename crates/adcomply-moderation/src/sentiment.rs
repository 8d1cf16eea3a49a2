//! Built-in sentiment adapter
//!
//! Reports negativity: the share of sentiment-bearing words that are negative.
//! Copy with no sentiment words scores 0.

use crate::adapter::ModerationAdapter;
use crate::lexicon::Lexicon;
use adcomply_core::{CampaignArtifact, ModerationCategory, Result};
use async_trait::async_trait;

const POSITIVE: &[&str] = &[
    "good", "great", "excellent", "love", "amazing", "wonderful", "happy", "fantastic",
    "awesome", "best", "enjoy", "delight",
];

const NEGATIVE: &[&str] = &[
    "bad", "terrible", "awful", "hate", "horrible", "worst", "sad", "angry", "disappointed",
    "poor", "ugly", "miserable", "fear",
];

pub struct SentimentAdapter {
    positive: Lexicon,
    negative: Lexicon,
}

impl SentimentAdapter {
    pub const MODEL_VERSION: &'static str = "sentiment-lexicon-v1";

    pub fn new() -> Result<Self> {
        Ok(Self {
            positive: Lexicon::new(ModerationCategory::Sentiment, POSITIVE)?,
            negative: Lexicon::new(ModerationCategory::Sentiment, NEGATIVE)?,
        })
    }
}

#[async_trait]
impl ModerationAdapter for SentimentAdapter {
    async fn score(&self, artifact: &CampaignArtifact) -> Result<f32> {
        let positive = self.positive.distinct_hits(&artifact.text) as f32;
        let negative = self.negative.distinct_hits(&artifact.text) as f32;
        let total = positive + negative;
        if total == 0.0 {
            return Ok(0.0);
        }
        Ok(negative / total)
    }

    fn category(&self) -> ModerationCategory {
        ModerationCategory::Sentiment
    }

    fn model_version(&self) -> &str {
        Self::MODEL_VERSION
    }
}
