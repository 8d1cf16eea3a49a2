//! Built-in object detection adapter
//!
//! Works from detector labels supplied with the image. A label is either
//! `name` or `name:confidence`; the score is the highest confidence among
//! labels naming a forbidden object.

use crate::adapter::ModerationAdapter;
use adcomply_core::{CampaignArtifact, ModerationCategory, Result};
use async_trait::async_trait;

/// Objects flagged when no list is configured
pub const DEFAULT_FORBIDDEN_OBJECTS: &[&str] = &[
    "weapon", "gun", "knife", "drugs", "syringe", "cigarette", "alcohol", "blood",
];

pub struct ObjectDetectionAdapter {
    forbidden: Vec<String>,
}

impl ObjectDetectionAdapter {
    pub const MODEL_VERSION: &'static str = "object-labels-v1";

    pub fn new(forbidden: &[String]) -> Self {
        let forbidden = if forbidden.is_empty() {
            DEFAULT_FORBIDDEN_OBJECTS.iter().map(|s| s.to_string()).collect()
        } else {
            forbidden.iter().map(|s| s.trim().to_lowercase()).collect()
        };
        Self { forbidden }
    }

    fn label_confidence(&self, label: &str) -> Option<f32> {
        let (name, confidence) = match label.rsplit_once(':') {
            Some((name, raw)) => match raw.trim().parse::<f32>() {
                Ok(c) => (name, c),
                Err(_) => (label, 1.0),
            },
            None => (label, 1.0),
        };
        let name = name.trim().to_lowercase();
        self.forbidden.iter().any(|f| *f == name).then_some(confidence)
    }
}

impl Default for ObjectDetectionAdapter {
    fn default() -> Self {
        Self::new(&[])
    }
}

#[async_trait]
impl ModerationAdapter for ObjectDetectionAdapter {
    async fn score(&self, artifact: &CampaignArtifact) -> Result<f32> {
        let Some(image) = &artifact.image else {
            return Ok(0.0);
        };
        let score = image
            .labels
            .iter()
            .filter_map(|label| self.label_confidence(label))
            .fold(0.0_f32, f32::max);
        Ok(score.clamp(0.0, 1.0))
    }

    fn category(&self) -> ModerationCategory {
        ModerationCategory::ObjectDetection
    }

    fn model_version(&self) -> &str {
        Self::MODEL_VERSION
    }

    fn requires_image(&self) -> bool {
        true
    }
}
