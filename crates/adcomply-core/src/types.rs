//! Core types for AdComply

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::{Error, Result};

/// Platform scope that matches every platform
pub const ALL_PLATFORMS: &str = "all";

/// A proposed piece of ad content submitted for compliance evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignArtifact {
    /// Artifact identifier (not part of the content hash)
    pub id: String,

    /// Target platform (facebook, google, tiktok, ...)
    pub platform: String,

    /// Ad copy
    #[serde(default)]
    pub text: String,

    /// Creative image, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,

    /// Campaign budget, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<Budget>,

    /// Target region code (EU, US-CA, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Industry sector of the advertiser
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,

    /// Free-form attributes checked by regulatory requirements
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// Reference to a creative image with the properties rules look at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Where the image lives
    pub uri: String,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Encoded size in kilobytes
    pub size_kb: u64,

    /// Encoding format (jpg, png, gif, ...)
    pub format: String,

    /// Labels supplied upstream (alt text, asset tags, detector output)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

impl ImageRef {
    /// Format normalised for comparison (`jpeg` is `jpg`)
    pub fn normalized_format(&self) -> String {
        normalize_format(&self.format)
    }
}

/// Normalise an image format name for comparison
pub fn normalize_format(format: &str) -> String {
    let lower = format.trim().trim_start_matches('.').to_lowercase();
    if lower == "jpeg" {
        "jpg".to_string()
    } else {
        lower
    }
}

/// Campaign budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    /// Amount in major currency units
    pub amount: f64,

    /// ISO currency code
    pub currency: String,
}

impl CampaignArtifact {
    /// Create a text-only artifact
    pub fn new(id: impl Into<String>, platform: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            platform: platform.into(),
            text: text.into(),
            image: None,
            budget: None,
            region: None,
            industry: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach an image
    pub fn with_image(mut self, image: ImageRef) -> Self {
        self.image = Some(image);
        self
    }

    /// Attach a budget
    pub fn with_budget(mut self, amount: f64, currency: impl Into<String>) -> Self {
        self.budget = Some(Budget {
            amount,
            currency: currency.into(),
        });
        self
    }

    /// Set the target region
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set the industry
    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    /// Add a metadata attribute
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Structural validation performed before any evaluation
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::validation("artifact id is empty"));
        }
        if self.platform.trim().is_empty() {
            return Err(Error::validation(format!(
                "artifact {} has no platform",
                self.id
            )));
        }
        if let Some(image) = &self.image {
            if image.uri.trim().is_empty() {
                return Err(Error::validation(format!(
                    "artifact {} has an image without a uri",
                    self.id
                )));
            }
            if image.format.trim().is_empty() {
                return Err(Error::validation(format!(
                    "artifact {} has an image without a format",
                    self.id
                )));
            }
        }
        if let Some(budget) = &self.budget {
            if !budget.amount.is_finite() {
                return Err(Error::validation(format!(
                    "artifact {} has a non-finite budget",
                    self.id
                )));
            }
        }
        Ok(())
    }

    /// Whether a rule scoped to `scope` applies to this artifact
    pub fn matches_platform(&self, scope: &str) -> bool {
        scope.eq_ignore_ascii_case(ALL_PLATFORMS) || scope.eq_ignore_ascii_case(&self.platform)
    }

    /// Stable SHA-256 over every field that affects evaluation.
    ///
    /// The id is excluded so identical content submitted under different ids
    /// shares cache entries.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hash_field(&mut hasher, "platform", self.platform.to_lowercase().as_bytes());
        hash_field(&mut hasher, "text", self.text.as_bytes());
        if let Some(image) = &self.image {
            hash_image(&mut hasher, image);
        }
        if let Some(budget) = &self.budget {
            hash_field(&mut hasher, "budget.amount", &budget.amount.to_bits().to_le_bytes());
            hash_field(&mut hasher, "budget.currency", budget.currency.to_uppercase().as_bytes());
        }
        if let Some(region) = &self.region {
            hash_field(&mut hasher, "region", region.to_uppercase().as_bytes());
        }
        if let Some(industry) = &self.industry {
            hash_field(&mut hasher, "industry", industry.to_lowercase().as_bytes());
        }
        // BTreeMap iteration order is stable
        for (key, value) in &self.metadata {
            hash_field(&mut hasher, key, value.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Hash over the fields moderation models see (text and image only)
    pub fn moderation_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hash_field(&mut hasher, "text", self.text.as_bytes());
        if let Some(image) = &self.image {
            hash_image(&mut hasher, image);
        }
        format!("{:x}", hasher.finalize())
    }

    /// Resolve a named attribute for regulatory requirements.
    ///
    /// Built-in names are checked first, then `metadata` keys.
    pub fn field_value(&self, field: &str) -> Option<String> {
        match field {
            "id" => Some(self.id.clone()),
            "text" => Some(self.text.clone()),
            "platform" => Some(self.platform.clone()),
            "region" => self.region.clone(),
            "industry" => self.industry.clone(),
            "budget" => self.budget.as_ref().map(|b| b.amount.to_string()),
            "currency" => self.budget.as_ref().map(|b| b.currency.clone()),
            "image" | "image_uri" => self.image.as_ref().map(|i| i.uri.clone()),
            "image_format" => self.image.as_ref().map(|i| i.normalized_format()),
            other => self.metadata.get(other).cloned(),
        }
    }
}

fn hash_field(hasher: &mut Sha256, name: &str, value: &[u8]) {
    // Length-prefix both parts so adjacent fields cannot collide
    hasher.update((name.len() as u64).to_le_bytes());
    hasher.update(name.as_bytes());
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value);
}

fn hash_image(hasher: &mut Sha256, image: &ImageRef) {
    hash_field(hasher, "image.uri", image.uri.as_bytes());
    hash_field(hasher, "image.width", &image.width.to_le_bytes());
    hash_field(hasher, "image.height", &image.height.to_le_bytes());
    hash_field(hasher, "image.size_kb", &image.size_kb.to_le_bytes());
    hash_field(hasher, "image.format", image.normalized_format().as_bytes());
    for label in &image.labels {
        hash_field(hasher, "image.label", label.to_lowercase().as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> ImageRef {
        ImageRef {
            uri: "s3://creatives/banner.png".to_string(),
            width: 300,
            height: 300,
            size_kb: 120,
            format: "PNG".to_string(),
            labels: Vec::new(),
        }
    }

    #[test]
    fn test_content_hash_ignores_id() {
        let a = CampaignArtifact::new("a-1", "facebook", "Summer sale").with_budget(50.0, "USD");
        let b = CampaignArtifact::new("b-2", "facebook", "Summer sale").with_budget(50.0, "USD");
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_content_hash_tracks_evaluated_fields() {
        let base = CampaignArtifact::new("a-1", "facebook", "Summer sale");
        let other_text = CampaignArtifact::new("a-1", "facebook", "Winter sale");
        let with_image = base.clone().with_image(image());
        let with_region = base.clone().with_region("EU");

        assert_ne!(base.content_hash(), other_text.content_hash());
        assert_ne!(base.content_hash(), with_image.content_hash());
        assert_ne!(base.content_hash(), with_region.content_hash());
    }

    #[test]
    fn test_moderation_hash_ignores_targeting() {
        let a = CampaignArtifact::new("a-1", "facebook", "Summer sale").with_region("EU");
        let b = CampaignArtifact::new("a-2", "tiktok", "Summer sale").with_budget(10.0, "EUR");
        assert_eq!(a.moderation_hash(), b.moderation_hash());
    }

    #[test]
    fn test_validate() {
        assert!(CampaignArtifact::new("", "facebook", "x").validate().is_err());
        assert!(CampaignArtifact::new("a", " ", "x").validate().is_err());

        let mut broken = image();
        broken.uri.clear();
        let artifact = CampaignArtifact::new("a", "facebook", "x").with_image(broken);
        assert!(artifact.validate().is_err());

        let ok = CampaignArtifact::new("a", "facebook", "x").with_image(image());
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_platform_scope() {
        let artifact = CampaignArtifact::new("a", "Facebook", "x");
        assert!(artifact.matches_platform("all"));
        assert!(artifact.matches_platform("facebook"));
        assert!(!artifact.matches_platform("tiktok"));
    }

    #[test]
    fn test_field_value() {
        let artifact = CampaignArtifact::new("a", "facebook", "Buy now")
            .with_budget(120.0, "USD")
            .with_image(image())
            .with_metadata("consent", "true");

        assert_eq!(artifact.field_value("currency").as_deref(), Some("USD"));
        assert_eq!(artifact.field_value("budget").as_deref(), Some("120"));
        assert_eq!(artifact.field_value("image_format").as_deref(), Some("png"));
        assert_eq!(artifact.field_value("consent").as_deref(), Some("true"));
        assert_eq!(artifact.field_value("region"), None);
    }

    #[test]
    fn test_normalize_format() {
        assert_eq!(normalize_format("JPEG"), "jpg");
        assert_eq!(normalize_format(".png"), "png");
    }
}
