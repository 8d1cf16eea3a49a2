//! `content_moderator` configuration

use adcomply_core::{Error, ModerationCategory, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What an unscored category does to the verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnscoredPolicy {
    /// Flag for manual review only
    #[default]
    Flag,
    /// Flag for manual review and fail the verdict
    Block,
}

/// Content moderator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeratorConfig {
    /// Model reference per category: `builtin`, `builtin:<name>`, an
    /// `http(s)://` inference URL, or `none`
    #[serde(default = "default_models")]
    pub models: BTreeMap<String, String>,

    /// Cutoff used when a category has no override
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Per-category cutoffs
    #[serde(default)]
    pub thresholds: BTreeMap<String, f32>,

    /// Max artifacts per adapter call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,

    #[serde(default)]
    pub unscored_policy: UnscoredPolicy,

    /// Object labels flagged by the built-in object detector
    #[serde(default)]
    pub forbidden_objects: Vec<String>,

    /// Remote inference timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_models() -> BTreeMap<String, String> {
    ModerationCategory::ALL
        .iter()
        .map(|c| (c.as_str().to_string(), "builtin".to_string()))
        .collect()
}

fn default_confidence_threshold() -> f32 {
    0.7
}

fn default_batch_size() -> usize {
    16
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_request_timeout_ms() -> u64 {
    5000
}

impl Default for ModeratorConfig {
    fn default() -> Self {
        Self {
            models: default_models(),
            confidence_threshold: default_confidence_threshold(),
            thresholds: BTreeMap::new(),
            batch_size: default_batch_size(),
            cache_enabled: true,
            cache_ttl: default_cache_ttl(),
            unscored_policy: UnscoredPolicy::Flag,
            forbidden_objects: Vec::new(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ModeratorConfig {
    /// Threshold for a category, falling back to `confidence_threshold`
    pub fn threshold_for(&self, category: ModerationCategory) -> f32 {
        lookup(&self.thresholds, category)
            .copied()
            .unwrap_or(self.confidence_threshold)
    }

    /// Model reference for a category; unlisted categories use `builtin`
    pub fn model_for(&self, category: ModerationCategory) -> &str {
        lookup(&self.models, category).map(String::as_str).unwrap_or("builtin")
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("content_moderator.batch_size must be at least 1"));
        }
        let in_range = |t: f32| (0.0..=1.0).contains(&t);
        if !in_range(self.confidence_threshold) {
            return Err(Error::config(format!(
                "content_moderator.confidence_threshold {} outside [0, 1]",
                self.confidence_threshold
            )));
        }
        check_keys("thresholds", self.thresholds.keys())?;
        check_keys("models", self.models.keys())?;
        for (name, threshold) in &self.thresholds {
            if !in_range(*threshold) {
                return Err(Error::config(format!(
                    "content_moderator.thresholds.{name} {threshold} outside [0, 1]"
                )));
            }
        }
        for reference in self.models.values() {
            ModelRef::parse(reference)?;
        }
        Ok(())
    }
}

/// Category keys accept aliases (`object-detection`), so lookups go through
/// `ModerationCategory::parse` rather than the canonical name.
fn lookup<T>(map: &BTreeMap<String, T>, category: ModerationCategory) -> Option<&T> {
    map.iter()
        .find(|(name, _)| ModerationCategory::parse(name) == Some(category))
        .map(|(_, value)| value)
}

/// Every key names a category, and no category is named twice
fn check_keys<'a>(section: &str, keys: impl Iterator<Item = &'a String>) -> Result<()> {
    let mut seen = BTreeMap::new();
    for name in keys {
        let category = ModerationCategory::parse(name)
            .ok_or_else(|| Error::config(format!("unknown moderation category {name}")))?;
        if let Some(previous) = seen.insert(category, name) {
            return Err(Error::config(format!(
                "content_moderator.{section}: {previous} and {name} both configure {category}"
            )));
        }
    }
    Ok(())
}

/// Parsed `models.{category}` value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelRef {
    /// In-process lexicon adapter, optionally naming the variant
    Builtin(Option<String>),
    /// HTTP inference endpoint
    Remote(String),
    /// Category switched off
    Disabled,
}

impl ModelRef {
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.eq_ignore_ascii_case("none") || reference.is_empty() {
            return Ok(Self::Disabled);
        }
        if reference.eq_ignore_ascii_case("builtin") {
            return Ok(Self::Builtin(None));
        }
        if let Some(name) = reference.strip_prefix("builtin:") {
            return Ok(Self::Builtin(Some(name.to_string())));
        }
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return Ok(Self::Remote(reference.to_string()));
        }
        Err(Error::config(format!("unsupported model reference {reference:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_ref_parse() {
        assert_eq!(ModelRef::parse("builtin").unwrap(), ModelRef::Builtin(None));
        assert_eq!(
            ModelRef::parse("builtin:toxicity").unwrap(),
            ModelRef::Builtin(Some("toxicity".to_string()))
        );
        assert_eq!(ModelRef::parse("NONE").unwrap(), ModelRef::Disabled);
        assert!(matches!(ModelRef::parse("https://models.internal/tox").unwrap(), ModelRef::Remote(_)));
        assert!(ModelRef::parse("s3://bucket/model.bin").is_err());
    }

    #[test]
    fn test_threshold_fallback() {
        let mut config = ModeratorConfig::default();
        config.thresholds.insert("nsfw".to_string(), 0.5);
        assert_eq!(config.threshold_for(ModerationCategory::Nsfw), 0.5);
        assert_eq!(config.threshold_for(ModerationCategory::Toxicity), 0.7);
    }

    #[test]
    fn test_validate() {
        assert!(ModeratorConfig::default().validate().is_ok());

        let mut config = ModeratorConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = ModeratorConfig::default();
        config.thresholds.insert("violence".to_string(), 0.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_category_aliases_resolve() {
        let mut config = ModeratorConfig::default();
        config.thresholds.insert("object-detection".to_string(), 0.1);
        config.models.remove("object_detection");
        config.models.insert("objects".to_string(), "none".to_string());
        assert!(config.validate().is_ok());
        assert_eq!(config.threshold_for(ModerationCategory::ObjectDetection), 0.1);
        assert_eq!(config.model_for(ModerationCategory::ObjectDetection), "none");

        // Alias and canonical name for the same category
        config.thresholds.insert("object_detection".to_string(), 0.9);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ModeratorConfig = serde_json::from_str(
            r#"{"confidence_threshold": 0.8, "unscored_policy": "block", "models": {"toxicity": "none"}}"#,
        )
        .unwrap();
        assert_eq!(config.unscored_policy, UnscoredPolicy::Block);
        assert_eq!(config.models.len(), 1);
        assert_eq!(config.batch_size, 16);
    }
}
