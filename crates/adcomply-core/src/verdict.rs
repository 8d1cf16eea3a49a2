//! Violations, moderation scores and compliance verdicts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which evaluator produced a violation.
///
/// The declaration order is the merge order of a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationSource {
    Policy,
    Moderation,
    Regulatory,
}

impl ViolationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Policy => "policy",
            Self::Moderation => "moderation",
            Self::Regulatory => "regulatory",
        }
    }
}

impl fmt::Display for ViolationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single detected non-compliance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Evaluator that produced it
    pub source: ViolationSource,

    /// Rule, moderation category or regulation id
    pub rule_id: String,

    /// Severity contribution before source weighting
    pub severity: f64,

    /// Human-readable reason
    pub reason: String,

    /// Rule category or moderation category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Matched content snippet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Violation {
    pub fn new(
        source: ViolationSource,
        rule_id: impl Into<String>,
        severity: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source,
            rule_id: rule_id.into(),
            severity,
            reason: reason.into(),
            category: None,
            context: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Merge violation sequences by source, then rule id.
///
/// The sort is stable, so violations of the same rule keep the order their
/// evaluator emitted them in.
pub fn merge_violations(parts: impl IntoIterator<Item = Vec<Violation>>) -> Vec<Violation> {
    let mut merged: Vec<Violation> = parts.into_iter().flatten().collect();
    merged.sort_by(|a, b| a.source.cmp(&b.source).then_with(|| a.rule_id.cmp(&b.rule_id)));
    merged
}

/// Moderation categories, one adapter each
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationCategory {
    Toxicity,
    Sentiment,
    Nsfw,
    ObjectDetection,
}

impl ModerationCategory {
    pub const ALL: [ModerationCategory; 4] = [
        Self::Toxicity,
        Self::Sentiment,
        Self::Nsfw,
        Self::ObjectDetection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Toxicity => "toxicity",
            Self::Sentiment => "sentiment",
            Self::Nsfw => "nsfw",
            Self::ObjectDetection => "object_detection",
        }
    }

    /// Parse a configuration key
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "toxicity" => Some(Self::Toxicity),
            "sentiment" => Some(Self::Sentiment),
            "nsfw" => Some(Self::Nsfw),
            "object_detection" | "object-detection" | "objects" => Some(Self::ObjectDetection),
            _ => None,
        }
    }
}

impl fmt::Display for ModerationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model's confidence for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationScore {
    pub category: ModerationCategory,

    /// Confidence in [0, 1]
    pub confidence: f32,

    pub model_version: String,
}

impl ModerationScore {
    /// Create a score, clamping the confidence into [0, 1]
    pub fn new(category: ModerationCategory, confidence: f32, model_version: impl Into<String>) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            category,
            confidence,
            model_version: model_version.into(),
        }
    }

    /// Whether the score crosses `threshold` (inclusive)
    pub fn is_actionable(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }
}

/// Complete evaluation result for one artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceVerdict {
    pub artifact_id: String,

    /// Content hash the verdict was computed for
    pub content_hash: String,

    /// Merged violations (policy, moderation, regulatory; then rule id)
    pub violations: Vec<Violation>,

    /// Overall outcome
    pub passed: bool,

    /// Some dimension could not be evaluated and a human should look
    pub needs_manual_review: bool,

    /// Moderation categories whose adapter failed
    #[serde(default)]
    pub unscored_categories: Vec<ModerationCategory>,

    /// Components that failed with an infrastructure error
    #[serde(default)]
    pub degraded_components: Vec<String>,

    pub evaluated_at: DateTime<Utc>,

    /// Rule set version used
    pub ruleset_version: u64,

    /// Regulation snapshot version used
    pub regulation_version: u64,

    /// Regulations were served from a stale snapshot
    #[serde(default)]
    pub regulations_stale: bool,
}

impl ComplianceVerdict {
    /// Distinct violated rule ids in merge order
    pub fn violated_rule_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for violation in &self.violations {
            if !ids.contains(&violation.rule_id.as_str()) {
                ids.push(violation.rule_id.as_str());
            }
        }
        ids
    }

    /// Violations of a single rule
    pub fn violations_for<'a>(&'a self, rule_id: &'a str) -> impl Iterator<Item = &'a Violation> + 'a {
        self.violations.iter().filter(move |v| v.rule_id == rule_id)
    }

    /// One-line summary used in notifications
    pub fn summary(&self) -> String {
        if self.violations.is_empty() {
            let review = if self.needs_manual_review {
                " (manual review required)"
            } else {
                ""
            };
            return format!("artifact {} passed{}", self.artifact_id, review);
        }
        let mut counts = [0usize; 3];
        for violation in &self.violations {
            counts[violation.source as usize] += 1;
        }
        format!(
            "artifact {} failed: {} policy, {} moderation, {} regulatory violation(s){}",
            self.artifact_id,
            counts[0],
            counts[1],
            counts[2],
            if self.needs_manual_review {
                "; manual review required"
            } else {
                ""
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(source: ViolationSource, rule: &str, reason: &str) -> Violation {
        Violation::new(source, rule, 1.0, reason)
    }

    #[test]
    fn test_merge_orders_by_source_then_rule() {
        let regulatory = vec![v(ViolationSource::Regulatory, "gdpr", "a")];
        let moderation = vec![v(ViolationSource::Moderation, "moderation.toxicity", "b")];
        let policy = vec![
            v(ViolationSource::Policy, "rule2", "c"),
            v(ViolationSource::Policy, "rule1", "d"),
            v(ViolationSource::Policy, "rule1", "e"),
        ];

        let merged = merge_violations([regulatory, moderation, policy]);
        let order: Vec<(&str, &str)> = merged
            .iter()
            .map(|v| (v.rule_id.as_str(), v.reason.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("rule1", "d"),
                ("rule1", "e"),
                ("rule2", "c"),
                ("moderation.toxicity", "b"),
                ("gdpr", "a"),
            ]
        );
    }

    #[test]
    fn test_score_clamped_and_threshold_inclusive() {
        let score = ModerationScore::new(ModerationCategory::Toxicity, 1.7, "lexicon-v1");
        assert_eq!(score.confidence, 1.0);

        let score = ModerationScore::new(ModerationCategory::Toxicity, 0.7, "lexicon-v1");
        assert!(score.is_actionable(0.7));
        assert!(!score.is_actionable(0.71));
    }

    #[test]
    fn test_category_parse() {
        assert_eq!(
            ModerationCategory::parse("object-detection"),
            Some(ModerationCategory::ObjectDetection)
        );
        assert_eq!(ModerationCategory::parse("NSFW"), Some(ModerationCategory::Nsfw));
        assert_eq!(ModerationCategory::parse("violence"), None);
    }
}
