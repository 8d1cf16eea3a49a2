//! Verdict severity scoring

use adcomply_core::{ComplianceVerdict, Violation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::{AlertThresholds, ReporterConfig};

/// Alert tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityTier {
    Low,
    Medium,
    High,
}

impl SeverityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weighted, normalised verdict severity
#[derive(Debug, Clone)]
pub struct SeverityScorer {
    weights: BTreeMap<String, f64>,
    baseline_volume: f64,
    thresholds: AlertThresholds,
}

impl SeverityScorer {
    pub fn new(config: &ReporterConfig) -> Self {
        Self {
            weights: config.severity_weights.clone(),
            baseline_volume: config.baseline_volume,
            thresholds: config.alert_thresholds,
        }
    }

    /// Weight for a violation: `source.category`, then `source`, then 1.0
    pub fn weight(&self, violation: &Violation) -> f64 {
        let source = violation.source.as_str();
        violation
            .category
            .as_ref()
            .and_then(|category| self.weights.get(&format!("{source}.{category}")))
            .or_else(|| self.weights.get(source))
            .copied()
            .unwrap_or(1.0)
    }

    /// Σ(weight × severity) / baseline_volume
    pub fn score(&self, verdict: &ComplianceVerdict) -> f64 {
        let total: f64 = verdict
            .violations
            .iter()
            .map(|violation| self.weight(violation) * violation.severity)
            .sum();
        total / self.baseline_volume
    }

    /// Alert tier for a score; `None` below the medium threshold
    pub fn tier(&self, score: f64) -> Option<SeverityTier> {
        if score >= self.thresholds.high {
            Some(SeverityTier::High)
        } else if score >= self.thresholds.medium {
            Some(SeverityTier::Medium)
        } else {
            None
        }
    }
}
