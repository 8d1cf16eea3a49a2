//! Alerts, delivery status and operational incidents

use adcomply_core::Violation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::Period;
use crate::severity::SeverityTier;

/// Per-recipient delivery state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Delivered {
        at: DateTime<Utc>,
        attempts: u32,
    },
    /// Permanent; never retried
    Failed {
        at: DateTime<Utc>,
        attempts: u32,
        error: String,
    },
}

impl DeliveryStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Delivery state of one recipient, in configured order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipientDelivery {
    pub recipient: String,
    #[serde(flatten)]
    pub status: DeliveryStatus,
}

impl RecipientDelivery {
    pub fn pending(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            status: DeliveryStatus::Pending,
        }
    }
}

/// One alert per violated rule of a verdict, deduplicated per report period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,

    /// `artifact id : rule id : period start`
    pub dedup_key: String,

    pub artifact_id: String,
    pub rule_id: String,
    pub tier: SeverityTier,

    /// Verdict severity that selected the tier
    pub severity: f64,

    /// Violations of `rule_id` in the verdict
    pub violations: Vec<Violation>,

    /// Verdict summary line
    pub summary: String,

    pub generated_at: DateTime<Utc>,

    /// Deduplication period
    pub period: Period,

    /// Immediate dispatch state (high alerts only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deliveries: Vec<RecipientDelivery>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
}

impl Alert {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }

    /// Hours from generation to resolution
    pub fn resolution_hours(&self) -> Option<f64> {
        self.resolved_at
            .map(|resolved| (resolved - self.generated_at).num_seconds().max(0) as f64 / 3600.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    /// A recipient was marked permanently failed
    DeliveryFailure,
    /// Regulations stale beyond the configured bound
    RegulatoryStale,
}

impl IncidentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeliveryFailure => "delivery_failure",
            Self::RegulatoryStale => "regulatory_stale",
        }
    }
}

/// Operational problem disclosed in the next report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub kind: IncidentKind,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}
