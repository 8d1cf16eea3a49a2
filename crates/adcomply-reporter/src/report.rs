//! Compliance reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::alert::{Alert, DeliveryStatus, Incident, RecipientDelivery};
use crate::schedule::{Period, PeriodKind};
use crate::severity::SeverityTier;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_alerts: usize,
    pub resolved_alerts: usize,
    pub high_severity: usize,
    /// Percentage of submitted verdicts that passed
    pub compliance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetrics {
    pub compliance_rate: f64,
    pub resolution_rate: f64,
    pub avg_resolution_hours: f64,
    pub verdicts_submitted: usize,
    pub verdicts_passed: usize,
}

impl ReportMetrics {
    /// Rates are percentages; an empty period counts as fully compliant
    pub fn compute(alerts: &[Alert], submitted: usize, passed: usize) -> Self {
        let compliance_rate = if submitted == 0 {
            100.0
        } else {
            passed as f64 / submitted as f64 * 100.0
        };
        let resolution_hours: Vec<f64> = alerts.iter().filter_map(Alert::resolution_hours).collect();
        let resolution_rate = if alerts.is_empty() {
            100.0
        } else {
            resolution_hours.len() as f64 / alerts.len() as f64 * 100.0
        };
        let avg_resolution_hours = if resolution_hours.is_empty() {
            0.0
        } else {
            resolution_hours.iter().sum::<f64>() / resolution_hours.len() as f64
        };
        Self {
            compliance_rate,
            resolution_rate,
            avg_resolution_hours,
            verdicts_submitted: submitted,
            verdicts_passed: passed,
        }
    }
}

/// Regulatory freshness at generation time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegulatoryDisclosure {
    pub stale: bool,
    pub staleness_secs: u64,
}

impl RegulatoryDisclosure {
    pub fn describe(&self) -> String {
        if self.stale {
            format!(
                "Regulatory data is stale: last successful refresh {}s ago. Regulatory findings may be out of date.",
                self.staleness_secs
            )
        } else {
            "Regulatory data is current.".to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// `REP_<start yyyymmdd>_<end yyyymmdd>`
    pub id: String,
    pub kind: PeriodKind,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,

    /// Alerts generated in the period, oldest first
    pub alerts: Vec<Alert>,

    pub summary: ReportSummary,
    pub metrics: ReportMetrics,

    /// Alert count per tier
    pub severity_distribution: BTreeMap<String, usize>,

    /// Operational incidents raised in the period
    pub incidents: Vec<Incident>,

    pub regulatory: RegulatoryDisclosure,

    pub generated_at: DateTime<Utc>,

    /// Per-recipient delivery state in configured order
    pub deliveries: Vec<RecipientDelivery>,

    /// Rendered for an in-progress period and never delivered
    #[serde(default)]
    pub preview: bool,

    pub subject: String,

    /// Rendered HTML body
    pub body: String,
}

impl Report {
    pub fn period(&self) -> Period {
        Period {
            kind: self.kind,
            start: self.period_start,
            end: self.period_end,
        }
    }

    /// Every recipient reached a terminal state
    pub fn is_settled(&self) -> bool {
        self.deliveries.iter().all(|d| !d.status.is_pending())
    }

    pub fn pending_recipients(&self) -> Vec<String> {
        self.deliveries
            .iter()
            .filter(|d| d.status.is_pending())
            .map(|d| d.recipient.clone())
            .collect()
    }

    pub fn delivery(&self, recipient: &str) -> Option<&DeliveryStatus> {
        self.deliveries
            .iter()
            .find(|d| d.recipient == recipient)
            .map(|d| &d.status)
    }

    /// Webhook body
    pub fn payload(&self) -> serde_json::Value {
        serde_json::json!({
            "report_id": self.id,
            "kind": self.kind,
            "period_start": self.period_start,
            "period_end": self.period_end,
            "summary": self.summary,
            "metrics": self.metrics,
            "severity_distribution": self.severity_distribution,
            "incidents": self.incidents.len(),
            "regulatory": self.regulatory,
            "generated_at": self.generated_at,
        })
    }
}

/// Alert count per tier, every tier present
pub fn severity_distribution(alerts: &[Alert]) -> BTreeMap<String, usize> {
    let mut distribution: BTreeMap<String, usize> = [SeverityTier::High, SeverityTier::Medium, SeverityTier::Low]
        .iter()
        .map(|tier| (tier.as_str().to_string(), 0))
        .collect();
    for alert in alerts {
        *distribution.entry(alert.tier.as_str().to_string()).or_default() += 1;
    }
    distribution
}
