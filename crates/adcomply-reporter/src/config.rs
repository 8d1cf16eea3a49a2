//! Reporter configuration

use crate::notifier::Recipient;
use adcomply_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// `compliance_reporter` configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReporterConfig {
    /// Directory holding `alert_email.html` and `report_email.html`
    #[serde(default)]
    pub templates_path: Option<PathBuf>,

    /// SMTP transport for email recipients
    #[serde(default)]
    pub smtp_config: Option<SmtpConfig>,

    #[serde(default)]
    pub alert_thresholds: AlertThresholds,

    #[serde(default)]
    pub report_schedule: ReportScheduleConfig,

    /// Email addresses (`mailto:` optional) and webhook URLs
    #[serde(default)]
    pub alert_recipients: Vec<String>,

    /// Weight per `source` or `source.category`; unlisted weights are 1.0
    #[serde(default)]
    pub severity_weights: BTreeMap<String, f64>,

    /// Record alerts below the medium threshold as `low`, for reports only
    #[serde(default)]
    pub record_low_alerts: bool,

    /// Severity normalisation denominator
    #[serde(default = "default_baseline_volume")]
    pub baseline_volume: f64,
}

fn default_baseline_volume() -> f64 {
    1.0
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            templates_path: None,
            smtp_config: None,
            alert_thresholds: AlertThresholds::default(),
            report_schedule: ReportScheduleConfig::default(),
            alert_recipients: Vec::new(),
            severity_weights: BTreeMap::new(),
            record_low_alerts: false,
            baseline_volume: default_baseline_volume(),
        }
    }
}

impl ReporterConfig {
    pub fn validate(&self) -> Result<()> {
        self.alert_thresholds.validate()?;
        if !self.baseline_volume.is_finite() || self.baseline_volume <= 0.0 {
            return Err(Error::config("baseline_volume must be a positive number"));
        }
        if let Some((key, _)) = self
            .severity_weights
            .iter()
            .find(|(_, weight)| !weight.is_finite() || **weight < 0.0)
        {
            return Err(Error::config(format!("severity weight {key:?} must be non-negative")));
        }
        Ok(())
    }

    /// Recipients that no configured channel can reach: unparseable
    /// entries, and email addresses while `smtp_config` is unset.
    /// Delivery to these fails permanently.
    pub fn unroutable_recipients(&self) -> Vec<&str> {
        self.alert_recipients
            .iter()
            .filter(|raw| match Recipient::parse(raw) {
                Ok(Recipient::Webhook(_)) => false,
                Ok(Recipient::Email(_)) => self.smtp_config.is_none(),
                Err(_) => true,
            })
            .map(String::as_str)
            .collect()
    }
}

/// Severity cutoffs; both bounds are inclusive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    #[serde(default = "default_high")]
    pub high: f64,
    #[serde(default = "default_medium")]
    pub medium: f64,
}

fn default_high() -> f64 {
    0.8
}

fn default_medium() -> f64 {
    0.5
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            high: default_high(),
            medium: default_medium(),
        }
    }
}

impl AlertThresholds {
    pub fn validate(&self) -> Result<()> {
        if !(self.medium.is_finite() && self.high.is_finite()) || self.medium < 0.0 {
            return Err(Error::config("alert thresholds must be non-negative numbers"));
        }
        if self.medium > self.high {
            return Err(Error::config(format!(
                "alert_thresholds.medium ({}) exceeds alert_thresholds.high ({})",
                self.medium, self.high
            )));
        }
        Ok(())
    }
}

/// Report trigger times, UTC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportScheduleConfig {
    /// `"HH:MM"`
    #[serde(default)]
    pub daily: Option<String>,

    /// `"MON HH:MM"`
    #[serde(default)]
    pub weekly: Option<String>,
}

impl Default for ReportScheduleConfig {
    fn default() -> Self {
        Self {
            daily: Some("00:00".to_string()),
            weekly: Some("MON 00:00".to_string()),
        }
    }
}

/// SMTP relay settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// From address
    pub sender: String,

    /// Plaintext transport for local relays when false
    #[serde(default = "default_tls")]
    pub tls: bool,
}

fn default_smtp_port() -> u16 {
    465
}

fn default_tls() -> bool {
    true
}
