//! Service configuration
//!
//! One document with a section per component, read from YAML or JSON and
//! overlaid with `ADCOMPLY__<SECTION>__<KEY>` environment variables.

use adcomply_core::{Error, Result};
use adcomply_moderation::ModeratorConfig;
use adcomply_policy::PolicyCheckerConfig;
use adcomply_regulatory::RegulatoryMonitorConfig;
use adcomply_reporter::{ReporterConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdComplyConfig {
    #[serde(default)]
    pub policy_checker: PolicyCheckerConfig,

    #[serde(default)]
    pub content_moderator: ModeratorConfig,

    #[serde(default)]
    pub regulatory_monitor: RegulatoryMonitorConfig,

    #[serde(default)]
    pub compliance_reporter: ReporterConfig,

    /// Delivery settings per deployment environment
    #[serde(default = "default_environments")]
    pub environments: BTreeMap<String, EnvironmentConfig>,

    /// Key into `environments`
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Seconds allowed for a single check
    #[serde(default = "default_evaluation_timeout")]
    pub evaluation_timeout: u64,
}

impl AdComplyConfig {
    /// Load from `config_path` (when it exists) and the environment
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if Path::new(config_path).exists() {
            builder = builder.add_source(config::File::with_name(config_path));
        } else {
            warn!(path = config_path, "Configuration file not found, using defaults");
        }

        let config: Self = builder
            .add_source(
                config::Environment::with_prefix("ADCOMPLY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.content_moderator.validate()?;
        self.reporter_config().validate()?;
        self.environment_config()?;
        if self.evaluation_timeout == 0 {
            return Err(Error::config("evaluation_timeout must be at least one second"));
        }
        Ok(())
    }

    /// Settings of the selected environment
    pub fn environment_config(&self) -> Result<&EnvironmentConfig> {
        self.environments.get(&self.environment).ok_or_else(|| {
            Error::config(format!(
                "environment {:?} is not defined (known: {})",
                self.environment,
                self.environments.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    /// Reporter section with the shared severity baseline applied
    pub fn reporter_config(&self) -> ReporterConfig {
        ReporterConfig {
            baseline_volume: self.policy_checker.baseline_volume,
            ..self.compliance_reporter.clone()
        }
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_secs(self.evaluation_timeout)
    }
}

impl Default for AdComplyConfig {
    fn default() -> Self {
        Self {
            policy_checker: PolicyCheckerConfig::default(),
            content_moderator: ModeratorConfig::default(),
            regulatory_monitor: RegulatoryMonitorConfig::default(),
            compliance_reporter: ReporterConfig::default(),
            environments: default_environments(),
            environment: default_environment(),
            evaluation_timeout: default_evaluation_timeout(),
        }
    }
}

/// Notification delivery settings for one environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Attempts per recipient, including the first
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Seconds before the first retry
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    /// Cap on a single backoff, seconds
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay: u64,

    /// Total delivery budget per recipient, seconds
    #[serde(default = "default_max_delivery_elapsed")]
    pub max_delivery_elapsed: u64,

    #[serde(default = "default_true")]
    pub retry_jitter: bool,

    /// Webhook and SMTP timeout, seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl EnvironmentConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts.max(1),
            base_delay: Duration::from_secs(self.retry_delay),
            max_delay: Duration::from_secs(self.max_retry_delay.max(self.retry_delay)),
            max_elapsed: Duration::from_secs(self.max_delivery_elapsed),
            jitter: self.retry_jitter,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_delay: default_retry_delay(),
            max_retry_delay: default_max_retry_delay(),
            max_delivery_elapsed: default_max_delivery_elapsed(),
            retry_jitter: true,
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_environments() -> BTreeMap<String, EnvironmentConfig> {
    BTreeMap::from([("base".to_string(), EnvironmentConfig::default())])
}

fn default_environment() -> String {
    "base".to_string()
}

fn default_evaluation_timeout() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1
}

fn default_max_retry_delay() -> u64 {
    30
}

fn default_max_delivery_elapsed() -> u64 {
    300
}

fn default_request_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}
