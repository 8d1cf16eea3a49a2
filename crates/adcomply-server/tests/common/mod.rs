//! Engine harness shared by the server integration tests

#![allow(dead_code)]

use adcomply_core::{CampaignArtifact, Error, ModerationCategory, Result};
use adcomply_moderation::{AdapterRegistry, ContentModerator, ModerationAdapter, ModeratorConfig};
use adcomply_policy::{PolicyChecker, PolicyCheckerConfig, RuleFile, RuleStore};
use adcomply_regulatory::{RegulationFeed, RegulationSource, RegulatoryMonitor, RegulatoryMonitorConfig};
use adcomply_reporter::{ComplianceReporter, Notification, Notifier, ReporterConfig, RetryPolicy};
use adcomply_server::{ComplianceEngine, MonitorProbe};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const RULES: &str = include_str!("../../../../rules/default_rules.json");

pub const EU_FEED: &str = r#"{
    "version": "2024.06",
    "regulations": [
        {
            "id": "eu-consent",
            "region": "EU",
            "description": "Consent disclosure required",
            "requirements": ["consent:required"],
            "effective_date": "2020-01-01"
        }
    ]
}"#;

/// Copy that satisfies every default rule
pub const COMPLIANT_TEXT: &str = "Summer sale on all items, disclaimer: terms apply.";

/// Fixed-score adapter with optional latency and failure
pub struct FixedAdapter {
    pub category: ModerationCategory,
    pub score: f32,
    pub fail: bool,
    pub latency: Duration,
}

impl FixedAdapter {
    pub fn new(category: ModerationCategory, score: f32) -> Self {
        Self {
            category,
            score,
            fail: false,
            latency: Duration::ZERO,
        }
    }

    pub fn failing(category: ModerationCategory) -> Self {
        Self {
            fail: true,
            ..Self::new(category, 0.0)
        }
    }

    pub fn slow(category: ModerationCategory, latency: Duration) -> Self {
        Self {
            latency,
            ..Self::new(category, 0.0)
        }
    }
}

#[async_trait]
impl ModerationAdapter for FixedAdapter {
    async fn score(&self, artifact: &CampaignArtifact) -> Result<f32> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.fail {
            return Err(Error::model_unavailable(self.category.as_str(), "model offline"));
        }
        // Copy mentioning "hate" is toxic, so tests can trigger violations
        if self.category == ModerationCategory::Toxicity && artifact.text.to_lowercase().contains("hate") {
            return Ok(1.0);
        }
        Ok(self.score)
    }

    fn category(&self) -> ModerationCategory {
        self.category
    }

    fn model_version(&self) -> &str {
        "fixed-1"
    }
}

/// Regulation source that can be switched to failing
pub struct SwitchableSource {
    pub failing: AtomicBool,
}

impl SwitchableSource {
    pub fn new() -> Self {
        Self {
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl RegulationSource for SwitchableSource {
    async fn fetch(&self) -> Result<RegulationFeed> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::regulatory_fetch("feed unavailable"));
        }
        RegulationFeed::parse(EU_FEED)
    }

    fn describe(&self) -> String {
        "switchable".to_string()
    }
}

/// Records every notification
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, Notification)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: &str, notification: &Notification) -> Result<()> {
        self.sent.lock().push((recipient.to_string(), notification.clone()));
        Ok(())
    }
}

pub struct Harness {
    pub engine: Arc<ComplianceEngine>,
    pub notifier: Arc<RecordingNotifier>,
    pub regulations: Arc<SwitchableSource>,
}

pub struct HarnessOptions {
    pub adapters: Vec<Arc<dyn ModerationAdapter>>,
    pub moderator: ModeratorConfig,
    pub rules_file: Option<PathBuf>,
    pub evaluation_timeout: Duration,
    pub recipients: Vec<String>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            adapters: vec![
                Arc::new(FixedAdapter::new(ModerationCategory::Toxicity, 0.1)),
                Arc::new(FixedAdapter::new(ModerationCategory::Sentiment, 0.2)),
            ],
            moderator: ModeratorConfig::default(),
            rules_file: None,
            evaluation_timeout: Duration::from_secs(5),
            recipients: vec!["compliance@example.com".to_string()],
        }
    }
}

pub async fn harness(options: HarnessOptions) -> Harness {
    let store = match options.rules_file {
        Some(path) => RuleStore::open(path).await.unwrap(),
        None => {
            let store = RuleStore::new();
            store.publish(RuleFile::from_json(RULES).unwrap().rules).unwrap();
            store
        }
    };
    let policy = PolicyChecker::new(Arc::new(store), &PolicyCheckerConfig::default());

    let registry = options
        .adapters
        .into_iter()
        .fold(AdapterRegistry::new(), |registry, adapter| registry.with_adapter(adapter));
    let moderator = ContentModerator::new(registry, options.moderator);

    let regulations = Arc::new(SwitchableSource::new());
    let monitor = Arc::new(RegulatoryMonitor::new(
        Some(regulations.clone() as Arc<dyn RegulationSource>),
        &RegulatoryMonitorConfig::default(),
    ));
    monitor.initialize().await.unwrap();

    let notifier = Arc::new(RecordingNotifier::default());
    let reporter_config = ReporterConfig {
        alert_recipients: options.recipients,
        ..Default::default()
    };
    let reporter = ComplianceReporter::new(&reporter_config, notifier.clone(), RetryPolicy::default())
        .unwrap()
        .with_regulatory_probe(Arc::new(MonitorProbe(Arc::clone(&monitor))));

    let engine = ComplianceEngine::new(
        policy,
        moderator,
        monitor,
        Arc::new(reporter),
        options.evaluation_timeout,
    );
    Harness {
        engine: Arc::new(engine),
        notifier,
        regulations,
    }
}

/// Every default rule passes; rule3 requires a budget on all platforms
pub fn compliant(id: &str) -> CampaignArtifact {
    CampaignArtifact::new(id, "google", COMPLIANT_TEXT).with_budget(500.0, "USD")
}
