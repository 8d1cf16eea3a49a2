//! Regulatory monitor
//!
//! Serves regional regulations from an in-memory snapshot and refreshes it in
//! the background. A failed refresh keeps the last good snapshot serving and
//! marks the monitor stale until the next success.

use adcomply_core::{Cache, CampaignArtifact, Error, Result, Violation};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::regulation::CompiledRegulation;
use crate::source::{FileSource, HttpSource, RegulationFeed, RegulationSource};

/// `regulatory_monitor` configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegulatoryMonitorConfig {
    /// Local JSON feed
    #[serde(default)]
    pub regulations_file: Option<PathBuf>,

    /// HTTP feed; authoritative when set
    #[serde(default)]
    pub api_url: Option<String>,

    /// Bearer token for `api_url`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Refresh period in seconds
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,

    /// Stale for longer than this (seconds) raises an operational incident
    #[serde(default = "default_staleness_alert_after")]
    pub staleness_alert_after: u64,

    /// HTTP timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_update_interval() -> u64 {
    3600
}

fn default_staleness_alert_after() -> u64 {
    86_400
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for RegulatoryMonitorConfig {
    fn default() -> Self {
        Self {
            regulations_file: None,
            api_url: None,
            api_key: None,
            update_interval: default_update_interval(),
            staleness_alert_after: default_staleness_alert_after(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Immutable region → regulations mapping
#[derive(Debug, Default)]
pub struct RegulationSnapshot {
    version: u64,
    source_version: Option<String>,
    loaded_at: Option<DateTime<Utc>>,
    by_region: HashMap<String, Vec<Arc<CompiledRegulation>>>,
    skipped: usize,
}

impl RegulationSnapshot {
    /// Build a snapshot, skipping malformed regulations
    pub fn build(feed: RegulationFeed, version: u64) -> Self {
        let mut by_region: HashMap<String, Vec<Arc<CompiledRegulation>>> = HashMap::new();
        let mut skipped = 0;
        for regulation in feed.regulations {
            match CompiledRegulation::compile(regulation) {
                Ok(compiled) => by_region
                    .entry(compiled.regulation.region.to_uppercase())
                    .or_default()
                    .push(Arc::new(compiled)),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed regulation");
                    skipped += 1;
                }
            }
        }
        for regulations in by_region.values_mut() {
            regulations.sort_by(|a, b| a.id().cmp(b.id()));
        }
        Self {
            version,
            source_version: feed.version,
            loaded_at: Some(Utc::now()),
            by_region,
            skipped,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn source_version(&self) -> Option<&str> {
        self.source_version.as_deref()
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    /// Regulations for a region (case-insensitive), sorted by id
    pub fn regulations(&self, region: &str) -> &[Arc<CompiledRegulation>] {
        self.by_region
            .get(&region.to_uppercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_region.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries dropped as malformed when the snapshot was built
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Regulatory violations for one artifact
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegulatoryOutcome {
    pub violations: Vec<Violation>,
    /// Snapshot version evaluated against
    pub version: u64,
    /// The snapshot was stale when evaluated
    pub stale: bool,
}

/// Regulatory violations for a whole campaign, keyed by artifact id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CampaignOutcome {
    pub violations: BTreeMap<String, Vec<Violation>>,
    pub version: u64,
    pub stale: bool,
}

/// Health view of the monitor
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub version: u64,
    pub regulations: usize,
    pub stale: bool,
    pub consecutive_failures: u32,
    pub staleness_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

struct RefreshState {
    /// Last successful load (monitor creation until the first success)
    last_success: Instant,
    last_success_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    last_error: Option<String>,
}

/// Keeps regional regulations current
pub struct RegulatoryMonitor {
    snapshot: ArcSwap<RegulationSnapshot>,
    source: Option<Arc<dyn RegulationSource>>,
    seed: Option<Arc<dyn RegulationSource>>,
    state: Mutex<RefreshState>,
    refreshes: Cache<std::result::Result<u64, Error>>,
    update_interval: Duration,
    staleness_alert_after: Duration,
}

impl RegulatoryMonitor {
    /// Monitor over an explicit source
    pub fn new(source: Option<Arc<dyn RegulationSource>>, config: &RegulatoryMonitorConfig) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(RegulationSnapshot::default()),
            source,
            seed: None,
            state: Mutex::new(RefreshState {
                last_success: Instant::now(),
                last_success_at: None,
                consecutive_failures: 0,
                last_error: None,
            }),
            refreshes: Cache::new("regulatory"),
            update_interval: Duration::from_secs(config.update_interval.max(1)),
            staleness_alert_after: Duration::from_secs(config.staleness_alert_after),
        }
    }

    /// Build sources from configuration.
    ///
    /// With both a file and an API the API is authoritative and the file
    /// only seeds the first snapshot.
    pub fn from_config(config: &RegulatoryMonitorConfig) -> Result<Self> {
        let file: Option<Arc<dyn RegulationSource>> = config
            .regulations_file
            .as_ref()
            .map(|path| Arc::new(FileSource::new(path)) as Arc<dyn RegulationSource>);

        let api: Option<Arc<dyn RegulationSource>> = match &config.api_url {
            Some(url) => Some(Arc::new(HttpSource::new(
                url.clone(),
                config.api_key.clone(),
                Duration::from_millis(config.request_timeout_ms),
            )?)),
            None => None,
        };

        Ok(match (api, file) {
            (Some(api), seed) => Self {
                seed,
                ..Self::new(Some(api), config)
            },
            (None, file) => Self::new(file, config),
        })
    }

    /// Load the seed (if any) and perform the first refresh.
    ///
    /// A failed first refresh leaves the monitor stale but usable.
    pub async fn initialize(&self) -> Result<u64> {
        if let Some(seed) = &self.seed {
            match seed.fetch().await {
                Ok(feed) => {
                    let version = self.publish(feed);
                    info!(source = %seed.describe(), version, "Seeded regulations");
                }
                Err(e) => warn!(source = %seed.describe(), error = %e, "Regulation seed failed"),
            }
        }
        self.refresh().await
    }

    /// Fetch from the source and swap in a new snapshot.
    ///
    /// Concurrent callers share one fetch and its outcome.
    pub async fn refresh(&self) -> Result<u64> {
        let Some(source) = self.source.as_deref() else {
            return Ok(self.version());
        };
        self.refreshes
            .get_or_compute("refresh", Duration::ZERO, move || async move {
                Ok::<_, Infallible>(self.fetch_and_apply(source).await)
            })
            .await
            .unwrap_or_else(|never| match never {})
    }

    async fn fetch_and_apply(&self, source: &dyn RegulationSource) -> Result<u64> {
        match source.fetch().await {
            Ok(feed) => {
                let version = self.publish(feed);
                metrics::counter!("adcomply_regulatory_refresh_total", "outcome" => "ok").increment(1);
                info!(source = %source.describe(), version, "Regulations refreshed");
                Ok(version)
            }
            Err(e) => {
                let failures = {
                    let mut state = self.state.lock();
                    state.consecutive_failures += 1;
                    state.last_error = Some(e.to_string());
                    state.consecutive_failures
                };
                metrics::counter!("adcomply_regulatory_refresh_total", "outcome" => "error").increment(1);
                metrics::gauge!("adcomply_regulatory_stale").set(1.0);
                warn!(
                    component = "regulatory_monitor",
                    source = %source.describe(),
                    consecutive_failures = failures,
                    error = %e,
                    "Regulation refresh failed, serving last good snapshot"
                );
                Err(e)
            }
        }
    }

    fn publish(&self, feed: RegulationFeed) -> u64 {
        let version = self.snapshot.load().version() + 1;
        let snapshot = RegulationSnapshot::build(feed, version);
        let count = snapshot.len();
        self.snapshot.store(Arc::new(snapshot));

        let mut state = self.state.lock();
        state.last_success = Instant::now();
        state.last_success_at = Some(Utc::now());
        state.consecutive_failures = 0;
        state.last_error = None;
        drop(state);

        metrics::gauge!("adcomply_regulatory_stale").set(0.0);
        metrics::gauge!("adcomply_regulations_loaded").set(count as f64);
        version
    }

    /// Current snapshot; never touches the network
    pub fn snapshot(&self) -> Arc<RegulationSnapshot> {
        self.snapshot.load_full()
    }

    pub fn version(&self) -> u64 {
        self.snapshot.load().version()
    }

    /// Regulations currently published for `region`
    pub fn get_regulations(&self, region: &str) -> Vec<Arc<CompiledRegulation>> {
        self.snapshot.load().regulations(region).to_vec()
    }

    /// Check an artifact against the regulations in force for its region.
    ///
    /// Artifacts without a region produce no violations.
    pub fn evaluate(&self, artifact: &CampaignArtifact) -> RegulatoryOutcome {
        let snapshot = self.snapshot.load_full();
        let violations = check_artifact(&snapshot, artifact, Utc::now());
        RegulatoryOutcome {
            violations,
            version: snapshot.version(),
            stale: self.is_stale(),
        }
    }

    /// Check every artifact of a campaign against one snapshot.
    ///
    /// `region` is the campaign's target region and applies to artifacts
    /// that do not name their own. Only artifacts with violations appear in
    /// the result.
    pub fn evaluate_campaign(&self, artifacts: &[CampaignArtifact], region: Option<&str>) -> CampaignOutcome {
        let snapshot = self.snapshot.load_full();
        let now = Utc::now();
        let violations = artifacts
            .iter()
            .filter_map(|artifact| {
                let found = match (&artifact.region, region) {
                    (None, Some(region)) => {
                        check_artifact(&snapshot, &artifact.clone().with_region(region), now)
                    }
                    _ => check_artifact(&snapshot, artifact, now),
                };
                (!found.is_empty()).then(|| (artifact.id.clone(), found))
            })
            .collect();
        CampaignOutcome {
            violations,
            version: snapshot.version(),
            stale: self.is_stale(),
        }
    }

    /// True from the first failed refresh until the next success
    pub fn is_stale(&self) -> bool {
        self.state.lock().consecutive_failures > 0
    }

    /// Time since the last successful refresh
    pub fn staleness_duration(&self) -> Duration {
        self.state.lock().last_success.elapsed()
    }

    /// Incident text when stale for longer than `staleness_alert_after`
    pub fn staleness_alert(&self) -> Option<String> {
        let state = self.state.lock();
        let stale_for = state.last_success.elapsed();
        if state.consecutive_failures == 0 || stale_for < self.staleness_alert_after {
            return None;
        }
        Some(format!(
            "regulations stale for {}s after {} failed refresh(es): {}",
            stale_for.as_secs(),
            state.consecutive_failures,
            state.last_error.as_deref().unwrap_or("unknown error")
        ))
    }

    pub fn status(&self) -> MonitorStatus {
        let snapshot = self.snapshot.load();
        let state = self.state.lock();
        MonitorStatus {
            version: snapshot.version(),
            regulations: snapshot.len(),
            stale: state.consecutive_failures > 0,
            consecutive_failures: state.consecutive_failures,
            staleness_secs: state.last_success.elapsed().as_secs(),
            last_success: state.last_success_at,
            last_error: state.last_error.clone(),
        }
    }

    /// Refresh every `update_interval` until cancelled
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        if self.source.is_none() {
            debug!("No regulation source configured, refresh loop idle");
            cancel.cancelled().await;
            return;
        }

        let mut ticker = tokio::time::interval(self.update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; initialize() already loaded
        ticker.tick().await;

        info!(interval_secs = self.update_interval.as_secs(), "Regulatory refresh loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                // Errors are already logged and tracked as staleness
                _ = self.refresh() => {}
            }
        }
        info!("Regulatory refresh loop stopped");
    }
}

fn check_artifact(snapshot: &RegulationSnapshot, artifact: &CampaignArtifact, now: DateTime<Utc>) -> Vec<Violation> {
    let Some(region) = artifact.region.as_deref() else {
        return Vec::new();
    };
    let violations: Vec<Violation> = snapshot
        .regulations(region)
        .iter()
        .filter(|regulation| regulation.applies_to(artifact, now))
        .flat_map(|regulation| regulation.check(artifact))
        .collect();

    if !violations.is_empty() {
        metrics::counter!("adcomply_violations_total", "source" => "regulatory")
            .increment(violations.len() as u64);
    }
    debug!(
        artifact_id = %artifact.id,
        region,
        version = snapshot.version(),
        violations = violations.len(),
        "Regulatory evaluation complete"
    );
    violations
}
