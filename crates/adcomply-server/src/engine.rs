//! Compliance engine
//!
//! Runs the policy, moderation and regulatory checks for an artifact
//! concurrently, merges their violations into a verdict and hands the verdict
//! to the reporter. A failed sub-check degrades the verdict instead of
//! failing it.

use adcomply_core::{
    merge_violations, CampaignArtifact, ComplianceVerdict, Error, Result, Violation,
};
use adcomply_moderation::{ContentModerator, ModerationOutcome, UnscoredPolicy};
use adcomply_policy::{PolicyChecker, RuleStore};
use adcomply_regulatory::{RegulatoryMonitor, RegulatoryOutcome};
use adcomply_reporter::{ComplianceReporter, PeriodKind, RegulatoryProbe, Report};
use chrono::Utc;
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AdComplyConfig;

const POLICY_COMPONENT: &str = "policy_checker";

/// Exposes monitor freshness to the reporter
pub struct MonitorProbe(pub Arc<RegulatoryMonitor>);

impl RegulatoryProbe for MonitorProbe {
    fn is_stale(&self) -> bool {
        self.0.is_stale()
    }

    fn staleness(&self) -> Duration {
        self.0.staleness_duration()
    }

    fn staleness_alert(&self) -> Option<String> {
        self.0.staleness_alert()
    }
}

/// The four components behind the boundary API
pub struct ComplianceEngine {
    policy: PolicyChecker,
    moderator: ContentModerator,
    regulatory: Arc<RegulatoryMonitor>,
    reporter: Arc<ComplianceReporter>,
    evaluation_timeout: Duration,
    /// Cancels background refresh, scheduling and alert dispatch
    shutdown: CancellationToken,
}

impl ComplianceEngine {
    pub fn new(
        policy: PolicyChecker,
        moderator: ContentModerator,
        regulatory: Arc<RegulatoryMonitor>,
        reporter: Arc<ComplianceReporter>,
        evaluation_timeout: Duration,
    ) -> Self {
        Self {
            policy,
            moderator,
            regulatory,
            reporter,
            evaluation_timeout,
            shutdown: CancellationToken::new(),
        }
    }

    /// Build every component from configuration and load initial state.
    ///
    /// A malformed rule file is fatal. An unreachable regulation source is
    /// not: the monitor starts stale and keeps retrying on its interval.
    pub async fn from_config(config: &AdComplyConfig) -> Result<Self> {
        config.validate()?;
        let environment = config.environment_config()?;

        let store = match &config.policy_checker.rules_file {
            Some(path) => RuleStore::open(path).await?,
            None => {
                warn!("No rules_file configured, policy checks are disabled");
                RuleStore::new()
            }
        };
        info!(version = store.version(), rules = store.current_snapshot().len(), "Rules loaded");
        let policy = PolicyChecker::new(Arc::new(store), &config.policy_checker);

        let moderator = ContentModerator::from_config(config.content_moderator.clone())?;
        info!(categories = ?moderator.registry().categories(), "Moderation adapters ready");

        let regulatory = Arc::new(RegulatoryMonitor::from_config(&config.regulatory_monitor)?);
        match regulatory.initialize().await {
            Ok(version) => info!(version, regulations = regulatory.snapshot().len(), "Regulations loaded"),
            Err(e) => warn!(error = %e, "Initial regulation load failed, starting stale"),
        }

        let reporter = ComplianceReporter::from_config(
            &config.reporter_config(),
            environment.retry_policy(),
            environment.request_timeout(),
        )?
        .with_regulatory_probe(Arc::new(MonitorProbe(Arc::clone(&regulatory))));

        Ok(Self::new(
            policy,
            moderator,
            regulatory,
            Arc::new(reporter),
            config.evaluation_timeout(),
        ))
    }

    pub fn rule_store(&self) -> &Arc<RuleStore> {
        self.policy.store()
    }

    pub fn regulatory(&self) -> &Arc<RegulatoryMonitor> {
        &self.regulatory
    }

    pub fn reporter(&self) -> &Arc<ComplianceReporter> {
        &self.reporter
    }

    /// Start the regulation refresh loop and the report scheduler
    pub fn spawn_background(&self) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(Arc::clone(&self.regulatory).run(self.shutdown.child_token())),
            tokio::spawn(Arc::clone(&self.reporter).run(self.shutdown.child_token())),
        ]
    }

    /// Stop background work; pending deliveries stay resumable
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Evaluate one artifact.
    ///
    /// Only malformed input, the evaluation timeout and caller cancellation
    /// return errors; none of them leave alerts behind.
    pub async fn check(&self, artifact: &CampaignArtifact, cancel: &CancellationToken) -> Result<ComplianceVerdict> {
        let started = Instant::now();
        if let Err(e) = artifact.validate() {
            metrics::counter!("adcomply_checks_total", "outcome" => "invalid").increment(1);
            return Err(e);
        }

        let ruleset = self.policy.store().current_snapshot();
        let evaluation = async {
            tokio::join!(
                self.policy.evaluate(artifact, &ruleset),
                self.moderator.moderate(artifact),
                async { self.regulatory.evaluate(artifact) },
            )
        };
        let (policy, moderation, regulatory) = self.bounded(evaluation, cancel).await?;

        let policy = match policy {
            Err(e) if e.is_validation() => {
                metrics::counter!("adcomply_checks_total", "outcome" => "invalid").increment(1);
                return Err(e);
            }
            other => other,
        };

        let verdict = assemble_verdict(
            artifact,
            ruleset.version(),
            policy,
            moderation,
            regulatory,
            self.moderator.unscored_policy(),
        );
        self.record(&verdict, started);
        Ok(verdict)
    }

    /// Evaluate several artifacts, moderating them in adapter batches.
    ///
    /// Results follow input order; a malformed artifact fails only its own
    /// slot. Timeout and cancellation apply to the whole batch.
    pub async fn check_batch(
        &self,
        artifacts: &[CampaignArtifact],
        cancel: &CancellationToken,
    ) -> Result<Vec<Result<ComplianceVerdict>>> {
        let started = Instant::now();
        let validity: Vec<Result<()>> = artifacts.iter().map(|a| a.validate()).collect();
        let valid: Vec<CampaignArtifact> = artifacts
            .iter()
            .zip(&validity)
            .filter(|(_, v)| v.is_ok())
            .map(|(a, _)| a.clone())
            .collect();

        let ruleset = self.policy.store().current_snapshot();
        let evaluation = async {
            tokio::join!(
                join_all(valid.iter().map(|a| self.policy.evaluate(a, &ruleset))),
                self.moderator.moderate_batch(&valid),
            )
        };
        let (policies, moderations) = self.bounded(evaluation, cancel).await?;

        let mut evaluated = valid
            .iter()
            .zip(policies.into_iter().zip(moderations))
            .map(|(artifact, (policy, moderation))| {
                if let Err(e) = &policy {
                    if e.is_validation() {
                        return Err(e.clone());
                    }
                }
                let regulatory = self.regulatory.evaluate(artifact);
                Ok(assemble_verdict(
                    artifact,
                    ruleset.version(),
                    policy,
                    moderation,
                    regulatory,
                    self.moderator.unscored_policy(),
                ))
            });

        let mut results = Vec::with_capacity(artifacts.len());
        for validation in validity {
            match validation {
                Err(e) => {
                    metrics::counter!("adcomply_checks_total", "outcome" => "invalid").increment(1);
                    results.push(Err(e));
                }
                Ok(()) => match evaluated.next() {
                    Some(Ok(verdict)) => {
                        self.record(&verdict, started);
                        results.push(Ok(verdict));
                    }
                    Some(Err(e)) => results.push(Err(e)),
                    None => results.push(Err(Error::internal("batch evaluation lost an artifact"))),
                },
            }
        }
        Ok(results)
    }

    /// Latest report of `kind`, or a preview of the open period
    pub fn get_report(&self, kind: PeriodKind) -> Report {
        self.reporter.get_report(kind)
    }

    /// Generate the last completed period of `kind` and deliver it in the
    /// background
    pub fn generate_report(&self, kind: PeriodKind) -> Report {
        let report = self.reporter.generate_report(kind);
        if !report.is_settled() {
            let reporter = Arc::clone(&self.reporter);
            let cancel = self.shutdown.child_token();
            let report_id = report.id.clone();
            tokio::spawn(async move {
                match reporter.deliver_report(&report_id, &cancel).await {
                    Ok(_) => debug!(report_id = %report_id, "On-demand report delivered"),
                    Err(Error::Cancelled) => info!(report_id = %report_id, "Report delivery interrupted"),
                    Err(e) => error!(report_id = %report_id, error = %e, "Report delivery failed"),
                }
            });
        }
        report
    }

    /// Re-read the rule file; the previous rule set stays live on failure
    pub async fn reload_rules(&self) -> Result<u64> {
        let set = self.policy.store().reload().await?;
        Ok(set.version())
    }

    async fn bounded<T>(&self, evaluation: impl Future<Output = T>, cancel: &CancellationToken) -> Result<T> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                metrics::counter!("adcomply_checks_total", "outcome" => "cancelled").increment(1);
                Err(Error::Cancelled)
            }
            result = tokio::time::timeout(self.evaluation_timeout, evaluation) => result.map_err(|_| {
                metrics::counter!("adcomply_checks_total", "outcome" => "timeout").increment(1);
                warn!(timeout_ms = self.evaluation_timeout.as_millis() as u64, "Evaluation timed out");
                Error::Timeout
            }),
        }
    }

    fn record(&self, verdict: &ComplianceVerdict, started: Instant) {
        let outcome = if verdict.passed { "passed" } else { "failed" };
        metrics::counter!("adcomply_checks_total", "outcome" => outcome).increment(1);
        metrics::histogram!("adcomply_check_latency_us").record(started.elapsed().as_micros() as f64);

        let submitted = self.reporter.submit(verdict);
        self.reporter.spawn_immediate(&submitted.alerts, &self.shutdown);

        info!(
            artifact_id = %verdict.artifact_id,
            passed = verdict.passed,
            violations = verdict.violations.len(),
            manual_review = verdict.needs_manual_review,
            alerts = submitted.alerts.len(),
            "Artifact evaluated"
        );
    }
}

fn assemble_verdict(
    artifact: &CampaignArtifact,
    ruleset_version: u64,
    policy: Result<Vec<Violation>>,
    moderation: ModerationOutcome,
    regulatory: RegulatoryOutcome,
    unscored_policy: UnscoredPolicy,
) -> ComplianceVerdict {
    let mut degraded = Vec::new();
    let policy_violations = policy.unwrap_or_else(|e| {
        error!(
            artifact_id = %artifact.id,
            component = POLICY_COMPONENT,
            error = %e,
            "Policy check failed"
        );
        degraded.push(POLICY_COMPONENT.to_string());
        Vec::new()
    });

    let blocked = moderation.blocks(unscored_policy);
    let violations = merge_violations([policy_violations, moderation.violations, regulatory.violations]);
    ComplianceVerdict {
        artifact_id: artifact.id.clone(),
        content_hash: artifact.content_hash(),
        passed: violations.is_empty() && degraded.is_empty() && !blocked,
        needs_manual_review: !degraded.is_empty() || !moderation.unscored.is_empty(),
        violations,
        unscored_categories: moderation.unscored,
        degraded_components: degraded,
        evaluated_at: Utc::now(),
        ruleset_version,
        regulation_version: regulatory.version,
        regulations_stale: regulatory.stale,
    }
}
