//! Compliance reporter
//!
//! Turns verdicts into severity-tiered alerts, accumulates them into
//! scheduled reports and delivers both with bounded retries. Delivery state
//! is kept per recipient so a cancelled delivery resumes from the first
//! recipient that has not been reached.

use adcomply_core::{ComplianceVerdict, Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::alert::{Alert, DeliveryStatus, Incident, IncidentKind, RecipientDelivery};
use crate::config::ReporterConfig;
use crate::notifier::{ChannelNotifier, Notification, Notifier};
use crate::report::{severity_distribution, RegulatoryDisclosure, Report, ReportMetrics, ReportSummary};
use crate::retry::{send_with_retry, RetryOutcome, RetryPolicy};
use crate::schedule::{Period, PeriodKind, Schedules};
use crate::severity::{SeverityScorer, SeverityTier};
use crate::state::VerdictState;
use crate::template::{escape_html, TemplateRenderer, ALERT_TEMPLATE, REPORT_TEMPLATE};

const MAX_ARCHIVED_REPORTS: usize = 100;
const MAX_ARCHIVED_ALERTS: usize = 10_000;
const MAX_ACTIVE_ALERTS: usize = 10_000;
const MAX_VERDICT_RECORDS: usize = 100_000;

/// Read-only view of regulatory freshness
pub trait RegulatoryProbe: Send + Sync {
    fn is_stale(&self) -> bool;

    /// Time since the last successful refresh
    fn staleness(&self) -> Duration;

    /// Incident text once staleness exceeds its bound
    fn staleness_alert(&self) -> Option<String>;
}

/// Sizes of the reporter's in-memory bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub active_alerts: usize,
    pub archived_alerts: usize,
    pub verdicts: usize,
    pub dedup_keys: usize,
    pub incidents: usize,
}

/// What `submit` did with a verdict
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub severity: f64,
    pub tier: Option<SeverityTier>,
    /// Alerts created by this submission (duplicates are not repeated)
    pub alerts: Vec<Alert>,
    pub state: VerdictState,
}

struct VerdictRecord {
    submitted_at: DateTime<Utc>,
    passed: bool,
    state: VerdictState,
}

impl VerdictRecord {
    fn advance(&mut self, next: VerdictState) {
        match self.state.transition(next) {
            Ok(state) => self.state = state,
            Err(e) => warn!(error = %e, "Ignoring verdict state change"),
        }
    }
}

#[derive(Default)]
struct Ledger {
    alerts: Vec<Alert>,
    archived_alerts: VecDeque<Alert>,
    /// dedup key → end of its period
    dedup: HashMap<String, DateTime<Utc>>,
    verdicts: Vec<VerdictRecord>,
    incidents: Vec<Incident>,
    pending_reports: Vec<Report>,
    archive: VecDeque<Report>,
    stale_incident_open: bool,
    /// Start of the oldest period any report can still cover
    horizon: Option<DateTime<Utc>>,
}

impl Ledger {
    fn alert_mut(&mut self, id: &str) -> Option<&mut Alert> {
        self.alerts
            .iter_mut()
            .chain(self.archived_alerts.iter_mut())
            .find(|alert| alert.id == id)
    }

    fn archive_alert(&mut self, alert: Alert) {
        if self.archived_alerts.len() >= MAX_ARCHIVED_ALERTS {
            self.archived_alerts.pop_front();
        }
        self.archived_alerts.push_back(alert);
    }

    /// Drop bookkeeping no report can reach any more.
    ///
    /// Dedup keys of closed periods go first. Alerts and verdicts older than
    /// `horizon` move to the bounded archive or are dropped, whether or not a
    /// report was ever delivered for them.
    fn age_out(&mut self, now: DateTime<Utc>, horizon: DateTime<Utc>) {
        self.dedup.retain(|_, end| *end > now);

        if self.horizon.map_or(true, |previous| horizon > previous) {
            self.horizon = Some(horizon);
            let (expired, active): (Vec<Alert>, Vec<Alert>) = std::mem::take(&mut self.alerts)
                .into_iter()
                .partition(|alert| alert.generated_at < horizon);
            self.alerts = active;
            for alert in expired {
                self.archive_alert(alert);
            }
            self.verdicts.retain(|record| record.submitted_at >= horizon);
            self.incidents.retain(|incident| incident.raised_at >= horizon);
        }

        if self.alerts.len() > MAX_ACTIVE_ALERTS {
            let excess = self.alerts.len() - MAX_ACTIVE_ALERTS;
            warn!(excess, "Active alert limit reached, archiving the oldest");
            let oldest: Vec<Alert> = self.alerts.drain(..excess).collect();
            for alert in oldest {
                self.archive_alert(alert);
            }
        }
        if self.verdicts.len() > MAX_VERDICT_RECORDS {
            let excess = self.verdicts.len() - MAX_VERDICT_RECORDS;
            self.verdicts.drain(..excess);
        }
    }

    fn pending_report_mut(&mut self, id: &str) -> Option<&mut Report> {
        self.pending_reports.iter_mut().find(|report| report.id == id)
    }

    fn raise_incident(&mut self, kind: IncidentKind, message: String, at: DateTime<Utc>) -> Incident {
        let incident = Incident {
            id: format!("INC_{}", Uuid::new_v4().simple()),
            kind,
            message,
            raised_at: at,
        };
        metrics::counter!("adcomply_incidents_total", "kind" => kind.as_str()).increment(1);
        error!(
            component = "compliance_reporter",
            incident_id = %incident.id,
            kind = kind.as_str(),
            message = %incident.message,
            "Operational incident"
        );
        self.incidents.push(incident.clone());
        incident
    }
}

/// Alerts, reports and notification delivery
pub struct ComplianceReporter {
    recipients: Vec<String>,
    scorer: SeverityScorer,
    schedules: Schedules,
    templates: TemplateRenderer,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
    record_low_alerts: bool,
    probe: Option<Arc<dyn RegulatoryProbe>>,
    ledger: Mutex<Ledger>,
    delivery: tokio::sync::Mutex<()>,
}

impl ComplianceReporter {
    pub fn new(config: &ReporterConfig, notifier: Arc<dyn Notifier>, retry: RetryPolicy) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            recipients: config.alert_recipients.clone(),
            scorer: SeverityScorer::new(config),
            schedules: Schedules::from_config(&config.report_schedule)?,
            templates: TemplateRenderer::load(config.templates_path.as_deref())?,
            notifier,
            retry,
            record_low_alerts: config.record_low_alerts,
            probe: None,
            ledger: Mutex::new(Ledger::default()),
            delivery: tokio::sync::Mutex::new(()),
        })
    }

    /// Reporter delivering over SMTP and webhooks
    pub fn from_config(config: &ReporterConfig, retry: RetryPolicy, request_timeout: Duration) -> Result<Self> {
        let notifier = ChannelNotifier::new(config.smtp_config.as_ref(), request_timeout)?;
        Self::new(config, Arc::new(notifier), retry)
    }

    pub fn with_regulatory_probe(mut self, probe: Arc<dyn RegulatoryProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn schedules(&self) -> &Schedules {
        &self.schedules
    }

    pub fn scorer(&self) -> &SeverityScorer {
        &self.scorer
    }

    /// Score a verdict and raise alerts for its violated rules
    pub fn submit(&self, verdict: &ComplianceVerdict) -> SubmitOutcome {
        self.submit_at(verdict, Utc::now())
    }

    pub fn submit_at(&self, verdict: &ComplianceVerdict, now: DateTime<Utc>) -> SubmitOutcome {
        self.observe_regulatory(now);

        let severity = self.scorer.score(verdict);
        let tier = self.scorer.tier(severity).or_else(|| {
            (self.record_low_alerts && !verdict.violations.is_empty()).then_some(SeverityTier::Low)
        });

        let mut record = VerdictRecord {
            submitted_at: now,
            passed: verdict.passed,
            state: VerdictState::Pending,
        };
        record.advance(VerdictState::Evaluated);
        record.advance(if verdict.passed {
            VerdictState::Passed
        } else {
            VerdictState::Violated
        });

        let period = self.schedules.alert_period(now);
        let mut created = Vec::new();
        let mut ledger = self.ledger.lock();
        ledger.age_out(now, self.schedules.retention_horizon(now));

        if let Some(tier) = tier {
            for rule_id in verdict.violated_rule_ids() {
                let dedup_key = format!("{}:{}:{}", verdict.artifact_id, rule_id, period.start.timestamp());
                if ledger.dedup.contains_key(&dedup_key) {
                    debug!(artifact_id = %verdict.artifact_id, rule_id, "Alert already raised this period");
                    continue;
                }
                let alert = Alert {
                    id: format!("ALT_{}", Uuid::new_v4().simple()),
                    dedup_key: dedup_key.clone(),
                    artifact_id: verdict.artifact_id.clone(),
                    rule_id: rule_id.to_string(),
                    tier,
                    severity,
                    violations: verdict.violations_for(rule_id).cloned().collect(),
                    summary: verdict.summary(),
                    generated_at: now,
                    period,
                    deliveries: if tier == SeverityTier::High {
                        self.recipients.iter().map(RecipientDelivery::pending).collect()
                    } else {
                        Vec::new()
                    },
                    resolved_at: None,
                    resolution_notes: None,
                };
                ledger.dedup.insert(dedup_key, period.end);
                ledger.alerts.push(alert.clone());
                metrics::counter!("adcomply_alerts_total", "tier" => tier.as_str()).increment(1);
                info!(
                    artifact_id = %verdict.artifact_id,
                    alert_id = %alert.id,
                    rule_id,
                    tier = tier.as_str(),
                    severity,
                    "Alert raised"
                );
                created.push(alert);
            }
        }

        if !created.is_empty() {
            record.advance(VerdictState::Alerted);
        }
        let state = record.state;
        ledger.verdicts.push(record);
        metrics::gauge!("adcomply_active_alerts").set(ledger.alerts.len() as f64);

        SubmitOutcome {
            severity,
            tier,
            alerts: created,
            state,
        }
    }

    /// Deliver a high alert to every recipient still pending
    pub async fn dispatch_alert(&self, alert_id: &str, cancel: &CancellationToken) -> Result<Alert> {
        let alert = self
            .alert(alert_id)
            .ok_or_else(|| Error::validation(format!("alert {alert_id} not found")))?;
        let notification = self.alert_notification(&alert)?;

        for delivery in alert.deliveries.iter().filter(|d| d.status.is_pending()) {
            let outcome = self.deliver_one(&delivery.recipient, &notification, cancel).await;
            let Some(status) = self.settle(&delivery.recipient, outcome, "alert", alert_id) else {
                return Err(Error::Cancelled);
            };
            if let Some(alert) = self.ledger.lock().alert_mut(alert_id) {
                set_status(&mut alert.deliveries, &delivery.recipient, status);
            }
        }
        self.alert(alert_id)
            .ok_or_else(|| Error::internal(format!("alert {alert_id} vanished during delivery")))
    }

    /// Dispatch every high alert in the background
    pub fn spawn_immediate(self: &Arc<Self>, alerts: &[Alert], cancel: &CancellationToken) {
        for alert in alerts.iter().filter(|a| a.tier == SeverityTier::High && !a.deliveries.is_empty()) {
            let reporter = Arc::clone(self);
            let cancel = cancel.clone();
            let alert_id = alert.id.clone();
            tokio::spawn(async move {
                if let Err(e) = reporter.dispatch_alert(&alert_id, &cancel).await {
                    warn!(alert_id = %alert_id, error = %e, "Immediate alert dispatch stopped");
                }
            });
        }
    }

    /// Mark an alert resolved; `None` when the id is unknown
    pub fn resolve_alert(&self, alert_id: &str, notes: impl Into<String>) -> Option<Alert> {
        let mut ledger = self.ledger.lock();
        let alert = ledger.alert_mut(alert_id)?;
        alert.resolved_at = Some(Utc::now());
        alert.resolution_notes = Some(notes.into());
        info!(alert_id, "Resolved alert");
        Some(alert.clone())
    }

    pub fn alert(&self, alert_id: &str) -> Option<Alert> {
        self.ledger.lock().alert_mut(alert_id).map(|alert| alert.clone())
    }

    /// Alerts not yet archived, oldest first
    pub fn active_alerts(&self) -> Vec<Alert> {
        self.ledger.lock().alerts.clone()
    }

    pub fn ledger_stats(&self) -> LedgerStats {
        let ledger = self.ledger.lock();
        LedgerStats {
            active_alerts: ledger.alerts.len(),
            archived_alerts: ledger.archived_alerts.len(),
            verdicts: ledger.verdicts.len(),
            dedup_keys: ledger.dedup.len(),
            incidents: ledger.incidents.len(),
        }
    }

    pub fn incidents(&self) -> Vec<Incident> {
        self.ledger.lock().incidents.clone()
    }

    /// Record an operational incident
    pub fn raise_incident(&self, kind: IncidentKind, message: impl Into<String>) -> Incident {
        self.ledger.lock().raise_incident(kind, message.into(), Utc::now())
    }

    /// Latest generated report of `kind`, or a preview of the open period
    pub fn get_report(&self, kind: PeriodKind) -> Report {
        self.get_report_at(kind, Utc::now())
    }

    pub fn get_report_at(&self, kind: PeriodKind, now: DateTime<Utc>) -> Report {
        let latest = {
            let ledger = self.ledger.lock();
            ledger
                .pending_reports
                .iter()
                .chain(ledger.archive.iter())
                .filter(|report| report.kind == kind)
                .max_by_key(|report| (report.period_end, report.generated_at))
                .cloned()
        };
        latest.unwrap_or_else(|| {
            let period = self.schedules.get(kind).period_containing(now);
            self.build_report(period, now, true)
        })
    }

    /// Generate the report for the last completed period of `kind`.
    ///
    /// Returns the existing report when that period was already generated.
    pub fn generate_report(&self, kind: PeriodKind) -> Report {
        self.generate_report_at(kind, Utc::now())
    }

    pub fn generate_report_at(&self, kind: PeriodKind, now: DateTime<Utc>) -> Report {
        self.observe_regulatory(now);
        let period = self.schedules.get(kind).last_completed(now);
        let id = period.report_id();

        if let Some(existing) = self.find_report(&id) {
            debug!(report_id = %id, "Report already generated");
            return existing;
        }

        let report = self.build_report(period, now, false);
        let mut ledger = self.ledger.lock();
        // Another caller may have generated it while the lock was released
        if let Some(existing) = ledger.pending_reports.iter().chain(ledger.archive.iter()).find(|r| r.id == id) {
            return existing.clone();
        }
        ledger.pending_reports.push(report.clone());
        metrics::counter!("adcomply_reports_generated_total", "kind" => kind.as_str()).increment(1);
        info!(
            report_id = %report.id,
            kind = kind.as_str(),
            alerts = report.alerts.len(),
            compliance_rate = report.summary.compliance_rate,
            stale_regulations = report.regulatory.stale,
            "Generated compliance report"
        );
        report
    }

    /// Deliver a generated report to its pending recipients.
    ///
    /// Cancellation leaves the current recipient pending and returns
    /// `Error::Cancelled`; calling again resumes from that recipient. A
    /// settled report is archived.
    pub async fn deliver_report(&self, report_id: &str, cancel: &CancellationToken) -> Result<Report> {
        let _delivery = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            guard = self.delivery.lock() => guard,
        };

        let report = match self.find_report(report_id) {
            Some(report) => report,
            None => return Err(Error::validation(format!("report {report_id} not found"))),
        };
        if self.ledger.lock().archive.iter().any(|r| r.id == report_id) {
            return Ok(report);
        }

        let notification = Notification {
            subject: report.subject.clone(),
            html: report.body.clone(),
            payload: report.payload(),
        };

        for recipient in report.pending_recipients() {
            let outcome = self.deliver_one(&recipient, &notification, cancel).await;
            let Some(status) = self.settle(&recipient, outcome, "report", report_id) else {
                info!(report_id, recipient = %recipient, "Report delivery cancelled, will resume");
                return Err(Error::Cancelled);
            };
            if let Some(report) = self.ledger.lock().pending_report_mut(report_id) {
                set_status(&mut report.deliveries, &recipient, status);
            }
        }

        self.archive_report(report_id, Utc::now())
    }

    /// Generate and deliver the report for the period ending at `due`
    pub async fn run_report(&self, kind: PeriodKind, due: DateTime<Utc>, cancel: &CancellationToken) -> Result<Report> {
        let report = self.generate_report_at(kind, due);
        self.deliver_report(&report.id, cancel).await
    }

    /// Resume deliveries interrupted earlier
    pub async fn resume_pending(&self, cancel: &CancellationToken) -> Result<()> {
        let pending: Vec<String> = self.ledger.lock().pending_reports.iter().map(|r| r.id.clone()).collect();
        for report_id in pending {
            self.deliver_report(&report_id, cancel).await?;
        }
        Ok(())
    }

    /// Generate and deliver reports at each scheduled trigger until cancelled
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!("Report scheduler started");
        loop {
            match self.resume_pending(&cancel).await {
                Err(Error::Cancelled) => break,
                Err(e) => warn!(error = %e, "Failed to resume report delivery"),
                Ok(()) => {}
            }

            let now = Utc::now();
            let Some((due, _)) = self.schedules.next_due(now) else {
                debug!("No report schedule configured");
                cancel.cancelled().await;
                break;
            };
            let wait = (due - now).to_std().unwrap_or_default();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            let kinds: Vec<PeriodKind> = self
                .schedules
                .configured()
                .filter(|schedule| schedule.period_containing(due).start == due)
                .map(|schedule| schedule.kind())
                .collect();
            for kind in kinds {
                match self.run_report(kind, due, &cancel).await {
                    Ok(report) => debug!(report_id = %report.id, "Scheduled report complete"),
                    Err(Error::Cancelled) => {
                        info!("Report scheduler stopped");
                        return;
                    }
                    Err(e) => error!(kind = kind.as_str(), error = %e, "Scheduled report failed"),
                }
            }
        }
        info!("Report scheduler stopped");
    }

    fn find_report(&self, report_id: &str) -> Option<Report> {
        let ledger = self.ledger.lock();
        ledger
            .pending_reports
            .iter()
            .chain(ledger.archive.iter())
            .find(|report| report.id == report_id)
            .cloned()
    }

    async fn deliver_one(
        &self,
        recipient: &str,
        notification: &Notification,
        cancel: &CancellationToken,
    ) -> RetryOutcome {
        send_with_retry(self.notifier.as_ref(), recipient, notification, &self.retry, cancel).await
    }

    /// Convert a retry outcome into a recorded status; `None` if cancelled
    fn settle(&self, recipient: &str, outcome: RetryOutcome, what: &'static str, id: &str) -> Option<DeliveryStatus> {
        let now = Utc::now();
        match outcome {
            RetryOutcome::Delivered { attempts } => {
                metrics::counter!("adcomply_notifications_total", "kind" => what, "outcome" => "delivered")
                    .increment(1);
                info!(recipient, kind = what, id, attempts, "Notification delivered");
                Some(DeliveryStatus::Delivered { at: now, attempts })
            }
            RetryOutcome::Failed { attempts, error } => {
                metrics::counter!("adcomply_notifications_total", "kind" => what, "outcome" => "failed")
                    .increment(1);
                self.ledger.lock().raise_incident(
                    IncidentKind::DeliveryFailure,
                    format!("{what} {id} to {recipient} failed permanently after {attempts} attempt(s): {error}"),
                    now,
                );
                Some(DeliveryStatus::Failed {
                    at: now,
                    attempts,
                    error: error.to_string(),
                })
            }
            RetryOutcome::Cancelled { .. } => None,
        }
    }

    fn archive_report(&self, report_id: &str, now: DateTime<Utc>) -> Result<Report> {
        let archiving_kind = self.schedules.archiving_kind();
        let mut ledger = self.ledger.lock();
        let position = ledger
            .pending_reports
            .iter()
            .position(|r| r.id == report_id)
            .ok_or_else(|| Error::internal(format!("report {report_id} missing at archive time")))?;
        let report = ledger.pending_reports.remove(position);
        let period_end = report.period_end;

        for record in ledger.verdicts.iter_mut().filter(|r| r.submitted_at < period_end) {
            if matches!(record.state, VerdictState::Violated | VerdictState::Alerted) {
                record.advance(VerdictState::Reported);
            }
        }

        if report.kind == archiving_kind {
            let (covered, remaining): (Vec<Alert>, Vec<Alert>) = std::mem::take(&mut ledger.alerts)
                .into_iter()
                .partition(|alert| alert.generated_at < period_end);
            ledger.alerts = remaining;
            for alert in covered {
                ledger.archive_alert(alert);
            }

            for record in ledger.verdicts.iter_mut().filter(|r| r.submitted_at < period_end) {
                if matches!(record.state, VerdictState::Passed | VerdictState::Reported) {
                    record.advance(VerdictState::Archived);
                }
            }
            ledger.verdicts.retain(|record| !record.state.is_terminal());
            ledger.incidents.retain(|incident| incident.raised_at >= period_end);
        }
        ledger.dedup.retain(|_, end| *end > now);

        if ledger.archive.len() >= MAX_ARCHIVED_REPORTS {
            ledger.archive.pop_front();
        }
        ledger.archive.push_back(report.clone());
        metrics::gauge!("adcomply_active_alerts").set(ledger.alerts.len() as f64);
        info!(report_id, kind = report.kind.as_str(), "Archived report");
        Ok(report)
    }

    fn build_report(&self, period: Period, now: DateTime<Utc>, preview: bool) -> Report {
        let (alerts, incidents, submitted, passed) = {
            let ledger = self.ledger.lock();
            let alerts: Vec<Alert> = ledger
                .archived_alerts
                .iter()
                .chain(ledger.alerts.iter())
                .filter(|alert| period.contains(alert.generated_at))
                .cloned()
                .collect();
            let incidents: Vec<Incident> = ledger
                .incidents
                .iter()
                .filter(|incident| period.contains(incident.raised_at))
                .cloned()
                .collect();
            let in_period = ledger.verdicts.iter().filter(|r| period.contains(r.submitted_at));
            let (submitted, passed) = in_period.fold((0usize, 0usize), |(s, p), r| (s + 1, p + usize::from(r.passed)));
            (alerts, incidents, submitted, passed)
        };
        let mut alerts = alerts;
        alerts.sort_by_key(|alert| alert.generated_at);

        let metrics = ReportMetrics::compute(&alerts, submitted, passed);
        let summary = ReportSummary {
            total_alerts: alerts.len(),
            resolved_alerts: alerts.iter().filter(|a| a.is_resolved()).count(),
            high_severity: alerts.iter().filter(|a| a.tier == SeverityTier::High).count(),
            compliance_rate: metrics.compliance_rate,
        };
        let regulatory = self
            .probe
            .as_ref()
            .map(|probe| RegulatoryDisclosure {
                stale: probe.is_stale(),
                staleness_secs: probe.staleness().as_secs(),
            })
            .unwrap_or_default();

        let id = period.report_id();
        let mut report = Report {
            subject: format!("Compliance Report {id}"),
            id,
            kind: period.kind,
            period_start: period.start,
            period_end: period.end,
            severity_distribution: severity_distribution(&alerts),
            alerts,
            summary,
            metrics,
            incidents,
            regulatory,
            generated_at: now,
            deliveries: if preview {
                Vec::new()
            } else {
                self.recipients.iter().map(RecipientDelivery::pending).collect()
            },
            preview,
            body: String::new(),
        };
        report.body = self.render_report(&report);
        report
    }

    fn render_report(&self, report: &Report) -> String {
        let alerts_html: String = report
            .alerts
            .iter()
            .map(|alert| {
                format!(
                    "<li>[{}] {} / {}: {}{}</li>\n",
                    alert.tier,
                    escape_html(&alert.artifact_id),
                    escape_html(&alert.rule_id),
                    escape_html(&alert.summary),
                    if alert.is_resolved() { " (resolved)" } else { "" }
                )
            })
            .collect();
        let incidents_html: String = report
            .incidents
            .iter()
            .map(|incident| {
                format!(
                    "<li>{} {}: {}</li>\n",
                    incident.raised_at.to_rfc3339(),
                    incident.kind.as_str(),
                    escape_html(&incident.message)
                )
            })
            .collect();

        let variables: HashMap<String, String> = [
            ("report_id", report.id.clone()),
            ("kind", report.kind.to_string()),
            ("period_start", report.period_start.to_rfc3339()),
            ("period_end", report.period_end.to_rfc3339()),
            ("total_alerts", report.summary.total_alerts.to_string()),
            ("resolved_alerts", report.summary.resolved_alerts.to_string()),
            ("high_severity", report.summary.high_severity.to_string()),
            ("compliance_rate", format!("{:.1}", report.metrics.compliance_rate)),
            ("resolution_rate", format!("{:.1}", report.metrics.resolution_rate)),
            ("avg_resolution_hours", format!("{:.1}", report.metrics.avg_resolution_hours)),
            ("regulatory_status", report.regulatory.describe()),
            ("generated_at", report.generated_at.to_rfc3339()),
            ("alerts_html", alerts_html),
            ("incidents_html", incidents_html),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        self.templates
            .render(REPORT_TEMPLATE, &variables)
            .unwrap_or_else(|e| {
                warn!(error = %e, "Report template failed, sending plain summary");
                format!("{}: {}", report.id, report.regulatory.describe())
            })
    }

    fn alert_notification(&self, alert: &Alert) -> Result<Notification> {
        let violations_html: String = alert
            .violations
            .iter()
            .map(|v| format!("<li>{}: {}</li>\n", v.source, escape_html(&v.reason)))
            .collect();
        let variables: HashMap<String, String> = [
            ("tier", alert.tier.to_string()),
            ("artifact_id", alert.artifact_id.clone()),
            ("rule_id", alert.rule_id.clone()),
            ("severity", format!("{:.2}", alert.severity)),
            ("generated_at", alert.generated_at.to_rfc3339()),
            ("summary", alert.summary.clone()),
            ("violations_html", violations_html),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Ok(Notification {
            subject: format!(
                "High Severity Compliance Alert: {} on {}",
                alert.rule_id, alert.artifact_id
            ),
            html: self.templates.render(ALERT_TEMPLATE, &variables)?,
            payload: serde_json::json!({
                "alert_id": alert.id,
                "artifact_id": alert.artifact_id,
                "rule_id": alert.rule_id,
                "summary": alert.summary,
                "severity": alert.severity,
                "tier": alert.tier,
                "timestamp": alert.generated_at,
            }),
        })
    }

    /// Raise one incident per staleness episode that exceeds its bound
    fn observe_regulatory(&self, now: DateTime<Utc>) {
        let Some(probe) = &self.probe else {
            return;
        };
        let alert = probe.staleness_alert();
        let stale = probe.is_stale();
        let mut ledger = self.ledger.lock();
        match alert {
            Some(message) if !ledger.stale_incident_open => {
                ledger.stale_incident_open = true;
                ledger.raise_incident(IncidentKind::RegulatoryStale, message, now);
            }
            None if !stale => ledger.stale_incident_open = false,
            _ => {}
        }
    }
}

fn set_status(deliveries: &mut [RecipientDelivery], recipient: &str, status: DeliveryStatus) {
    if let Some(delivery) = deliveries.iter_mut().find(|d| d.recipient == recipient) {
        delivery.status = status;
    }
}
