//! Alert raising, deduplication and report generation


use adcomply_core::ViolationSource;
use adcomply_reporter::{
    ComplianceReporter, IncidentKind, PeriodKind, RegulatoryProbe, ReportScheduleConfig, ReporterConfig, RetryPolicy,
    SeverityTier, VerdictState,
};
use mock_notifier::{at, verdict, violation, MockNotifier};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn reporter_with(config: ReporterConfig) -> ComplianceReporter {
    ComplianceReporter::new(&config, Arc::new(MockNotifier::new()), RetryPolicy::default()).unwrap()
}

fn reporter() -> ComplianceReporter {
    reporter_with(ReporterConfig::default())
}

#[test]
fn test_medium_boundary_is_inclusive() {
    let reporter = reporter();

    let exact = verdict("ad-1", vec![violation(ViolationSource::Policy, "rule1", 0.5)]);
    let outcome = reporter.submit_at(&exact, at(2024, 6, 12, 10, 0));
    assert_eq!(outcome.tier, Some(SeverityTier::Medium));
    assert_eq!(outcome.alerts.len(), 1);
    assert_eq!(outcome.state, VerdictState::Alerted);

    let below = verdict("ad-2", vec![violation(ViolationSource::Policy, "rule1", 0.49)]);
    let outcome = reporter.submit_at(&below, at(2024, 6, 12, 10, 0));
    assert_eq!(outcome.tier, None);
    assert!(outcome.alerts.is_empty());
    assert_eq!(outcome.state, VerdictState::Violated);
}

#[test]
fn test_high_alert_carries_pending_deliveries() {
    let reporter = reporter_with(ReporterConfig {
        alert_recipients: vec!["ops@example.com".to_string()],
        ..Default::default()
    });
    let v = verdict("ad-1", vec![violation(ViolationSource::Regulatory, "eu-consent", 1.0)]);
    let outcome = reporter.submit_at(&v, at(2024, 6, 12, 10, 0));
    assert_eq!(outcome.tier, Some(SeverityTier::High));
    assert_eq!(outcome.alerts[0].deliveries.len(), 1);
    assert!(outcome.alerts[0].deliveries[0].status.is_pending());
}

#[test]
fn test_resubmission_in_same_period_is_deduplicated() {
    let reporter = reporter();
    let v = verdict("ad-1", vec![violation(ViolationSource::Policy, "rule1", 1.0)]);

    assert_eq!(reporter.submit_at(&v, at(2024, 6, 12, 9, 0)).alerts.len(), 1);
    assert!(reporter.submit_at(&v, at(2024, 6, 12, 18, 0)).alerts.is_empty());
    assert_eq!(reporter.active_alerts().len(), 1);

    // The next daily period allows a fresh alert
    assert_eq!(reporter.submit_at(&v, at(2024, 6, 13, 0, 0)).alerts.len(), 1);
    assert_eq!(reporter.active_alerts().len(), 2);
}

#[test]
fn test_one_alert_per_violated_rule() {
    let reporter = reporter();
    let v = verdict(
        "ad-1",
        vec![
            violation(ViolationSource::Policy, "rule1", 1.0),
            violation(ViolationSource::Policy, "rule1", 0.5),
            violation(ViolationSource::Policy, "rule3", 1.0),
        ],
    );
    let outcome = reporter.submit_at(&v, at(2024, 6, 12, 10, 0));
    assert!((outcome.severity - 2.5).abs() < 1e-9);

    let rules: Vec<&str> = outcome.alerts.iter().map(|a| a.rule_id.as_str()).collect();
    assert_eq!(rules, vec!["rule1", "rule3"]);
    assert_eq!(outcome.alerts[0].violations.len(), 2);
    assert!(outcome.alerts.iter().all(|a| a.tier == SeverityTier::High));
}

#[test]
fn test_low_alerts_recorded_only_when_enabled() {
    let v = verdict("ad-1", vec![violation(ViolationSource::Moderation, "moderation.sentiment", 0.2)]);

    assert!(reporter().submit_at(&v, at(2024, 6, 12, 10, 0)).alerts.is_empty());

    let recording = reporter_with(ReporterConfig {
        record_low_alerts: true,
        ..Default::default()
    });
    let outcome = recording.submit_at(&v, at(2024, 6, 12, 10, 0));
    assert_eq!(outcome.alerts.len(), 1);
    assert_eq!(outcome.alerts[0].tier, SeverityTier::Low);
    assert!(outcome.alerts[0].deliveries.is_empty());
}

#[test]
fn test_resolve_alert() {
    let reporter = reporter();
    let v = verdict("ad-1", vec![violation(ViolationSource::Policy, "rule1", 1.0)]);
    let alert = reporter.submit_at(&v, at(2024, 6, 12, 10, 0)).alerts.remove(0);

    let resolved = reporter.resolve_alert(&alert.id, "Copy updated").unwrap();
    assert!(resolved.is_resolved());
    assert_eq!(resolved.resolution_notes.as_deref(), Some("Copy updated"));
    assert!(reporter.resolve_alert("ALT_missing", "n/a").is_none());
}

#[test]
fn test_daily_report_contents() {
    let reporter = reporter();
    let day = |h| at(2024, 6, 12, h, 0);

    reporter.submit_at(&verdict("ad-1", vec![violation(ViolationSource::Policy, "rule1", 1.0)]), day(9));
    reporter.submit_at(&verdict("ad-2", vec![violation(ViolationSource::Policy, "rule2", 0.5)]), day(10));
    reporter.submit_at(&verdict("ad-3", Vec::new()), day(11));
    reporter.submit_at(&verdict("ad-4", Vec::new()), day(12));
    // Outside the period
    reporter.submit_at(&verdict("ad-5", vec![violation(ViolationSource::Policy, "rule1", 1.0)]), at(2024, 6, 13, 1, 0));

    let report = reporter.generate_report_at(PeriodKind::Daily, at(2024, 6, 13, 0, 0));
    assert_eq!(report.id, "REP_20240612_20240613");
    assert!(!report.preview);
    assert_eq!(report.summary.total_alerts, 2);
    assert_eq!(report.summary.high_severity, 1);
    assert_eq!(report.severity_distribution["medium"], 1);
    assert!((report.summary.compliance_rate - 50.0).abs() < 1e-9);
    assert_eq!(report.metrics.verdicts_submitted, 4);
    assert!(report.body.contains("REP_20240612_20240613"));
    assert!(report.body.contains("ad-1"));
    assert!(report.alerts.windows(2).all(|w| w[0].generated_at <= w[1].generated_at));

    // Generating the same period again returns the stored report
    let again = reporter.generate_report_at(PeriodKind::Daily, at(2024, 6, 13, 5, 0));
    assert_eq!(again.generated_at, report.generated_at);
}

#[test]
fn test_get_report_previews_open_period() {
    let reporter = reporter();
    reporter.submit_at(
        &verdict("ad-1", vec![violation(ViolationSource::Policy, "rule1", 1.0)]),
        at(2024, 6, 12, 9, 0),
    );

    let preview = reporter.get_report_at(PeriodKind::Weekly, at(2024, 6, 12, 12, 0));
    assert!(preview.preview);
    assert!(preview.deliveries.is_empty());
    assert_eq!(preview.id, "REP_20240610_20240617");
    assert_eq!(preview.summary.total_alerts, 1);

    let generated = reporter.generate_report_at(PeriodKind::Weekly, at(2024, 6, 17, 0, 0));
    let fetched = reporter.get_report_at(PeriodKind::Weekly, at(2024, 6, 18, 0, 0));
    assert_eq!(fetched.id, generated.id);
    assert!(!fetched.preview);
}

struct StaleProbe {
    stale: AtomicBool,
}

impl RegulatoryProbe for StaleProbe {
    fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    fn staleness(&self) -> Duration {
        if self.is_stale() {
            Duration::from_secs(90_000)
        } else {
            Duration::from_secs(10)
        }
    }

    fn staleness_alert(&self) -> Option<String> {
        self.is_stale().then(|| "regulations stale for 90000s".to_string())
    }
}

#[test]
fn test_regulatory_staleness_disclosed_and_raised_once() {
    let probe = Arc::new(StaleProbe {
        stale: AtomicBool::new(true),
    });
    let reporter = reporter().with_regulatory_probe(probe.clone());
    let v = verdict("ad-1", Vec::new());

    reporter.submit_at(&v, at(2024, 6, 12, 9, 0));
    reporter.submit_at(&v, at(2024, 6, 12, 10, 0));
    let stale_incidents = |r: &ComplianceReporter| {
        r.incidents()
            .iter()
            .filter(|i| i.kind == IncidentKind::RegulatoryStale)
            .count()
    };
    assert_eq!(stale_incidents(&reporter), 1);

    let report = reporter.generate_report_at(PeriodKind::Daily, at(2024, 6, 13, 0, 0));
    assert!(report.regulatory.stale);
    assert_eq!(report.regulatory.staleness_secs, 90_000);
    assert_eq!(report.incidents.len(), 1);
    assert!(report.body.contains("stale"));

    // Recovery closes the episode; the next one raises a new incident
    probe.stale.store(false, Ordering::SeqCst);
    reporter.submit_at(&v, at(2024, 6, 13, 9, 0));
    probe.stale.store(true, Ordering::SeqCst);
    reporter.submit_at(&v, at(2024, 6, 13, 10, 0));
    assert_eq!(stale_incidents(&reporter), 2);
}

#[test]
fn test_bookkeeping_ages_out_without_reports() {
    let reporter = reporter_with(ReporterConfig {
        report_schedule: ReportScheduleConfig { daily: None, weekly: None },
        ..Default::default()
    });
    let start = at(2024, 1, 1, 0, 0);
    for hour in 0..2000 {
        let v = verdict(
            &format!("ad-{hour}"),
            vec![violation(ViolationSource::Policy, "rule1", 1.0)],
        );
        reporter.submit_at(&v, start + chrono::Duration::hours(hour));
    }

    let stats = reporter.ledger_stats();
    // Only keys of the open daily period can still deduplicate
    assert!(stats.dedup_keys <= 24, "dedup keys: {}", stats.dedup_keys);
    // At most the last completed week plus the open one stay live
    assert!(stats.verdicts <= 14 * 24, "verdicts: {}", stats.verdicts);
    assert!(stats.active_alerts <= 14 * 24, "alerts: {}", stats.active_alerts);
    assert_eq!(stats.active_alerts + stats.archived_alerts, 2000);
}
