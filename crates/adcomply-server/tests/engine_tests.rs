//! End-to-end evaluation through the compliance engine

mod common;

use adcomply_core::{CampaignArtifact, Error, ModerationCategory, ViolationSource};
use adcomply_moderation::{ModerationAdapter, ModeratorConfig, UnscoredPolicy};
use adcomply_reporter::IncidentKind;
use common::{compliant, harness, FixedAdapter, HarnessOptions, RULES};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_compliant_artifact_passes() {
    let h = harness(HarnessOptions::default()).await;
    let verdict = h.engine.check(&compliant("ad-1"), &CancellationToken::new()).await.unwrap();

    assert!(verdict.passed);
    assert!(verdict.violations.is_empty());
    assert!(!verdict.needs_manual_review);
    assert_eq!(verdict.ruleset_version, 1);
    assert_eq!(verdict.regulation_version, 1);
    assert!(!verdict.regulations_stale);
    assert!(h.engine.reporter().active_alerts().is_empty());
}

#[tokio::test]
async fn test_rule1_violation_raises_and_dispatches_alert() {
    let h = harness(HarnessOptions::default()).await;
    let artifact = CampaignArtifact::new("ad-2", "google", "bad word here").with_budget(500.0, "USD");

    let verdict = h.engine.check(&artifact, &CancellationToken::new()).await.unwrap();
    assert!(!verdict.passed);
    assert!(verdict.violations.iter().all(|v| v.rule_id == "rule1"));
    assert!(verdict
        .violations
        .iter()
        .any(|v| v.reason.contains("missing required element: disclaimer")));

    let alerts = h.engine.reporter().active_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].rule_id, "rule1");

    // High alerts go out without waiting for a report
    tokio::time::sleep(Duration::from_millis(50)).await;
    let sent = h.notifier.sent.lock().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "compliance@example.com");
    assert_eq!(sent[0].1.payload["artifact_id"], "ad-2");
}

#[tokio::test]
async fn test_rule3_budget_out_of_range() {
    let h = harness(HarnessOptions::default()).await;
    let artifact = CampaignArtifact::new("ad-3", "google", common::COMPLIANT_TEXT).with_budget(50.0, "USD");

    let verdict = h.engine.check(&artifact, &CancellationToken::new()).await.unwrap();
    assert_eq!(verdict.violations.len(), 1);
    assert_eq!(verdict.violations[0].rule_id, "rule3");
    assert_eq!(verdict.violations[0].source, ViolationSource::Policy);
}

#[tokio::test]
async fn test_malformed_artifacts_rejected_without_alerts() {
    let h = harness(HarnessOptions::default()).await;
    let cancel = CancellationToken::new();

    let no_id = CampaignArtifact::new("", "google", common::COMPLIANT_TEXT);
    assert!(matches!(h.engine.check(&no_id, &cancel).await, Err(Error::Validation(_))));

    // rule3 constrains budgets on every platform
    let no_budget = CampaignArtifact::new("ad-4", "google", "bad word here");
    assert!(matches!(h.engine.check(&no_budget, &cancel).await, Err(Error::Validation(_))));

    assert!(h.engine.reporter().active_alerts().is_empty());
}

#[tokio::test]
async fn test_reevaluation_is_idempotent() {
    let h = harness(HarnessOptions::default()).await;
    let artifact = CampaignArtifact::new("ad-5", "google", "I hate this").with_budget(500.0, "USD");
    let cancel = CancellationToken::new();

    let first = h.engine.check(&artifact, &cancel).await.unwrap();
    let second = h.engine.check(&artifact, &cancel).await.unwrap();
    assert_eq!(first.violations, second.violations);
    assert_eq!(first.content_hash, second.content_hash);

    // The second submission falls in the same period and is deduplicated
    let rules: Vec<String> = first.violated_rule_ids().iter().map(|r| r.to_string()).collect();
    assert_eq!(h.engine.reporter().active_alerts().len(), rules.len());
}

#[tokio::test]
async fn test_merge_order_across_components() {
    let h = harness(HarnessOptions::default()).await;
    let artifact = CampaignArtifact::new("ad-6", "google", "I hate this")
        .with_budget(500.0, "USD")
        .with_region("eu");

    let verdict = h.engine.check(&artifact, &CancellationToken::new()).await.unwrap();
    let sources: Vec<ViolationSource> = verdict.violations.iter().map(|v| v.source).collect();
    let mut sorted = sources.clone();
    sorted.sort();
    assert_eq!(sources, sorted);

    assert!(sources.contains(&ViolationSource::Policy));
    assert!(verdict.violations.iter().any(|v| v.rule_id == "moderation.toxicity"));
    assert!(verdict.violations.iter().any(|v| v.rule_id == "eu-consent"));
}

#[tokio::test]
async fn test_unscored_category_flags_manual_review() {
    let adapters: Vec<Arc<dyn ModerationAdapter>> = vec![
        Arc::new(FixedAdapter::new(ModerationCategory::Toxicity, 0.1)),
        Arc::new(FixedAdapter::failing(ModerationCategory::Nsfw)),
    ];

    let flagging = harness(HarnessOptions {
        adapters: adapters.clone(),
        ..Default::default()
    })
    .await;
    let verdict = flagging
        .engine
        .check(&compliant("ad-7"), &CancellationToken::new())
        .await
        .unwrap();
    assert!(verdict.passed);
    assert!(verdict.needs_manual_review);
    assert_eq!(verdict.unscored_categories, vec![ModerationCategory::Nsfw]);

    let blocking = harness(HarnessOptions {
        adapters,
        moderator: ModeratorConfig {
            unscored_policy: UnscoredPolicy::Block,
            ..Default::default()
        },
        ..Default::default()
    })
    .await;
    let verdict = blocking
        .engine
        .check(&compliant("ad-7"), &CancellationToken::new())
        .await
        .unwrap();
    assert!(!verdict.passed);
    assert!(verdict.violations.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_evaluation_timeout() {
    let h = harness(HarnessOptions {
        adapters: vec![Arc::new(FixedAdapter::slow(ModerationCategory::Toxicity, Duration::from_secs(10))) as _],
        evaluation_timeout: Duration::from_secs(1),
        ..Default::default()
    })
    .await;

    let artifact = CampaignArtifact::new("ad-8", "google", "bad word here").with_budget(500.0, "USD");
    let result = h.engine.check(&artifact, &CancellationToken::new()).await;
    assert!(matches!(result, Err(Error::Timeout)));
    assert!(h.engine.reporter().active_alerts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_leaves_no_alerts() {
    let h = harness(HarnessOptions {
        adapters: vec![Arc::new(FixedAdapter::slow(ModerationCategory::Toxicity, Duration::from_secs(3))) as _],
        ..Default::default()
    })
    .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let artifact = CampaignArtifact::new("ad-9", "google", "bad word here").with_budget(500.0, "USD");
    assert!(matches!(h.engine.check(&artifact, &cancel).await, Err(Error::Cancelled)));
    assert!(h.engine.reporter().active_alerts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stale_regulations_are_flagged() {
    let h = harness(HarnessOptions::default()).await;
    h.regulations.set_failing(true);
    // Past the default one-day incident bound
    tokio::time::advance(Duration::from_secs(86_401)).await;
    assert!(h.engine.regulatory().refresh().await.is_err());

    let artifact = compliant("ad-10").with_region("EU").with_metadata("consent", "granted");
    let verdict = h.engine.check(&artifact, &CancellationToken::new()).await.unwrap();
    assert!(verdict.passed);
    assert!(verdict.regulations_stale);
    // The last good snapshot keeps serving
    assert_eq!(verdict.regulation_version, 1);

    let stale = h
        .engine
        .reporter()
        .incidents()
        .iter()
        .filter(|i| i.kind == IncidentKind::RegulatoryStale)
        .count();
    assert_eq!(stale, 1);
}

#[tokio::test]
async fn test_batch_results_follow_input_order() {
    let h = harness(HarnessOptions::default()).await;
    let artifacts = vec![
        compliant("ad-a"),
        CampaignArtifact::new("ad-b", "", common::COMPLIANT_TEXT),
        CampaignArtifact::new("ad-c", "google", "We hate queues, disclaimer applies").with_budget(500.0, "USD"),
    ];

    let results = h.engine.check_batch(&artifacts, &CancellationToken::new()).await.unwrap();
    assert_eq!(results.len(), 3);

    let first = results[0].as_ref().unwrap();
    assert_eq!(first.artifact_id, "ad-a");
    assert!(first.passed);

    assert!(matches!(results[1], Err(Error::Validation(_))));

    let third = results[2].as_ref().unwrap();
    assert_eq!(third.artifact_id, "ad-c");
    assert_eq!(third.violations.len(), 1);
    assert_eq!(third.violations[0].rule_id, "moderation.toxicity");
}

#[tokio::test]
async fn test_failed_reload_keeps_previous_rules() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    file.write_all(RULES.as_bytes()).unwrap();
    file.flush().unwrap();

    let h = harness(HarnessOptions {
        rules_file: Some(file.path().to_path_buf()),
        ..Default::default()
    })
    .await;
    assert_eq!(h.engine.rule_store().version(), 1);

    std::fs::write(file.path(), "{ not json").unwrap();
    assert!(matches!(h.engine.reload_rules().await, Err(Error::RuleLoad(_))));
    assert_eq!(h.engine.rule_store().version(), 1);

    let verdict = h.engine.check(&compliant("ad-11"), &CancellationToken::new()).await.unwrap();
    assert_eq!(verdict.ruleset_version, 1);

    std::fs::write(file.path(), RULES).unwrap();
    assert_eq!(h.engine.reload_rules().await.unwrap(), 2);
}
