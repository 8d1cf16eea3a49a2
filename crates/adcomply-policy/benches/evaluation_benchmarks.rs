//! Policy evaluation latency
//!
//! Run with: cargo bench -p adcomply-policy

use adcomply_core::{CampaignArtifact, ImageRef};
use adcomply_policy::{evaluate_rules, PolicyChecker, PolicyCheckerConfig, RuleFile, RuleSet, RuleStore};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tokio::runtime::Runtime;

const DEFAULT_RULES: &str = include_str!("../../../rules/default_rules.json");

fn artifacts() -> Vec<(&'static str, CampaignArtifact)> {
    let image = ImageRef {
        uri: "s3://creatives/hero.png".to_string(),
        width: 1200,
        height: 628,
        size_kb: 240,
        format: "png".to_string(),
        labels: Vec::new(),
    };
    vec![
        (
            "short_clean",
            CampaignArtifact::new("a", "google", "Spring sale, disclaimer applies").with_budget(500.0, "USD"),
        ),
        (
            "short_violating",
            CampaignArtifact::new("b", "google", "bad word here").with_budget(50.0, "USD"),
        ),
        (
            "long_with_image",
            CampaignArtifact::new("c", "facebook", "Limited offer. ".repeat(40) + "disclaimer")
                .with_image(image)
                .with_budget(2500.0, "USD"),
        ),
    ]
}

fn benchmark_evaluate_rules(c: &mut Criterion) {
    let set = RuleSet::compile(RuleFile::from_json(DEFAULT_RULES).unwrap().rules, 1).unwrap();

    let mut group = c.benchmark_group("Policy_Evaluate_Uncached");
    group.sample_size(100);
    for (name, artifact) in artifacts() {
        group.bench_with_input(BenchmarkId::new("evaluate_rules", name), &artifact, |b, artifact| {
            b.iter(|| evaluate_rules(black_box(artifact), &set).unwrap())
        });
    }
    group.finish();
}

fn benchmark_cached_checker(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = Arc::new(RuleStore::new());
    store
        .publish(RuleFile::from_json(DEFAULT_RULES).unwrap().rules)
        .unwrap();
    let checker = PolicyChecker::new(store, &PolicyCheckerConfig::default());

    let mut group = c.benchmark_group("Policy_Check_Cached");
    group.sample_size(100);
    for (name, artifact) in artifacts() {
        group.bench_with_input(BenchmarkId::new("check", name), &artifact, |b, artifact| {
            b.iter(|| rt.block_on(async { checker.check(black_box(artifact)).await.unwrap() }))
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_evaluate_rules, benchmark_cached_checker);
criterion_main!(benches);
