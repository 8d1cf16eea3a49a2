//! Moderator behaviour with mock adapters
//!
//! Mock adapters count calls, simulate latency and fail on demand so the
//! caching, batching and unscored paths can be observed directly.

use adcomply_core::{CampaignArtifact, Error, ImageRef, ModerationCategory, Result};
use adcomply_moderation::{
    AdapterRegistry, ContentModerator, ModerationAdapter, ModeratorConfig, UnscoredPolicy,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A configurable mock adapter
struct MockAdapter {
    category: ModerationCategory,
    score: f32,
    fail: bool,
    requires_image: bool,
    latency: Option<Duration>,
    calls: AtomicU32,
    batch_calls: AtomicU32,
    max_batch_seen: AtomicU32,
}

impl MockAdapter {
    fn new(category: ModerationCategory, score: f32) -> Self {
        Self {
            category,
            score,
            fail: false,
            requires_image: false,
            latency: None,
            calls: AtomicU32::new(0),
            batch_calls: AtomicU32::new(0),
            max_batch_seen: AtomicU32::new(0),
        }
    }

    fn failing(category: ModerationCategory) -> Self {
        Self {
            fail: true,
            ..Self::new(category, 0.0)
        }
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn image_only(mut self) -> Self {
        self.requires_image = true;
        self
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModerationAdapter for MockAdapter {
    async fn score(&self, artifact: &CampaignArtifact) -> Result<f32> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail {
            return Err(Error::model_unavailable(self.category.as_str(), "connection refused"));
        }
        // Dynamic scoring based on text content
        if artifact.text.contains("UNSAFE") {
            Ok(0.95)
        } else {
            Ok(self.score)
        }
    }

    async fn score_batch(&self, artifacts: &[&CampaignArtifact]) -> Result<Vec<f32>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.max_batch_seen.fetch_max(artifacts.len() as u32, Ordering::SeqCst);
        let mut scores = Vec::new();
        for artifact in artifacts {
            scores.push(self.score(artifact).await?);
        }
        Ok(scores)
    }

    fn category(&self) -> ModerationCategory {
        self.category
    }

    fn model_version(&self) -> &str {
        "mock-v1"
    }

    fn requires_image(&self) -> bool {
        self.requires_image
    }
}

fn moderator(adapters: Vec<Arc<MockAdapter>>, config: ModeratorConfig) -> ContentModerator {
    let registry = adapters
        .into_iter()
        .fold(AdapterRegistry::new(), |registry, adapter| registry.with_adapter(adapter));
    ContentModerator::new(registry, config)
}

fn artifact(id: &str, text: &str) -> CampaignArtifact {
    CampaignArtifact::new(id, "facebook", text)
}

#[tokio::test]
async fn test_threshold_is_inclusive() {
    let toxicity = Arc::new(MockAdapter::new(ModerationCategory::Toxicity, 0.7));
    let sentiment = Arc::new(MockAdapter::new(ModerationCategory::Sentiment, 0.69));
    let moderator = moderator(vec![toxicity, sentiment], ModeratorConfig::default());

    let outcome = moderator.moderate(&artifact("a", "copy")).await;
    assert_eq!(outcome.scores.len(), 2);
    assert_eq!(outcome.violations.len(), 1);
    assert_eq!(outcome.violations[0].rule_id, "moderation.toxicity");
    assert!((outcome.violations[0].severity - 0.7).abs() < 1e-6);
}

#[tokio::test]
async fn test_per_category_threshold_override() {
    let nsfw = Arc::new(MockAdapter::new(ModerationCategory::Nsfw, 0.5));
    let mut config = ModeratorConfig::default();
    config.thresholds.insert("nsfw".to_string(), 0.4);
    let moderator = moderator(vec![nsfw], config);

    let outcome = moderator.moderate(&artifact("a", "copy")).await;
    assert_eq!(outcome.violations.len(), 1);
}

#[tokio::test]
async fn test_failed_adapter_marks_category_unscored() {
    let toxicity = Arc::new(MockAdapter::failing(ModerationCategory::Toxicity));
    let sentiment = Arc::new(MockAdapter::new(ModerationCategory::Sentiment, 0.1));
    let moderator = moderator(vec![toxicity, sentiment], ModeratorConfig::default());

    let outcome = moderator.moderate(&artifact("a", "copy")).await;
    assert_eq!(outcome.unscored, vec![ModerationCategory::Toxicity]);
    assert!(outcome.needs_manual_review());
    assert!(!outcome.blocks(UnscoredPolicy::Flag));
    assert!(outcome.blocks(UnscoredPolicy::Block));
    assert!(outcome.violations.is_empty());
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    let toxicity = Arc::new(MockAdapter::failing(ModerationCategory::Toxicity));
    let moderator = moderator(vec![Arc::clone(&toxicity)], ModeratorConfig::default());

    moderator.moderate(&artifact("a", "copy")).await;
    moderator.moderate(&artifact("a", "copy")).await;
    assert_eq!(toxicity.calls(), 2);
}

#[tokio::test]
async fn test_scores_cached_by_content() {
    let toxicity = Arc::new(MockAdapter::new(ModerationCategory::Toxicity, 0.2));
    let moderator = moderator(vec![Arc::clone(&toxicity)], ModeratorConfig::default());

    // Different ids and targeting, same text: one inference
    moderator.moderate(&artifact("a", "same copy")).await;
    moderator
        .moderate(&CampaignArtifact::new("b", "tiktok", "same copy").with_region("EU"))
        .await;
    assert_eq!(toxicity.calls(), 1);

    moderator.moderate(&artifact("c", "other copy")).await;
    assert_eq!(toxicity.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicates_share_one_inference() {
    let toxicity = Arc::new(
        MockAdapter::new(ModerationCategory::Toxicity, 0.3).with_latency(Duration::from_millis(50)),
    );
    let moderator = Arc::new(moderator(vec![Arc::clone(&toxicity)], ModeratorConfig::default()));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let moderator = Arc::clone(&moderator);
            tokio::spawn(async move { moderator.moderate(&artifact(&format!("dup-{i}"), "dup copy")).await })
        })
        .collect();
    for handle in handles {
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.scores.len(), 1);
    }
    assert_eq!(toxicity.calls(), 1);
}

#[tokio::test]
async fn test_image_only_adapter_skipped_without_image() {
    let objects = Arc::new(MockAdapter::new(ModerationCategory::ObjectDetection, 0.9).image_only());
    let moderator = moderator(vec![Arc::clone(&objects)], ModeratorConfig::default());

    let outcome = moderator.moderate(&artifact("a", "copy")).await;
    assert!(outcome.scores.is_empty());
    assert!(outcome.unscored.is_empty());
    assert_eq!(objects.calls(), 0);

    let with_image = artifact("b", "copy").with_image(ImageRef {
        uri: "s3://x.png".to_string(),
        width: 10,
        height: 10,
        size_kb: 1,
        format: "png".to_string(),
        labels: Vec::new(),
    });
    let outcome = moderator.moderate(&with_image).await;
    assert_eq!(outcome.violations.len(), 1);
}

#[tokio::test]
async fn test_batch_respects_batch_size_and_cache() {
    let toxicity = Arc::new(MockAdapter::new(ModerationCategory::Toxicity, 0.1));
    let config = ModeratorConfig {
        batch_size: 3,
        ..ModeratorConfig::default()
    };
    let moderator = moderator(vec![Arc::clone(&toxicity)], config);

    // Warm one entry through the single-artifact path
    moderator.moderate(&artifact("warm", "copy 0")).await;

    let artifacts: Vec<_> = (0..7).map(|i| artifact(&format!("a{i}"), &format!("copy {i}"))).collect();
    let outcomes = moderator.moderate_batch(&artifacts).await;

    assert_eq!(outcomes.len(), 7);
    assert!(outcomes.iter().all(|o| o.scores.len() == 1));
    // 6 misses in chunks of at most 3
    assert_eq!(toxicity.batch_calls.load(Ordering::SeqCst), 2);
    assert_eq!(toxicity.max_batch_seen.load(Ordering::SeqCst), 3);
    assert_eq!(toxicity.calls(), 1 + 6);

    let flagged = moderator.moderate_batch(&[artifact("x", "UNSAFE copy")]).await;
    assert_eq!(flagged[0].violations.len(), 1);
}

#[tokio::test]
async fn test_batch_failure_marks_chunk_unscored() {
    let toxicity = Arc::new(MockAdapter::failing(ModerationCategory::Toxicity));
    let moderator = moderator(vec![toxicity], ModeratorConfig::default());

    let outcomes = moderator
        .moderate_batch(&[artifact("a", "one"), artifact("b", "two")])
        .await;
    assert!(outcomes.iter().all(|o| o.unscored == vec![ModerationCategory::Toxicity]));
}
