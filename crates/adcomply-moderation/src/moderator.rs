//! Content moderator
//!
//! Fans an artifact out to every registered adapter, caches each score by
//! (category, model version, moderation hash), and turns scores at or above
//! the category threshold into violations. Adapter failures never pass
//! silently: the category is reported as unscored.

use crate::adapter::ModerationAdapter;
use crate::config::{ModeratorConfig, UnscoredPolicy};
use crate::registry::AdapterRegistry;
use adcomply_core::{
    Cache, CampaignArtifact, ModerationCategory, ModerationScore, Result, Violation, ViolationSource,
};
use futures::future::join_all;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Scores, violations and gaps for one artifact
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModerationOutcome {
    /// Scores for every category that was evaluated
    pub scores: Vec<ModerationScore>,

    /// One violation per actionable score
    pub violations: Vec<Violation>,

    /// Categories whose adapter failed
    pub unscored: Vec<ModerationCategory>,
}

impl ModerationOutcome {
    pub fn needs_manual_review(&self) -> bool {
        !self.unscored.is_empty()
    }

    /// Whether unscored categories fail the verdict under `policy`
    pub fn blocks(&self, policy: UnscoredPolicy) -> bool {
        policy == UnscoredPolicy::Block && self.needs_manual_review()
    }
}

/// Moderates artifacts with the registered adapters
pub struct ContentModerator {
    registry: AdapterRegistry,
    config: ModeratorConfig,
    cache: Cache<f32>,
    cache_ttl: Duration,
}

impl ContentModerator {
    pub fn new(registry: AdapterRegistry, config: ModeratorConfig) -> Self {
        Self {
            cache: Cache::with_enabled("moderation", config.cache_enabled),
            cache_ttl: Duration::from_secs(config.cache_ttl),
            registry,
            config,
        }
    }

    /// Build adapters from configuration
    pub fn from_config(config: ModeratorConfig) -> Result<Self> {
        config.validate()?;
        let registry = AdapterRegistry::from_config(&config)?;
        Ok(Self::new(registry, config))
    }

    pub fn config(&self) -> &ModeratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn unscored_policy(&self) -> UnscoredPolicy {
        self.config.unscored_policy
    }

    /// Score every applicable category concurrently.
    ///
    /// Returns the scores plus the categories whose adapter failed.
    pub async fn score(&self, artifact: &CampaignArtifact) -> (Vec<ModerationScore>, Vec<ModerationCategory>) {
        let moderation_hash = artifact.moderation_hash();
        let applicable: Vec<&dyn ModerationAdapter> = self
            .registry
            .iter()
            .map(|adapter| &**adapter)
            .filter(|adapter| applies(*adapter, artifact))
            .collect();

        let results = join_all(
            applicable
                .iter()
                .map(|adapter| self.score_category(*adapter, artifact, &moderation_hash)),
        )
        .await;

        let mut scores = Vec::new();
        let mut unscored = Vec::new();
        for (adapter, result) in applicable.iter().zip(results) {
            match result {
                Ok(confidence) => scores.push(ModerationScore::new(
                    adapter.category(),
                    confidence,
                    adapter.model_version(),
                )),
                Err(e) => {
                    warn!(
                        artifact_id = %artifact.id,
                        component = "content_moderator",
                        category = %adapter.category(),
                        error = %e,
                        "Moderation adapter failed, category unscored"
                    );
                    metrics::counter!("adcomply_moderation_unscored_total", "category" => adapter.category().as_str())
                        .increment(1);
                    unscored.push(adapter.category());
                }
            }
        }
        (scores, unscored)
    }

    /// Score and convert actionable scores into violations
    pub async fn moderate(&self, artifact: &CampaignArtifact) -> ModerationOutcome {
        let (scores, unscored) = self.score(artifact).await;
        self.outcome(artifact, scores, unscored)
    }

    /// Moderate several artifacts, sending only cache misses to adapters in
    /// chunks of at most `batch_size`. Outcomes follow input order.
    pub async fn moderate_batch(&self, artifacts: &[CampaignArtifact]) -> Vec<ModerationOutcome> {
        let hashes: Vec<String> = artifacts.iter().map(|a| a.moderation_hash()).collect();
        let mut scores: Vec<Vec<ModerationScore>> = vec![Vec::new(); artifacts.len()];
        let mut unscored: Vec<Vec<ModerationCategory>> = vec![Vec::new(); artifacts.len()];

        for adapter in self.registry.iter() {
            let category = adapter.category();
            let version = adapter.model_version();
            let mut misses = Vec::new();

            for (index, artifact) in artifacts.iter().enumerate() {
                if !applies(&**adapter, artifact) {
                    continue;
                }
                let key = cache_key(category, version, &hashes[index]);
                match self.cache.peek(&key) {
                    Some(confidence) => scores[index].push(ModerationScore::new(category, confidence, version)),
                    None => misses.push(index),
                }
            }

            for chunk in misses.chunks(self.config.batch_size.max(1)) {
                let batch: Vec<&CampaignArtifact> = chunk.iter().map(|&i| &artifacts[i]).collect();
                let started = Instant::now();
                let result = adapter.score_batch(&batch).await;
                record_latency(category, started);

                match result {
                    Ok(values) if values.len() == chunk.len() => {
                        for (&index, confidence) in chunk.iter().zip(values) {
                            let key = cache_key(category, version, &hashes[index]);
                            self.cache.insert(&key, confidence, self.cache_ttl);
                            scores[index].push(ModerationScore::new(category, confidence, version));
                        }
                    }
                    Ok(values) => {
                        warn!(
                            component = "content_moderator",
                            category = %category,
                            expected = chunk.len(),
                            got = values.len(),
                            "Adapter returned a short batch, chunk unscored"
                        );
                        chunk.iter().for_each(|&i| unscored[i].push(category));
                    }
                    Err(e) => {
                        warn!(
                            component = "content_moderator",
                            category = %category,
                            batch = chunk.len(),
                            error = %e,
                            "Batch moderation failed, chunk unscored"
                        );
                        chunk.iter().for_each(|&i| unscored[i].push(category));
                    }
                }
            }
        }

        artifacts
            .iter()
            .zip(scores.into_iter().zip(unscored))
            .map(|(artifact, (scores, unscored))| self.outcome(artifact, scores, unscored))
            .collect()
    }

    async fn score_category(
        &self,
        adapter: &dyn ModerationAdapter,
        artifact: &CampaignArtifact,
        moderation_hash: &str,
    ) -> Result<f32> {
        let category = adapter.category();
        let key = cache_key(category, adapter.model_version(), moderation_hash);
        self.cache
            .get_or_compute(&key, self.cache_ttl, move || async move {
                let started = Instant::now();
                let result = adapter.score(artifact).await;
                record_latency(category, started);
                result
            })
            .await
    }

    fn outcome(
        &self,
        artifact: &CampaignArtifact,
        mut scores: Vec<ModerationScore>,
        mut unscored: Vec<ModerationCategory>,
    ) -> ModerationOutcome {
        scores.sort_by_key(|s| s.category);
        unscored.sort();

        let violations: Vec<Violation> = scores
            .iter()
            .filter_map(|score| {
                let threshold = self.config.threshold_for(score.category);
                score.is_actionable(threshold).then(|| {
                    Violation::new(
                        ViolationSource::Moderation,
                        format!("moderation.{}", score.category),
                        f64::from(score.confidence),
                        format!(
                            "{} confidence {:.2} at or above threshold {:.2} ({})",
                            score.category, score.confidence, threshold, score.model_version
                        ),
                    )
                    .with_category(score.category.as_str())
                })
            })
            .collect();

        if !violations.is_empty() {
            metrics::counter!("adcomply_violations_total", "source" => "moderation")
                .increment(violations.len() as u64);
        }
        debug!(
            artifact_id = %artifact.id,
            scored = scores.len(),
            violations = violations.len(),
            unscored = unscored.len(),
            "Moderation complete"
        );

        ModerationOutcome {
            scores,
            violations,
            unscored,
        }
    }
}

fn applies(adapter: &dyn ModerationAdapter, artifact: &CampaignArtifact) -> bool {
    !adapter.requires_image() || artifact.image.is_some()
}

fn cache_key(category: ModerationCategory, model_version: &str, moderation_hash: &str) -> String {
    format!("mod:{}:{}:{}", category, model_version, moderation_hash)
}

fn record_latency(category: ModerationCategory, started: Instant) {
    metrics::histogram!("adcomply_moderation_latency_us", "category" => category.as_str())
        .record(started.elapsed().as_micros() as f64);
}
