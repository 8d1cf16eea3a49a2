//! Static rule evaluation

use adcomply_core::{Cache, CampaignArtifact, Error, Result, Violation, ViolationSource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::rule::{CompiledRule, RuleSet};
use crate::store::RuleStore;

/// Severity of regex, required-element and budget violations
pub const SEVERITY_HIGH: f64 = 1.0;

/// Severity of prohibited-word, length and image violations
pub const SEVERITY_MEDIUM: f64 = 0.5;

/// `policy_checker` configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyCheckerConfig {
    /// Rule source (JSON or YAML)
    #[serde(default)]
    pub rules_file: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Cache TTL in seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,

    /// Severity normalisation denominator
    #[serde(default = "default_baseline_volume")]
    pub baseline_volume: f64,
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_baseline_volume() -> f64 {
    1.0
}

impl Default for PolicyCheckerConfig {
    fn default() -> Self {
        Self {
            rules_file: None,
            cache_enabled: true,
            cache_ttl: default_cache_ttl(),
            baseline_volume: default_baseline_volume(),
        }
    }
}

/// Evaluates artifacts against the published rule set
pub struct PolicyChecker {
    store: Arc<RuleStore>,
    cache: Cache<Arc<Vec<Violation>>>,
    cache_ttl: Duration,
}

impl PolicyChecker {
    pub fn new(store: Arc<RuleStore>, config: &PolicyCheckerConfig) -> Self {
        Self {
            store,
            cache: Cache::with_enabled("policy", config.cache_enabled),
            cache_ttl: Duration::from_secs(config.cache_ttl),
        }
    }

    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    /// Evaluate against the current snapshot, returning the version used
    pub async fn check(&self, artifact: &CampaignArtifact) -> Result<(u64, Vec<Violation>)> {
        let ruleset = self.store.current_snapshot();
        let violations = self.evaluate(artifact, &ruleset).await?;
        Ok((ruleset.version(), violations))
    }

    /// Evaluate against a specific rule set, cached by content and version
    pub async fn evaluate(&self, artifact: &CampaignArtifact, ruleset: &RuleSet) -> Result<Vec<Violation>> {
        let key = format!("{}:{}", artifact.content_hash(), ruleset.version());
        let violations = self
            .cache
            .get_or_compute(&key, self.cache_ttl, move || async move {
                let started = Instant::now();
                let result = evaluate_rules(artifact, ruleset);
                metrics::histogram!("adcomply_policy_evaluation_us")
                    .record(started.elapsed().as_micros() as f64);
                result.map(Arc::new)
            })
            .await?;

        if !violations.is_empty() {
            metrics::counter!("adcomply_violations_total", "source" => "policy")
                .increment(violations.len() as u64);
        }
        Ok(violations.as_ref().clone())
    }

    /// Check every artifact of a campaign against one snapshot.
    ///
    /// Only artifacts with violations appear in the result.
    pub async fn evaluate_campaign(
        &self,
        artifacts: &[CampaignArtifact],
    ) -> Result<BTreeMap<String, Vec<Violation>>> {
        let ruleset = self.store.current_snapshot();
        let mut results = BTreeMap::new();
        for artifact in artifacts {
            let violations = self.evaluate(artifact, &ruleset).await?;
            if !violations.is_empty() {
                results.insert(artifact.id.clone(), violations);
            }
        }
        Ok(results)
    }
}

/// Apply every enabled, in-scope rule to `artifact`.
///
/// Every populated constraint is checked independently. Violations come out
/// in rule order.
pub fn evaluate_rules(artifact: &CampaignArtifact, ruleset: &RuleSet) -> Result<Vec<Violation>> {
    let mut violations = Vec::new();
    for compiled in ruleset.rules() {
        let rule = &compiled.rule;
        if !rule.enabled || !artifact.matches_platform(&rule.platform) {
            continue;
        }
        check_text(artifact, compiled, &mut violations);
        check_image(artifact, compiled, &mut violations)?;
        check_budget(artifact, compiled, &mut violations)?;
    }
    debug!(
        artifact_id = %artifact.id,
        ruleset_version = ruleset.version(),
        violations = violations.len(),
        "Policy evaluation complete"
    );
    Ok(violations)
}

fn violation(compiled: &CompiledRule, severity: f64, reason: String) -> Violation {
    let v = Violation::new(ViolationSource::Policy, compiled.id(), severity, reason);
    match &compiled.rule.category {
        Some(category) => v.with_category(category.clone()),
        None => v,
    }
}

fn check_text(artifact: &CampaignArtifact, compiled: &CompiledRule, out: &mut Vec<Violation>) {
    let rule = &compiled.rule;
    let text = artifact.text.as_str();

    if let Some(matcher) = &compiled.prohibited {
        let found = matcher.find_all(text);
        if !found.is_empty() {
            let listed = found.join(", ");
            out.push(
                violation(compiled, SEVERITY_MEDIUM, format!("prohibited words: {}", listed))
                    .with_context(listed),
            );
        }
    }

    for pattern in &compiled.patterns {
        if let Some(m) = pattern.find(text) {
            out.push(
                violation(
                    compiled,
                    SEVERITY_HIGH,
                    format!("matched prohibited pattern {}", pattern.as_str()),
                )
                .with_context(m.as_str()),
            );
        }
    }

    if !compiled.required_lower.is_empty() {
        let lower = text.to_lowercase();
        for (element, needle) in rule.required_elements.iter().zip(&compiled.required_lower) {
            if !lower.contains(needle.as_str()) {
                out.push(violation(
                    compiled,
                    SEVERITY_HIGH,
                    format!("missing required element: {}", element),
                ));
            }
        }
    }

    let length = text.chars().count();
    if let Some(min) = rule.min_length {
        if length < min {
            out.push(violation(
                compiled,
                SEVERITY_MEDIUM,
                format!("text length {} below minimum {}", length, min),
            ));
        }
    }
    if let Some(max) = rule.max_length {
        if length > max {
            out.push(violation(
                compiled,
                SEVERITY_MEDIUM,
                format!("text length {} exceeds maximum {}", length, max),
            ));
        }
    }
}

fn check_image(artifact: &CampaignArtifact, compiled: &CompiledRule, out: &mut Vec<Violation>) -> Result<()> {
    let rule = &compiled.rule;
    if !rule.has_image_constraints() {
        return Ok(());
    }
    let image = artifact.image.as_ref().ok_or_else(|| {
        Error::validation(format!(
            "artifact {} has no image but rule {} constrains images",
            artifact.id, rule.id
        ))
    })?;

    if let Some(min) = rule.min_width {
        if image.width < min {
            out.push(violation(
                compiled,
                SEVERITY_MEDIUM,
                format!("image width {}px below minimum {}px", image.width, min),
            ));
        }
    }
    if let Some(min) = rule.min_height {
        if image.height < min {
            out.push(violation(
                compiled,
                SEVERITY_MEDIUM,
                format!("image height {}px below minimum {}px", image.height, min),
            ));
        }
    }
    if let Some(max) = rule.max_size_kb {
        if image.size_kb > max {
            out.push(violation(
                compiled,
                SEVERITY_MEDIUM,
                format!("image size {}KB exceeds maximum {}KB", image.size_kb, max),
            ));
        }
    }
    if !compiled.allowed_formats.is_empty() {
        let format = image.normalized_format();
        if !compiled.allowed_formats.contains(&format) {
            out.push(violation(
                compiled,
                SEVERITY_MEDIUM,
                format!(
                    "image format {} not in allowed formats [{}]",
                    format,
                    compiled.allowed_formats.join(", ")
                ),
            ));
        }
    }
    Ok(())
}

fn check_budget(artifact: &CampaignArtifact, compiled: &CompiledRule, out: &mut Vec<Violation>) -> Result<()> {
    let rule = &compiled.rule;
    if !rule.has_budget_constraints() {
        return Ok(());
    }
    let budget = artifact.budget.as_ref().ok_or_else(|| {
        Error::validation(format!(
            "artifact {} has no budget but rule {} constrains budgets",
            artifact.id, rule.id
        ))
    })?;

    if let Some(currency) = &rule.currency {
        if !currency.eq_ignore_ascii_case(&budget.currency) {
            out.push(violation(
                compiled,
                SEVERITY_HIGH,
                format!(
                    "budget currency {} does not match required {}",
                    budget.currency, currency
                ),
            ));
            // Range cannot be verified across currencies
            return Ok(());
        }
    }
    if let Some(min) = rule.min_budget {
        if budget.amount < min {
            out.push(violation(
                compiled,
                SEVERITY_HIGH,
                format!("budget {} {} below minimum {}", budget.amount, budget.currency, min),
            ));
        }
    }
    if let Some(max) = rule.max_budget {
        if budget.amount > max {
            out.push(violation(
                compiled,
                SEVERITY_HIGH,
                format!("budget {} {} exceeds maximum {}", budget.amount, budget.currency, max),
            ));
        }
    }
    Ok(())
}
