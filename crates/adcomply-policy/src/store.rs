//! Versioned rule store
//!
//! Readers take an `Arc<RuleSet>` snapshot and keep it for the whole
//! evaluation; reloads compile a fresh set and swap the pointer. A failed
//! reload publishes nothing and does not consume a version number.

use adcomply_core::{Error, Result};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::rule::{Rule, RuleFile, RuleSet};

/// Holds the currently published [`RuleSet`]
pub struct RuleStore {
    current: ArcSwap<RuleSet>,
    /// Serialises publishers; never held across an await
    publish_lock: Mutex<()>,
    source: Option<PathBuf>,
}

impl RuleStore {
    /// Store with an empty rule set and no backing file
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(RuleSet::empty()),
            publish_lock: Mutex::new(()),
            source: None,
        }
    }

    /// Store backed by a rule file; call [`RuleStore::reload`] to load it
    pub fn with_source(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Some(path.into()),
            ..Self::new()
        }
    }

    /// Build a store and publish the rules in `path` as version 1
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::with_source(path);
        store.reload().await?;
        Ok(store)
    }

    /// Parse and compile a rule source without publishing it.
    ///
    /// The set carries version 0; only [`RuleStore::publish`] assigns
    /// versions.
    pub async fn load(path: &Path) -> Result<RuleSet> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::rule_load(format!("failed to read {}: {}", path.display(), e))
        })?;
        let file = RuleFile::parse(path, &content)?;
        RuleSet::compile(file.rules, 0)
    }

    /// Latest published snapshot; never blocks on a reload
    pub fn current_snapshot(&self) -> Arc<RuleSet> {
        self.current.load_full()
    }

    pub fn version(&self) -> u64 {
        self.current.load().version()
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Re-read the backing file and publish it
    pub async fn reload(&self) -> Result<Arc<RuleSet>> {
        let path = self
            .source
            .as_deref()
            .ok_or_else(|| Error::rule_load("rule store has no source file"))?;

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Rule reload failed");
                metrics::counter!("adcomply_rule_reloads_total", "outcome" => "error").increment(1);
                return Err(Error::rule_load(format!("failed to read {}: {}", path.display(), e)));
            }
        };

        let result = RuleFile::parse(path, &content).and_then(|file| self.publish(file.rules));
        if let Err(e) = &result {
            warn!(path = %path.display(), error = %e, "Rule reload failed, keeping previous rule set");
            metrics::counter!("adcomply_rule_reloads_total", "outcome" => "error").increment(1);
        }
        result
    }

    /// Compile and publish `rules` as the next version
    pub fn publish(&self, rules: Vec<Rule>) -> Result<Arc<RuleSet>> {
        let _guard = self.publish_lock.lock();
        let next = self.current.load().version() + 1;
        let set = Arc::new(RuleSet::compile(rules, next)?);
        self.current.store(Arc::clone(&set));

        info!(version = next, rules = set.len(), "Published rule set");
        metrics::counter!("adcomply_rule_reloads_total", "outcome" => "ok").increment(1);
        metrics::gauge!("adcomply_ruleset_version").set(next as f64);
        Ok(set)
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}
