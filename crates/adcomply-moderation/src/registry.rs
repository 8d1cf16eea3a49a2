//! Category → adapter map built once at startup

use crate::adapter::ModerationAdapter;
use crate::config::{ModelRef, ModeratorConfig};
use crate::nsfw::NsfwAdapter;
use crate::object_detection::ObjectDetectionAdapter;
use crate::remote::RemoteModelAdapter;
use crate::sentiment::SentimentAdapter;
use crate::toxicity::ToxicityAdapter;
use adcomply_core::{Error, ModerationCategory, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Fixed mapping from moderation category to its adapter
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<ModerationCategory, Arc<dyn ModerationAdapter>>,
}

impl AdapterRegistry {
    /// Empty registry; categories without an adapter are not scored
    pub fn new() -> Self {
        Self::default()
    }

    /// Build adapters from `models.{category}`.
    ///
    /// Categories missing from the map use the built-in adapter; `none`
    /// switches a category off.
    pub fn from_config(config: &ModeratorConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let mut registry = Self::new();

        for category in ModerationCategory::ALL {
            match ModelRef::parse(config.model_for(category))? {
                ModelRef::Disabled => {
                    info!(category = %category, "Moderation category disabled");
                }
                ModelRef::Builtin(name) => {
                    if let Some(name) = &name {
                        if ModerationCategory::parse(name) != Some(category) {
                            return Err(Error::config(format!(
                                "builtin model {name:?} cannot serve {category}"
                            )));
                        }
                    }
                    registry = registry.with_adapter(builtin(category, config)?);
                }
                ModelRef::Remote(url) => {
                    registry = registry.with_adapter(Arc::new(RemoteModelAdapter::new(category, url, timeout)?));
                }
            }
        }

        info!("Initialized {} moderation adapters", registry.len());
        Ok(registry)
    }

    /// Register (or replace) the adapter for its category
    pub fn with_adapter(mut self, adapter: Arc<dyn ModerationAdapter>) -> Self {
        self.adapters.insert(adapter.category(), adapter);
        self
    }

    pub fn get(&self, category: ModerationCategory) -> Option<&Arc<dyn ModerationAdapter>> {
        self.adapters.get(&category)
    }

    /// Adapters in category order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ModerationAdapter>> {
        self.adapters.values()
    }

    pub fn categories(&self) -> Vec<ModerationCategory> {
        self.adapters.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

fn builtin(category: ModerationCategory, config: &ModeratorConfig) -> Result<Arc<dyn ModerationAdapter>> {
    Ok(match category {
        ModerationCategory::Toxicity => Arc::new(ToxicityAdapter::new()?),
        ModerationCategory::Sentiment => Arc::new(SentimentAdapter::new()?),
        ModerationCategory::Nsfw => Arc::new(NsfwAdapter::new()?),
        ModerationCategory::ObjectDetection => {
            Arc::new(ObjectDetectionAdapter::new(&config.forbidden_objects))
        }
    })
}
