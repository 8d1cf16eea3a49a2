//! AdComply Content Moderation
//!
//! Per-category moderation adapters behind a single [`ModerationAdapter`]
//! trait:
//! - Toxicity, sentiment and NSFW scoring of ad copy
//! - Object detection over creative image labels
//! - Remote inference over HTTP for any category
//!
//! [`ContentModerator`] fans an artifact out to the registered adapters,
//! caches scores through the shared single-flight cache, and reports failed
//! categories as unscored instead of passing them.

pub mod adapter;
pub mod config;
mod lexicon;
pub mod moderator;
pub mod nsfw;
pub mod object_detection;
pub mod registry;
pub mod remote;
pub mod sentiment;
pub mod toxicity;

pub use adapter::ModerationAdapter;
pub use config::{ModelRef, ModeratorConfig, UnscoredPolicy};
pub use moderator::{ContentModerator, ModerationOutcome};
pub use nsfw::NsfwAdapter;
pub use object_detection::ObjectDetectionAdapter;
pub use registry::AdapterRegistry;
pub use remote::RemoteModelAdapter;
pub use sentiment::SentimentAdapter;
pub use toxicity::ToxicityAdapter;
