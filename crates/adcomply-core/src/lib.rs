//! AdComply Core
//!
//! Core types, errors, and utilities shared across AdComply components.
//!
//! This crate provides:
//! - Campaign artifacts and their content hashes
//! - Violations, moderation scores, and compliance verdicts
//! - Error types and result handling
//! - A single-flight TTL cache used by every evaluator

pub mod cache;
pub mod error;
pub mod types;
pub mod verdict;

pub use cache::{Cache, CacheStats};
pub use error::{Error, Result};
pub use types::{normalize_format, Budget, CampaignArtifact, ImageRef, ALL_PLATFORMS};
pub use verdict::{
    merge_violations, ComplianceVerdict, ModerationCategory, ModerationScore, Violation,
    ViolationSource,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::Cache;
    pub use crate::error::{Error, Result};
    pub use crate::types::{Budget, CampaignArtifact, ImageRef};
    pub use crate::verdict::{ComplianceVerdict, ModerationCategory, ModerationScore, Violation, ViolationSource};
}
