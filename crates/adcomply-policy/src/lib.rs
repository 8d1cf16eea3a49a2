//! AdComply Policy Engine
//!
//! Static platform and brand rules for ad content.
//!
//! Rules are defined in JSON (or YAML) and constrain:
//! - Ad copy (prohibited words, regex patterns, required elements, length)
//! - Creative images (minimum dimensions, maximum size, allowed formats)
//! - Campaign budgets (range and currency)
//!
//! Rule sets are immutable and versioned; [`RuleStore`] swaps them atomically
//! on reload so in-flight evaluations keep the version they started with.

pub mod checker;
pub mod rule;
pub mod store;

pub use checker::{evaluate_rules, PolicyChecker, PolicyCheckerConfig, SEVERITY_HIGH, SEVERITY_MEDIUM};
pub use rule::{CompiledRule, Rule, RuleFile, RuleSet};
pub use store::RuleStore;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::checker::{PolicyChecker, PolicyCheckerConfig};
    pub use crate::rule::{Rule, RuleSet};
    pub use crate::store::RuleStore;
}
