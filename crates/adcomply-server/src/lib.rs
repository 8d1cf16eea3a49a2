//! AdComply Server
//!
//! Compliance evaluation service for ad campaign artifacts.
//!
//! [`ComplianceEngine`] wires the policy checker, content moderator,
//! regulatory monitor and compliance reporter behind the boundary API;
//! [`routes`] exposes it over HTTP.

pub mod config;
pub mod engine;
pub mod routes;

pub use config::{AdComplyConfig, EnvironmentConfig};
pub use engine::{ComplianceEngine, MonitorProbe};
pub use routes::{create_router, AppState};
