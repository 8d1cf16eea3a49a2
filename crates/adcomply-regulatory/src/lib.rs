//! AdComply Regulatory Monitor
//!
//! Region-specific advertising regulations loaded from a local file or an
//! HTTP feed and held in an immutable snapshot. The hot path never touches
//! the network: [`RegulatoryMonitor::evaluate`] reads the current snapshot
//! while a background task refreshes it. When a refresh fails the last good
//! snapshot keeps serving and the monitor reports itself stale.

pub mod monitor;
pub mod regulation;
pub mod source;

pub use monitor::{
    CampaignOutcome, MonitorStatus, RegulationSnapshot, RegulatoryMonitor, RegulatoryMonitorConfig, RegulatoryOutcome,
};
pub use regulation::{CompiledRegulation, Condition, Regulation, Requirement};
pub use source::{FileSource, HttpSource, RegulationFeed, RegulationSource};
