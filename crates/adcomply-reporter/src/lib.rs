//! AdComply Compliance Reporter
//!
//! Turns compliance verdicts into alerts and periodic reports:
//! - Weighted severity scoring with inclusive high/medium tiers
//! - One alert per violated rule, deduplicated per report period
//! - Daily and weekly reports rendered from `{{variable}}` templates
//! - Email (SMTP) and webhook delivery with bounded, jittered retries
//! - Operational incidents for permanent delivery failures and stale
//!   regulatory data, disclosed in the next report

pub mod alert;
pub mod config;
pub mod notifier;
pub mod report;
pub mod reporter;
pub mod retry;
pub mod schedule;
pub mod severity;
pub mod state;
pub mod template;

pub use alert::{Alert, DeliveryStatus, Incident, IncidentKind, RecipientDelivery};
pub use config::{AlertThresholds, ReportScheduleConfig, ReporterConfig, SmtpConfig};
pub use notifier::{ChannelNotifier, Notification, Notifier, Recipient, SmtpNotifier, WebhookNotifier};
pub use report::{RegulatoryDisclosure, Report, ReportMetrics, ReportSummary};
pub use reporter::{ComplianceReporter, LedgerStats, RegulatoryProbe, SubmitOutcome};
pub use retry::{send_with_retry, RetryOutcome, RetryPolicy};
pub use schedule::{Period, PeriodKind, Schedule, Schedules};
pub use severity::{SeverityScorer, SeverityTier};
pub use state::VerdictState;
pub use template::TemplateRenderer;
