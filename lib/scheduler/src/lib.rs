//! Republish-aware rescheduling of campaign interval triggers.
//!
//! This crate provides:
//!
//! - **Schedules**: pending schedules, trigger settings, and republish policies
//! - **Rescheduler**: fire-or-reschedule decisions against a publication window
//! - **Batch evaluation**: passes over many schedules with per-pass range caching
//! - **Sources**: traits for the collaborators that hold campaigns and audit trails

pub mod batch;
pub mod config;
pub mod error;
pub mod rescheduler;
pub mod schedule;
pub mod source;

pub use batch::{BatchEvaluator, BatchReport, RangeCache, ScheduleOutcome, flush_change_log};
pub use config::SchedulerConfig;
pub use error::{SchedulerError, SourceError};
pub use rescheduler::{RescheduleDecision, RescheduleOutcome, TriggerDateRescheduler};
pub use schedule::{
    ChangeLogEntry, IntervalUnit, PendingSchedule, RepublishPolicy, TriggerConfig, TriggerMode,
};
pub use source::{
    AuditTrailReader, CampaignReader, CampaignSnapshot, ChangeLogSink, ClockSource, EntityKind,
    FixedClock, SystemClock,
};
