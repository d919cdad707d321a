//! Publication timeline reconstruction for campaigns.
//!
//! This crate turns a campaign's audit trail into the time ranges during
//! which the campaign was effectively published:
//!
//! - **Timeline Builder**: audit entries → point-in-time publish states
//! - **Range Compiler**: publish states → canonical published/unpublished ranges
//! - **Window Query**: last publish date and unpublished time over the ranges

pub mod audit;
pub mod compile;
pub mod error;
pub mod query;
pub mod range;
pub mod state;

pub use audit::{AuditAction, AuditEntry, FieldDiff, IS_PUBLISHED, PUBLISH_DOWN, PUBLISH_UP};
pub use compile::compile_trail;
pub use error::TimelineError;
pub use query::PublishWindowQuery;
pub use range::{PublishRange, PublishRangeCompiler, RangeSequence};
pub use state::{PublishState, PublishTimelineBuilder};
