//! Error types for the scheduler crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `SourceError`: Errors raised by the collaborators the scheduler reads from
//! - `SchedulerError`: Parse errors and context for failed campaign loads

use republish_core::{CampaignId, ScheduleId};
use std::fmt;

/// Errors from campaign and audit trail collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The campaign does not exist.
    UnknownCampaign { campaign_id: CampaignId },
    /// Reading campaign data failed.
    ReadFailed {
        campaign_id: CampaignId,
        reason: String,
    },
    /// Recording a change log entry failed.
    WriteFailed {
        schedule_id: ScheduleId,
        reason: String,
    },
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCampaign { campaign_id } => {
                write!(f, "unknown campaign: {campaign_id}")
            }
            Self::ReadFailed {
                campaign_id,
                reason,
            } => write!(f, "failed to read {campaign_id}: {reason}"),
            Self::WriteFailed {
                schedule_id,
                reason,
            } => write!(f, "failed to record change for {schedule_id}: {reason}"),
        }
    }
}

impl std::error::Error for SourceError {}

/// High-level scheduler errors.
///
/// `CampaignLoad` is a context wrapper for source failures; the others are
/// returned when parsing wire names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Loading a campaign's snapshot or audit trail failed.
    CampaignLoad { campaign_id: CampaignId },
    /// Unrecognized republish policy name.
    InvalidPolicy { value: String },
    /// Unrecognized trigger mode name.
    InvalidTriggerMode { value: String },
    /// Unrecognized interval unit code.
    InvalidIntervalUnit { value: String },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CampaignLoad { campaign_id } => {
                write!(f, "could not load campaign {campaign_id}")
            }
            Self::InvalidPolicy { value } => write!(f, "invalid republish policy: {value}"),
            Self::InvalidTriggerMode { value } => write!(f, "invalid trigger mode: {value}"),
            Self::InvalidIntervalUnit { value } => write!(f, "invalid interval unit: {value}"),
        }
    }
}

impl std::error::Error for SchedulerError {}
