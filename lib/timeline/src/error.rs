//! Error types for the timeline crate.
//!
//! Timeline reconstruction is total: malformed audit data is recovered
//! locally, so these errors are logged and surfaced to callers that want to
//! inspect them, never propagated out of a compile.

use std::fmt;

/// Errors from reading publish-related fields out of an audit entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineError {
    /// A window boundary or publish flag in a diff could not be parsed.
    MalformedAuditEntry {
        sequence: u64,
        field: String,
        reason: String,
    },
}

impl fmt::Display for TimelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedAuditEntry {
                sequence,
                field,
                reason,
            } => {
                write!(
                    f,
                    "malformed audit entry #{sequence}: field '{field}': {reason}"
                )
            }
        }
    }
}

impl std::error::Error for TimelineError {}
