//! Publication state snapshots reconstructed from an audit trail.
//!
//! The audit trail is the source of truth for a campaign's publication
//! history. Replaying it produces one [`PublishState`] per entry, each
//! derived from its predecessor plus that entry's diff.

use crate::audit::{AuditAction, AuditEntry, PUBLISH_DOWN, PUBLISH_UP};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Publish-related fields of a campaign as of one audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishState {
    /// Timestamp of the audit entry this state was derived from.
    pub as_of: DateTime<Utc>,
    /// Manual published flag.
    pub published: bool,
    /// Scheduled publish-up boundary, if any.
    pub publish_up_at: Option<DateTime<Utc>>,
    /// Scheduled publish-down boundary, if any.
    pub publish_down_at: Option<DateTime<Utc>>,
}

impl PublishState {
    /// Derives the state after `entry` from the state before it.
    ///
    /// `default_published` is only consulted for the first entry of a trail
    /// that neither sets the flag nor records a creation.
    #[must_use]
    pub fn derive(
        previous: Option<&PublishState>,
        entry: &AuditEntry,
        default_published: bool,
    ) -> Self {
        let published = match entry.published_change() {
            Ok(Some(flag)) => Some(flag),
            Ok(None) => None,
            Err(error) => {
                warn!(%error, "ignoring unreadable published flag");
                None
            }
        };
        let published = published.unwrap_or_else(|| match (entry.action, previous) {
            // Entities are created published even when the flag is not logged.
            (AuditAction::Create, _) => true,
            (AuditAction::Edit, None) => default_published,
            (AuditAction::Edit, Some(prior)) => prior.published,
        });

        Self {
            as_of: entry.timestamp,
            published,
            publish_up_at: next_boundary(entry, PUBLISH_UP, previous.and_then(|p| p.publish_up_at)),
            publish_down_at: next_boundary(
                entry,
                PUBLISH_DOWN,
                previous.and_then(|p| p.publish_down_at),
            ),
        }
    }

    /// Returns true if either window boundary is set.
    #[must_use]
    pub fn has_window(&self) -> bool {
        self.publish_up_at.is_some() || self.publish_down_at.is_some()
    }
}

/// Resolves one window boundary for the state after `entry`.
///
/// A value the entry sets replaces the carried one, unless it was already in
/// the past when recorded. An unreadable value leaves the field unset.
fn next_boundary(
    entry: &AuditEntry,
    field: &str,
    carried: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    match entry.boundary_change(field) {
        Ok(Some(boundary)) if boundary < entry.timestamp => None,
        Ok(Some(boundary)) => Some(boundary),
        Ok(None) => carried,
        Err(error) => {
            warn!(%error, "treating unreadable window boundary as unset");
            None
        }
    }
}

/// Replays an audit trail into a sequence of publication states.
#[derive(Debug, Clone, Copy)]
pub struct PublishTimelineBuilder {
    default_published: bool,
}

impl PublishTimelineBuilder {
    /// Creates a builder that falls back to the campaign's current flag.
    #[must_use]
    pub fn new(default_published: bool) -> Self {
        Self { default_published }
    }

    /// Builds one state per entry, ordered by audit sequence.
    #[must_use]
    pub fn build(&self, entries: &[AuditEntry]) -> Vec<PublishState> {
        let mut ordered: Vec<&AuditEntry> = entries.iter().collect();
        ordered.sort_by_key(|entry| entry.sequence);

        let mut states: Vec<PublishState> = Vec::with_capacity(ordered.len());
        for entry in ordered {
            let next = PublishState::derive(states.last(), entry, self.default_published);
            states.push(next);
        }
        states
    }
}
