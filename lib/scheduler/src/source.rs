//! Collaborators the scheduler reads campaign data from and reports to.
//!
//! Storage lives outside this crate; implementations of these traits adapt
//! whatever holds campaigns, audit trails, and schedule change logs.

use crate::error::SourceError;
use crate::schedule::{ChangeLogEntry, RepublishPolicy};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use republish_core::{CampaignId, ScheduleId};
use republish_timeline::AuditEntry;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of entity an audit trail belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A campaign.
    Campaign,
}

impl EntityKind {
    /// Returns the audit trail's object name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Campaign => "campaign",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Current publish-related settings of a campaign.
///
/// Only `published` and the policy feed evaluation; the window and restart
/// flag describe the campaign as loaded and are logged with each load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignSnapshot {
    /// Campaign ID.
    pub id: CampaignId,
    /// Current manual published flag.
    pub published: bool,
    /// Current publish-up boundary.
    pub publish_up_at: Option<DateTime<Utc>>,
    /// Current publish-down boundary.
    pub publish_down_at: Option<DateTime<Utc>>,
    /// The campaign's own republish policy, if it overrides the default.
    pub republish_policy: Option<RepublishPolicy>,
    /// Whether contacts may restart the campaign.
    pub allow_restart: bool,
}

impl CampaignSnapshot {
    /// Creates a snapshot with no window and no policy override.
    #[must_use]
    pub fn new(id: CampaignId, published: bool) -> Self {
        Self {
            id,
            published,
            publish_up_at: None,
            publish_down_at: None,
            republish_policy: None,
            allow_restart: false,
        }
    }

    /// Sets the current publish window.
    #[must_use]
    pub fn with_window(
        mut self,
        publish_up_at: Option<DateTime<Utc>>,
        publish_down_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.publish_up_at = publish_up_at;
        self.publish_down_at = publish_down_at;
        self
    }

    /// Sets the campaign's own republish policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RepublishPolicy) -> Self {
        self.republish_policy = Some(policy);
        self
    }

    /// The campaign's policy, or `default` when it has none.
    #[must_use]
    pub fn effective_policy(&self, default: RepublishPolicy) -> RepublishPolicy {
        self.republish_policy.unwrap_or(default)
    }
}

/// Reads an entity's audit trail.
#[async_trait]
pub trait AuditTrailReader: Send + Sync {
    /// Returns the entity's audit entries in ascending sequence order.
    async fn read_trail(
        &self,
        entity_kind: EntityKind,
        entity_id: CampaignId,
    ) -> republish_core::Result<Vec<AuditEntry>, SourceError>;
}

/// Reads current campaign settings.
#[async_trait]
pub trait CampaignReader: Send + Sync {
    /// Returns the campaign's snapshot.
    async fn read_campaign(
        &self,
        campaign_id: CampaignId,
    ) -> republish_core::Result<CampaignSnapshot, SourceError>;
}

/// Records change log entries produced by a pass.
#[async_trait]
pub trait ChangeLogSink: Send + Sync {
    /// Appends `entry` to the stored change log of `schedule_id`.
    async fn append(
        &self,
        schedule_id: ScheduleId,
        entry: ChangeLogEntry,
    ) -> republish_core::Result<(), SourceError>;
}

/// Source of the current time.
pub trait ClockSource: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stopped at one instant, for replays and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl ClockSource for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
