//! Fire-or-reschedule decisions for pending interval triggers.
//!
//! A pending schedule is either due, in which case it fires, or it is moved
//! according to its campaign's [`RepublishPolicy`] and stays scheduled. Every
//! move is recorded in the schedule's change log.

use crate::schedule::{ChangeLogEntry, PendingSchedule, RepublishPolicy};
use chrono::{DateTime, Duration, Utc};
use republish_core::ScheduleId;
use republish_timeline::PublishWindowQuery;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// What happened to a schedule in one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RescheduleOutcome {
    /// The trigger date has been reached; the event should run now.
    Fired,
    /// The event stays scheduled, possibly at a new date.
    Rescheduled,
}

/// Result of evaluating one pending schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescheduleDecision {
    /// The evaluated schedule.
    pub schedule_id: ScheduleId,
    /// Fired or rescheduled.
    pub outcome: RescheduleOutcome,
    /// Trigger date after evaluation.
    pub trigger_at: DateTime<Utc>,
    /// Whether the schedule is still pending.
    pub is_scheduled: bool,
    /// Change log entry appended during this evaluation, if the date moved.
    pub new_change_log_entry: Option<ChangeLogEntry>,
}

/// Decides whether pending schedules fire at a fixed reference instant.
#[derive(Debug, Clone, Copy)]
pub struct TriggerDateRescheduler {
    now: DateTime<Utc>,
}

impl TriggerDateRescheduler {
    /// Creates a rescheduler that treats `now` as the current time.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    /// Returns the reference instant.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Applies `policy` to `schedule` and decides whether it fires.
    ///
    /// Only interval triggers with a non-zero amount are moved. A schedule
    /// that has already fired is reported as fired without changes.
    #[instrument(
        skip(self, schedule, window),
        fields(schedule_id = %schedule.id, campaign_id = %schedule.campaign_id, policy = %policy)
    )]
    pub fn evaluate(
        &self,
        schedule: &mut PendingSchedule,
        policy: RepublishPolicy,
        window: &PublishWindowQuery,
    ) -> RescheduleDecision {
        if !schedule.is_scheduled {
            return decision(schedule, RescheduleOutcome::Fired, None);
        }

        let new_entry = if schedule.trigger.is_adjustable() {
            candidate(schedule, policy, window)
                .filter(|candidate| *candidate != schedule.trigger_at)
                .map(|candidate| {
                    debug!(from = %schedule.trigger_at, to = %candidate, "moving trigger date");
                    schedule.reschedule(candidate, policy.note())
                })
        } else {
            None
        };

        let outcome = if self.now < schedule.first_trigger_at {
            debug!(
                now = %self.now,
                first_trigger_at = %schedule.first_trigger_at,
                "clock is behind schedule creation"
            );
            RescheduleOutcome::Rescheduled
        } else if schedule.trigger_at <= self.now {
            schedule.mark_fired();
            RescheduleOutcome::Fired
        } else {
            RescheduleOutcome::Rescheduled
        };

        decision(schedule, outcome, new_entry)
    }
}

/// The trigger date `policy` asks for, or `None` to leave it unchanged.
fn candidate(
    schedule: &PendingSchedule,
    policy: RepublishPolicy,
    window: &PublishWindowQuery,
) -> Option<DateTime<Utc>> {
    let candidate = match policy {
        RepublishPolicy::CountAllTime => return None,
        RepublishPolicy::RestartOnPublish => {
            let last_publish = window.last_publish_date()?;
            schedule.trigger.interval_after(last_publish)
        }
        RepublishPolicy::CountOnlyWhilePublished => {
            let paused = window.unpublished_seconds_since(schedule.first_trigger_at);
            schedule
                .trigger
                .interval_after(schedule.first_trigger_at)
                .and_then(|due| due.checked_add_signed(Duration::try_seconds(paused)?))
        }
    };

    if candidate.is_none() {
        warn!(
            amount = schedule.trigger.interval_amount,
            unit = %schedule.trigger.interval_unit,
            "interval out of range, keeping trigger date"
        );
    }
    candidate
}

fn decision(
    schedule: &PendingSchedule,
    outcome: RescheduleOutcome,
    new_change_log_entry: Option<ChangeLogEntry>,
) -> RescheduleDecision {
    RescheduleDecision {
        schedule_id: schedule.id,
        outcome,
        trigger_at: schedule.trigger_at,
        is_scheduled: schedule.is_scheduled,
        new_change_log_entry,
    }
}
