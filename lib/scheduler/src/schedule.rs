//! Pending schedules and the trigger settings that produced them.

use crate::error::SchedulerError;
use chrono::{DateTime, Days, Duration, Months, Utc};
use republish_core::{CampaignId, ScheduleId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a campaign's pending interval triggers react to it being republished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepublishPolicy {
    /// The interval starts over from the most recent publish.
    RestartOnPublish,
    /// Only time spent published counts towards the interval.
    CountOnlyWhilePublished,
    /// Publication history is ignored.
    #[default]
    CountAllTime,
}

impl RepublishPolicy {
    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RestartOnPublish => "restart_on_publish",
            Self::CountOnlyWhilePublished => "count_only_while_published",
            Self::CountAllTime => "count_all_time",
        }
    }

    /// Change log note recorded when this policy moves a trigger date.
    #[must_use]
    pub fn note(&self) -> String {
        format!("Campaign republish behavior: {}", self.as_str())
    }
}

impl fmt::Display for RepublishPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RepublishPolicy {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "restart_on_publish" => Ok(Self::RestartOnPublish),
            "count_only_while_published" => Ok(Self::CountOnlyWhilePublished),
            "count_all_time" => Ok(Self::CountAllTime),
            other => Err(SchedulerError::InvalidPolicy {
                value: other.to_string(),
            }),
        }
    }
}

/// When an event fires relative to the moment it was scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// Fires as soon as it is reached.
    Immediate,
    /// Fires a fixed interval after it was scheduled.
    Interval,
    /// Fires at an absolute date.
    Date,
}

impl TriggerMode {
    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Interval => "interval",
            Self::Date => "date",
        }
    }
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TriggerMode {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immediate" => Ok(Self::Immediate),
            "interval" => Ok(Self::Interval),
            "date" => Ok(Self::Date),
            other => Err(SchedulerError::InvalidTriggerMode {
                value: other.to_string(),
            }),
        }
    }
}

/// Unit of a trigger interval, stored as a single-letter code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntervalUnit {
    /// Minutes (`i`).
    #[serde(rename = "i")]
    Minute,
    /// Hours (`h`).
    #[serde(rename = "h")]
    Hour,
    /// Calendar days (`d`).
    #[default]
    #[serde(rename = "d")]
    Day,
    /// Calendar months (`m`).
    #[serde(rename = "m")]
    Month,
    /// Calendar years (`y`).
    #[serde(rename = "y")]
    Year,
}

impl IntervalUnit {
    /// Returns the single-letter code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minute => "i",
            Self::Hour => "h",
            Self::Day => "d",
            Self::Month => "m",
            Self::Year => "y",
        }
    }

    /// Adds `amount` units to `at`, or `None` if the result is out of range.
    ///
    /// Month and year steps are calendar-aware and clamp to the end of the
    /// month.
    #[must_use]
    pub fn checked_add(&self, at: DateTime<Utc>, amount: u32) -> Option<DateTime<Utc>> {
        match self {
            Self::Minute => at.checked_add_signed(Duration::try_minutes(i64::from(amount))?),
            Self::Hour => at.checked_add_signed(Duration::try_hours(i64::from(amount))?),
            Self::Day => at.checked_add_days(Days::new(u64::from(amount))),
            Self::Month => at.checked_add_months(Months::new(amount)),
            Self::Year => at.checked_add_months(Months::new(amount.checked_mul(12)?)),
        }
    }
}

impl fmt::Display for IntervalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IntervalUnit {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "i" => Ok(Self::Minute),
            "h" => Ok(Self::Hour),
            "d" => Ok(Self::Day),
            "m" => Ok(Self::Month),
            "y" => Ok(Self::Year),
            other => Err(SchedulerError::InvalidIntervalUnit {
                value: other.to_string(),
            }),
        }
    }
}

/// Trigger settings of the campaign event a schedule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Trigger mode.
    pub mode: TriggerMode,
    /// Interval length, only meaningful in interval mode.
    #[serde(default)]
    pub interval_amount: u32,
    /// Interval unit, only meaningful in interval mode.
    #[serde(default)]
    pub interval_unit: IntervalUnit,
}

impl TriggerConfig {
    /// Creates an immediate trigger.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            mode: TriggerMode::Immediate,
            interval_amount: 0,
            interval_unit: IntervalUnit::default(),
        }
    }

    /// Creates an absolute-date trigger.
    #[must_use]
    pub fn date() -> Self {
        Self {
            mode: TriggerMode::Date,
            ..Self::immediate()
        }
    }

    /// Creates an interval trigger.
    #[must_use]
    pub fn interval(amount: u32, unit: IntervalUnit) -> Self {
        Self {
            mode: TriggerMode::Interval,
            interval_amount: amount,
            interval_unit: unit,
        }
    }

    /// Returns true if republish policies may move this trigger's date.
    #[must_use]
    pub fn is_adjustable(&self) -> bool {
        self.mode == TriggerMode::Interval && self.interval_amount > 0
    }

    /// The instant one interval after `at`.
    #[must_use]
    pub fn interval_after(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.interval_unit.checked_add(at, self.interval_amount)
    }
}

/// One entry in a schedule's append-only change log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// Trigger date the schedule was moved to.
    pub changed_to: DateTime<Utc>,
    /// Why it moved.
    pub note: String,
}

impl ChangeLogEntry {
    /// Creates a change log entry.
    #[must_use]
    pub fn new(changed_to: DateTime<Utc>, note: impl Into<String>) -> Self {
        Self {
            changed_to,
            note: note.into(),
        }
    }
}

/// A scheduled-but-not-yet-fired event for one contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSchedule {
    /// Unique identifier.
    pub id: ScheduleId,
    /// Campaign the event belongs to.
    pub campaign_id: CampaignId,
    /// Trigger settings of the event.
    pub trigger: TriggerConfig,
    /// When the schedule was created; intervals count from here.
    pub first_trigger_at: DateTime<Utc>,
    /// When the event is currently due.
    pub trigger_at: DateTime<Utc>,
    /// False once the event has fired.
    pub is_scheduled: bool,
    /// Every trigger date the schedule has had, oldest first.
    pub change_log: Vec<ChangeLogEntry>,
}

impl PendingSchedule {
    /// Creates a pending schedule whose change log starts with `note`.
    #[must_use]
    pub fn new(
        campaign_id: CampaignId,
        trigger: TriggerConfig,
        first_trigger_at: DateTime<Utc>,
        trigger_at: DateTime<Utc>,
        note: impl Into<String>,
    ) -> Self {
        Self {
            id: ScheduleId::new(),
            campaign_id,
            trigger,
            first_trigger_at,
            trigger_at,
            is_scheduled: true,
            change_log: vec![ChangeLogEntry::new(trigger_at, note)],
        }
    }

    /// Moves the trigger date and records why, returning the new entry.
    pub fn reschedule(&mut self, to: DateTime<Utc>, note: impl Into<String>) -> ChangeLogEntry {
        let entry = ChangeLogEntry::new(to, note);
        self.trigger_at = to;
        self.change_log.push(entry.clone());
        entry
    }

    /// Marks the event as fired.
    pub fn mark_fired(&mut self) {
        self.is_scheduled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn policy_wire_names() {
        for policy in [
            RepublishPolicy::RestartOnPublish,
            RepublishPolicy::CountOnlyWhilePublished,
            RepublishPolicy::CountAllTime,
        ] {
            assert_eq!(policy.as_str().parse::<RepublishPolicy>(), Ok(policy));
            assert_eq!(
                serde_json::to_value(policy).unwrap(),
                serde_json::json!(policy.as_str())
            );
        }
        assert_eq!(RepublishPolicy::default(), RepublishPolicy::CountAllTime);
        assert!("never".parse::<RepublishPolicy>().is_err());
    }

    #[test]
    fn policy_note() {
        assert_eq!(
            RepublishPolicy::CountOnlyWhilePublished.note(),
            "Campaign republish behavior: count_only_while_published"
        );
    }

    #[test]
    fn trigger_mode_and_unit_parse() {
        assert_eq!("interval".parse::<TriggerMode>(), Ok(TriggerMode::Interval));
        assert!("weekly".parse::<TriggerMode>().is_err());
        assert_eq!("i".parse::<IntervalUnit>(), Ok(IntervalUnit::Minute));
        assert_eq!(
            "w".parse::<IntervalUnit>(),
            Err(SchedulerError::InvalidIntervalUnit {
                value: "w".to_string()
            })
        );
    }

    #[test]
    fn trigger_config_deserializes_with_defaults() {
        let trigger: TriggerConfig = serde_json::from_value(serde_json::json!({
            "mode": "interval",
            "interval_amount": 3,
            "interval_unit": "h",
        }))
        .unwrap();
        assert_eq!(trigger, TriggerConfig::interval(3, IntervalUnit::Hour));

        let trigger: TriggerConfig =
            serde_json::from_value(serde_json::json!({"mode": "date"})).unwrap();
        assert_eq!(trigger, TriggerConfig::date());
    }

    #[test]
    fn interval_arithmetic() {
        let start = at(2024, 1, 31);
        assert_eq!(
            IntervalUnit::Minute.checked_add(start, 90),
            Some(start + Duration::minutes(90))
        );
        assert_eq!(IntervalUnit::Day.checked_add(start, 10), Some(at(2024, 2, 10)));
        assert_eq!(IntervalUnit::Month.checked_add(start, 1), Some(at(2024, 2, 29)));
        assert_eq!(IntervalUnit::Year.checked_add(at(2024, 2, 29), 1), Some(at(2025, 2, 28)));
        assert_eq!(IntervalUnit::Year.checked_add(start, u32::MAX), None);
    }

    #[test]
    fn only_nonzero_intervals_are_adjustable() {
        assert!(TriggerConfig::interval(10, IntervalUnit::Day).is_adjustable());
        assert!(!TriggerConfig::interval(0, IntervalUnit::Day).is_adjustable());
        assert!(!TriggerConfig::date().is_adjustable());
        assert!(!TriggerConfig::immediate().is_adjustable());
    }

    #[test]
    fn reschedule_appends_to_change_log() {
        let mut schedule = PendingSchedule::new(
            CampaignId::new(),
            TriggerConfig::interval(10, IntervalUnit::Day),
            at(2024, 10, 2),
            at(2024, 10, 12),
            "scheduled",
        );
        assert!(schedule.is_scheduled);
        assert_eq!(schedule.change_log, vec![ChangeLogEntry::new(at(2024, 10, 12), "scheduled")]);

        let entry = schedule.reschedule(at(2024, 10, 20), "moved");
        assert_eq!(schedule.trigger_at, at(2024, 10, 20));
        assert_eq!(schedule.change_log.len(), 2);
        assert_eq!(schedule.change_log[0].note, "scheduled");
        assert_eq!(schedule.change_log[1], entry);

        schedule.mark_fired();
        assert!(!schedule.is_scheduled);
    }
}
