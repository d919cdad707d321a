//! Audit trail entries as recorded for a campaign.
//!
//! Each entry carries field-level `[old, new]` diffs. Only three fields
//! matter for publication: [`IS_PUBLISHED`], [`PUBLISH_UP`] and
//! [`PUBLISH_DOWN`].

use crate::error::TimelineError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Audit field holding the manual published flag.
pub const IS_PUBLISHED: &str = "isPublished";
/// Audit field holding the scheduled publish-up boundary.
pub const PUBLISH_UP: &str = "publishUp";
/// Audit field holding the scheduled publish-down boundary.
pub const PUBLISH_DOWN: &str = "publishDown";

/// Naive layouts accepted for window boundaries, interpreted as UTC.
const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// The kind of change an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// The entity was created.
    Create,
    /// The entity was edited.
    Edit,
}

/// A single field change, stored as `[old, new]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff(pub JsonValue, pub JsonValue);

impl FieldDiff {
    /// The value before the change.
    #[must_use]
    pub fn old(&self) -> &JsonValue {
        &self.0
    }

    /// The value after the change.
    #[must_use]
    pub fn new_value(&self) -> &JsonValue {
        &self.1
    }
}

/// One immutable row of a campaign's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic ordinal assigned by the audit store.
    pub sequence: u64,
    /// When the change was recorded.
    pub timestamp: DateTime<Utc>,
    /// Whether this entry records creation or an edit.
    pub action: AuditAction,
    /// Field-level diffs keyed by field name.
    #[serde(default)]
    pub field_diffs: BTreeMap<String, FieldDiff>,
}

impl AuditEntry {
    /// Creates an entry with no diffs.
    #[must_use]
    pub fn new(sequence: u64, timestamp: DateTime<Utc>, action: AuditAction) -> Self {
        Self {
            sequence,
            timestamp,
            action,
            field_diffs: BTreeMap::new(),
        }
    }

    /// Adds a field diff.
    #[must_use]
    pub fn with_change(
        mut self,
        field: impl Into<String>,
        old: impl Into<JsonValue>,
        new: impl Into<JsonValue>,
    ) -> Self {
        self.field_diffs
            .insert(field.into(), FieldDiff(old.into(), new.into()));
        self
    }

    /// Returns the new value of `field` if this entry sets it.
    ///
    /// A diff whose new value is `null` does not count as setting the field.
    #[must_use]
    pub fn new_value(&self, field: &str) -> Option<&JsonValue> {
        self.field_diffs
            .get(field)
            .map(FieldDiff::new_value)
            .filter(|value| !value.is_null())
    }

    /// Returns the published flag this entry sets, if any.
    ///
    /// # Errors
    ///
    /// Returns `MalformedAuditEntry` if the new value is not a recognizable
    /// boolean.
    pub fn published_change(&self) -> Result<Option<bool>, TimelineError> {
        self.new_value(IS_PUBLISHED)
            .map(|value| parse_flag(value).map_err(|reason| self.malformed(IS_PUBLISHED, reason)))
            .transpose()
    }

    /// Returns the window boundary this entry sets for `field`, in UTC.
    ///
    /// # Errors
    ///
    /// Returns `MalformedAuditEntry` if the new value is not a timestamp.
    pub fn boundary_change(&self, field: &str) -> Result<Option<DateTime<Utc>>, TimelineError> {
        self.new_value(field)
            .map(|value| parse_timestamp(value).map_err(|reason| self.malformed(field, reason)))
            .transpose()
    }

    fn malformed(&self, field: &str, reason: String) -> TimelineError {
        TimelineError::MalformedAuditEntry {
            sequence: self.sequence,
            field: field.to_string(),
            reason,
        }
    }
}

fn parse_flag(value: &JsonValue) -> Result<bool, String> {
    match value {
        JsonValue::Bool(flag) => Ok(*flag),
        JsonValue::Number(number) => number
            .as_f64()
            .map(|n| n != 0.0)
            .ok_or_else(|| format!("unusable number {number}")),
        JsonValue::String(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" => Ok(true),
            "0" | "false" => Ok(false),
            other => Err(format!("expected a boolean, got '{other}'")),
        },
        other => Err(format!("expected a boolean, got {other}")),
    }
}

/// Parses a window boundary and normalizes it to UTC.
///
/// Accepts RFC 3339, a few naive layouts (taken as UTC), bare dates
/// (midnight UTC) and integer unix seconds.
pub(crate) fn parse_timestamp(value: &JsonValue) -> Result<DateTime<Utc>, String> {
    match value {
        JsonValue::String(raw) => parse_timestamp_str(raw.trim()),
        JsonValue::Number(number) => number
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| format!("unix timestamp {number} out of range")),
        other => Err(format!("expected a timestamp, got {other}")),
    }
}

fn parse_timestamp_str(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%:z") {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    Err(format!("unrecognized timestamp '{raw}'"))
}
