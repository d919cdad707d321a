//! Questions answered over one compiled range sequence.

use crate::range::{PublishRange, RangeSequence};
use chrono::{DateTime, Utc};

/// Read-only view over a campaign's compiled publication ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishWindowQuery {
    ranges: RangeSequence,
    last_publish: Option<DateTime<Utc>>,
}

impl PublishWindowQuery {
    /// Wraps a compiled sequence, precomputing the last publish date.
    #[must_use]
    pub fn new(ranges: RangeSequence) -> Self {
        let last_publish = ranges.with_status(true).last().map(|range| range.from);
        Self {
            ranges,
            last_publish,
        }
    }

    /// Returns the compiled sequence.
    #[must_use]
    pub fn ranges(&self) -> &RangeSequence {
        &self.ranges
    }

    /// Iterates the unpublished ranges in order.
    pub fn unpublished_ranges(&self) -> impl Iterator<Item = &PublishRange> {
        self.ranges.with_status(false)
    }

    /// Iterates the published ranges in order.
    pub fn published_ranges(&self) -> impl Iterator<Item = &PublishRange> {
        self.ranges.with_status(true)
    }

    /// Start of the most recent published range, if the campaign was ever
    /// published.
    #[must_use]
    pub fn last_publish_date(&self) -> Option<DateTime<Utc>> {
        self.last_publish
    }

    /// Returns true if no published range exists.
    #[must_use]
    pub fn never_published(&self) -> bool {
        self.last_publish.is_none()
    }

    /// Effective status at `instant`, or `None` before the known history.
    #[must_use]
    pub fn is_published_at(&self, instant: DateTime<Utc>) -> Option<bool> {
        self.ranges
            .ranges()
            .iter()
            .find(|range| range.contains(instant))
            .map(|range| range.published)
    }

    /// Seconds the campaign spent unpublished from `since` onwards.
    ///
    /// Only closed unpublished ranges count: a range that is still in effect
    /// has no end to measure against.
    #[must_use]
    pub fn unpublished_seconds_since(&self, since: DateTime<Utc>) -> i64 {
        self.unpublished_ranges()
            .filter_map(|range| range.to.map(|end| (range.from, end)))
            .map(|(from, to)| {
                if from < since && since < to {
                    (to - since).num_seconds()
                } else if from >= since {
                    (to - from).num_seconds()
                } else {
                    0
                }
            })
            .sum()
    }
}

impl From<RangeSequence> for PublishWindowQuery {
    fn from(ranges: RangeSequence) -> Self {
        Self::new(ranges)
    }
}
