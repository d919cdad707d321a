//! Compilation of publication states into published/unpublished ranges.
//!
//! Compilation runs in three stages:
//!
//! 1. **Manual ranges**: split the history wherever the manual published
//!    flag is set, ignoring publish windows.
//! 2. **Refinement**: cut each manually published range by the publish-up
//!    and publish-down boundaries recorded while it was in effect.
//! 3. **Merge**: sort, clip and join neighbours that share a state.

use crate::state::PublishState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A contiguous interval with a single effective publication status.
///
/// `to` is exclusive; `None` means the range is still in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRange {
    /// Effective publication status over the range.
    pub published: bool,
    /// Inclusive start.
    pub from: DateTime<Utc>,
    /// Exclusive end, or `None` when open-ended.
    pub to: Option<DateTime<Utc>>,
}

impl PublishRange {
    /// Creates a range, making it open-ended if `to` precedes `from`.
    #[must_use]
    pub fn new(published: bool, from: DateTime<Utc>, to: Option<DateTime<Utc>>) -> Self {
        Self {
            published,
            from,
            to: to.filter(|end| *end >= from),
        }
    }

    /// Returns true if the range has no end.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.to.is_none()
    }

    /// Returns true if the range is closed and covers no time.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to == Some(self.from)
    }

    /// Returns true if `instant` falls in `[from, to)`.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.from && self.to.is_none_or(|end| instant < end)
    }

    /// Returns true if `instant` falls in `[from, to]`.
    ///
    /// Window boundaries that land exactly on a range edge still belong to it.
    #[must_use]
    pub fn spans(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.from && self.to.is_none_or(|end| instant <= end)
    }
}

/// A canonical, ascending, non-overlapping sequence of ranges.
///
/// Only the final range may be open-ended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RangeSequence(Vec<PublishRange>);

impl RangeSequence {
    /// Returns the ranges in ascending order.
    #[must_use]
    pub fn ranges(&self) -> &[PublishRange] {
        &self.0
    }

    /// Returns true if there are no ranges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of ranges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates ranges with the given status, in order.
    pub fn with_status(&self, published: bool) -> impl Iterator<Item = &PublishRange> {
        self.0.iter().filter(move |range| range.published == published)
    }

    /// Consumes the sequence, returning the ranges.
    #[must_use]
    pub fn into_vec(self) -> Vec<PublishRange> {
        self.0
    }
}

/// Collecting always goes through the merge stage, so any collected
/// sequence is canonical.
impl FromIterator<PublishRange> for RangeSequence {
    fn from_iter<I: IntoIterator<Item = PublishRange>>(iter: I) -> Self {
        Self(PublishRangeCompiler.merge(iter))
    }
}

impl<'a> IntoIterator for &'a RangeSequence {
    type Item = &'a PublishRange;
    type IntoIter = std::slice::Iter<'a, PublishRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Compiles publication states into a [`RangeSequence`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishRangeCompiler;

impl PublishRangeCompiler {
    /// Runs all three stages over `states`.
    ///
    /// `states` must be in audit sequence order, as produced by
    /// [`PublishTimelineBuilder`](crate::PublishTimelineBuilder).
    #[must_use]
    pub fn compile(&self, states: &[PublishState]) -> RangeSequence {
        let manual = self.manual_ranges(states);
        let refined = self.refine(&manual, states);
        RangeSequence(self.merge(refined.into_values()))
    }

    /// Stage A: ranges driven only by the manual published flag.
    ///
    /// Consecutive unpublished states collapse into one range; each published
    /// state opens its own range. The last range is open-ended.
    #[must_use]
    pub fn manual_ranges(&self, states: &[PublishState]) -> Vec<PublishRange> {
        let mut ranges: Vec<PublishRange> = Vec::new();

        for state in states {
            if let Some(current) = ranges.last_mut() {
                if !current.published && !state.published {
                    continue;
                }
                *current = PublishRange::new(current.published, current.from, Some(state.as_of));
            }
            ranges.push(PublishRange::new(state.published, state.as_of, None));
        }

        ranges
    }

    /// Stage B: cuts manually published ranges by their publish windows.
    ///
    /// Ranges are keyed by start; a later write for the same start replaces
    /// an earlier one.
    #[must_use]
    pub fn refine(
        &self,
        manual: &[PublishRange],
        states: &[PublishState],
    ) -> BTreeMap<DateTime<Utc>, PublishRange> {
        let mut refined = BTreeMap::new();

        for range in manual {
            refined.insert(range.from, *range);
            if !range.published {
                continue;
            }

            for state in states
                .iter()
                .filter(|state| state.published && state.has_window() && range.contains(state.as_of))
            {
                for piece in split_by_window(range, state) {
                    refined.insert(piece.from, piece);
                }
            }
        }

        refined
    }

    /// Stage C: produces the canonical sequence from arbitrary ranges.
    ///
    /// Empty ranges are dropped, the rest are ordered by start (a later
    /// duplicate start wins), each end is clipped to the next start and
    /// equal neighbours are joined. Running it on its own output is a no-op.
    #[must_use]
    pub fn merge(&self, ranges: impl IntoIterator<Item = PublishRange>) -> Vec<PublishRange> {
        let mut by_start: BTreeMap<DateTime<Utc>, PublishRange> = BTreeMap::new();
        for range in ranges.into_iter().filter(|range| !range.is_empty()) {
            by_start.insert(range.from, range);
        }

        let ordered: Vec<PublishRange> = by_start.into_values().collect();
        let mut merged: Vec<PublishRange> = Vec::with_capacity(ordered.len());

        for (index, range) in ordered.iter().enumerate() {
            let to = match ordered.get(index + 1) {
                Some(next) => Some(range.to.map_or(next.from, |end| end.min(next.from))),
                None => range.to,
            };
            let clipped = PublishRange::new(range.published, range.from, to);

            match merged.last_mut() {
                Some(last) if last.published == clipped.published => last.to = clipped.to,
                _ => merged.push(clipped),
            }
        }

        merged
    }
}

/// Splits a manually published range by one state's publish window.
///
/// Boundaries outside the range are ignored; with none left the range is
/// returned as is, unless publish-up only arrives after the range ends, in
/// which case the whole range was spent waiting for it.
fn split_by_window(range: &PublishRange, state: &PublishState) -> Vec<PublishRange> {
    if matches!((state.publish_up_at, range.to), (Some(up), Some(to)) if up > to) {
        return vec![PublishRange::new(false, range.from, range.to)];
    }

    let up = state.publish_up_at.filter(|at| range.spans(*at));
    let down = state.publish_down_at.filter(|at| range.spans(*at));

    match (up, down) {
        (Some(up), Some(down)) => vec![
            PublishRange::new(false, range.from, Some(up)),
            PublishRange::new(true, up, Some(down)),
            PublishRange::new(false, down, range.to),
        ],
        (Some(up), None) => vec![
            PublishRange::new(false, range.from, Some(up)),
            PublishRange::new(true, up, range.to),
        ],
        (None, Some(down)) => vec![
            PublishRange::new(true, range.from, Some(down)),
            PublishRange::new(false, down, range.to),
        ],
        (None, None) => vec![*range],
    }
}
