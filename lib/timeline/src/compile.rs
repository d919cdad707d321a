//! End-to-end compilation of an audit trail into a window query.

use crate::audit::AuditEntry;
use crate::query::PublishWindowQuery;
use crate::range::PublishRangeCompiler;
use crate::state::PublishTimelineBuilder;
use tracing::debug;

/// Replays `entries`, compiles the resulting states and wraps them for
/// querying.
///
/// `default_published` is the campaign's current flag, used when the trail
/// does not say whether the campaign started out published.
#[must_use]
pub fn compile_trail(entries: &[AuditEntry], default_published: bool) -> PublishWindowQuery {
    let states = PublishTimelineBuilder::new(default_published).build(entries);
    let ranges = PublishRangeCompiler.compile(&states);
    debug!(
        entries = entries.len(),
        ranges = ranges.len(),
        "compiled publish timeline"
    );
    PublishWindowQuery::new(ranges)
}
