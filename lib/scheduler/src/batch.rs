//! Evaluation passes over many pending schedules.
//!
//! A pass reads the clock once, loads every campaign its schedules refer to
//! exactly once, and compiles each campaign's publication ranges into a
//! [`RangeCache`] that lives only as long as the pass. A campaign that fails
//! to load defers its own schedules; the rest of the pass continues.

use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, SourceError};
use crate::rescheduler::{RescheduleDecision, RescheduleOutcome, TriggerDateRescheduler};
use crate::schedule::{PendingSchedule, RepublishPolicy};
use crate::source::{AuditTrailReader, CampaignReader, ChangeLogSink, ClockSource, EntityKind};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream;
use republish_core::{CampaignId, ScheduleId};
use republish_timeline::{PublishWindowQuery, compile_trail};
use rootcause::prelude::ResultExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Compiled publication ranges of the campaigns seen in one pass.
#[derive(Debug, Default)]
pub struct RangeCache {
    entries: HashMap<CampaignId, Arc<PublishWindowQuery>>,
}

impl RangeCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached query for a campaign.
    #[must_use]
    pub fn get(&self, campaign_id: &CampaignId) -> Option<Arc<PublishWindowQuery>> {
        self.entries.get(campaign_id).cloned()
    }

    /// Caches a campaign's query, replacing any earlier one.
    pub fn insert(
        &mut self,
        campaign_id: CampaignId,
        query: PublishWindowQuery,
    ) -> Arc<PublishWindowQuery> {
        let query = Arc::new(query);
        self.entries.insert(campaign_id, Arc::clone(&query));
        query
    }

    /// Number of cached campaigns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result for one schedule in a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScheduleOutcome {
    /// The schedule was evaluated.
    Decided(RescheduleDecision),
    /// The schedule's campaign could not be loaded; it was left untouched.
    Deferred {
        /// The untouched schedule.
        schedule_id: ScheduleId,
        /// Campaign that failed to load.
        campaign_id: CampaignId,
        /// Why the campaign failed to load.
        reason: String,
    },
}

/// Everything one pass decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Reference instant of the pass.
    pub now: DateTime<Utc>,
    /// One outcome per input schedule, in input order.
    pub outcomes: Vec<ScheduleOutcome>,
}

impl BatchReport {
    /// Iterates the schedules that were evaluated.
    pub fn decisions(&self) -> impl Iterator<Item = &RescheduleDecision> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            ScheduleOutcome::Decided(decision) => Some(decision),
            ScheduleOutcome::Deferred { .. } => None,
        })
    }

    /// Iterates the schedules that should run now.
    pub fn fired(&self) -> impl Iterator<Item = &RescheduleDecision> {
        self.decisions()
            .filter(|decision| decision.outcome == RescheduleOutcome::Fired)
    }

    /// Number of deferred schedules.
    #[must_use]
    pub fn deferred_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, ScheduleOutcome::Deferred { .. }))
            .count()
    }
}

struct LoadedCampaign {
    policy: RepublishPolicy,
    window: PublishWindowQuery,
}

/// Runs evaluation passes against the campaign collaborators.
pub struct BatchEvaluator {
    campaigns: Arc<dyn CampaignReader>,
    trails: Arc<dyn AuditTrailReader>,
    clock: Arc<dyn ClockSource>,
    config: SchedulerConfig,
}

impl BatchEvaluator {
    /// Creates an evaluator.
    #[must_use]
    pub fn new(
        campaigns: Arc<dyn CampaignReader>,
        trails: Arc<dyn AuditTrailReader>,
        clock: Arc<dyn ClockSource>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            campaigns,
            trails,
            clock,
            config,
        }
    }

    /// Evaluates every schedule once against a single reference instant.
    ///
    /// Schedules are mutated in place. Schedules of campaigns that fail to
    /// load are reported as deferred and left as they were.
    #[instrument(skip(self, schedules), fields(schedules = schedules.len()))]
    pub async fn evaluate_pass(&self, schedules: &mut [PendingSchedule]) -> BatchReport {
        let now = self.clock.now();
        let rescheduler = TriggerDateRescheduler::new(now);

        let campaign_ids: BTreeSet<CampaignId> =
            schedules.iter().map(|schedule| schedule.campaign_id).collect();
        let loaded: Vec<(CampaignId, republish_core::Result<LoadedCampaign, SchedulerError>)> =
            stream::iter(campaign_ids)
                .map(move |campaign_id| async move {
                    (campaign_id, self.load(campaign_id).await)
                })
                .buffer_unordered(self.config.effective_concurrency())
                .collect()
                .await;

        let mut cache = RangeCache::new();
        let mut policies = HashMap::new();
        let mut failures = HashMap::new();
        for (campaign_id, result) in loaded {
            match result {
                Ok(campaign) => {
                    cache.insert(campaign_id, campaign.window);
                    policies.insert(campaign_id, campaign.policy);
                }
                Err(report) => {
                    warn!(%campaign_id, error = %report, "deferring schedules of campaign");
                    failures.insert(campaign_id, report.to_string());
                }
            }
        }

        let outcomes: Vec<ScheduleOutcome> = schedules
            .iter_mut()
            .map(|schedule| {
                let campaign_id = schedule.campaign_id;
                match (cache.get(&campaign_id), policies.get(&campaign_id)) {
                    (Some(window), Some(policy)) => ScheduleOutcome::Decided(
                        rescheduler.evaluate(schedule, *policy, &window),
                    ),
                    _ => ScheduleOutcome::Deferred {
                        schedule_id: schedule.id,
                        campaign_id,
                        reason: failures
                            .get(&campaign_id)
                            .cloned()
                            .unwrap_or_default(),
                    },
                }
            })
            .collect();

        let report = BatchReport { now, outcomes };
        info!(
            %now,
            campaigns = cache.len(),
            fired = report.fired().count(),
            deferred = report.deferred_count(),
            "evaluation pass complete"
        );
        report
    }

    async fn load(
        &self,
        campaign_id: CampaignId,
    ) -> republish_core::Result<LoadedCampaign, SchedulerError> {
        let campaign = self
            .campaigns
            .read_campaign(campaign_id)
            .await
            .context(SchedulerError::CampaignLoad { campaign_id })?;
        let trail = self
            .trails
            .read_trail(EntityKind::Campaign, campaign_id)
            .await
            .context(SchedulerError::CampaignLoad { campaign_id })?;

        let policy = campaign.effective_policy(self.config.default_republish_policy);
        debug!(
            %campaign_id,
            %policy,
            published = campaign.published,
            publish_up_at = ?campaign.publish_up_at,
            publish_down_at = ?campaign.publish_down_at,
            allow_restart = campaign.allow_restart,
            entries = trail.len(),
            "loaded campaign"
        );
        Ok(LoadedCampaign {
            policy,
            window: compile_trail(&trail, campaign.published),
        })
    }
}

/// Pushes every change log entry of a pass into `sink`.
///
/// Returns the number of entries written.
///
/// # Errors
///
/// Returns the first error the sink reports.
#[instrument(skip(sink, report), fields(now = %report.now))]
pub async fn flush_change_log(
    sink: &dyn ChangeLogSink,
    report: &BatchReport,
) -> republish_core::Result<usize, SourceError> {
    let mut written = 0;
    for decision in report.decisions() {
        if let Some(entry) = &decision.new_change_log_entry {
            sink.append(decision.schedule_id, entry.clone()).await?;
            written += 1;
        }
    }
    debug!(written, "flushed change log");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{ChangeLogEntry, IntervalUnit, TriggerConfig};
    use crate::source::{CampaignSnapshot, FixedClock};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use republish_timeline::{AuditAction, AuditEntry, IS_PUBLISHED};
    use std::collections::HashSet;
    use std::sync::Mutex;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    /// In-memory campaign store that counts reads.
    #[derive(Default)]
    struct InMemoryCampaigns {
        snapshots: HashMap<CampaignId, CampaignSnapshot>,
        trails: HashMap<CampaignId, Vec<AuditEntry>>,
        unreadable_trails: HashSet<CampaignId>,
        campaign_reads: Mutex<Vec<CampaignId>>,
        trail_reads: Mutex<Vec<CampaignId>>,
    }

    impl InMemoryCampaigns {
        fn with_campaign(mut self, snapshot: CampaignSnapshot, trail: Vec<AuditEntry>) -> Self {
            self.trails.insert(snapshot.id, trail);
            self.snapshots.insert(snapshot.id, snapshot);
            self
        }

        /// Adds a campaign whose audit trail cannot be read.
        fn with_unreadable_trail(mut self, snapshot: CampaignSnapshot) -> Self {
            self.unreadable_trails.insert(snapshot.id);
            self.snapshots.insert(snapshot.id, snapshot);
            self
        }
    }

    #[async_trait]
    impl CampaignReader for InMemoryCampaigns {
        async fn read_campaign(
            &self,
            campaign_id: CampaignId,
        ) -> republish_core::Result<CampaignSnapshot, SourceError> {
            self.campaign_reads.lock().unwrap().push(campaign_id);
            self.snapshots
                .get(&campaign_id)
                .cloned()
                .ok_or_else(|| SourceError::UnknownCampaign { campaign_id }.into())
        }
    }

    #[async_trait]
    impl AuditTrailReader for InMemoryCampaigns {
        async fn read_trail(
            &self,
            _entity_kind: EntityKind,
            entity_id: CampaignId,
        ) -> republish_core::Result<Vec<AuditEntry>, SourceError> {
            self.trail_reads.lock().unwrap().push(entity_id);
            if self.unreadable_trails.contains(&entity_id) {
                return Err(SourceError::ReadFailed {
                    campaign_id: entity_id,
                    reason: "connection reset".to_string(),
                }
                .into());
            }
            Ok(self.trails.get(&entity_id).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        entries: Mutex<Vec<(ScheduleId, ChangeLogEntry)>>,
    }

    #[async_trait]
    impl ChangeLogSink for RecordingSink {
        async fn append(
            &self,
            schedule_id: ScheduleId,
            entry: ChangeLogEntry,
        ) -> republish_core::Result<(), SourceError> {
            self.entries.lock().unwrap().push((schedule_id, entry));
            Ok(())
        }
    }

    struct RejectingSink;

    #[async_trait]
    impl ChangeLogSink for RejectingSink {
        async fn append(
            &self,
            schedule_id: ScheduleId,
            _entry: ChangeLogEntry,
        ) -> republish_core::Result<(), SourceError> {
            Err(SourceError::WriteFailed {
                schedule_id,
                reason: "disk full".to_string(),
            }
            .into())
        }
    }

    fn republished_trail() -> Vec<AuditEntry> {
        vec![
            AuditEntry::new(1, at(2024, 10, 1), AuditAction::Edit)
                .with_change(IS_PUBLISHED, false, true),
            AuditEntry::new(2, at(2024, 10, 5), AuditAction::Edit)
                .with_change(IS_PUBLISHED, true, false),
            AuditEntry::new(3, at(2024, 10, 10), AuditAction::Edit)
                .with_change(IS_PUBLISHED, false, true),
        ]
    }

    fn pending(campaign_id: CampaignId) -> PendingSchedule {
        PendingSchedule::new(
            campaign_id,
            TriggerConfig::interval(10, IntervalUnit::Day),
            at(2024, 10, 2),
            at(2024, 10, 12),
            "scheduled",
        )
    }

    fn evaluator(store: Arc<InMemoryCampaigns>, now: DateTime<Utc>) -> BatchEvaluator {
        BatchEvaluator::new(
            store.clone(),
            store,
            Arc::new(FixedClock(now)),
            SchedulerConfig::default(),
        )
    }

    #[tokio::test]
    async fn each_campaign_is_read_once_per_pass() {
        let restart = CampaignSnapshot::new(CampaignId::new(), true)
            .with_policy(RepublishPolicy::RestartOnPublish);
        let restart_id = restart.id;
        let store = Arc::new(
            InMemoryCampaigns::default().with_campaign(restart, republished_trail()),
        );
        let mut schedules = vec![pending(restart_id), pending(restart_id), pending(restart_id)];

        let report = evaluator(store.clone(), at(2024, 10, 15))
            .evaluate_pass(&mut schedules)
            .await;

        assert_eq!(store.campaign_reads.lock().unwrap().len(), 1);
        assert_eq!(store.trail_reads.lock().unwrap().len(), 1);
        assert_eq!(report.now, at(2024, 10, 15));
        assert_eq!(report.decisions().count(), 3);
        for schedule in &schedules {
            assert_eq!(schedule.trigger_at, at(2024, 10, 20));
            assert!(schedule.is_scheduled);
        }
    }

    #[tokio::test]
    async fn unknown_campaign_is_deferred_without_stopping_the_pass() {
        let known = CampaignSnapshot::new(CampaignId::new(), true);
        let known_id = known.id;
        let missing_id = CampaignId::new();
        let store =
            Arc::new(InMemoryCampaigns::default().with_campaign(known, republished_trail()));
        let mut schedules = vec![pending(missing_id), pending(known_id)];
        let untouched = schedules[0].clone();

        let report = evaluator(store, at(2025, 1, 10))
            .evaluate_pass(&mut schedules)
            .await;

        assert_eq!(report.outcomes.len(), 2);
        match &report.outcomes[0] {
            ScheduleOutcome::Deferred {
                schedule_id,
                campaign_id,
                reason,
            } => {
                assert_eq!(*schedule_id, untouched.id);
                assert_eq!(*campaign_id, missing_id);
                assert!(reason.contains("could not load campaign"));
            }
            other => panic!("expected deferral, got {other:?}"),
        }
        assert_eq!(schedules[0], untouched);
        assert_eq!(report.deferred_count(), 1);

        let fired: Vec<_> = report.fired().collect();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].schedule_id, schedules[1].id);
        assert_eq!(fired[0].trigger_at, at(2024, 10, 12));
    }

    #[tokio::test]
    async fn campaign_without_policy_uses_configured_default() {
        let campaign = CampaignSnapshot::new(CampaignId::new(), true);
        let campaign_id = campaign.id;
        let store =
            Arc::new(InMemoryCampaigns::default().with_campaign(campaign, republished_trail()));
        let config = SchedulerConfig {
            default_republish_policy: RepublishPolicy::CountOnlyWhilePublished,
            campaign_concurrency: 2,
        };
        let evaluator = BatchEvaluator::new(
            store.clone(),
            store,
            Arc::new(FixedClock(at(2024, 10, 14))),
            config,
        );
        let mut schedules = vec![pending(campaign_id)];

        let report = evaluator.evaluate_pass(&mut schedules).await;

        assert_eq!(schedules[0].trigger_at, at(2024, 10, 17));
        assert_eq!(report.fired().count(), 0);
    }

    #[tokio::test]
    async fn change_log_entries_are_flushed() {
        let campaign = CampaignSnapshot::new(CampaignId::new(), true)
            .with_policy(RepublishPolicy::RestartOnPublish);
        let other = CampaignSnapshot::new(CampaignId::new(), true);
        let (campaign_id, other_id) = (campaign.id, other.id);
        let store = Arc::new(
            InMemoryCampaigns::default()
                .with_campaign(campaign, republished_trail())
                .with_campaign(other, republished_trail()),
        );
        let mut schedules = vec![pending(campaign_id), pending(other_id)];
        let report = evaluator(store, at(2025, 1, 10))
            .evaluate_pass(&mut schedules)
            .await;

        let sink = RecordingSink::default();
        let written = flush_change_log(&sink, &report).await.unwrap();

        assert_eq!(written, 1);
        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries[0].0, schedules[0].id);
        assert_eq!(
            entries[0].1,
            ChangeLogEntry::new(at(2024, 10, 20), RepublishPolicy::RestartOnPublish.note())
        );
    }

    #[tokio::test]
    async fn unreadable_trail_defers_only_its_campaign() {
        let broken = CampaignSnapshot::new(CampaignId::new(), true)
            .with_policy(RepublishPolicy::RestartOnPublish);
        let healthy = CampaignSnapshot::new(CampaignId::new(), true)
            .with_policy(RepublishPolicy::RestartOnPublish);
        let (broken_id, healthy_id) = (broken.id, healthy.id);
        let store = Arc::new(
            InMemoryCampaigns::default()
                .with_unreadable_trail(broken)
                .with_campaign(healthy, republished_trail()),
        );
        let mut schedules = vec![pending(broken_id), pending(healthy_id), pending(broken_id)];
        let untouched = [schedules[0].clone(), schedules[2].clone()];

        let report = evaluator(store.clone(), at(2024, 10, 15))
            .evaluate_pass(&mut schedules)
            .await;

        assert_eq!(store.trail_reads.lock().unwrap().len(), 2);
        assert_eq!(report.deferred_count(), 2);
        for index in [0, 2] {
            match &report.outcomes[index] {
                ScheduleOutcome::Deferred {
                    schedule_id,
                    campaign_id,
                    reason,
                } => {
                    assert_eq!(*schedule_id, schedules[index].id);
                    assert_eq!(*campaign_id, broken_id);
                    assert!(reason.contains("could not load campaign"));
                }
                other => panic!("expected deferral, got {other:?}"),
            }
        }
        assert_eq!(schedules[0], untouched[0]);
        assert_eq!(schedules[2], untouched[1]);

        let decided: Vec<_> = report.decisions().collect();
        assert_eq!(decided.len(), 1);
        assert_eq!(decided[0].schedule_id, schedules[1].id);
        assert_eq!(decided[0].outcome, RescheduleOutcome::Rescheduled);
        assert_eq!(schedules[1].trigger_at, at(2024, 10, 20));
    }

    #[tokio::test]
    async fn sink_failure_stops_the_flush() {
        let campaign = CampaignSnapshot::new(CampaignId::new(), true)
            .with_policy(RepublishPolicy::RestartOnPublish);
        let campaign_id = campaign.id;
        let store =
            Arc::new(InMemoryCampaigns::default().with_campaign(campaign, republished_trail()));
        let mut schedules = vec![pending(campaign_id)];
        let report = evaluator(store, at(2025, 1, 10))
            .evaluate_pass(&mut schedules)
            .await;
        assert_eq!(
            report
                .decisions()
                .filter(|decision| decision.new_change_log_entry.is_some())
                .count(),
            1
        );

        let err = flush_change_log(&RejectingSink, &report).await.unwrap_err();

        assert_eq!(
            err.current_context(),
            &SourceError::WriteFailed {
                schedule_id: schedules[0].id,
                reason: "disk full".to_string(),
            }
        );
    }

    #[test]
    fn range_cache_shares_compiled_queries() {
        let mut cache = RangeCache::new();
        assert!(cache.is_empty());

        let campaign_id = CampaignId::new();
        let inserted = cache.insert(campaign_id, PublishWindowQuery::default());
        let fetched = cache.get(&campaign_id).unwrap();

        assert!(Arc::ptr_eq(&inserted, &fetched));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&CampaignId::new()).is_none());
    }
}
