//! Tick-driven placement: every active job advances by one batch per tick.

use std::collections::BTreeMap;

use promptbuild_core::{DimensionId, RequesterId};
use promptbuild_world::MutatorSource;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::job::{BlockBounds, BuildJob, CancelToken, JobId, JobState};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on concurrently running jobs; `None` admits everything.
    pub max_active_jobs: Option<usize>,
}

/// A job was refused by [`PlacementScheduler::start`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("too many active builds ({active}/{limit})")]
    TooManyJobs { active: usize, limit: usize },
    #[error("job was already started")]
    NotPending,
}

/// Terminal transition of a job, reported by [`PlacementScheduler::tick`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobEvent {
    Completed {
        job: JobId,
        requester: RequesterId,
        placed: usize,
        failed: usize,
        ticks: u64,
    },
    Aborted {
        job: JobId,
        requester: RequesterId,
        reason: String,
    },
    Cancelled {
        job: JobId,
        requester: RequesterId,
        cursor: usize,
        total: usize,
    },
}

impl JobEvent {
    pub fn job(&self) -> JobId {
        match self {
            Self::Completed { job, .. } | Self::Aborted { job, .. } | Self::Cancelled { job, .. } => {
                *job
            }
        }
    }

    pub fn requester(&self) -> RequesterId {
        match self {
            Self::Completed { requester, .. }
            | Self::Aborted { requester, .. }
            | Self::Cancelled { requester, .. } => *requester,
        }
    }
}

/// Read-only view of an active job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub requester: RequesterId,
    pub dimension: DimensionId,
    pub label: String,
    pub cursor: usize,
    pub total: usize,
    pub batch_size: usize,
    pub placed: usize,
    pub failed: usize,
    pub state: JobState,
}

/// Owns every running [`BuildJob`] and drives them from the host tick.
///
/// Jobs are kept in id order so concurrent builds interleave the same way on
/// every run. A job leaves the scheduler the tick it reaches a terminal state.
#[derive(Debug, Default)]
pub struct PlacementScheduler {
    config: SchedulerConfig,
    jobs: BTreeMap<JobId, BuildJob>,
    next_id: u64,
}

impl PlacementScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            jobs: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Accept a pending job; it places its first batch on the next tick.
    pub fn start(&mut self, mut job: BuildJob) -> Result<JobId, AdmissionError> {
        if job.state() != JobState::Pending {
            return Err(AdmissionError::NotPending);
        }
        if let Some(limit) = self.config.max_active_jobs {
            if self.jobs.len() >= limit {
                return Err(AdmissionError::TooManyJobs {
                    active: self.jobs.len(),
                    limit,
                });
            }
        }

        if let Some(bounds) = job.bounds() {
            for (other_id, other) in &self.jobs {
                if other.dimension() == job.dimension()
                    && other.bounds().is_some_and(|b| b.intersects(&bounds))
                {
                    warn!(
                        other = %other_id,
                        %bounds,
                        "New build overlaps a running one; later writes win"
                    );
                }
            }
        }

        let id = JobId(self.next_id.max(1));
        self.next_id = id.0 + 1;
        job.set_state(JobState::Running);
        info!(
            job = %id,
            requester = %job.requester(),
            total = job.total(),
            batch_size = job.batch_size(),
            expected_ticks = job.expected_ticks(),
            "Build job started"
        );
        self.jobs.insert(id, job);
        Ok(id)
    }

    /// Advance every running job by one batch.
    ///
    /// Cancellation is observed before the batch runs. A dimension that no
    /// longer resolves, or a capability lost mid-batch, aborts the job.
    pub fn tick(&mut self, worlds: &mut dyn MutatorSource) -> Vec<JobEvent> {
        let mut events = Vec::new();

        for (&id, job) in self.jobs.iter_mut() {
            if job.is_cancelled() {
                job.set_state(JobState::Cancelled);
                info!(job = %id, cursor = job.cursor(), total = job.total(), "Build job cancelled");
                events.push(JobEvent::Cancelled {
                    job: id,
                    requester: job.requester(),
                    cursor: job.cursor(),
                    total: job.total(),
                });
                continue;
            }

            let Some(mutator) = worlds.mutator(job.dimension()) else {
                let reason = format!("world {} is no longer available", job.dimension());
                job.set_state(JobState::Aborted);
                warn!(job = %id, %reason, "Build job aborted");
                events.push(JobEvent::Aborted {
                    job: id,
                    requester: job.requester(),
                    reason,
                });
                continue;
            };

            let outcome = job.run_batch(mutator);
            debug!(
                job = %id,
                placed = outcome.placed,
                failed = outcome.failed,
                cursor = job.cursor(),
                total = job.total(),
                "Batch placed"
            );

            if let Some(err) = outcome.capability_lost {
                job.set_state(JobState::Aborted);
                warn!(job = %id, %err, "Build job aborted");
                events.push(JobEvent::Aborted {
                    job: id,
                    requester: job.requester(),
                    reason: err.to_string(),
                });
            } else if job.is_exhausted() {
                job.set_state(JobState::Completed);
                info!(
                    job = %id,
                    placed = job.placed(),
                    failed = job.failed(),
                    ticks = job.ticks_run(),
                    "Build job completed"
                );
                events.push(JobEvent::Completed {
                    job: id,
                    requester: job.requester(),
                    placed: job.placed(),
                    failed: job.failed(),
                    ticks: job.ticks_run(),
                });
            }
        }

        self.jobs.retain(|_, job| !job.state().is_terminal());
        events
    }

    /// Request cancellation of one job; it stops before its next batch.
    pub fn cancel(&self, id: JobId) -> bool {
        match self.jobs.get(&id) {
            Some(job) => {
                job.cancel_token().cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every job of `requester`, returning the affected ids.
    pub fn cancel_requester(&self, requester: RequesterId) -> Vec<JobId> {
        self.jobs
            .iter()
            .filter(|(_, job)| job.requester() == requester)
            .map(|(&id, job)| {
                job.cancel_token().cancel();
                id
            })
            .collect()
    }

    /// Token that cancels `id` from outside the tick loop.
    pub fn cancel_token(&self, id: JobId) -> Option<CancelToken> {
        self.jobs.get(&id).map(BuildJob::cancel_token)
    }

    pub fn active_jobs(&self) -> Vec<JobSnapshot> {
        self.jobs
            .iter()
            .map(|(&id, job)| JobSnapshot {
                id,
                requester: job.requester(),
                dimension: job.dimension(),
                label: job.label().to_string(),
                cursor: job.cursor(),
                total: job.total(),
                batch_size: job.batch_size(),
                placed: job.placed(),
                failed: job.failed(),
                state: job.state(),
            })
            .collect()
    }

    pub fn bounds(&self, id: JobId) -> Option<BlockBounds> {
        self.jobs.get(&id).and_then(BuildJob::bounds)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// No job is running.
    pub fn is_idle(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::PlacementOp;
    use promptbuild_core::BlockPos;
    use promptbuild_testkit::RecordingMutator;
    use promptbuild_world::MaterialRegistry;

    fn job(requester: u64, count: usize, target_ticks: usize) -> BuildJob {
        let stone = MaterialRegistry::builtin().parse("stone").unwrap();
        let ops = (0..count)
            .map(|i| PlacementOp {
                wx: i as f64,
                wy: 64,
                wz: requester as f64 * 100.0,
                material: stone.clone(),
            })
            .collect();
        BuildJob::new(
            RequesterId(requester),
            DimensionId::Overworld,
            "test",
            ops,
            target_ticks,
        )
    }

    #[test]
    fn job_completes_after_ceil_total_over_batch_ticks() {
        let mut scheduler = PlacementScheduler::default();
        let mut worlds = RecordingMutator::new();
        let id = scheduler.start(job(1, 10, 4)).unwrap();

        // batch = max(1, 10 / 4) = 2, so five ticks.
        for _ in 0..4 {
            assert!(scheduler.tick(&mut worlds).is_empty());
        }
        let events = scheduler.tick(&mut worlds);
        assert_eq!(
            events,
            vec![JobEvent::Completed {
                job: id,
                requester: RequesterId(1),
                placed: 10,
                failed: 0,
                ticks: 5,
            }]
        );
        assert!(scheduler.is_idle());
        assert_eq!(worlds.calls().len(), 10);
        assert!(scheduler.tick(&mut worlds).is_empty());
    }

    #[test]
    fn empty_job_completes_on_first_tick() {
        let mut scheduler = PlacementScheduler::default();
        let mut worlds = RecordingMutator::new();
        scheduler.start(job(1, 0, 200)).unwrap();
        let events = scheduler.tick(&mut worlds);
        assert!(matches!(
            events.as_slice(),
            [JobEvent::Completed { placed: 0, ticks: 1, .. }]
        ));
        assert!(worlds.calls().is_empty());
    }

    #[test]
    fn individual_failures_do_not_stop_the_job() {
        let mut scheduler = PlacementScheduler::default();
        let mut worlds = RecordingMutator::new();
        worlds.fail_at(BlockPos::new(1, 64, 100));
        worlds.fail_at(BlockPos::new(2, 64, 100));
        scheduler.start(job(1, 4, 200)).unwrap();

        let events: Vec<_> = (0..4).flat_map(|_| scheduler.tick(&mut worlds)).collect();
        assert!(matches!(
            events.as_slice(),
            [JobEvent::Completed { placed: 2, failed: 2, .. }]
        ));
        assert_eq!(worlds.calls().len(), 4);
    }

    #[test]
    fn concurrent_jobs_interleave_in_id_order() {
        let mut scheduler = PlacementScheduler::default();
        let mut worlds = RecordingMutator::new();
        scheduler.start(job(1, 2, 200)).unwrap();
        scheduler.start(job(2, 2, 200)).unwrap();

        scheduler.tick(&mut worlds);
        scheduler.tick(&mut worlds);
        let order: Vec<i32> = worlds.calls().iter().map(|(pos, _)| pos.z).collect();
        assert_eq!(order, vec![100, 200, 100, 200]);
    }

    #[test]
    fn capability_loss_aborts_without_further_writes() {
        let mut scheduler = PlacementScheduler::default();
        let mut worlds = RecordingMutator::new();
        let id = scheduler.start(job(1, 5, 200)).unwrap();

        scheduler.tick(&mut worlds);
        worlds.set_unavailable(true);
        let events = scheduler.tick(&mut worlds);
        assert!(matches!(events.as_slice(), [JobEvent::Aborted { job, .. }] if *job == id));
        assert!(scheduler.is_idle());
        assert_eq!(worlds.calls().len(), 1);
    }

    #[test]
    fn unloaded_dimension_aborts() {
        let mut scheduler = PlacementScheduler::default();
        let mut worlds = RecordingMutator::new().only(DimensionId::Nether);
        scheduler.start(job(1, 5, 200)).unwrap();
        let events = scheduler.tick(&mut worlds);
        match events.as_slice() {
            [JobEvent::Aborted { reason, .. }] => assert!(reason.contains("overworld")),
            other => panic!("unexpected events {other:?}"),
        }
        assert!(worlds.calls().is_empty());
    }

    #[test]
    fn cancel_stops_before_the_next_batch() {
        let mut scheduler = PlacementScheduler::default();
        let mut worlds = RecordingMutator::new();
        let id = scheduler.start(job(1, 5, 200)).unwrap();

        scheduler.tick(&mut worlds);
        assert!(scheduler.cancel(id));
        let events = scheduler.tick(&mut worlds);
        assert_eq!(
            events,
            vec![JobEvent::Cancelled {
                job: id,
                requester: RequesterId(1),
                cursor: 1,
                total: 5,
            }]
        );
        assert_eq!(worlds.calls().len(), 1);
        assert!(!scheduler.cancel(id));
    }

    #[test]
    fn cancel_requester_only_touches_their_jobs() {
        let mut scheduler = PlacementScheduler::default();
        let mut worlds = RecordingMutator::new();
        let a = scheduler.start(job(1, 3, 200)).unwrap();
        scheduler.start(job(2, 3, 200)).unwrap();
        assert_eq!(scheduler.cancel_requester(RequesterId(1)), vec![a]);

        let events = scheduler.tick(&mut worlds);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].requester(), RequesterId(1));
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn admission_limit_is_enforced() {
        let mut scheduler = PlacementScheduler::new(SchedulerConfig {
            max_active_jobs: Some(1),
        });
        scheduler.start(job(1, 3, 200)).unwrap();
        assert_eq!(
            scheduler.start(job(2, 3, 200)),
            Err(AdmissionError::TooManyJobs { active: 1, limit: 1 })
        );
    }

    #[test]
    fn snapshots_report_progress() {
        let mut scheduler = PlacementScheduler::default();
        let mut worlds = RecordingMutator::new();
        let id = scheduler.start(job(3, 6, 3)).unwrap();
        scheduler.tick(&mut worlds);
        let snaps = scheduler.active_jobs();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].id, id);
        assert_eq!(snaps[0].cursor, 2);
        assert_eq!(snaps[0].state, JobState::Running);
    }
}
