//! Build jobs: the ordered placement list plus its scheduling cursor.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use promptbuild_core::{BlockPos, DimensionId, RequesterId};
use promptbuild_world::{Material, PlacementError, WorldMutator};
use serde::Serialize;
use tracing::trace;

/// Scheduler-assigned job identifier; increases with every accepted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Lifecycle of a [`BuildJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    /// Planned, not yet handed to the scheduler.
    Pending,
    /// Placing one batch per tick.
    Running,
    /// Every op was attempted.
    Completed,
    /// The world-mutation capability was lost mid-build.
    Aborted,
    /// The job's cancel token was set.
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Cancelled)
    }
}

/// Shared flag checked by the scheduler before every batch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// One world mutation: a world-space point and the validated material.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementOp {
    pub wx: f64,
    pub wy: i32,
    pub wz: f64,
    pub material: Material,
}

impl PlacementOp {
    /// Block cell targeted by this op.
    pub fn block_pos(&self) -> BlockPos {
        BlockPos::new(self.wx.floor() as i32, self.wy, self.wz.floor() as i32)
    }
}

/// Axis-aligned block box, both corners inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockBounds {
    pub min: BlockPos,
    pub max: BlockPos,
}

impl BlockBounds {
    /// Smallest box containing every op, `None` for an empty list.
    pub fn of_ops(ops: &[PlacementOp]) -> Option<Self> {
        let mut iter = ops.iter().map(PlacementOp::block_pos);
        let first = iter.next()?;
        Some(iter.fold(Self { min: first, max: first }, |b, p| Self {
            min: BlockPos::new(b.min.x.min(p.x), b.min.y.min(p.y), b.min.z.min(p.z)),
            max: BlockPos::new(b.max.x.max(p.x), b.max.y.max(p.y), b.max.z.max(p.z)),
        }))
    }

    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
            && self.min.z <= other.max.z
            && other.min.z <= self.max.z
    }
}

impl fmt::Display for BlockBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]..[{}]", self.min, self.max)
    }
}

/// `max(1, total / target_ticks)`: spreads a build over about `target_ticks`
/// ticks while never placing fewer than one op per tick.
pub fn batch_size_for(total_ops: usize, target_ticks: usize) -> usize {
    (total_ops / target_ticks.max(1)).max(1)
}

/// What one batch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Ops attempted (the cursor advanced by this much).
    pub attempted: usize,
    /// Ops the world accepted.
    pub placed: usize,
    /// Ops the world refused; ignored.
    pub failed: usize,
    /// Set when the capability disappeared during the batch.
    pub capability_lost: Option<PlacementError>,
}

/// The full ordered op list of one accepted request plus its cursor and state.
#[derive(Debug)]
pub struct BuildJob {
    requester: RequesterId,
    dimension: DimensionId,
    label: String,
    ops: Vec<PlacementOp>,
    batch_size: usize,
    cursor: usize,
    state: JobState,
    cancel: CancelToken,
    placed: usize,
    failed: usize,
    ticks_run: u64,
    bounds: Option<BlockBounds>,
}

impl BuildJob {
    /// Create a pending job; the batch size is derived from `target_ticks`.
    pub fn new(
        requester: RequesterId,
        dimension: DimensionId,
        label: impl Into<String>,
        ops: Vec<PlacementOp>,
        target_ticks: usize,
    ) -> Self {
        let batch_size = batch_size_for(ops.len(), target_ticks);
        let bounds = BlockBounds::of_ops(&ops);
        Self {
            requester,
            dimension,
            label: label.into(),
            ops,
            batch_size,
            cursor: 0,
            state: JobState::Pending,
            cancel: CancelToken::new(),
            placed: 0,
            failed: 0,
            ticks_run: 0,
            bounds,
        }
    }

    pub fn requester(&self) -> RequesterId {
        self.requester
    }

    pub fn dimension(&self) -> DimensionId {
        self.dimension
    }

    /// Free-text prompt the job was built from.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn ops(&self) -> &[PlacementOp] {
        &self.ops
    }

    pub fn total(&self) -> usize {
        self.ops.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Index of the next unprocessed op.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn placed(&self) -> usize {
        self.placed
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Batches executed so far.
    pub fn ticks_run(&self) -> u64 {
        self.ticks_run
    }

    pub fn bounds(&self) -> Option<BlockBounds> {
        self.bounds
    }

    /// Handle that cancels this job before its next batch.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Ticks a fresh job needs: `ceil(total / batch_size)`, at least one.
    pub fn expected_ticks(&self) -> u64 {
        self.total().div_ceil(self.batch_size).max(1) as u64
    }

    pub(crate) fn set_state(&mut self, state: JobState) {
        debug_assert!(!self.state.is_terminal(), "terminal state is final");
        self.state = state;
    }

    /// Attempt ops `[cursor, min(cursor + batch_size, total))` against `mutator`.
    ///
    /// Per-op failures are counted and skipped. A capability loss stops the
    /// batch; the failing op still counts as attempted.
    pub(crate) fn run_batch(&mut self, mutator: &mut dyn WorldMutator) -> BatchOutcome {
        let start = self.cursor;
        let end = (start + self.batch_size).min(self.ops.len());
        let mut outcome = BatchOutcome {
            attempted: 0,
            placed: 0,
            failed: 0,
            capability_lost: None,
        };

        for op in &self.ops[start..end] {
            outcome.attempted += 1;
            let pos = op.block_pos();
            match mutator.set_voxel(pos, &op.material) {
                Ok(()) => outcome.placed += 1,
                Err(err) if err.is_capability_loss() => {
                    outcome.capability_lost = Some(err);
                    break;
                }
                Err(err) => {
                    outcome.failed += 1;
                    trace!(%pos, %err, "Placement failed; skipping");
                }
            }
        }

        self.cursor += outcome.attempted;
        self.placed += outcome.placed;
        self.failed += outcome.failed;
        self.ticks_run += 1;
        outcome
    }

    /// True once every op has been attempted.
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.ops.len()
    }
}
