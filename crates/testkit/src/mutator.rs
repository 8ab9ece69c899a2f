//! In-memory [`WorldMutator`] that records every write.

use std::collections::BTreeSet;

use promptbuild_core::{BlockPos, DimensionId};
use promptbuild_world::{Material, MutatorSource, PlacementError, WorldMutator};

/// Records `set_voxel` calls in order and fails on demand.
///
/// As a [`MutatorSource`] it serves every dimension unless narrowed with
/// [`RecordingMutator::only`].
#[derive(Debug, Default)]
pub struct RecordingMutator {
    calls: Vec<(BlockPos, Material)>,
    failing: BTreeSet<BlockPos>,
    unavailable: bool,
    dimensions: Option<BTreeSet<DimensionId>>,
}

impl RecordingMutator {
    /// A mutator that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve only `dimension`; other dimensions resolve to `None`.
    pub fn only(mut self, dimension: DimensionId) -> Self {
        self.dimensions
            .get_or_insert_with(BTreeSet::new)
            .insert(dimension);
        self
    }

    /// Reject writes to `pos` with [`PlacementError::Rejected`].
    pub fn fail_at(&mut self, pos: BlockPos) {
        self.failing.insert(pos);
    }

    /// While set, every write reports a capability loss.
    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    /// Every attempted write in call order, including rejected ones.
    pub fn calls(&self) -> &[(BlockPos, Material)] {
        &self.calls
    }

    /// Positions that were written successfully, in order.
    pub fn placed(&self) -> Vec<BlockPos> {
        self.calls
            .iter()
            .map(|(pos, _)| *pos)
            .filter(|pos| !self.failing.contains(pos))
            .collect()
    }
}

impl WorldMutator for RecordingMutator {
    fn set_voxel(&mut self, pos: BlockPos, material: &Material) -> Result<(), PlacementError> {
        if self.unavailable {
            return Err(PlacementError::Unavailable(DimensionId::DEFAULT));
        }
        self.calls.push((pos, material.clone()));
        if self.failing.contains(&pos) {
            return Err(PlacementError::Rejected(material.to_string()));
        }
        Ok(())
    }
}

impl MutatorSource for RecordingMutator {
    fn mutator(&mut self, dimension: DimensionId) -> Option<&mut dyn WorldMutator> {
        if let Some(served) = &self.dimensions {
            if !served.contains(&dimension) {
                return None;
            }
        }
        Some(self)
    }
}
