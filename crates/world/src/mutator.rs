use promptbuild_core::{BlockPos, DimensionId};
use thiserror::Error;

use crate::Material;

/// Failure of a single voxel write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    /// Target lies outside the world's vertical range.
    #[error("position {pos} is outside the build height {min_y}..{max_y}")]
    OutOfBounds { pos: BlockPos, min_y: i32, max_y: i32 },
    /// The world refuses this material (e.g. the palette is exhausted).
    #[error("material {0} cannot be placed")]
    Rejected(String),
    /// The world-mutation capability is gone; no later write can succeed.
    #[error("world {0} is no longer available for mutation")]
    Unavailable(DimensionId),
}

impl PlacementError {
    /// True when the error means the whole capability was lost.
    pub fn is_capability_loss(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// The single-writer capability to change voxels in one world.
///
/// Implementations are only ever driven from the host tick loop.
pub trait WorldMutator {
    /// Set the voxel at `pos` to `material`.
    fn set_voxel(&mut self, pos: BlockPos, material: &Material) -> Result<(), PlacementError>;
}

/// Resolves the mutation capability for a dimension at tick time.
///
/// Returning `None` means the dimension's world is not loaded (anymore).
pub trait MutatorSource {
    fn mutator(&mut self, dimension: DimensionId) -> Option<&mut dyn WorldMutator>;
}
