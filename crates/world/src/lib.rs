//! Voxel world capability: material grammar, chunked storage and the
//! single-writer mutation interface used by the placement scheduler.

mod chunk;
mod material;
mod mutator;
mod storage;

pub use chunk::*;
pub use material::*;
pub use mutator::*;
pub use storage::*;

/// Chunk width (X axis) in voxels.
pub const CHUNK_SIZE_X: usize = 16;
/// Chunk depth (Z axis) in voxels.
pub const CHUNK_SIZE_Z: usize = 16;

/// Default lowest buildable Y.
pub const DEFAULT_MIN_Y: i32 = -64;
/// Default exclusive upper build limit.
pub const DEFAULT_MAX_Y: i32 = 320;

/// Tallest vertical range a world may span; every chunk allocates all of it.
pub const MAX_BUILD_HEIGHT: i32 = 4096;
