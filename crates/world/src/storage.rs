use std::collections::{BTreeMap, BTreeSet, HashMap};

use promptbuild_core::{BlockPos, DimensionId};
use tracing::{debug, info, warn};

use crate::{
    Chunk, ChunkPos, Material, MutatorSource, PaletteId, PlacementError, WorldMutator,
    MAX_BUILD_HEIGHT, PALETTE_AIR,
};

/// In-memory voxel world for one dimension.
///
/// Chunks are created lazily on first write and kept in a BTreeMap so that
/// iteration order is deterministic.
pub struct VoxelWorld {
    dimension: DimensionId,
    min_y: i32,
    max_y: i32,
    chunks: BTreeMap<ChunkPos, Chunk>,
    palette: Vec<Option<Material>>,
    palette_ids: HashMap<Material, PaletteId>,
    dirty: BTreeSet<ChunkPos>,
    writes: u64,
}

impl VoxelWorld {
    /// Create an empty world spanning `min_y..max_y` (exclusive upper bound).
    ///
    /// The span is clamped to `1..=MAX_BUILD_HEIGHT` blocks above `min_y`.
    pub fn new(dimension: DimensionId, min_y: i32, max_y: i32) -> Self {
        let min_y = min_y.min(i32::MAX - 1);
        let span = (i64::from(max_y) - i64::from(min_y)).clamp(1, i64::from(MAX_BUILD_HEIGHT));
        let clamped = (i64::from(min_y) + span).min(i64::from(i32::MAX)) as i32;
        if clamped != max_y {
            warn!(%dimension, min_y, max_y, used = clamped, "Build height range clamped");
        }
        let max_y = clamped;
        Self {
            dimension,
            min_y,
            max_y,
            chunks: BTreeMap::new(),
            // Slot 0 is air and never holds a material.
            palette: vec![None],
            palette_ids: HashMap::new(),
            dirty: BTreeSet::new(),
            writes: 0,
        }
    }

    pub fn dimension(&self) -> DimensionId {
        self.dimension
    }

    /// Vertical build range as `(min_y, max_y)`, upper bound exclusive.
    pub fn height_range(&self) -> (i32, i32) {
        (self.min_y, self.max_y)
    }

    fn height(&self) -> usize {
        (self.max_y - self.min_y) as usize
    }

    /// Material stored at `pos`, `None` for air or untouched space.
    pub fn material_at(&self, pos: BlockPos) -> Option<&Material> {
        if pos.y < self.min_y || pos.y >= self.max_y {
            return None;
        }
        let (chunk_pos, lx, lz) = ChunkPos::of_world(pos.x, pos.z);
        let chunk = self.chunks.get(&chunk_pos)?;
        let id = chunk.cell(lx, (pos.y - self.min_y) as usize, lz);
        self.palette.get(id as usize).and_then(Option::as_ref)
    }

    /// Total number of non-air voxels.
    pub fn non_air_count(&self) -> usize {
        self.chunks.values().map(Chunk::non_air_count).sum()
    }

    /// Number of successful voxel writes since creation.
    pub fn write_count(&self) -> u64 {
        self.writes
    }

    /// Resident chunk count.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Consume the set of chunks changed since the last call.
    pub fn take_dirty_chunks(&mut self) -> Vec<ChunkPos> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }

    fn palette_id(&mut self, material: &Material) -> Result<PaletteId, PlacementError> {
        if material.is_air() {
            return Ok(PALETTE_AIR);
        }
        if let Some(id) = self.palette_ids.get(material) {
            return Ok(*id);
        }
        let id = PaletteId::try_from(self.palette.len())
            .map_err(|_| PlacementError::Rejected(material.to_string()))?;
        self.palette.push(Some(material.clone()));
        self.palette_ids.insert(material.clone(), id);
        debug!(dimension = %self.dimension, %material, id, "Palette entry added");
        Ok(id)
    }
}

impl WorldMutator for VoxelWorld {
    fn set_voxel(&mut self, pos: BlockPos, material: &Material) -> Result<(), PlacementError> {
        if pos.y < self.min_y || pos.y >= self.max_y {
            return Err(PlacementError::OutOfBounds {
                pos,
                min_y: self.min_y,
                max_y: self.max_y,
            });
        }
        let id = self.palette_id(material)?;
        let (chunk_pos, lx, lz) = ChunkPos::of_world(pos.x, pos.z);
        let height = self.height();
        let local_y = (pos.y - self.min_y) as usize;
        let chunk = self
            .chunks
            .entry(chunk_pos)
            .or_insert_with(|| Chunk::new(chunk_pos, height));
        if chunk.set_cell(lx, local_y, lz, id) {
            self.dirty.insert(chunk_pos);
        }
        self.writes += 1;
        Ok(())
    }
}

/// All loaded worlds, keyed by dimension.
#[derive(Default)]
pub struct WorldSet {
    worlds: BTreeMap<DimensionId, VoxelWorld>,
}

impl WorldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load (or replace) the world for its dimension.
    pub fn insert(&mut self, world: VoxelWorld) {
        info!(dimension = %world.dimension(), "World loaded");
        self.worlds.insert(world.dimension(), world);
    }

    /// Unload a dimension, revoking its mutation capability.
    pub fn unload(&mut self, dimension: DimensionId) -> Option<VoxelWorld> {
        let removed = self.worlds.remove(&dimension);
        if removed.is_some() {
            info!(%dimension, "World unloaded");
        }
        removed
    }

    pub fn get(&self, dimension: DimensionId) -> Option<&VoxelWorld> {
        self.worlds.get(&dimension)
    }

    pub fn get_mut(&mut self, dimension: DimensionId) -> Option<&mut VoxelWorld> {
        self.worlds.get_mut(&dimension)
    }

    pub fn contains(&self, dimension: DimensionId) -> bool {
        self.worlds.contains_key(&dimension)
    }
}

impl MutatorSource for WorldSet {
    fn mutator(&mut self, dimension: DimensionId) -> Option<&mut dyn WorldMutator> {
        self.worlds
            .get_mut(&dimension)
            .map(|world| world as &mut dyn WorldMutator)
    }
}
