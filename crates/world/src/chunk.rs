use std::fmt;

use crate::{CHUNK_SIZE_X, CHUNK_SIZE_Z};

/// Palette index into the owning world's material table.
pub type PaletteId = u16;

/// Reserved palette id for air.
pub const PALETTE_AIR: PaletteId = 0;

/// Chunk coordinate (X,Z) in chunk space.
/// Implements Ord for deterministic iteration in BTreeMap/BTreeSet (sorts by x, then z).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk holding the world column `(x, z)` plus the column's chunk-local offset.
    pub fn of_world(x: i32, z: i32) -> (Self, usize, usize) {
        let sx = CHUNK_SIZE_X as i32;
        let sz = CHUNK_SIZE_Z as i32;
        (
            Self::new(x.div_euclid(sx), z.div_euclid(sz)),
            x.rem_euclid(sx) as usize,
            z.rem_euclid(sz) as usize,
        )
    }
}

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Column of palette ids covering the world's full build height.
pub struct Chunk {
    position: ChunkPos,
    height: usize,
    cells: Vec<PaletteId>,
    non_air: usize,
}

impl Chunk {
    /// Allocate a fresh chunk filled with air.
    pub fn new(position: ChunkPos, height: usize) -> Self {
        Self {
            position,
            height,
            cells: vec![PALETTE_AIR; CHUNK_SIZE_X * CHUNK_SIZE_Z * height],
            non_air: 0,
        }
    }

    #[inline]
    pub fn position(&self) -> ChunkPos {
        self.position
    }

    fn index(&self, x: usize, y: usize, z: usize) -> usize {
        debug_assert!(x < CHUNK_SIZE_X);
        debug_assert!(y < self.height);
        debug_assert!(z < CHUNK_SIZE_Z);
        (y * CHUNK_SIZE_Z + z) * CHUNK_SIZE_X + x
    }

    /// Palette id at chunk-local `(x, y, z)`; `y` counts up from the world floor.
    pub fn cell(&self, x: usize, y: usize, z: usize) -> PaletteId {
        self.cells[self.index(x, y, z)]
    }

    /// Write a cell; returns true if the stored value changed.
    pub fn set_cell(&mut self, x: usize, y: usize, z: usize, id: PaletteId) -> bool {
        let idx = self.index(x, y, z);
        let previous = self.cells[idx];
        if previous == id {
            return false;
        }
        match (previous == PALETTE_AIR, id == PALETTE_AIR) {
            (true, false) => self.non_air += 1,
            (false, true) => self.non_air -= 1,
            _ => {}
        }
        self.cells[idx] = id;
        true
    }

    /// Count of non-air cells.
    pub fn non_air_count(&self) -> usize {
        self.non_air
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_columns_map_to_chunks_with_negative_coordinates() {
        assert_eq!(ChunkPos::of_world(0, 0), (ChunkPos::new(0, 0), 0, 0));
        assert_eq!(ChunkPos::of_world(17, -1), (ChunkPos::new(1, -1), 1, 15));
        assert_eq!(ChunkPos::of_world(-16, -17), (ChunkPos::new(-1, -2), 0, 15));
    }

    #[test]
    fn set_cell_tracks_non_air_population() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0), 8);
        assert!(chunk.set_cell(1, 2, 3, 5));
        assert!(!chunk.set_cell(1, 2, 3, 5));
        assert_eq!(chunk.cell(1, 2, 3), 5);
        assert_eq!(chunk.non_air_count(), 1);
        assert!(chunk.set_cell(1, 2, 3, PALETTE_AIR));
        assert_eq!(chunk.non_air_count(), 0);
    }
}
