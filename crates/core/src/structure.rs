//! Structure descriptors as delivered by the generation service.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One voxel placement in structure-local coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoxelSpec {
    /// Local X (across the structure's width).
    pub lx: i32,
    /// Local Y (height above the structure's floor).
    pub ly: i32,
    /// Local Z (along the structure's length).
    pub lz: i32,
    /// Opaque material descriptor, validated later against the world grammar.
    pub material: String,
}

impl VoxelSpec {
    /// Voxel at local `(lx, ly, lz)` with an unvalidated material descriptor.
    pub fn new(lx: i32, ly: i32, lz: i32, material: impl Into<String>) -> Self {
        Self {
            lx,
            ly,
            lz,
            material: material.into(),
        }
    }
}

/// Errors raised while assembling a [`StructureDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureError {
    /// Width, length or height was zero or negative.
    #[error("structure {axis} must be a positive integer, got {value}")]
    NonPositiveDimension {
        /// Which dimension was rejected.
        axis: &'static str,
        /// The value received.
        value: i64,
    },
}

/// Footprint plus ordered voxel list of a generated structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureDescriptor {
    width: u32,
    length: u32,
    height: Option<u32>,
    voxels: Vec<VoxelSpec>,
}

impl StructureDescriptor {
    /// Build a descriptor; absent width/length default to 1.
    pub fn new(
        width: Option<i64>,
        length: Option<i64>,
        voxels: Vec<VoxelSpec>,
    ) -> Result<Self, StructureError> {
        Ok(Self {
            width: positive("width", width.unwrap_or(1))?,
            length: positive("length", length.unwrap_or(1))?,
            height: None,
            voxels,
        })
    }

    /// Attach the informational height reported by the service.
    pub fn with_height(mut self, height: Option<i64>) -> Result<Self, StructureError> {
        self.height = height.map(|h| positive("height", h)).transpose()?;
        Ok(self)
    }

    /// Footprint width (local X extent).
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Footprint length (local Z extent).
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Reported height, if the service sent one.
    pub fn height(&self) -> Option<u32> {
        self.height
    }

    /// Voxels in delivery order.
    pub fn voxels(&self) -> &[VoxelSpec] {
        &self.voxels
    }

    /// Number of voxel placements.
    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    /// True when the descriptor contains no voxels.
    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }
}

fn positive(axis: &'static str, value: i64) -> Result<u32, StructureError> {
    match u32::try_from(value) {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(StructureError::NonPositiveDimension { axis, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_dimensions_default_to_one() {
        let desc = StructureDescriptor::new(None, None, vec![]).unwrap();
        assert_eq!((desc.width(), desc.length()), (1, 1));
        assert!(desc.is_empty());
        assert_eq!(desc.height(), None);
    }

    #[test]
    fn non_positive_dimensions_are_rejected() {
        let err = StructureDescriptor::new(Some(0), Some(3), vec![]).unwrap_err();
        assert_eq!(
            err,
            StructureError::NonPositiveDimension {
                axis: "width",
                value: 0
            }
        );
        assert!(StructureDescriptor::new(Some(2), Some(-1), vec![]).is_err());
        assert!(StructureDescriptor::new(Some(2), Some(2), vec![])
            .unwrap()
            .with_height(Some(0))
            .is_err());
    }
}
