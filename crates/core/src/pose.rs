//! Requester pose, cardinal orientation and block coordinates.

use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::DimensionId;

/// Integer block coordinate in world space.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct BlockPos {
    /// East (+) / west (-).
    pub x: i32,
    /// Height.
    pub y: i32,
    /// South (+) / north (-).
    pub z: i32,
}

impl BlockPos {
    /// Block at `(x, y, z)`.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The block cell containing the real-valued point `(x, y, z)`.
    pub fn containing(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: x.floor() as i32,
            y: y.floor() as i32,
            z: z.floor() as i32,
        }
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.x, self.y, self.z)
    }
}

/// Heading snapped to one of the four cardinal directions.
///
/// Degrees follow the block-game yaw convention: 0° looks towards +Z (south),
/// 90° towards -X (west), 180° towards -Z (north), 270° towards +X (east).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardinalYaw {
    /// 0°
    South,
    /// 90°
    West,
    /// 180°
    North,
    /// 270°
    East,
}

impl CardinalYaw {
    /// Snap an arbitrary heading in degrees to the nearest cardinal.
    ///
    /// Headings wrap around 360° (negative values included) and exact 45° ties
    /// round up, so 45° snaps to 90° and 315° snaps to 360° ≡ 0°.
    pub fn from_heading(heading_degrees: f64) -> Self {
        let wrapped = heading_degrees.rem_euclid(360.0);
        let quarter = (wrapped / 90.0 + 0.5).floor() as i64;
        match quarter.rem_euclid(4) {
            0 => Self::South,
            1 => Self::West,
            2 => Self::North,
            _ => Self::East,
        }
    }

    /// Snapped yaw in whole degrees (0, 90, 180 or 270).
    pub const fn degrees(self) -> u16 {
        match self {
            Self::South => 0,
            Self::West => 90,
            Self::North => 180,
            Self::East => 270,
        }
    }

    /// Snapped yaw in radians.
    pub fn radians(self) -> f64 {
        f64::from(self.degrees()).to_radians()
    }

    /// Unit vector pointing ahead of the requester: `(-sin yaw, 0, cos yaw)`.
    ///
    /// Returned as exact integers-in-floats; cardinal sines and cosines have no
    /// rounding residue that could shift a `floor` by one block.
    pub const fn forward(self) -> DVec3 {
        match self {
            Self::South => DVec3::new(0.0, 0.0, 1.0),
            Self::West => DVec3::new(-1.0, 0.0, 0.0),
            Self::North => DVec3::new(0.0, 0.0, -1.0),
            Self::East => DVec3::new(1.0, 0.0, 0.0),
        }
    }

    /// Unit vector to the requester's side: `(cos yaw, 0, sin yaw)`.
    pub const fn perpendicular(self) -> DVec3 {
        match self {
            Self::South => DVec3::new(1.0, 0.0, 0.0),
            Self::West => DVec3::new(0.0, 0.0, 1.0),
            Self::North => DVec3::new(-1.0, 0.0, 0.0),
            Self::East => DVec3::new(0.0, 0.0, -1.0),
        }
    }
}

impl fmt::Display for CardinalYaw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Position and facing of a requester, sampled once when a build is planned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RequesterPose {
    /// Feet position in world space.
    pub position: DVec3,
    /// Heading in degrees; any real value, wraps around 360.
    pub heading: f64,
    /// Dimension the requester stands in.
    pub dimension: DimensionId,
}

impl RequesterPose {
    /// Pose in the default dimension.
    pub fn new(position: DVec3, heading: f64) -> Self {
        Self {
            position,
            heading,
            dimension: DimensionId::DEFAULT,
        }
    }

    /// Heading snapped to the nearest cardinal.
    pub fn snapped_yaw(&self) -> CardinalYaw {
        CardinalYaw::from_heading(self.heading)
    }
}
