//! Spatial planning: orient a structure to the requester and anchor it in the world.

use glam::DVec3;
use promptbuild_core::{
    CardinalYaw, DimensionId, RequesterId, RequesterPose, StructureDescriptor, VoxelSpec,
};
use promptbuild_world::MaterialRegistry;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::job::{BuildJob, PlacementOp};

/// Distance in blocks from the requester to the centre of the structure.
pub const DEFAULT_PLACE_DISTANCE: f64 = 10.0;

/// Number of ticks a build should take regardless of its size.
pub const DEFAULT_TARGET_TICKS: usize = 200;

/// Planner tuning.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub place_distance: f64,
    pub target_ticks: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            place_distance: DEFAULT_PLACE_DISTANCE,
            target_ticks: DEFAULT_TARGET_TICKS,
        }
    }
}

/// The requester cannot be located, so there is nothing to anchor a build to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("{0} is not connected")]
    UnknownRequester(RequesterId),
    #[error("{0} has no position")]
    NoPosition(RequesterId),
    #[error("{requester} is in {dimension}, which has no loaded world")]
    WorldUnavailable {
        requester: RequesterId,
        dimension: DimensionId,
    },
}

/// Diagnostics of one planning run.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSummary {
    /// Voxels in the descriptor.
    pub received: usize,
    /// Ops in the resulting job.
    pub planned: usize,
    /// Voxels dropped for invalid materials or unaddressable coordinates.
    pub dropped: usize,
    pub yaw: CardinalYaw,
    pub corner: DVec3,
    pub batch_size: usize,
}

/// World-space origin of the structure's local `(0, 0, 0)`.
///
/// Places the structure centre `place_distance` blocks ahead of the requester
/// and centres it sideways:
/// `corner = position + forward*(place_distance + length/2) - perpendicular*(width/2)`.
/// The Y component is the requester's own Y.
pub fn corner(
    position: DVec3,
    yaw: CardinalYaw,
    width: u32,
    length: u32,
    place_distance: f64,
) -> DVec3 {
    let ahead = place_distance + f64::from(length) / 2.0;
    let aside = f64::from(width) / 2.0;
    let corner = position + yaw.forward() * ahead - yaw.perpendicular() * aside;
    DVec3::new(corner.x, position.y, corner.z)
}

/// World coordinates `(wx, wy, wz)` of a structure-local voxel.
///
/// `None` when the target cell cannot be addressed: a non-finite corner, or a
/// coordinate outside the `i32` block grid.
pub fn world_coords(corner: DVec3, yaw: CardinalYaw, spec: &VoxelSpec) -> Option<(f64, i32, f64)> {
    let forward = yaw.forward();
    let perp = yaw.perpendicular();
    let lx = f64::from(spec.lx);
    let lz = f64::from(spec.lz);
    let wx = corner.x + lx * perp.x + lz * forward.x;
    let wz = corner.z + lx * perp.z + lz * forward.z;
    block_coord(wx)?;
    block_coord(wz)?;
    let wy = block_coord(corner.y)?.checked_add(spec.ly)?;
    Some((wx, wy, wz))
}

/// The block index containing `v`, if it is on the grid.
fn block_coord(v: f64) -> Option<i32> {
    let cell = v.floor();
    (cell.is_finite() && cell >= f64::from(i32::MIN) && cell <= f64::from(i32::MAX))
        .then_some(cell as i32)
}

/// Turns descriptors into world-anchored [`BuildJob`]s.
pub struct StructurePlanner<'a> {
    registry: &'a MaterialRegistry,
    config: PlannerConfig,
}

impl<'a> StructurePlanner<'a> {
    pub fn new(registry: &'a MaterialRegistry, config: PlannerConfig) -> Self {
        Self { registry, config }
    }

    /// Plan a build for `requester` standing at `pose`.
    ///
    /// Voxels whose material does not validate, or whose target cell falls off
    /// the block grid, are dropped and counted; the rest keep their original
    /// order.
    #[instrument(skip(self, descriptor, pose), fields(blocks = descriptor.len()))]
    pub fn plan(
        &self,
        requester: RequesterId,
        label: &str,
        descriptor: &StructureDescriptor,
        pose: Option<RequesterPose>,
    ) -> Result<(BuildJob, PlanSummary), ContextError> {
        let pose = pose.ok_or(ContextError::NoPosition(requester))?;
        let yaw = pose.snapped_yaw();
        let corner = corner(
            pose.position,
            yaw,
            descriptor.width(),
            descriptor.length(),
            self.config.place_distance,
        );

        let mut ops = Vec::with_capacity(descriptor.len());
        let mut dropped = 0;
        for spec in descriptor.voxels() {
            let material = match self.registry.parse(&spec.material) {
                Ok(material) => material,
                Err(err) => {
                    dropped += 1;
                    debug!(material = %spec.material, %err, "Dropping voxel with invalid material");
                    continue;
                }
            };
            let Some((wx, wy, wz)) = world_coords(corner, yaw, spec) else {
                dropped += 1;
                debug!(
                    lx = spec.lx,
                    ly = spec.ly,
                    lz = spec.lz,
                    "Dropping voxel outside the block grid"
                );
                continue;
            };
            ops.push(PlacementOp {
                wx,
                wy,
                wz,
                material,
            });
        }

        let job = BuildJob::new(
            requester,
            pose.dimension,
            label,
            ops,
            self.config.target_ticks,
        );
        let summary = PlanSummary {
            received: descriptor.len(),
            planned: job.total(),
            dropped,
            yaw,
            corner,
            batch_size: job.batch_size(),
        };
        info!(
            %requester,
            yaw = %summary.yaw,
            corner = ?summary.corner,
            planned = summary.planned,
            dropped = summary.dropped,
            batch_size = summary.batch_size,
            "Build planned"
        );
        Ok((job, summary))
    }
}
