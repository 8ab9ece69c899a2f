//! Property tests for planning and pacing.

use glam::DVec3;
use promptbuild_core::{RequesterId, RequesterPose, StructureDescriptor, VoxelSpec};
use promptbuild_server::{JobEvent, PlacementScheduler, PlannerConfig, StructurePlanner};
use promptbuild_testkit::RecordingMutator;
use promptbuild_world::MaterialRegistry;
use proptest::prelude::*;

const MATERIALS: &[&str] = &[
    "stone",
    "oak_planks",
    "oak_log[axis=y]",
    "oak_stairs[facing=north,half=bottom]",
    "glass",
    "not_a_block",
    "oak_log[axis=w]",
    "stone[",
    "",
];

fn voxel() -> impl Strategy<Value = VoxelSpec> {
    (-16i32..16, 0i32..16, -16i32..16, 0..MATERIALS.len())
        .prop_map(|(x, y, z, m)| VoxelSpec::new(x, y, z, MATERIALS[m]))
}

fn plan(
    voxels: Vec<VoxelSpec>,
    heading: f64,
    target_ticks: usize,
) -> (promptbuild_server::BuildJob, promptbuild_server::PlanSummary) {
    let registry = MaterialRegistry::builtin();
    let planner = StructurePlanner::new(
        &registry,
        PlannerConfig {
            place_distance: 10.0,
            target_ticks,
        },
    );
    let descriptor = StructureDescriptor::new(Some(8), Some(8), voxels).unwrap();
    let pose = RequesterPose::new(DVec3::new(3.5, 64.0, -7.25), heading);
    planner
        .plan(RequesterId(1), "prop", &descriptor, Some(pose))
        .unwrap()
}

proptest! {
    /// Property: ops never outnumber blocks; equal iff every material validates
    #[test]
    fn ops_never_exceed_blocks(
        voxels in prop::collection::vec(voxel(), 0..128),
        heading in -720.0f64..720.0,
    ) {
        let registry = MaterialRegistry::builtin();
        let all_valid = voxels.iter().all(|v| registry.parse(&v.material).is_ok());
        let received = voxels.len();
        let (job, summary) = plan(voxels, heading, 200);

        prop_assert!(job.total() <= received);
        prop_assert_eq!(job.total() == received, all_valid);
        prop_assert_eq!(summary.planned + summary.dropped, received);
        prop_assert!(job.batch_size() >= 1);
    }

    /// Property: a job completes exactly once after ceil(N / batch) ticks and
    /// its cursor never goes backwards
    #[test]
    fn job_completes_once_after_expected_ticks(
        count in 0usize..700,
        target_ticks in 1usize..300,
    ) {
        let voxels = (0..count)
            .map(|i| VoxelSpec::new((i % 8) as i32, (i / 64) as i32, ((i / 8) % 8) as i32, "stone"))
            .collect();
        let (job, _) = plan(voxels, 0.0, target_ticks);
        prop_assert_eq!(job.batch_size(), (count / target_ticks).max(1));
        let expected = job.expected_ticks();

        let mut scheduler = PlacementScheduler::default();
        let mut worlds = RecordingMutator::new();
        scheduler.start(job).unwrap();

        let mut completions = 0;
        let mut completed_at = None;
        let mut last_cursor = 0;
        for tick in 1..=expected + 3 {
            for event in scheduler.tick(&mut worlds) {
                let completed = matches!(event, JobEvent::Completed { .. });
                prop_assert!(completed, "unexpected event {:?}", event);
                completions += 1;
                completed_at = Some(tick);
            }
            if let Some(snapshot) = scheduler.active_jobs().first() {
                prop_assert!(snapshot.cursor >= last_cursor);
                prop_assert!(snapshot.cursor <= snapshot.total);
                last_cursor = snapshot.cursor;
            }
        }

        prop_assert_eq!(completions, 1);
        prop_assert_eq!(completed_at, Some(expected));
        prop_assert_eq!(worlds.calls().len(), count);
    }
}
