//! Authoritative build host: the single execution context that owns the
//! worlds, plans generated structures and paces their placement per tick.

pub mod dispatch;
pub mod job;
pub mod notice;
pub mod planner;
pub mod scheduler;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use promptbuild_core::{RequesterId, RequesterPose, SimTick, StructureDescriptor};
use promptbuild_net::{GenerationClient, GenerationError};
use promptbuild_world::{MaterialRegistry, WorldSet};
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{info, instrument, warn};

pub use dispatch::{HostMessage, Inbox, RequestId};
pub use job::{BuildJob, CancelToken, JobId, JobState, PlacementOp};
pub use notice::{Notice, NoticeLevel};
pub use planner::{ContextError, PlanSummary, PlannerConfig, StructurePlanner};
pub use scheduler::{AdmissionError, JobEvent, JobSnapshot, PlacementScheduler, SchedulerConfig};

use dispatch::Dispatcher;
use notice::NoticeBoard;

/// Host tuning.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ServerConfig {
    pub planner: PlannerConfig,
    pub scheduler: SchedulerConfig,
}

/// Running totals over the host's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub requests: usize,
    pub request_failures: usize,
    pub jobs_started: usize,
    pub jobs_completed: usize,
    pub jobs_aborted: usize,
    pub jobs_cancelled: usize,
    pub blocks_placed: usize,
    pub blocks_failed: usize,
    pub blocks_dropped: usize,
}

/// A generation request whose result has not been planned yet.
#[derive(Debug, Clone)]
struct PendingRequest {
    requester: RequesterId,
    prompt: String,
}

/// What happened during one [`Server::tick`].
#[derive(Debug, Default)]
pub struct TickReport {
    /// Jobs accepted this tick.
    pub started: Vec<(JobId, PlanSummary)>,
    /// Terminal transitions this tick.
    pub events: Vec<JobEvent>,
}

/// The single-writer host.
///
/// Everything that mutates a world runs inside [`Server::tick`]. Generation
/// results reach it only as [`HostMessage`]s on the inbox.
pub struct Server {
    config: ServerConfig,
    registry: MaterialRegistry,
    worlds: WorldSet,
    scheduler: PlacementScheduler,
    dispatcher: Dispatcher,
    inbox: Inbox,
    deferred: Vec<HostMessage>,
    requesters: BTreeMap<RequesterId, Option<RequesterPose>>,
    pending: BTreeMap<RequestId, PendingRequest>,
    job_owners: BTreeMap<JobId, RequesterId>,
    notices: NoticeBoard,
    stats: BuildStats,
    current_tick: SimTick,
}

impl Server {
    /// Create a host; fetches are spawned on `runtime`.
    pub fn new(
        config: ServerConfig,
        registry: MaterialRegistry,
        worlds: WorldSet,
        client: Arc<dyn GenerationClient>,
        runtime: Handle,
    ) -> Self {
        let (tx, inbox) = dispatch::channel();
        Self {
            config,
            registry,
            worlds,
            scheduler: PlacementScheduler::new(config.scheduler),
            dispatcher: Dispatcher::new(client, runtime, tx),
            inbox,
            deferred: Vec::new(),
            requesters: BTreeMap::new(),
            pending: BTreeMap::new(),
            job_owners: BTreeMap::new(),
            notices: NoticeBoard::default(),
            stats: BuildStats::default(),
            current_tick: SimTick::ZERO,
        }
    }

    pub fn add_requester(&mut self, requester: RequesterId, pose: Option<RequesterPose>) {
        self.requesters.insert(requester, pose);
    }

    /// Update a requester's pose; unknown requesters are registered.
    pub fn set_pose(&mut self, requester: RequesterId, pose: RequesterPose) {
        self.requesters.insert(requester, Some(pose));
    }

    pub fn pose(&self, requester: RequesterId) -> Option<RequesterPose> {
        self.requesters.get(&requester).copied().flatten()
    }

    /// Forget a requester: their jobs are cancelled and queued notices dropped.
    pub fn remove_requester(&mut self, requester: RequesterId) {
        if self.requesters.remove(&requester).is_none() {
            return;
        }
        let cancelled = self.scheduler.cancel_requester(requester);
        self.notices.discard(requester);
        info!(%requester, cancelled = cancelled.len(), "Requester removed");
    }

    /// Start a build for `requester` from a free-text prompt.
    ///
    /// Acknowledges immediately; the structure is fetched off the tick loop and
    /// planned on a later tick. A requester without a usable position is
    /// refused up front.
    #[instrument(skip(self))]
    pub fn request_build(
        &mut self,
        requester: RequesterId,
        prompt: &str,
    ) -> Result<RequestId, ContextError> {
        let prompt = prompt.trim();
        if let Err(err) = self.resolve_context(requester) {
            self.fail(requester, format!("[Build] Failed to plan build: {err}"));
            return Err(err);
        }

        self.notices.push(
            requester,
            self.current_tick,
            NoticeLevel::Info,
            format!("[Build] Sending request: \"{prompt}\"..."),
        );
        let request = self.dispatcher.spawn_fetch(requester, prompt);
        self.pending.insert(
            request,
            PendingRequest {
                requester,
                prompt: prompt.to_string(),
            },
        );
        self.stats.requests += 1;
        info!(%request, "Generation request dispatched");
        Ok(request)
    }

    /// Cancel one job of `requester`, or all of them when `job` is `None`.
    ///
    /// Returns the jobs that will stop before their next batch.
    pub fn cancel(&mut self, requester: RequesterId, job: Option<JobId>) -> Vec<JobId> {
        match job {
            Some(id) if self.job_owners.get(&id) == Some(&requester) => {
                if self.scheduler.cancel(id) {
                    vec![id]
                } else {
                    Vec::new()
                }
            }
            Some(_) => Vec::new(),
            None => self.scheduler.cancel_requester(requester),
        }
    }

    /// Run one host tick: place one batch of every running job, then plan the
    /// structures that arrived. A job started here places its first batch on
    /// the next tick.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        let events = self.scheduler.tick(&mut self.worlds);
        for event in &events {
            self.on_job_event(event);
        }
        report.events = events;

        let mut messages = std::mem::take(&mut self.deferred);
        messages.extend(self.inbox.drain());
        for msg in messages {
            match msg {
                HostMessage::Generated {
                    request,
                    requester,
                    prompt,
                    result,
                } => {
                    self.pending.remove(&request);
                    if let Some(started) = self.on_generated(request, requester, &prompt, result)
                    {
                        report.started.push(started);
                    }
                }
            }
        }

        self.current_tick = self.current_tick.advance(1);
        report
    }

    /// Wait until every outstanding generation request has answered.
    ///
    /// The answers are held back and planned by the next [`Server::tick`].
    pub async fn wait_for_responses(&mut self) {
        let mut answered: BTreeSet<RequestId> = self
            .deferred
            .iter()
            .map(|HostMessage::Generated { request, .. }| *request)
            .collect();
        while self.pending.keys().any(|id| !answered.contains(id)) {
            match self.inbox.recv().await {
                Some(msg) => {
                    let HostMessage::Generated { request, .. } = &msg;
                    answered.insert(*request);
                    self.deferred.push(msg);
                }
                None => break,
            }
        }
    }

    fn on_generated(
        &mut self,
        request: RequestId,
        requester: RequesterId,
        prompt: &str,
        result: Result<StructureDescriptor, GenerationError>,
    ) -> Option<(JobId, PlanSummary)> {
        if !self.requesters.contains_key(&requester) {
            info!(%request, %requester, "Dropping generation result for departed requester");
            return None;
        }

        let descriptor = match result {
            Ok(descriptor) => descriptor,
            Err(err) => {
                warn!(%request, %err, "Generation failed");
                self.stats.request_failures += 1;
                self.fail(requester, format!("[Build] {err}"));
                return None;
            }
        };

        // The pose is sampled now, not when the request was sent.
        let pose = match self.resolve_context(requester) {
            Ok(pose) => pose,
            Err(err) => {
                warn!(%request, %err, "Cannot plan build");
                self.stats.request_failures += 1;
                self.fail(requester, format!("[Build] Failed to plan build: {err}"));
                return None;
            }
        };

        let planner = StructurePlanner::new(&self.registry, self.config.planner);
        let (job, summary) = match planner.plan(requester, prompt, &descriptor, Some(pose)) {
            Ok(planned) => planned,
            Err(err) => {
                self.stats.request_failures += 1;
                self.fail(requester, format!("[Build] Failed to plan build: {err}"));
                return None;
            }
        };

        let id = match self.scheduler.start(job) {
            Ok(id) => id,
            Err(err) => {
                warn!(%request, %err, "Build refused");
                self.stats.request_failures += 1;
                self.fail(requester, format!("[Build] Failed to start build: {err}"));
                return None;
            }
        };

        self.job_owners.insert(id, requester);
        self.stats.jobs_started += 1;
        self.stats.blocks_dropped += summary.dropped;
        let mut text = format!("[Build] Placing {} blocks...", summary.planned);
        if summary.dropped > 0 {
            text.push_str(&format!(" ({} skipped: invalid material)", summary.dropped));
        }
        self.notices
            .push(requester, self.current_tick, NoticeLevel::Info, text);
        info!(%request, job = %id, "Build accepted");
        Some((id, summary))
    }

    fn on_job_event(&mut self, event: &JobEvent) {
        self.job_owners.remove(&event.job());
        let requester = event.requester();
        let notify = self.requesters.contains_key(&requester);
        match event {
            JobEvent::Completed { placed, failed, .. } => {
                self.stats.jobs_completed += 1;
                self.stats.blocks_placed += placed;
                self.stats.blocks_failed += failed;
                if notify {
                    let text = if *failed > 0 {
                        format!("[Build] Done! ({failed} blocks could not be placed)")
                    } else {
                        "[Build] Done!".to_string()
                    };
                    self.notices
                        .push(requester, self.current_tick, NoticeLevel::Success, text);
                }
            }
            JobEvent::Aborted { reason, .. } => {
                self.stats.jobs_aborted += 1;
                if notify {
                    self.fail(requester, format!("[Build] Aborted: {reason}"));
                }
            }
            JobEvent::Cancelled { cursor, total, .. } => {
                self.stats.jobs_cancelled += 1;
                if notify {
                    self.notices.push(
                        requester,
                        self.current_tick,
                        NoticeLevel::Info,
                        format!("[Build] Cancelled after {cursor}/{total} blocks."),
                    );
                }
            }
        }
    }

    fn resolve_context(&self, requester: RequesterId) -> Result<RequesterPose, ContextError> {
        let pose = self
            .requesters
            .get(&requester)
            .copied()
            .ok_or(ContextError::UnknownRequester(requester))?
            .ok_or(ContextError::NoPosition(requester))?;
        if !self.worlds.contains(pose.dimension) {
            return Err(ContextError::WorldUnavailable {
                requester,
                dimension: pose.dimension,
            });
        }
        Ok(pose)
    }

    fn fail(&mut self, requester: RequesterId, text: String) {
        self.notices
            .push(requester, self.current_tick, NoticeLevel::Failure, text);
    }

    /// Take every queued notice.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain()
    }

    /// Take the queued notices of one requester.
    pub fn drain_notices_for(&mut self, requester: RequesterId) -> Vec<Notice> {
        self.notices.drain_for(requester)
    }

    pub fn worlds(&self) -> &WorldSet {
        &self.worlds
    }

    pub fn worlds_mut(&mut self) -> &mut WorldSet {
        &mut self.worlds
    }

    pub fn registry(&self) -> &MaterialRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &PlacementScheduler {
        &self.scheduler
    }

    pub fn active_jobs(&self) -> Vec<JobSnapshot> {
        self.scheduler.active_jobs()
    }

    pub fn stats(&self) -> BuildStats {
        self.stats
    }

    pub fn current_tick(&self) -> SimTick {
        self.current_tick
    }

    /// Requests awaiting their generation result.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Prompts of `requester` still waiting on the generation service.
    pub fn pending_prompts(&self, requester: RequesterId) -> Vec<(RequestId, String)> {
        self.pending
            .iter()
            .filter(|(_, p)| p.requester == requester)
            .map(|(&id, p)| (id, p.prompt.clone()))
            .collect()
    }

    /// Nothing in flight and nothing running.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.deferred.is_empty() && self.scheduler.is_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;
    use promptbuild_core::{BlockPos, DimensionId, VoxelSpec};
    use promptbuild_testkit::{hollow_box, MockGenerationClient};
    use promptbuild_world::VoxelWorld;

    const PLAYER: RequesterId = RequesterId(1);

    fn overworld() -> WorldSet {
        let mut worlds = WorldSet::new();
        worlds.insert(VoxelWorld::new(DimensionId::Overworld, -64, 320));
        worlds
    }

    fn server(client: MockGenerationClient) -> Server {
        let mut server = Server::new(
            ServerConfig::default(),
            MaterialRegistry::builtin(),
            overworld(),
            Arc::new(client),
            Handle::current(),
        );
        server.add_requester(
            PLAYER,
            Some(RequesterPose::new(DVec3::new(0.0, 64.0, 0.0), 0.0)),
        );
        server
    }

    fn small_house() -> StructureDescriptor {
        StructureDescriptor::new(Some(2), Some(2), vec![VoxelSpec::new(0, 0, 0, "stone")])
            .unwrap()
    }

    fn texts(notices: Vec<Notice>) -> Vec<String> {
        notices.into_iter().map(|n| n.text).collect()
    }

    #[tokio::test]
    async fn small_house_places_one_block_in_one_tick() {
        let client = MockGenerationClient::new().respond("a small house", Ok(small_house()));
        let mut server = server(client);

        server.request_build(PLAYER, "a small house").unwrap();
        assert_eq!(
            texts(server.drain_notices()),
            vec!["[Build] Sending request: \"a small house\"..."]
        );

        server.wait_for_responses().await;
        let report = server.tick();
        assert_eq!(report.started.len(), 1);
        assert_eq!(report.started[0].1.planned, 1);
        assert!(report.events.is_empty());
        assert_eq!(
            texts(server.drain_notices()),
            vec!["[Build] Placing 1 blocks..."]
        );

        // One batch on the following tick finishes it.
        let report = server.tick();
        assert!(matches!(
            report.events.as_slice(),
            [JobEvent::Completed { placed: 1, failed: 0, ticks: 1, .. }]
        ));
        assert_eq!(texts(server.drain_notices()), vec!["[Build] Done!"]);
        assert!(server.tick().events.is_empty());
        assert!(server.drain_notices().is_empty());

        // Facing south from the origin: corner (-1, 64, 11).
        let world = server.worlds().get(DimensionId::Overworld).unwrap();
        let stone = world.material_at(BlockPos::new(-1, 64, 11)).unwrap();
        assert_eq!(stone.to_string(), "minecraft:stone");
        assert_eq!(world.non_air_count(), 1);
        assert!(server.is_idle());
    }

    #[tokio::test]
    async fn generation_failure_is_reported_once_without_a_job() {
        let client = MockGenerationClient::new().respond(
            "a castle",
            Err(GenerationError::Protocol(
                "server response missing 'blocks'".into(),
            )),
        );
        let mut server = server(client);
        server.request_build(PLAYER, "a castle").unwrap();
        server.drain_notices();

        server.wait_for_responses().await;
        let report = server.tick();
        assert!(report.started.is_empty());
        let notices = server.drain_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Failure);
        assert!(notices[0].text.contains("missing 'blocks'"));
        assert_eq!(server.stats().request_failures, 1);
        assert!(server.is_idle());
    }

    #[tokio::test]
    async fn requester_without_position_is_refused_immediately() {
        let client = MockGenerationClient::new();
        let mut server = server(client);
        server.add_requester(RequesterId(2), None);

        let err = server.request_build(RequesterId(2), "a hut").unwrap_err();
        assert_eq!(err, ContextError::NoPosition(RequesterId(2)));
        assert_eq!(server.pending_requests(), 0);
        let notices = server.drain_notices_for(RequesterId(2));
        assert_eq!(notices.len(), 1);
        assert!(notices[0].text.starts_with("[Build] Failed to plan build"));
    }

    #[tokio::test]
    async fn pose_is_sampled_when_the_structure_arrives() {
        let client = MockGenerationClient::new().fallback(Ok(small_house()));
        let mut server = server(client);
        server.request_build(PLAYER, "hut").unwrap();

        // Turn to face east before the answer comes back.
        server.set_pose(PLAYER, RequesterPose::new(DVec3::new(0.0, 64.0, 0.0), 270.0));
        server.wait_for_responses().await;
        let report = server.tick();
        assert_eq!(report.started[0].1.yaw, promptbuild_core::CardinalYaw::East);
    }

    #[tokio::test]
    async fn cancel_stops_a_running_job_with_one_notice() {
        let client = MockGenerationClient::new().fallback(Ok(hollow_box(20, 20, 3, "stone").unwrap()));
        let mut server = server(client);
        server.request_build(PLAYER, "big").unwrap();
        server.wait_for_responses().await;
        let report = server.tick();
        let (job, summary) = &report.started[0];
        assert_eq!(summary.batch_size, 2);
        server.tick();
        server.drain_notices();

        assert_eq!(server.cancel(RequesterId(99), Some(*job)), Vec::<JobId>::new());
        assert_eq!(server.cancel(PLAYER, None), vec![*job]);
        let report = server.tick();
        assert!(matches!(
            report.events.as_slice(),
            [JobEvent::Cancelled { cursor: 2, .. }]
        ));
        assert_eq!(
            texts(server.drain_notices()),
            vec![format!("[Build] Cancelled after 2/{} blocks.", summary.planned)]
        );
        let placed = server
            .worlds()
            .get(DimensionId::Overworld)
            .unwrap()
            .non_air_count();
        assert_eq!(placed, 2);

        server.tick();
        assert!(server.drain_notices().is_empty());
    }

    #[tokio::test]
    async fn unloading_the_world_aborts_the_job() {
        let client = MockGenerationClient::new().fallback(Ok(hollow_box(20, 20, 3, "stone").unwrap()));
        let mut server = server(client);
        server.request_build(PLAYER, "big").unwrap();
        server.wait_for_responses().await;
        server.tick();
        server.tick();
        server.drain_notices();

        server.worlds_mut().unload(DimensionId::Overworld);
        let report = server.tick();
        assert!(matches!(report.events.as_slice(), [JobEvent::Aborted { .. }]));
        let notices = server.drain_notices();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].text.starts_with("[Build] Aborted:"));
        assert_eq!(server.stats().jobs_aborted, 1);
    }
}
