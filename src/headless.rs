use crate::command_script::BuildScript;
use crate::commands::{execute_command, parse_command, BuildCommand, CommandError, ConsoleSession};
use crate::config::BuildConfig;
use crate::report::{EventRecord, ExecutionMetrics, JsonlSink, MetricsReportBuilder, MetricsSink};
use anyhow::{Context, Result};
use promptbuild_core::{RequesterId, SimTick};
use promptbuild_net::HttpGenerationClient;
use promptbuild_server::{BuildStats, JobEvent, Notice, Server, TickReport};
use promptbuild_world::MaterialRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

pub struct HeadlessConfig {
    pub build: BuildConfig,
    pub registry: MaterialRegistry,
    /// Issued on the first tick, before the script.
    pub commands: Vec<String>,
    pub command_script: Option<PathBuf>,
    pub max_ticks: Option<u64>,
    pub exit_when_idle: bool,
    pub event_log: Option<PathBuf>,
    pub metrics: Option<PathBuf>,
}

pub async fn run(cfg: HeadlessConfig) -> Result<()> {
    let client = HttpGenerationClient::new(cfg.build.endpoint.clone(), cfg.build.request_timeout())
        .context("failed to create generation client")?;
    let mut server = Server::new(
        cfg.build.server_config(),
        cfg.registry,
        cfg.build.build_worlds(),
        Arc::new(client),
        Handle::current(),
    );
    server.add_requester(RequesterId::CONSOLE, Some(cfg.build.spawn_pose()));

    let mut script = match &cfg.command_script {
        Some(path) => Some(
            BuildScript::from_path(path)
                .with_context(|| format!("failed to load command script {}", path.display()))?,
        ),
        None => None,
    };
    let mut log = match &cfg.event_log {
        Some(path) => Some(
            JsonlSink::create(path)
                .with_context(|| format!("failed to create event log {}", path.display()))?,
        ),
        None => None,
    };

    if let Some(last) = script.as_ref().and_then(BuildScript::last_tick) {
        info!(last_tick = last.0, "Command script loaded");
    }

    let started = Instant::now();
    let mut initial = cfg.commands;
    let mut ticker = interval(cfg.build.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        tick_interval_ms = cfg.build.tick_interval_ms,
        endpoint = %cfg.build.endpoint,
        "Headless host running"
    );

    loop {
        ticker.tick().await;
        let tick = server.current_tick();

        for input in std::mem::take(&mut initial) {
            let parsed = parse_command(&input);
            run_command(&mut server, &input, parsed, tick, log.as_mut())?;
        }
        if let Some(script) = script.as_mut() {
            for step in script.take_due(tick) {
                run_command(&mut server, &step.source, Ok(step.command), tick, log.as_mut())?;
            }
        }
        write_notices(server.drain_notices(), log.as_mut())?;

        let report = server.tick();
        write_report(&report, tick, log.as_mut())?;
        write_notices(server.drain_notices(), log.as_mut())?;

        let ticks_run = server.current_tick().0;
        if cfg.max_ticks.is_some_and(|max| ticks_run >= max) {
            info!(ticks = ticks_run, "Reached --max-ticks");
            break;
        }
        let script_done = script.as_ref().map_or(true, BuildScript::is_finished);
        if cfg.exit_when_idle && script_done && server.is_idle() {
            info!(ticks = ticks_run, "All builds finished");
            break;
        }
    }

    let stats = server.stats();
    info!(
        requests = stats.requests,
        completed = stats.jobs_completed,
        aborted = stats.jobs_aborted,
        cancelled = stats.jobs_cancelled,
        placed = stats.blocks_placed,
        "Headless host stopped"
    );
    if let Some(path) = &cfg.metrics {
        write_metrics(path, stats, server.current_tick(), started)?;
    }
    Ok(())
}

fn run_command(
    server: &mut Server,
    input: &str,
    parsed: Result<BuildCommand, CommandError>,
    tick: SimTick,
    log: Option<&mut JsonlSink>,
) -> Result<()> {
    println!("> {input}");
    let lines = match parsed {
        Ok(cmd) => {
            let mut session = ConsoleSession {
                server,
                requester: RequesterId::CONSOLE,
            };
            execute_command(&mut session, cmd).lines
        }
        Err(err) => {
            warn!(%err, command = input, "Rejected command");
            vec![format!("Error: {err}")]
        }
    };
    for line in &lines {
        println!("{line}");
    }
    if let Some(log) = log {
        log.write(&EventRecord {
            tick,
            kind: "command",
            payload: input,
        })?;
    }
    Ok(())
}

fn write_notices(notices: Vec<Notice>, mut log: Option<&mut JsonlSink>) -> Result<()> {
    for notice in notices {
        println!("{notice}");
        if let Some(log) = log.as_deref_mut() {
            log.write(&EventRecord {
                tick: notice.tick,
                kind: "notice",
                payload: &notice.text,
            })?;
        }
    }
    Ok(())
}

fn write_report(report: &TickReport, tick: SimTick, log: Option<&mut JsonlSink>) -> Result<()> {
    let Some(log) = log else {
        return Ok(());
    };
    for (job, summary) in &report.started {
        let payload = serde_json::json!({
            "job": job,
            "planned": summary.planned,
            "dropped": summary.dropped,
            "batch_size": summary.batch_size,
            "yaw": summary.yaw.degrees(),
            "corner": [summary.corner.x, summary.corner.y, summary.corner.z],
        })
        .to_string();
        log.write(&EventRecord {
            tick,
            kind: "job_started",
            payload: &payload,
        })?;
    }
    for event in &report.events {
        let kind = match event {
            JobEvent::Completed { .. } => "job_completed",
            JobEvent::Aborted { .. } => "job_aborted",
            JobEvent::Cancelled { .. } => "job_cancelled",
        };
        let payload = serde_json::to_string(event)?;
        log.write(&EventRecord {
            tick,
            kind,
            payload: &payload,
        })?;
    }
    Ok(())
}

fn write_metrics(
    path: &std::path::Path,
    stats: BuildStats,
    ticks: SimTick,
    started: Instant,
) -> Result<()> {
    let report = MetricsReportBuilder::new("headless")
        .builds(stats.into())
        .execution(ExecutionMetrics {
            ticks: ticks.0,
            duration_seconds: started.elapsed().as_secs_f64(),
        })
        .build();
    MetricsSink::create(path)
        .and_then(|sink| sink.write(&report))
        .with_context(|| format!("failed to write metrics to {}", path.display()))
}
