//! Run artifacts of the headless host: the JSONL event log and the end-of-run
//! metrics report.

use anyhow::Result;
use promptbuild_core::SimTick;
use promptbuild_server::BuildStats;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// One line of the event log.
#[derive(Debug, Serialize)]
pub struct EventRecord<'a> {
    pub tick: SimTick,
    /// `command`, `notice`, `job_started`, `job_completed`, ...
    pub kind: &'a str,
    pub payload: &'a str,
}

/// Newline-delimited JSON event log. Each record is flushed as written so a
/// crashed run still leaves a readable log.
pub struct JsonlSink {
    out: BufWriter<File>,
}

impl JsonlSink {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        create_parent(path.as_ref())?;
        let file = File::create(path)?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }

    pub fn write(&mut self, event: &EventRecord<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.out, event)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Summary written by `--metrics` when the host stops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    pub run_name: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub result: RunResult,
    pub builds: BuildMetrics,
    pub execution: ExecutionMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunResult {
    Pass,
    Fail,
}

/// Placement totals across all jobs of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMetrics {
    pub requests: usize,
    /// Requests that never became a job.
    pub request_failures: usize,
    pub jobs_completed: usize,
    pub jobs_aborted: usize,
    pub jobs_cancelled: usize,
    /// Voxels written by completed jobs.
    pub blocks_placed: usize,
    /// Voxels the world refused.
    pub blocks_failed: usize,
    /// Voxels dropped while planning.
    pub blocks_dropped: usize,
}

impl BuildMetrics {
    /// A run passes when no job aborted and every request became a job.
    pub fn result(&self) -> RunResult {
        if self.jobs_aborted == 0 && self.request_failures == 0 {
            RunResult::Pass
        } else {
            RunResult::Fail
        }
    }
}

impl From<BuildStats> for BuildMetrics {
    fn from(stats: BuildStats) -> Self {
        Self {
            requests: stats.requests,
            request_failures: stats.request_failures,
            jobs_completed: stats.jobs_completed,
            jobs_aborted: stats.jobs_aborted,
            jobs_cancelled: stats.jobs_cancelled,
            blocks_placed: stats.blocks_placed,
            blocks_failed: stats.blocks_failed,
            blocks_dropped: stats.blocks_dropped,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub ticks: u64,
    pub duration_seconds: f64,
}

pub struct MetricsReportBuilder {
    report: MetricsReport,
}

impl MetricsReportBuilder {
    pub fn new(run_name: impl Into<String>) -> Self {
        Self {
            report: MetricsReport {
                run_name: run_name.into(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                result: RunResult::Pass,
                builds: BuildMetrics::default(),
                execution: ExecutionMetrics::default(),
            },
        }
    }

    /// Set placement totals; the result follows from them.
    pub fn builds(mut self, metrics: BuildMetrics) -> Self {
        self.report.result = metrics.result();
        self.report.builds = metrics;
        self
    }

    pub fn execution(mut self, metrics: ExecutionMetrics) -> Self {
        self.report.execution = metrics;
        self
    }

    pub fn build(self) -> MetricsReport {
        self.report
    }
}

/// Writes a [`MetricsReport`] as pretty JSON.
pub struct MetricsSink {
    path: PathBuf,
}

impl MetricsSink {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        create_parent(&path)?;
        Ok(Self { path })
    }

    pub fn write(&self, report: &MetricsReport) -> Result<()> {
        let json = serde_json::to_string_pretty(report)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
