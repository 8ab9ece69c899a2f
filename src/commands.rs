use std::fmt;

use glam::DVec3;
use promptbuild_core::{DimensionId, RequesterId, RequesterPose};
use promptbuild_server::{ContextError, JobId, JobSnapshot, RequestId, Server};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CommandError {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoordArg {
    Absolute(f64),
    Relative(f64),
}

impl CoordArg {
    pub fn resolve(self, base: f64) -> f64 {
        match self {
            Self::Absolute(v) => v,
            Self::Relative(delta) => base + delta,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuildCommand {
    Help,
    Build {
        prompt: String,
    },
    Cancel {
        job: Option<JobId>,
    },
    Jobs,
    Pose {
        x: CoordArg,
        y: CoordArg,
        z: CoordArg,
        heading: CoordArg,
        dimension: Option<DimensionId>,
    },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub lines: Vec<String>,
}

/// What a command needs from the host, on behalf of one requester.
pub trait CommandContext {
    fn pose(&self) -> Option<RequesterPose>;
    fn set_pose(&mut self, pose: RequesterPose);

    /// Queue a build; acknowledgement and outcome arrive as notices.
    fn request_build(&mut self, prompt: &str) -> Result<RequestId, ContextError>;

    fn cancel(&mut self, job: Option<JobId>) -> Vec<JobId>;
    fn jobs(&self) -> Vec<JobSnapshot>;
    fn pending_prompts(&self) -> Vec<(RequestId, String)>;
}

/// A [`Server`] seen through one requester's console.
pub struct ConsoleSession<'a> {
    pub server: &'a mut Server,
    pub requester: RequesterId,
}

impl CommandContext for ConsoleSession<'_> {
    fn pose(&self) -> Option<RequesterPose> {
        self.server.pose(self.requester)
    }

    fn set_pose(&mut self, pose: RequesterPose) {
        self.server.set_pose(self.requester, pose);
    }

    fn request_build(&mut self, prompt: &str) -> Result<RequestId, ContextError> {
        self.server.request_build(self.requester, prompt)
    }

    fn cancel(&mut self, job: Option<JobId>) -> Vec<JobId> {
        self.server.cancel(self.requester, job)
    }

    fn jobs(&self) -> Vec<JobSnapshot> {
        self.server
            .active_jobs()
            .into_iter()
            .filter(|job| job.requester == self.requester)
            .collect()
    }

    fn pending_prompts(&self) -> Vec<(RequestId, String)> {
        self.server.pending_prompts(self.requester)
    }
}

pub fn execute_command(ctx: &mut impl CommandContext, cmd: BuildCommand) -> CommandOutput {
    let mut out = CommandOutput::default();
    match cmd {
        BuildCommand::Help => {
            out.lines.extend(help_lines());
        }
        BuildCommand::Build { prompt } => {
            // Both outcomes are reported through the requester's notices.
            let _ = ctx.request_build(&prompt);
        }
        BuildCommand::Cancel { job } => {
            let cancelled = ctx.cancel(job);
            if cancelled.is_empty() {
                match job {
                    Some(id) => out.lines.push(format!("No running build {id}")),
                    None => out.lines.push("Nothing to cancel".to_string()),
                }
            } else {
                let ids: Vec<String> = cancelled.iter().map(JobId::to_string).collect();
                out.lines.push(format!("Cancelling {}", ids.join(", ")));
            }
        }
        BuildCommand::Jobs => {
            let jobs = ctx.jobs();
            let pending = ctx.pending_prompts();
            if jobs.is_empty() && pending.is_empty() {
                out.lines.push("No active builds".to_string());
            }
            for job in jobs {
                out.lines.push(format!(
                    "{} \"{}\" {}/{} blocks ({} per tick)",
                    job.id, job.label, job.cursor, job.total, job.batch_size
                ));
            }
            for (request, prompt) in pending {
                out.lines
                    .push(format!("{request} \"{prompt}\" waiting for the generator"));
            }
        }
        BuildCommand::Pose {
            x,
            y,
            z,
            heading,
            dimension,
        } => {
            let base = ctx.pose().unwrap_or_else(|| RequesterPose::new(DVec3::ZERO, 0.0));
            let pose = RequesterPose {
                position: DVec3::new(
                    x.resolve(base.position.x),
                    y.resolve(base.position.y),
                    z.resolve(base.position.z),
                ),
                heading: heading.resolve(base.heading),
                dimension: dimension.unwrap_or(base.dimension),
            };
            if !pose.position.is_finite() || !pose.heading.is_finite() {
                out.lines.push("Pose out of range; keeping the current one".to_string());
                return out;
            }
            ctx.set_pose(pose);
            out.lines.push(format!(
                "Pose set to {:.2} {:.2} {:.2} facing {:.1} ({}, builds face {})",
                pose.position.x,
                pose.position.y,
                pose.position.z,
                pose.heading,
                pose.dimension,
                pose.snapped_yaw()
            ));
        }
    }
    out
}

pub fn parse_command(input: &str) -> Result<BuildCommand, CommandError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(BuildCommand::Help);
    }

    let input = input.strip_prefix('/').unwrap_or(input).trim();
    if input.is_empty() {
        return Ok(BuildCommand::Help);
    }

    let (cmd, rest) = match input.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (input, ""),
    };
    let cmd = cmd.to_ascii_lowercase();
    let args: Vec<&str> = rest.split_whitespace().collect();

    match cmd.as_str() {
        "help" | "?" => Ok(BuildCommand::Help),
        "build" => {
            if rest.is_empty() {
                return Err(CommandError::new("Usage: /build <description>"));
            }
            Ok(BuildCommand::Build {
                prompt: rest.to_string(),
            })
        }
        "cancel" => match args.as_slice() {
            [] => Ok(BuildCommand::Cancel { job: None }),
            [id] => Ok(BuildCommand::Cancel {
                job: Some(parse_job_id(id)?),
            }),
            _ => Err(CommandError::new("Usage: /cancel [job]")),
        },
        "jobs" => {
            if !args.is_empty() {
                return Err(CommandError::new("Usage: /jobs"));
            }
            Ok(BuildCommand::Jobs)
        }
        "pose" => {
            if !(4..=5).contains(&args.len()) {
                return Err(CommandError::new(
                    "Usage: /pose <x> <y> <z> <heading> [dimension]",
                ));
            }
            let dimension = match args.get(4) {
                Some(raw) => Some(raw.parse::<DimensionId>().map_err(|err| CommandError::new(err))?),
                None => None,
            };
            Ok(BuildCommand::Pose {
                x: parse_coord(args[0])?,
                y: parse_coord(args[1])?,
                z: parse_coord(args[2])?,
                heading: parse_coord(args[3])?,
                dimension,
            })
        }
        _ => Err(CommandError::new(format!(
            "Unknown command: {cmd}. Try /help"
        ))),
    }
}

fn parse_job_id(s: &str) -> Result<JobId, CommandError> {
    let raw = s.trim();
    let digits = raw.strip_prefix("job-").unwrap_or(raw);
    digits
        .parse::<u64>()
        .map(JobId)
        .map_err(|_| CommandError::new(format!("Invalid job id: {raw}")))
}

fn parse_coord(s: &str) -> Result<CoordArg, CommandError> {
    let s = s.trim();
    if let Some(rest) = s.strip_prefix('~') {
        if rest.is_empty() {
            return Ok(CoordArg::Relative(0.0));
        }
        let delta = rest
            .parse::<f64>()
            .ok()
            .filter(|d| d.is_finite())
            .ok_or_else(|| CommandError::new(format!("Invalid relative coordinate: {s}")))?;
        return Ok(CoordArg::Relative(delta));
    }
    let value = s
        .parse::<f64>()
        .map_err(|_| CommandError::new(format!("Invalid coordinate: {s}")))?;
    if !value.is_finite() {
        return Err(CommandError::new(format!("Invalid coordinate: {s}")));
    }
    Ok(CoordArg::Absolute(value))
}

fn help_lines() -> Vec<String> {
    vec![
        "Commands:".to_string(),
        "  /help".to_string(),
        "  /build <description>        generate a structure in front of you".to_string(),
        "  /cancel [job]               stop one build, or all of yours".to_string(),
        "  /jobs                       list running builds".to_string(),
        "  /pose <x> <y> <z> <heading> [dimension]   (supports ~offset)".to_string(),
    ]
}
