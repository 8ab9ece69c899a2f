use crate::commands::{parse_command, BuildCommand};
use anyhow::{bail, Context, Result};
use promptbuild_core::SimTick;
use serde::Deserialize;
use std::{collections::VecDeque, fs, path::Path};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptFile {
    steps: Vec<StepDef>,
}

/// One step as written: either an absolute `tick` or `after` ticks past the
/// previous step.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StepDef {
    tick: Option<u64>,
    after: Option<u64>,
    command: String,
}

/// A validated script step.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptStep {
    pub tick: SimTick,
    /// The command as written, for echoing and the event log.
    pub source: String,
    pub command: BuildCommand,
}

/// Console commands replayed at fixed host ticks.
///
/// Every command is parsed when the script loads, so a typo in step 40 fails
/// the run before step 1 issues a build.
#[derive(Debug)]
pub struct BuildScript {
    pending: VecDeque<ScriptStep>,
}

impl BuildScript {
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let file: ScriptFile = serde_json::from_str(contents)?;
        if file.steps.is_empty() {
            bail!("build script has no steps");
        }

        let mut pending = VecDeque::with_capacity(file.steps.len());
        let mut previous = 0u64;
        for (index, step) in file.steps.into_iter().enumerate() {
            let number = index + 1;
            let tick = match (step.tick, step.after) {
                (Some(tick), None) if tick < previous => {
                    bail!("step {number}: tick {tick} is before the previous step ({previous})")
                }
                (Some(tick), None) => tick,
                (None, Some(after)) => previous
                    .checked_add(after)
                    .with_context(|| format!("step {number}: tick overflows"))?,
                (None, None) => previous,
                (Some(_), Some(_)) => bail!("step {number}: give either `tick` or `after`, not both"),
            };
            previous = tick;

            let source = step.command.trim().to_string();
            if source.is_empty() {
                bail!("step {number}: empty command");
            }
            let command =
                parse_command(&source).with_context(|| format!("step {number}: `{source}`"))?;
            pending.push_back(ScriptStep {
                tick: SimTick(tick),
                source,
                command,
            });
        }

        Ok(Self { pending })
    }

    /// Steps due at or before `tick`, in script order.
    pub fn take_due(&mut self, tick: SimTick) -> Vec<ScriptStep> {
        let due = self.pending.iter().take_while(|s| s.tick <= tick).count();
        self.pending.drain(..due).collect()
    }

    pub fn is_finished(&self) -> bool {
        self.pending.is_empty()
    }

    /// Tick of the last step, if any remain.
    pub fn last_tick(&self) -> Option<SimTick> {
        self.pending.back().map(|s| s.tick)
    }
}
