#![warn(missing_docs)]
//! Core primitives shared across the workspace.

pub mod dimension;
pub mod pose;
pub mod structure;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use dimension::DimensionId;
pub use pose::{BlockPos, CardinalYaw, RequesterPose};
pub use structure::{StructureDescriptor, StructureError, VoxelSpec};

/// Default host tick rate (20 TPS => 50 ms per tick).
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 50;

/// Fixed tick counter of the host simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimTick(pub u64);

impl SimTick {
    /// First tick of every host timeline.
    pub const ZERO: Self = Self(0);

    /// Advance by `delta` ticks.
    pub fn advance(self, delta: u64) -> Self {
        Self(self.0 + delta)
    }
}

impl fmt::Display for SimTick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies whoever issued a build request (a player, the console, a script).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequesterId(pub u64);

impl RequesterId {
    /// The local console requester used by the headless host.
    pub const CONSOLE: Self = Self(0);
}

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "requester-{}", self.0)
    }
}
