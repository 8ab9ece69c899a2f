//! Dimension identifiers.
//!
//! Every requester stands in exactly one dimension and every build job writes
//! into exactly one. The host keeps one world per loaded dimension.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable identifier for a world dimension.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DimensionId {
    /// The Overworld dimension.
    #[default]
    Overworld,
    /// The Nether dimension.
    Nether,
    /// The End dimension.
    End,
}

impl DimensionId {
    /// Every known dimension, in stable order.
    pub const ALL: [Self; 3] = [Self::Overworld, Self::Nether, Self::End];

    /// Dimension used when a pose or config does not name one.
    pub const DEFAULT: Self = Self::Overworld;

    /// Canonical string key used in configs/logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Overworld => "overworld",
            Self::Nether => "nether",
            Self::End => "end",
        }
    }
}

impl fmt::Display for DimensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DimensionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        let key = key.strip_prefix("minecraft:").unwrap_or(&key);
        match key {
            "overworld" => Ok(Self::Overworld),
            "nether" | "the_nether" => Ok(Self::Nether),
            "end" | "the_end" => Ok(Self::End),
            _ => Err(format!("unknown dimension: {s}")),
        }
    }
}
