#![warn(missing_docs)]
//! In-memory doubles for the world and the generation service, used by the
//! host and scheduler tests.

mod client;
mod mutator;

pub use client::*;
pub use mutator::*;
