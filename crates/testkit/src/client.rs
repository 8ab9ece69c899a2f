//! Scripted [`GenerationClient`] for tests that must not touch the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use promptbuild_core::{StructureDescriptor, StructureError, VoxelSpec};
use promptbuild_net::{GenerationClient, GenerationError};

type Canned = Result<StructureDescriptor, GenerationError>;

/// Answers prompts from a table of canned results.
///
/// Unknown prompts get the fallback, or a transport error when none is set.
#[derive(Debug, Default)]
pub struct MockGenerationClient {
    responses: HashMap<String, Canned>,
    fallback: Option<Canned>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockGenerationClient {
    /// A client with no canned answers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `prompt` with `result`.
    pub fn respond(mut self, prompt: impl Into<String>, result: Canned) -> Self {
        self.responses.insert(prompt.into(), result);
        self
    }

    /// Answer every other prompt with `result`.
    pub fn fallback(mut self, result: Canned) -> Self {
        self.fallback = Some(result);
        self
    }

    /// Number of requests served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received, in arrival order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl GenerationClient for MockGenerationClient {
    async fn generate(&self, prompt: &str) -> Result<StructureDescriptor, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        tracing::debug!(prompt, "Mock generation request");
        self.responses
            .get(prompt)
            .or(self.fallback.as_ref())
            .cloned()
            .unwrap_or_else(|| {
                Err(GenerationError::Transport(format!(
                    "no canned response for {prompt:?}"
                )))
            })
    }
}

/// A `width` x `length` floor of `material` with a one-block wall ring of
/// `height` blocks on top.
pub fn hollow_box(
    width: i32,
    length: i32,
    height: i32,
    material: &str,
) -> Result<StructureDescriptor, StructureError> {
    let mut voxels = Vec::new();
    for ly in 0..height.max(1) {
        for lx in 0..width {
            for lz in 0..length {
                let edge = lx == 0 || lz == 0 || lx == width - 1 || lz == length - 1;
                if ly == 0 || edge {
                    voxels.push(VoxelSpec::new(lx, ly, lz, material));
                }
            }
        }
    }
    StructureDescriptor::new(Some(i64::from(width)), Some(i64::from(length)), voxels)
        .and_then(|d| d.with_height(Some(i64::from(height.max(1)))))
}
