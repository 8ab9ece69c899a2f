//! Wire format of the generation service.
//!
//! Request: `{"prompt": "<text>"}`. Response: `{"width", "length", "height",
//! "blocks": [{"x", "y", "z", "b"}, ...]}`; every field but `blocks` is
//! optional and unknown fields are ignored.

use promptbuild_core::{StructureDescriptor, VoxelSpec};
use serde::{Deserialize, Serialize};

use crate::GenerationError;

/// Maximum prompt length accepted by [`encode_request`] (characters).
pub const MAX_PROMPT_LEN: usize = 1024;

/// Maximum voxel count accepted from one response.
/// Guards the host against a runaway or hostile service.
pub const MAX_RESPONSE_BLOCKS: usize = 2_000_000;

/// Body of a generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Free-text description of the structure.
    pub prompt: String,
}

/// One voxel as sent by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireBlock {
    /// Local X.
    pub x: i32,
    /// Local Y.
    pub y: i32,
    /// Local Z.
    pub z: i32,
    /// Material descriptor.
    pub b: String,
}

/// Body of a successful generation response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Footprint width; defaults to 1 when absent.
    #[serde(default)]
    pub width: Option<i64>,
    /// Footprint length; defaults to 1 when absent.
    #[serde(default)]
    pub length: Option<i64>,
    /// Informational height.
    #[serde(default)]
    pub height: Option<i64>,
    /// Voxel list; required.
    pub blocks: Vec<WireBlock>,
}

impl GenerateResponse {
    /// Convert into the domain descriptor, keeping voxel order.
    pub fn into_descriptor(self) -> Result<StructureDescriptor, GenerationError> {
        if self.blocks.len() > MAX_RESPONSE_BLOCKS {
            return Err(GenerationError::Protocol(format!(
                "response carries {} blocks (max {MAX_RESPONSE_BLOCKS})",
                self.blocks.len()
            )));
        }
        let voxels = self
            .blocks
            .into_iter()
            .map(|b| VoxelSpec::new(b.x, b.y, b.z, b.b))
            .collect();
        StructureDescriptor::new(self.width, self.length, voxels)
            .and_then(|desc| desc.with_height(self.height))
            .map_err(|err| GenerationError::Protocol(err.to_string()))
    }
}

/// Serialize a request body, rejecting empty or oversized prompts.
pub fn encode_request(prompt: &str) -> Result<String, GenerationError> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(GenerationError::InvalidPrompt("prompt is empty".into()));
    }
    if prompt.chars().count() > MAX_PROMPT_LEN {
        return Err(GenerationError::InvalidPrompt(format!(
            "prompt longer than {MAX_PROMPT_LEN} characters"
        )));
    }
    serde_json::to_string(&GenerateRequest {
        prompt: prompt.to_string(),
    })
    .map_err(|err| GenerationError::InvalidPrompt(err.to_string()))
}

/// Parse a response body into a descriptor.
///
/// Missing or mistyped `blocks`, or a block missing `x`/`y`/`z`/`b`, is a
/// [`GenerationError::Protocol`].
pub fn decode_response(body: &str) -> Result<StructureDescriptor, GenerationError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|err| GenerationError::Protocol(format!("response is not JSON: {err}")))?;
    if value.get("blocks").is_none() {
        return Err(GenerationError::Protocol(
            "server response missing 'blocks'".to_string(),
        ));
    }
    let response: GenerateResponse = serde_json::from_value(value)
        .map_err(|err| GenerationError::Protocol(format!("invalid response: {err}")))?;
    response.into_descriptor()
}
