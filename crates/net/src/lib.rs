#![warn(missing_docs)]
//! Generation service plumbing: wire protocol and the async client.

mod client;
pub mod protocol;

pub use client::{
    GenerationClient, GenerationError, HttpGenerationClient, DEFAULT_ENDPOINT, DEFAULT_TIMEOUT,
};
pub use protocol::{decode_response, encode_request, GenerateRequest, GenerateResponse};
