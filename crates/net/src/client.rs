//! HTTP client for the structure generation service.

use std::time::Duration;

use async_trait::async_trait;
use promptbuild_core::StructureDescriptor;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::protocol::{decode_response, encode_request};

/// Default endpoint of a locally running generation service.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000/generate";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Failures of a generation request. None of them are retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// The prompt could not be sent (empty, too long).
    #[error("invalid prompt: {0}")]
    InvalidPrompt(String),
    /// Network/connection failure reaching the service.
    #[error("HTTP request failed: {0}")]
    Transport(String),
    /// The service answered with a non-success status.
    #[error("server error (HTTP {status}): {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },
    /// The response body was malformed or incomplete.
    #[error("bad server response: {0}")]
    Protocol(String),
}

/// Something that turns a prompt into a structure descriptor.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Request a structure for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<StructureDescriptor, GenerationError>;
}

/// [`GenerationClient`] speaking JSON over HTTP.
#[derive(Debug, Clone)]
pub struct HttpGenerationClient {
    client: Client,
    endpoint: String,
}

impl HttpGenerationClient {
    /// Create a client for `endpoint` with the given request timeout.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let endpoint = endpoint.into();
        info!(%endpoint, ?timeout, "Generation client configured");
        Ok(Self { client, endpoint })
    }

    /// Endpoint URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

const MAX_ERROR_BODY: usize = 512;

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn generate(&self, prompt: &str) -> Result<StructureDescriptor, GenerationError> {
        let body = encode_request(prompt)?;
        debug!("Sending generation request");

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|err| GenerationError::Transport(err.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| GenerationError::Transport(err.to_string()))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Generation service returned an error");
            let body = text.chars().take(MAX_ERROR_BODY).collect();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let descriptor = decode_response(&text)?;
        info!(
            blocks = descriptor.len(),
            width = descriptor.width(),
            length = descriptor.length(),
            "Generation response received"
        );
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one canned HTTP response on a local port.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let mut read = 0;
            // Read until the end of the headers plus the small JSON body.
            loop {
                let n = socket.read(&mut buf[read..]).await.unwrap();
                read += n;
                let text = String::from_utf8_lossy(&buf[..read]);
                if n == 0 || (text.contains("\r\n\r\n") && text.trim_end().ends_with('}')) {
                    break;
                }
            }
            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}/generate")
    }

    #[tokio::test]
    async fn successful_response_yields_descriptor() {
        let endpoint = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"width":2,"length":2,"blocks":[{"x":0,"y":0,"z":0,"b":"stone"}]}"#,
        )
        .await;
        let client = HttpGenerationClient::new(endpoint, Duration::from_secs(5)).unwrap();
        let desc = client.generate("a small house").await.unwrap();
        assert_eq!(desc.len(), 1);
        assert_eq!(desc.voxels()[0].material, "stone");
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let endpoint = serve_once("HTTP/1.1 500 Internal Server Error", r#"{"detail":"boom"}"#).await;
        let client = HttpGenerationClient::new(endpoint, Duration::from_secs(5)).unwrap();
        let err = client.generate("a tower").await.unwrap_err();
        assert!(matches!(err, GenerationError::Status { status: 500, .. }), "{err}");
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        // Bind then drop to obtain a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client =
            HttpGenerationClient::new(format!("http://{addr}/generate"), Duration::from_secs(5))
                .unwrap();
        let err = client.generate("a bridge").await.unwrap_err();
        assert!(matches!(err, GenerationError::Transport(_)), "{err}");
    }
}
