//! Off-tick generation requests and their handoff back to the tick loop.
//!
//! Fetches run on the tokio runtime; their results come back as
//! [`HostMessage`]s through an unbounded channel that only the tick loop
//! drains, so world state is never touched from a fetch task.

use std::fmt;
use std::sync::Arc;

use promptbuild_core::{RequesterId, StructureDescriptor};
use promptbuild_net::{GenerationClient, GenerationError};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn, Instrument};

/// Identifies one generation request for its whole round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request-{}", self.0)
    }
}

/// Work delivered to the tick loop from outside it.
#[derive(Debug)]
pub enum HostMessage {
    /// A generation request finished.
    Generated {
        request: RequestId,
        requester: RequesterId,
        prompt: String,
        result: Result<StructureDescriptor, GenerationError>,
    },
}

/// Create the host message channel.
pub fn channel() -> (UnboundedSender<HostMessage>, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, Inbox { rx })
}

/// Tick-side end of the host message channel.
pub struct Inbox {
    rx: UnboundedReceiver<HostMessage>,
}

impl Inbox {
    /// Everything that arrived since the last drain, in arrival order.
    pub fn drain(&mut self) -> Vec<HostMessage> {
        let mut messages = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(msg) => messages.push(msg),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        messages
    }

    /// Wait for the next message; `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<HostMessage> {
        self.rx.recv().await
    }
}

/// Starts generation fetches on the runtime.
pub struct Dispatcher {
    client: Arc<dyn GenerationClient>,
    runtime: Handle,
    tx: UnboundedSender<HostMessage>,
    next_request: u64,
}

impl Dispatcher {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        runtime: Handle,
        tx: UnboundedSender<HostMessage>,
    ) -> Self {
        Self {
            client,
            runtime,
            tx,
            next_request: 1,
        }
    }

    /// Fire one request; its result arrives later through the inbox.
    ///
    /// Never blocks. Failures are delivered as messages like successes.
    pub fn spawn_fetch(&mut self, requester: RequesterId, prompt: &str) -> RequestId {
        let request = RequestId(self.next_request);
        self.next_request += 1;

        let client = Arc::clone(&self.client);
        let tx = self.tx.clone();
        let prompt = prompt.to_string();
        let span = tracing::info_span!("generate", %request, %requester);

        self.runtime.spawn(
            async move {
                let result = client.generate(&prompt).await;
                if let Err(err) = &result {
                    debug!(%err, "Generation request failed");
                }
                let msg = HostMessage::Generated {
                    request,
                    requester,
                    prompt,
                    result,
                };
                if tx.send(msg).is_err() {
                    warn!("Host stopped before the generation result arrived");
                }
            }
            .instrument(span),
        );
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptbuild_testkit::{hollow_box, MockGenerationClient};

    #[tokio::test]
    async fn results_arrive_through_the_inbox() {
        let client = MockGenerationClient::new()
            .respond("hut", Ok(hollow_box(2, 2, 1, "stone").unwrap()));
        let (tx, mut inbox) = channel();
        let mut dispatcher = Dispatcher::new(Arc::new(client), Handle::current(), tx);

        let first = dispatcher.spawn_fetch(RequesterId(1), "hut");
        let second = dispatcher.spawn_fetch(RequesterId(2), "unknown");
        assert_ne!(first, second);

        let mut seen = Vec::new();
        for _ in 0..2 {
            match inbox.recv().await {
                Some(HostMessage::Generated {
                    request, result, ..
                }) => seen.push((request, result.is_ok())),
                None => panic!("channel closed"),
            }
        }
        seen.sort();
        assert_eq!(seen, vec![(first, true), (second, false)]);
        assert!(inbox.drain().is_empty());
    }
}
