//! Short text notices addressed to requesters.

use std::fmt;

use promptbuild_core::{RequesterId, SimTick};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Failure,
}

/// One message for one requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub requester: RequesterId,
    pub tick: SimTick,
    pub level: NoticeLevel,
    pub text: String,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Outgoing notices, queued in emission order until the host delivers them.
#[derive(Debug, Default)]
pub struct NoticeBoard {
    queue: Vec<Notice>,
}

impl NoticeBoard {
    pub fn push(
        &mut self,
        requester: RequesterId,
        tick: SimTick,
        level: NoticeLevel,
        text: impl Into<String>,
    ) {
        let text = text.into();
        tracing::debug!(%requester, ?level, %text, "Notice");
        self.queue.push(Notice {
            requester,
            tick,
            level,
            text,
        });
    }

    /// Take every pending notice.
    pub fn drain(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.queue)
    }

    /// Take the notices of one requester, leaving the rest queued.
    pub fn drain_for(&mut self, requester: RequesterId) -> Vec<Notice> {
        let (mine, rest): (Vec<Notice>, Vec<Notice>) = std::mem::take(&mut self.queue)
            .into_iter()
            .partition(|n| n.requester == requester);
        self.queue = rest;
        mine
    }

    /// Drop everything queued for a requester that went away.
    pub fn discard(&mut self, requester: RequesterId) {
        self.queue.retain(|n| n.requester != requester);
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
