//! In-process transport.
//!
//! Every `open()` hands the far end of the new link to whoever holds the
//! [`RemoteEnd`] receiver, which can then script server behaviour: emit
//! `Opened`, push frames, close with any code. Used by tests and by hosts
//! that bridge the session onto a channel they already own.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tracing::debug;

use super::{Transport, TransportCommand, TransportEvent, TransportLink};
use crate::types::UserId;

/// Server side of one in-memory link.
pub struct RemoteEnd {
    pub user_id: UserId,
    /// Frames and close requests sent by the session
    pub commands: mpsc::UnboundedReceiver<TransportCommand>,
    /// Events delivered to the session
    pub events: mpsc::UnboundedSender<TransportEvent>,
}

impl RemoteEnd {
    pub fn open(&self) {
        let _ = self.events.send(TransportEvent::Opened);
    }

    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Message(text.into()));
    }

    pub fn close(&self, code: u16, reason: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Closed {
            code,
            reason: reason.into(),
        });
    }

    /// Next command the session sent on this link, if any is queued.
    pub fn try_next_command(&mut self) -> Option<TransportCommand> {
        self.commands.try_recv().ok()
    }
}

/// Transport whose links are plain channels.
pub struct MemoryTransport {
    remotes: mpsc::UnboundedSender<RemoteEnd>,
    opened: AtomicUsize,
}

impl MemoryTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                remotes: tx,
                opened: AtomicUsize::new(0),
            },
            rx,
        )
    }

    /// Number of links opened so far.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl Transport for MemoryTransport {
    fn open(&self, user_id: &UserId) -> TransportLink {
        let (link, commands, events) = TransportLink::pair();
        let n = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(user_id = %user_id, link = n, "Opening in-memory link");

        let remote = RemoteEnd {
            user_id: user_id.clone(),
            commands,
            events,
        };
        if let Err(mpsc::error::SendError(remote)) = self.remotes.send(remote) {
            // Nobody is scripting the far end: behave like an unreachable host
            let _ = remote
                .events
                .send(TransportEvent::abnormal_close("no remote attached"));
        }
        link
    }
}
