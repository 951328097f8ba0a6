//! In-process channel binding
//!
//! [`duplex`] returns two connected endpoints; whatever one side sends arrives
//! in the other side's [`Inbox`]. This is the Rust counterpart of posting
//! messages between two windows: values are handed over as they are, so
//! `undefined` and `NaN` need no special encoding.

use tokio::sync::mpsc;

use super::{Inbox, Transport};
use crate::protocol::error::{BridgeError, Result};
use crate::protocol::Message;

/// Sending half of an in-process endpoint.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    peer: mpsc::UnboundedSender<Message>,
}

impl ChannelTransport {
    /// Wraps an existing sender, e.g. one whose receiver a test inspects.
    pub fn new(peer: mpsc::UnboundedSender<Message>) -> Self {
        Self { peer }
    }

    /// True once the receiving side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.peer.is_closed()
    }
}

impl Transport for ChannelTransport {
    fn send(&self, message: Message) -> Result<()> {
        self.peer
            .send(message)
            .map_err(|_| BridgeError::Transport("peer inbox closed".into()))
    }
}

/// One side of a duplex channel: where to send, and what arrives.
pub type Endpoint = (ChannelTransport, Inbox);

/// Creates two connected endpoints.
pub fn duplex() -> (Endpoint, Endpoint) {
    let (to_right, right_inbox) = mpsc::unbounded_channel();
    let (to_left, left_inbox) = mpsc::unbounded_channel();
    (
        (ChannelTransport::new(to_right), left_inbox),
        (ChannelTransport::new(to_left), right_inbox),
    )
}
