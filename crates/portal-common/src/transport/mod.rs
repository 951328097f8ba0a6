//! Portal Transport Layer
//!
//! The bridge core only needs two capabilities from a channel: a way to send a
//! [`Message`] to the other side, and a stream of inbound messages. These are
//! the [`Transport`] trait and the [`Inbox`] receiver.
//!
//! # Bindings
//!
//! - **[`channel`]**: an in-process pair of connected endpoints. Messages are
//!   moved, not encoded, so every value crosses exactly.
//! - **[`StreamTransport`]**: length-prefixed JSON frames over any async byte
//!   stream (TCP in the CLI).
//! - **[`JsonCodec`]**: the JSON encoding used by the stream binding.
//!
//! # Delivery Contract
//!
//! A sent message is delivered at most once. Ordering between messages is not
//! relied upon; responses are matched to requests by callback id only.
//!
//! # Example
//!
//! ```
//! use portal_common::transport::{channel, Transport};
//! use portal_common::protocol::{Action, CallbackId, Message, Payload};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let ((left, _left_inbox), (_right, mut right_inbox)) = channel::duplex();
//!
//! let request = Message::request(
//!     Action::RunScript,
//!     Payload::run_script("return 1 + 1;"),
//!     CallbackId::from("1"),
//! );
//! left.send(request.clone()).unwrap();
//! assert_eq!(right_inbox.recv().await, Some(request));
//! # }
//! ```

pub mod channel;
pub mod codec;
pub mod stream;

pub use channel::ChannelTransport;
pub use codec::JsonCodec;
pub use stream::{connect, StreamTransport, MAX_MESSAGE_SIZE};

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::protocol::error::Result;
use crate::protocol::Message;

/// Inbound messages of one endpoint.
pub type Inbox = mpsc::UnboundedReceiver<Message>;

/// The sending half of a channel binding.
pub trait Transport: Send + Sync + 'static {
    /// Hands `message` to the channel. Does not wait for delivery.
    fn send(&self, message: Message) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, message: Message) -> Result<()> {
        (**self).send(message)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, message: Message) -> Result<()> {
        (**self).send(message)
    }
}
