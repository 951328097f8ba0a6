//! Portal Common Types, Resolver and Transport
//!
//! This crate provides everything the two sides of a Portal bridge share.
//!
//! # Overview
//!
//! Portal is an asynchronous RPC bridge between two execution contexts that
//! only exchange messages. An *initiator* asks an *executor* to install named
//! functions, call them, or run one-off scripts. Results come back
//! asynchronously and are matched to the request that caused them by a
//! callback id.
//!
//! - **Protocol Layer**: the message envelope, wire values and error payloads
//! - **Deferred**: single-assignment settle handles used for correlation
//! - **Resolver**: turns nested graphs of pending values and callables into
//!   plain, transmittable values
//! - **Transport Layer**: in-process channels and length-prefixed JSON streams
//!
//! # Components
//!
//! - [`protocol`] - Message, Action, ResolvedValue, ErrorPayload, BridgeError
//! - [`deferred`] - [`Deferred`] and [`DeferredFuture`]
//! - [`resolver`] - [`Resolvable`] and [`deep_resolve`]
//! - [`transport`] - [`Transport`], [`Inbox`] and their bindings
//!
//! # Example
//!
//! ```
//! use portal_common::{deep_resolve, Resolvable, ResolvedValue};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let graph = Resolvable::sequence(vec![
//!     Resolvable::from(1),
//!     Resolvable::callable(|| "two"),
//!     Resolvable::pending_value(async { 3 }),
//! ]);
//!
//! let value = deep_resolve(graph).await.unwrap();
//! assert_eq!(
//!     value,
//!     ResolvedValue::from(vec![ResolvedValue::from(1), "two".into(), 3.into()])
//! );
//! # }
//! ```

pub mod deferred;
pub mod protocol;
pub mod resolver;
pub mod transport;

pub use deferred::{deferred, Deferred, DeferredFuture};
pub use protocol::*;
pub use resolver::{deep_resolve, resolve_all, Resolvable};
pub use transport::{Inbox, Transport};
