//! Portal Initiator
//!
//! The initiator side of a Portal bridge. An [`Initiator`] turns a one-way,
//! unordered message channel into request/response calls: it tags every
//! request with a fresh callback id, parks a deferred result under that id and
//! settles it when the executor's response comes back.
//!
//! On top of that, [`Initiator::create_api`] installs a set of named functions
//! on the executor and returns a [`RemoteApi`] proxy for calling them.
//!
//! There is no built-in timeout. Race a call against `tokio::time::timeout`
//! when one is needed; a call dropped that way leaves nothing behind in the
//! correlation table.

pub mod api;
pub mod initiator;

pub use api::{ApiSpec, RemoteApi, RemoteFunction};
pub use initiator::Initiator;
