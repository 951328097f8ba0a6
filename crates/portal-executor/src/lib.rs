//! Portal Executor
//!
//! The executor side of a Portal bridge: it receives `addFunction`,
//! `runFunction` and `runScript` requests, evaluates them in an embedded Boa
//! JavaScript engine, deep-resolves the results and answers each request with
//! a response carrying the same callback id.
//!
//! Executed code is not sandboxed. An executor trusts its peer fully and
//! imposes no execution limits.
//!
//! # Example
//!
//! ```
//! use portal_common::protocol::{Action, CallbackId, Message, Payload, ResolvedValue};
//! use portal_common::transport::{channel, Transport};
//! use portal_executor::Executor;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let local = tokio::task::LocalSet::new();
//! local
//!     .run_until(async {
//!         let ((initiator, mut replies), (executor_side, inbox)) = channel::duplex();
//!
//!         let executor = Executor::new(executor_side).unwrap();
//!         executor.start();
//!         tokio::task::spawn_local(async move { executor.serve(inbox).await });
//!
//!         initiator
//!             .send(Message::request(
//!                 Action::RunScript,
//!                 Payload::run_script("return [1, Promise.resolve(2)];"),
//!                 CallbackId::from("1"),
//!             ))
//!             .unwrap();
//!
//!         let reply = replies.recv().await.unwrap();
//!         assert!(reply.success);
//!         assert_eq!(reply.payload.result, Some(ResolvedValue::from(vec![1, 2])));
//!     })
//!     .await;
//! # }
//! ```

pub mod config;
pub mod executor;
pub mod runtime;

pub use config::ExecutorConfig;
pub use executor::{Executor, ExecutorState};
