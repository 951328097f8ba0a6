//! Single-assignment deferred values
//!
//! A [`Deferred`] is the settle side of a one-shot future: whoever holds it can
//! resolve or reject the paired [`DeferredFuture`] later, from outside the code
//! awaiting it. The initiator keeps one per in-flight request in its
//! correlation table.
//!
//! Only the first settlement counts; later `resolve`/`reject` calls are no-ops
//! and report `false`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

use crate::protocol::error::{BridgeError, Result};

/// The settle side.
#[derive(Debug)]
pub struct Deferred<T> {
    sender: Mutex<Option<oneshot::Sender<Result<T>>>>,
}

/// The awaitable side.
#[derive(Debug)]
pub struct DeferredFuture<T> {
    receiver: oneshot::Receiver<Result<T>>,
}

/// Creates a connected deferred pair.
pub fn deferred<T>() -> (Deferred<T>, DeferredFuture<T>) {
    let (sender, receiver) = oneshot::channel();
    (
        Deferred {
            sender: Mutex::new(Some(sender)),
        },
        DeferredFuture { receiver },
    )
}

impl<T> Deferred<T> {
    /// Fulfills the paired future. Returns `false` if it was already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Rejects the paired future. Returns `false` if it was already settled.
    pub fn reject(&self, error: BridgeError) -> bool {
        self.settle(Err(error))
    }

    pub fn is_settled(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }

    fn settle(&self, outcome: Result<T>) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match sender {
            // The receiver may already be gone; the settlement still counts.
            Some(sender) => {
                let _ = sender.send(outcome);
                true
            }
            None => false,
        }
    }
}

impl<T> Future for DeferredFuture<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(BridgeError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}
