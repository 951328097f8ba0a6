//! Deep value resolution
//!
//! [`deep_resolve`] turns an arbitrary [`Resolvable`] graph into a
//! [`ResolvedValue`]: every pending value is awaited, every zero-argument
//! callable is invoked, and the results are resolved again until only
//! primitives, arrays and plain objects remain.
//!
//! # Dispatch Order
//!
//! 1. `Sequence` - elements resolve concurrently, index order is kept
//! 2. `Pending` - awaited, then the awaited value is resolved
//! 3. `Literal` - returned unchanged (`NaN` included)
//! 4. `Callable` - invoked, then its return value is resolved
//! 5. `Structure` - fields resolve concurrently, the key set is kept
//! 6. `Unrecognized` - fails with [`BridgeError::Unresolvable`]
//!
//! Siblings have no ordering dependency on each other. The first failing
//! branch fails the whole resolution; no partial result is produced.
//!
//! Resolution is single-threaded: pending values are `LocalBoxFuture`s so that
//! values borrowed from a single-threaded script engine can take part.

use futures::future::{try_join_all, LocalBoxFuture};
use futures::FutureExt;
use std::fmt;
use std::future::Future;

use crate::protocol::error::{BridgeError, Result};
use crate::protocol::value::ResolvedValue;

/// A value that may still contain pending values or callables.
pub enum Resolvable {
    Literal(ResolvedValue),
    Pending(LocalBoxFuture<'static, Result<Resolvable>>),
    Callable(Box<dyn FnOnce() -> Result<Resolvable>>),
    Sequence(Vec<Resolvable>),
    Structure(Vec<(String, Resolvable)>),
    Unrecognized(String),
}

impl Resolvable {
    /// Wraps a future producing a further resolvable value.
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<Resolvable>> + 'static,
    {
        Resolvable::Pending(future.boxed_local())
    }

    /// Wraps a future producing a plain value.
    pub fn pending_value<F, V>(future: F) -> Self
    where
        F: Future<Output = V> + 'static,
        V: Into<Resolvable>,
    {
        Resolvable::Pending(async move { Ok::<Resolvable, BridgeError>(future.await.into()) }.boxed_local())
    }

    /// Wraps a zero-argument callable.
    pub fn callable<F, V>(f: F) -> Self
    where
        F: FnOnce() -> V + 'static,
        V: Into<Resolvable>,
    {
        Resolvable::Callable(Box::new(move || -> Result<Resolvable> { Ok(f().into()) }))
    }

    /// Wraps a zero-argument callable that can fail.
    pub fn fallible<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<Resolvable> + 'static,
    {
        Resolvable::Callable(Box::new(f))
    }

    pub fn structure<K, V, I>(fields: I) -> Self
    where
        K: Into<String>,
        V: Into<Resolvable>,
        I: IntoIterator<Item = (K, V)>,
    {
        Resolvable::Structure(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn sequence<V, I>(items: I) -> Self
    where
        V: Into<Resolvable>,
        I: IntoIterator<Item = V>,
    {
        Resolvable::Sequence(items.into_iter().map(Into::into).collect())
    }

    /// Resolves this value. Shorthand for [`deep_resolve`].
    pub async fn resolve(self) -> Result<ResolvedValue> {
        deep_resolve(self).await
    }
}

impl fmt::Debug for Resolvable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolvable::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Resolvable::Pending(_) => f.write_str("Pending(..)"),
            Resolvable::Callable(_) => f.write_str("Callable(..)"),
            Resolvable::Sequence(items) => f.debug_tuple("Sequence").field(items).finish(),
            Resolvable::Structure(fields) => f.debug_tuple("Structure").field(fields).finish(),
            Resolvable::Unrecognized(kind) => f.debug_tuple("Unrecognized").field(kind).finish(),
        }
    }
}

macro_rules! literal_from {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for Resolvable {
                fn from(value: $t) -> Self {
                    Resolvable::Literal(value.into())
                }
            }
        )*
    };
}

literal_from!(ResolvedValue, (), bool, f64, i32, &str, String);

impl<T: Into<ResolvedValue>> From<Vec<T>> for Resolvable {
    fn from(values: Vec<T>) -> Self {
        Resolvable::Literal(values.into())
    }
}

impl<T: Into<ResolvedValue>> From<Option<T>> for Resolvable {
    fn from(value: Option<T>) -> Self {
        Resolvable::Literal(value.into())
    }
}

/// Resolves `item` completely.
pub fn deep_resolve(item: Resolvable) -> LocalBoxFuture<'static, Result<ResolvedValue>> {
    async move {
        match item {
            Resolvable::Sequence(items) => {
                let resolved = try_join_all(items.into_iter().map(deep_resolve)).await?;
                Ok(ResolvedValue::Array(resolved))
            }
            Resolvable::Pending(future) => {
                let awaited = future.await?;
                deep_resolve(awaited).await
            }
            Resolvable::Literal(value) => Ok(value),
            Resolvable::Callable(f) => deep_resolve(f()?).await,
            Resolvable::Structure(fields) => {
                let (keys, values): (Vec<_>, Vec<_>) = fields.into_iter().unzip();
                let resolved = try_join_all(values.into_iter().map(deep_resolve)).await?;
                Ok(ResolvedValue::Object(keys.into_iter().zip(resolved).collect()))
            }
            Resolvable::Unrecognized(kind) => Err(BridgeError::Unresolvable { kind }),
        }
    }
    .boxed_local()
}

/// Resolves every element of `items`, concurrently, keeping order.
pub async fn resolve_all(items: Vec<Resolvable>) -> Result<Vec<ResolvedValue>> {
    try_join_all(items.into_iter().map(deep_resolve)).await
}
