//! Remote API proxies
//!
//! An [`ApiSpec`] lists functions by name and source text. Installing it with
//! [`Initiator::create_api`] adds each function on the executor and yields a
//! [`RemoteApi`] whose calls travel as `runFunction` requests.
//!
//! Functions cross the channel as source text and are re-evaluated by the
//! executor: variables captured on the initiator side do not come along.

use portal_common::protocol::error::{BridgeError, Result};
use portal_common::{resolve_all, Resolvable, ResolvedValue};
use std::fmt;
use std::sync::Arc;

use crate::initiator::Initiator;

/// Ordered mapping of function names to function source text.
///
/// Inserting a name twice replaces its source and keeps its original position.
///
/// # Example
///
/// ```
/// use portal_initiator::ApiSpec;
///
/// let spec = ApiSpec::new()
///     .function("add", "(a, b) => a + b")
///     .function("greet", "name => `hello ${name}`");
/// assert_eq!(spec.names().collect::<Vec<_>>(), vec!["add", "greet"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiSpec {
    functions: Vec<(String, String)>,
}

impl ApiSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn function(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        let name = name.into();
        let source = source.into();
        match self.functions.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = source,
            None => self.functions.push((name, source)),
        }
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.functions
            .iter()
            .map(|(name, source)| (name.as_str(), source.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for ApiSpec
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut spec = ApiSpec::new();
        for (name, source) in iter {
            spec.insert(name, source);
        }
        spec
    }
}

/// Proxy over the functions installed by [`Initiator::create_api`].
#[derive(Clone)]
pub struct RemoteApi {
    initiator: Initiator,
    names: Arc<Vec<String>>,
}

impl RemoteApi {
    pub(crate) fn new(initiator: Initiator, names: Vec<String>) -> Self {
        Self {
            initiator,
            names: Arc::new(names),
        }
    }

    /// Installed function names, in spec order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// A reusable stub for `name`, if it was installed.
    pub fn function(&self, name: &str) -> Option<RemoteFunction> {
        self.contains(name).then(|| RemoteFunction {
            initiator: self.initiator.clone(),
            name: name.to_string(),
        })
    }

    /// Calls the installed function `name` with `args`.
    ///
    /// # Arguments
    ///
    /// * `name` - One of [`names`](Self::names)
    /// * `args` - Positional arguments, passed to the function as typed values
    ///
    /// # Returns
    ///
    /// The function's return value, deep-resolved on the executor.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::UnknownFunction`] if `name` was never installed; nothing
    ///   is sent in that case
    /// - [`BridgeError::Remote`] if the function threw or its result rejected
    /// - [`BridgeError::Transport`] if the request could not be sent
    pub async fn call(&self, name: &str, args: Vec<ResolvedValue>) -> Result<ResolvedValue> {
        if !self.contains(name) {
            return Err(BridgeError::UnknownFunction(name.to_string()));
        }
        self.initiator.run_function(name, args).await
    }

    /// Like [`call`](Self::call), deep-resolving `args` locally first so they
    /// may contain pending values and callables.
    ///
    /// # Errors
    ///
    /// Same as [`call`](Self::call), plus any failure while resolving `args`
    /// (e.g. [`BridgeError::Unresolvable`]). Nothing is sent if resolution fails.
    pub async fn call_resolving(&self, name: &str, args: Vec<Resolvable>) -> Result<ResolvedValue> {
        if !self.contains(name) {
            return Err(BridgeError::UnknownFunction(name.to_string()));
        }
        let args = resolve_all(args).await?;
        self.initiator.run_function(name, args).await
    }

    pub fn initiator(&self) -> &Initiator {
        &self.initiator
    }
}

impl fmt::Debug for RemoteApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteApi").field("names", &self.names).finish()
    }
}

/// A single installed remote function.
#[derive(Clone)]
pub struct RemoteFunction {
    initiator: Initiator,
    name: String,
}

impl RemoteFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calls the function. See [`RemoteApi::call`].
    pub async fn call(&self, args: Vec<ResolvedValue>) -> Result<ResolvedValue> {
        self.initiator.run_function(self.name.as_str(), args).await
    }
}

impl fmt::Debug for RemoteFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteFunction").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_common::protocol::{Action, Message};
    use portal_common::transport::channel;

    #[test]
    fn test_spec_keeps_order_and_replaces_duplicates() {
        let spec: ApiSpec = vec![("b", "() => 1"), ("a", "() => 2"), ("b", "() => 3")]
            .into_iter()
            .collect();
        assert_eq!(spec.len(), 2);
        assert_eq!(
            spec.iter().collect::<Vec<_>>(),
            vec![("b", "() => 3"), ("a", "() => 2")]
        );
    }

    #[test]
    fn test_empty_spec() {
        let spec = ApiSpec::new();
        assert!(spec.is_empty());
        assert_eq!(spec.names().count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_name_fails_locally_without_sending() {
        let ((transport, _), (_, mut requests)) = channel::duplex();
        let api = RemoteApi::new(Initiator::new(transport), vec!["known".into()]);

        let err = api.call("unknown", vec![]).await.unwrap_err();
        assert_eq!(err.message(), "Unknown function 'unknown'");
        assert!(api.function("unknown").is_none());
        assert!(requests.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_call_sends_run_function() {
        let ((transport, _), (_, mut requests)) = channel::duplex();
        let initiator = Initiator::new(transport);
        let api = RemoteApi::new(initiator.clone(), vec!["add".into()]);

        let responder = {
            let initiator = initiator.clone();
            async move {
                let request = requests.recv().await.unwrap();
                assert_eq!(request.action, Some(Action::RunFunction));
                assert_eq!(request.payload.name, Some(ResolvedValue::from("add")));
                assert_eq!(
                    request.payload.params,
                    Some(vec![ResolvedValue::from(2), ResolvedValue::from(3)])
                );
                initiator.handle_message(Message::success(
                    Action::RunFunctionComplete,
                    ResolvedValue::from(5),
                    request.callback_id,
                ));
            }
        };

        let add = api.function("add").unwrap();
        let (result, ()) = tokio::join!(add.call(vec![2.into(), 3.into()]), responder);
        assert_eq!(result.unwrap(), ResolvedValue::from(5));
        assert_eq!(add.name(), "add");
    }

    #[tokio::test]
    async fn test_call_resolving_sends_resolved_arguments() {
        let ((transport, _), (_, mut requests)) = channel::duplex();
        let initiator = Initiator::new(transport);
        let api = RemoteApi::new(initiator.clone(), vec!["echo".into()]);

        let responder = {
            let initiator = initiator.clone();
            async move {
                let request = requests.recv().await.unwrap();
                let params = request.payload.params.clone().unwrap_or_default();
                initiator.handle_message(Message::success(
                    Action::RunFunctionComplete,
                    ResolvedValue::Array(params),
                    request.callback_id,
                ));
            }
        };

        let args = vec![
            Resolvable::pending_value(async { 1 }),
            Resolvable::callable(|| "two"),
        ];
        let (result, ()) = tokio::join!(api.call_resolving("echo", args), responder);
        assert_eq!(
            result.unwrap(),
            ResolvedValue::Array(vec![1.into(), "two".into()])
        );
    }
}
