use portal_common::protocol::error::{BridgeError, Result};
use portal_common::protocol::{Action, CallbackId, Message, ResolvedValue, Source};
use portal_common::{deep_resolve, resolve_all, Inbox, Resolvable, Transport};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tokio::task::JoinSet;

use crate::config::ExecutorConfig;
use crate::runtime::Engine;

/// Whether an executor reacts to inbound messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutorState {
    #[default]
    Stopped,
    Listening,
}

/// Portal Executor - hosts named functions and runs scripts for an initiator.
///
/// An executor owns one script engine and the registry of function names added
/// through it. It starts [`ExecutorState::Stopped`]; inbound messages are only
/// acted upon after [`start`](Self::start).
///
/// The engine is single-threaded, so an executor is `!Send`. Drive it from a
/// `tokio::task::LocalSet`; [`serve`](Self::serve) runs each request as its
/// own local task so independent requests interleave at their await points.
///
/// The operations ([`run_script`](Self::run_script),
/// [`add_function`](Self::add_function), [`run_function`](Self::run_function))
/// can also be called directly. They bypass the listening gate, send their
/// response through the transport, and return the same outcome locally.
#[derive(Clone)]
pub struct Executor {
    inner: Rc<Inner>,
}

struct Inner {
    engine: Rc<Engine>,
    registry: RefCell<Vec<String>>,
    state: Cell<ExecutorState>,
    transport: Box<dyn Transport>,
    config: ExecutorConfig,
}

impl Executor {
    /// Creates a stopped executor answering through `transport`.
    pub fn new(transport: impl Transport) -> Result<Self> {
        Self::with_config(transport, ExecutorConfig::default())
    }

    pub fn with_config(transport: impl Transport, config: ExecutorConfig) -> Result<Self> {
        let engine = Engine::new(&config)?;
        Ok(Self {
            inner: Rc::new(Inner {
                engine,
                registry: RefCell::new(Vec::new()),
                state: Cell::new(ExecutorState::Stopped),
                transport: Box::new(transport),
                config,
            }),
        })
    }

    pub fn start(&self) {
        tracing::debug!("Executor listening");
        self.inner.state.set(ExecutorState::Listening);
    }

    pub fn stop(&self) {
        tracing::debug!("Executor stopped");
        self.inner.state.set(ExecutorState::Stopped);
    }

    pub fn state(&self) -> ExecutorState {
        self.inner.state.get()
    }

    pub fn is_listening(&self) -> bool {
        self.state() == ExecutorState::Listening
    }

    /// Names added so far, in insertion order, without duplicates.
    pub fn functions(&self) -> Vec<String> {
        self.inner.registry.borrow().clone()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.inner.config
    }

    /// Consumes `inbox` until it closes, handling every message as its own
    /// local task.
    ///
    /// Returns as soon as the inbox closes. Requests still running at that
    /// point are cancelled, since their responses have no reader.
    ///
    /// # Panics
    ///
    /// Panics if called outside a `tokio::task::LocalSet`.
    pub async fn serve(&self, mut inbox: Inbox) {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                message = inbox.recv() => match message {
                    Some(message) => {
                        let executor = self.clone();
                        tasks.spawn_local(async move {
                            executor.handle_message(message).await;
                        });
                    }
                    None => break,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!("Request handler failed: {}", e);
                    }
                }
            }
        }

        // Nobody is left to read the responses
        if !tasks.is_empty() {
            tracing::debug!("Inbox closed, dropping {} unfinished requests", tasks.len());
        }
        tasks.abort_all();
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                if !e.is_cancelled() {
                    tracing::error!("Request handler failed: {}", e);
                }
            }
        }
        tracing::debug!("Executor inbox closed");
    }

    /// Validates and dispatches one inbound message.
    ///
    /// - Stopped: ignored.
    /// - Not from an initiator, or no action: dropped.
    /// - Unknown action: answered with an `error` response.
    pub async fn handle_message(&self, message: Message) {
        if !self.is_listening() {
            tracing::debug!("Executor stopped, ignoring message {}", message.callback_id);
            return;
        }

        if message.source != Source::Initiator {
            tracing::debug!(
                "Dropping message {} from source '{}'",
                message.callback_id,
                message.source.as_str()
            );
            return;
        }

        let Message {
            action,
            payload,
            callback_id,
            ..
        } = message;

        let Some(action) = action else {
            tracing::debug!("Dropping message {} without an action", callback_id);
            return;
        };

        tracing::debug!("Handling {} request {}", action, callback_id);

        let outcome = match &action {
            Action::RunScript => self.execute_script(payload.script.as_deref()).await,
            Action::AddFunction => {
                self.install_function(payload.name, payload.fn_string.as_deref())
            }
            Action::RunFunction => {
                self.invoke_function(
                    payload.name.unwrap_or_default(),
                    payload.params.unwrap_or_default(),
                )
                .await
            }
            other => {
                tracing::warn!("Rejecting unknown action '{}' ({})", other, callback_id);
                let error = BridgeError::UnknownAction(other.to_string());
                self.send(Message::failure(other.completion(), error.to_payload(), callback_id));
                return;
            }
        };
        self.respond(action.completion(), callback_id, &outcome);
    }

    /// Runs `script` as a function body and answers with `runScriptComplete`.
    ///
    /// # Arguments
    ///
    /// * `script` - Strict-mode function body; added functions are visible as
    ///   globals
    /// * `callback_id` - Echoed in the response
    ///
    /// # Returns
    ///
    /// The deep-resolved return value, the same one sent as `result`.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Remote`] for compile errors, throws and rejections
    /// - [`BridgeError::Unresolvable`] if the result holds a symbol, a bigint
    ///   or a cycle
    pub async fn run_script(&self, script: &str, callback_id: CallbackId) -> Result<ResolvedValue> {
        let outcome = self.execute_script(Some(script)).await;
        self.respond(Action::RunScriptComplete, callback_id, &outcome);
        outcome
    }

    /// Binds `function_source` as the global `name` and answers with
    /// `addFunctionComplete`. Succeeds with the name.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::InvalidFunctionName`] if `name` is not a non-empty
    ///   string; the registry is untouched
    /// - [`BridgeError::Remote`] if `function_source` does not evaluate
    pub async fn add_function(
        &self,
        name: impl Into<ResolvedValue>,
        function_source: &str,
        callback_id: CallbackId,
    ) -> Result<ResolvedValue> {
        let outcome = self.install_function(Some(name.into()), Some(function_source));
        self.respond(Action::AddFunctionComplete, callback_id, &outcome);
        outcome
    }

    /// Calls the added function `name` with `params` and answers with
    /// `runFunctionComplete`.
    ///
    /// # Arguments
    ///
    /// * `name` - A name previously added; non-strings never match
    /// * `callback_id` - Echoed in the response
    /// * `params` - Deep-resolved, then passed as typed engine values
    ///
    /// # Errors
    ///
    /// - [`BridgeError::UnknownFunction`] for names never added; nothing is
    ///   invoked
    /// - [`BridgeError::Remote`] if the function threw or its result rejected
    pub async fn run_function(
        &self,
        name: impl Into<ResolvedValue>,
        callback_id: CallbackId,
        params: Vec<ResolvedValue>,
    ) -> Result<ResolvedValue> {
        let outcome = self.invoke_function(name.into(), params).await;
        self.respond(Action::RunFunctionComplete, callback_id, &outcome);
        outcome
    }

    async fn execute_script(&self, script: Option<&str>) -> Result<ResolvedValue> {
        let script =
            script.ok_or_else(|| BridgeError::Engine("runScript request has no script".into()))?;
        let result = self.inner.engine.run_script(script)?;
        deep_resolve(result).await
    }

    fn install_function(
        &self,
        name: Option<ResolvedValue>,
        function_source: Option<&str>,
    ) -> Result<ResolvedValue> {
        let name = match name {
            Some(ResolvedValue::String(name)) if !name.is_empty() => name,
            _ => return Err(BridgeError::InvalidFunctionName),
        };
        let source = function_source
            .ok_or_else(|| BridgeError::Engine("addFunction request has no fnString".into()))?;

        self.inner.engine.define_global(&name, source)?;

        let mut registry = self.inner.registry.borrow_mut();
        if !registry.contains(&name) {
            registry.push(name.clone());
        }
        tracing::debug!("Added function '{}'", name);
        Ok(ResolvedValue::String(name))
    }

    async fn invoke_function(
        &self,
        name: ResolvedValue,
        params: Vec<ResolvedValue>,
    ) -> Result<ResolvedValue> {
        let name = match name {
            ResolvedValue::String(name) if self.inner.registry.borrow().contains(&name) => name,
            other => return Err(BridgeError::UnknownFunction(other.to_string())),
        };

        let params = resolve_all(params.into_iter().map(Resolvable::from).collect()).await?;
        let result = self.inner.engine.call_global(&name, &params)?;
        deep_resolve(result).await
    }

    fn respond(&self, action: Action, callback_id: CallbackId, outcome: &Result<ResolvedValue>) {
        let message = match outcome {
            Ok(result) => Message::success(action, result.clone(), callback_id),
            Err(e) => {
                tracing::warn!("{} request {} failed: {}", action, callback_id, e);
                Message::failure(action, e.to_payload(), callback_id)
            }
        };
        self.send(message);
    }

    fn send(&self, message: Message) {
        let callback_id = message.callback_id.clone();
        if let Err(e) = self.inner.transport.send(message) {
            tracing::warn!("Failed to send response {}: {}", callback_id, e);
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("state", &self.state())
            .field("functions", &self.functions())
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_common::transport::channel;
    use portal_common::ErrorPayload;

    fn executor() -> (Executor, Inbox) {
        let ((transport, _), (_, replies)) = channel::duplex();
        (Executor::new(transport).unwrap(), replies)
    }

    #[test]
    fn test_executor_starts_stopped() {
        let (executor, _replies) = executor();
        assert_eq!(executor.state(), ExecutorState::Stopped);
        executor.start();
        assert!(executor.is_listening());
        executor.stop();
        assert!(!executor.is_listening());
    }

    #[tokio::test]
    async fn test_registry_keeps_insertion_order_without_duplicates() {
        let (executor, _replies) = executor();
        for name in ["b", "a", "b"] {
            executor
                .add_function(name, "() => 1", CallbackId::from(name))
                .await
                .unwrap();
        }
        assert_eq!(executor.functions(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_empty_name_is_invalid() {
        let (executor, mut replies) = executor();
        let err = executor
            .add_function("", "() => 1", CallbackId::from("1"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidFunctionName));
        assert!(executor.functions().is_empty());

        let reply = replies.recv().await.unwrap();
        assert_eq!(
            reply.payload.error,
            Some(ErrorPayload::Value("Function name must be a string".into()))
        );
    }

    #[tokio::test]
    async fn test_failed_compile_leaves_registry_untouched() {
        let (executor, _replies) = executor();
        let err = executor
            .add_function("broken", "function (", CallbackId::from("1"))
            .await
            .unwrap_err();
        assert_eq!(err.name(), Some("SyntaxError"));
        assert!(executor.functions().is_empty());
    }

    #[test]
    fn test_missing_fn_string_is_an_execution_error() {
        let (executor, _replies) = executor();
        let err = executor
            .install_function(Some("f".into()), None)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Engine(_)));
        assert_eq!(err.to_payload().name(), Some("Error"));
        assert!(executor.functions().is_empty());
    }
}
