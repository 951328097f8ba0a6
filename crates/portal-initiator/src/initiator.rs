use portal_common::protocol::error::{BridgeError, Result};
use portal_common::protocol::{
    Action, CallbackId, ErrorPayload, Message, Payload, ResolvedValue, Source,
};
use portal_common::{deferred, Deferred, Inbox, Transport};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

use crate::api::{ApiSpec, RemoteApi};

/// Distinguishes initiators created within the same clock tick.
static INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Portal Initiator - sends requests to an executor and correlates responses.
///
/// Every request gets a fresh callback id and a [`Deferred`] parked in the
/// correlation table. [`handle_message`](Self::handle_message) settles the
/// matching entry when the response arrives, in whatever order responses come
/// back. Cloning is cheap; clones share the table.
///
/// # Example
///
/// ```no_run
/// use portal_initiator::{ApiSpec, Initiator};
/// use portal_common::transport::StreamTransport;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let stream = tokio::net::TcpStream::connect("127.0.0.1:7070").await?;
/// let (transport, inbox) = StreamTransport::spawn(stream);
///
/// let initiator = Initiator::new(transport);
/// initiator.listen(inbox);
///
/// let api = initiator
///     .create_api(ApiSpec::new().function("add", "(a, b) => a + b"))
///     .await?;
/// let sum = api.call("add", vec![2.into(), 3.into()]).await?;
/// println!("{}", sum);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Initiator {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Box<dyn Transport>,
    pending: Mutex<HashMap<CallbackId, Deferred<ResolvedValue>>>,
    id_prefix: String,
    next_id: AtomicU64,
}

impl Inner {
    fn pending(&self) -> MutexGuard<'_, HashMap<CallbackId, Deferred<ResolvedValue>>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Removes a correlation entry when the awaiting call goes away, so calls
/// abandoned by their caller (for example after a timeout) do not linger.
struct PendingEntry<'a> {
    inner: &'a Inner,
    callback_id: CallbackId,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        self.inner.pending().remove(&self.callback_id);
    }
}

impl Initiator {
    /// Creates an initiator sending its requests through `transport`.
    ///
    /// Responses are not read automatically: pass the matching inbox to
    /// [`listen`](Self::listen), or feed messages to
    /// [`handle_message`](Self::handle_message) directly.
    ///
    /// # Arguments
    ///
    /// * `transport` - The sending half of the channel to an executor
    pub fn new(transport: impl Transport) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let instance = INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed);

        Self {
            inner: Arc::new(Inner {
                transport: Box::new(transport),
                pending: Mutex::new(HashMap::new()),
                id_prefix: format!("{:x}{:x}", nanos, instance),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Number of requests still waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending().len()
    }

    fn next_callback_id(&self) -> CallbackId {
        let n = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        CallbackId::new(format!("{}-{}", self.inner.id_prefix, n))
    }

    /// Sends one request and waits for its response.
    ///
    /// # Errors
    ///
    /// - The transport refused the message (the entry is removed again)
    /// - The executor answered with `success == false` ([`BridgeError::Remote`])
    pub async fn request(&self, action: Action, payload: Payload) -> Result<ResolvedValue> {
        let callback_id = self.next_callback_id();
        let (deferred, response) = deferred();

        self.inner.pending().insert(callback_id.clone(), deferred);
        let _entry = PendingEntry {
            inner: &self.inner,
            callback_id: callback_id.clone(),
        };

        tracing::debug!("Sending {} request {}", action, callback_id);
        self.inner
            .transport
            .send(Message::request(action, payload, callback_id))?;

        response.await
    }

    /// Routes one inbound message to the pending call it answers.
    ///
    /// Messages not from an executor, without an action, or carrying a request
    /// action are ignored, as are responses whose callback id is unknown
    /// (already settled or never sent).
    pub fn handle_message(&self, message: Message) {
        let is_response = message.source == Source::Executor
            && message.action.as_ref().is_some_and(|action| !action.is_request());
        if !is_response {
            tracing::debug!(
                "Ignoring message {} from source '{}'",
                message.callback_id,
                message.source.as_str()
            );
            return;
        }

        let Some(deferred) = self.inner.pending().remove(&message.callback_id) else {
            tracing::warn!("No pending call for response {}", message.callback_id);
            return;
        };

        let Message {
            payload,
            callback_id,
            success,
            ..
        } = message;

        if success {
            tracing::debug!("Response {} succeeded", callback_id);
            deferred.resolve(payload.result.unwrap_or_default());
        } else {
            let error = payload
                .error
                .unwrap_or(ErrorPayload::Value(ResolvedValue::Undefined));
            tracing::debug!("Response {} failed: {}", callback_id, error);
            deferred.reject(BridgeError::Remote(error));
        }
    }

    /// Spawns a task feeding every message of `inbox` to
    /// [`handle_message`](Self::handle_message) until the inbox closes.
    pub fn listen(&self, mut inbox: Inbox) -> JoinHandle<()> {
        let initiator = self.clone();
        tokio::spawn(async move {
            while let Some(message) = inbox.recv().await {
                initiator.handle_message(message);
            }
            tracing::debug!("Initiator inbox closed");
        })
    }

    /// Runs `script` remotely and returns its resolved result.
    ///
    /// # Arguments
    ///
    /// * `script` - A function body; `return` provides the result
    ///
    /// # Returns
    ///
    /// The returned value after deep resolution on the executor
    /// (`Undefined` if the script returns nothing).
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Remote`] if the script failed to compile, threw, or
    ///   its result rejected
    /// - [`BridgeError::Transport`] if the request could not be sent
    pub async fn run_script(&self, script: impl Into<String>) -> Result<ResolvedValue> {
        self.request(Action::RunScript, Payload::run_script(script))
            .await
    }

    /// Calls a function previously added on the executor.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Remote`] carrying `"Unknown function '<name>'"` if the
    /// executor never added `name`; otherwise as for
    /// [`run_script`](Self::run_script).
    pub async fn run_function(
        &self,
        name: impl Into<String>,
        params: Vec<ResolvedValue>,
    ) -> Result<ResolvedValue> {
        self.request(Action::RunFunction, Payload::run_function(name, params))
            .await
    }

    /// Adds `function_source` on the executor under `name`.
    ///
    /// # Arguments
    ///
    /// * `name` - Global name the function is bound to, replacing any previous
    ///   binding
    /// * `function_source` - Source text of a single function expression
    ///
    /// # Returns
    ///
    /// The name, as acknowledged by the executor.
    pub async fn add_function(
        &self,
        name: impl Into<String>,
        function_source: impl Into<String>,
    ) -> Result<ResolvedValue> {
        self.request(
            Action::AddFunction,
            Payload::add_function(name, function_source),
        )
        .await
    }

    /// Adds every function of `spec` and returns a proxy over them.
    ///
    /// Completes once every `addFunction` round trip has; fails with the first
    /// error if any of them fails.
    ///
    /// # Errors
    ///
    /// The first failing `addFunction`, typically a [`BridgeError::Remote`]
    /// `SyntaxError` for source that does not compile.
    pub async fn create_api(&self, spec: ApiSpec) -> Result<RemoteApi> {
        let additions = spec
            .iter()
            .map(|(name, source)| self.add_function(name, source));
        futures::future::try_join_all(additions).await?;

        Ok(RemoteApi::new(
            self.clone(),
            spec.iter().map(|(name, _)| name.to_string()).collect(),
        ))
    }

    /// Like [`create_api`](Self::create_api), with the spec produced by
    /// `factory`, which is invoked exactly once.
    pub async fn create_api_with<F>(&self, factory: F) -> Result<RemoteApi>
    where
        F: FnOnce() -> ApiSpec,
    {
        self.create_api(factory()).await
    }
}

impl std::fmt::Debug for Initiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Initiator")
            .field("id_prefix", &self.inner.id_prefix)
            .field("pending_calls", &self.pending_calls())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_common::transport::channel;
    use std::time::Duration;

    fn reply(request: &Message, result: ResolvedValue) -> Message {
        Message::success(
            request.action.as_ref().map(Action::completion).unwrap_or(Action::Error),
            result,
            request.callback_id.clone(),
        )
    }

    #[test]
    fn test_callback_ids_are_unique() {
        let ((transport, _), _) = channel::duplex();
        let initiator = Initiator::new(transport);
        let a = initiator.next_callback_id();
        let b = initiator.next_callback_id();
        assert_ne!(a, b);

        let ((other_transport, _), _) = channel::duplex();
        let other = Initiator::new(other_transport);
        assert_ne!(other.next_callback_id(), a);
    }

    #[tokio::test]
    async fn test_responses_in_reverse_order_settle_the_right_calls() {
        let ((transport, _), (_, mut requests)) = channel::duplex();
        let initiator = Initiator::new(transport);

        let responder = {
            let initiator = initiator.clone();
            async move {
                let first = requests.recv().await.unwrap();
                let second = requests.recv().await.unwrap();
                initiator.handle_message(reply(&second, "second".into()));
                initiator.handle_message(reply(&first, "first".into()));
            }
        };

        let (a, b, ()) = tokio::join!(
            initiator.run_script("return 'first';"),
            initiator.run_script("return 'second';"),
            responder,
        );

        let results = [a.unwrap(), b.unwrap()];
        assert!(results.contains(&ResolvedValue::from("first")));
        assert!(results.contains(&ResolvedValue::from("second")));
        assert_ne!(results[0], results[1]);
        assert_eq!(initiator.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_each_call_gets_its_own_response() {
        let ((transport, _), (_, mut requests)) = channel::duplex();
        let initiator = Initiator::new(transport);

        let responder = {
            let initiator = initiator.clone();
            async move {
                let mut received = Vec::new();
                for _ in 0..2 {
                    received.push(requests.recv().await.unwrap());
                }
                for request in received.iter().rev() {
                    let script = request.payload.script.clone().unwrap_or_default();
                    initiator.handle_message(reply(request, script.into()));
                }
            }
        };

        let (a, b, ()) = tokio::join!(
            initiator.run_script("one"),
            initiator.run_script("two"),
            responder,
        );
        assert_eq!(a.unwrap(), ResolvedValue::from("one"));
        assert_eq!(b.unwrap(), ResolvedValue::from("two"));
    }

    #[tokio::test]
    async fn test_failure_response_rejects_with_remote_error() {
        let ((transport, _), (_, mut requests)) = channel::duplex();
        let initiator = Initiator::new(transport);

        let responder = {
            let initiator = initiator.clone();
            async move {
                let request = requests.recv().await.unwrap();
                initiator.handle_message(Message::failure(
                    Action::RunScriptComplete,
                    ErrorPayload::exception("Error", "boom"),
                    request.callback_id,
                ));
            }
        };

        let (result, ()) = tokio::join!(initiator.run_script("throw"), responder);
        let err = result.unwrap_err();
        assert_eq!(err.message(), "boom");
        assert_eq!(err.name(), Some("Error"));
        assert_eq!(initiator.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_failure_without_error_payload() {
        let ((transport, _), (_, mut requests)) = channel::duplex();
        let initiator = Initiator::new(transport);

        let responder = {
            let initiator = initiator.clone();
            async move {
                let request = requests.recv().await.unwrap();
                let mut response = reply(&request, ResolvedValue::Undefined);
                response.success = false;
                response.payload = Payload::default();
                initiator.handle_message(response);
            }
        };

        let (result, ()) = tokio::join!(initiator.run_script("x"), responder);
        assert!(matches!(
            result,
            Err(BridgeError::Remote(ErrorPayload::Value(ResolvedValue::Undefined)))
        ));
    }

    #[tokio::test]
    async fn test_missing_result_resolves_to_undefined() {
        let ((transport, _), (_, mut requests)) = channel::duplex();
        let initiator = Initiator::new(transport);

        let responder = {
            let initiator = initiator.clone();
            async move {
                let request = requests.recv().await.unwrap();
                let mut response = reply(&request, ResolvedValue::Null);
                response.payload.result = None;
                initiator.handle_message(response);
            }
        };

        let (result, ()) = tokio::join!(initiator.run_script("x"), responder);
        assert_eq!(result.unwrap(), ResolvedValue::Undefined);
    }

    #[tokio::test]
    async fn test_stale_and_foreign_messages_are_ignored() {
        let ((transport, _), (_, mut requests)) = channel::duplex();
        let initiator = Initiator::new(transport);

        let responder = {
            let initiator = initiator.clone();
            async move {
                let request = requests.recv().await.unwrap();

                initiator.handle_message(reply(
                    &Message::request(Action::RunScript, Payload::default(), "unknown".into()),
                    1.into(),
                ));

                let mut foreign = reply(&request, "foreign".into());
                foreign.source = Source::Initiator;
                initiator.handle_message(foreign);

                let mut no_action = reply(&request, "no action".into());
                no_action.action = None;
                initiator.handle_message(no_action);

                let mut echoed = reply(&request, "echoed".into());
                echoed.action = Some(Action::RunScript);
                initiator.handle_message(echoed);

                assert_eq!(initiator.pending_calls(), 1);
                initiator.handle_message(reply(&request, "real".into()));
                // A duplicate after settlement is stale
                initiator.handle_message(reply(&request, "duplicate".into()));
            }
        };

        let (result, ()) = tokio::join!(initiator.run_script("x"), responder);
        assert_eq!(result.unwrap(), ResolvedValue::from("real"));
        assert_eq!(initiator.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_send_failure_removes_pending_call() {
        let ((transport, _), peer) = channel::duplex();
        drop(peer);
        let initiator = Initiator::new(transport);

        let err = initiator.run_script("return 1;").await.unwrap_err();
        assert!(matches!(err, BridgeError::Transport(_)));
        assert_eq!(initiator.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_timed_out_call_leaves_no_entry() {
        let ((transport, _), (_, _requests)) = channel::duplex();
        let initiator = Initiator::new(transport);

        let outcome =
            tokio::time::timeout(Duration::from_millis(20), initiator.run_script("never")).await;
        assert!(outcome.is_err());
        assert_eq!(initiator.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_listen_feeds_handle_message() {
        let ((transport, inbox), (executor_side, mut requests)) = channel::duplex();
        let initiator = Initiator::new(transport);
        let listener = initiator.listen(inbox);

        let responder = tokio::spawn(async move {
            let request = requests.recv().await.unwrap();
            executor_side
                .send(reply(&request, ResolvedValue::from(4)))
                .unwrap();
        });

        assert_eq!(
            initiator.run_script("return 4;").await.unwrap(),
            ResolvedValue::from(4)
        );
        responder.await.unwrap();
        listener.abort();
    }
}
