//! Portal Message Envelope
//!
//! Every exchange between an initiator and an executor is a [`Message`]: a
//! request carries one of the three request actions and a fresh callback id;
//! the matching response echoes the callback id, carries the completion action
//! and reports `success`.
//!
//! # Message Flow
//!
//! 1. Initiator builds a request with [`Message::request`] and sends it
//! 2. Executor validates `source` and `action`, runs the operation
//! 3. Executor answers with [`Message::success`] or [`Message::failure`]
//! 4. Initiator correlates the response by `callback_id`
//!
//! Unknown sources and unknown actions are representable (see [`Source::Unknown`]
//! and [`Action::Unrecognized`]) so that receivers can decide to drop or reject
//! them instead of failing to decode.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::ErrorPayload;
use super::value::ResolvedValue;

/// Which side of the bridge produced a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum Source {
    Initiator,
    Executor,
    #[default]
    Missing,
    Unknown(String),
}

impl Source {
    pub fn as_str(&self) -> &str {
        match self {
            Source::Initiator => "initiator",
            Source::Executor => "executor",
            Source::Missing => "",
            Source::Unknown(s) => s,
        }
    }
}

impl From<String> for Source {
    fn from(s: String) -> Self {
        match s.as_str() {
            "initiator" => Source::Initiator,
            "executor" => Source::Executor,
            "" => Source::Missing,
            _ => Source::Unknown(s),
        }
    }
}

impl From<Source> for String {
    fn from(source: Source) -> Self {
        source.as_str().to_string()
    }
}

/// The fixed action vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    AddFunction,
    RunFunction,
    RunScript,
    AddFunctionComplete,
    RunFunctionComplete,
    RunScriptComplete,
    Error,
    Unrecognized(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Action::AddFunction => "addFunction",
            Action::RunFunction => "runFunction",
            Action::RunScript => "runScript",
            Action::AddFunctionComplete => "addFunctionComplete",
            Action::RunFunctionComplete => "runFunctionComplete",
            Action::RunScriptComplete => "runScriptComplete",
            Action::Error => "error",
            Action::Unrecognized(s) => s,
        }
    }

    /// True for the three actions an initiator may send.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Action::AddFunction | Action::RunFunction | Action::RunScript
        )
    }

    /// The response action answering this request action.
    ///
    /// Anything that is not a request is answered with [`Action::Error`].
    pub fn completion(&self) -> Action {
        match self {
            Action::AddFunction => Action::AddFunctionComplete,
            Action::RunFunction => Action::RunFunctionComplete,
            Action::RunScript => Action::RunScriptComplete,
            _ => Action::Error,
        }
    }
}

impl From<String> for Action {
    fn from(s: String) -> Self {
        match s.as_str() {
            "addFunction" => Action::AddFunction,
            "runFunction" => Action::RunFunction,
            "runScript" => Action::RunScript,
            "addFunctionComplete" => Action::AddFunctionComplete,
            "runFunctionComplete" => Action::RunFunctionComplete,
            "runScriptComplete" => Action::RunScriptComplete,
            "error" => Action::Error,
            _ => Action::Unrecognized(s),
        }
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.as_str().to_string()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque correlation token pairing a request with its response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct CallbackId(String);

impl CallbackId {
    pub fn new(id: impl Into<String>) -> Self {
        CallbackId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallbackId {
    fn from(s: &str) -> Self {
        CallbackId(s.to_string())
    }
}

impl From<String> for CallbackId {
    fn from(s: String) -> Self {
        CallbackId(s)
    }
}

/// Message payload.
///
/// Requests fill `name`/`fn_string`/`script`/`params` depending on the action;
/// responses fill `result` or `error`. `name` is kept as a value rather than a
/// string because executors must be able to reject non-string names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResolvedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ResolvedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fn_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<ResolvedValue>>,
}

impl Payload {
    pub fn add_function(name: impl Into<String>, fn_string: impl Into<String>) -> Self {
        Payload {
            name: Some(ResolvedValue::String(name.into())),
            fn_string: Some(fn_string.into()),
            ..Default::default()
        }
    }

    pub fn run_function(name: impl Into<String>, params: Vec<ResolvedValue>) -> Self {
        Payload {
            name: Some(ResolvedValue::String(name.into())),
            params: Some(params),
            ..Default::default()
        }
    }

    pub fn run_script(script: impl Into<String>) -> Self {
        Payload {
            script: Some(script.into()),
            ..Default::default()
        }
    }

    pub fn result(result: ResolvedValue) -> Self {
        Payload {
            result: Some(result),
            ..Default::default()
        }
    }

    pub fn error(error: ErrorPayload) -> Self {
        Payload {
            error: Some(error),
            ..Default::default()
        }
    }
}

/// The envelope crossing the channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub source: Source,
    #[serde(default, deserialize_with = "non_empty_action")]
    pub action: Option<Action>,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default)]
    pub callback_id: CallbackId,
    #[serde(default = "default_success")]
    pub success: bool,
}

fn default_success() -> bool {
    true
}

fn non_empty_action<'de, D>(deserializer: D) -> Result<Option<Action>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(Action::from))
}

impl Message {
    /// A request sent by an initiator.
    pub fn request(action: Action, payload: Payload, callback_id: CallbackId) -> Self {
        Message {
            source: Source::Initiator,
            action: Some(action),
            payload,
            callback_id,
            success: true,
        }
    }

    /// A successful response carrying `result`.
    pub fn success(action: Action, result: ResolvedValue, callback_id: CallbackId) -> Self {
        Message {
            source: Source::Executor,
            action: Some(action),
            payload: Payload::result(result),
            callback_id,
            success: true,
        }
    }

    /// A failed response carrying `error`.
    pub fn failure(action: Action, error: ErrorPayload, callback_id: CallbackId) -> Self {
        Message {
            source: Source::Executor,
            action: Some(action),
            payload: Payload::error(error),
            callback_id,
            success: false,
        }
    }
}
