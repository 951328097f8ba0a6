use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::value::ResolvedValue;

/// The `error` field of a failed response.
///
/// Exception-like values travel as their `name` and `message`; anything else
/// that was thrown (a string, a number, a plain object) travels as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ErrorPayload {
    Exception { name: String, message: String },
    Value(ResolvedValue),
}

impl ErrorPayload {
    pub fn exception(name: impl Into<String>, message: impl Into<String>) -> Self {
        ErrorPayload::Exception {
            name: name.into(),
            message: message.into(),
        }
    }

    /// The message a caller sees: the exception message, or the raw value
    /// rendered as text.
    pub fn message(&self) -> String {
        match self {
            ErrorPayload::Exception { message, .. } => message.clone(),
            ErrorPayload::Value(value) => value.to_string(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            ErrorPayload::Exception { name, .. } => Some(name),
            ErrorPayload::Value(_) => None,
        }
    }
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPayload::Exception { name, message } => write!(f, "{}: {}", name, message),
            ErrorPayload::Value(value) => write!(f, "{}", value),
        }
    }
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("{0}")]
    Remote(ErrorPayload),

    #[error("Function name must be a string")]
    InvalidFunctionName,

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("unresolvable value of kind '{kind}'")]
    Unresolvable { kind: String },

    #[error("Script engine error: {0}")]
    Engine(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Pending call abandoned before a response arrived")]
    Abandoned,

    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Converts a local failure into what gets sent on the wire.
    ///
    /// Validation failures carry their fixed message as a raw string, the way a
    /// peer reports them; everything else is reported as an `Error` exception.
    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            BridgeError::Remote(payload) => payload.clone(),
            BridgeError::InvalidFunctionName
            | BridgeError::UnknownFunction(_)
            | BridgeError::UnknownAction(_) => {
                ErrorPayload::Value(ResolvedValue::String(self.to_string()))
            }
            other => ErrorPayload::exception("Error", other.to_string()),
        }
    }

    /// The reconstructed error message.
    pub fn message(&self) -> String {
        match self {
            BridgeError::Remote(payload) => payload.message(),
            other => other.to_string(),
        }
    }

    /// The reconstructed error name, when the failure carried one.
    pub fn name(&self) -> Option<&str> {
        match self {
            BridgeError::Remote(payload) => payload.name(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
