pub mod error;
pub mod message;
pub mod value;


pub use error::{BridgeError, ErrorPayload, Result};
pub use message::{Action, CallbackId, Message, Payload, Source};
pub use value::ResolvedValue;
