use crate::protocol::error::Result;
use crate::protocol::Message;

/// JSON codec for encoding/decoding bridge messages
///
/// The encoding is lossless: [`ResolvedValue`](crate::protocol::ResolvedValue)
/// uses a tagged form that keeps `undefined` and non-finite numbers.
///
/// # Example
///
/// ```
/// use portal_common::transport::JsonCodec;
/// use portal_common::protocol::{Action, CallbackId, Message, ResolvedValue};
///
/// let response = Message::success(
///     Action::RunFunctionComplete,
///     ResolvedValue::Number(f64::NAN),
///     CallbackId::from("42"),
/// );
/// let encoded = JsonCodec::encode(&response).unwrap();
/// let decoded = JsonCodec::decode(&encoded).unwrap();
/// assert_eq!(response, decoded);
/// ```
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a message to bytes
    pub fn encode(message: &Message) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(message)?)
    }

    /// Decode a message from bytes
    pub fn decode(data: &[u8]) -> Result<Message> {
        Ok(serde_json::from_slice(data)?)
    }
}
