use serde::Serialize;

/// A message on a channel: a JSON object whose schema belongs to the
/// messaging layer, not to the transport.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Errors from decoding or encoding a [`Payload`].
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parses an inbound text frame. Anything that is not a JSON object is
/// rejected.
pub fn parse_payload(text: &str) -> Result<Payload, PayloadError> {
    Ok(serde_json::from_str(text)?)
}

/// Serializes an outbound payload to a text frame.
pub fn encode_payload<T: Serialize + ?Sized>(payload: &T) -> Result<String, PayloadError> {
    Ok(serde_json::to_string(payload)?)
}
