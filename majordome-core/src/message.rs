//! Application payload codec.
//!
//! Every request and reply carries an `MqMessage`: an action identifier
//! plus a JSON-representable data mapping. On the wire the message is two
//! trailing frames, `[action, json(data)]`; everything in front of them
//! (protocol tag, service name, routing envelope) belongs to the broker
//! layer and is opaque to this codec.
//!
//! # Examples
//!
//! ```
//! use majordome_core::message::MqMessage;
//!
//! let msg = MqMessage::new("device.switch")
//!     .insert("device", 42)
//!     .insert("state", "on");
//!
//! let frames = msg.to_frames().unwrap();
//! assert_eq!(MqMessage::from_frames(&frames).unwrap(), msg);
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Payload codec errors
#[derive(Debug, Error)]
pub enum MessageError {
    /// The frames do not form a decodable payload
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The data mapping could not be serialized
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type alias for payload codec operations
pub type Result<T> = std::result::Result<T, MessageError>;

/// An action identifier plus a JSON-object data mapping.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MqMessage {
    action: String,
    data: Map<String, Value>,
}

impl MqMessage {
    /// Create a message with an empty data mapping.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            data: Map::new(),
        }
    }

    /// Create a message from an action and an existing data mapping.
    pub fn with_data(action: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            action: action.into(),
            data,
        }
    }

    /// Add a key to the data mapping (builder style).
    #[must_use]
    pub fn insert(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// The action identifier.
    #[inline]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// The data mapping.
    #[inline]
    pub const fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Look up a key in the data mapping.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Encode into `[action, json(data)]` frames.
    pub fn to_frames(&self) -> Result<Vec<Bytes>> {
        let json = serde_json::to_vec(&self.data)?;
        Ok(vec![
            Bytes::copy_from_slice(self.action.as_bytes()),
            Bytes::from(json),
        ])
    }

    /// Decode from frames produced by [`MqMessage::to_frames`].
    ///
    /// Requires at least two frames: a UTF-8 action and a JSON object.
    /// Trailing frames beyond the first two are ignored.
    pub fn from_frames(frames: &[Bytes]) -> Result<Self> {
        if frames.len() < 2 {
            return Err(MessageError::MalformedEnvelope(format!(
                "expected at least 2 frames, got {}",
                frames.len()
            )));
        }

        let action = std::str::from_utf8(&frames[0])
            .map_err(|_| MessageError::MalformedEnvelope("action is not UTF-8".into()))?
            .to_owned();

        let value: Value = serde_json::from_slice(&frames[1])
            .map_err(|e| MessageError::MalformedEnvelope(format!("bad JSON payload: {e}")))?;

        match value {
            Value::Object(data) => Ok(Self { action, data }),
            other => Err(MessageError::MalformedEnvelope(format!(
                "payload is not a JSON object: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roundtrip_empty_mapping() {
        let msg = MqMessage::new("ping");
        let decoded = MqMessage::from_frames(&msg.to_frames().unwrap()).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.action(), "ping");
        assert!(decoded.data().is_empty());
    }

    #[test]
    fn roundtrip_nested_structures() {
        let msg = MqMessage::new("scenario.update")
            .insert("id", 7)
            .insert("enabled", true)
            .insert("threshold", 21.5)
            .insert("tags", json!(["heating", "ground-floor"]))
            .insert("schedule", json!({ "days": [1, 2, 3], "at": null }));

        let decoded = MqMessage::from_frames(&msg.to_frames().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn too_few_frames_is_malformed() {
        let err = MqMessage::from_frames(&[Bytes::from_static(b"ping")]).unwrap_err();
        assert!(matches!(err, MessageError::MalformedEnvelope(_)));
    }

    #[test]
    fn non_object_payload_is_malformed() {
        let frames = vec![Bytes::from_static(b"ping"), Bytes::from_static(b"[1,2]")];
        assert!(matches!(
            MqMessage::from_frames(&frames),
            Err(MessageError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn garbage_payload_is_malformed() {
        let frames = vec![Bytes::from_static(b"ping"), Bytes::from_static(b"{oops")];
        assert!(matches!(
            MqMessage::from_frames(&frames),
            Err(MessageError::MalformedEnvelope(_))
        ));
    }
}
