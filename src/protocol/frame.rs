//! Wire Frame Types
//!
//! One JSON object per WebSocket text frame, in both directions:
//!
//! ```text
//! { "type": "data" | "error" | "status" | "subscribe" | "unsubscribe",
//!   "sessionId"?: string, "deviceId"?: string, "timestamp": number,
//!   "data"?: { name: value, ... }, "error"?: string }
//! ```

use chrono::Utc;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Semantic type of a frame
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FrameType {
    /// Measurements from one device
    Data,
    /// Application-level error reported by the server
    Error,
    /// Connection-state update for one field connection
    Status,
    /// Control frame: start streaming a session
    Subscribe,
    /// Control frame: stop streaming a session
    Unsubscribe,
    /// Missing or unrecognised `type`
    #[default]
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameType::Data => write!(f, "data"),
            FrameType::Error => write!(f, "error"),
            FrameType::Status => write!(f, "status"),
            FrameType::Subscribe => write!(f, "subscribe"),
            FrameType::Unsubscribe => write!(f, "unsubscribe"),
            FrameType::Unknown => write!(f, "unknown"),
        }
    }
}

/// A single message exchanged over the telemetry socket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    #[serde(rename = "type", default)]
    pub kind: FrameType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    /// Unix timestamp in milliseconds; fractional input is truncated
    #[serde(deserialize_with = "millis")]
    pub timestamp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Frame {
    fn control(kind: FrameType, session_id: &str) -> Self {
        Self {
            kind,
            session_id: Some(session_id.to_string()),
            device_id: None,
            timestamp: Utc::now().timestamp_millis(),
            data: None,
            error: None,
        }
    }

    /// Build a `subscribe` control frame for a session
    pub fn subscribe(session_id: &str) -> Self {
        Self::control(FrameType::Subscribe, session_id)
    }

    /// Build an `unsubscribe` control frame for a session
    pub fn unsubscribe(session_id: &str) -> Self {
        Self::control(FrameType::Unsubscribe, session_id)
    }

    /// Build a `data` frame carrying measurements for one device
    pub fn data(
        session_id: &str,
        device_id: &str,
        timestamp: i64,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            kind: FrameType::Data,
            session_id: Some(session_id.to_string()),
            device_id: Some(device_id.to_string()),
            timestamp,
            data: Some(data),
            error: None,
        }
    }

    /// Build an `error` frame
    pub fn error(message: &str) -> Self {
        Self {
            kind: FrameType::Error,
            session_id: None,
            device_id: None,
            timestamp: Utc::now().timestamp_millis(),
            data: None,
            error: Some(message.to_string()),
        }
    }

    /// Serialize to the UTF-8 JSON text sent over the socket
    pub fn encode(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a raw text payload
    ///
    /// An absent or unrecognised `type` decodes to [`FrameType::Unknown`]
    /// rather than failing; malformed JSON or a missing `timestamp` fails.
    pub fn decode(raw: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Session id for control frames, used in log lines
    pub fn session(&self) -> &str {
        self.session_id.as_deref().unwrap_or("-")
    }
}

/// Any JSON number as whole milliseconds
fn millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let number = serde_json::Number::deserialize(deserializer)?;
    if let Some(ms) = number.as_i64() {
        return Ok(ms);
    }
    match number.as_f64() {
        Some(ms) if ms.is_finite() => Ok(ms.trunc() as i64),
        _ => Err(D::Error::custom(format!("timestamp out of range: {}", number))),
    }
}

/// Errors produced while encoding or decoding frames
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_data_frame() {
        let raw = r#"{"type":"data","sessionId":"s-1","deviceId":"plc-7","timestamp":1704067200000,"data":{"temp":21.5,"ok":true}}"#;
        let frame = Frame::decode(raw).unwrap();

        assert_eq!(frame.kind, FrameType::Data);
        assert_eq!(frame.session_id.as_deref(), Some("s-1"));
        assert_eq!(frame.device_id.as_deref(), Some("plc-7"));
        assert_eq!(frame.timestamp, 1704067200000);
        let data = frame.data.unwrap();
        assert_eq!(data["temp"], json!(21.5));
        assert_eq!(data["ok"], json!(true));
    }

    #[test]
    fn test_fractional_timestamp_is_truncated() {
        let frame = Frame::decode(r#"{"type":"data","timestamp":1704067200000.75}"#).unwrap();
        assert_eq!(frame.timestamp, 1704067200000);

        let frame = Frame::decode(r#"{"type":"data","timestamp":1.7040672e12}"#).unwrap();
        assert_eq!(frame.timestamp, 1704067200000);
    }

    #[test]
    fn test_decode_null_data() {
        // The backend serialises an empty measurement map as null
        let raw = r#"{"type":"data","sessionId":"s-1","timestamp":1,"data":null}"#;
        let frame = Frame::decode(raw).unwrap();
        assert!(frame.data.is_none());
    }

    #[test]
    fn test_unknown_and_missing_type() {
        let frame = Frame::decode(r#"{"type":"heartbeat","timestamp":1}"#).unwrap();
        assert_eq!(frame.kind, FrameType::Unknown);

        let frame = Frame::decode(r#"{"timestamp":1}"#).unwrap();
        assert_eq!(frame.kind, FrameType::Unknown);
    }

    #[test]
    fn test_decode_failures() {
        assert!(matches!(
            Frame::decode("{not json"),
            Err(FrameError::Malformed(_))
        ));
        // timestamp is required
        assert!(Frame::decode(r#"{"type":"data","sessionId":"s-1"}"#).is_err());
        // wrong field type
        assert!(Frame::decode(r#"{"type":"data","timestamp":"yesterday"}"#).is_err());
    }

    #[test]
    fn test_subscribe_encoding() {
        let frame = Frame::subscribe("session-1");
        let value: Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();

        assert_eq!(value["type"], "subscribe");
        assert_eq!(value["sessionId"], "session-1");
        assert!(value["timestamp"].is_i64());
        assert!(value.get("deviceId").is_none());
        assert!(value.get("data").is_none());
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_unsubscribe_encoding() {
        let json = Frame::unsubscribe("session-1").encode().unwrap();
        assert!(json.contains("\"type\":\"unsubscribe\""));
        assert!(json.contains("\"sessionId\":\"session-1\""));
    }

    #[test]
    fn test_error_frame() {
        let frame = Frame::decode(r#"{"type":"error","timestamp":5,"error":"device offline"}"#)
            .unwrap();
        assert_eq!(frame.kind, FrameType::Error);
        assert_eq!(frame.error.as_deref(), Some("device offline"));
        assert_eq!(Frame::error("boom").error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_frame_type_display() {
        assert_eq!(FrameType::Status.to_string(), "status");
        assert_eq!(FrameType::Unknown.to_string(), "unknown");
    }
}
