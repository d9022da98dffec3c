//! Inbound frame classification.
//!
//! A frame is routed on its `type` and `roomId` fields alone. Signal frames
//! keep the whole parsed value so caller-defined fields (SDP offers, ICE
//! candidates) are re-serialized exactly as they arrived.

use serde_json::Value;

use crate::error::ProtocolError;

/// What the relay should do with an inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// `{"type":"join", ...}`. A missing `roomId` is preserved as `None`;
    /// the relay rejects such joins rather than keying a room on nothing.
    Join { room_id: Option<String> },

    /// Any non-join frame addressed to a room: relayed verbatim to the
    /// other members.
    Signal { room_id: String, payload: Value },

    /// Neither a join nor addressed to a room; dropped.
    Untargeted,
}

/// Classify a raw text frame.
///
/// Structural requirements only: the frame must be a JSON object, and
/// `type` / `roomId`, when present, must be strings. A `roomId` of `null`
/// counts as absent.
pub fn classify(raw: &str) -> Result<ClientFrame, ProtocolError> {
    let value: Value = serde_json::from_str(raw)?;
    let obj = value.as_object().ok_or(ProtocolError::NotAnObject)?;

    let frame_type = match obj.get("type") {
        Some(Value::String(s)) => Some(s.as_str()),
        Some(Value::Null) | None => None,
        Some(_) => return Err(ProtocolError::NonStringField("type")),
    };
    let room_id = match obj.get("roomId") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(_) => return Err(ProtocolError::NonStringField("roomId")),
    };

    if frame_type == Some("join") {
        return Ok(ClientFrame::Join { room_id });
    }
    match room_id {
        Some(room_id) => Ok(ClientFrame::Signal {
            room_id,
            payload: value,
        }),
        None => Ok(ClientFrame::Untargeted),
    }
}
