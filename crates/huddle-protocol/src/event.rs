//! Events the relay sends back to clients.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// A second party has joined the room; the receiver may start the call.
    #[serde(rename = "ready_to_call")]
    ReadyToCall,

    /// A room member disconnected and at least one member remains.
    #[serde(rename = "user_left")]
    UserLeft,

    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    /// Serialize to the wire form. Infallible for these shapes.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn ready_to_call_wire_shape() {
        let frame: Value = serde_json::from_str(&ServerEvent::ReadyToCall.to_json()).unwrap();
        assert_eq!(frame, json!({"type": "ready_to_call"}));
    }

    #[test]
    fn user_left_wire_shape() {
        let frame: Value = serde_json::from_str(&ServerEvent::UserLeft.to_json()).unwrap();
        assert_eq!(frame, json!({"type": "user_left"}));
    }

    #[test]
    fn error_wire_shape() {
        let event = ServerEvent::Error {
            message: "join requires a roomId".into(),
        };
        let frame: Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(
            frame,
            json!({"type": "error", "message": "join requires a roomId"})
        );
    }
}
