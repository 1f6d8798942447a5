use serde::{Deserialize, Serialize};

use crate::command::{ExtensionCommand, ExtensionResponse};

/// Registration frame sent by the extension on connect.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegisterInfo {
    #[serde(rename = "windowId")]
    pub window_id: i64,
    #[serde(default, rename = "cachedSessionId", skip_serializing_if = "Option::is_none")]
    pub cached_session_id: Option<String>,
}

/// Sent in reply to a successful registration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionAssigned {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// The full set of frames exchanged over the extension WebSocket.
///
/// Tagged on `type` with `snake_case` spellings, the same framing convention used elsewhere in
/// this workspace for daemon-facing wire enums.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtensionFrame {
    Register(RegisterInfo),
    SessionAssigned(SessionAssigned),
    Response(ExtensionResponse),
    Command(ExtensionCommand),
    Ping,
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_frame_round_trips() {
        let raw = r#"{"type":"register","windowId":7,"cachedSessionId":"abc"}"#;
        let frame: ExtensionFrame = serde_json::from_str(raw).unwrap();
        match frame {
            ExtensionFrame::Register(info) => {
                assert_eq!(info.window_id, 7);
                assert_eq!(info.cached_session_id.as_deref(), Some("abc"));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn ping_frame_has_no_payload() {
        let raw = r#"{"type":"ping"}"#;
        let frame: ExtensionFrame = serde_json::from_str(raw).unwrap();
        assert!(matches!(frame, ExtensionFrame::Ping));
        assert_eq!(serde_json::to_string(&ExtensionFrame::Pong).unwrap(), r#"{"type":"pong"}"#);
    }
}
