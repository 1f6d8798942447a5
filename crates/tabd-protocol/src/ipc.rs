use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The envelope `type` tag for the client socket protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpcMessageType {
    Command,
    Response,
    Ping,
    Pong,
    GetEndpoint,
    Endpoint,
    RegisterExtension,
    Registration,
    Error,
}

/// One line of the client socket's newline-delimited JSON stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcMessage {
    #[serde(rename = "type")]
    pub message_type: IpcMessageType,
    #[serde(default)]
    pub payload: Option<Value>,
}

impl IpcMessage {
    pub fn new(message_type: IpcMessageType, payload: Option<Value>) -> Self {
        Self { message_type, payload }
    }

    pub fn ping() -> Self {
        Self::new(IpcMessageType::Ping, None)
    }

    pub fn pong() -> Self {
        Self::new(IpcMessageType::Pong, None)
    }
}

/// Payload of an `endpoint` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub ip: String,
    pub port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_envelope_round_trips() {
        let line = serde_json::to_string(&IpcMessage::ping()).unwrap();
        let parsed: IpcMessage = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed.message_type, IpcMessageType::Ping);
        assert!(parsed.payload.is_none());
    }

    #[test]
    fn endpoint_payload_shape() {
        let msg = IpcMessage::new(
            IpcMessageType::Endpoint,
            Some(serde_json::to_value(EndpointInfo { ip: "127.0.0.1".to_string(), port: 9222 }).unwrap()),
        );
        let line = serde_json::to_string(&msg).unwrap();
        assert!(line.contains("\"port\":9222"));
    }
}
