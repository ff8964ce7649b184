//! JSON serialization for realtime frames.

use super::frames::{ClientFrame, ServerFrame};

/// Serialize an outbound frame
pub fn serialize_client(frame: &ClientFrame) -> Result<String, serde_json::Error> {
    serde_json::to_string(frame)
}

/// Deserialize an inbound frame
pub fn deserialize_server(text: &str) -> Result<ServerFrame, serde_json::Error> {
    serde_json::from_str(text)
}
