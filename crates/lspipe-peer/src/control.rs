use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC protocol version carried by every control message.
pub const JSONRPC_VERSION: &str = "2.0";
/// Method name of the graceful shutdown request.
pub const METHOD_SHUTDOWN: &str = "shutdown";
/// Method name of the exit notification sent after shutdown.
pub const METHOD_EXIT: &str = "exit";

/// JSON-RPC control message exchanged during shutdown.
///
/// Requests carry an `id`; notifications do not.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlMessage {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl ControlMessage {
    /// Create a shutdown request with the given request id.
    pub fn shutdown_request(id: u64) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: METHOD_SHUTDOWN.to_string(),
            params: None,
        }
    }

    /// Create the exit notification.
    pub fn exit_notification() -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: METHOD_EXIT.to_string(),
            params: None,
        }
    }

    /// Serialize to a frame payload.
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// True if `payload` is a JSON-RPC response (result or error) to request `id`.
///
/// A `"result": null` counts as a response.
pub fn is_response_to(payload: &[u8], id: u64) -> bool {
    let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(payload) else {
        return false;
    };
    let same_id = map.get("id").and_then(Value::as_u64) == Some(id);
    same_id && !map.contains_key("method") && (map.contains_key("result") || map.contains_key("error"))
}
