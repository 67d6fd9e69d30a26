//! JSON-RPC 2.0 message types and standard error codes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::JSONRPC_VERSION;

/// JSON-RPC 2.0 Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Absent for notifications
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 Error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Server-to-client message with no response expected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Option<Value>, id: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Validate the request envelope
    pub fn validate(&self) -> Result<(), JsonRpcError> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err(JsonRpcError::invalid_request("Invalid JSON-RPC version"));
        }

        if self.method.is_empty() {
            return Err(JsonRpcError::invalid_request("Method name cannot be empty"));
        }

        if self.method.starts_with("rpc.") {
            return Err(JsonRpcError::invalid_request(
                "Method names starting with 'rpc.' are reserved",
            ));
        }

        Ok(())
    }
}

impl JsonRpcResponse {
    pub fn success(result: Value, id: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(error: JsonRpcError, id: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }

    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::error(
            JsonRpcError::custom(
                error_codes::PARSE_ERROR,
                "Parse error".to_string(),
                Some(Value::String(detail.into())),
            ),
            None,
        )
    }

    pub fn method_not_found(method: &str, id: Option<Value>) -> Self {
        Self::error(
            JsonRpcError::custom(
                error_codes::METHOD_NOT_FOUND,
                "Method not found".to_string(),
                Some(serde_json::json!({ "method": method })),
            ),
            id,
        )
    }
}

impl JsonRpcError {
    pub fn custom(code: i32, message: String, data: Option<Value>) -> Self {
        Self { code, message, data }
    }

    pub fn invalid_request(message: &str) -> Self {
        Self::custom(error_codes::INVALID_REQUEST, message.to_string(), None)
    }

    pub fn internal(message: impl std::fmt::Display) -> Self {
        Self::custom(
            error_codes::INTERNAL_ERROR,
            format!("Internal error: {}", message),
            None,
        )
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

impl From<crate::IncidentError> for JsonRpcError {
    fn from(error: crate::IncidentError) -> Self {
        let data = match error.error_data() {
            Value::Null => None,
            data => Some(data),
        };
        JsonRpcError {
            code: error.error_code(),
            message: error.user_message(),
            data,
        }
    }
}
