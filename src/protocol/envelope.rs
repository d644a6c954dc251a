//! Message envelope types for the JSON-RPC 2.0 dialect used by MCP.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::JSONRPC_VERSION;

/// A client-generated, opaque request identifier.
///
/// Identifiers are echoed back verbatim on the matching response; the
/// server never interprets their contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// A numeric identifier.
    Number(i64),
    /// A string identifier.
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// Reserved and application-defined JSON-RPC error codes (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    Unauthorized,
    Forbidden,
    NotFound,
    Timeout,
    RateLimited,
}

impl ErrorCode {
    /// Returns the numeric JSON-RPC error code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::Unauthorized => -32000,
            Self::Forbidden => -32001,
            Self::NotFound => -32002,
            Self::Timeout => -32003,
            Self::RateLimited => -32004,
        }
    }
}

/// A JSON-RPC 2.0 request: carries a method, optional params and an id.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub id: RequestId,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// A JSON-RPC 2.0 notification: a method with no id, eliciting no response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonRpcNotification {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// Either `result` or `error`, never both — mirrors the wire shape exactly.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResponseOutcome {
    Success { result: Value },
    Failure { error: JsonRpcErrorData },
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    #[serde(flatten)]
    pub outcome: ResponseOutcome,
}

impl JsonRpcResponse {
    /// Builds a successful response.
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            outcome: ResponseOutcome::Success { result },
        }
    }
}

/// The `{code, message, data?}` error object (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorData {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(code: ErrorCode, message: impl Into<String>, data: Value) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: Some(data),
        }
    }
}

/// A full JSON-RPC error response, or a transport-level parse failure that
/// never had an id to begin with.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub jsonrpc: &'static str,
    /// `None` only for errors discovered before an id could be read
    /// (e.g. malformed JSON).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    #[must_use]
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            error,
        }
    }

    #[must_use]
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(None, JsonRpcErrorData::new(ErrorCode::ParseError, message))
    }

    #[must_use]
    pub fn invalid_request(id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self::new(id, JsonRpcErrorData::new(ErrorCode::InvalidRequest, message))
    }

    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::new(
                ErrorCode::MethodNotFound,
                format!("method not found: {method}"),
            ),
        )
    }

    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(Some(id), JsonRpcErrorData::new(ErrorCode::InvalidParams, message))
    }

    #[must_use]
    pub fn internal_error(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(Some(id), JsonRpcErrorData::new(ErrorCode::InternalError, message))
    }
}

/// A parsed incoming line, classified per spec.md §4.1.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    /// A response addressed to a request the server itself issued.
    /// No handler set currently issues server-to-client requests (see
    /// DESIGN.md, open question on `SendRequest`), so this variant is
    /// parsed but otherwise unused.
    Response {
        id: RequestId,
        outcome: ResponseOutcome,
    },
}
