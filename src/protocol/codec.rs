//! Parsing and classification of raw JSON-RPC lines (spec.md §4.1).

use serde_json::Value;

use super::envelope::{
    IncomingMessage, JsonRpcError, JsonRpcErrorData, JsonRpcNotification, JsonRpcRequest,
    RequestId, ResponseOutcome,
};
use super::{ErrorCode, JSONRPC_VERSION};

/// Classification outcome before an envelope is fully parsed into its
/// concrete shape. Kept separate from [`IncomingMessage`] so malformed
/// envelopes can be rejected before committing to a variant.
enum Shape {
    Request,
    Notification,
    Response,
}

fn classify_value(value: &Value) -> Option<Shape> {
    let obj = value.as_object()?;
    let has_method = obj.contains_key("method");
    let has_id = obj.contains_key("id");
    let has_result_or_error = obj.contains_key("result") || obj.contains_key("error");

    if has_method && has_id {
        Some(Shape::Request)
    } else if has_method {
        Some(Shape::Notification)
    } else if has_id && has_result_or_error {
        Some(Shape::Response)
    } else {
        None
    }
}

/// Classifies a decoded JSON value without consuming it. Exposed for
/// transports that need to peek at a message's kind before routing.
#[must_use]
pub fn classify(value: &Value) -> &'static str {
    match classify_value(value) {
        Some(Shape::Request) => "request",
        Some(Shape::Notification) => "notification",
        Some(Shape::Response) => "response",
        None => "unknown",
    }
}

/// Parses one line of input into a classified [`IncomingMessage`].
///
/// # Errors
///
/// Returns [`JsonRpcError`] with `PARSE_ERROR` on malformed JSON, or
/// `INVALID_REQUEST` when `jsonrpc` is present and not exactly `"2.0"`,
/// or when the object matches none of the request/notification/response
/// shapes.
pub fn parse_message(line: &str) -> Result<IncomingMessage, JsonRpcError> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| JsonRpcError::parse_error(format!("invalid JSON: {e}")))?;

    if let Some(version) = value.get("jsonrpc") {
        if version.as_str() != Some(JSONRPC_VERSION) {
            let id = extract_id(&value);
            return Err(JsonRpcError::invalid_request(
                id,
                format!("unsupported jsonrpc version: {version}"),
            ));
        }
    }

    match classify_value(&value) {
        Some(Shape::Request) => {
            let req: JsonRpcRequest = serde_json::from_value(value).map_err(|e| {
                JsonRpcError::parse_error(format!("malformed request: {e}"))
            })?;
            Ok(IncomingMessage::Request(req))
        }
        Some(Shape::Notification) => {
            let notif: JsonRpcNotification = serde_json::from_value(value).map_err(|e| {
                JsonRpcError::parse_error(format!("malformed notification: {e}"))
            })?;
            Ok(IncomingMessage::Notification(notif))
        }
        Some(Shape::Response) => {
            let id = extract_id(&value).ok_or_else(|| {
                JsonRpcError::parse_error("response missing id".to_string())
            })?;
            let outcome = if let Some(result) = value.get("result") {
                ResponseOutcome::Success {
                    result: result.clone(),
                }
            } else {
                let error: JsonRpcErrorData = serde_json::from_value(value["error"].clone())
                    .map_err(|e| JsonRpcError::parse_error(format!("malformed error: {e}")))?;
                ResponseOutcome::Failure { error }
            };
            Ok(IncomingMessage::Response { id, outcome })
        }
        None => {
            let id = extract_id(&value);
            Err(JsonRpcError::new(
                id,
                JsonRpcErrorData::new(
                    ErrorCode::InvalidRequest,
                    "message matches neither request, notification nor response shape",
                ),
            ))
        }
    }
}

fn extract_id(value: &Value) -> Option<RequestId> {
    let id = value.get("id")?;
    if let Some(n) = id.as_i64() {
        Some(RequestId::Number(n))
    } else {
        id.as_str().map(|s| RequestId::String(s.to_string()))
    }
}
