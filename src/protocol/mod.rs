//! JSON-RPC 2.0 envelope, method constants and error taxonomy.
//!
//! This module implements the wire-level message shapes shared by every
//! MCP method. It does not know about sessions, transports or handlers —
//! it only parses, classifies and serialises.
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

mod codec;
mod envelope;

pub use codec::{classify, parse_message};
pub use envelope::{
    ErrorCode, IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, RequestId, ResponseOutcome,
};

/// Protocol version this server implements and requires of clients.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Name reported in `serverInfo` during initialisation.
pub const SERVER_NAME: &str = "mcp-server";

/// The literal JSON-RPC version tag every envelope must carry.
pub const JSONRPC_VERSION: &str = "2.0";

/// Exact method-name strings recognised by the router (spec.md §6).
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "initialized";
    pub const NOTIFICATIONS_INITIALIZED: &str = "notifications/initialized";
    pub const PING: &str = "ping";
    pub const RESOURCES_LIST: &str = "resources/list";
    pub const RESOURCES_READ: &str = "resources/read";
    pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
    pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const PROMPTS_LIST: &str = "prompts/list";
    pub const PROMPTS_GET: &str = "prompts/get";
    pub const SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";
    pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";
    pub const AI_COMPLETE: &str = "ai/complete";
    pub const AI_CHAIN: &str = "ai/chain";
    pub const AI_GRAPH: &str = "ai/graph";
    pub const NOTIFICATIONS_PROGRESS: &str = "notifications/progress";
    pub const NOTIFICATIONS_MESSAGE: &str = "notifications/message";
    pub const NOTIFICATIONS_CANCELLED: &str = "notifications/cancelled";
    pub const NOTIFICATIONS_RESOURCES_UPDATED: &str = "notifications/resources/updated";
}
