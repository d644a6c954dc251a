//! Per-connection session state (spec.md §4.2).
//!
//! A [`Session`] tracks one client connection from `initialize` through
//! shutdown: its negotiated protocol version and capabilities, its write
//! half of the transport, and the wall-clock time of its last activity,
//! which the [`manager::SessionManager`]'s idle sweeper consults.

pub mod manager;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::SessionError;
use crate::protocol::MCP_PROTOCOL_VERSION;
use crate::transport::LineWriter;

/// Where a session sits in the MCP handshake (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for `initialize`.
    AwaitingInit,
    /// `initialize` answered, waiting for the `initialized` notification.
    Initialising,
    /// Ready for normal operation.
    Running,
    /// Shutdown in progress; no further requests are accepted.
    ShuttingDown,
}

/// Client-reported identity, echoed from `initialize` params.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Server identity reported in the `initialize` result.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: crate::protocol::SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Capabilities this server advertises during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceCapabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolCapabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptCapabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<Value>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            resources: Some(ResourceCapabilities {
                subscribe: true,
                list_changed: true,
            }),
            tools: Some(ToolCapabilities::default()),
            prompts: Some(PromptCapabilities::default()),
            logging: Some(Value::Object(serde_json::Map::new())),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceCapabilities {
    #[serde(rename = "subscribe", skip_serializing_if = "std::ops::Not::not")]
    pub subscribe: bool,
    #[serde(rename = "listChanged", skip_serializing_if = "std::ops::Not::not")]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCapabilities {
    #[serde(rename = "listChanged", skip_serializing_if = "std::ops::Not::not")]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptCapabilities {
    #[serde(rename = "listChanged", skip_serializing_if = "std::ops::Not::not")]
    pub list_changed: bool,
}

/// Parameters accepted on `initialize`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
    #[serde(default)]
    pub auth: Option<crate::security::AuthParams>,
}

/// State belonging to one client connection.
pub struct Session<W> {
    id: Uuid,
    state: Mutex<SessionState>,
    writer: Arc<Mutex<LineWriter<W>>>,
    client_info: Mutex<Option<ClientInfo>>,
    negotiated_version: Mutex<Option<String>>,
    principal: Mutex<Option<String>>,
    last_activity_unix_ms: AtomicI64,
    created_at_unix_ms: i64,
}

impl<W> Session<W>
where
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    #[must_use]
    pub fn new(writer: LineWriter<W>, now_unix_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: Mutex::new(SessionState::AwaitingInit),
            writer: Arc::new(Mutex::new(writer)),
            client_info: Mutex::new(None),
            negotiated_version: Mutex::new(None),
            principal: Mutex::new(None),
            last_activity_unix_ms: AtomicI64::new(now_unix_ms),
            created_at_unix_ms: now_unix_ms,
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn created_at_unix_ms(&self) -> i64 {
        self.created_at_unix_ms
    }

    #[must_use]
    pub fn last_activity_unix_ms(&self) -> i64 {
        self.last_activity_unix_ms.load(Ordering::Acquire)
    }

    pub fn touch(&self, now_unix_ms: i64) {
        self.last_activity_unix_ms.store(now_unix_ms, Ordering::Release);
    }

    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    #[must_use]
    pub fn writer(&self) -> Arc<Mutex<LineWriter<W>>> {
        Arc::clone(&self.writer)
    }

    pub async fn principal(&self) -> Option<String> {
        self.principal.lock().await.clone()
    }

    pub async fn set_principal(&self, principal: String) {
        *self.principal.lock().await = Some(principal);
    }

    /// Transitions `AwaitingInit -> Initialising`, recording the client's
    /// reported identity and the protocol version we will honour.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AlreadyInitialised`] if `initialize` was
    /// already handled for this session, or
    /// [`SessionError::UnsupportedProtocolVersion`] if the client did not
    /// request the version this server implements.
    pub async fn begin_initialize(
        &self,
        params: &InitializeParams,
    ) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        if *state != SessionState::AwaitingInit {
            return Err(SessionError::AlreadyInitialised);
        }
        if params.protocol_version != MCP_PROTOCOL_VERSION {
            return Err(SessionError::UnsupportedProtocolVersion {
                version: params.protocol_version.clone(),
            });
        }
        *self.client_info.lock().await = params.client_info.clone();
        *self.negotiated_version.lock().await = Some(params.protocol_version.clone());
        *state = SessionState::Initialising;
        Ok(())
    }

    /// Transitions `Initialising -> Running` on the `initialized`
    /// notification. Any other transition is ignored, matching JSON-RPC's
    /// rule that unrecognised or out-of-order notifications elicit no
    /// response.
    pub async fn complete_initialize(&self) {
        let mut state = self.state.lock().await;
        if *state == SessionState::Initialising {
            *state = SessionState::Running;
        }
    }

    /// Returns an error unless the session has completed the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotInitialised`] if the session is not yet
    /// `Running`.
    pub async fn require_running(&self) -> Result<(), SessionError> {
        if *self.state.lock().await == SessionState::Running {
            Ok(())
        } else {
            Err(SessionError::NotInitialised)
        }
    }

    pub async fn begin_shutdown(&self) {
        *self.state.lock().await = SessionState::ShuttingDown;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_session() -> Session<tokio::io::DuplexStream> {
        let (_client, server) = tokio::io::duplex(64);
        let (_reader, writer) = crate::transport::split(server);
        Session::new(writer, 0)
    }

    #[tokio::test]
    async fn starts_awaiting_init() {
        let session = make_session();
        assert_eq!(session.state().await, SessionState::AwaitingInit);
    }

    #[tokio::test]
    async fn full_handshake_reaches_running() {
        let session = make_session();
        let params = InitializeParams {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: Value::Null,
            client_info: None,
            auth: None,
        };
        session.begin_initialize(&params).await.unwrap();
        assert_eq!(session.state().await, SessionState::Initialising);
        session.complete_initialize().await;
        assert_eq!(session.state().await, SessionState::Running);
        assert!(session.require_running().await.is_ok());
    }

    #[tokio::test]
    async fn double_initialize_rejected() {
        let session = make_session();
        let params = InitializeParams {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: Value::Null,
            client_info: None,
            auth: None,
        };
        session.begin_initialize(&params).await.unwrap();
        let err = session.begin_initialize(&params).await.unwrap_err();
        assert!(matches!(err, SessionError::AlreadyInitialised));
    }

    #[tokio::test]
    async fn wrong_protocol_version_rejected() {
        let session = make_session();
        let params = InitializeParams {
            protocol_version: "1999-01-01".to_string(),
            capabilities: Value::Null,
            client_info: None,
            auth: None,
        };
        let err = session.begin_initialize(&params).await.unwrap_err();
        assert!(matches!(err, SessionError::UnsupportedProtocolVersion { .. }));
    }

    #[tokio::test]
    async fn requests_before_running_are_rejected() {
        let session = make_session();
        assert!(session.require_running().await.is_err());
    }
}
