//! Method-name to handler dispatch (spec.md §4.3).
//!
//! The router itself knows nothing about sessions, resources or tools —
//! it only maps a method string to a [`Handler`] and turns whatever that
//! handler returns into either a JSON-RPC result or an error object.
//! Wiring a concrete set of handlers against real subsystems happens in
//! [`crate::server`].

pub mod handlers;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::ai::AiBackend;
use crate::config::Config;
use crate::error::ServerError;
use crate::protocol::{methods, ErrorCode, JsonRpcErrorData};
use crate::resources::{ResourceCache, ResourceMetrics, ResourceRegistry};
use crate::security::SecurityManager;
use crate::session::Session;
use crate::tools::ToolRegistry;

/// Permission string a method requires, or `None` if it is open to any
/// session regardless of authentication state (spec.md §4.12). `initialize`
/// and `ping` are always open; everything else requires the matching
/// `resources:*`/`tools:*`/`ai:*` permission.
#[must_use]
pub fn permission_for_method(method: &str) -> Option<&'static str> {
    match method {
        methods::INITIALIZE
        | methods::INITIALIZED
        | methods::NOTIFICATIONS_INITIALIZED
        | methods::PING => None,
        methods::RESOURCES_LIST
        | methods::RESOURCES_READ
        | methods::RESOURCES_SUBSCRIBE
        | methods::RESOURCES_UNSUBSCRIBE => Some("resources:read"),
        methods::TOOLS_LIST | methods::TOOLS_CALL => Some("tools:call"),
        methods::AI_COMPLETE | methods::AI_CHAIN | methods::AI_GRAPH => Some("ai:complete"),
        methods::PROMPTS_LIST | methods::PROMPTS_GET => Some("prompts:read"),
        methods::SAMPLING_CREATE_MESSAGE => Some("sampling:create"),
        methods::LOGGING_SET_LEVEL => Some("logging:set_level"),
        _ => None,
    }
}

/// Failures raised when building the route table.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("method name must not be empty")]
    EmptyMethodName,

    #[error("method already registered: {method}")]
    DuplicateMethod { method: String },
}

/// Everything a handler needs to answer one request: the session that
/// sent it, and shared access to every subsystem.
pub struct HandlerContext<W> {
    pub session: Arc<Session<W>>,
    pub resources: Arc<ResourceRegistry>,
    pub cache: Arc<ResourceCache>,
    pub resource_metrics: Arc<ResourceMetrics>,
    pub tools: Arc<ToolRegistry>,
    pub security: Arc<SecurityManager>,
    pub ai: Arc<dyn AiBackend>,
    pub config: Arc<Config>,
}

/// One method's implementation.
#[async_trait]
pub trait Handler<W>: Send + Sync {
    /// Handles a single request's `params`, returning the `result` value
    /// to place on the wire.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] on any failure; the router converts it to
    /// a JSON-RPC error object.
    async fn handle(&self, ctx: &HandlerContext<W>, params: Option<Value>) -> Result<Value, ServerError>;
}

/// Maps method names to their handler.
pub struct MessageRouter<W> {
    handlers: HashMap<String, Arc<dyn Handler<W>>>,
}

impl<W> Default for MessageRouter<W> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<W> MessageRouter<W>
where
    W: Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `method`.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::EmptyMethodName`] if `method` is empty, or
    /// [`RouterError::DuplicateMethod`] if a handler is already
    /// registered for it.
    pub fn register(
        &mut self,
        method: impl Into<String>,
        handler: Arc<dyn Handler<W>>,
    ) -> Result<(), RouterError> {
        let method = method.into();
        if method.is_empty() {
            return Err(RouterError::EmptyMethodName);
        }
        if self.handlers.contains_key(&method) {
            return Err(RouterError::DuplicateMethod { method });
        }
        self.handlers.insert(method, handler);
        Ok(())
    }
}

impl<W> MessageRouter<W>
where
    W: tokio::io::AsyncWrite + Unpin + Send + Sync + 'static,
{
    /// Checks `ctx.config.security.require_auth` against the session's
    /// authenticated principal (set on `initialize`, spec.md §4.12).
    /// `initialize`/`ping` are always open so a client can authenticate in
    /// the first place.
    async fn authorize(&self, ctx: &HandlerContext<W>, method: &str) -> Result<(), JsonRpcErrorData> {
        if !ctx.config.security.require_auth {
            return Ok(());
        }
        let Some(permission) = permission_for_method(method) else {
            return Ok(());
        };
        let Some(principal) = ctx.session.principal().await else {
            return Err(ServerError::Security(crate::security::SecurityError::InvalidCredentials).to_error_data());
        };
        ctx.security
            .require_permission(&principal, permission)
            .map_err(|e| ServerError::Security(e).to_error_data())
    }

    /// Dispatches a request method, converting handler failures into a
    /// JSON-RPC error object. Used for requests, which always need a
    /// response.
    pub async fn dispatch_request(
        &self,
        ctx: &HandlerContext<W>,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, JsonRpcErrorData> {
        let Some(handler) = self.handlers.get(method) else {
            return Err(JsonRpcErrorData::new(
                ErrorCode::MethodNotFound,
                format!("method not found: {method}"),
            ));
        };
        self.authorize(ctx, method).await?;
        handler
            .handle(ctx, params)
            .await
            .map_err(|e| e.to_error_data())
    }

    /// Dispatches a notification method best-effort: unknown methods,
    /// authorization failures and handler errors are all logged and
    /// otherwise swallowed, since a notification has no response channel
    /// (spec.md §4.3).
    pub async fn dispatch_notification(&self, ctx: &HandlerContext<W>, method: &str, params: Option<Value>) {
        let Some(handler) = self.handlers.get(method) else {
            return;
        };
        if let Err(err) = self.authorize(ctx, method).await {
            warn!(method, error = %err.message, "notification rejected by authorization");
            return;
        }
        if let Err(err) = handler.handle(ctx, params).await {
            warn!(method, error = %err, "notification handler failed");
        }
    }
}
