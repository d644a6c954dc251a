//! Default method handlers (spec.md §4.3, §6).

use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Handler, HandlerContext};
use crate::error::ServerError;
use crate::security::SecurityError;
use crate::session::{InitializeParams, ServerCapabilities, ServerInfo};

/// `initialize` — capability negotiation (spec.md §4.2). When
/// `security.require_auth` is set, `params.auth` is resolved against the
/// security manager and the winning principal recorded on the session so
/// later requests can be permission-checked (spec.md §4.12).
pub struct InitializeHandler;

#[async_trait]
impl<W: Send + Sync + 'static> Handler<W> for InitializeHandler {
    async fn handle(&self, ctx: &HandlerContext<W>, params: Option<Value>) -> Result<Value, ServerError> {
        let params: InitializeParams = params
            .ok_or_else(|| ServerError::Internal("missing initialize params".to_string()))
            .and_then(|p| {
                serde_json::from_value(p)
                    .map_err(|e| ServerError::Internal(format!("invalid initialize params: {e}")))
            })?;

        ctx.session.begin_initialize(&params).await?;

        if ctx.config.security.require_auth {
            let auth = params.auth.as_ref().ok_or(SecurityError::InvalidCredentials)?;
            let principal = crate::security::authenticate(&ctx.security, auth).await?;
            ctx.session.set_principal(principal).await;
        }

        Ok(json!({
            "protocolVersion": crate::protocol::MCP_PROTOCOL_VERSION,
            "capabilities": ServerCapabilities::default(),
            "serverInfo": ServerInfo::default(),
        }))
    }
}

/// `notifications/initialized` — completes the handshake.
pub struct InitializedHandler;

#[async_trait]
impl<W: Send + Sync + 'static> Handler<W> for InitializedHandler {
    async fn handle(&self, ctx: &HandlerContext<W>, _params: Option<Value>) -> Result<Value, ServerError> {
        ctx.session.complete_initialize().await;
        Ok(Value::Null)
    }
}

/// `ping` — allowed in any session state.
pub struct PingHandler;

#[async_trait]
impl<W: Send + Sync + 'static> Handler<W> for PingHandler {
    async fn handle(&self, _ctx: &HandlerContext<W>, _params: Option<Value>) -> Result<Value, ServerError> {
        Ok(json!({}))
    }
}

#[derive(serde::Deserialize)]
struct ListParams {
    #[serde(default)]
    cursor: Option<String>,
}

/// `resources/list`.
pub struct ResourcesListHandler;

#[async_trait]
impl<W: Send + Sync + 'static> Handler<W> for ResourcesListHandler {
    async fn handle(&self, ctx: &HandlerContext<W>, params: Option<Value>) -> Result<Value, ServerError> {
        ctx.session.require_running().await?;
        let cursor: Option<String> = params
            .map(|p| serde_json::from_value::<ListParams>(p).map(|p| p.cursor))
            .transpose()
            .map_err(|e: serde_json::Error| ServerError::Internal(e.to_string()))?
            .flatten();
        let page = ctx
            .resources
            .paginate(cursor.as_deref(), ctx.config.resources.default_page_size)
            .await;
        Ok(json!({
            "resources": page.items,
            "nextCursor": page.next_cursor,
        }))
    }
}

#[derive(serde::Deserialize)]
struct UriParams {
    uri: String,
}

/// `resources/read`, consulting the cache before the registry. Returns the
/// spec's `ResourceContent[]` shape — each entry carries exactly one of
/// `text`/`blob` depending on whether the bytes are valid UTF-8 (spec.md
/// §4.6).
pub struct ResourcesReadHandler;

impl ResourcesReadHandler {
    fn error_type(err: &crate::resources::RegistryError) -> &'static str {
        match err {
            crate::resources::RegistryError::NotFound { .. } => "not_found",
            crate::resources::RegistryError::AlreadyExists { .. } => "already_exists",
            crate::resources::RegistryError::NotWatchable { .. } => "not_watchable",
            crate::resources::RegistryError::Validation(_) => "validation",
            crate::resources::RegistryError::Io(_) => "io",
        }
    }
}

#[async_trait]
impl<W: Send + Sync + 'static> Handler<W> for ResourcesReadHandler {
    async fn handle(&self, ctx: &HandlerContext<W>, params: Option<Value>) -> Result<Value, ServerError> {
        ctx.session.require_running().await?;
        let params: UriParams = params
            .ok_or_else(|| ServerError::Internal("missing uri".to_string()))
            .and_then(|p| serde_json::from_value(p).map_err(|e| ServerError::Internal(e.to_string())))?;

        let metrics_enabled = ctx.config.enable_metrics;
        let mime_type = ctx.resources.lookup(&params.uri).await.and_then(|r| r.mime_type);

        if let Some(bytes) = ctx.cache.get(&params.uri).await {
            if metrics_enabled {
                ctx.resource_metrics.record_cache_hit();
                ctx.resource_metrics
                    .record_read(&params.uri, bytes.len() as u64, std::time::Duration::ZERO);
            }
            let content = crate::resources::ResourceContent::from_bytes(params.uri, mime_type, &bytes);
            return Ok(json!({ "contents": [content] }));
        }
        if metrics_enabled {
            ctx.resource_metrics.record_cache_miss();
        }

        let started = Instant::now();
        let bytes = ctx.resources.read(&params.uri).await.map_err(|e| {
            if metrics_enabled {
                ctx.resource_metrics.record_read_error(&params.uri, Self::error_type(&e));
            }
            ServerError::Registry(e)
        })?;
        let elapsed = started.elapsed();
        let _ = ctx.cache.put(params.uri.clone(), bytes.clone()).await;
        if metrics_enabled {
            ctx.resource_metrics.record_read(&params.uri, bytes.len() as u64, elapsed);
        }

        let content = crate::resources::ResourceContent::from_bytes(params.uri, mime_type, &bytes);
        Ok(json!({ "contents": [content] }))
    }
}

/// `resources/subscribe`. Wires a callback into the registry that, on
/// every change, writes a `notifications/resources/updated` message back
/// down this session's transport (spec.md §4.7).
pub struct ResourcesSubscribeHandler;

#[async_trait]
impl<W> Handler<W> for ResourcesSubscribeHandler
where
    W: tokio::io::AsyncWrite + Unpin + Send + Sync + 'static,
{
    async fn handle(&self, ctx: &HandlerContext<W>, params: Option<Value>) -> Result<Value, ServerError> {
        ctx.session.require_running().await?;
        let params: UriParams = params
            .ok_or_else(|| ServerError::Internal("missing uri".to_string()))
            .and_then(|p| serde_json::from_value(p).map_err(|e| ServerError::Internal(e.to_string())))?;

        let writer = ctx.session.writer();
        let resources = std::sync::Arc::clone(&ctx.resources);
        let callback: crate::resources::SubscriptionCallback =
            std::sync::Arc::new(move |event: crate::resources::ResourceChangeEvent| {
                let writer = std::sync::Arc::clone(&writer);
                let resources = std::sync::Arc::clone(&resources);
                tokio::spawn(async move {
                    let params = match event.contents {
                        Ok(bytes) => {
                            let mime_type = resources.lookup(&event.uri).await.and_then(|r| r.mime_type);
                            let content = crate::resources::ResourceContent::from_bytes(event.uri, mime_type, &bytes);
                            json!({ "contents": [content] })
                        }
                        Err(message) => json!({ "uri": event.uri, "error": message }),
                    };
                    let notification = crate::protocol::JsonRpcNotification {
                        jsonrpc: Some(crate::protocol::JSONRPC_VERSION.to_string()),
                        method: crate::protocol::methods::NOTIFICATIONS_RESOURCES_UPDATED.to_string(),
                        params: Some(params),
                    };
                    let mut writer = writer.lock().await;
                    let _ = writer.write_line(&notification).await;
                });
            });
        ctx.resources.subscribe(&params.uri, callback).await?;
        Ok(json!({}))
    }
}

/// `resources/unsubscribe`.
pub struct ResourcesUnsubscribeHandler;

#[async_trait]
impl<W: Send + Sync + 'static> Handler<W> for ResourcesUnsubscribeHandler {
    async fn handle(&self, ctx: &HandlerContext<W>, params: Option<Value>) -> Result<Value, ServerError> {
        ctx.session.require_running().await?;
        let params: UriParams = params
            .ok_or_else(|| ServerError::Internal("missing uri".to_string()))
            .and_then(|p| serde_json::from_value(p).map_err(|e| ServerError::Internal(e.to_string())))?;
        ctx.resources.unsubscribe(&params.uri).await;
        Ok(json!({}))
    }
}

/// `tools/list`.
pub struct ToolsListHandler;

#[async_trait]
impl<W: Send + Sync + 'static> Handler<W> for ToolsListHandler {
    async fn handle(&self, ctx: &HandlerContext<W>, _params: Option<Value>) -> Result<Value, ServerError> {
        ctx.session.require_running().await?;
        Ok(json!({ "tools": ctx.tools.list().await }))
    }
}

#[derive(serde::Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// `tools/call`. Per MCP convention, tool-level failures are reported in
/// the result with `isError: true`, not as a JSON-RPC error — only a
/// missing/unregistered tool elicits a protocol error.
pub struct ToolsCallHandler;

#[async_trait]
impl<W: Send + Sync + 'static> Handler<W> for ToolsCallHandler {
    async fn handle(&self, ctx: &HandlerContext<W>, params: Option<Value>) -> Result<Value, ServerError> {
        ctx.session.require_running().await?;
        let params: ToolCallParams = params
            .ok_or_else(|| ServerError::Internal("missing tool call params".to_string()))
            .and_then(|p| serde_json::from_value(p).map_err(|e| ServerError::Internal(e.to_string())))?;

        match ctx.tools.call(&params.name, params.arguments).await {
            Ok(result) => Ok(json!({
                "content": [{ "type": "json", "json": result }],
                "isError": false,
            })),
            Err(crate::tools::ToolError::NotFound { name }) => {
                Err(ServerError::Tool(crate::tools::ToolError::NotFound { name }))
            }
            Err(other) => Ok(json!({
                "content": [{ "type": "text", "text": other.to_string() }],
                "isError": true,
            })),
        }
    }
}

/// `logging/setLevel`. Actual level application happens through the
/// `tracing_subscriber::reload::Handle` threaded in by `server.rs`; this
/// handler only validates the requested level name.
#[derive(serde::Deserialize)]
struct SetLevelParams {
    level: String,
}

pub struct LoggingSetLevelHandler {
    reload_handle: crate::server::LogReloadHandle,
}

impl LoggingSetLevelHandler {
    #[must_use]
    pub fn new(reload_handle: crate::server::LogReloadHandle) -> Self {
        Self { reload_handle }
    }
}

#[async_trait]
impl<W: Send + Sync + 'static> Handler<W> for LoggingSetLevelHandler {
    async fn handle(&self, _ctx: &HandlerContext<W>, params: Option<Value>) -> Result<Value, ServerError> {
        let params: SetLevelParams = params
            .ok_or_else(|| ServerError::Internal("missing level".to_string()))
            .and_then(|p| serde_json::from_value(p).map_err(|e| ServerError::Internal(e.to_string())))?;
        self.reload_handle
            .set_level(&params.level)
            .map_err(ServerError::Internal)?;
        Ok(json!({}))
    }
}

/// `ai/complete`, `ai/chain`, `ai/graph` — forwarded verbatim to the
/// configured [`crate::ai::AiBackend`].
pub struct AiCompleteHandler;

#[async_trait]
impl<W: Send + Sync + 'static> Handler<W> for AiCompleteHandler {
    async fn handle(&self, ctx: &HandlerContext<W>, params: Option<Value>) -> Result<Value, ServerError> {
        ctx.session.require_running().await?;
        ctx.ai
            .complete(params.unwrap_or(Value::Null))
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

pub struct AiChainHandler;

#[async_trait]
impl<W: Send + Sync + 'static> Handler<W> for AiChainHandler {
    async fn handle(&self, ctx: &HandlerContext<W>, params: Option<Value>) -> Result<Value, ServerError> {
        ctx.session.require_running().await?;
        ctx.ai
            .chain(params.unwrap_or(Value::Null))
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

pub struct AiGraphHandler;

#[async_trait]
impl<W: Send + Sync + 'static> Handler<W> for AiGraphHandler {
    async fn handle(&self, ctx: &HandlerContext<W>, params: Option<Value>) -> Result<Value, ServerError> {
        ctx.session.require_running().await?;
        ctx.ai
            .graph(params.unwrap_or(Value::Null))
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

/// `prompts/list`. No prompt templates are registered by default; the
/// capability is advertised so a host application can populate the
/// registry without a protocol change.
pub struct PromptsListHandler;

#[async_trait]
impl<W: Send + Sync + 'static> Handler<W> for PromptsListHandler {
    async fn handle(&self, ctx: &HandlerContext<W>, _params: Option<Value>) -> Result<Value, ServerError> {
        ctx.session.require_running().await?;
        Ok(json!({ "prompts": [] }))
    }
}

/// `prompts/get`. Always not-found until prompt templates are wired in.
pub struct PromptsGetHandler;

#[async_trait]
impl<W: Send + Sync + 'static> Handler<W> for PromptsGetHandler {
    async fn handle(&self, ctx: &HandlerContext<W>, _params: Option<Value>) -> Result<Value, ServerError> {
        ctx.session.require_running().await?;
        Err(ServerError::Internal("no prompts are registered".to_string()))
    }
}

/// `sampling/createMessage`. Forwarded to the AI backend's `complete`
/// method, since sampling requests and completion requests share the
/// same opaque request/response shape at this protocol surface.
pub struct SamplingCreateMessageHandler;

#[async_trait]
impl<W: Send + Sync + 'static> Handler<W> for SamplingCreateMessageHandler {
    async fn handle(&self, ctx: &HandlerContext<W>, params: Option<Value>) -> Result<Value, ServerError> {
        ctx.session.require_running().await?;
        ctx.ai
            .complete(params.unwrap_or(Value::Null))
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
