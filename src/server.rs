//! Wires the transport, session manager, router and subsystems into a
//! TCP accept loop (spec.md §4, §5).
//!
//! One task blocks on `accept()`. Each accepted connection gets its own
//! session and its own read loop; every line that loop decodes is
//! dispatched on a short-lived task of its own, so a slow tool call on
//! one request never blocks the next line from being read or another
//! request's response from going out first (spec.md §5).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ai::AiBackend;
use crate::config::Config;
use crate::error::ServerError;
use crate::protocol::{self, IncomingMessage, JsonRpcError, JsonRpcResponse};
use crate::resources::{FileSystemWatcher, ResourceCache, ResourceMetrics, ResourceRegistry, UriValidator};
use crate::router::handlers;
use crate::router::{HandlerContext, MessageRouter};
use crate::security::{CredentialEntry, CredentialStore, SecurityManager};
use crate::session::SessionManager;
use crate::tools::{FilesystemTool, GitTool, ToolRegistry};
use crate::transport;

/// The concrete write half this server dispatches against: a plain TCP
/// connection split by [`transport::split`].
pub type ServerWriter = tokio::io::WriteHalf<TcpStream>;

/// Lets `logging/setLevel` change the live tracing filter. Built in
/// `main.rs` alongside the subscriber and threaded through to the
/// router's `LoggingSetLevelHandler`.
#[derive(Clone)]
pub struct LogReloadHandle {
    inner: tracing_subscriber::reload::Handle<tracing_subscriber::EnvFilter, tracing_subscriber::Registry>,
}

impl LogReloadHandle {
    #[must_use]
    pub fn new(
        inner: tracing_subscriber::reload::Handle<tracing_subscriber::EnvFilter, tracing_subscriber::Registry>,
    ) -> Self {
        Self { inner }
    }

    /// Replaces the active filter with `level` (e.g. `"debug"`, `"info"`).
    ///
    /// # Errors
    ///
    /// Returns a display string if `level` does not parse as an
    /// `EnvFilter` directive, or if the subscriber has already shut down.
    pub fn set_level(&self, level: &str) -> Result<(), String> {
        let filter = tracing_subscriber::EnvFilter::try_new(level).map_err(|e| e.to_string())?;
        self.inner.reload(filter).map_err(|e| e.to_string())
    }
}

/// Owns every shared subsystem and the accept loop.
pub struct Server {
    config: Arc<Config>,
    session_manager: Arc<SessionManager<ServerWriter>>,
    router: Arc<MessageRouter<ServerWriter>>,
    resources: Arc<ResourceRegistry>,
    cache: Arc<ResourceCache>,
    resource_metrics: Arc<ResourceMetrics>,
    tools: Arc<ToolRegistry>,
    security: Arc<SecurityManager>,
    ai: Arc<dyn AiBackend>,
    cancel: CancellationToken,
}

impl Server {
    /// Builds every subsystem from `config` and registers the default
    /// method table. Does not bind a socket yet.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Internal`] if the method table contains a
    /// programming-error duplicate, or if the file-system watcher fails
    /// to initialise.
    pub async fn new(config: Config, ai: Arc<dyn AiBackend>, log_reload: LogReloadHandle) -> Result<Self, ServerError> {
        let config = Arc::new(config);

        let resources = Arc::new(ResourceRegistry::new(UriValidator::default()));
        if config.enable_events {
            let watcher = Arc::new(FileSystemWatcher::new()?);
            resources.attach_watcher(Arc::clone(&watcher), Arc::downgrade(&resources));
        }
        let cache = Arc::new(ResourceCache::new(
            config.resources.cache_max_size_bytes,
            Duration::from_secs(config.resources.cache_ttl_secs),
        ));
        let resource_metrics = Arc::new(ResourceMetrics::new());

        let tools = Arc::new(ToolRegistry::new());
        let fs_tool = FilesystemTool::new(config.tools.base_path.clone(), config.tools.allowlist.clone());
        tools.register(Arc::new(fs_tool)).await;
        if let Some(repo_path) = &config.tools.repo_path {
            let git_tool = GitTool::new(repo_path.clone(), Duration::from_secs(config.tools.git_timeout_secs));
            tools.register(Arc::new(git_tool)).await;
        }

        let mut credential_store = CredentialStore::default();
        for cred in &config.security.credentials {
            credential_store.insert(CredentialEntry::from_hash(
                cred.principal.clone(),
                cred.password_hash_hex.clone(),
                cred.api_key.clone(),
                cred.permissions.clone(),
            ));
        }
        let security = Arc::new(SecurityManager::new(
            credential_store,
            Duration::from_secs(config.security.token_ttl_secs),
        ));

        let session_manager = Arc::new(SessionManager::new(
            config.max_connections,
            Duration::from_secs(config.idle_timeout_secs),
        ));

        let mut router = MessageRouter::new();
        register_default_handlers(&mut router, log_reload).map_err(|e| ServerError::Internal(e.to_string()))?;

        Ok(Self {
            config,
            session_manager,
            router: Arc::new(router),
            resources,
            cache,
            resource_metrics,
            tools,
            security,
            ai,
            cancel: CancellationToken::new(),
        })
    }

    /// Binds a listener and serves connections until `shutdown_signal`
    /// resolves, then drains in-flight sessions (bounded by
    /// `shutdown_timeout_secs`) before returning.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Internal`] if the listener cannot be bound.
    pub async fn run(self: Arc<Self>, shutdown_signal: impl std::future::Future<Output = ()>) -> Result<(), ServerError> {
        let addr = format!("{}:{}", self.config.address, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Internal(format!("failed to bind {addr}: {e}")))?;
        info!(%addr, "mcp-server listening");

        let sweeper = {
            let manager = Arc::clone(&self.session_manager);
            let cancel = self.cancel.clone();
            tokio::spawn(manager.run_sweeper(Duration::from_secs(30), cancel))
        };
        let cache_sweeper = {
            let cache = Arc::clone(&self.cache);
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(30));
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        _ = ticker.tick() => cache.sweep_expired().await,
                    }
                }
            })
        };

        let accept_loop = {
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = server.cancel.cancelled() => break,
                        accepted = listener.accept() => {
                            match accepted {
                                Ok((stream, addr)) => {
                                    let server = Arc::clone(&server);
                                    tokio::spawn(async move {
                                        server.handle_connection(stream, addr).await;
                                    });
                                }
                                Err(e) => warn!(error = %e, "accept failed"),
                            }
                        }
                    }
                }
            })
        };

        shutdown_signal.await;
        info!("shutdown signal received, draining connections");
        self.cancel.cancel();

        let drain = self.session_manager.close_all();
        let _ = tokio::time::timeout(Duration::from_secs(self.config.shutdown_timeout_secs), drain).await;

        let _ = accept_loop.await;
        let _ = sweeper.await;
        let _ = cache_sweeper.await;
        Ok(())
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let (mut reader, writer) = transport::split(stream);
        let session = match self.session_manager.create(writer).await {
            Ok(session) => session,
            Err(e) => {
                debug!(%addr, error = %e, "connection rejected");
                return;
            }
        };
        info!(%addr, session_id = %session.id(), "session opened");

        let ctx = Arc::new(HandlerContext {
            session: Arc::clone(&session),
            resources: Arc::clone(&self.resources),
            cache: Arc::clone(&self.cache),
            resource_metrics: Arc::clone(&self.resource_metrics),
            tools: Arc::clone(&self.tools),
            security: Arc::clone(&self.security),
            ai: Arc::clone(&self.ai),
            config: Arc::clone(&self.config),
        });

        loop {
            let line = tokio::select! {
                () = self.cancel.cancelled() => break,
                line = reader.read_line() => line,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!(session_id = %session.id(), error = %e, "transport read failed");
                    break;
                }
            };

            session.touch(now_unix_ms());
            let router = Arc::clone(&self.router);
            let ctx = Arc::clone(&ctx);
            let write_timeout = Duration::from_secs(self.config.write_timeout_secs);
            tokio::spawn(async move {
                dispatch_line(&router, &ctx, &line, write_timeout).await;
            });
        }

        self.session_manager.remove(session.id()).await;
        info!(%addr, session_id = %session.id(), "session closed");
    }
}

async fn dispatch_line(
    router: &MessageRouter<ServerWriter>,
    ctx: &HandlerContext<ServerWriter>,
    line: &str,
    write_timeout: Duration,
) {
    let outgoing = match protocol::parse_message(line) {
        Ok(IncomingMessage::Request(req)) => {
            let result = router.dispatch_request(ctx, &req.method, req.params).await;
            Some(match result {
                Ok(value) => serde_json::to_value(JsonRpcResponse::success(req.id, value)),
                Err(error) => serde_json::to_value(JsonRpcError::new(Some(req.id), error)),
            })
        }
        Ok(IncomingMessage::Notification(notif)) => {
            router.dispatch_notification(ctx, &notif.method, notif.params).await;
            None
        }
        Ok(IncomingMessage::Response { .. }) => None,
        Err(err) => Some(serde_json::to_value(err)),
    };

    let Some(Ok(value)) = outgoing else {
        return;
    };

    let writer = ctx.session.writer();
    let write = async move {
        let mut writer = writer.lock().await;
        if let Err(e) = writer.write_line(&value).await {
            warn!(error = %e, "failed to write response");
        }
    };
    if tokio::time::timeout(write_timeout, write).await.is_err() {
        error!("response write timed out");
    }
}

fn register_default_handlers(
    router: &mut MessageRouter<ServerWriter>,
    log_reload: LogReloadHandle,
) -> Result<(), crate::router::RouterError> {
    use protocol::methods;
    use std::sync::Arc as A;

    router.register(methods::INITIALIZE, A::new(handlers::InitializeHandler))?;
    router.register(methods::NOTIFICATIONS_INITIALIZED, A::new(handlers::InitializedHandler))?;
    router.register(methods::INITIALIZED, A::new(handlers::InitializedHandler))?;
    router.register(methods::PING, A::new(handlers::PingHandler))?;
    router.register(methods::RESOURCES_LIST, A::new(handlers::ResourcesListHandler))?;
    router.register(methods::RESOURCES_READ, A::new(handlers::ResourcesReadHandler))?;
    router.register(methods::RESOURCES_SUBSCRIBE, A::new(handlers::ResourcesSubscribeHandler))?;
    router.register(methods::RESOURCES_UNSUBSCRIBE, A::new(handlers::ResourcesUnsubscribeHandler))?;
    router.register(methods::TOOLS_LIST, A::new(handlers::ToolsListHandler))?;
    router.register(methods::TOOLS_CALL, A::new(handlers::ToolsCallHandler))?;
    router.register(methods::LOGGING_SET_LEVEL, A::new(handlers::LoggingSetLevelHandler::new(log_reload)))?;
    router.register(methods::AI_COMPLETE, A::new(handlers::AiCompleteHandler))?;
    router.register(methods::AI_CHAIN, A::new(handlers::AiChainHandler))?;
    router.register(methods::AI_GRAPH, A::new(handlers::AiGraphHandler))?;
    router.register(methods::PROMPTS_LIST, A::new(handlers::PromptsListHandler))?;
    router.register(methods::PROMPTS_GET, A::new(handlers::PromptsGetHandler))?;
    router.register(
        methods::SAMPLING_CREATE_MESSAGE,
        A::new(handlers::SamplingCreateMessageHandler),
    )?;
    Ok(())
}

fn now_unix_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_writer_type_matches_tcp_split() {
        fn assert_send<T: Send>() {}
        assert_send::<ServerWriter>();
    }
}
