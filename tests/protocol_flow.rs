//! End-to-end protocol flow tests, driven through the router directly
//! (no real socket) against an in-memory session writer.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use mcp_server::ai::NullAiBackend;
use mcp_server::config::Config;
use mcp_server::protocol::methods;
use mcp_server::resources::registry::ResourceContents;
use mcp_server::resources::{Resource, ResourceCache, ResourceMetrics, ResourceRegistry, UriValidator};
use mcp_server::router::handlers::{
    InitializeHandler, InitializedHandler, PingHandler, ResourcesListHandler, ResourcesReadHandler,
    ToolsCallHandler, ToolsListHandler,
};
use mcp_server::router::{HandlerContext, MessageRouter};
use mcp_server::security::{CredentialStore, SecurityManager};
use mcp_server::session::Session;
use mcp_server::tools::{FilesystemTool, ToolRegistry};
use mcp_server::transport::LineWriter;

type TestWriter = tokio::io::WriteHalf<tokio::io::DuplexStream>;

fn make_writer() -> LineWriter<TestWriter> {
    let (_client, server) = tokio::io::duplex(4096);
    let (_reader, writer) = mcp_server::transport::split(server);
    writer
}

fn make_router() -> MessageRouter<TestWriter> {
    let mut router = MessageRouter::new();
    router.register(methods::INITIALIZE, Arc::new(InitializeHandler)).unwrap();
    router
        .register(methods::NOTIFICATIONS_INITIALIZED, Arc::new(InitializedHandler))
        .unwrap();
    router.register(methods::PING, Arc::new(PingHandler)).unwrap();
    router
        .register(methods::RESOURCES_LIST, Arc::new(ResourcesListHandler))
        .unwrap();
    router
        .register(methods::RESOURCES_READ, Arc::new(ResourcesReadHandler))
        .unwrap();
    router.register(methods::TOOLS_LIST, Arc::new(ToolsListHandler)).unwrap();
    router.register(methods::TOOLS_CALL, Arc::new(ToolsCallHandler)).unwrap();
    router
}

fn make_context(tools: Arc<ToolRegistry>) -> HandlerContext<TestWriter> {
    let session = Arc::new(Session::new(make_writer(), 0));
    HandlerContext {
        session,
        resources: Arc::new(ResourceRegistry::new(UriValidator::default())),
        cache: Arc::new(ResourceCache::new(1024 * 1024, Duration::from_secs(60))),
        resource_metrics: Arc::new(ResourceMetrics::new()),
        tools,
        security: Arc::new(SecurityManager::new(CredentialStore::default(), Duration::from_secs(3600))),
        ai: Arc::new(NullAiBackend),
        config: Arc::new(Config::default()),
    }
}

async fn handshake(router: &MessageRouter<TestWriter>, ctx: &HandlerContext<TestWriter>) {
    router
        .dispatch_request(
            ctx,
            methods::INITIALIZE,
            Some(json!({ "protocolVersion": mcp_server::protocol::MCP_PROTOCOL_VERSION })),
        )
        .await
        .unwrap();
    router
        .dispatch_notification(ctx, methods::NOTIFICATIONS_INITIALIZED, None)
        .await;
}

#[tokio::test]
async fn full_handshake_then_ping_succeeds() {
    let router = make_router();
    let ctx = make_context(Arc::new(ToolRegistry::new()));

    handshake(&router, &ctx).await;
    let result = router.dispatch_request(&ctx, methods::PING, None).await.unwrap();
    assert_eq!(result, json!({}));
}

#[tokio::test]
async fn ping_before_initialize_still_succeeds_but_resources_list_does_not() {
    let router = make_router();
    let ctx = make_context(Arc::new(ToolRegistry::new()));

    // ping has no session-state precondition
    router.dispatch_request(&ctx, methods::PING, None).await.unwrap();

    let err = router
        .dispatch_request(&ctx, methods::RESOURCES_LIST, None)
        .await
        .unwrap_err();
    assert_eq!(err.code, mcp_server::protocol::ErrorCode::InvalidRequest.code());
}

#[tokio::test]
async fn resources_read_hits_cache_on_second_call() {
    let router = make_router();
    let ctx = make_context(Arc::new(ToolRegistry::new()));
    handshake(&router, &ctx).await;

    ctx.resources
        .register(Resource {
            uri: "data:text/plain,greeting".to_string(),
            name: "greeting".to_string(),
            description: None,
            mime_type: Some("text/plain".to_string()),
            contents: ResourceContents::Inline(b"hello world".to_vec()),
            watchable: false,
        })
        .await
        .unwrap();

    let first = router
        .dispatch_request(
            &ctx,
            methods::RESOURCES_READ,
            Some(json!({ "uri": "data:text/plain,greeting" })),
        )
        .await
        .unwrap();
    assert_eq!(first["contents"][0]["text"], "hello world");
    assert_eq!(first["contents"][0]["uri"], "data:text/plain,greeting");
    assert_eq!(ctx.resource_metrics.snapshot().cache_misses, 1);

    router
        .dispatch_request(
            &ctx,
            methods::RESOURCES_READ,
            Some(json!({ "uri": "data:text/plain,greeting" })),
        )
        .await
        .unwrap();
    assert_eq!(ctx.resource_metrics.snapshot().cache_hits, 1);
}

#[tokio::test]
async fn resources_list_paginates_with_cursor() {
    let router = make_router();
    let ctx = make_context(Arc::new(ToolRegistry::new()));
    handshake(&router, &ctx).await;

    for i in 0..5 {
        ctx.resources
            .register(Resource {
                uri: format!("data:text/plain,r{i}"),
                name: format!("r{i}"),
                description: None,
                mime_type: None,
                contents: ResourceContents::Inline(vec![]),
                watchable: false,
            })
            .await
            .unwrap();
    }

    let page1 = router
        .dispatch_request(&ctx, methods::RESOURCES_LIST, Some(json!({})))
        .await
        .unwrap();
    let items1 = page1["resources"].as_array().unwrap();
    assert!(!items1.is_empty());
    assert!(page1["nextCursor"].is_string() || items1.len() == 5);
}

#[tokio::test]
async fn tool_call_round_trips_through_filesystem_sandbox() {
    let dir = tempfile::tempdir().unwrap();
    let tools = Arc::new(ToolRegistry::new());
    tools
        .register(Arc::new(FilesystemTool::new(dir.path().to_path_buf(), vec![])))
        .await;

    let router = make_router();
    let ctx = make_context(tools);
    handshake(&router, &ctx).await;

    let write_result = router
        .dispatch_request(
            &ctx,
            methods::TOOLS_CALL,
            Some(json!({
                "name": "filesystem",
                "arguments": { "operation": "write_file", "path": "note.txt", "content": "hi" }
            })),
        )
        .await
        .unwrap();
    assert_eq!(write_result["isError"], false);

    let read_result = router
        .dispatch_request(
            &ctx,
            methods::TOOLS_CALL,
            Some(json!({
                "name": "filesystem",
                "arguments": { "operation": "read_file", "path": "note.txt" }
            })),
        )
        .await
        .unwrap();
    assert_eq!(read_result["isError"], false);
    assert_eq!(read_result["content"][0]["json"]["content"], "hi");
}

#[tokio::test]
async fn tool_call_path_traversal_is_reported_as_tool_error_not_protocol_error() {
    let dir = tempfile::tempdir().unwrap();
    let tools = Arc::new(ToolRegistry::new());
    tools
        .register(Arc::new(FilesystemTool::new(dir.path().to_path_buf(), vec![])))
        .await;

    let router = make_router();
    let ctx = make_context(tools);
    handshake(&router, &ctx).await;

    let result = router
        .dispatch_request(
            &ctx,
            methods::TOOLS_CALL,
            Some(json!({
                "name": "filesystem",
                "arguments": { "operation": "read_file", "path": "../secret" }
            })),
        )
        .await
        .unwrap();
    assert_eq!(result["isError"], true);
}

#[tokio::test]
async fn unknown_tool_name_is_a_protocol_error() {
    let router = make_router();
    let ctx = make_context(Arc::new(ToolRegistry::new()));
    handshake(&router, &ctx).await;

    let err = router
        .dispatch_request(
            &ctx,
            methods::TOOLS_CALL,
            Some(json!({ "name": "does-not-exist", "arguments": {} })),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, mcp_server::protocol::ErrorCode::NotFound.code());
}
