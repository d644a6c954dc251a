//! Tool subsystem: a registry of invocable, schema-described operations
//! (spec.md §4.10-§4.11).
//!
//! A [`Tool`] is a small interface — name, description, JSON Schema for
//! its arguments, and an async `call` — rather than a trait hierarchy per
//! capability, per the "prefer small interface abstractions" design note.

pub mod filesystem;
pub mod git;
pub mod registry;

pub use filesystem::FilesystemTool;
pub use git::GitTool;
pub use registry::ToolRegistry;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Failures a tool call can produce.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("tool not found: {name}")]
    NotFound { name: String },

    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    #[error("tool execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("tool timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("sandbox violation: {message}")]
    SandboxViolation { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A callable tool exposed via `tools/list` and `tools/call`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name.
    fn name(&self) -> &str;

    /// Human-readable description shown in `tools/list`.
    fn description(&self) -> &str;

    /// JSON Schema describing the shape of `call`'s `arguments`.
    fn input_schema(&self) -> Value;

    /// Invokes the tool with the given arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] if the arguments are invalid or execution
    /// fails. Per MCP convention, tool-level failures are reported in the
    /// call result content with `is_error: true`, not as protocol errors
    /// — the router is responsible for that translation.
    async fn call(&self, arguments: Value) -> Result<Value, ToolError>;
}
