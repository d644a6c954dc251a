//! Pass-through AI handlers (spec.md §4.13 / "AI subsystem" in the
//! original distillation).
//!
//! `ai/complete`, `ai/chain` and `ai/graph` do not implement any model
//! logic themselves — they validate shape and forward the request body
//! to whatever [`AiBackend`] the host application supplies, returning
//! its response verbatim. This server ships a [`NullAiBackend`] that
//! echoes its input, so the methods are reachable and testable without
//! a real model behind them.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Failures an AI backend call can produce.
#[derive(Error, Debug)]
pub enum AiError {
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("backend unavailable: {message}")]
    BackendUnavailable { message: String },
}

/// The host application's AI service, addressed opaquely by method name.
#[async_trait]
pub trait AiBackend: Send + Sync {
    /// Handles `ai/complete`: a single-shot completion request.
    ///
    /// # Errors
    ///
    /// Returns [`AiError`] if the backend rejects or cannot serve the
    /// request.
    async fn complete(&self, request: Value) -> Result<Value, AiError>;

    /// Handles `ai/chain`: a sequence of dependent completion steps.
    ///
    /// # Errors
    ///
    /// Returns [`AiError`] if the backend rejects or cannot serve the
    /// request.
    async fn chain(&self, request: Value) -> Result<Value, AiError>;

    /// Handles `ai/graph`: a DAG of completion steps with explicit
    /// dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`AiError`] if the backend rejects or cannot serve the
    /// request.
    async fn graph(&self, request: Value) -> Result<Value, AiError>;
}

/// Default backend: echoes the request body back as the response. Lets
/// the protocol surface for `ai/*` methods be exercised end-to-end
/// before a real model integration is wired in.
#[derive(Debug, Default)]
pub struct NullAiBackend;

#[async_trait]
impl AiBackend for NullAiBackend {
    async fn complete(&self, request: Value) -> Result<Value, AiError> {
        Ok(serde_json::json!({ "echo": request }))
    }

    async fn chain(&self, request: Value) -> Result<Value, AiError> {
        Ok(serde_json::json!({ "echo": request }))
    }

    async fn graph(&self, request: Value) -> Result<Value, AiError> {
        Ok(serde_json::json!({ "echo": request }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_backend_echoes_complete_request() {
        let backend = NullAiBackend;
        let result = backend.complete(serde_json::json!({"prompt": "hi"})).await.unwrap();
        assert_eq!(result["echo"]["prompt"], "hi");
    }

    #[tokio::test]
    async fn null_backend_echoes_chain_and_graph() {
        let backend = NullAiBackend;
        assert!(backend.chain(Value::Null).await.is_ok());
        assert!(backend.graph(Value::Null).await.is_ok());
    }
}
