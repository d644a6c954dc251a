//! mcp-server: a line-delimited JSON-RPC 2.0 server implementing the
//! Model Context Protocol (MCP).
//!
//! A server exposes three capability surfaces to clients over a
//! bidirectional stream connection:
//!
//! - **Resources** — named, URI-addressed, readable artifacts.
//! - **Tools** — invocable operations with JSON-Schema-described inputs.
//! - **Prompts / AI methods** — named templates and orchestration methods,
//!   forwarded opaquely to the host application's AI services.
//!
//! # Modules
//!
//! - [`protocol`] — JSON-RPC 2.0 envelope, method constants, error taxonomy
//! - [`transport`] — newline-delimited JSON framing over a byte stream
//! - [`session`] — per-connection state and the session manager
//! - [`router`] — method → handler dispatch
//! - [`resources`] — registry, TTL+LRU cache, file-system watcher, metrics
//! - [`tools`] — tool registry plus the filesystem and git tools
//! - [`ai`] — pass-through handlers for `ai/complete`, `ai/chain`, `ai/graph`
//! - [`security`] — minimal authentication/authorisation manager
//! - [`config`] — configuration loading and validation
//! - [`error`] — crate-wide error taxonomy
//! - [`server`] — wires the above into the accept loop

pub mod ai;
pub mod config;
pub mod error;
pub mod protocol;
pub mod resources;
pub mod router;
pub mod security;
pub mod server;
pub mod session;
pub mod tools;
pub mod transport;
