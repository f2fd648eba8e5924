//! # wsrpc-client - WebSocket JSON-RPC Client
//!
//! A JSON-RPC 2.0 client multiplexed over one persistent WebSocket.
//! Connections are opened lazily on the first call, gated by an `initialize`
//! handshake, and torn down deterministically: when the socket closes every
//! outstanding call is rejected and every disconnect waiter is released.
//!
//! Depends on [`wsrpc_core`] for error handling.
//!
//! ## Public API
//!
//! ### Client
//! - [`RpcClient`] - Connection manager, request correlator and notification
//!   fan-out behind one clonable handle
//! - [`ConnectionState`] - `Idle`, `Connecting`, `Open`, `Closed`
//! - [`RpcClient::call_tool()`] - `tools/call` with `structuredContent`
//!   normalisation
//!
//! ### Protocol
//! - [`parse_frame()`] - Typed discrimination of inbound frames
//! - [`RequestTracker`] - Id allocation and response correlation
//!
//! ### Collaborators
//! - [`Endpoint`] - Socket URL composition from an HTTP(S) origin
//! - [`CredentialStore`] - Bearer token source ([`StaticToken`],
//!   [`FileTokenStore`], [`EnvTokenStore`])
//! - [`ClientSettings`] - `.wsrpc/config.toml` settings
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use serde_json::json;
//! use wsrpc_client::{Endpoint, RpcClient, StaticToken};
//!
//! let endpoint = Endpoint::new("https://api.example.com", "/mcp/ws")?;
//! let client = RpcClient::new(endpoint, Arc::new(StaticToken::new("secret")));
//!
//! // First call opens the socket and performs the handshake.
//! let tools = client.list_tools().await?;
//! let out = client.call_tool("echo", json!({"x": 1})).await?;
//!
//! let sub = client.on_notification(|n| tracing::info!("{}: {}", n.method, n.params));
//! client.wait_for_disconnect().await;
//! sub.unsubscribe();
//! ```

pub mod client;
pub mod config;
mod connection;
pub mod credentials;
pub mod endpoint;
pub mod notifications;
pub mod protocol;
pub mod tools;

pub use client::{ConnectionState, RpcClient};
pub use config::{load_settings, load_settings_from, ClientSettings};
pub use credentials::{CredentialStore, EnvTokenStore, FileTokenStore, StaticToken};
pub use endpoint::{Endpoint, DEFAULT_ENDPOINT_PATH};
pub use notifications::{NotificationHandler, NotificationRegistry, NotificationSubscription};
pub use protocol::{
    parse_frame, InboundFrame, MalformedFrame, Notification, RequestTracker, RpcRequest,
    RpcResponse,
};
pub use tools::{normalize_tool_result, ToolInfo};
