//! wsrpc - command-line front end for the WebSocket JSON-RPC client
//!
//! The protocol client lives in [`wsrpc_client`]; this crate only parses
//! arguments, resolves settings and renders output.

pub mod cli;
pub mod output;

pub use cli::{run, Cli};
