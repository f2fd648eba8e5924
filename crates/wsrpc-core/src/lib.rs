//! # wsrpc-core - Foundation Types
//!
//! Foundation crate for the wsrpc client. Provides the error taxonomy shared
//! by every layer and the logging setup used by the binary.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde_json, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum covering transport, remote and config failures
//! - [`ErrorKind`] - Coarse classification (`TransportNotOpen`, `ConnectionClosed`, ...)
//! - [`RemoteError`] - A peer's JSON-RPC error payload, passed through unchanged
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ### Logging (`logging`)
//! - [`logging::init()`] - Rolling-file tracing subscriber filtered by `WSRPC_LOG`
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use wsrpc_core::prelude::*;
//! ```

pub mod error;
pub mod logging;
pub mod prelude;

pub use error::{Error, ErrorKind, RemoteError, Result, ResultExt};
