//! JSON-RPC 2.0 framing for the WebSocket RPC endpoint.
//!
//! Every WebSocket text message carries exactly one JSON-RPC frame. This module
//! defines the outbound request type, the typed inbound frame discriminant, and
//! the request tracker that correlates responses with their callers.
//!
//! Wire shapes:
//!
//! ```text
//! request       {"jsonrpc":"2.0","id":<int>,"method":<string>,"params":<any>}
//! response (ok) {"id":<int>,"result":<any>}
//! response (err){"id":<int>,"error":<any>}
//! notification  {"method":<string>,"params":<any>}
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use wsrpc_core::prelude::*;

/// Protocol version tag carried by every outbound request.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method name of the mandatory first exchange on every connection.
pub const HANDSHAKE_METHOD: &str = "initialize";

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// JSON-RPC 2.0 request frame.
#[derive(Debug, Serialize)]
pub struct RpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Connection-scoped identifier used to correlate the response.
    pub id: u64,
    /// Method name, e.g. `"initialize"` or `"tools/call"`.
    pub method: String,
    /// Method parameters, opaque to this layer.
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Response to one of our requests.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    /// Identifier of the originating request.
    pub id: u64,
    /// Successful result payload.
    pub result: Option<Value>,
    /// Error payload, present when the call failed.
    pub error: Option<Value>,
}

impl RpcResponse {
    /// Convert into the caller-facing outcome.
    ///
    /// A non-null `error` wins over `result`. A response with neither field
    /// fulfils the call with `null`.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(error) if !error.is_null() => Err(Error::remote(error)),
            _ => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Server-initiated message with no identifier.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Notification {
    /// Notification method name, e.g. `"notifications/progress"`.
    pub method: String,
    /// Notification payload; `null` when the server omits it.
    #[serde(default)]
    pub params: Value,
}

/// The result of parsing one raw WebSocket text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Carries a numeric `id`: a response to a request we sent.
    Response(RpcResponse),
    /// Carries a `method` and no `id`: an unsolicited notification.
    Notification(Notification),
    /// Valid JSON we do not know how to route (server requests with string
    /// ids, bare values, ...).
    Unrecognized(Value),
}

/// An inbound frame that was not valid JSON.
#[derive(Debug)]
pub struct MalformedFrame {
    pub reason: String,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Parse a raw WebSocket text message into a typed [`InboundFrame`].
///
/// Dispatch logic:
/// - top-level non-negative integral `"id"` (`2` or `2.0`) → [`InboundFrame::Response`]
/// - `"method"` with absent or null `"id"` → [`InboundFrame::Notification`]
/// - any other JSON → [`InboundFrame::Unrecognized`]
///
/// Text that is not valid JSON is reported as [`MalformedFrame`].
pub fn parse_frame(text: &str) -> std::result::Result<InboundFrame, MalformedFrame> {
    let value: Value = serde_json::from_str(text).map_err(|e| MalformedFrame {
        reason: e.to_string(),
    })?;

    if !value.is_object() {
        return Ok(InboundFrame::Unrecognized(value));
    }

    let raw: RawFrame = match serde_json::from_value(value.clone()) {
        Ok(raw) => raw,
        // e.g. `"method": 42`
        Err(_) => return Ok(InboundFrame::Unrecognized(value)),
    };

    if let Some(id) = raw.id.as_ref().and_then(integral_id) {
        return Ok(InboundFrame::Response(RpcResponse {
            id,
            result: raw.result,
            error: raw.error,
        }));
    }

    match (&raw.id, raw.method) {
        (None | Some(Value::Null), Some(method)) => Ok(InboundFrame::Notification(Notification {
            method,
            params: raw.params.unwrap_or(Value::Null),
        })),
        _ => Ok(InboundFrame::Unrecognized(value)),
    }
}

/// A non-negative integral id. Peers that encode numbers as floats send
/// `2.0` for `2`.
fn integral_id(id: &Value) -> Option<u64> {
    if let Some(id) = id.as_u64() {
        return Some(id);
    }
    let id = id.as_f64()?;
    (id >= 0.0 && id.fract() == 0.0 && id <= u64::MAX as f64).then_some(id as u64)
}

// ---------------------------------------------------------------------------
// Request tracker
// ---------------------------------------------------------------------------

/// Channel half used to deliver a call's outcome to its caller.
pub type ResponseSender = oneshot::Sender<Result<Value>>;

/// Tracks in-flight requests of one connection and matches them to responses.
///
/// Identifiers start at 1 and strictly increase for the tracker's lifetime.
/// A fresh tracker is created per connection, so identifiers restart on every
/// new transport.
pub struct RequestTracker {
    next_id: u64,
    pending: HashMap<u64, ResponseSender>,
}

impl RequestTracker {
    /// Create a new, empty tracker.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            pending: HashMap::new(),
        }
    }

    /// Allocate the next identifier and register `response_tx` under it.
    pub fn register(&mut self, response_tx: ResponseSender) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.insert(id, response_tx);
        id
    }

    /// Deliver an outcome to the pending call registered under `id`.
    ///
    /// Returns `false` when no call is pending under `id` (stale or duplicate
    /// response); nothing else happens in that case.
    pub fn complete(&mut self, id: u64, outcome: Result<Value>) -> bool {
        match self.pending.remove(&id) {
            Some(response_tx) => {
                // The caller may have stopped waiting; that is not our problem.
                let _ = response_tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Remove a pending call without resolving it, returning its sender.
    pub fn remove(&mut self, id: u64) -> Option<ResponseSender> {
        self.pending.remove(&id)
    }

    /// Drop pending calls whose caller stopped waiting.
    ///
    /// Returns how many entries were removed. A late response for a pruned
    /// id is then treated like any other unknown id.
    pub fn prune_abandoned(&mut self) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, response_tx| !response_tx.is_closed());
        before - self.pending.len()
    }

    /// Reject every pending call with [`Error::ConnectionClosed`].
    ///
    /// Returns how many calls were rejected.
    pub fn reject_all(&mut self) -> usize {
        let count = self.pending.len();
        for (_, response_tx) in self.pending.drain() {
            let _ = response_tx.send(Err(Error::ConnectionClosed));
        }
        count
    }

    /// Return the number of currently pending requests.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether a call is pending under `id`.
    pub fn is_pending(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
