//! Lazily connecting JSON-RPC client.
//!
//! [`RpcClient`] owns at most one [`Connection`] at a time and moves it through
//! `Idle → Connecting → Open → Closed`. Every call goes through
//! [`RpcClient::connect`] first, which either returns immediately (open),
//! joins the attempt already in flight (connecting), or starts a new attempt
//! (idle/closed). An attempt is only successful once the `initialize`
//! handshake has been answered.
//!
//! The client never reconnects on its own; after a close the next call simply
//! starts a fresh attempt with a fresh transport and fresh request ids.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{json, Value};
use tokio::sync::watch;

use wsrpc_core::prelude::*;

use crate::config::ClientSettings;
use crate::connection::{connect_ws, Connection};
use crate::credentials::CredentialStore;
use crate::endpoint::{Endpoint, TOKEN_QUERY_PARAM};
use crate::notifications::{NotificationRegistry, NotificationSubscription};
use crate::protocol::{Notification, HANDSHAKE_METHOD};

/// Default capacity of the per-connection outbound command queue.
const DEFAULT_COMMAND_BUFFER: usize = 32;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Connection lifecycle as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection has been attempted yet.
    Idle,
    /// A transport is being opened or the handshake is outstanding.
    Connecting,
    /// Handshake completed; calls are accepted.
    Open,
    /// The last transport closed or the last attempt failed.
    Closed,
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

/// Outcome of one connection attempt: `None` while in flight.
type AttemptOutcome = watch::Receiver<Option<bool>>;

enum Slot {
    Idle,
    Connecting {
        epoch: u64,
        /// Published exactly once, when the attempt leaves `Connecting`.
        outcome: watch::Sender<Option<bool>>,
        /// Set once the socket is open and the handshake is being exchanged.
        transport: Option<Connection>,
    },
    Open {
        epoch: u64,
        connection: Connection,
        handshake: Value,
    },
    Closed,
}

impl Slot {
    /// The transport that currently exists, open or not.
    fn transport(&self) -> Option<&Connection> {
        match self {
            Slot::Open { connection, .. }
            | Slot::Connecting {
                transport: Some(connection),
                ..
            } => Some(connection),
            _ => None,
        }
    }
}

struct State {
    slot: Slot,
    /// Incremented per attempt; lets late callbacks recognise a stale attempt.
    last_epoch: u64,
}

impl State {
    fn is_attempt(&self, epoch: u64) -> bool {
        matches!(self.slot, Slot::Connecting { epoch: e, .. } if e == epoch)
    }

    /// Move attempt `epoch` to `Closed` and fail everyone waiting on it.
    /// Returns `false` if `epoch` is not the attempt in flight.
    fn fail_attempt(&mut self, epoch: u64) -> bool {
        if !self.is_attempt(epoch) {
            return false;
        }
        if let Slot::Connecting { outcome, .. } = std::mem::replace(&mut self.slot, Slot::Closed) {
            outcome.send_replace(Some(false));
        }
        true
    }
}

struct ClientInner {
    endpoint: Endpoint,
    credentials: Arc<dyn CredentialStore>,
    notifications: Arc<NotificationRegistry>,
    command_buffer: usize,
    state: Mutex<State>,
}

impl ClientInner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Transport of attempt `epoch` closed. Runs on the close path before
    /// disconnect waiters are released.
    fn transport_closed(&self, epoch: u64) {
        let mut state = self.lock_state();
        if matches!(state.slot, Slot::Open { epoch: e, .. } if e == epoch) {
            state.slot = Slot::Closed;
            info!("Connection state: Open → Closed");
        } else if state.fail_attempt(epoch) {
            info!("Connection state: Connecting → Closed (transport closed during handshake)");
        }
    }

    /// Attempt `epoch` failed before its transport existed, or the handshake
    /// was rejected.
    fn attempt_failed(&self, epoch: u64) {
        self.lock_state().fail_attempt(epoch);
    }

    /// Record the transport of attempt `epoch` once the socket is open.
    fn attach_transport(&self, epoch: u64, connection: &Connection) {
        let mut state = self.lock_state();
        if let Slot::Connecting {
            epoch: e,
            transport,
            ..
        } = &mut state.slot
        {
            if *e == epoch {
                *transport = Some(connection.clone());
            }
        }
    }

    /// Promote attempt `epoch` to `Open`. Fails if the transport already
    /// closed or the attempt is no longer current.
    fn promote(&self, epoch: u64, connection: &Connection, handshake: Value) -> bool {
        let mut state = self.lock_state();
        if !state.is_attempt(epoch) || !connection.is_open() {
            return false;
        }
        let previous = std::mem::replace(
            &mut state.slot,
            Slot::Open {
                epoch,
                connection: connection.clone(),
                handshake,
            },
        );
        if let Slot::Connecting { outcome, .. } = previous {
            outcome.send_replace(Some(true));
        }
        true
    }
}

// ---------------------------------------------------------------------------
// RpcClient
// ---------------------------------------------------------------------------

/// WebSocket JSON-RPC client.
///
/// Cloning is cheap; all clones share the same connection, pending calls and
/// notification listeners. Construct one client at startup and hand clones to
/// whoever needs it.
///
/// ```ignore
/// let settings = wsrpc_client::load_settings(Path::new("."));
/// let client = RpcClient::from_settings(&settings)?;
///
/// let echoed = client.call_tool("echo", json!({"x": 1})).await?;
///
/// let sub = client.on_notification(|n| println!("{}: {}", n.method, n.params));
/// client.wait_for_disconnect().await;
/// sub.unsubscribe();
/// ```
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("endpoint", &self.inner.endpoint)
            .field("state", &self.connection_state())
            .finish()
    }
}

impl RpcClient {
    /// Create an idle client. Nothing is opened until the first call.
    pub fn new(endpoint: Endpoint, credentials: Arc<dyn CredentialStore>) -> Self {
        Self::with_command_buffer(endpoint, credentials, DEFAULT_COMMAND_BUFFER)
    }

    /// Like [`new`](Self::new) with an explicit outbound queue capacity.
    pub fn with_command_buffer(
        endpoint: Endpoint,
        credentials: Arc<dyn CredentialStore>,
        command_buffer: usize,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                endpoint,
                credentials,
                notifications: Arc::new(NotificationRegistry::new()),
                command_buffer: command_buffer.max(1),
                state: Mutex::new(State {
                    slot: Slot::Idle,
                    last_epoch: 0,
                }),
            }),
        }
    }

    /// Create an idle client from validated settings.
    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self::with_command_buffer(
            settings.endpoint()?,
            settings.credential_store(),
            settings.command_buffer,
        ))
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    // ── Connection manager ────────────────────────────────────────────────

    /// Ensure an open, handshake-completed connection.
    ///
    /// Concurrent callers share a single attempt. Returns immediately when
    /// already open.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectionClosed`] if the socket could not be opened, closed
    /// before the handshake completed, or the handshake was rejected.
    pub async fn connect(&self) -> Result<()> {
        let mut outcome = {
            let mut state = self.inner.lock_state();

            // The handshake transport is already closing: that attempt is
            // lost, start over instead of joining it.
            if let Slot::Connecting {
                epoch,
                transport: Some(transport),
                ..
            } = &state.slot
            {
                if !transport.is_open() {
                    let epoch = *epoch;
                    state.fail_attempt(epoch);
                }
            }

            match &state.slot {
                Slot::Open { connection, .. } if connection.is_open() => return Ok(()),
                Slot::Connecting { outcome, .. } => outcome.subscribe(),
                _ => self.start_attempt(&mut state),
            }
        };

        let succeeded = match outcome.wait_for(Option::is_some).await {
            Ok(result) => *result == Some(true),
            Err(_) => false,
        };
        if succeeded {
            Ok(())
        } else {
            Err(Error::ConnectionClosed)
        }
    }

    fn start_attempt(&self, state: &mut State) -> AttemptOutcome {
        state.last_epoch += 1;
        let epoch = state.last_epoch;
        let (outcome_tx, outcome_rx) = watch::channel(None);

        state.slot = Slot::Connecting {
            epoch,
            outcome: outcome_tx,
            transport: None,
        };
        debug!("Connection state: → Connecting (attempt {})", epoch);

        tokio::spawn(establish(Arc::clone(&self.inner), epoch));
        outcome_rx
    }

    /// Current lifecycle state.
    pub fn connection_state(&self) -> ConnectionState {
        let state = self.inner.lock_state();
        match &state.slot {
            Slot::Idle => ConnectionState::Idle,
            Slot::Connecting {
                transport: Some(transport),
                ..
            } if !transport.is_open() => ConnectionState::Closed,
            Slot::Connecting { .. } => ConnectionState::Connecting,
            Slot::Open { connection, .. } if connection.is_open() => ConnectionState::Open,
            Slot::Open { .. } | Slot::Closed => ConnectionState::Closed,
        }
    }

    /// Result payload of the `initialize` handshake of the open connection.
    pub fn handshake_result(&self) -> Option<Value> {
        match &self.inner.lock_state().slot {
            Slot::Open { handshake, .. } => Some(handshake.clone()),
            _ => None,
        }
    }

    /// Resolve once the current transport closes.
    ///
    /// Resolves immediately when there is no transport or it is already
    /// closing.
    pub async fn wait_for_disconnect(&self) {
        let waiter = {
            let state = self.inner.lock_state();
            state.slot.transport().and_then(Connection::disconnect_waiter)
        };
        if let Some(waiter) = waiter {
            let _ = waiter.await;
        }
    }

    /// Close the current transport, if any, and wait for the close path to
    /// finish: pending calls are rejected with [`Error::ConnectionClosed`] and
    /// disconnect waiters are released.
    ///
    /// An attempt whose socket is not open yet is left to finish.
    pub async fn close(&self) {
        let transport = {
            let state = self.inner.lock_state();
            state.slot.transport().cloned()
        };
        if let Some(transport) = transport {
            transport.close().await;
        }
    }

    // ── Request correlator ────────────────────────────────────────────────

    /// Send a JSON-RPC request and wait for its response.
    ///
    /// Connects first if needed. Responses may arrive in any order; each is
    /// routed to its caller by id.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if connecting failed or the connection
    ///   closed before the response arrived.
    /// - [`Error::TransportNotOpen`] if the transport was not open at send
    ///   time; nothing was sent.
    /// - [`Error::Transport`] if writing the frame failed.
    /// - [`Error::Remote`] with the peer's error payload.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.connect().await?;

        let connection = {
            let state = self.inner.lock_state();
            match &state.slot {
                Slot::Open { connection, .. } => Some(connection.clone()),
                _ => None,
            }
        }
        .ok_or(Error::TransportNotOpen)?;

        debug!("Request '{}'", method);
        connection.request(method, params).await
    }

    // ── Notification fan-out ──────────────────────────────────────────────

    /// Register a listener for server notifications.
    ///
    /// Listeners survive reconnects. They run on the connection's I/O task, so
    /// they should return quickly; a panicking listener is logged and does
    /// not affect other listeners or the connection.
    pub fn on_notification<F>(&self, handler: F) -> NotificationSubscription
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.inner.notifications.subscribe(Arc::new(handler))
    }
}

// ---------------------------------------------------------------------------
// Connection attempt
// ---------------------------------------------------------------------------

/// Run connection attempt `epoch` to completion.
///
/// The outcome is published by whichever of `promote`, `transport_closed` or
/// `attempt_failed` moves the attempt out of `Connecting` first.
async fn establish(inner: Arc<ClientInner>, epoch: u64) {
    if let Err(err) = open_and_handshake(&inner, epoch).await {
        warn!("Connection attempt {} failed: {}", epoch, err);
        inner.attempt_failed(epoch);
    }
}

async fn open_and_handshake(inner: &Arc<ClientInner>, epoch: u64) -> Result<()> {
    let token = inner.credentials.token();
    let url = inner.endpoint.socket_url(token.as_deref())?;
    info!("Connecting to {}", redact_token(&url));

    let ws = connect_ws(&url).await?;

    let weak = Arc::downgrade(inner);
    let connection = Connection::spawn(
        ws,
        Arc::clone(&inner.notifications),
        inner.command_buffer,
        move || {
            if let Some(inner) = weak.upgrade() {
                inner.transport_closed(epoch);
            }
        },
    );
    inner.attach_transport(epoch, &connection);

    let handshake = match connection.request(HANDSHAKE_METHOD, json!({})).await {
        Ok(result) => result,
        Err(err) => {
            connection.close().await;
            return Err(err);
        }
    };

    if inner.promote(epoch, &connection, handshake) {
        info!("Connection state: Connecting → Open (attempt {})", epoch);
        Ok(())
    } else {
        connection.close().await;
        Err(Error::ConnectionClosed)
    }
}

/// Render `url` for logs with the credential masked.
fn redact_token(url: &url::Url) -> String {
    if !url.query_pairs().any(|(k, _)| k == TOKEN_QUERY_PARAM) {
        return url.to_string();
    }
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == TOKEN_QUERY_PARAM {
                "***".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), v)
        })
        .collect();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}
