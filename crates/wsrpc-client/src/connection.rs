//! One WebSocket transport and the background task that owns it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Connection                            │
//! │                                                               │
//! │  ┌──────────────┐        ┌────────────────────────────────┐  │
//! │  │  Handle      │        │  I/O task                       │  │
//! │  │              │        │                                 │  │
//! │  │  request() ──┼──cmd──▶│  WebSocket read/write loop      │  │
//! │  │  close()     │  chan  │                                 │  │
//! │  │              │        │  Route: response → tracker      │  │
//! │  │              │        │         notification → registry │  │
//! │  └──────────────┘        └────────────────────────────────┘  │
//! │                                                               │
//! │  Lifecycle: closed flag + disconnect waiters                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The I/O task is the only place that touches the socket, the request
//! tracker, or the waiter list on close, so the close path (reject pending,
//! release waiters) cannot interleave with a new registration.

use std::sync::{Arc, Mutex};

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use wsrpc_core::prelude::*;

use crate::notifications::NotificationRegistry;
use crate::protocol::{parse_frame, InboundFrame, RequestTracker, ResponseSender, RpcRequest};

/// Longest frame excerpt written to the debug log.
const LOG_PREVIEW_CHARS: usize = 120;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// Internal command type
// ---------------------------------------------------------------------------

/// Messages sent from connection handles to the I/O task.
enum ConnectionCommand {
    /// Send a request frame and deliver the outcome to `response_tx`.
    SendRequest {
        method: String,
        params: Value,
        response_tx: ResponseSender,
    },
    /// Send a Close frame and run the close path.
    Close,
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Lifecycle {
    closed: bool,
    waiters: Vec<oneshot::Sender<()>>,
}

// ---------------------------------------------------------------------------
// Connection handle
// ---------------------------------------------------------------------------

/// Cheap, clonable handle to one live (or dead) transport.
#[derive(Clone)]
pub(crate) struct Connection {
    cmd_tx: mpsc::Sender<ConnectionCommand>,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("open", &self.is_open())
            .finish()
    }
}

impl Connection {
    /// Take ownership of `ws` and spawn its I/O task.
    ///
    /// `on_closed` runs exactly once on the I/O task after pending calls have
    /// been rejected and before disconnect waiters are released.
    pub(crate) fn spawn<S, F>(
        ws: WebSocketStream<S>,
        notifications: Arc<NotificationRegistry>,
        command_buffer: usize,
        on_closed: F,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel(command_buffer.max(1));
        let lifecycle = Arc::new(Mutex::new(Lifecycle::default()));

        tokio::spawn(run_io_task(
            ws,
            cmd_rx,
            notifications,
            Arc::clone(&lifecycle),
            on_closed,
        ));

        Self { cmd_tx, lifecycle }
    }

    /// `false` once the close path has started.
    pub(crate) fn is_open(&self) -> bool {
        !self.lock_lifecycle().closed
    }

    /// Send a request and wait for its correlated response.
    ///
    /// # Errors
    ///
    /// - [`Error::TransportNotOpen`] if the transport is closed or closing;
    ///   nothing is sent.
    /// - [`Error::Transport`] if writing the frame failed.
    /// - [`Error::ConnectionClosed`] if the transport closed before the
    ///   response arrived.
    /// - [`Error::Remote`] if the peer answered with an error payload.
    pub(crate) async fn request(&self, method: &str, params: Value) -> Result<Value> {
        if !self.is_open() {
            return Err(Error::TransportNotOpen);
        }

        let (response_tx, response_rx) = oneshot::channel();
        self.cmd_tx
            .send(ConnectionCommand::SendRequest {
                method: method.to_string(),
                params,
                response_tx,
            })
            .await
            .map_err(|_| Error::TransportNotOpen)?;

        response_rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Register a one-shot waiter for the close event.
    ///
    /// Returns `None` when the transport is already closed or closing.
    pub(crate) fn disconnect_waiter(&self) -> Option<oneshot::Receiver<()>> {
        let mut lifecycle = self.lock_lifecycle();
        if lifecycle.closed {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        lifecycle.waiters.push(tx);
        Some(rx)
    }

    /// Ask the I/O task to close the transport and wait until the close path
    /// has run.
    pub(crate) async fn close(&self) {
        let Some(waiter) = self.disconnect_waiter() else {
            return;
        };
        // A send error means the task already exited and released the waiter.
        let _ = self.cmd_tx.send(ConnectionCommand::Close).await;
        let _ = waiter.await;
    }

    fn lock_lifecycle(&self) -> std::sync::MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Opening
// ---------------------------------------------------------------------------

/// Open a WebSocket to `url`.
pub(crate) async fn connect_ws(url: &Url) -> Result<WsStream> {
    let (ws_stream, _response) = connect_async(url.as_str())
        .await
        .map_err(|err| Error::transport(format!("Failed to open WebSocket: {err}")))?;
    Ok(ws_stream)
}

// ---------------------------------------------------------------------------
// I/O task
// ---------------------------------------------------------------------------

async fn run_io_task<S, F>(
    ws: WebSocketStream<S>,
    mut cmd_rx: mpsc::Receiver<ConnectionCommand>,
    notifications: Arc<NotificationRegistry>,
    lifecycle: Arc<Mutex<Lifecycle>>,
    on_closed: F,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    F: FnOnce() + Send + 'static,
{
    let (mut ws_sink, mut ws_stream) = ws.split();
    let mut tracker = RequestTracker::new();

    let reason = loop {
        tokio::select! {
            // ── Incoming WebSocket message ───────────────────────────────
            frame = ws_stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_ws_text(text.as_str(), &mut tracker, &notifications);
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        break format!("peer sent Close ({frame:?})");
                    }
                    Some(Ok(_)) => {
                        // Ping/Pong/Binary: ignore
                    }
                    Some(Err(err)) => {
                        break format!("read error: {err}");
                    }
                    None => {
                        break "stream ended".to_string();
                    }
                }
            }

            // ── Outgoing command from a handle ───────────────────────────
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ConnectionCommand::SendRequest { method, params, response_tx }) => {
                        handle_send_request(method, params, response_tx, &mut tracker, &mut ws_sink)
                            .await;
                    }
                    Some(ConnectionCommand::Close) => {
                        send_close(&mut ws_sink).await;
                        break "closed by client".to_string();
                    }
                    None => {
                        // Every handle was dropped.
                        send_close(&mut ws_sink).await;
                        break "all handles dropped".to_string();
                    }
                }
            }
        }
    };

    info!("Connection closed: {}", reason);

    // ── Close path ──────────────────────────────────────────────────────
    let waiters = {
        let mut lifecycle = lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        lifecycle.closed = true;
        std::mem::take(&mut lifecycle.waiters)
    };

    // Requests that were queued but never written.
    cmd_rx.close();
    let mut unsent = 0;
    while let Ok(cmd) = cmd_rx.try_recv() {
        if let ConnectionCommand::SendRequest { response_tx, .. } = cmd {
            let _ = response_tx.send(Err(Error::ConnectionClosed));
            unsent += 1;
        }
    }

    let rejected = tracker.reject_all();
    if rejected + unsent > 0 {
        debug!(
            "Rejected {} pending and {} queued call(s) on close",
            rejected, unsent
        );
    }

    on_closed();

    for waiter in waiters {
        let _ = waiter.send(());
    }
}

/// Route an incoming text frame to the tracker or the notification registry.
fn handle_ws_text(text: &str, tracker: &mut RequestTracker, notifications: &NotificationRegistry) {
    match parse_frame(text) {
        Ok(InboundFrame::Response(response)) => {
            let id = response.id;
            if !tracker.complete(id, response.into_result()) {
                debug!("Ignoring response for unknown request id {}", id);
            }
        }
        Ok(InboundFrame::Notification(notification)) => {
            notifications.dispatch(&notification);
        }
        Ok(InboundFrame::Unrecognized(_)) => {
            debug!("Ignoring unroutable frame: {}", preview(text));
        }
        Err(malformed) => {
            debug!(
                "Dropping malformed frame ({}): {}",
                malformed.reason,
                preview(text)
            );
        }
    }
}

/// Register a pending call, serialize it, and write it to the socket.
///
/// Calls whose caller already stopped waiting are pruned first.
///
/// On failure the just-registered call is removed again and the error is
/// delivered to the caller.
async fn handle_send_request<S>(
    method: String,
    params: Value,
    response_tx: ResponseSender,
    tracker: &mut RequestTracker,
    ws_sink: &mut SplitSink<WebSocketStream<S>, WsMessage>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let pruned = tracker.prune_abandoned();
    if pruned > 0 {
        debug!("Dropped {} abandoned call(s)", pruned);
    }

    let id = tracker.register(response_tx);
    let request = RpcRequest::new(id, method, params);

    let outcome = match serde_json::to_string(&request) {
        Ok(json) => {
            trace!("→ {}", preview(&json));
            ws_sink
                .send(WsMessage::Text(json.into()))
                .await
                .map_err(|err| Error::transport(format!("Failed to send request: {err}")))
        }
        Err(err) => Err(err.into()),
    };

    if let Err(err) = outcome {
        warn!("Request {} ('{}') not sent: {}", id, request.method, err);
        if let Some(response_tx) = tracker.remove(id) {
            let _ = response_tx.send(Err(err));
        }
    }
}

/// Send a WebSocket Close frame, ignoring any write errors.
async fn send_close<S>(ws_sink: &mut SplitSink<WebSocketStream<S>, WsMessage>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let _ = ws_sink.send(WsMessage::Close(None)).await;
    let _ = ws_sink.close().await;
}

fn preview(text: &str) -> String {
    if text.chars().count() <= LOG_PREVIEW_CHARS {
        text.to_string()
    } else {
        let head: String = text.chars().take(LOG_PREVIEW_CHARS).collect();
        format!("{head}…")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
