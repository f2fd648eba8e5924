//! In-process WebSocket JSON-RPC peer for integration tests
//!
//! Binds a real TCP listener on `127.0.0.1:0` and hands each accepted,
//! upgraded socket to the test as a [`ServerConn`]. The test then plays the
//! server side by hand: read the client's requests, answer them in whatever
//! order it likes, push notifications, or drop the socket.
//!
//! # Limitations
//!
//! - **No automatic replies**: every request, including `initialize`, must be
//!   answered by the test (see [`MockServer::accept_handshaken`]).
//! - **Text frames only**: ping/pong and binary frames are skipped.
//! - **Fixed timeouts**: waits fail the test after [`WAIT`].

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

use wsrpc_client::{Endpoint, RpcClient, StaticToken};

/// Upper bound for any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(5);

/// Await `fut`, failing the test if it takes longer than [`WAIT`].
pub async fn within<F: std::future::Future>(fut: F) -> F::Output {
    tokio::time::timeout(WAIT, fut)
        .await
        .expect("timed out waiting in test")
}

pub struct MockServer {
    base_url: String,
    accepted: Arc<AtomicUsize>,
    conns_rx: mpsc::UnboundedReceiver<ServerConn>,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let (conns_tx, conns_rx) = mpsc::unbounded_channel();

        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let conns_tx = conns_tx.clone();
                tokio::spawn(async move {
                    if let Some(conn) = upgrade(stream).await {
                        let _ = conns_tx.send(conn);
                    }
                });
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            accepted,
            conns_rx,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// TCP connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Client pointed at this server with no token.
    pub fn client(&self) -> RpcClient {
        self.client_with_token(None)
    }

    pub fn client_with_token(&self, token: Option<&str>) -> RpcClient {
        let endpoint = Endpoint::new(&self.base_url, "/mcp/ws").unwrap();
        let credentials = match token {
            Some(token) => StaticToken::new(token),
            None => StaticToken::none(),
        };
        RpcClient::new(endpoint, Arc::new(credentials))
    }

    /// Wait for the next upgraded connection.
    pub async fn accept(&mut self) -> ServerConn {
        within(self.conns_rx.recv())
            .await
            .expect("mock server accept loop ended")
    }

    /// Wait up to `wait` for another connection.
    pub async fn try_accept(&mut self, wait: Duration) -> Option<ServerConn> {
        tokio::time::timeout(wait, self.conns_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Accept a connection and answer its `initialize` request.
    pub async fn accept_handshaken(&mut self) -> ServerConn {
        let mut conn = self.accept().await;
        let init = conn.recv().await;
        assert_eq!(init["method"], "initialize");
        conn.respond(&init, json!({"serverInfo": {"name": "mock"}}))
            .await;
        conn
    }
}

async fn upgrade(stream: TcpStream) -> Option<ServerConn> {
    let uri = Arc::new(Mutex::new(String::new()));
    let seen = Arc::clone(&uri);
    let callback = move |req: &Request, resp: Response| {
        *seen.lock().unwrap() = req.uri().to_string();
        Ok::<Response, ErrorResponse>(resp)
    };
    let ws = accept_hdr_async(stream, callback).await.ok()?;
    let uri = uri.lock().unwrap().clone();
    Some(ServerConn { ws, uri })
}

/// Server side of one client connection.
pub struct ServerConn {
    ws: WebSocketStream<TcpStream>,
    /// Request target of the upgrade request, e.g. `/mcp/ws?token=abc`.
    pub uri: String,
}

impl ServerConn {
    /// Next text frame, raw.
    pub async fn recv_text(&mut self) -> String {
        within(async {
            loop {
                match self.ws.next().await {
                    Some(Ok(Message::Text(text))) => return text.as_str().to_string(),
                    Some(Ok(Message::Close(_))) | None => panic!("client closed the socket"),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => panic!("mock server read error: {e}"),
                }
            }
        })
        .await
    }

    /// Next text frame, parsed.
    pub async fn recv(&mut self) -> Value {
        let text = self.recv_text().await;
        serde_json::from_str(&text).unwrap()
    }

    /// Wait until the client closes the socket.
    pub async fn expect_closed(&mut self) {
        within(async {
            loop {
                match self.ws.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_string().into()))
            .await
            .unwrap();
    }

    pub async fn send(&mut self, frame: Value) {
        self.send_raw(&frame.to_string()).await;
    }

    /// Answer `request` with `result`.
    pub async fn respond(&mut self, request: &Value, result: Value) {
        self.send(json!({"jsonrpc": "2.0", "id": request["id"], "result": result}))
            .await;
    }

    /// Answer `request` with an error payload.
    pub async fn respond_error(&mut self, request: &Value, error: Value) {
        self.send(json!({"jsonrpc": "2.0", "id": request["id"], "error": error}))
            .await;
    }

    pub async fn notify(&mut self, method: &str, params: Value) {
        self.send(json!({"jsonrpc": "2.0", "method": method, "params": params}))
            .await;
    }

    /// Close the socket from the server side.
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
