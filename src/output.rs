//! Stdout rendering for command results and `listen` events
//!
//! Results are printed as pretty JSON. `listen` emits NDJSON, one event per
//! line, so the stream can be piped into `jq` or a test script:
//!
//! ```json
//! {"event":"connected","url":"ws://127.0.0.1:8000/mcp/ws","timestamp":1704700001000}
//! {"event":"notification","method":"notifications/message","params":{"level":"info"},"timestamp":1704700002000}
//! {"event":"disconnected","timestamp":1704700003000}
//! ```

use std::io::{self, Write};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::error;

use wsrpc_client::Notification;

/// Events emitted by `wsrpc listen`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ListenEvent {
    Connected {
        url: String,
        timestamp: i64,
    },
    Notification {
        method: String,
        params: Value,
        timestamp: i64,
    },
    Disconnected {
        timestamp: i64,
    },
}

impl ListenEvent {
    pub fn connected(url: &str) -> Self {
        Self::Connected {
            url: url.to_string(),
            timestamp: now(),
        }
    }

    pub fn notification(notification: &Notification) -> Self {
        Self::Notification {
            method: notification.method.clone(),
            params: notification.params.clone(),
            timestamp: now(),
        }
    }

    pub fn disconnected() -> Self {
        Self::Disconnected { timestamp: now() }
    }

    /// Write this event to stdout as one JSON line.
    pub fn emit(&self) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize listen event: {}", e);
                return;
            }
        };

        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", json) {
            error!("Failed to write listen event to stdout: {}", e);
            return;
        }
        if let Err(e) = stdout.flush() {
            error!("Failed to flush stdout: {}", e);
        }
    }
}

fn now() -> i64 {
    Utc::now().timestamp_millis()
}

/// Print a call result as pretty JSON.
pub fn print_value(value: &Value) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    let rendered = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    writeln!(stdout, "{}", rendered)
}

/// Mask all but the first few characters of a token for display.
pub fn mask_token(token: &str) -> String {
    const SHOWN: usize = 4;
    let visible: String = token.chars().take(SHOWN).collect();
    if token.chars().count() <= SHOWN {
        "*".repeat(token.chars().count())
    } else {
        format!("{visible}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_notification_event_shape() {
        let event = ListenEvent::notification(&Notification {
            method: "progress".to_string(),
            params: json!({"pct": 50}),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "notification");
        assert_eq!(value["method"], "progress");
        assert_eq!(value["params"], json!({"pct": 50}));
        assert!(value["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_connected_and_disconnected_tags() {
        let connected = serde_json::to_value(ListenEvent::connected("ws://h/mcp/ws")).unwrap();
        assert_eq!(connected["event"], "connected");
        assert_eq!(connected["url"], "ws://h/mcp/ws");

        let disconnected = serde_json::to_value(ListenEvent::disconnected()).unwrap();
        assert_eq!(disconnected["event"], "disconnected");
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("abcdefgh"), "abcd…");
        assert_eq!(mask_token("abc"), "***");
        assert_eq!(mask_token(""), "");
    }
}
