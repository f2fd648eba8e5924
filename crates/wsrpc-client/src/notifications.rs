//! Fan-out of server-initiated notifications to registered listeners.
//!
//! Listeners are plain callbacks invoked on the connection's I/O task. Each
//! registration is tracked as its own entry (registering the same closure twice
//! yields two deliveries) and is removed through the returned
//! [`NotificationSubscription`], never by value.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};

use tracing::{trace, warn};

use crate::protocol::Notification;

/// Callback type for notification listeners.
pub type NotificationHandler = Arc<dyn Fn(&Notification) + Send + Sync + 'static>;

#[derive(Default)]
struct Entries {
    next_id: u64,
    handlers: Vec<(u64, NotificationHandler)>,
}

/// Registry of notification listeners shared between the client handle and
/// the connection task.
#[derive(Default)]
pub struct NotificationRegistry {
    entries: Mutex<Entries>,
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` and return the capability that removes it again.
    pub fn subscribe(self: &Arc<Self>, handler: NotificationHandler) -> NotificationSubscription {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let id = entries.next_id;
        entries.next_id += 1;
        entries.handlers.push((id, handler));

        NotificationSubscription {
            registry: Arc::downgrade(self),
            id,
        }
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.handlers.len();
        entries.handlers.retain(|(entry_id, _)| *entry_id != id);
        entries.handlers.len() != before
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .handlers
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `notification` to every listener registered right now.
    ///
    /// The listener list is snapshotted before delivery, so a listener may
    /// subscribe or unsubscribe from inside its callback. A panicking
    /// listener is logged and skipped; the remaining listeners still run.
    ///
    /// Returns how many listeners completed without panicking.
    pub fn dispatch(&self, notification: &Notification) -> usize {
        let snapshot: Vec<NotificationHandler> = {
            let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.handlers.iter().map(|(_, h)| Arc::clone(h)).collect()
        };

        trace!(
            "Dispatching '{}' to {} listener(s)",
            notification.method,
            snapshot.len()
        );

        let mut delivered = 0;
        for handler in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(notification))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    warn!(
                        "Notification listener panicked on '{}': {}",
                        notification.method,
                        panic_message(panic.as_ref())
                    );
                }
            }
        }
        delivered
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// Deregistration capability returned by
/// [`RpcClient::on_notification`](crate::RpcClient::on_notification).
///
/// Dropping the subscription does **not** remove the listener; call
/// [`unsubscribe`](Self::unsubscribe).
#[derive(Debug)]
pub struct NotificationSubscription {
    registry: Weak<NotificationRegistry>,
    id: u64,
}

impl NotificationSubscription {
    /// Remove the listener. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(self.id),
            None => false,
        }
    }
}
