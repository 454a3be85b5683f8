use crate::query_scheduler::JobStatus;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Buffered events per subscriber before publishes start dropping.
pub const SUBSCRIBER_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Failed,
}

/// Notification payloads fanned out to subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    ConnectionState {
        target: String,
        state: ConnectionState,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    QueryJobCompleted {
        job_id: String,
        target: String,
        status: JobStatus,
        finished_at: DateTime<Utc>,
        duration_ms: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Whether a result landed in the result store for this job.
        stored: bool,
    },
}

/// A published event, stamped at publish time.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// Fan-out bus for lifecycle notifications.
///
/// Delivery is intentionally lossy: every subscriber gets a bounded buffer
/// and a full buffer drops the event for that subscriber only. A slow
/// consumer can never stall a publisher.
#[derive(Debug, Default)]
pub struct EventHub {
    subscribers: DashMap<u64, mpsc::Sender<Event>>,
    next_id: AtomicU64,
}

impl EventHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscribe(self: &Arc<Self>) -> (mpsc::Receiver<Event>, Unsubscribe) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.subscribers.insert(id, tx);
        debug!("Event subscriber {} attached", id);
        (
            rx,
            Unsubscribe {
                hub: Arc::clone(self),
                id,
                done: AtomicBool::new(false),
            },
        )
    }

    /// Offer the event to every subscriber without blocking.
    pub fn publish(&self, payload: EventPayload) {
        let event = Event {
            at: Utc::now(),
            payload,
        };

        let mut closed = Vec::new();
        for entry in self.subscribers.iter() {
            match entry.value().try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    trace!("Event dropped for slow subscriber {}", entry.key());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    closed.push(*entry.key());
                }
            }
        }
        for id in closed {
            self.subscribers.remove(&id);
            debug!("Event subscriber {} removed (receiver gone)", id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// Detaches a subscriber from the hub. Calling it twice is a no-op, and a
/// dropped handle unsubscribes implicitly.
pub struct Unsubscribe {
    hub: Arc<EventHub>,
    id: u64,
    done: AtomicBool,
}

impl Unsubscribe {
    pub fn unsubscribe(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        self.hub.subscribers.remove(&self.id);
        debug!("Event subscriber {} detached", self.id);
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
