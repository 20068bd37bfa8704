//! Per-session event fan-out.
//!
//! The agent loop publishes `LoopEvent`s; any number of transports subscribe
//! per session. Subscribers are decoupled from the publisher: each one owns a
//! bounded queue, publishing never blocks, and a subscriber that falls behind
//! is dropped after a best-effort overflow notice rather than stalling the
//! turn.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};

use crate::agent::loop_events::LoopEvent;

/// Default per-subscriber queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
const OVERFLOW_NOTICE_GRACE: Duration = Duration::from_secs(1);

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<LoopEvent>,
}

#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<String, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a session's event stream. Returns the subscription id
    /// (for `unsubscribe`) and the receiving end. No replay: subscribers see
    /// only events published after this call.
    pub async fn subscribe(
        &self,
        session_id: &str,
        capacity: usize,
    ) -> (u64, mpsc::Receiver<LoopEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(Subscriber { id, tx });
        (id, rx)
    }

    pub async fn unsubscribe(&self, session_id: &str, id: u64) {
        let mut map = self.subscribers.write().await;
        if let Some(subs) = map.get_mut(session_id) {
            subs.retain(|s| s.id != id);
            if subs.is_empty() {
                map.remove(session_id);
            }
        }
    }

    pub async fn subscriber_count(&self, session_id: &str) -> usize {
        self.subscribers
            .read()
            .await
            .get(session_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Publish an event to every subscriber of the session. Slow subscribers
    /// whose queue is full are dropped; a final overflow error is pushed at
    /// them on a detached task so the publisher never waits.
    pub async fn publish(&self, session_id: &str, event: LoopEvent) {
        let mut dropped: Vec<Subscriber> = Vec::new();
        {
            let mut map = self.subscribers.write().await;
            let Some(subs) = map.get_mut(session_id) else {
                return;
            };
            subs.retain_mut(|sub| match sub.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        session_id,
                        subscriber = sub.id,
                        "subscriber queue overflow, dropping subscriber"
                    );
                    dropped.push(Subscriber {
                        id: sub.id,
                        tx: sub.tx.clone(),
                    });
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
            if subs.is_empty() {
                map.remove(session_id);
            }
        }

        for sub in dropped {
            tokio::spawn(async move {
                let notice = LoopEvent::error(
                    "SubscriberOverflow",
                    "event queue overflow; subscription dropped",
                );
                let _ = tokio::time::timeout(OVERFLOW_NOTICE_GRACE, sub.tx.send(notice)).await;
            });
        }
    }
}
