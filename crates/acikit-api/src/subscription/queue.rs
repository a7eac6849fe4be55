// Per-URL event queue.
//
// A bounded FIFO shared by every consumer of one subscription URL. The
// WebSocket reader never waits on it: a live event that finds the queue
// full discards the backlog and leaves a `Reset` marker in its place.
// Consumers either poll (`try_pop`) or await (`pop`). Closing wakes every
// waiter.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Notify;
use tokio::time::Instant;

/// One entry delivered to a subscription consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    /// Item from the initial snapshot, translated into a "created" event.
    Snapshot(Value),
    /// Change pushed by the controller over the WebSocket.
    Change(Value),
    /// Continuity was lost, either because the subscription was rebuilt
    /// after a reconnect or because the queue overflowed. Deltas between
    /// the last event before this marker and the first after it may be
    /// missing.
    Reset,
}

impl SubscriptionEvent {
    /// The managed-object item (`{className: {attributes: ...}}`), if any.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Snapshot(v) | Self::Change(v) => Some(v),
            Self::Reset => None,
        }
    }

    pub fn is_reset(&self) -> bool {
        matches!(self, Self::Reset)
    }
}

/// Why a non-blocking pop produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PopError {
    Empty,
    Closed,
}

pub(crate) struct QueueState {
    pub(crate) subscription_id: String,
    pub(crate) events: VecDeque<SubscriptionEvent>,
    pub(crate) refresh_deadline: Instant,
    pub(crate) only_new: bool,
    pub(crate) consumers: usize,
    closed: bool,
}

pub(crate) struct EventQueue {
    state: Mutex<QueueState>,
    readable: Notify,
    capacity: usize,
}

impl EventQueue {
    pub(crate) fn new(subscription_id: String, only_new: bool, ttl: Duration, capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                subscription_id,
                events: VecDeque::new(),
                refresh_deadline: Instant::now() + ttl,
                only_new,
                consumers: 1,
                closed: false,
            }),
            readable: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().expect("subscription queue lock poisoned")
    }

    /// Wake consumers after events were appended under [`lock`](Self::lock).
    pub(crate) fn notify_readable(&self) {
        self.readable.notify_waiters();
    }

    pub(crate) fn subscription_id(&self) -> String {
        self.lock().subscription_id.clone()
    }

    /// Append a live event without waiting.
    ///
    /// A full queue drops its backlog and restarts from a `Reset` marker.
    /// Returns `false` when the backlog was dropped. Events offered to a
    /// closed queue are discarded.
    pub(crate) fn offer(&self, event: SubscriptionEvent) -> bool {
        let mut state = self.lock();
        if state.closed {
            return true;
        }
        let kept = state.events.len() < self.capacity;
        if !kept {
            let dropped = state.events.len();
            state.events.clear();
            state.events.push_back(SubscriptionEvent::Reset);
            tracing::warn!(
                subscription_id = %state.subscription_id,
                dropped,
                "subscription queue overflowed, backlog replaced by reset marker"
            );
        }
        state.events.push_back(event);
        drop(state);
        self.readable.notify_waiters();
        kept
    }

    pub(crate) fn try_pop(&self) -> Result<SubscriptionEvent, PopError> {
        let mut state = self.lock();
        match state.events.pop_front() {
            Some(event) => Ok(event),
            None if state.closed => Err(PopError::Closed),
            None => Err(PopError::Empty),
        }
    }

    /// Wait for the next event; `Err` once the queue is closed and drained.
    pub(crate) async fn pop(&self) -> Result<SubscriptionEvent, PopError> {
        loop {
            let readable = self.readable.notified();
            match self.try_pop() {
                Err(PopError::Empty) => readable.await,
                other => return other,
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub(crate) fn close(&self) {
        self.lock().closed = true;
        self.readable.notify_waiters();
    }
}
