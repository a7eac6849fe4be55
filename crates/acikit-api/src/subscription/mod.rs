// ── Subscription engine ──
//
// Maps controller subscription ids onto per-URL event queues. A
// subscription starts with a GET carrying `subscription=yes`; the
// response's items become the snapshot and its `subscriptionId` routes
// later WebSocket frames to the same queue. Ids are bound to the socket,
// so a reconnect rebuilds every subscription and drops a `Reset` marker
// into each queue.
//
// Lock order: `early` before any queue state. The WebSocket reader only
// learns about an id under `early`, which keeps snapshot events ahead of
// live ones even when a frame beats the GET response.

mod queue;
mod refresh;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{Mutex, Notify, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::Error;
use crate::query;
use crate::session::{Session, SessionConfig};
use crate::websocket::{SubscriptionFrame, WebSocketHandle};

use queue::{EventQueue, PopError};
pub use queue::SubscriptionEvent;
pub(crate) use refresh::refresh_task;

/// Frames for ids nobody has claimed yet are held this long.
const EARLY_FRAME_TTL: Duration = Duration::from_secs(10);

struct EarlyFrames {
    received: Instant,
    items: Vec<Value>,
}

pub(crate) struct SubscriptionEngine {
    queues: DashMap<String, Arc<EventQueue>>,
    ids: DashMap<String, String>,
    early: std::sync::Mutex<HashMap<String, EarlyFrames>>,
    /// Serialises subscribe, unsubscribe, refresh and resubscribe.
    ops: Mutex<()>,
    socket: Mutex<Option<WebSocketHandle>>,
    pub(crate) wake: Notify,
    resubscribe_pending: AtomicBool,
    cancel: CancellationToken,
    closed: AtomicBool,
    capacity: usize,
    ttl: Duration,
    pub(crate) margin: Duration,
    connect_timeout: Duration,
}

impl SubscriptionEngine {
    pub(crate) fn new(config: &SessionConfig, cancel: CancellationToken) -> Self {
        Self {
            queues: DashMap::new(),
            ids: DashMap::new(),
            early: std::sync::Mutex::new(HashMap::new()),
            ops: Mutex::new(()),
            socket: Mutex::new(None),
            wake: Notify::new(),
            resubscribe_pending: AtomicBool::new(false),
            cancel,
            closed: AtomicBool::new(false),
            capacity: config.queue_capacity,
            ttl: config.subscription_ttl,
            margin: config.subscription_safety_margin,
            connect_timeout: config.timeout,
        }
    }

    fn early(&self) -> std::sync::MutexGuard<'_, HashMap<String, EarlyFrames>> {
        self.early.lock().expect("early frame lock poisoned")
    }

    fn queue(&self, url: &str) -> Option<Arc<EventQueue>> {
        self.queues.get(url).map(|q| Arc::clone(q.value()))
    }

    // ── Socket ───────────────────────────────────────────────────────

    /// Start the WebSocket reader unless one is already running.
    ///
    /// Returns the reader's connection flag.
    pub(crate) async fn ensure_socket(&self, session: &Session) -> Option<watch::Receiver<bool>> {
        if self.closed.load(Ordering::Acquire) || session.config().signs_every_request() {
            return None;
        }
        let mut socket = self.socket.lock().await;
        if let Some(handle) = socket.as_ref().filter(|h| !h.is_finished()) {
            return Some(handle.connected());
        }
        if let Some(stale) = socket.take() {
            stale.shutdown().await;
        }
        debug!("starting subscription WebSocket");
        let handle = WebSocketHandle::spawn(session.clone(), self.cancel.child_token());
        let connected = handle.connected();
        *socket = Some(handle);
        Some(connected)
    }

    async fn close_socket(&self) {
        let handle = self.socket.lock().await.take();
        if let Some(handle) = handle {
            debug!("closing subscription WebSocket");
            handle.shutdown().await;
        }
    }

    /// Called by the reader after it reconnects.
    pub(crate) fn request_resubscribe(&self) {
        self.resubscribe_pending.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub(crate) fn take_resubscribe(&self) -> bool {
        self.resubscribe_pending.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn resubscribe_pending(&self) -> bool {
        self.resubscribe_pending.load(Ordering::Acquire)
    }

    // ── Subscribe / unsubscribe ──────────────────────────────────────

    pub(crate) async fn subscribe(&self, session: &Session, url: &str, only_new: bool) -> Result<(), Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        let _ops = self.ops.lock().await;

        if let Some(queue) = self.queue(url) {
            queue.lock().consumers += 1;
            debug!(url, "subscription shared with an existing consumer");
            return Ok(());
        }

        if let Some(mut connected) = self.ensure_socket(session).await {
            let wait = connected.wait_for(|up| *up);
            if tokio::time::timeout(self.connect_timeout, wait).await.is_err() {
                warn!(url, "WebSocket not connected yet, subscribing anyway");
            }
        }

        let resp = session
            .get_single(&query::with_param(url, "subscription", "yes"))
            .await?;
        let id = resp.subscription_id.clone().ok_or_else(|| Error::Deserialization {
            message: "subscription response carried no subscriptionId".into(),
            body: resp.json().to_string(),
        })?;

        let queue = Arc::new(EventQueue::new(id.clone(), only_new, self.ttl, self.capacity));
        if !only_new {
            let mut state = queue.lock();
            state
                .events
                .extend(resp.imdata.into_iter().map(|item| SubscriptionEvent::Snapshot(mark_created(item))));
        }
        self.queues.insert(url.to_owned(), Arc::clone(&queue));
        self.claim_id(&id, url, &queue, None);

        info!(url, subscription_id = %id, "subscribed");
        self.wake.notify_one();
        Ok(())
    }

    /// Route `id` to `url`, appending `marker` and any frames that arrived
    /// before the id was known.
    fn claim_id(&self, id: &str, url: &str, queue: &EventQueue, marker: Option<SubscriptionEvent>) {
        {
            let mut early = self.early();
            let held = early.remove(id).map(|f| f.items).unwrap_or_default();
            self.ids.insert(id.to_owned(), url.to_owned());

            let mut state = queue.lock();
            state.subscription_id = id.to_owned();
            state.refresh_deadline = Instant::now() + self.ttl;
            state.events.extend(marker);
            state
                .events
                .extend(held.into_iter().map(SubscriptionEvent::Change));
        }
        queue.notify_readable();
    }

    pub(crate) async fn unsubscribe(&self, session: &Session, url: &str) -> Result<(), Error> {
        let _ops = self.ops.lock().await;
        let Some(queue) = self.queue(url) else {
            return Err(Error::InvalidArgument(format!("not subscribed to {url}")));
        };
        {
            let mut state = queue.lock();
            state.consumers = state.consumers.saturating_sub(1);
            if state.consumers > 0 {
                return Ok(());
            }
        }

        self.queues.remove(url);
        let id = queue.subscription_id();
        {
            let _early = self.early();
            self.ids.remove(&id);
        }
        queue.close();
        info!(url, subscription_id = %id, "unsubscribed");

        if let Err(e) = session
            .get_single(&query::with_param(url, "subscription", "no"))
            .await
        {
            debug!(url, error = %e, "unsubscribe request failed (controller will expire it)");
        }

        if self.queues.is_empty() {
            self.close_socket().await;
        }
        Ok(())
    }

    /// Re-issue every subscription on the current socket.
    ///
    /// Each queue receives a [`SubscriptionEvent::Reset`] marker; no new
    /// snapshot is delivered.
    pub(crate) async fn resubscribe(&self, session: &Session) -> Result<(), Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        let _ops = self.ops.lock().await;
        if self.queues.is_empty() {
            return Ok(());
        }
        self.ensure_socket(session).await;

        let urls: Vec<String> = self.queues.iter().map(|e| e.key().clone()).collect();
        let mut first_error = None;
        for url in urls {
            let Some(queue) = self.queue(&url) else { continue };
            let result = session
                .get_single(&query::with_param(&url, "subscription", "yes"))
                .await;
            match result.map(|r| r.subscription_id) {
                Ok(Some(id)) => {
                    let old = queue.subscription_id();
                    {
                        let _early = self.early();
                        self.ids.remove(&old);
                    }
                    self.claim_id(&id, &url, &queue, Some(SubscriptionEvent::Reset));
                    debug!(url, old_id = %old, new_id = %id, "resubscribed");
                }
                Ok(None) => {
                    warn!(url, "resubscribe response carried no subscriptionId");
                    first_error.get_or_insert(Error::Deserialization {
                        message: "resubscribe response carried no subscriptionId".into(),
                        body: String::new(),
                    });
                }
                Err(e) => {
                    warn!(url, error = %e, "resubscribe failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Refresh subscriptions whose deadline falls within the safety margin.
    pub(crate) async fn refresh_expiring(&self, session: &Session) -> Result<(), Error> {
        let _ops = self.ops.lock().await;
        let horizon = Instant::now() + self.margin;
        let due: Vec<Arc<EventQueue>> = self
            .queues
            .iter()
            .filter(|e| e.value().lock().refresh_deadline <= horizon)
            .map(|e| Arc::clone(e.value()))
            .collect();

        for queue in due {
            let id = queue.subscription_id();
            let url = format!("/api/subscriptionRefresh.json?id={id}");
            session.get_single(&url).await?;
            queue.lock().refresh_deadline = Instant::now() + self.ttl;
            trace!(subscription_id = %id, "subscription refreshed");
        }
        Ok(())
    }

    /// Earliest refresh deadline over all queues.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.queues
            .iter()
            .map(|e| e.value().lock().refresh_deadline)
            .min()
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Append a frame's items to every queue it names. Never waits on a
    /// consumer; see [`EventQueue::offer`].
    pub(crate) fn dispatch(&self, frame: SubscriptionFrame) {
        for id in &frame.subscription_ids {
            let url = {
                let mut early = self.early();
                match self.ids.get(id) {
                    Some(url) => url.value().clone(),
                    None => {
                        hold_early(&mut early, id, &frame.imdata, self.capacity);
                        continue;
                    }
                }
            };
            let Some(queue) = self.queue(&url) else { continue };
            if queue.subscription_id() != *id {
                trace!(subscription_id = %id, "dropping frame for replaced subscription");
                continue;
            }
            for item in &frame.imdata {
                queue.offer(SubscriptionEvent::Change(item.clone()));
            }
        }
    }

    // ── Consumers ────────────────────────────────────────────────────

    fn missing(&self, url: &str) -> Error {
        if self.closed.load(Ordering::Acquire) {
            Error::Closed
        } else {
            Error::NoEvent { url: url.to_owned() }
        }
    }

    pub(crate) fn is_subscribed(&self, url: &str) -> bool {
        self.queues.contains_key(url)
    }

    pub(crate) fn event_count(&self, url: &str) -> usize {
        self.queue(url).map_or(0, |q| q.len())
    }

    pub(crate) fn get_event(&self, url: &str) -> Result<SubscriptionEvent, Error> {
        let queue = self.queue(url).ok_or_else(|| self.missing(url))?;
        queue.try_pop().map_err(|e| match e {
            PopError::Empty => Error::NoEvent { url: url.to_owned() },
            PopError::Closed => Error::Closed,
        })
    }

    pub(crate) async fn next_event(&self, url: &str) -> Result<SubscriptionEvent, Error> {
        let queue = self.queue(url).ok_or_else(|| self.missing(url))?;
        queue.pop().await.map_err(|_| Error::Closed)
    }

    pub(crate) async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for entry in &self.queues {
            entry.value().close();
        }
        self.queues.clear();
        self.ids.clear();
        self.early().clear();
        self.close_socket().await;
    }
}

fn hold_early(early: &mut HashMap<String, EarlyFrames>, id: &str, items: &[Value], cap: usize) {
    let now = Instant::now();
    early.retain(|_, f| now.duration_since(f.received) < EARLY_FRAME_TTL);
    let entry = early.entry(id.to_owned()).or_insert_with(|| EarlyFrames {
        received: now,
        items: Vec::new(),
    });
    let room = cap.saturating_sub(entry.items.len());
    entry.items.extend(items.iter().take(room).cloned());
    trace!(subscription_id = %id, "holding frame for unknown subscription");
}

/// Snapshot items are reported as creations.
fn mark_created(mut item: Value) -> Value {
    if let Some(attributes) = item
        .as_object_mut()
        .and_then(|obj| obj.values_mut().next())
        .and_then(|mo| mo.get_mut("attributes"))
        .and_then(Value::as_object_mut)
    {
        attributes.insert("status".into(), Value::String("created".into()));
    }
    item
}

// ── Session API ──────────────────────────────────────────────────────

impl Session {
    /// Subscribe to a query URL.
    ///
    /// Unless `only_new` is set, the current result set is queued first as
    /// [`SubscriptionEvent::Snapshot`] items with status `created`. A URL
    /// already subscribed is shared and reference counted.
    pub async fn subscribe(&self, url: &str, only_new: bool) -> Result<(), Error> {
        if !self.config().subscription_enabled || self.config().signs_every_request() {
            return Err(Error::InvalidArgument(
                "subscriptions are disabled for this session".into(),
            ));
        }
        self.subscriptions().subscribe(self, url, only_new).await
    }

    /// Drop one consumer of `url`; the last one cancels the subscription.
    pub async fn unsubscribe(&self, url: &str) -> Result<(), Error> {
        self.subscriptions().unsubscribe(self, url).await
    }

    /// Rebuild every subscription now. Queues receive a reset marker.
    pub async fn resubscribe(&self) -> Result<(), Error> {
        self.subscriptions().resubscribe(self).await
    }

    pub fn is_subscribed(&self, url: &str) -> bool {
        self.subscriptions().is_subscribed(url)
    }

    /// `true` if at least one event is queued for `url`.
    pub fn has_events(&self, url: &str) -> bool {
        self.subscriptions().event_count(url) > 0
    }

    pub fn get_event_count(&self, url: &str) -> usize {
        self.subscriptions().event_count(url)
    }

    /// Pop the oldest event for `url` without waiting.
    ///
    /// Returns [`Error::NoEvent`] when the queue is empty and
    /// [`Error::Closed`] once the session is closed.
    pub fn get_event(&self, url: &str) -> Result<SubscriptionEvent, Error> {
        self.subscriptions().get_event(url)
    }

    /// Wait for the next event for `url`.
    pub async fn next_event(&self, url: &str) -> Result<SubscriptionEvent, Error> {
        self.subscriptions().next_event(url).await
    }
}
