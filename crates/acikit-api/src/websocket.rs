//! Subscription WebSocket reader with auto-reconnect.
//!
//! The controller pushes every subscribed change over one socket at
//! `wss://<host>/socket<token>`. Each text frame names the subscription
//! ids it belongs to and carries the changed managed objects in
//! `imdata`. The reader hands each frame to the subscription engine and
//! finishes the hand-off before reading the next, so frames are never
//! split across a shutdown.
//!
//! On reconnect the engine is asked to resubscribe: subscription ids are
//! bound to the socket, and the old ones stop delivering once it drops.

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::session::Session;

// ── Frames ───────────────────────────────────────────────────────────

/// One decoded push frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SubscriptionFrame {
    pub(crate) subscription_ids: Vec<String>,
    pub(crate) imdata: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "subscriptionId", default)]
    subscription_id: Option<RawIds>,
    #[serde(default)]
    imdata: Vec<Value>,
}

/// Controllers send the id list as an array, older releases as a scalar.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawIds {
    Many(Vec<RawId>),
    One(RawId),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(u64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

/// Decode a text frame. Frames without a subscription id are ignored.
pub(crate) fn parse_frame(text: &str) -> Option<SubscriptionFrame> {
    let raw: RawFrame = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::debug!(error = %e, "failed to parse WebSocket frame");
            return None;
        }
    };

    let subscription_ids: Vec<String> = match raw.subscription_id {
        Some(RawIds::Many(ids)) => ids.into_iter().map(RawId::into_string).collect(),
        Some(RawIds::One(id)) => vec![id.into_string()],
        None => Vec::new(),
    };
    if subscription_ids.is_empty() {
        tracing::debug!("WebSocket frame without subscription id");
        return None;
    }

    Some(SubscriptionFrame {
        subscription_ids,
        imdata: raw.imdata,
    })
}

// ── WebSocketHandle ──────────────────────────────────────────────────

/// Handle to the running reader task.
pub(crate) struct WebSocketHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    connected: watch::Receiver<bool>,
}

impl WebSocketHandle {
    /// Spawn the reconnecting reader. The first connection attempt happens
    /// asynchronously.
    pub(crate) fn spawn(session: Session, cancel: CancellationToken) -> Self {
        let (connected_tx, connected) = watch::channel(false);
        let task = tokio::spawn(ws_loop(session, cancel.clone(), connected_tx));
        Self {
            cancel,
            task,
            connected,
        }
    }

    /// `true` while a connection is established.
    pub(crate) fn connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the reader and wait for it to exit.
    pub(crate) async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::debug!(error = %e, "WebSocket task ended abnormally");
        }
    }
}

// ── Background reconnection loop ─────────────────────────────────────

async fn ws_loop(session: Session, cancel: CancellationToken, connected: watch::Sender<bool>) {
    let policy = session.config().reconnect.clone();
    let mut attempt: u32 = 0;
    let mut connected_before = false;

    loop {
        let result = connect_and_read(&session, &cancel, &connected, &mut connected_before).await;
        connected.send_replace(false);

        let delay = match result {
            Ok(()) => {
                if cancel.is_cancelled() {
                    break;
                }
                tracing::info!("WebSocket disconnected cleanly, reconnecting");
                attempt = 0;
                policy.initial_delay
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "WebSocket error");
                if policy.exhausted(attempt) {
                    tracing::error!(attempt, "WebSocket reconnection limit reached, giving up");
                    break;
                }
                let delay = policy.delay(attempt);
                tracing::info!(
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    attempt,
                    "Waiting before reconnect"
                );
                attempt += 1;
                delay
            }
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    tracing::debug!("WebSocket loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

async fn connect_and_read(
    session: &Session,
    cancel: &CancellationToken,
    connected: &watch::Sender<bool>,
    connected_before: &mut bool,
) -> Result<(), Error> {
    let token = session.current_token().ok_or_else(|| Error::AuthFailure {
        message: "no session token for the WebSocket".into(),
    })?;
    let config = session.config();
    let url = config.websocket_url(token.token.expose())?;
    tracing::info!(host = url.host_str().unwrap_or_default(), "Connecting to WebSocket");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;
    let request = ClientRequestBuilder::new(uri).with_header("Cookie", token.token.cookie());
    let connector = config.transport().websocket_connector()?;

    let (ws_stream, _response) = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(()),
        result = tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector) => {
            result.map_err(|e| Error::WebSocketConnect(e.to_string()))?
        }
    };

    tracing::info!("WebSocket connected");
    connected.send_replace(true);
    if *connected_before {
        session.subscriptions().request_resubscribe();
    }
    *connected_before = true;

    let (mut write, mut read) = ws_stream.split();
    let mut keepalive = tokio::time::interval(config.keepalive_interval);
    keepalive.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(());
            }
            _ = keepalive.tick() => {
                write
                    .send(Message::Ping(Default::default()))
                    .await
                    .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(frame) = parse_frame(text.as_str()) {
                            session.subscriptions().dispatch(frame);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(code = %cf.code, reason = %cf.reason, "WebSocket close frame received");
                        } else {
                            tracing::info!("WebSocket close frame received (no payload)");
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                    None => {
                        tracing::info!("WebSocket stream ended");
                        return Ok(());
                    }
                    // Ping replies are automatic; binary and pong frames carry nothing.
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}
