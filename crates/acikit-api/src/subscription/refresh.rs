// ── Subscription refresh loop ──
//
// Keeps controller-side subscriptions alive and rebuilds them when the
// WebSocket reconnects or the token recovers from a degraded spell.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::session::{Session, SessionState};

/// Wake-up interval while nothing is subscribed.
const IDLE_INTERVAL: Duration = Duration::from_secs(30);

pub(crate) async fn refresh_task(session: Session, cancel: CancellationToken) {
    let engine = session.subscriptions();
    let policy = session.config().reconnect.clone();
    let mut state_rx = session.watch_state();
    let mut last_state = *state_rx.borrow_and_update();
    let mut attempt: u32 = 0;
    let mut retry_at: Option<Instant> = None;

    loop {
        let now = Instant::now();
        let wake_at = if engine.resubscribe_pending() {
            retry_at.unwrap_or(now)
        } else {
            engine
                .next_deadline()
                .map_or(now + IDLE_INTERVAL, |deadline| {
                    deadline.checked_sub(engine.margin).unwrap_or(now)
                })
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                if matches!(last_state, SessionState::Degraded { .. }) && state == SessionState::LoggedIn {
                    info!("token recovered, rebuilding subscriptions");
                    engine.request_resubscribe();
                }
                last_state = state;
                continue;
            }
            () = engine.wake.notified() => {}
            () = tokio::time::sleep_until(wake_at) => {}
        }

        if engine.resubscribe_pending() {
            if retry_at.is_some_and(|at| Instant::now() < at) {
                continue;
            }
            engine.take_resubscribe();
            match engine.resubscribe(&session).await {
                Ok(()) => {
                    attempt = 0;
                    retry_at = None;
                }
                Err(e) => {
                    let delay = policy.delay(attempt);
                    attempt += 1;
                    warn!(error = %e, attempt, "resubscribe failed, will retry");
                    retry_at = Some(Instant::now() + delay);
                    engine.request_resubscribe();
                }
            }
            continue;
        }

        if let Err(e) = engine.refresh_expiring(&session).await {
            info!(error = %e, "subscription refresh failed, resubscribing");
            engine.request_resubscribe();
        }
    }

    debug!("subscription refresh loop exiting");
}
