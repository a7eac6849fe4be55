// ── Token refresh loop ──
//
// Wakes at a quarter of the token lifetime and refreshes it. Failures
// back off (base 1s, cap 60s) and publish `Degraded`; a rejected refresh
// falls back to a full login, and a rejected login marks the session
// `Failed`.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{Session, SessionState};
use crate::error::Error;

const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

pub(super) async fn token_refresh_task(session: Session, cancel: CancellationToken) {
    let mut attempt: u32 = 0;

    loop {
        let wait = if attempt == 0 {
            refresh_interval(&session)
        } else {
            session.config().refresh_backoff.delay(attempt - 1)
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(wait) => {}
        }

        match session.refresh_token().await {
            Ok(()) => {
                if attempt > 0 {
                    info!(attempt, "token refresh recovered");
                }
                attempt = 0;
                session.set_state(SessionState::LoggedIn);
            }
            Err(Error::AuthFailure { message }) => {
                warn!(%message, "token refresh rejected, logging in again");
                match session.authenticate(session.config().timeout).await {
                    Ok(()) => {
                        attempt = 0;
                        session.set_state(SessionState::LoggedIn);
                    }
                    Err(Error::AuthFailure { message }) => {
                        error!(%message, "controller rejected credentials");
                        session.set_state(SessionState::Failed);
                        break;
                    }
                    Err(e) => {
                        attempt += 1;
                        info!(error = %e, attempt, "login retry failed");
                        session.set_state(SessionState::Degraded { attempt });
                    }
                }
            }
            Err(e) => {
                attempt += 1;
                info!(error = %e, attempt, "token refresh failed, backing off");
                session.set_state(SessionState::Degraded { attempt });
            }
        }
    }

    tracing::debug!("token refresh loop exiting");
}

/// `token_lifetime / 4`, never below one second.
fn refresh_interval(session: &Session) -> Duration {
    session
        .token_lifetime()
        .map_or(MIN_REFRESH_INTERVAL, |lifetime| lifetime / 4)
        .max(MIN_REFRESH_INTERVAL)
}
