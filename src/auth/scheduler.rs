// Expiry-driven refresh scheduling

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use super::claims::decode_claims;
use super::manager::WeakSessionManager;
use super::types::Session;

/// How long to wait before refreshing a token that expires at `exp`.
///
/// Zero when the token is already expired or expires within `lead`.
pub fn refresh_delay(exp: i64, now: DateTime<Utc>, lead: Duration) -> Duration {
    let exp_ms = exp.saturating_mul(1000);
    let now_ms = now.timestamp_millis();

    if exp_ms <= now_ms {
        return Duration::ZERO;
    }

    let lead_ms = i64::try_from(lead.as_millis()).unwrap_or(i64::MAX);
    let delay_ms = exp_ms.saturating_sub(now_ms).saturating_sub(lead_ms);
    Duration::from_millis(delay_ms.max(0) as u64)
}

/// Deadline for the given access token, if it has a readable expiry
fn plan(access_token: Option<&str>, lead: Duration) -> Option<Instant> {
    let token = access_token.filter(|t| !t.is_empty())?;

    let claims = match decode_claims(token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(error = %e, "Access token unreadable, refresh not scheduled");
            return None;
        }
    };

    let Some(exp) = claims.exp else {
        tracing::debug!("Access token has no exp claim, refresh not scheduled");
        return None;
    };

    let now = Utc::now();
    let delay = refresh_delay(exp, now, lead);
    if exp <= now.timestamp() {
        tracing::info!(exp, "Access token expired, refreshing now");
    } else {
        tracing::debug!(exp, delay_secs = delay.as_secs(), "Refresh scheduled");
    }

    Some(Instant::now() + delay)
}

/// Spawn the task that keeps one refresh deadline per access token.
///
/// The task watches the published session; whenever the access token changes
/// the pending deadline is dropped and a new one computed. A due refresh runs
/// in its own task, so aborting this one only drops the pending deadline. It
/// stops when the manager goes away.
pub(super) fn spawn(
    mut sessions: watch::Receiver<Session>,
    lead: Duration,
    manager: WeakSessionManager,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut current_token: Option<String> = None;
        let mut deadline: Option<Instant> = None;

        loop {
            let token = sessions.borrow_and_update().access_token.clone();
            if token != current_token {
                deadline = plan(token.as_deref(), lead);
                current_token = token;
            }

            let due = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                changed = sessions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = due => {
                    deadline = None;
                    let Some(manager) = manager.upgrade() else {
                        break;
                    };
                    // Detached: stopping the scheduler never cuts a refresh short
                    tokio::spawn(async move { manager.refresh().await });
                }
            }
        }

        tracing::debug!("Refresh scheduler exiting");
    })
}
