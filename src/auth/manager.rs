use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::bootstrap::{parse_handoff, strip_query, AddressBar};
use super::claims::decode_claims;
use super::refresh::TokenRefresher;
use super::scheduler;
use super::storage::{self, SessionStore};
use super::types::{redact, Session};
use crate::error::Result;

/// Default lead time between a scheduled refresh and token expiry
pub const DEFAULT_REFRESH_LEAD_SECS: u64 = 60;

/// Session manager
/// Owns the token pair, mirrors it to durable storage, publishes every change
/// to subscribers and refreshes the access token before it expires.
///
/// Cloning yields another handle to the same session. The refresh timer is
/// cancelled when the last handle is dropped or `shutdown` is called.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    /// Durable copy of the session
    store: Arc<dyn SessionStore>,

    /// Refresh endpoint
    refresher: Arc<dyn TokenRefresher>,

    /// In-memory session and its generation
    state: Mutex<State>,

    /// Reactive view of the session
    publisher: watch::Sender<Session>,

    /// Expiry-driven refresh task
    scheduler: Mutex<Option<JoinHandle<()>>>,

    /// Time between a scheduled refresh and token expiry
    refresh_lead: Duration,
}

struct State {
    session: Session,

    /// Bumped on every mutation; stale refresh outcomes are dropped
    generation: u64,
}

/// Non-owning handle held by the scheduler task
pub(super) struct WeakSessionManager(Weak<Inner>);

impl WeakSessionManager {
    pub(super) fn upgrade(&self) -> Option<SessionManager> {
        self.0.upgrade().map(|inner| SessionManager { inner })
    }
}

impl SessionManager {
    /// Create a manager whose session is read from durable storage.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        store: Arc<dyn SessionStore>,
        refresher: Arc<dyn TokenRefresher>,
        refresh_lead_secs: u64,
    ) -> Result<Self> {
        let manager = Self::load(store, refresher, refresh_lead_secs)?;
        manager.start();
        Ok(manager)
    }

    /// Create a manager at application startup.
    ///
    /// A login handoff in the address query (`token` + `refreshToken`) wins
    /// over the stored session and is stripped from the address afterwards.
    /// Otherwise the stored session is used as-is.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bootstrap(
        store: Arc<dyn SessionStore>,
        refresher: Arc<dyn TokenRefresher>,
        address: &dyn AddressBar,
        refresh_lead_secs: u64,
    ) -> Result<Self> {
        let manager = Self::load(store, refresher, refresh_lead_secs)?;

        let current = address.current();
        if let Some(handoff) = parse_handoff(&current) {
            tracing::info!("Found login handoff in address, replacing stored session");
            manager.set_tokens(
                handoff.access_token,
                handoff.refresh_token,
                handoff.email,
                handoff.name,
            )?;
            address.replace_state(strip_query(&current));
        } else {
            tracing::debug!("No login handoff in address, using stored session");
        }

        manager.start();
        Ok(manager)
    }

    /// Read the stored session without starting the scheduler
    fn load(
        store: Arc<dyn SessionStore>,
        refresher: Arc<dyn TokenRefresher>,
        refresh_lead_secs: u64,
    ) -> Result<Self> {
        let stored = storage::load_session(store.as_ref())?;
        let session = with_derived_identity(stored.clone());

        if session != stored {
            storage::save_session(store.as_ref(), &session)?;
        }

        tracing::info!(
            authenticated = session.is_authenticated(),
            email = ?session.email,
            "Loaded session from storage"
        );

        let (publisher, _) = watch::channel(session.clone());

        Ok(Self {
            inner: Arc::new(Inner {
                store,
                refresher,
                state: Mutex::new(State {
                    session,
                    generation: 0,
                }),
                publisher,
                scheduler: Mutex::new(None),
                refresh_lead: Duration::from_secs(refresh_lead_secs),
            }),
        })
    }

    /// Spawn the scheduler; it observes the published session
    fn start(&self) {
        let handle = scheduler::spawn(
            self.inner.publisher.subscribe(),
            self.inner.refresh_lead,
            WeakSessionManager(Arc::downgrade(&self.inner)),
        );

        if let Some(previous) = self.inner.scheduler.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Current session snapshot
    pub fn session(&self) -> Session {
        self.inner.state.lock().session.clone()
    }

    /// Subscribe to session changes.
    ///
    /// The receiver holds the latest session; every mutation replaces it
    /// before the mutating call returns.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.publisher.subscribe()
    }

    /// Number of session mutations so far
    pub fn generation(&self) -> u64 {
        self.inner.state.lock().generation
    }

    /// Persist and publish a new session.
    ///
    /// When the access token carries a `sub` claim it replaces `email`.
    pub fn set_tokens(
        &self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        email: Option<String>,
        name: Option<String>,
    ) -> Result<()> {
        let session = with_derived_identity(Session {
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
            email,
            name,
        });

        self.commit(session, None)?;
        Ok(())
    }

    /// Clear the session from storage and memory. Calling it again is a no-op.
    pub fn logout(&self) -> Result<()> {
        self.commit(Session::empty(), None)?;
        Ok(())
    }

    /// Exchange the refresh token for a new token pair.
    ///
    /// Any failure logs the session out; the caller never sees an error.
    /// Latest mutation wins: if `set_tokens`, `logout` or another refresh
    /// changes the session while this request is in flight, its outcome
    /// (new tokens or the failure logout) is discarded.
    pub async fn refresh(&self) {
        let (refresh_token, generation) = {
            let state = self.inner.state.lock();
            (state.session.refresh_token.clone(), state.generation)
        };

        let Some(refresh_token) = refresh_token else {
            tracing::warn!("No refresh token available, logging out");
            self.logout_after_failure(generation);
            return;
        };

        match self.inner.refresher.refresh(&refresh_token).await {
            Ok(grant) => {
                let session = with_derived_identity(Session {
                    access_token: Some(grant.access_token),
                    refresh_token: Some(grant.refresh_token),
                    email: grant.email,
                    name: grant.name,
                });

                match self.commit(session, Some(generation)) {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(
                            generation,
                            "Session changed while refresh was in flight, discarding new tokens"
                        );
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to store refreshed tokens");
                        self.logout_after_failure(generation);
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, kind = e.kind(), "Failed to refresh token");
                self.logout_after_failure(generation);
            }
        }
    }

    /// Cancel the refresh timer. A refresh already in flight still completes;
    /// the session itself is left untouched.
    pub fn shutdown(&self) {
        if let Some(handle) = self.inner.scheduler.lock().take() {
            handle.abort();
            tracing::debug!("Refresh scheduler stopped");
        }
    }

    fn logout_after_failure(&self, generation: u64) {
        match self.commit(Session::empty(), Some(generation)) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(generation, "Session changed while refresh was in flight, keeping it");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to clear session after refresh failure");
            }
        }
    }

    /// Write `next` to storage, then memory, then subscribers.
    ///
    /// With `expected` set, nothing happens unless the generation still
    /// matches; returns whether the session was applied.
    fn commit(&self, next: Session, expected: Option<u64>) -> Result<bool> {
        let mut state = self.inner.state.lock();

        if let Some(expected) = expected {
            if state.generation != expected {
                return Ok(false);
            }
        }

        if next.is_empty() && state.session.is_empty() {
            // Keep storage clean even if it drifted
            storage::clear_session(self.inner.store.as_ref())?;
            return Ok(true);
        }

        storage::save_session(self.inner.store.as_ref(), &next)?;

        state.generation += 1;
        state.session = next.clone();

        if next.is_empty() {
            tracing::info!(generation = state.generation, "Session cleared");
        } else {
            tracing::info!(
                generation = state.generation,
                access_token = ?next.access_token.as_deref().map(redact),
                email = ?next.email,
                "Session updated"
            );
        }

        self.inner.publisher.send_replace(next);
        Ok(true)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.scheduler.get_mut().take() {
            handle.abort();
        }
    }
}

/// Replace `email` with the access token's subject when it can be read
fn with_derived_identity(mut session: Session) -> Session {
    let Some(token) = session.access_token.as_deref().filter(|t| !t.is_empty()) else {
        return session;
    };

    match decode_claims(token) {
        Ok(claims) => {
            if let Some(sub) = claims.sub {
                session.email = Some(sub);
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to decode access token, keeping supplied email");
        }
    }

    session
}
