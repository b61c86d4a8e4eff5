//! Refresh coordination.
//!
//! Recovers protected requests that came back 401. Concurrent recoveries are
//! coalesced into one in-flight refresh: the first caller spawns the issuer
//! call as a task and publishes its result as a shared future, later callers
//! await that same future. The task settles the slot once it finishes, after
//! the session has been written, so a caller that finds the slot empty always
//! sees the refreshed session. Callers that give up do not stop the refresh.
//!
//! A refresh token the issuer refused is remembered until the session moves
//! on, and any later 401 carrying it ends the session under the same flight.
//! A failed flight therefore ends the session exactly once, however many
//! requests were waiting on it or arrived after it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tracing::Instrument;

use crate::error::{IssuerError, Termination};
use crate::issuer::CredentialIssuer;
use crate::request::normalize_route;
use crate::session::SessionStore;

/// Default timeout for the issuer call.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// Coarse session state, for observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// An access token is held and no refresh is running.
    Authenticated,
    /// A refresh is in flight.
    Refreshing,
    /// No access token is held.
    LoggedOut,
}

/// What to do with a request that failed with 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// Replay the original request once with this access token.
    Replay(String),
    /// The session is over; surface the original 401.
    Terminated(Termination),
}

#[derive(Debug, Clone)]
enum FlightOutcome {
    Refreshed { access_token: String },
    Failed { flight: u64 },
    /// The session changed under the flight; its credentials were discarded.
    Superseded,
}

type Flight = Shared<BoxFuture<'static, FlightOutcome>>;

struct InFlight {
    id: u64,
    future: Flight,
}

struct FailedFlight {
    id: u64,
    refresh_token: String,
}

#[derive(Default)]
struct Slot {
    in_flight: Option<InFlight>,
    /// The last refresh token the issuer refused.
    failed: Option<FailedFlight>,
}

impl Slot {
    fn refused(&self, refresh_token: &str) -> Option<u64> {
        self.failed
            .as_ref()
            .filter(|f| f.refresh_token == refresh_token)
            .map(|f| f.id)
    }

    /// Release the slot held by flight `id` and record how it ended.
    fn settle(&mut self, id: u64, refresh_token: &str, outcome: &FlightOutcome) {
        if self.in_flight.as_ref().is_some_and(|f| f.id == id) {
            self.in_flight = None;
        }
        match outcome {
            FlightOutcome::Refreshed { .. } => self.failed = None,
            FlightOutcome::Failed { .. } => {
                self.failed = Some(FailedFlight {
                    id,
                    refresh_token: refresh_token.to_string(),
                })
            }
            FlightOutcome::Superseded => {}
        }
    }
}

enum Step {
    Replay(String),
    Terminate(Termination),
    Refused(u64),
    Await(Flight),
}

/// Owns the single-flight refresh protocol.
pub struct RefreshCoordinator {
    store: Arc<SessionStore>,
    issuer: Arc<dyn CredentialIssuer>,
    refresh_route: String,
    timeout: Duration,
    slot: Arc<Mutex<Slot>>,
    next_flight: AtomicU64,
    last_terminated: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<SessionStore>,
        issuer: Arc<dyn CredentialIssuer>,
        refresh_path: impl AsRef<str>,
    ) -> Self {
        Self {
            store,
            issuer,
            refresh_route: normalize_route(refresh_path.as_ref()).to_string(),
            timeout: DEFAULT_REFRESH_TIMEOUT,
            slot: Arc::new(Mutex::new(Slot::default())),
            next_flight: AtomicU64::new(1),
            last_terminated: AtomicU64::new(0),
        }
    }

    /// Set the issuer call timeout. Expiry counts as a failed refresh.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> RefreshState {
        if self.slot.lock().in_flight.is_some() {
            RefreshState::Refreshing
        } else if self.store.is_authenticated() {
            RefreshState::Authenticated
        } else {
            RefreshState::LoggedOut
        }
    }

    /// Recover a protected request to `route` that returned 401.
    ///
    /// `sent_token` is the access token the failing request carried. If the
    /// store already holds a different one, another flight refreshed in the
    /// meantime and the request is replayed without a new issuer call.
    pub async fn recover(&self, route: &str, sent_token: Option<&str>) -> Recovery {
        if normalize_route(route) == self.refresh_route {
            return self.terminate(self.claim_flight_id(), Termination::RefreshEndpoint);
        }

        let step = {
            let mut slot = self.slot.lock();
            let session = self.store.get();
            if let Some(flight) = slot.in_flight.as_ref() {
                Step::Await(flight.future.clone())
            } else if let Some(current) = session.access_token.as_deref()
                && Some(current) != sent_token
            {
                Step::Replay(current.to_string())
            } else if let Some(refresh_token) = session.refresh_token.clone() {
                match slot.refused(&refresh_token) {
                    Some(flight) => Step::Refused(flight),
                    None => Step::Await(self.start_flight(&mut slot, refresh_token)),
                }
            } else {
                Step::Terminate(Termination::NoRefreshToken)
            }
        };

        match step {
            Step::Replay(token) => {
                tracing::debug!(path = %route, "Session already refreshed, replaying");
                Recovery::Replay(token)
            }
            Step::Terminate(reason) => self.terminate(self.claim_flight_id(), reason),
            Step::Refused(flight) => self.terminate(flight, Termination::RefreshFailed),
            Step::Await(flight) => match flight.await {
                FlightOutcome::Refreshed { access_token } => Recovery::Replay(access_token),
                FlightOutcome::Failed { flight } => {
                    self.terminate(flight, Termination::RefreshFailed)
                }
                FlightOutcome::Superseded => match self.store.get().access_token.clone() {
                    Some(token) => Recovery::Replay(token),
                    None => Recovery::Terminated(Termination::RefreshFailed),
                },
            },
        }
    }

    /// Refresh ahead of expiry. Joins a running flight if there is one.
    ///
    /// Failure is advisory: nothing is cleared and `None` is returned, leaving
    /// the decision to the 401 path. A refresh token the issuer already
    /// refused is not offered again.
    pub async fn refresh_ahead(&self) -> Option<String> {
        let flight = {
            let mut slot = self.slot.lock();
            match slot.in_flight.as_ref() {
                Some(flight) => flight.future.clone(),
                None => {
                    let refresh_token = self.store.get().refresh_token.clone()?;
                    if slot.refused(&refresh_token).is_some() {
                        return None;
                    }
                    self.start_flight(&mut slot, refresh_token)
                }
            }
        };

        match flight.await {
            FlightOutcome::Refreshed { access_token } => Some(access_token),
            FlightOutcome::Failed { .. } | FlightOutcome::Superseded => None,
        }
    }

    fn claim_flight_id(&self) -> u64 {
        self.next_flight.fetch_add(1, Ordering::SeqCst)
    }

    /// End the session for `flight`, once per flight id.
    fn terminate(&self, flight: u64, reason: Termination) -> Recovery {
        let previous = self.last_terminated.fetch_max(flight, Ordering::SeqCst);
        if previous < flight {
            tracing::info!(%reason, "Ending session");
            self.store.logout();
        }
        Recovery::Terminated(reason)
    }

    /// Spawn the issuer call and publish it in `slot`.
    ///
    /// Must be called with the slot lock held.
    fn start_flight(&self, slot: &mut Slot, refresh_token: String) -> Flight {
        let id = self.claim_flight_id();
        let issuer = self.issuer.clone();
        let store = self.store.clone();
        let shared_slot = self.slot.clone();
        let timeout = self.timeout;

        let task = {
            let refresh_token = refresh_token.clone();
            async move {
                let result =
                    match tokio::time::timeout(timeout, issuer.refresh(&refresh_token)).await {
                        Ok(result) => result,
                        Err(_) => Err(IssuerError::Timeout),
                    };

                let outcome = match result {
                    Ok(tokens) => {
                        let access_token = tokens.access_token;
                        let rotated = tokens.refresh_token.unwrap_or_else(|| refresh_token.clone());
                        let written = store.update_if_refresh_matches(&refresh_token, |session| {
                            session
                                .with_access_token(access_token.clone())
                                .with_refresh_token(Some(rotated))
                        });
                        if written {
                            tracing::info!("Session refreshed");
                            FlightOutcome::Refreshed { access_token }
                        } else {
                            tracing::warn!("Session changed during refresh, discarding new credentials");
                            FlightOutcome::Superseded
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Session refresh failed");
                        FlightOutcome::Failed { flight: id }
                    }
                };

                shared_slot.lock().settle(id, &refresh_token, &outcome);
                outcome
            }
            .instrument(tracing::info_span!("session_refresh", flight = id))
        };

        let handle = tokio::spawn(task);
        let shared_slot = self.slot.clone();
        let future = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(flight = id, error = %e, "Session refresh task aborted");
                    let outcome = FlightOutcome::Failed { flight: id };
                    shared_slot.lock().settle(id, &refresh_token, &outcome);
                    outcome
                }
            }
        }
        .boxed()
        .shared();

        slot.in_flight = Some(InFlight {
            id,
            future: future.clone(),
        });
        tracing::debug!(flight = id, "Started session refresh");
        future
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("refresh_route", &self.refresh_route)
            .field("timeout", &self.timeout)
            .field("state", &self.state())
            .finish()
    }
}
