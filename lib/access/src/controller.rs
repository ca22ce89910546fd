//! Session controller.
//!
//! Drives sign-in and sign-out against the identity provider, mirrors the
//! provider's identity notifications into [`SessionState`], consults the
//! allow-list, and force-expires sessions older than the configured TTL.
//!
//! Two background producers feed the same state: the identity listener and
//! the expiry timer. Both are started by [`SessionController::start`] and
//! stopped when the returned [`SessionGuard`] is dropped.

use crate::allow_list::AllowListGate;
use crate::config::{AllowListConfig, SessionConfig};
use crate::error::AccessError;
use crate::session::{AllowDecision, Expiry, ExpiryCheck, IdentityChange, SessionState};
use chrono::{DateTime, Utc};
use gatehouse_core::Result;
use gatehouse_services::{Identity, IdentityProvider, IdentityWatch, ServiceHandles};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, instrument, warn};

/// Owns the session state and every path that changes it.
pub struct SessionController {
    state: watch::Sender<SessionState>,
    identity: Arc<dyn IdentityProvider>,
    gate: AllowListGate,
    config: SessionConfig,
    // Held for the duration of a sign-in or sign-out.
    operation: Mutex<()>,
}

impl SessionController {
    /// Creates a controller in the initial state (signed out, loading).
    #[must_use]
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        gate: AllowListGate,
        config: SessionConfig,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::new());
        Self {
            state,
            identity,
            gate,
            config,
            operation: Mutex::new(()),
        }
    }

    /// Creates a controller over the services in `handles`.
    #[must_use]
    pub fn from_handles(
        handles: &ServiceHandles,
        session: SessionConfig,
        allow_list: &AllowListConfig,
    ) -> Self {
        Self::new(
            handles.identity(),
            AllowListGate::from_handles(handles, allow_list),
            session,
        )
    }

    /// Returns a copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Returns a receiver that observes every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().identity().cloned()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    #[must_use]
    pub fn allowed(&self) -> bool {
        self.state.borrow().allowed()
    }

    #[must_use]
    pub fn loading(&self) -> bool {
        self.state.borrow().loading()
    }

    #[must_use]
    pub fn session_start(&self) -> Option<DateTime<Utc>> {
        self.state.borrow().session_start()
    }

    /// Returns the allow-list gate used by this controller.
    #[must_use]
    pub fn gate(&self) -> &AllowListGate {
        &self.gate
    }

    /// Runs the interactive sign-in and admits the identity only if it is on
    /// the allow-list.
    ///
    /// # Errors
    ///
    /// - `OperationInProgress` if a sign-in or sign-out is already running
    /// - `ProviderFailure` if the provider sign-in fails
    /// - `Unauthorized` if the identity is not on the allow-list; the
    ///   identity is signed back out at the provider first
    /// - `ProviderFailure` if that sign-out fails; local state is cleared
    ///   either way
    #[instrument(skip(self))]
    pub async fn sign_in_with_provider(&self) -> Result<Identity, AccessError> {
        let _operation = self.operation.try_lock().map_err(|_| {
            warn!("sign-in rejected; another operation is in progress");
            AccessError::OperationInProgress
        })?;

        self.state.send_modify(SessionState::begin_operation);

        let identity = match self.identity.sign_in_interactive().await {
            Ok(identity) => identity,
            Err(report) => {
                self.state.send_modify(SessionState::end_operation);
                error!(error = %report, "provider sign-in failed");
                return Err(report.context(AccessError::ProviderFailure {
                    operation: "sign-in".to_string(),
                }));
            }
        };

        if !self.gate.is_allowed(Some(&identity)).await {
            warn!(
                uid = identity.uid(),
                email = identity.email().unwrap_or_default(),
                "identity is not on the allow-list; signing out"
            );
            let signed_out = self.identity.sign_out_current().await;
            self.state.send_modify(SessionState::apply_sign_in_denied);
            if let Err(report) = signed_out {
                error!(error = %report, "provider sign-out after rejected sign-in failed");
                return Err(report.context(AccessError::ProviderFailure {
                    operation: "sign-out".to_string(),
                }));
            }
            return Err(AccessError::Unauthorized {
                message: self.config.unauthorized_message().to_string(),
            }
            .into());
        }

        let now = Utc::now();
        self.state
            .send_modify(|state| state.apply_sign_in(identity.clone(), now));
        info!(uid = identity.uid(), "signed in");
        Ok(identity)
    }

    /// Signs the current identity out at the provider and clears the session.
    ///
    /// # Errors
    ///
    /// - `OperationInProgress` if a sign-in or sign-out is already running
    /// - `ProviderFailure` if the provider sign-out fails; the session is
    ///   left as it was
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), AccessError> {
        let _operation = self.operation.try_lock().map_err(|_| {
            warn!("sign-out rejected; another operation is in progress");
            AccessError::OperationInProgress
        })?;

        self.state.send_modify(SessionState::begin_operation);

        match self.identity.sign_out_current().await {
            Ok(()) => {
                self.state.send_modify(SessionState::apply_sign_out);
                info!("signed out");
                Ok(())
            }
            Err(report) => {
                self.state.send_modify(SessionState::end_operation);
                error!(error = %report, "provider sign-out failed");
                Err(report.context(AccessError::ProviderFailure {
                    operation: "sign-out".to_string(),
                }))
            }
        }
    }

    /// Returns how long the current session has left. Zero when there is no
    /// session or it is already past its TTL.
    #[must_use]
    pub fn remaining_session_time(&self) -> std::time::Duration {
        self.state
            .borrow()
            .remaining(self.config.ttl(), Utc::now())
            .to_std()
            .unwrap_or_default()
    }

    /// Expires the session if it is older than the TTL, signing out at the
    /// provider. A failed provider sign-out is logged; local state is
    /// cleared regardless.
    pub async fn expire_if_stale(&self) -> ExpiryCheck {
        let ttl = self.config.ttl();
        let mut check = ExpiryCheck::NotExpired;
        self.state.send_if_modified(|state| {
            check = state.apply_expiry_check(ttl, Utc::now());
            check.is_expired()
        });

        if let ExpiryCheck::Expired(expiry) = check {
            self.sign_out_expired(expiry).await;
        }
        check
    }

    /// Applies one identity notification from the provider.
    ///
    /// The listener calls this for every notification; hosts that deliver
    /// notifications themselves can call it directly.
    #[instrument(skip_all, fields(uid = identity.as_ref().map(Identity::uid)))]
    pub async fn handle_identity_change(&self, identity: Option<Identity>) {
        let ttl = self.config.ttl();
        let now = Utc::now();
        let mut change = IdentityChange::SignedOut;
        self.state
            .send_modify(|state| change = state.apply_identity_change(identity, ttl, now));

        let identity = match change {
            IdentityChange::SignedOut => {
                debug!("provider reports no identity");
                return;
            }
            IdentityChange::Expired(expiry) => {
                self.sign_out_expired(expiry).await;
                return;
            }
            IdentityChange::CheckAllowList(identity) => identity,
        };

        let allowed = self.gate.is_allowed(Some(&identity)).await;
        let mut decision = AllowDecision::Stale;
        self.state
            .send_modify(|state| decision = state.apply_allow_decision(identity.uid(), allowed));

        match decision {
            AllowDecision::Granted => debug!("identity is on the allow-list"),
            AllowDecision::Stale => debug!("identity changed during allow-list lookup"),
            AllowDecision::Revoked => {
                warn!(
                    email = identity.email().unwrap_or_default(),
                    "identity is not on the allow-list; signing out"
                );
                if let Err(report) = self.identity.sign_out_current().await {
                    warn!(error = %report, "provider sign-out after revoked access failed");
                }
            }
        }
    }

    /// Starts the identity listener and the expiry timer.
    ///
    /// Returns `None` if they were already started for this controller.
    /// The listener is established once per controller; starting again
    /// after the guard was dropped also returns `None`.
    pub fn start(self: &Arc<Self>) -> Option<SessionGuard> {
        let mut first = false;
        self.state.send_if_modified(|state| {
            first = state.mark_initialized();
            first
        });
        if !first {
            debug!("session listener already started");
            return None;
        }

        let listener = tokio::spawn(Arc::clone(self).run_listener(self.identity.subscribe()));
        let timer = tokio::spawn(Arc::clone(self).run_expiry_timer());
        info!(
            ttl_ms = self.config.ttl().num_milliseconds(),
            "session listener started"
        );
        Some(SessionGuard {
            tasks: vec![listener, timer],
        })
    }

    async fn run_listener(self: Arc<Self>, mut identities: IdentityWatch) {
        loop {
            let identity = identities.borrow_and_update().clone();
            self.handle_identity_change(identity).await;
            if identities.changed().await.is_err() {
                debug!("identity provider closed its notifications");
                break;
            }
        }
    }

    async fn run_expiry_timer(self: Arc<Self>) {
        let period = self.config.expiry_check_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let active = {
                let state = self.state.borrow();
                state.identity().is_some() && state.session_start().is_some()
            };
            if active {
                self.expire_if_stale().await;
            }
        }
    }

    async fn sign_out_expired(&self, expiry: Expiry) {
        info!(
            started_at = %expiry.started_at,
            age_ms = expiry.age.num_milliseconds(),
            "session expired; signing out"
        );
        if let Err(report) = self.identity.sign_out_current().await {
            warn!(error = %report, "provider sign-out after expiry failed");
        }
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &*self.state.borrow())
            .field("gate", &self.gate)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Keeps the identity listener and expiry timer running.
///
/// Dropping the guard stops both tasks.
#[must_use = "dropping the guard stops the session listener"]
#[derive(Debug)]
pub struct SessionGuard {
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        debug!("session listener stopped");
    }
}
