//! Session state and its transitions.
//!
//! [`SessionState`] is plain data. Every change goes through one of the
//! `apply_*` methods, which take the current time as an argument so the
//! whole state machine can be driven with synthetic timestamps. The
//! controller owns the only writable copy and calls these methods from its
//! sign-in, sign-out, listener and timer paths.
//!
//! Invariants held after every transition:
//! - `allowed` implies an identity is present
//! - a recorded session start implies an identity is present

use chrono::{DateTime, Duration, Utc};
use gatehouse_services::Identity;
use serde::Serialize;

/// Observable session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionState {
    identity: Option<Identity>,
    allowed: bool,
    loading: bool,
    initialized: bool,
    session_start: Option<DateTime<Utc>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// A session that outlived its TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// How old the session was when the check ran.
    pub age: Duration,
}

/// Outcome of an expiry check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryCheck {
    NotExpired,
    Expired(Expiry),
}

impl ExpiryCheck {
    /// Returns true if the session was expired by the check.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired(_))
    }
}

/// What the caller must do after an identity notification was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityChange {
    /// The provider reports nobody signed in; state is cleared.
    SignedOut,
    /// The session was too old; state is cleared and the provider must be
    /// signed out.
    Expired(Expiry),
    /// The identity must be checked against the allow-list.
    CheckAllowList(Identity),
}

/// Outcome of applying an allow-list decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowDecision {
    /// The identity is allowed.
    Granted,
    /// The identity is not allowed; state is cleared and the provider must
    /// be signed out.
    Revoked,
    /// The identity changed while the lookup was in flight; nothing was
    /// applied.
    Stale,
}

impl SessionState {
    /// Returns the initial state: nobody signed in, loading until the first
    /// provider notification resolves.
    #[must_use]
    pub fn new() -> Self {
        Self {
            identity: None,
            allowed: false,
            loading: true,
            initialized: false,
            session_start: None,
        }
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    #[must_use]
    pub fn allowed(&self) -> bool {
        self.allowed
    }

    #[must_use]
    pub fn loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub fn initialized(&self) -> bool {
        self.initialized
    }

    #[must_use]
    pub fn session_start(&self) -> Option<DateTime<Utc>> {
        self.session_start
    }

    /// An identity is present and allowed.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some() && self.allowed
    }

    /// Returns true if both state invariants hold.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let present = self.identity.is_some();
        (!self.allowed || present) && (self.session_start.is_none() || present)
    }

    /// Returns the session time left, never negative. Zero when no session
    /// start is recorded.
    #[must_use]
    pub fn remaining(&self, ttl: Duration, now: DateTime<Utc>) -> Duration {
        match self.session_start {
            Some(start) => (ttl - (now - start)).max(Duration::zero()),
            None => Duration::zero(),
        }
    }

    /// Marks the listener as established. Returns false if it already was.
    pub fn mark_initialized(&mut self) -> bool {
        !std::mem::replace(&mut self.initialized, true)
    }

    /// Clears identity, allowed and session start if the session is older
    /// than `ttl`. `loading` is left to the operation that owns it.
    pub fn apply_expiry_check(&mut self, ttl: Duration, now: DateTime<Utc>) -> ExpiryCheck {
        let Some(started_at) = self.session_start else {
            return ExpiryCheck::NotExpired;
        };
        let age = now - started_at;
        if age <= ttl {
            return ExpiryCheck::NotExpired;
        }

        self.clear_session();
        ExpiryCheck::Expired(Expiry { started_at, age })
    }

    /// Applies a provider identity notification.
    ///
    /// A live identity is first checked for expiry. If it survives, a
    /// missing session start is stamped with `now` so restored sessions
    /// are timed from the moment they were seen.
    pub fn apply_identity_change(
        &mut self,
        identity: Option<Identity>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> IdentityChange {
        let Some(identity) = identity else {
            self.clear_session();
            self.loading = false;
            return IdentityChange::SignedOut;
        };

        let same_principal = self
            .identity
            .as_ref()
            .is_some_and(|current| current.uid() == identity.uid());
        if !same_principal {
            self.allowed = false;
        }
        self.identity = Some(identity.clone());

        if let ExpiryCheck::Expired(expiry) = self.apply_expiry_check(ttl, now) {
            self.loading = false;
            return IdentityChange::Expired(expiry);
        }

        if self.session_start.is_none() {
            self.session_start = Some(now);
        }
        IdentityChange::CheckAllowList(identity)
    }

    /// Applies the allow-list result for the identity with `uid`.
    pub fn apply_allow_decision(&mut self, uid: &str, allowed: bool) -> AllowDecision {
        let current = self.identity.as_ref().map(Identity::uid);
        if current != Some(uid) {
            return AllowDecision::Stale;
        }

        self.loading = false;
        if allowed {
            self.allowed = true;
            AllowDecision::Granted
        } else {
            self.clear_session();
            AllowDecision::Revoked
        }
    }

    /// Marks a sign-in or sign-out as in flight.
    pub fn begin_operation(&mut self) {
        self.loading = true;
    }

    /// Marks an operation as finished without other changes.
    pub fn end_operation(&mut self) {
        self.loading = false;
    }

    /// Records a successful, allowed sign-in.
    pub fn apply_sign_in(&mut self, identity: Identity, now: DateTime<Utc>) {
        self.identity = Some(identity);
        self.allowed = true;
        self.session_start = Some(now);
        self.loading = false;
    }

    /// Records a sign-in that the allow-list rejected.
    pub fn apply_sign_in_denied(&mut self) {
        self.clear_session();
        self.loading = false;
    }

    /// Records a completed sign-out.
    pub fn apply_sign_out(&mut self) {
        self.clear_session();
        self.loading = false;
    }

    fn clear_session(&mut self) {
        self.identity = None;
        self.allowed = false;
        self.session_start = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).single().expect("valid time")
    }

    fn alice() -> Identity {
        Identity::new("uid_alice", Some("alice@example.com".to_string()))
    }

    fn signed_in_at(start: DateTime<Utc>) -> SessionState {
        let mut state = SessionState::new();
        state.apply_sign_in(alice(), start);
        state
    }

    #[test]
    fn initial_state_is_loading_and_unauthenticated() {
        let state = SessionState::new();
        assert!(state.loading());
        assert!(!state.is_authenticated());
        assert!(!state.initialized());
        assert!(state.is_consistent());
    }

    #[test]
    fn sign_in_stamps_start_and_authenticates() {
        let state = signed_in_at(t0());
        assert!(state.is_authenticated());
        assert_eq!(state.session_start(), Some(t0()));
        assert!(!state.loading());
        assert!(state.is_consistent());
    }

    #[test]
    fn expiry_check_within_ttl_changes_nothing() {
        let mut state = signed_in_at(t0());
        let before = state.clone();

        let check = state.apply_expiry_check(Duration::hours(24), t0() + Duration::hours(24));
        assert_eq!(check, ExpiryCheck::NotExpired);
        assert_eq!(state, before);
    }

    #[test]
    fn expiry_check_past_ttl_clears_session() {
        let mut state = signed_in_at(t0());
        let now = t0() + Duration::hours(24) + Duration::milliseconds(1);

        let check = state.apply_expiry_check(Duration::hours(24), now);
        assert_eq!(
            check,
            ExpiryCheck::Expired(Expiry {
                started_at: t0(),
                age: Duration::hours(24) + Duration::milliseconds(1),
            })
        );
        assert!(state.identity().is_none());
        assert!(!state.allowed());
        assert!(state.session_start().is_none());
        assert!(state.is_consistent());
    }

    #[test]
    fn expiry_check_leaves_in_flight_loading_alone() {
        let mut state = signed_in_at(t0());
        state.begin_operation();

        let check = state.apply_expiry_check(Duration::hours(1), t0() + Duration::hours(2));
        assert!(check.is_expired());
        assert!(state.identity().is_none());
        assert!(state.loading());
    }

    #[test]
    fn expiry_check_without_start_is_not_expired() {
        let mut state = SessionState::new();
        assert_eq!(
            state.apply_expiry_check(Duration::milliseconds(1), t0()),
            ExpiryCheck::NotExpired
        );
    }

    #[test]
    fn remaining_time_is_clamped_at_zero() {
        let state = signed_in_at(t0());
        let ttl = Duration::hours(1);
        assert_eq!(state.remaining(ttl, t0()), ttl);
        assert_eq!(
            state.remaining(ttl, t0() + Duration::minutes(15)),
            Duration::minutes(45)
        );
        assert_eq!(
            state.remaining(ttl, t0() + Duration::hours(2)),
            Duration::zero()
        );
        assert_eq!(
            SessionState::new().remaining(ttl, t0()),
            Duration::zero()
        );
    }

    #[test]
    fn restored_identity_gets_start_stamped() {
        let mut state = SessionState::new();
        let change = state.apply_identity_change(Some(alice()), Duration::hours(24), t0());

        assert_eq!(change, IdentityChange::CheckAllowList(alice()));
        assert_eq!(state.session_start(), Some(t0()));
        assert!(!state.allowed());
        assert!(state.loading());
        assert!(state.is_consistent());
    }

    #[test]
    fn restored_identity_keeps_existing_start() {
        let mut state = signed_in_at(t0());
        let later = t0() + Duration::hours(1);

        state.apply_identity_change(Some(alice()), Duration::hours(24), later);
        assert_eq!(state.session_start(), Some(t0()));
        assert!(state.allowed());
    }

    #[test]
    fn stale_notification_expires_session() {
        let mut state = signed_in_at(t0());
        let change =
            state.apply_identity_change(Some(alice()), Duration::hours(1), t0() + Duration::hours(2));

        assert!(matches!(change, IdentityChange::Expired(_)));
        assert!(state.identity().is_none());
        assert!(!state.loading());
    }

    #[test]
    fn different_principal_resets_allowed_until_checked() {
        let mut state = signed_in_at(t0());
        let bob = Identity::new("uid_bob", Some("bob@example.com".to_string()));

        state.apply_identity_change(Some(bob), Duration::hours(24), t0());
        assert!(!state.allowed());
        assert!(!state.is_authenticated());
    }

    #[test]
    fn signed_out_notification_clears_state() {
        let mut state = signed_in_at(t0());
        let change = state.apply_identity_change(None, Duration::hours(24), t0());

        assert_eq!(change, IdentityChange::SignedOut);
        assert!(state.identity().is_none());
        assert!(!state.allowed());
        assert!(state.session_start().is_none());
        assert!(!state.loading());
    }

    #[test]
    fn allow_decision_granted_and_revoked() {
        let mut state = SessionState::new();
        state.apply_identity_change(Some(alice()), Duration::hours(24), t0());
        assert_eq!(
            state.apply_allow_decision("uid_alice", true),
            AllowDecision::Granted
        );
        assert!(state.is_authenticated());
        assert!(!state.loading());

        let mut state = SessionState::new();
        state.apply_identity_change(Some(alice()), Duration::hours(24), t0());
        assert_eq!(
            state.apply_allow_decision("uid_alice", false),
            AllowDecision::Revoked
        );
        assert!(state.identity().is_none());
        assert!(state.session_start().is_none());
        assert!(state.is_consistent());
    }

    #[test]
    fn allow_decision_for_departed_identity_is_stale() {
        let mut state = SessionState::new();
        state.apply_identity_change(Some(alice()), Duration::hours(24), t0());
        state.apply_identity_change(None, Duration::hours(24), t0());

        assert_eq!(
            state.apply_allow_decision("uid_alice", true),
            AllowDecision::Stale
        );
        assert!(!state.allowed());
        assert!(state.is_consistent());
    }

    #[test]
    fn denied_sign_in_and_sign_out_clear_state() {
        let mut state = signed_in_at(t0());
        state.begin_operation();
        state.apply_sign_in_denied();
        assert!(!state.is_authenticated());
        assert!(state.session_start().is_none());
        assert!(!state.loading());

        let mut state = signed_in_at(t0());
        state.begin_operation();
        assert!(state.loading());
        state.apply_sign_out();
        assert!(state.identity().is_none());
        assert!(!state.loading());
    }

    #[test]
    fn mark_initialized_only_once() {
        let mut state = SessionState::new();
        assert!(state.mark_initialized());
        assert!(!state.mark_initialized());
        assert!(state.initialized());
    }
}
