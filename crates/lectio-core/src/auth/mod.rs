//! Session gate
//!
//! Decides whether an authenticated session is admitted to the application.
//! The profile row is the sole authority: a missing row, an inactive flag, or
//! a failed lookup all deny access (fail-closed), each with its own
//! user-facing message. Admission is optimistic - the UI is unblocked as soon
//! as a session is seen - and the background validation corrects it.
//!
//! Validation attempts are generation-tagged: a result is applied only while
//! its generation is still current, so a superseded in-flight validation can
//! never downgrade a newer session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::backend::{AuthEvent, RemoteStore, Session};

/// Why admission was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// Profile exists but is flagged inactive
    Inactive,
    /// No profile row for this identity
    MissingProfile,
    /// Profile lookup failed
    VerificationFailed,
}

impl DenialReason {
    /// Human-readable message shown in the blocking denial notice
    pub fn message(&self) -> &'static str {
        match self {
            DenialReason::Inactive => {
                "Your account is inactive or has been removed. Contact an administrator."
            }
            DenialReason::MissingProfile => "No profile exists for this account.",
            DenialReason::VerificationFailed => {
                "Could not verify your account status. Please try again."
            }
        }
    }
}

/// Gate state machine
#[derive(Debug, Clone, PartialEq)]
pub enum GateState {
    /// Constructed, not yet started
    Unchecked,
    /// Session fetch in progress
    Loading,
    /// Session admitted to the application
    Admitted(Session),
    /// Admission denied; a dismissible blocking notice is shown
    Denied(DenialReason),
    /// No session
    LoggedOut,
}

/// Admits or denies sessions based on remote profile status
pub struct SessionGate {
    store: Arc<dyn RemoteStore>,
    state: watch::Sender<GateState>,
    generation: AtomicU64,
}

impl SessionGate {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            state: watch::channel(GateState::Unchecked).0,
            generation: AtomicU64::new(0),
        }
    }

    /// Current gate state
    pub fn state(&self) -> GateState {
        self.state.borrow().clone()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<GateState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: GateState) {
        self.state.send_replace(state);
    }

    /// Initial check: fetch the current session and validate it
    pub async fn start(&self) {
        self.set_state(GateState::Loading);
        match self.store.current_session().await {
            Ok(Some(session)) => self.admit_and_validate(session).await,
            Ok(None) => self.set_state(GateState::LoggedOut),
            Err(e) => {
                warn!("session fetch failed: {e}");
                self.set_state(GateState::LoggedOut);
            }
        }
    }

    /// Drive the gate from a store's session-change notifications
    ///
    /// Loops until the event channel closes. A lagged receiver skips to the
    /// freshest events; every event re-runs the same admission flow as
    /// [`start`](Self::start).
    pub async fn run(&self, mut events: broadcast::Receiver<AuthEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => self.handle_event(event).await,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("missed {missed} session events, resuming from latest");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// React to a session-change notification
    pub async fn handle_event(&self, event: AuthEvent) {
        match event {
            AuthEvent::SignedOut => {
                // Invalidate any in-flight validation for the old session
                self.generation.fetch_add(1, Ordering::SeqCst);
                self.set_state(GateState::LoggedOut);
            }
            AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session) => {
                self.admit_and_validate(session).await;
            }
        }
    }

    /// Dismiss a blocking denial notice
    ///
    /// Lands in `LoggedOut`, never back in `Admitted`; re-admission requires a
    /// fresh sign-in event.
    pub fn dismiss_denial(&self) {
        let denied = matches!(&*self.state.borrow(), GateState::Denied(_));
        if denied {
            self.set_state(GateState::LoggedOut);
        }
    }

    /// Optimistically admit, then validate the profile and correct the state
    async fn admit_and_validate(&self, session: Session) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_state(GateState::Admitted(session.clone()));

        let verdict = self.validate(&session).await;

        match verdict {
            Ok(()) => {
                if self.apply_if_current(generation, GateState::Admitted(session.clone())) {
                    info!(user_id = %session.user_id, "session admitted");
                } else {
                    debug!(
                        user_id = %session.user_id,
                        "discarding validation result for superseded session"
                    );
                }
            }
            Err(reason) => {
                if self.apply_if_current(generation, GateState::Denied(reason)) {
                    info!(user_id = %session.user_id, ?reason, "access denied");
                    self.spawn_sign_out();
                } else {
                    debug!(
                        user_id = %session.user_id,
                        "discarding validation result for superseded session"
                    );
                }
            }
        }
    }

    /// Apply a validation outcome only while its generation is still current
    ///
    /// The generation is re-read inside the state channel's critical section,
    /// so a concurrent session event cannot slip in between the check and the
    /// state write.
    fn apply_if_current(&self, generation: u64, new_state: GateState) -> bool {
        self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *state = new_state;
            true
        })
    }

    async fn validate(&self, session: &Session) -> Result<(), DenialReason> {
        match self.store.fetch_profile(&session.user_id).await {
            Err(e) => {
                error!(user_id = %session.user_id, "profile verification failed: {e}");
                Err(DenialReason::VerificationFailed)
            }
            Ok(None) => Err(DenialReason::MissingProfile),
            Ok(Some(profile)) if !profile.is_active => Err(DenialReason::Inactive),
            Ok(Some(_)) => Ok(()),
        }
    }

    /// Best-effort remote sign-out; never gates a state transition
    fn spawn_sign_out(&self) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.sign_out().await {
                warn!("best-effort sign-out failed: {e}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::backend::{MemoryStore, Profile};

    fn session(user_id: &str) -> Session {
        Session {
            user_id: user_id.to_string(),
            email: format!("{user_id}@example.com"),
            access_token: "token".to_string(),
        }
    }

    fn profile(user_id: &str, active: bool) -> Profile {
        Profile {
            id: user_id.to_string(),
            name: Some("Test User".to_string()),
            email: Some(format!("{user_id}@example.com")),
            avatar_url: None,
            is_active: active,
            updated_at: None,
        }
    }

    fn gate_with(store: MemoryStore) -> (SessionGate, Arc<MemoryStore>) {
        let store = Arc::new(store);
        (SessionGate::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_no_session_means_logged_out() {
        let (gate, _store) = gate_with(MemoryStore::new());
        assert_eq!(gate.state(), GateState::Unchecked);

        gate.start().await;
        assert_eq!(gate.state(), GateState::LoggedOut);
    }

    #[tokio::test]
    async fn test_active_profile_is_admitted() {
        let store = MemoryStore::new();
        store.set_session(Some(session("u1")));
        store.put_profile(profile("u1", true));
        let (gate, _store) = gate_with(store);

        gate.start().await;
        assert_eq!(gate.state(), GateState::Admitted(session("u1")));
    }

    #[tokio::test]
    async fn test_inactive_profile_is_denied_despite_valid_session() {
        let store = MemoryStore::new();
        store.set_session(Some(session("u1")));
        store.put_profile(profile("u1", false));
        let (gate, _store) = gate_with(store);

        gate.start().await;
        assert_eq!(gate.state(), GateState::Denied(DenialReason::Inactive));
    }

    #[tokio::test]
    async fn test_missing_profile_is_denied_with_distinct_reason() {
        let store = MemoryStore::new();
        store.set_session(Some(session("u1")));
        let (gate, _store) = gate_with(store);

        gate.start().await;
        assert_eq!(gate.state(), GateState::Denied(DenialReason::MissingProfile));
        assert_ne!(
            DenialReason::MissingProfile.message(),
            DenialReason::Inactive.message()
        );
    }

    #[tokio::test]
    async fn test_verification_error_fails_closed() {
        let store = MemoryStore::new();
        store.set_session(Some(session("u1")));
        store.put_profile(profile("u1", true));
        store.fail_profile_fetches(true);
        let (gate, _store) = gate_with(store);

        gate.start().await;
        assert_eq!(
            gate.state(),
            GateState::Denied(DenialReason::VerificationFailed)
        );
    }

    #[tokio::test]
    async fn test_denial_triggers_best_effort_sign_out() {
        let store = MemoryStore::new();
        store.set_session(Some(session("u1")));
        store.put_profile(profile("u1", false));
        let (gate, store) = gate_with(store);

        gate.start().await;
        assert!(matches!(gate.state(), GateState::Denied(_)));

        // The sign-out is spawned; give it a few polls to land
        for _ in 0..8 {
            if store.session().is_none() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(store.session().is_none(), "remote sign-out should be requested");
    }

    #[tokio::test]
    async fn test_dismissal_returns_to_logged_out_not_admitted() {
        let store = MemoryStore::new();
        store.set_session(Some(session("u1")));
        store.put_profile(profile("u1", false));
        let (gate, _store) = gate_with(store);

        gate.start().await;
        gate.dismiss_denial();
        assert_eq!(gate.state(), GateState::LoggedOut);

        // Dismissing when not denied is a no-op
        gate.dismiss_denial();
        assert_eq!(gate.state(), GateState::LoggedOut);
    }

    #[tokio::test]
    async fn test_sign_in_event_revalidates() {
        let store = MemoryStore::new();
        store.put_profile(profile("u2", true));
        let (gate, store) = gate_with(store);

        gate.start().await;
        assert_eq!(gate.state(), GateState::LoggedOut);

        gate.handle_event(AuthEvent::SignedIn(session("u2"))).await;
        assert_eq!(gate.state(), GateState::Admitted(session("u2")));

        // A token refresh re-runs validation against the current profile
        gate.handle_event(AuthEvent::TokenRefreshed(session("u2")))
            .await;
        assert_eq!(gate.state(), GateState::Admitted(session("u2")));

        // If the profile was deactivated meanwhile, the refresh denies
        store.put_profile(profile("u2", false));
        gate.handle_event(AuthEvent::TokenRefreshed(session("u2")))
            .await;
        assert_eq!(gate.state(), GateState::Denied(DenialReason::Inactive));

        gate.handle_event(AuthEvent::SignedOut).await;
        assert_eq!(gate.state(), GateState::LoggedOut);
    }

    #[tokio::test]
    async fn test_run_drives_gate_from_store_events() {
        let store = Arc::new(MemoryStore::new());
        store.put_profile(profile("u1", true));
        let gate = Arc::new(SessionGate::new(
            Arc::clone(&store) as Arc<dyn RemoteStore>
        ));

        let runner = Arc::clone(&gate);
        let events = store.auth_events();
        let task = tokio::spawn(async move { runner.run(events).await });

        let mut states = gate.subscribe();
        store.sign_in("u1@example.com", "pw").await.expect("sign in");
        states
            .wait_for(|s| matches!(s, GateState::Admitted(_)))
            .await
            .expect("admitted");

        store.sign_out().await.expect("sign out");
        states
            .wait_for(|s| *s == GateState::LoggedOut)
            .await
            .expect("logged out");
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_validation_cannot_downgrade_newer_state() {
        let store = MemoryStore::new();
        // No profile for u1, so its validation would deny - but it is slow
        store.set_profile_delay(Duration::from_secs(5));
        let store = Arc::new(store);
        let gate = Arc::new(SessionGate::new(store.clone()));

        let slow_gate = Arc::clone(&gate);
        let slow = tokio::spawn(async move {
            slow_gate
                .handle_event(AuthEvent::SignedIn(session("u1")))
                .await;
        });
        // Let the slow validation get in flight
        tokio::task::yield_now().await;

        // A sign-out supersedes the pending validation
        gate.handle_event(AuthEvent::SignedOut).await;
        assert_eq!(gate.state(), GateState::LoggedOut);

        slow.await.expect("validation task");
        // The stale denial must have been discarded
        assert_eq!(gate.state(), GateState::LoggedOut);
    }
}
