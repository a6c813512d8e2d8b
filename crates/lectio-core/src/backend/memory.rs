//! In-memory store
//!
//! A self-contained [`RemoteStore`] used by tests and offline demos. State
//! lives behind a mutex; failure injection flags simulate an unreachable
//! backend for the fail-closed paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;

use super::{
    AuthEvent, CreatedUser, NewMember, NoteRow, Profile, RemoteStore, Session, StoreError,
    StoreResult,
};
use crate::plan::ReadingPlanDay;

#[derive(Default)]
struct Inner {
    session: Option<Session>,
    profiles: HashMap<String, Profile>,
    plan: Vec<ReadingPlanDay>,
    notes: HashMap<(String, u16), NoteRow>,
    created_users: Vec<CreatedUser>,
    profile_delay: Option<Duration>,
}

/// In-memory [`RemoteStore`] implementation
pub struct MemoryStore {
    inner: Mutex<Inner>,
    events: broadcast::Sender<AuthEvent>,
    fail_profiles: AtomicBool,
    fail_plan: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            events: broadcast::channel(16).0,
            fail_profiles: AtomicBool::new(false),
            fail_plan: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install a session as the current one
    pub fn set_session(&self, session: Option<Session>) {
        self.lock().session = session;
    }

    /// Current session, if any (inspection helper)
    pub fn session(&self) -> Option<Session> {
        self.lock().session.clone()
    }

    /// Insert a profile row
    pub fn put_profile(&self, profile: Profile) {
        self.lock().profiles.insert(profile.id.clone(), profile);
    }

    /// Install the remote plan rows
    pub fn set_plan(&self, plan: Vec<ReadingPlanDay>) {
        self.lock().plan = plan;
    }

    /// Insert a note row directly
    pub fn put_note(&self, note: NoteRow) {
        self.lock()
            .notes
            .insert((note.user_id.clone(), note.day_number), note);
    }

    /// Number of identities created through [`RemoteStore::create_user`]
    pub fn created_user_count(&self) -> usize {
        self.lock().created_users.len()
    }

    /// Make profile fetches fail with a simulated backend error
    pub fn fail_profile_fetches(&self, fail: bool) {
        self.fail_profiles.store(fail, Ordering::SeqCst);
    }

    /// Make plan fetches fail with a simulated backend error
    pub fn fail_plan_fetches(&self, fail: bool) {
        self.fail_plan.store(fail, Ordering::SeqCst);
    }

    /// Delay profile fetches, for exercising in-flight validation races
    pub fn set_profile_delay(&self, delay: Duration) {
        self.lock().profile_delay = Some(delay);
    }

    fn publish(&self, event: AuthEvent) {
        // No receivers is fine; events are best-effort notifications
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn current_session(&self) -> StoreResult<Option<Session>> {
        Ok(self.lock().session.clone())
    }

    async fn sign_in(&self, email: &str, _password: &str) -> StoreResult<Session> {
        let profile = self
            .lock()
            .profiles
            .values()
            .find(|p| p.email.as_deref() == Some(email))
            .cloned()
            .ok_or(StoreError::NotAuthenticated)?;

        let session = Session {
            user_id: profile.id.clone(),
            email: email.to_string(),
            access_token: uuid::Uuid::new_v4().to_string(),
        };
        self.lock().session = Some(session.clone());
        self.publish(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> StoreResult<()> {
        self.lock().session = None;
        self.publish(AuthEvent::SignedOut);
        Ok(())
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn fetch_profile(&self, user_id: &str) -> StoreResult<Option<Profile>> {
        let delay = self.lock().profile_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_profiles.load(Ordering::SeqCst) {
            return Err(StoreError::api(500, "simulated profile failure"));
        }
        Ok(self.lock().profiles.get(user_id).cloned())
    }

    async fn update_profile_name(&self, user_id: &str, name: &str) -> StoreResult<()> {
        let mut inner = self.lock();
        let profile = inner
            .profiles
            .get_mut(user_id)
            .ok_or_else(|| StoreError::api(404, "profile not found"))?;
        profile.name = Some(name.to_string());
        profile.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn upsert_profile(&self, profile: &Profile) -> StoreResult<()> {
        self.lock()
            .profiles
            .insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn list_profiles(&self) -> StoreResult<Vec<Profile>> {
        let mut profiles: Vec<Profile> = self.lock().profiles.values().cloned().collect();
        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(profiles)
    }

    async fn set_profile_active(&self, user_id: &str, active: bool) -> StoreResult<()> {
        let mut inner = self.lock();
        let profile = inner
            .profiles
            .get_mut(user_id)
            .ok_or_else(|| StoreError::api(404, "profile not found"))?;
        profile.is_active = active;
        profile.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn fetch_reading_plan(&self) -> StoreResult<Vec<ReadingPlanDay>> {
        if self.fail_plan.load(Ordering::SeqCst) {
            return Err(StoreError::api(500, "simulated plan failure"));
        }
        let mut plan = self.lock().plan.clone();
        plan.sort_by_key(|d| d.day);
        Ok(plan)
    }

    async fn replace_reading_plan(&self, days: &[ReadingPlanDay]) -> StoreResult<()> {
        self.lock().plan = days.to_vec();
        Ok(())
    }

    async fn list_notes(&self, user_id: &str) -> StoreResult<Vec<NoteRow>> {
        let mut notes: Vec<NoteRow> = self
            .lock()
            .notes
            .values()
            .filter(|n| n.user_id == user_id && !n.notes.is_empty())
            .cloned()
            .collect();
        notes.sort_by(|a, b| b.day_number.cmp(&a.day_number));
        Ok(notes)
    }

    async fn save_note(&self, user_id: &str, day: u16, notes: &str) -> StoreResult<()> {
        let row = NoteRow {
            user_id: user_id.to_string(),
            day_number: day,
            notes: notes.to_string(),
            updated_at: Some(Utc::now()),
        };
        self.lock().notes.insert((user_id.to_string(), day), row);
        Ok(())
    }

    async fn create_user(&self, member: &NewMember) -> StoreResult<CreatedUser> {
        let mut inner = self.lock();
        if inner
            .profiles
            .values()
            .any(|p| p.email.as_deref() == Some(member.email.as_str()))
        {
            return Err(StoreError::api(422, "email already registered"));
        }
        let created = CreatedUser {
            id: uuid::Uuid::new_v4().to_string(),
            email: member.email.clone(),
        };
        inner.created_users.push(created.clone());
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str, email: &str, active: bool) -> Profile {
        Profile {
            id: id.to_string(),
            name: Some("Test User".to_string()),
            email: Some(email.to_string()),
            avatar_url: None,
            is_active: active,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_sign_in_and_out_publish_events() {
        let store = MemoryStore::new();
        store.put_profile(profile("u1", "u1@example.com", true));
        let mut events = store.auth_events();

        let session = store
            .sign_in("u1@example.com", "pw")
            .await
            .expect("sign in");
        assert_eq!(session.user_id, "u1");
        assert!(matches!(
            events.recv().await.expect("event"),
            AuthEvent::SignedIn(_)
        ));

        store.sign_out().await.expect("sign out");
        assert!(matches!(
            events.recv().await.expect("event"),
            AuthEvent::SignedOut
        ));
        assert!(store.session().is_none());
    }

    #[tokio::test]
    async fn test_create_user_rejects_duplicate_email() {
        let store = MemoryStore::new();
        store.put_profile(profile("u1", "taken@example.com", true));

        let member = NewMember {
            name: "New".to_string(),
            email: "taken@example.com".to_string(),
            password: "pw".to_string(),
        };
        let err = store.create_user(&member).await.expect_err("duplicate");
        assert!(matches!(err, StoreError::Api { status: 422, .. }));
        assert_eq!(store.created_user_count(), 0);
    }

    fn plan_day(day: u16) -> ReadingPlanDay {
        ReadingPlanDay {
            day,
            passage: format!("Passage {day}"),
            theme: "Theme".to_string(),
            category: "History".to_string(),
            book: "Book".to_string(),
            estimated_time: "10 min".to_string(),
        }
    }

    #[tokio::test]
    async fn test_update_profile_name_touches_updated_at() {
        let store = MemoryStore::new();
        store.put_profile(profile("u1", "u1@example.com", true));

        store
            .update_profile_name("u1", "Renamed")
            .await
            .expect("rename");
        let updated = store
            .fetch_profile("u1")
            .await
            .expect("fetch")
            .expect("profile");
        assert_eq!(updated.name.as_deref(), Some("Renamed"));
        assert!(updated.updated_at.is_some());

        let err = store
            .update_profile_name("ghost", "x")
            .await
            .expect_err("missing profile");
        assert!(matches!(err, StoreError::Api { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_replace_reading_plan_is_wholesale() {
        let store = MemoryStore::new();
        store.set_plan(vec![plan_day(1), plan_day(2)]);

        store
            .replace_reading_plan(&[plan_day(9), plan_day(8)])
            .await
            .expect("replace");

        let plan = store.fetch_reading_plan().await.expect("fetch");
        let days: Vec<u16> = plan.iter().map(|d| d.day).collect();
        assert_eq!(days, vec![8, 9], "old rows must be gone, new rows sorted");
    }

    #[tokio::test]
    async fn test_list_notes_skips_empty_and_orders_newest_first() {
        let store = MemoryStore::new();
        store.save_note("u1", 3, "third").await.expect("save");
        store.save_note("u1", 10, "tenth").await.expect("save");
        store.put_note(NoteRow {
            user_id: "u1".to_string(),
            day_number: 5,
            notes: String::new(),
            updated_at: None,
        });
        store.save_note("u2", 1, "other user").await.expect("save");

        let notes = store.list_notes("u1").await.expect("list");
        let days: Vec<u16> = notes.iter().map(|n| n.day_number).collect();
        assert_eq!(days, vec![10, 3]);
    }
}
