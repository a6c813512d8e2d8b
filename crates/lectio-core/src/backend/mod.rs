//! Remote store abstraction
//!
//! The hosted backend is treated as an opaque remote data store: row-level
//! query and mutation against three logical tables (profiles, reading_plan,
//! reading_progress) plus session retrieval, sign-in/out, and the auth admin
//! API for member creation. Services take a [`RemoteStore`] so they can be
//! driven by the real REST client or by [`MemoryStore`] in tests.

pub mod error;
pub mod memory;
pub mod rest;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use rest::RestStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::plan::ReadingPlanDay;

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// An authenticated session observed from the backend (not owned by us)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub access_token: String,
}

/// A user profile row - the sole authority for admission decisions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A reading_progress row carrying user notes for one plan day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteRow {
    pub user_id: String,
    pub day_number: u16,
    pub notes: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Input for member creation
#[derive(Debug, Clone, Deserialize)]
pub struct NewMember {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// An identity created through the auth admin API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedUser {
    pub id: String,
    pub email: String,
}

/// Session-change notifications published by a store
#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
}

/// Remote data store operations consumed by the services
///
/// Every call is attempted once per trigger; there is no retry policy.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    // Auth
    /// Fetch the current session, if any
    async fn current_session(&self) -> StoreResult<Option<Session>>;
    /// Password sign-in; publishes [`AuthEvent::SignedIn`] on success
    async fn sign_in(&self, email: &str, password: &str) -> StoreResult<Session>;
    /// Sign out the current session; publishes [`AuthEvent::SignedOut`]
    async fn sign_out(&self) -> StoreResult<()>;
    /// Subscribe to session-change notifications
    fn auth_events(&self) -> broadcast::Receiver<AuthEvent>;

    // Profiles
    /// Fetch the profile row for a user, None if no row exists
    async fn fetch_profile(&self, user_id: &str) -> StoreResult<Option<Profile>>;
    /// Update the display name on a profile
    async fn update_profile_name(&self, user_id: &str, name: &str) -> StoreResult<()>;
    /// Insert or replace a profile row
    async fn upsert_profile(&self, profile: &Profile) -> StoreResult<()>;
    /// List all profiles (admin)
    async fn list_profiles(&self) -> StoreResult<Vec<Profile>>;
    /// Flip the active flag on a profile (admin)
    async fn set_profile_active(&self, user_id: &str, active: bool) -> StoreResult<()>;

    // Reading plan
    /// Fetch the authoritative plan, ordered by day number
    async fn fetch_reading_plan(&self) -> StoreResult<Vec<ReadingPlanDay>>;
    /// Replace the remote plan wholesale (admin)
    async fn replace_reading_plan(&self, days: &[ReadingPlanDay]) -> StoreResult<()>;

    // Notes
    /// List a user's non-empty notes, newest day first
    async fn list_notes(&self, user_id: &str) -> StoreResult<Vec<NoteRow>>;
    /// Upsert the note for one (user, day) pair
    async fn save_note(&self, user_id: &str, day: u16, notes: &str) -> StoreResult<()>;

    // Admin
    /// Create an auth identity through the admin API
    async fn create_user(&self, member: &NewMember) -> StoreResult<CreatedUser>;
}
