//! REST client for the hosted backend
//!
//! Speaks the backend's two HTTP surfaces: the row API
//! (`/rest/v1/<table>` with `select`/`eq.`/`order` query filters and
//! `Prefer: resolution=merge-duplicates` upserts) and the auth API
//! (`/auth/v1/token`, `/auth/v1/user`, `/auth/v1/logout`,
//! `/auth/v1/admin/users`). Every call is attempted once; retries are the
//! caller's problem by design.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;
use tracing::debug;

use super::{
    AuthEvent, CreatedUser, NewMember, NoteRow, Profile, RemoteStore, Session, StoreError,
    StoreResult,
};
use crate::config::BackendConfig;
use crate::constants;
use crate::plan::ReadingPlanDay;

/// Header used by the backend to identify the project
const APIKEY_HEADER: &str = "apikey";

/// Reading-plan row as stored in the `reading_plan` table
#[derive(Debug, Serialize, Deserialize)]
struct PlanRow {
    day_number: u16,
    passage: String,
    theme: String,
    category: String,
    book: String,
    estimated_time: String,
}

impl From<PlanRow> for ReadingPlanDay {
    fn from(row: PlanRow) -> Self {
        ReadingPlanDay {
            day: row.day_number,
            passage: row.passage,
            theme: row.theme,
            category: row.category,
            book: row.book,
            estimated_time: row.estimated_time,
        }
    }
}

impl From<&ReadingPlanDay> for PlanRow {
    fn from(day: &ReadingPlanDay) -> Self {
        PlanRow {
            day_number: day.day,
            passage: day.passage.clone(),
            theme: day.theme.clone(),
            category: day.category.clone(),
            book: day.book.clone(),
            estimated_time: day.estimated_time.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

/// [`RemoteStore`] backed by the hosted backend's HTTP APIs
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
    service_key: Option<String>,
    access_token: RwLock<Option<String>>,
    events: broadcast::Sender<AuthEvent>,
}

impl RestStore {
    /// Build a store from backend config
    pub fn new(config: &BackendConfig) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(constants::http::USER_AGENT)
            .connect_timeout(constants::http::CONNECT_TIMEOUT)
            .timeout(constants::http::REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            service_key: config.service_key.clone(),
            access_token: RwLock::new(None),
            events: broadcast::channel(16).0,
        })
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn token(&self) -> Option<String> {
        self.access_token.read().map(|t| (*t).clone()).unwrap_or(None)
    }

    fn set_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.access_token.write() {
            *guard = token;
        }
    }

    /// Bearer value for row operations: service key, then session token,
    /// then the anon key
    fn rest_bearer(&self) -> String {
        self.service_key
            .clone()
            .or_else(|| self.token())
            .unwrap_or_else(|| self.anon_key.clone())
    }

    fn service_key(&self) -> StoreResult<&str> {
        self.service_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                StoreError::NotConfigured("service key required for admin operations".to_string())
            })
    }

    fn rest_request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.rest_url(table))
            .header(APIKEY_HEADER, &self.anon_key)
            .bearer_auth(self.rest_bearer())
    }

    /// Turn a non-success response into [`StoreError::Api`]
    async fn check(response: reqwest::Response) -> StoreResult<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StoreError::api(status.as_u16(), message));
        }
        Ok(response)
    }

    fn publish(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl RemoteStore for RestStore {
    async fn current_session(&self) -> StoreResult<Option<Session>> {
        let Some(token) = self.token() else {
            return Ok(None);
        };

        let response = self
            .client
            .get(self.auth_url("user"))
            .header(APIKEY_HEADER, &self.anon_key)
            .bearer_auth(&token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            debug!("stored access token rejected, clearing session");
            self.set_token(None);
            return Ok(None);
        }
        let response = Self::check(response).await?;
        let user: AuthUser = response.json().await?;

        Ok(Some(Session {
            user_id: user.id,
            email: user.email.unwrap_or_default(),
            access_token: token,
        }))
    }

    async fn sign_in(&self, email: &str, password: &str) -> StoreResult<Session> {
        let response = self
            .client
            .post(self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .header(APIKEY_HEADER, &self.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let response = Self::check(response).await?;
        let token: TokenResponse = response.json().await?;

        let session = Session {
            user_id: token.user.id,
            email: token.user.email.unwrap_or_else(|| email.to_string()),
            access_token: token.access_token.clone(),
        };
        self.set_token(Some(token.access_token));
        self.publish(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> StoreResult<()> {
        let Some(token) = self.token() else {
            return Ok(());
        };

        let response = self
            .client
            .post(self.auth_url("logout"))
            .header(APIKEY_HEADER, &self.anon_key)
            .bearer_auth(&token)
            .send()
            .await?;
        // The local session is gone regardless of what the backend said
        self.set_token(None);
        self.publish(AuthEvent::SignedOut);
        Self::check(response).await?;
        Ok(())
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn fetch_profile(&self, user_id: &str) -> StoreResult<Option<Profile>> {
        let filter = format!("eq.{user_id}");
        let response = self
            .rest_request(reqwest::Method::GET, "profiles")
            .query(&[("select", "*"), ("id", filter.as_str())])
            .send()
            .await?;
        let response = Self::check(response).await?;
        let mut rows: Vec<Profile> = response.json().await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    async fn update_profile_name(&self, user_id: &str, name: &str) -> StoreResult<()> {
        let filter = format!("eq.{user_id}");
        let response = self
            .rest_request(reqwest::Method::PATCH, "profiles")
            .query(&[("id", filter.as_str())])
            .json(&json!({ "name": name, "updated_at": Utc::now().to_rfc3339() }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn upsert_profile(&self, profile: &Profile) -> StoreResult<()> {
        let response = self
            .rest_request(reqwest::Method::POST, "profiles")
            .header("Prefer", "resolution=merge-duplicates")
            .json(profile)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn list_profiles(&self) -> StoreResult<Vec<Profile>> {
        let response = self
            .rest_request(reqwest::Method::GET, "profiles")
            .query(&[("select", "*"), ("order", "name.asc")])
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn set_profile_active(&self, user_id: &str, active: bool) -> StoreResult<()> {
        let filter = format!("eq.{user_id}");
        let response = self
            .rest_request(reqwest::Method::PATCH, "profiles")
            .query(&[("id", filter.as_str())])
            .json(&json!({ "is_active": active, "updated_at": Utc::now().to_rfc3339() }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn fetch_reading_plan(&self) -> StoreResult<Vec<ReadingPlanDay>> {
        let response = self
            .rest_request(reqwest::Method::GET, "reading_plan")
            .query(&[("select", "*"), ("order", "day_number.asc")])
            .send()
            .await?;
        let response = Self::check(response).await?;
        let rows: Vec<PlanRow> = response.json().await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn replace_reading_plan(&self, days: &[ReadingPlanDay]) -> StoreResult<()> {
        // Wholesale replacement: clear the table, then insert the new rows
        let response = self
            .rest_request(reqwest::Method::DELETE, "reading_plan")
            .query(&[("day_number", "gte.0")])
            .send()
            .await?;
        Self::check(response).await?;

        let rows: Vec<PlanRow> = days.iter().map(Into::into).collect();
        let response = self
            .rest_request(reqwest::Method::POST, "reading_plan")
            .json(&rows)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn list_notes(&self, user_id: &str) -> StoreResult<Vec<NoteRow>> {
        let filter = format!("eq.{user_id}");
        let response = self
            .rest_request(reqwest::Method::GET, "reading_progress")
            .query(&[
                ("select", "user_id,day_number,notes,updated_at"),
                ("user_id", filter.as_str()),
                ("notes", "not.is.null"),
                ("notes", "neq."),
                ("order", "day_number.desc"),
            ])
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn save_note(&self, user_id: &str, day: u16, notes: &str) -> StoreResult<()> {
        let response = self
            .rest_request(reqwest::Method::POST, "reading_progress")
            .header("Prefer", "resolution=merge-duplicates")
            .json(&json!({
                "user_id": user_id,
                "day_number": day,
                "notes": notes,
                "updated_at": Utc::now().to_rfc3339(),
            }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn create_user(&self, member: &NewMember) -> StoreResult<CreatedUser> {
        let service_key = self.service_key()?;

        let response = self
            .client
            .post(self.auth_url("admin/users"))
            .header(APIKEY_HEADER, &self.anon_key)
            .bearer_auth(service_key)
            .json(&json!({
                "email": member.email,
                "password": member.password,
                "email_confirm": true,
                "user_metadata": { "full_name": member.name },
            }))
            .send()
            .await?;
        let response = Self::check(response).await?;
        let user: AuthUser = response.json().await?;

        Ok(CreatedUser {
            id: user.id,
            email: user.email.unwrap_or_else(|| member.email.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_row_maps_wire_columns() {
        let wire = r#"[
            {"day_number": 1, "passage": "Genesis 1-4", "theme": "Beginnings",
             "category": "Law", "book": "Genesis", "estimated_time": "16 min"},
            {"day_number": 2, "passage": "Genesis 5-8", "theme": "Beginnings",
             "category": "Law", "book": "Genesis", "estimated_time": "16 min"}
        ]"#;

        let rows: Vec<PlanRow> = serde_json::from_str(wire).expect("decode rows");
        let days: Vec<ReadingPlanDay> = rows.into_iter().map(Into::into).collect();
        assert_eq!(days[0].day, 1);
        assert_eq!(days[0].estimated_time, "16 min");
        assert_eq!(days[1].passage, "Genesis 5-8");
    }

    #[test]
    fn test_profile_row_decodes_from_wire_shape() {
        let wire = r#"{"id": "u1", "name": "Ana", "email": "ana@example.com",
                       "avatar_url": null, "is_active": false,
                       "updated_at": "2026-01-15T10:30:00Z"}"#;

        let profile: Profile = serde_json::from_str(wire).expect("decode profile");
        assert_eq!(profile.id, "u1");
        assert!(!profile.is_active);
        assert!(profile.avatar_url.is_none());
        assert!(profile.updated_at.is_some());
    }

    #[test]
    fn test_token_response_decodes() {
        let wire = r#"{"access_token": "tok", "token_type": "bearer",
                       "user": {"id": "u1", "email": "ana@example.com"}}"#;

        let token: TokenResponse = serde_json::from_str(wire).expect("decode token");
        assert_eq!(token.access_token, "tok");
        assert_eq!(token.user.id, "u1");
    }

    #[test]
    fn test_urls_are_joined_without_double_slashes() {
        let config = BackendConfig {
            url: "https://project.example.co/".to_string(),
            anon_key: "anon".to_string(),
            service_key: None,
        };
        let store = RestStore::new(&config).expect("build store");
        assert_eq!(
            store.rest_url("profiles"),
            "https://project.example.co/rest/v1/profiles"
        );
        assert_eq!(
            store.auth_url("admin/users"),
            "https://project.example.co/auth/v1/admin/users"
        );
    }

    #[test]
    fn test_create_user_requires_service_key() {
        let config = BackendConfig {
            url: "https://project.example.co".to_string(),
            anon_key: "anon".to_string(),
            service_key: None,
        };
        let store = RestStore::new(&config).expect("build store");
        assert!(matches!(
            store.service_key(),
            Err(StoreError::NotConfigured(_))
        ));
    }
}
