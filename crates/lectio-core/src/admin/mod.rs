//! Admin member-creation endpoint
//!
//! A small HTTP surface for admins: `POST /members` with
//! `{ name, email, password }` creates an auth identity plus its profile row.
//! Preflight requests get permissive CORS headers, and every failure path is
//! caught and returned as a JSON `{ "error": message }` body with a non-2xx
//! status; nothing crashes the process.
//!
//! `tiny_http`'s accept loop is blocking, so the server runs on a dedicated
//! thread and bridges into the async store with a runtime [`Handle`].

use std::io::Read;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tiny_http::{Header, Method, Request, Response};
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::backend::{CreatedUser, NewMember, Profile, RemoteStore, StoreResult};

const CORS_HEADERS: [(&str, &str); 2] = [
    ("Access-Control-Allow-Origin", "*"),
    (
        "Access-Control-Allow-Headers",
        "authorization, content-type, apikey",
    ),
];

#[derive(Debug, Default, Deserialize)]
struct MemberPayload {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

/// Create an auth identity and its profile row
///
/// Shared by the HTTP endpoint and the CLI `members create` command.
pub async fn create_member(store: &dyn RemoteStore, member: NewMember) -> StoreResult<CreatedUser> {
    let created = store.create_user(&member).await?;

    let profile = Profile {
        id: created.id.clone(),
        name: Some(member.name),
        email: Some(member.email),
        avatar_url: None,
        is_active: true,
        updated_at: Some(Utc::now()),
    };
    store.upsert_profile(&profile).await?;

    info!(user_id = %created.id, "member created");
    Ok(created)
}

fn error_body(message: impl Into<String>) -> Value {
    json!({ "error": message.into() })
}

/// Handle a member-creation request body, returning (status, JSON body)
pub async fn process_member_request(store: &dyn RemoteStore, body: &str) -> (u16, Value) {
    let payload: MemberPayload = match serde_json::from_str(body) {
        Ok(payload) => payload,
        Err(e) => return (400, error_body(format!("invalid request body: {e}"))),
    };

    let field = |value: Option<String>| value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let (Some(name), Some(email), Some(password)) = (
        field(payload.name),
        field(payload.email),
        field(payload.password),
    ) else {
        return (400, error_body("name, email and password are required"));
    };

    let member = NewMember {
        name,
        email,
        password,
    };
    match create_member(store, member).await {
        Ok(created) => (201, json!({ "user": created })),
        Err(e) => (400, error_body(format!("failed to create member: {e}"))),
    }
}

/// Run the member endpoint on `addr`, blocking the calling thread
///
/// `handle` must belong to the runtime that owns the store's I/O.
pub fn run_member_server(addr: &str, store: Arc<dyn RemoteStore>, handle: Handle) -> Result<()> {
    let server =
        tiny_http::Server::http(addr).map_err(|e| anyhow!("failed to bind {addr}: {e}"))?;
    info!("member endpoint listening on http://{addr}");

    for request in server.incoming_requests() {
        handle_request(request, store.as_ref(), &handle);
    }
    Ok(())
}

fn handle_request(mut request: Request, store: &dyn RemoteStore, handle: &Handle) {
    let method = request.method().clone();
    let url = request.url().to_string();

    let (status, body) = match (&method, url.as_str()) {
        (Method::Options, _) => (200, None),
        (Method::Post, "/members") => {
            let mut payload = String::new();
            match request.as_reader().read_to_string(&mut payload) {
                Ok(_) => {
                    let (status, body) = handle.block_on(process_member_request(store, &payload));
                    (status, Some(body))
                }
                Err(e) => (400, Some(error_body(format!("failed to read request body: {e}")))),
            }
        }
        (Method::Post, _) | (Method::Get, _) => (404, Some(error_body("not found"))),
        _ => (405, Some(error_body("method not allowed"))),
    };

    respond(request, status, body);
}

fn respond(request: Request, status: u16, body: Option<Value>) {
    let mut response = match &body {
        Some(value) => Response::from_string(value.to_string()),
        None => Response::from_string("ok"),
    }
    .with_status_code(status);

    for (name, value) in CORS_HEADERS {
        if let Ok(header) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            response = response.with_header(header);
        }
    }
    if body.is_some() {
        if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
            response = response.with_header(header);
        }
    }

    if let Err(e) = request.respond(response) {
        warn!("failed to send response: {e}");
    }
}
