//! Lectio Core - Shared library for the Lectio reading-plan service
//!
//! This crate provides the core functionality behind the Lectio CLI:
//! - The 365-day reading-plan resolver with remote sync and bundled fallback
//! - The session gate that admits or denies users based on profile status
//! - A remote store client for the hosted backend (rows + auth)
//! - The notes service joining reading progress with plan entries
//! - The admin member-creation HTTP endpoint

pub mod admin;
pub mod auth;
pub mod backend;
pub mod config;
pub mod constants;
pub mod notes;
pub mod paths;
pub mod plan;

// Re-exports for convenience
pub use auth::{DenialReason, GateState, SessionGate};
pub use backend::{
    AuthEvent, CreatedUser, MemoryStore, NewMember, Profile, RemoteStore, RestStore, Session,
    StoreError,
};
pub use config::BackendConfig;
pub use notes::{NoteEntry, NotesService};
pub use plan::{PlanResolver, ReadingPlanDay};
