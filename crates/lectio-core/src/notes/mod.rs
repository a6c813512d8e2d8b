//! Notes service
//!
//! Joins a user's reading-progress notes with the matching plan entries.
//! The join is display-only enrichment; notes are never stored denormalized.

use std::sync::Arc;

use anyhow::{ensure, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::backend::RemoteStore;
use crate::plan::PlanResolver;

/// One note, enriched with its plan entry for display
#[derive(Debug, Clone, Serialize)]
pub struct NoteEntry {
    pub day: u16,
    pub notes: String,
    pub updated_at: Option<DateTime<Utc>>,
    /// Passage from the plan entry, if the day resolves
    pub passage: Option<String>,
    /// Theme from the plan entry, if the day resolves
    pub theme: Option<String>,
}

/// Reads and writes user notes
pub struct NotesService {
    store: Arc<dyn RemoteStore>,
    plan: Arc<PlanResolver>,
}

impl NotesService {
    pub fn new(store: Arc<dyn RemoteStore>, plan: Arc<PlanResolver>) -> Self {
        Self { store, plan }
    }

    /// All non-empty notes for a user, newest day first, joined with the plan
    pub async fn list_notes(&self, user_id: &str) -> Result<Vec<NoteEntry>> {
        let rows = self.store.list_notes(user_id).await?;

        // Join against the synced plan so passages match the remote copy
        self.plan.ensure_synced().await;

        let entries = rows
            .into_iter()
            .map(|row| {
                let plan_day = self.plan.day(row.day_number);
                NoteEntry {
                    day: row.day_number,
                    notes: row.notes,
                    updated_at: row.updated_at,
                    passage: plan_day.as_ref().map(|d| d.passage.clone()),
                    theme: plan_day.map(|d| d.theme),
                }
            })
            .collect();
        Ok(entries)
    }

    /// Upsert the note for one plan day
    pub async fn save_note(&self, user_id: &str, day: u16, notes: &str) -> Result<()> {
        ensure!(
            (1..=self.plan.total_days()).contains(&day),
            "day {day} is outside the reading plan"
        );
        self.store.save_note(user_id, day, notes).await?;
        Ok(())
    }
}
