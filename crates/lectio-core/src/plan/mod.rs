//! Reading plan resolver
//!
//! Maps day-of-year to devotional content. The resolver starts from the
//! bundled default plan and asynchronously reconciles with the authoritative
//! remote copy: on a successful fetch the local set is replaced wholesale, on
//! failure the bundled default is silently retained. Callers that depend on
//! remote data await [`PlanResolver::ensure_synced`] first.

mod data;

pub use data::bundled_plan;

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::backend::RemoteStore;
use crate::constants;

/// One day of the reading plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingPlanDay {
    pub day: u16,
    pub passage: String,
    pub theme: String,
    pub category: String,
    pub book: String,
    #[serde(rename = "estimatedTime")]
    pub estimated_time: String,
}

/// Resolves day numbers to plan entries
///
/// Lifecycle: construct, async-init (remote sync attempt), ready. There is no
/// process-wide singleton; callers own the instance and inject the store.
pub struct PlanResolver {
    days: RwLock<Vec<ReadingPlanDay>>,
    synced: watch::Sender<bool>,
}

impl PlanResolver {
    fn with_synced(synced: bool) -> Self {
        Self {
            days: RwLock::new(bundled_plan().to_vec()),
            synced: watch::channel(synced).0,
        }
    }

    /// Resolver over the bundled default plan only, no remote sync
    pub fn bundled() -> Self {
        Self::with_synced(true)
    }

    /// Resolver that starts from the bundled plan and syncs in the background
    ///
    /// The sync attempt is spawned immediately; reads before
    /// [`ensure_synced`](Self::ensure_synced) resolves may observe the
    /// bundled default.
    pub fn with_store(store: Arc<dyn RemoteStore>) -> Arc<Self> {
        let resolver = Arc::new(Self::with_synced(false));
        let task = Arc::clone(&resolver);
        tokio::spawn(async move {
            task.sync(store.as_ref()).await;
        });
        resolver
    }

    /// Run one sync attempt against the store
    ///
    /// Failures are logged and swallowed; the bundled default stays active.
    /// Marks the sync signal complete whether or not the fetch succeeded.
    pub async fn sync(&self, store: &dyn RemoteStore) {
        match store.fetch_reading_plan().await {
            Ok(rows) => {
                if self.install(rows) {
                    info!("reading plan synced from remote store");
                }
            }
            Err(e) => {
                warn!("reading plan sync failed, keeping bundled default: {e}");
            }
        }
        self.synced.send_replace(true);
    }

    /// Replace the active set if the rows are valid; returns whether installed
    ///
    /// An empty set or duplicate day numbers would break the one-entry-per-day
    /// invariant, so such a payload is rejected and the current set retained.
    fn install(&self, mut rows: Vec<ReadingPlanDay>) -> bool {
        if rows.is_empty() {
            warn!("remote reading plan is empty, keeping current set");
            return false;
        }
        let unique: HashSet<u16> = rows.iter().map(|d| d.day).collect();
        if unique.len() != rows.len() {
            warn!(
                "remote reading plan has duplicate day numbers ({} rows, {} distinct), keeping current set",
                rows.len(),
                unique.len()
            );
            return false;
        }
        rows.sort_by_key(|d| d.day);
        let mut days = self
            .days
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *days = rows;
        true
    }

    /// Wait until the initial sync attempt has completed (success or failure)
    pub async fn ensure_synced(&self) {
        let mut rx = self.synced.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Look up the plan entry for a day number
    pub fn day(&self, day: u16) -> Option<ReadingPlanDay> {
        let days = self
            .days
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        days.iter().find(|d| d.day == day).cloned()
    }

    /// Total number of days in the plan
    pub fn total_days(&self) -> u16 {
        constants::plan::TOTAL_DAYS
    }

    /// Current plan day from the wall clock, clamped to [1, 365]
    pub fn current_day(&self) -> u16 {
        Self::current_day_for(Local::now().date_naive())
    }

    /// Plan day for a given date: ordinal day of year, clamped to [1, 365]
    ///
    /// Dec 31 of a leap year (ordinal 366) clamps to 365.
    pub fn current_day_for(date: NaiveDate) -> u16 {
        date.ordinal().clamp(1, constants::plan::TOTAL_DAYS as u32) as u16
    }

    /// The next `count` distinct upcoming books after `current_day`
    ///
    /// Scans forward from the following day, skipping repeats of the current
    /// book and already-collected books, stopping once `count` distinct books
    /// are found or the schedule is exhausted.
    pub fn next_books(&self, current_day: u16, count: usize) -> Vec<String> {
        let current_book = self.day(current_day).map(|d| d.book);
        let mut books: Vec<String> = Vec::new();

        let days = self
            .days
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for entry in days.iter().filter(|d| d.day > current_day) {
            if books.len() >= count {
                break;
            }
            if current_book.as_deref() == Some(entry.book.as_str()) {
                continue;
            }
            if !books.contains(&entry.book) {
                books.push(entry.book.clone());
            }
        }
        books
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::MemoryStore;

    fn remote_plan() -> Vec<ReadingPlanDay> {
        (1..=200u16)
            .map(|day| ReadingPlanDay {
                day,
                passage: format!("Remote Passage {day}"),
                theme: "Remote Theme".to_string(),
                category: "Remote".to_string(),
                book: format!("Remote Book {}", (day - 1) / 10),
                estimated_time: "10 min".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_lookup_returns_exactly_one_entry_per_day() {
        let resolver = PlanResolver::bundled();
        for day in 1..=resolver.total_days() {
            let entry = resolver.day(day).unwrap_or_else(|| panic!("day {day} missing"));
            assert_eq!(entry.day, day);
        }
        assert!(resolver.day(0).is_none());
        assert!(resolver.day(366).is_none());
    }

    #[test]
    fn test_current_day_is_clamped_and_monotonic() {
        // Leap-year Dec 31 has ordinal 366 and must clamp to 365
        let leap_end = NaiveDate::from_ymd_opt(2024, 12, 31).expect("valid date");
        assert_eq!(PlanResolver::current_day_for(leap_end), 365);

        let jan_1 = NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date");
        assert_eq!(PlanResolver::current_day_for(jan_1), 1);

        // Monotonically non-decreasing across a full year
        let mut previous = 0;
        let mut date = jan_1;
        let end = NaiveDate::from_ymd_opt(2025, 12, 31).expect("valid date");
        while date <= end {
            let day = PlanResolver::current_day_for(date);
            assert!(day >= previous, "{date} went backwards");
            assert!((1..=365).contains(&day));
            previous = day;
            date = date.succ_opt().expect("valid successor");
        }
        assert_eq!(previous, 365);
    }

    #[test]
    fn test_next_books_skips_current_and_deduplicates() {
        let resolver = PlanResolver::bundled();
        let day_1 = resolver.day(1).expect("day 1");

        let books = resolver.next_books(1, 3);
        assert!(books.len() <= 3);
        assert!(!books.contains(&day_1.book), "must skip the current book");

        let mut deduped = books.clone();
        deduped.dedup();
        assert_eq!(books, deduped, "must not contain duplicates");
    }

    #[test]
    fn test_next_books_exhausts_near_end_of_plan() {
        let resolver = PlanResolver::bundled();
        // The last book has nothing after it
        let books = resolver.next_books(365, 3);
        assert!(books.is_empty());

        // Asking for more books than remain returns what was found
        let books = resolver.next_books(360, 50);
        assert!(books.len() < 50);
    }

    #[test]
    fn test_install_recovers_from_poisoned_lock() {
        let resolver = PlanResolver::bundled();
        std::thread::scope(|scope| {
            let handle = scope.spawn(|| {
                let _guard = resolver.days.write().expect("write lock");
                panic!("poison the plan lock");
            });
            assert!(handle.join().is_err());
        });

        // A validated payload still installs after the poison
        assert!(resolver.install(remote_plan()));
        assert_eq!(
            resolver.day(1).expect("day 1").passage,
            "Remote Passage 1"
        );
    }

    #[tokio::test]
    async fn test_sync_replaces_plan_with_remote_rows() {
        let store = MemoryStore::new();
        store.set_plan(remote_plan());

        let resolver = PlanResolver::bundled();
        resolver.sync(&store).await;

        let day_1 = resolver.day(1).expect("day 1");
        assert_eq!(day_1.passage, "Remote Passage 1");
    }

    #[tokio::test]
    async fn test_sync_failure_keeps_bundled_default() {
        let store = MemoryStore::new();
        store.set_plan(remote_plan());
        store.fail_plan_fetches(true);

        let resolver = PlanResolver::bundled();
        let bundled_day_1 = resolver.day(1).expect("day 1");
        resolver.sync(&store).await;

        assert_eq!(resolver.day(1), Some(bundled_day_1));
    }

    #[tokio::test]
    async fn test_sync_rejects_duplicate_day_numbers() {
        let mut rows = remote_plan();
        rows[1].day = 1; // duplicate of the first row

        let store = MemoryStore::new();
        store.set_plan(rows);

        let resolver = PlanResolver::bundled();
        let bundled_day_1 = resolver.day(1).expect("day 1");
        resolver.sync(&store).await;

        assert_eq!(resolver.day(1), Some(bundled_day_1));
    }

    #[tokio::test]
    async fn test_with_store_signals_sync_complete() {
        let store: Arc<dyn RemoteStore> = {
            let store = MemoryStore::new();
            store.set_plan(remote_plan());
            Arc::new(store)
        };

        let resolver = PlanResolver::with_store(store);
        resolver.ensure_synced().await;

        assert_eq!(
            resolver.day(1).expect("day 1").passage,
            "Remote Passage 1"
        );
    }
}
