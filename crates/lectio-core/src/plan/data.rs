//! Bundled default reading plan
//!
//! A static 365-entry dataset compiled into the binary, used whenever the
//! remote store is unreachable or has no plan rows.

use once_cell::sync::Lazy;

use super::ReadingPlanDay;

static BUNDLED: Lazy<Vec<ReadingPlanDay>> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../data/reading_plan.json"))
        .expect("bundled reading plan is valid JSON")
});

/// The bundled default plan, parsed once on first access
pub fn bundled_plan() -> &'static [ReadingPlanDay] {
    &BUNDLED
}
