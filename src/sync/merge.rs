//! Merging a local snapshot with a remote snapshot that moved underneath it.
//!
//! The policy is deliberately one-sided:
//! - meals: union by id; local order first, then remote-only meals in remote
//!   order; for ids on both sides the local copy wins unchanged
//! - weekly plan: the local plan wins and the remote plan is discarded

use std::collections::HashSet;

use crate::models::{MealId, Snapshot};

/// Combines `local` with a conflicting `remote` snapshot.
pub fn merge(local: &Snapshot, remote: &Snapshot) -> Snapshot {
    let mut meals = local.meals.clone();
    let mut seen: HashSet<&MealId> = local.meals.iter().map(|meal| &meal.id).collect();

    for meal in &remote.meals {
        if seen.insert(&meal.id) {
            meals.push(meal.clone());
        }
    }

    Snapshot {
        meals,
        weekly_plan: local.weekly_plan.clone(),
    }
}

/// Number of meals `remote` would contribute to `local` on merge.
pub fn remote_only_count(local: &Snapshot, remote: &Snapshot) -> usize {
    let local_ids: HashSet<&MealId> = local.meals.iter().map(|meal| &meal.id).collect();
    let mut counted = HashSet::new();
    remote
        .meals
        .iter()
        .filter(|meal| !local_ids.contains(&meal.id) && counted.insert(&meal.id))
        .count()
}
