//! Household meal planner with a shared, conflict-aware weekly plan.
//!
//! - [`models`]: meals, the seven-day plan and the grocery list
//! - [`store`]: document stores holding the shared plan
//! - [`sync`]: loading, debounced saving, conflict handling and backups
//! - [`config`]: YAML configuration with environment overrides

pub mod config;
pub mod models;
pub mod store;
pub mod sync;

/// Crate version, as reported by `meal-planner --version`.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
