pub mod config;
pub mod currency;
pub mod database;
pub mod error;
pub mod job;
pub mod notifier;
pub mod reconcile;
pub mod scheduler;
pub mod steam;
pub mod types;

// Re-export for tests
pub use job::JobRunner;
pub use reconcile::OfferReconciler;
