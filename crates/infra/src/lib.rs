//! Infrastructure layer: storage backends, movement coordination, config.

pub mod config;
pub mod coordinator;
pub mod reconcile;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, LedgerConfig, Persistence};
pub use coordinator::{AppliedMovement, MovementCoordinator};
pub use reconcile::{reconcile_all, reconcile_item, ReconciliationReport};
