//! Common utilities and abstractions for link supervisors

/// Reactive property system for published status
pub mod property;
/// Link supervisor base and worker lifecycle
pub mod supervisor;
/// Link configuration and status types
pub mod types;

pub use property::Property;
pub use supervisor::{LinkDriver, LinkShared, Supervisor};
