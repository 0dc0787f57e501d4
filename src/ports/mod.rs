//! Ports - Trait definitions for every collaborator outside the core.

pub mod callback;
pub mod encoder;
pub mod notifier;
pub mod tracking;
pub mod uploads;

/// Error type returned by adapter implementations.
pub type PortError = Box<dyn std::error::Error + Send + Sync>;
