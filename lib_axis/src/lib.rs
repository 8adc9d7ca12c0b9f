//! # lib_axis
//!
//! The state synchronization and broadcast engine behind the Axis operator
//! console. It keeps the operating mode and the status overlay in memory,
//! persists them to a small JSON document, and fans inventory snapshots and
//! events out to every connected subscriber.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Mode, overlay, persistence, broadcast and scheduling.
pub mod core;
/// Contracts for the external inventory and identity providers.
pub mod inventory;
/// Generic HTTP client with retry middleware.
#[cfg(feature = "workspace")]
pub mod retrieve;

// Re-export the types most callers need.
pub use crate::core::{
    Console, ConsoleError, Dispatcher, EventKind, HubMessage, ModeController, ModeError,
    OperatingMode, PersistedDocument, Scheduler, SchedulerConfig, StateStore, StatusLabel,
    StatusOverlay, Subscription,
};
pub use crate::inventory::{
    IdentityProvider, InventoryProvider, ListOptions, ProviderError, ProviderRecord, RecordKind,
    RecordPage, RegistryItem, UserProfile,
};
