//! # Core Engine Module
//!
//! The process-wide coordinator of the console. Every component here is an
//! owned value guarded by its own lock; callers only see the operations below.
//!
//! ## Core Components:
//!
//! - **`store`**: reads and writes the persisted document (mode + overlay).
//! - **`mode`**: the AUTO / MANUAL state machine.
//! - **`overlay`**: operator-assigned status labels merged onto fetched records.
//! - **`dispatcher`**: the broadcast hub. Bounded mailbox per subscriber,
//!   drop-on-full delivery.
//! - **`scheduler`**: the one-second heartbeat that counts down and pushes
//!   registry snapshots while the mode is AUTO.
//! - **`console`**: the facade the HTTP layer talks to.

#![forbid(unsafe_code)]

pub mod console;
pub mod dispatcher;
pub mod mode;
pub mod overlay;
pub mod scheduler;
pub mod store;

// --- Public API Re-exports ---
pub use console::{Console, ConsoleError};
pub use dispatcher::{Dispatcher, EventKind, HubMessage, PublishStats, Subscription};
pub use mode::{ModeController, ModeError, OperatingMode};
pub use overlay::{OverlayError, StatusLabel, StatusOverlay};
pub use scheduler::{Scheduler, SchedulerConfig, TickOutcome};
pub use store::{PersistedDocument, StateStore, StoreError};
