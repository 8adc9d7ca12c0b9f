//! # Console
//!
//! Process-wide coordinator tying the mode controller, the status overlay,
//! the broadcast dispatcher and the inventory provider together. Request
//! handlers and the scheduler only ever talk to a shared `Arc<Console>`.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use super::dispatcher::{Dispatcher, HubMessage, Subscription};
use super::mode::{ModeController, ModeError, OperatingMode};
use super::overlay::{OverlayError, StatusLabel, StatusOverlay};
use super::store::StateStore;
use crate::inventory::{
    InventoryProvider, ListOptions, ProviderError, RecordKind, RecordPage, RegistryItem,
};

/// Page size used for note listings when the caller does not ask for one.
pub const DEFAULT_NOTES_PAGE_SIZE: u32 = 10;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Mode(#[from] ModeError),

    #[error(transparent)]
    Overlay(#[from] OverlayError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A destructive action was attempted outside MANUAL mode.
    #[error("{action} requires MANUAL mode (current mode: {mode})")]
    ModeLocked {
        action: &'static str,
        mode: OperatingMode,
    },

    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct Console {
    mode: ModeController,
    overlay: StatusOverlay,
    hub: Dispatcher,
    provider: Arc<dyn InventoryProvider>,
    store: Arc<StateStore>,
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("state_file", &self.store.path())
            .field("hub", &self.hub)
            .finish()
    }
}

impl Console {
    /// Restores the persisted document at `state_file` (defaults when it is
    /// missing or unreadable) and builds the console around it.
    pub fn open(
        state_file: impl Into<PathBuf>,
        provider: Arc<dyn InventoryProvider>,
        hub: Dispatcher,
    ) -> Arc<Self> {
        let store = Arc::new(StateStore::new(state_file));
        let doc = store.load_or_default();

        Arc::new(Self {
            mode: ModeController::new(doc.mode, Arc::clone(&store)),
            overlay: StatusOverlay::new(&doc.statuses, Arc::clone(&store)),
            hub,
            provider,
            store,
        })
    }

    pub fn hub(&self) -> &Dispatcher {
        &self.hub
    }

    pub fn overlay(&self) -> &StatusOverlay {
        &self.overlay
    }

    pub async fn current_mode(&self) -> OperatingMode {
        self.mode.get().await
    }

    /// Validates and applies a raw mode value, then announces it.
    pub async fn set_mode(&self, raw: &str) -> Result<OperatingMode, ConsoleError> {
        let mode = self.mode.apply(raw).await?;
        self.hub.publish(HubMessage::status(mode.as_str(), "mode"));
        Ok(mode)
    }

    /// Assigns an operator status to `id`, then announces it.
    pub async fn set_status(&self, id: &str, label: &str) -> Result<StatusLabel, ConsoleError> {
        let label = self.overlay.set(id, label).await?;
        self.hub.publish(HubMessage::status(label.as_str(), id));
        Ok(label)
    }

    /// Deletes a record upstream. Refused unless the console is in MANUAL.
    ///
    /// On success all subscribers are told, and a fresh snapshot is pushed
    /// from a background task.
    pub async fn delete_record(self: &Arc<Self>, kind: RecordKind, id: &str) -> Result<(), ConsoleError> {
        let mode = self.mode.get().await;
        if !mode.allows_destructive() {
            return Err(ConsoleError::ModeLocked {
                action: "delete",
                mode,
            });
        }

        self.provider.delete(kind, id).await?;
        log::info!("Deleted {} {}", kind, id);
        self.hub.publish(HubMessage::status("Deleted", id));

        let console = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = console.broadcast_registry().await {
                log::error!("Error broadcasting registry after delete: {}", e);
            }
        });
        Ok(())
    }

    /// Fetches and enriches the full inventory.
    pub async fn list_registry(&self) -> Result<Vec<RegistryItem>, ConsoleError> {
        let records = self.provider.fetch_registry().await?;
        Ok(self.overlay.enrich(records).await)
    }

    /// Fetches, enriches and publishes a snapshot to every subscriber.
    pub async fn broadcast_registry(&self) -> Result<usize, ConsoleError> {
        let items = self.list_registry().await?;
        let stats = self.hub.publish(HubMessage::snapshot(&items)?);
        Ok(stats.delivered)
    }

    /// Registers a subscriber and pushes an initial snapshot to it alone,
    /// from a background task. A failed fetch simply skips the initial push.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let subscription = self.hub.subscribe();
        let id = subscription.id();

        let console = Arc::clone(self);
        tokio::spawn(async move {
            let snapshot = match console.list_registry().await {
                Ok(items) => HubMessage::snapshot(&items),
                Err(e) => {
                    log::warn!("Initial snapshot for client {} skipped: {}", id, e);
                    return;
                }
            };
            match snapshot {
                Ok(message) => {
                    console.hub.send_to(id, message);
                }
                Err(e) => log::error!("Error encoding initial snapshot: {}", e),
            }
        });

        subscription
    }

    /// One page of note summaries.
    pub async fn list_notes(&self, mut opts: ListOptions) -> Result<RecordPage, ConsoleError> {
        opts.page_size = opts.page_size.or(Some(DEFAULT_NOTES_PAGE_SIZE));
        Ok(self.provider.fetch_page(&opts).await?)
    }

    /// The full upstream document behind one record.
    pub async fn fetch_record(&self, kind: RecordKind, id: &str) -> Result<Value, ConsoleError> {
        Ok(self.provider.fetch_one(kind, id).await?)
    }
}
