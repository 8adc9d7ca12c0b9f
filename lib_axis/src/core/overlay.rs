//! # Status Overlay
//!
//! Operator-assigned status labels keyed by record id, merged onto freshly
//! fetched inventory records.
//!
//! `enrich` is a mutating read: a tracked record that has never been seen
//! gets its kind's default label recorded in the overlay as a side effect.
//! Entries are never pruned; labels for deleted records are simply ignored.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use super::store::StateStore;
use crate::inventory::{ProviderRecord, RegistryItem};

/// The fixed status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusLabel {
    Pending,
    Execute,
    Keep,
}

impl StatusLabel {
    pub const ALL: [StatusLabel; 3] = [StatusLabel::Pending, StatusLabel::Execute, StatusLabel::Keep];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusLabel::Pending => "Pending",
            StatusLabel::Execute => "Execute",
            StatusLabel::Keep => "Keep",
        }
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusLabel {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatusLabel::ALL
            .into_iter()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| OverlayError::UnknownLabel(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverlayError {
    #[error("unknown status label: {0:?} (expected Pending, Execute or Keep)")]
    UnknownLabel(String),
}

#[derive(Debug)]
pub struct StatusOverlay {
    statuses: RwLock<BTreeMap<String, StatusLabel>>,
    store: Arc<StateStore>,
}

impl StatusOverlay {
    /// Builds the overlay from the persisted raw labels. Entries outside the
    /// vocabulary are dropped with a warning.
    pub fn new(persisted: &BTreeMap<String, String>, store: Arc<StateStore>) -> Self {
        let mut statuses = BTreeMap::new();
        for (id, raw) in persisted {
            match raw.parse::<StatusLabel>() {
                Ok(label) => {
                    statuses.insert(id.clone(), label);
                }
                Err(e) => log::warn!("Ignoring persisted status for {}: {}", id, e),
            }
        }
        Self {
            statuses: RwLock::new(statuses),
            store,
        }
    }

    /// Merges the overlay onto `records`, order preserved.
    ///
    /// Tracked records without an entry get their kind's default label, which
    /// is recorded in the overlay. If anything was defaulted, the document is
    /// written once after the whole pass.
    pub async fn enrich(&self, records: Vec<ProviderRecord>) -> Vec<RegistryItem> {
        let mut statuses = self.statuses.write().await;

        let mut defaulted = 0usize;
        let mut enriched = Vec::with_capacity(records.len());
        for record in records {
            let status = match statuses.get(&record.id).copied() {
                Some(label) => Some(label),
                None => {
                    let label = record.kind.default_label();
                    if let Some(label) = label {
                        statuses.insert(record.id.clone(), label);
                        defaulted += 1;
                    }
                    label
                }
            };
            enriched.push(RegistryItem::from_record(record, status));
        }

        if defaulted > 0 {
            log::debug!("Defaulted status for {} new items", defaulted);
            self.persist(&statuses);
        }
        enriched
    }

    /// Assigns `label` to `id`, creating or replacing the entry. The id is
    /// not checked against the provider.
    pub async fn set(&self, id: &str, label: &str) -> Result<StatusLabel, OverlayError> {
        let label: StatusLabel = label.parse()?;
        let mut statuses = self.statuses.write().await;
        statuses.insert(id.to_string(), label);
        self.persist(&statuses);
        Ok(label)
    }

    pub async fn get(&self, id: &str) -> Option<StatusLabel> {
        self.statuses.read().await.get(id).copied()
    }

    pub async fn len(&self) -> usize {
        self.statuses.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.statuses.read().await.is_empty()
    }

    /// Must be called with the write lock held.
    fn persist(&self, statuses: &BTreeMap<String, StatusLabel>) {
        let raw = statuses
            .iter()
            .map(|(id, label)| (id.clone(), label.as_str().to_string()))
            .collect();
        if let Err(e) = self.store.record_statuses(raw) {
            log::error!("Error writing state file: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::STATE_FILE_NAME;
    use crate::inventory::testing::{doc, note};
    use tempfile::{tempdir, TempDir};

    fn overlay() -> (TempDir, StatusOverlay) {
        let dir = tempdir().unwrap();
        let store = Arc::new(StateStore::new(dir.path().join(STATE_FILE_NAME)));
        (dir, StatusOverlay::new(&BTreeMap::new(), store))
    }

    #[tokio::test]
    async fn test_enrich_defaults_tracked_kinds_only() {
        let (dir, overlay) = overlay();
        let items = overlay
            .enrich(vec![note("notes/1", "a"), doc("d1", "b"), note("notes/2", "c")])
            .await;

        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["notes/1", "d1", "notes/2"]);
        assert_eq!(items[0].status, Some(StatusLabel::Keep));
        assert_eq!(items[1].status, None);
        assert_eq!(items[2].status, Some(StatusLabel::Keep));
        assert_eq!(overlay.len().await, 2);

        let on_disk = StateStore::new(dir.path().join(STATE_FILE_NAME))
            .load()
            .unwrap()
            .unwrap();
        assert_eq!(on_disk.statuses.len(), 2);
        assert_eq!(on_disk.statuses["notes/1"], "Keep");
    }

    #[tokio::test]
    async fn test_default_is_stable_across_passes() {
        let (_dir, overlay) = overlay();
        let records = vec![note("notes/1", "a"), note("notes/2", "b")];
        let first = overlay.enrich(records.clone()).await;
        let second = overlay.enrich(records).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_set_wins_over_default() {
        let (_dir, overlay) = overlay();
        overlay.set("notes/1", "Execute").await.unwrap();
        let items = overlay.enrich(vec![note("notes/1", "a")]).await;
        assert_eq!(items[0].status, Some(StatusLabel::Execute));
    }

    #[tokio::test]
    async fn test_unknown_label_is_rejected() {
        let (dir, overlay) = overlay();
        let err = overlay.set("notes/1", "Shred").await.unwrap_err();
        assert_eq!(err, OverlayError::UnknownLabel("Shred".to_string()));
        assert!(overlay.is_empty().await);
        assert!(!dir.path().join(STATE_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn test_set_accepts_ids_the_provider_never_returned() {
        let (_dir, overlay) = overlay();
        overlay.set("notes/gone", "Pending").await.unwrap();
        assert_eq!(overlay.get("notes/gone").await, Some(StatusLabel::Pending));
    }

    #[tokio::test]
    async fn test_persisted_unknown_labels_are_skipped() {
        let dir = tempdir().unwrap();
        let store = Arc::new(StateStore::new(dir.path().join(STATE_FILE_NAME)));
        let mut persisted = BTreeMap::new();
        persisted.insert("notes/1".to_string(), "Execute".to_string());
        persisted.insert("notes/2".to_string(), "Archive".to_string());

        let overlay = StatusOverlay::new(&persisted, store);
        assert_eq!(overlay.get("notes/1").await, Some(StatusLabel::Execute));
        assert_eq!(overlay.get("notes/2").await, None);
    }
}
