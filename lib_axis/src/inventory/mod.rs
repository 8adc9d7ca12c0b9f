//! # Inventory Module
//!
//! Contracts for the external collaborators the engine depends on: the
//! inventory provider (notes, docs, sheets) and the identity provider. The
//! core never talks HTTP itself; it only sees these traits.
//!
//! ## Contained Modules:
//! - **`workspace`**: the Google Workspace REST implementation of both
//!   traits (enabled by the `workspace` feature).

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::overlay::StatusLabel;

#[cfg(feature = "workspace")]
pub mod workspace;

#[cfg(feature = "workspace")]
pub use workspace::{WorkspaceEndpoints, WorkspaceService};

/// The kind of document a record points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Keep,
    Doc,
    Sheet,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Keep => "keep",
            RecordKind::Doc => "doc",
            RecordKind::Sheet => "sheet",
        }
    }

    /// Label assigned to a never-seen record of this kind, or `None` when the
    /// kind does not take part in status tracking.
    pub fn default_label(&self) -> Option<StatusLabel> {
        match self {
            RecordKind::Keep => Some(StatusLabel::Keep),
            RecordKind::Doc | RecordKind::Sheet => None,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep" => Ok(RecordKind::Keep),
            "doc" => Ok(RecordKind::Doc),
            "sheet" => Ok(RecordKind::Sheet),
            other => Err(ProviderError::NotFound(format!("record kind {}", other))),
        }
    }
}

/// A record as returned by the provider, before the overlay is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub id: String,
    pub kind: RecordKind,
    pub title: String,
    pub snippet: String,
}

/// A provider record merged with the status overlay. Rebuilt on every fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub title: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusLabel>,
}

impl RegistryItem {
    pub fn from_record(record: ProviderRecord, status: Option<StatusLabel>) -> Self {
        Self {
            id: record.id,
            kind: record.kind,
            title: record.title,
            snippet: record.snippet,
            status,
        }
    }
}

/// Paging and filtering options for note listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOptions {
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub page_token: Option<String>,
}

/// One page of records plus the token for the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPage {
    pub records: Vec<ProviderRecord>,
    pub next_page_token: Option<String>,
}

/// Operator profile returned by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    pub id: String,
}

/// Errors surfaced by the external providers.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The backing service is not configured.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The requested record or profile does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Network failure, after retries.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

/// The inventory backend. Implementations may fail transiently; callers
/// decide whether a failure is surfaced or swallowed.
#[async_trait]
pub trait InventoryProvider: Send + Sync {
    /// Fetches one page of note records.
    async fn fetch_page(&self, opts: &ListOptions) -> Result<RecordPage, ProviderError>;

    /// Fetches the full upstream document for one record.
    async fn fetch_one(&self, kind: RecordKind, id: &str) -> Result<Value, ProviderError>;

    /// Deletes one record upstream.
    async fn delete(&self, kind: RecordKind, id: &str) -> Result<(), ProviderError>;

    /// Follows page tokens until exhausted.
    async fn fetch_all(&self, opts: ListOptions) -> Result<Vec<ProviderRecord>, ProviderError> {
        let mut opts = opts;
        let mut all = Vec::new();
        loop {
            let page = self.fetch_page(&opts).await?;
            all.extend(page.records);
            match page.next_page_token {
                Some(token) if !token.is_empty() => opts.page_token = Some(token),
                _ => break,
            }
        }
        Ok(all)
    }

    /// The full inventory used for snapshots: every kind, not only notes.
    async fn fetch_registry(&self) -> Result<Vec<ProviderRecord>, ProviderError>;
}

/// The identity backend.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn get_profile(&self, email: &str) -> Result<UserProfile, ProviderError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory provider shared by the engine tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    pub struct ScriptedProvider {
        pub records: Mutex<Vec<ProviderRecord>>,
        /// Pending failures consumed by the next `fetch_registry` calls.
        pub failures: Mutex<VecDeque<ProviderError>>,
        pub registry_calls: AtomicUsize,
        pub deleted: Mutex<Vec<(RecordKind, String)>>,
        /// Every `ListOptions` passed to `fetch_page`, in call order.
        pub page_requests: Mutex<Vec<ListOptions>>,
    }

    impl ScriptedProvider {
        pub fn with_records(records: Vec<ProviderRecord>) -> Self {
            Self {
                records: Mutex::new(records),
                ..Default::default()
            }
        }

        pub fn fail_next(&self, err: ProviderError) {
            self.failures.lock().unwrap().push_back(err);
        }

        pub fn calls(&self) -> usize {
            self.registry_calls.load(Ordering::SeqCst)
        }
    }

    pub fn note(id: &str, title: &str) -> ProviderRecord {
        ProviderRecord {
            id: id.to_string(),
            kind: RecordKind::Keep,
            title: title.to_string(),
            snippet: "...".to_string(),
        }
    }

    pub fn doc(id: &str, title: &str) -> ProviderRecord {
        ProviderRecord {
            id: id.to_string(),
            kind: RecordKind::Doc,
            title: title.to_string(),
            snippet: "Google Doc".to_string(),
        }
    }

    #[async_trait]
    impl InventoryProvider for ScriptedProvider {
        async fn fetch_page(&self, opts: &ListOptions) -> Result<RecordPage, ProviderError> {
            self.page_requests.lock().unwrap().push(opts.clone());
            // Two records per page, token is the next offset.
            let records = self.records.lock().unwrap().clone();
            let start: usize = opts
                .page_token
                .as_deref()
                .and_then(|t| t.parse().ok())
                .unwrap_or(0);
            let end = (start + 2).min(records.len());
            let next = (end < records.len()).then(|| end.to_string());
            Ok(RecordPage {
                records: records[start..end].to_vec(),
                next_page_token: next,
            })
        }

        async fn fetch_one(&self, kind: RecordKind, id: &str) -> Result<Value, ProviderError> {
            let records = self.records.lock().unwrap();
            records
                .iter()
                .find(|r| r.kind == kind && r.id == id)
                .map(|r| serde_json::json!({ "name": r.id, "title": r.title }))
                .ok_or_else(|| ProviderError::NotFound(id.to_string()))
        }

        async fn delete(&self, kind: RecordKind, id: &str) -> Result<(), ProviderError> {
            let mut records = self.records.lock().unwrap();
            let before = records.len();
            records.retain(|r| !(r.kind == kind && r.id == id));
            if records.len() == before {
                return Err(ProviderError::NotFound(id.to_string()));
            }
            self.deleted.lock().unwrap().push((kind, id.to_string()));
            Ok(())
        }

        async fn fetch_registry(&self) -> Result<Vec<ProviderRecord>, ProviderError> {
            self.registry_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.failures.lock().unwrap().pop_front() {
                return Err(err);
            }
            self.fetch_all(ListOptions::default()).await
        }
    }

    #[tokio::test]
    async fn test_fetch_all_follows_page_tokens() {
        let provider = ScriptedProvider::with_records(vec![
            note("notes/1", "a"),
            note("notes/2", "b"),
            note("notes/3", "c"),
            note("notes/4", "d"),
            note("notes/5", "e"),
        ]);
        let all = provider.fetch_all(ListOptions::default()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["notes/1", "notes/2", "notes/3", "notes/4", "notes/5"]);
    }

    #[test]
    fn test_registry_item_wire_shape() {
        let item = RegistryItem::from_record(note("notes/1", "Groceries"), Some(StatusLabel::Keep));
        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            serde_json::json!({
                "id": "notes/1",
                "type": "keep",
                "title": "Groceries",
                "snippet": "...",
                "status": "Keep"
            })
        );

        let untracked = RegistryItem::from_record(doc("d1", "Plan"), None);
        let value = serde_json::to_value(&untracked).unwrap();
        assert!(value.get("status").is_none());
        assert_eq!(value["type"], "doc");
    }
}
