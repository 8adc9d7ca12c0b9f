//! # Google Workspace Provider
//!
//! Implements [`InventoryProvider`] and [`IdentityProvider`] against the
//! Keep, Drive, Docs, Sheets and Admin Directory REST APIs.
//!
//! The registry is the concatenation of non-trashed Keep notes, Google Docs
//! and Google Sheets, in that order. Docs and sheets are listed through Drive
//! (one page of 50). Note listings for `/api/notes` are summarized: trimmed
//! title (`Untitled` when empty) and a short preview of the body.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::{
    IdentityProvider, InventoryProvider, ListOptions, ProviderError, ProviderRecord, RecordKind,
    RecordPage, UserProfile,
};
use crate::retrieve::ky_http::{ApiClient, ApiResponse};

const NOTE_SNIPPET_LIMIT: usize = 50;
const DRIVE_PAGE_SIZE: u32 = 50;
const DOC_MIME_TYPE: &str = "application/vnd.google-apps.document";
const SHEET_MIME_TYPE: &str = "application/vnd.google-apps.spreadsheet";

/// Base URLs of the REST services. Each must end with a slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceEndpoints {
    pub keep: String,
    pub drive: String,
    pub docs: String,
    pub sheets: String,
    pub directory: String,
}

impl Default for WorkspaceEndpoints {
    fn default() -> Self {
        Self {
            keep: "https://keep.googleapis.com/".to_string(),
            drive: "https://www.googleapis.com/drive/v3/".to_string(),
            docs: "https://docs.googleapis.com/".to_string(),
            sheets: "https://sheets.googleapis.com/".to_string(),
            directory: "https://admin.googleapis.com/admin/directory/v1/".to_string(),
        }
    }
}

impl WorkspaceEndpoints {
    /// Every service on one host, under the usual path prefixes.
    pub fn single_host(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            keep: format!("{}/", base),
            drive: format!("{}/drive/v3/", base),
            docs: format!("{}/", base),
            sheets: format!("{}/", base),
            directory: format!("{}/admin/directory/v1/", base),
        }
    }
}

// --- Wire types ---

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListNotesResponse {
    #[serde(default)]
    notes: Vec<KeepNote>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeepNote {
    #[serde(default)]
    name: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: Option<KeepSection>,
    #[serde(default)]
    trashed: bool,
}

#[derive(Debug, Default, Deserialize)]
struct KeepSection {
    #[serde(default)]
    text: Option<TextContent>,
    #[serde(default)]
    list: Option<ListContent>,
}

#[derive(Debug, Default, Deserialize)]
struct TextContent {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListContent {
    #[serde(default)]
    list_items: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryUser {
    id: String,
    primary_email: String,
    #[serde(default)]
    name: Option<DirectoryName>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryName {
    #[serde(default)]
    full_name: String,
}

// --- Summaries ---

/// Normalizes a note id to its `notes/` resource name.
pub fn ensure_note_name(id: &str) -> String {
    let trimmed = id.trim();
    if trimmed.is_empty() || trimmed.starts_with("notes/") {
        trimmed.to_string()
    } else {
        format!("notes/{}", trimmed)
    }
}

fn note_title(raw: &str) -> String {
    match raw.trim() {
        "" => "Untitled".to_string(),
        title => title.to_string(),
    }
}

fn truncate_snippet(src: &str) -> String {
    if src.chars().count() <= NOTE_SNIPPET_LIMIT {
        return src.to_string();
    }
    let mut out: String = src.chars().take(NOTE_SNIPPET_LIMIT - 3).collect();
    out.push_str("...");
    out
}

fn note_snippet(body: Option<&KeepSection>) -> String {
    let Some(section) = body else {
        return "...".to_string();
    };
    if let Some(text) = section.text.as_ref().filter(|t| !t.text.is_empty()) {
        return truncate_snippet(&text.text);
    }
    match section.list.as_ref().map(|l| l.list_items.len()) {
        Some(count) if count > 0 => format!("[{} list items]", count),
        _ => "...".to_string(),
    }
}

fn summarize_note(note: &KeepNote) -> ProviderRecord {
    ProviderRecord {
        id: ensure_note_name(&note.name),
        kind: RecordKind::Keep,
        title: note_title(&note.title),
        snippet: note_snippet(note.body.as_ref()),
    }
}

fn drive_record(file: DriveFile, kind: RecordKind) -> ProviderRecord {
    let snippet = match kind {
        RecordKind::Sheet => "Google Sheet",
        _ => "Google Doc",
    };
    ProviderRecord {
        id: file.id,
        kind,
        title: file.name,
        snippet: snippet.to_string(),
    }
}

// --- Service ---

/// One authenticated client per Workspace service.
#[derive(Debug, Clone)]
pub struct WorkspaceService {
    keep: ApiClient,
    drive: ApiClient,
    docs: ApiClient,
    sheets: ApiClient,
    directory: ApiClient,
    configured: bool,
}

impl WorkspaceService {
    /// Builds the clients. Without an access token every call fails with
    /// [`ProviderError::Unavailable`].
    pub fn new(endpoints: &WorkspaceEndpoints, access_token: Option<String>) -> anyhow::Result<Self> {
        let token = access_token.filter(|t| !t.trim().is_empty());
        let configured = token.is_some();
        if !configured {
            log::warn!("No Workspace access token configured. Provider calls will fail.");
        }
        Ok(Self {
            keep: ApiClient::new(&endpoints.keep, token.clone())?,
            drive: ApiClient::new(&endpoints.drive, token.clone())?,
            docs: ApiClient::new(&endpoints.docs, token.clone())?,
            sheets: ApiClient::new(&endpoints.sheets, token.clone())?,
            directory: ApiClient::new(&endpoints.directory, token)?,
            configured,
        })
    }

    fn ensure_configured(&self) -> Result<(), ProviderError> {
        if self.configured {
            Ok(())
        } else {
            Err(ProviderError::Unavailable(
                "workspace access token is not configured".to_string(),
            ))
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        client: &ApiClient,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        self.ensure_configured()?;
        let response = client.get::<T>(path, query).await.map_err(map_client_error)?;
        into_data(response, path)
    }

    async fn list_keep_notes(&self, opts: &ListOptions) -> Result<ListNotesResponse, ProviderError> {
        let mut query = Vec::new();
        if let Some(filter) = opts.filter.as_deref().filter(|f| !f.is_empty()) {
            query.push(("filter", filter.to_string()));
        }
        if let Some(size) = opts.page_size.filter(|s| *s > 0) {
            query.push(("pageSize", size.to_string()));
        }
        if let Some(token) = opts.page_token.as_deref().filter(|t| !t.is_empty()) {
            query.push(("pageToken", token.to_string()));
        }
        self.get_json(&self.keep, "v1/notes", &query).await
    }

    async fn list_drive_files(&self, kind: RecordKind, mime_type: &str) -> Result<Vec<ProviderRecord>, ProviderError> {
        let query = [
            ("q", format!("mimeType='{}'", mime_type)),
            ("pageSize", DRIVE_PAGE_SIZE.to_string()),
        ];
        let list: FileList = self.get_json(&self.drive, "files", &query).await?;
        Ok(list.files.into_iter().map(|f| drive_record(f, kind)).collect())
    }
}

/// Network failures and undecodable bodies both surface from the client as
/// `anyhow` errors; tell them apart here.
fn map_client_error(err: anyhow::Error) -> ProviderError {
    if err.downcast_ref::<serde_json::Error>().is_some() {
        ProviderError::Decode(err.to_string())
    } else {
        ProviderError::Transport(err.to_string())
    }
}

fn into_data<T>(response: ApiResponse<T>, path: &str) -> Result<T, ProviderError> {
    if response.success {
        return response
            .data
            .ok_or_else(|| ProviderError::Decode(format!("empty response from {}", path)));
    }
    match response.status {
        404 => Err(ProviderError::NotFound(path.to_string())),
        status => Err(ProviderError::Http {
            status,
            body: response.error_body.unwrap_or_default(),
        }),
    }
}

#[async_trait]
impl InventoryProvider for WorkspaceService {
    async fn fetch_page(&self, opts: &ListOptions) -> Result<RecordPage, ProviderError> {
        let response = self.list_keep_notes(opts).await?;
        Ok(RecordPage {
            records: response.notes.iter().map(summarize_note).collect(),
            next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn fetch_one(&self, kind: RecordKind, id: &str) -> Result<Value, ProviderError> {
        match kind {
            RecordKind::Keep => {
                let path = format!("v1/{}", ensure_note_name(id));
                self.get_json(&self.keep, &path, &[]).await
            }
            RecordKind::Doc => {
                let path = format!("v1/documents/{}", id);
                self.get_json(&self.docs, &path, &[]).await
            }
            RecordKind::Sheet => {
                let path = format!("v4/spreadsheets/{}", id);
                self.get_json(&self.sheets, &path, &[]).await
            }
        }
    }

    async fn delete(&self, kind: RecordKind, id: &str) -> Result<(), ProviderError> {
        self.ensure_configured()?;
        let (client, path) = match kind {
            RecordKind::Keep => (&self.keep, format!("v1/{}", ensure_note_name(id))),
            RecordKind::Doc | RecordKind::Sheet => (&self.drive, format!("files/{}", id)),
        };
        let response = client.delete(&path).await.map_err(map_client_error)?;
        into_data(response, &path).map(|_| ())
    }

    async fn fetch_registry(&self) -> Result<Vec<ProviderRecord>, ProviderError> {
        let mut items = Vec::new();

        let mut opts = ListOptions::default();
        loop {
            let page = self.list_keep_notes(&opts).await?;
            items.extend(page.notes.iter().filter(|n| !n.trashed).map(|n| ProviderRecord {
                snippet: "Google Keep Note".to_string(),
                ..summarize_note(n)
            }));
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => opts.page_token = Some(token),
                None => break,
            }
        }

        items.extend(self.list_drive_files(RecordKind::Doc, DOC_MIME_TYPE).await?);
        items.extend(self.list_drive_files(RecordKind::Sheet, SHEET_MIME_TYPE).await?);
        Ok(items)
    }
}

#[async_trait]
impl IdentityProvider for WorkspaceService {
    async fn get_profile(&self, email: &str) -> Result<UserProfile, ProviderError> {
        let path = format!("users/{}", email);
        let user: DirectoryUser = self.get_json(&self.directory, &path, &[]).await?;
        Ok(UserProfile {
            name: user.name.map(|n| n.full_name).unwrap_or_default(),
            email: user.primary_email,
            id: user.id,
        })
    }
}
