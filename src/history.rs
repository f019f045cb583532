//! Submission history persistence.
//!
//! A single ordered list, newest first, behind the [`HistoryStore`]
//! trait. Ships a JSON-file store and an in-memory store.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::sanitize::SanitizedHtml;

/// Maximum visible characters of a history entry's display name.
const DISPLAY_NAME_LENGTH: usize = 40;

/// A single past submission.
///
/// Serialized with camelCase field names, which is the shape the history
/// file has always used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub original_text: String,
    pub html: SanitizedHtml,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl HistoryEntry {
    /// Create an entry with a fresh id and the current timestamp.
    pub fn new(original_text: String, html: SanitizedHtml) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            original_text,
            html,
            created_at: chrono::Utc::now().timestamp_millis(),
            name: None,
        }
    }

    /// Name shown in a history listing: the custom name if set, otherwise
    /// the original text, truncated to a fixed number of visible characters.
    pub fn display_name(&self) -> String {
        let source = self.name.as_deref().unwrap_or(&self.original_text);
        truncate_graphemes(source.trim(), DISPLAY_NAME_LENGTH)
    }
}

fn truncate_graphemes(text: &str, max: usize) -> String {
    let mut graphemes = text.graphemes(true);
    let head: String = graphemes.by_ref().take(max).collect();
    if graphemes.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

/// Storage boundary for the submission history.
///
/// Write operations are read-modify-write over the whole list with
/// last-write-wins semantics.
pub trait HistoryStore: Send + Sync {
    /// All entries, newest first. Unreadable or malformed stored data
    /// yields an empty list rather than an error.
    fn list(&self) -> Result<Vec<HistoryEntry>>;

    /// Prepend an entry.
    fn append(&self, entry: HistoryEntry) -> Result<()>;

    /// Delete by id. Unknown ids are ignored.
    fn remove(&self, id: &str) -> Result<()>;

    /// Set or clear the custom name. Unknown ids are ignored.
    fn rename(&self, id: &str, name: Option<String>) -> Result<()>;
}

/// History stored as a single JSON file.
pub struct JsonFileHistoryStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileHistoryStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn read_entries(&self) -> Vec<HistoryEntry> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => parse_entries(&raw),
            Err(_) => Vec::new(),
        }
    }

    fn write_entries(&self, entries: &[HistoryEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string(entries)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Parse stored history. A corrupted file degrades to an empty history;
/// individual entries that fail shape validation are dropped, the rest
/// survive.
fn parse_entries(raw: &str) -> Vec<HistoryEntry> {
    let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(raw) else {
        return Vec::new();
    };
    values
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect()
}

impl HistoryStore for JsonFileHistoryStore {
    fn list(&self) -> Result<Vec<HistoryEntry>> {
        let _guard = self.guard();
        Ok(self.read_entries())
    }

    fn append(&self, entry: HistoryEntry) -> Result<()> {
        let _guard = self.guard();
        let mut entries = self.read_entries();
        entries.insert(0, entry);
        self.write_entries(&entries)
    }

    fn remove(&self, id: &str) -> Result<()> {
        let _guard = self.guard();
        let mut entries = self.read_entries();
        entries.retain(|entry| entry.id != id);
        self.write_entries(&entries)
    }

    fn rename(&self, id: &str, name: Option<String>) -> Result<()> {
        let _guard = self.guard();
        let mut entries = self.read_entries();
        for entry in entries.iter_mut().filter(|entry| entry.id == id) {
            entry.name = name.clone();
        }
        self.write_entries(&entries)
    }
}

/// In-memory history for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryHistoryStore {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, Vec<HistoryEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn list(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self.guard().clone())
    }

    fn append(&self, entry: HistoryEntry) -> Result<()> {
        self.guard().insert(0, entry);
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<()> {
        self.guard().retain(|entry| entry.id != id);
        Ok(())
    }

    fn rename(&self, id: &str, name: Option<String>) -> Result<()> {
        for entry in self.guard().iter_mut().filter(|entry| entry.id == id) {
            entry.name = name.clone();
        }
        Ok(())
    }
}
