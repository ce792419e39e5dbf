use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use super::entry::HistoryEntry;

/// Number of entries retained (oldest evicted first)
pub const HISTORY_LIMIT: usize = 20;

/// Storage key for the conversation history
pub const HISTORY_KEY: &str = "voice-session.history";

/// Bounded conversation history collaborator
pub trait HistoryStore: Send + Sync {
    /// Append an entry, keeping only the most recent entries
    fn append(&self, entry: HistoryEntry) -> Result<()>;

    /// Entries in the order they were appended
    fn list(&self) -> Result<Vec<HistoryEntry>>;

    /// Remove every entry
    fn clear(&self) -> Result<()>;
}

fn retain_recent(entries: &mut Vec<HistoryEntry>, limit: usize) {
    if entries.len() > limit {
        let excess = entries.len() - limit;
        entries.drain(..excess);
    }
}

/// In-memory history, used by tests and ephemeral sessions
#[derive(Debug)]
pub struct MemoryHistoryStore {
    entries: Mutex<Vec<HistoryEntry>>,
    limit: usize,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::with_limit(HISTORY_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            limit,
        }
    }
}

impl Default for MemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn append(&self, entry: HistoryEntry) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("History lock poisoned"))?;
        entries.push(entry);
        retain_recent(&mut entries, self.limit);
        Ok(())
    }

    fn list(&self) -> Result<Vec<HistoryEntry>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("History lock poisoned"))?;
        Ok(entries.clone())
    }

    fn clear(&self) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("History lock poisoned"))?;
        entries.clear();
        Ok(())
    }
}

/// Durable history stored as a JSON array under [`HISTORY_KEY`]
pub struct FileHistoryStore {
    path: PathBuf,
    limit: usize,
    // Serializes read-modify-write cycles within this process
    guard: Mutex<()>,
}

impl FileHistoryStore {
    /// Open (or create) the history file inside `dir`
    ///
    /// `~` in `dir` is expanded to the user's home directory.
    pub fn open(dir: &str) -> Result<Self> {
        let expanded = shellexpand::tilde(dir).into_owned();
        let dir = PathBuf::from(expanded);

        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create history directory: {:?}", dir))?;

        let path = dir.join(format!("{}.json", HISTORY_KEY));
        info!("Conversation history: {}", path.display());

        Ok(Self {
            path,
            limit: HISTORY_LIMIT,
            guard: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let bytes = fs::read(&self.path)
            .with_context(|| format!("Failed to read history file: {:?}", self.path))?;

        if bytes.is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_slice::<Vec<HistoryEntry>>(&bytes) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                // A corrupt file should not block new sessions
                warn!("Ignoring unreadable history file {:?}: {}", self.path, e);
                Ok(Vec::new())
            }
        }
    }

    fn write_entries(&self, entries: &[HistoryEntry]) -> Result<()> {
        let payload = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");

        fs::write(&tmp, payload)
            .with_context(|| format!("Failed to write history file: {:?}", tmp))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace history file: {:?}", self.path))?;

        Ok(())
    }
}

impl HistoryStore for FileHistoryStore {
    fn append(&self, entry: HistoryEntry) -> Result<()> {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| anyhow::anyhow!("History lock poisoned"))?;

        let mut entries = self.read_entries()?;
        entries.push(entry);
        retain_recent(&mut entries, self.limit);
        self.write_entries(&entries)?;

        debug!("History now holds {} entries", entries.len());
        Ok(())
    }

    fn list(&self) -> Result<Vec<HistoryEntry>> {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| anyhow::anyhow!("History lock poisoned"))?;
        self.read_entries()
    }

    fn clear(&self) -> Result<()> {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| anyhow::anyhow!("History lock poisoned"))?;

        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove history file: {:?}", self.path))?;
        }

        info!("Conversation history cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Speaker;

    #[test]
    fn test_memory_store_keeps_last_twenty() {
        let store = MemoryHistoryStore::new();
        for i in 0..25 {
            store
                .append(HistoryEntry::new(format!("turn {}", i), Speaker::User))
                .unwrap();
        }

        let entries = store.list().unwrap();
        assert_eq!(entries.len(), 20);
        assert_eq!(entries[0].text, "turn 5");
        assert_eq!(entries[19].text, "turn 24");
    }

    #[test]
    fn test_memory_store_clear() {
        let store = MemoryHistoryStore::new();
        store.append(HistoryEntry::new("x", Speaker::Assistant)).unwrap();
        store.clear().unwrap();

        assert!(store.list().unwrap().is_empty());
    }
}
