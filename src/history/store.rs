//! Persistence for the run history.

use chrono::Utc;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::entry::{export_file_name, HistoryEntry, HistoryFile, HistoryFilter, HistoryStats};
use crate::error::{ClientError, Result};

/// Storage for finished runs, newest first
pub trait HistoryStore: Send + Sync {
    fn append(&self, entry: HistoryEntry) -> Result<()>;

    fn list(&self, filter: &HistoryFilter) -> Result<Vec<HistoryEntry>>;

    fn get(&self, id: &str) -> Result<Option<HistoryEntry>> {
        Ok(self
            .list(&HistoryFilter::default())?
            .into_iter()
            .find(|e| e.id == id))
    }

    /// Returns whether an entry with `id` existed
    fn remove(&self, id: &str) -> Result<bool>;

    fn clear(&self) -> Result<()>;

    /// Pretty JSON array of every entry
    fn export(&self) -> Result<Vec<u8>> {
        let entries = self.list(&HistoryFilter::default())?;
        Ok(serde_json::to_vec_pretty(&entries)?)
    }

    fn stats(&self) -> Result<HistoryStats> {
        Ok(HistoryStats::from_entries(
            &self.list(&HistoryFilter::default())?,
        ))
    }

    /// File name for an export made today
    fn export_file_name(&self) -> String {
        export_file_name(Utc::now())
    }
}

/// History kept in a single JSON file.
///
/// The default location is `~/.config/research-client/history.json`.
pub struct JsonHistoryStore {
    path: PathBuf,
}

impl JsonHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the history file; a missing file is an empty history
    fn load(&self) -> Result<HistoryFile> {
        if !self.path.exists() {
            return Ok(HistoryFile::default());
        }

        let file = File::open(&self.path)
            .map_err(|e| ClientError::History(format!("Failed to open history file: {}", e)))?;
        let reader = BufReader::new(file);

        match serde_json::from_reader(reader) {
            Ok(history) => Ok(history),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "[History] Unreadable history file, starting empty: {}",
                    e
                );
                Ok(HistoryFile::default())
            }
        }
    }

    /// Atomically write the history file
    fn atomic_write(&self, history: &HistoryFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    ClientError::History(format!("Failed to create history directory: {}", e))
                })?;
            }
        }

        // Write to temporary file first
        let temp_path = self.path.with_extension("tmp");

        let file = File::create(&temp_path)
            .map_err(|e| ClientError::History(format!("Failed to create temp file: {}", e)))?;
        let mut writer = BufWriter::new(file);

        serde_json::to_writer_pretty(&mut writer, history)?;
        writer
            .flush()
            .map_err(|e| ClientError::History(format!("Failed to flush: {}", e)))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| ClientError::History(format!("Failed to sync: {}", e)))?;

        fs::rename(&temp_path, &self.path)
            .map_err(|e| ClientError::History(format!("Failed to rename: {}", e)))?;

        Ok(())
    }
}

impl HistoryStore for JsonHistoryStore {
    fn append(&self, entry: HistoryEntry) -> Result<()> {
        let mut history = self.load()?;
        let (kind, status) = (entry.workflow_kind, entry.status);
        history.add_entry(entry);
        self.atomic_write(&history)?;

        tracing::info!(
            kind = %kind,
            status = %status,
            "[History] Recorded run ({} entries)",
            history.entries.len()
        );
        Ok(())
    }

    fn list(&self, filter: &HistoryFilter) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .load()?
            .entries
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect())
    }

    fn remove(&self, id: &str) -> Result<bool> {
        let mut history = self.load()?;
        if !history.remove_entry(id) {
            return Ok(false);
        }
        self.atomic_write(&history)?;
        tracing::info!(id = %id, "[History] Removed entry");
        Ok(true)
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .map_err(|e| ClientError::History(format!("Failed to delete history file: {}", e)))?;
        }
        tracing::info!("[History] Cleared");
        Ok(())
    }
}
