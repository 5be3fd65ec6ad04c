//! Destinations for exported files

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{ClientError, Result};

/// Host capability to hand a finished file to the user
pub trait FileSink: Send + Sync {
    fn write_file(&self, name: &str, mime: &str, bytes: &[u8]) -> Result<()>;
}

/// Writes files into a directory, creating it on first use
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn target(&self, name: &str) -> Result<PathBuf> {
        // Names are produced locally, but never let one escape the directory
        let file_name = Path::new(name)
            .file_name()
            .filter(|n| n.to_string_lossy() == name)
            .ok_or_else(|| ClientError::Export(format!("Invalid export file name: {}", name)))?;
        Ok(self.dir.join(file_name))
    }
}

impl FileSink for DirectorySink {
    fn write_file(&self, name: &str, mime: &str, bytes: &[u8]) -> Result<()> {
        let path = self.target(name)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(&path, bytes)?;

        tracing::info!(
            path = %path.display(),
            mime = %mime,
            size = bytes.len(),
            "[Exporter] Wrote file"
        );
        Ok(())
    }
}

/// File captured by a [`MemorySink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Keeps written files in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    files: Mutex<Vec<StoredFile>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files in write order
    pub fn files(&self) -> Vec<StoredFile> {
        match self.files.lock() {
            Ok(files) => files.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn get(&self, name: &str) -> Option<StoredFile> {
        self.files().into_iter().find(|f| f.name == name)
    }
}

impl FileSink for MemorySink {
    fn write_file(&self, name: &str, mime: &str, bytes: &[u8]) -> Result<()> {
        let mut files = self
            .files
            .lock()
            .map_err(|_| ClientError::Export("memory sink lock poisoned".to_string()))?;
        files.retain(|f| f.name != name);
        files.push(StoredFile {
            name: name.to_string(),
            mime: mime.to_string(),
            bytes: bytes.to_vec(),
        });
        Ok(())
    }
}
