//! Storage backends for offline notifications

use crate::traits::{NotificationStorage, OfflineNotification, RealtimeError, Result};
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// JSON snapshot file
///
/// Each `write_all` writes the full collection to `<path>.tmp` and renames it
/// over `<path>`, so the file on disk is always a complete snapshot.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NotificationStorage for JsonFileStorage {
    fn read_all(&self) -> Result<Vec<OfflineNotification>> {
        if !self.path.exists() {
            debug!("No offline store at {}, starting empty", self.path.display());
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            RealtimeError::Storage(format!("corrupt store {}: {}", self.path.display(), e))
        })
    }

    fn write_all(&mut self, items: &[OfflineNotification]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let data = serde_json::to_vec_pretty(items)?;
        let temp_path = self.path.with_extension("tmp");
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        sync_parent_dir(&self.path);
        Ok(())
    }
}

/// Make the rename itself durable; not supported on every platform
fn sync_parent_dir(path: &Path) {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
        debug!("Could not sync {}: {}", parent.display(), e);
    }
}

/// In-process store
///
/// Clones share the same contents, so dropping a manager and building a new
/// one over a clone behaves like a process restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: Arc<Mutex<Vec<OfflineNotification>>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot
    pub fn with_items(items: Vec<OfflineNotification>) -> Self {
        let storage = Self::default();
        *storage.items.lock() = items;
        storage
    }

    /// Current persisted snapshot
    pub fn snapshot(&self) -> Vec<OfflineNotification> {
        self.items.lock().clone()
    }

    /// Number of successful `write_all` calls
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Acquire)
    }

    /// Make subsequent reads fail, as an unreadable store would
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Release);
    }

    /// Make subsequent writes fail, as a full disk would
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }
}

impl NotificationStorage for MemoryStorage {
    fn read_all(&self) -> Result<Vec<OfflineNotification>> {
        if self.fail_reads.load(Ordering::Acquire) {
            return Err(RealtimeError::Storage("read failure".into()));
        }
        Ok(self.items.lock().clone())
    }

    fn write_all(&mut self, items: &[OfflineNotification]) -> Result<()> {
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(RealtimeError::Storage("write failure".into()));
        }
        *self.items.lock() = items.to_vec();
        self.writes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
