//! Local record of recently submitted orders.
//!
//! Kept as a small JSON file next to the client. Reads and writes are
//! serialized through one mutex so the workflow and its poller can share a
//! handle. A broken file never blocks ordering: it loads as empty and write
//! failures are only logged.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::OrderStatus;

/// Label stored when the operator picks the material
pub const OPERATOR_CHOICE_LABEL: &str = "Operator choice";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderHistoryEntry {
    pub order_id: Uuid,
    pub file_name: String,
    pub material_name: String,
    pub infill_percent: u32,
    #[serde(default)]
    pub color: Option<String>,
    pub status: OrderStatus,
    #[serde(default)]
    pub estimated_total: Option<i64>,
    #[serde(default)]
    pub final_price: Option<i64>,
    pub recorded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct OrderHistory {
    inner: Arc<Mutex<HistoryInner>>,
}

struct HistoryInner {
    path: PathBuf,
    capacity: usize,
    // Most recent first
    entries: Vec<OrderHistoryEntry>,
}

impl OrderHistory {
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let path = path.into();
        let capacity = capacity.max(1);
        let mut entries = load(&path);
        entries.truncate(capacity);
        debug!(path = %path.display(), entries = entries.len(), "Order history loaded");

        Self {
            inner: Arc::new(Mutex::new(HistoryInner {
                path,
                capacity,
                entries,
            })),
        }
    }

    /// Newest first.
    pub fn entries(&self) -> Vec<OrderHistoryEntry> {
        self.inner.lock().entries.clone()
    }

    pub fn get(&self, order_id: Uuid) -> Option<OrderHistoryEntry> {
        self.inner
            .lock()
            .entries
            .iter()
            .find(|e| e.order_id == order_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts at the front, replacing any entry for the same order.
    pub fn record(&self, entry: OrderHistoryEntry) {
        let mut inner = self.inner.lock();
        inner.entries.retain(|e| e.order_id != entry.order_id);
        inner.entries.insert(0, entry);
        let capacity = inner.capacity;
        inner.entries.truncate(capacity);
        inner.persist();
    }

    /// Applies `f` to the entry for `order_id` and bumps its `updated_at`.
    /// Returns `false` for unknown orders.
    pub fn update<F>(&self, order_id: Uuid, f: F) -> bool
    where
        F: FnOnce(&mut OrderHistoryEntry),
    {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.entries.iter_mut().find(|e| e.order_id == order_id) else {
            return false;
        };
        f(entry);
        entry.updated_at = Utc::now();
        inner.persist();
        true
    }
}

impl HistoryInner {
    fn persist(&self) {
        if let Err(e) = write_atomic(&self.path, &self.entries) {
            warn!(path = %self.path.display(), error = %e, "Failed to persist order history");
        }
    }
}

fn load(path: &Path) -> Vec<OrderHistoryEntry> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read order history");
            return Vec::new();
        }
    };

    serde_json::from_slice(&raw).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Order history is corrupt, starting empty");
        Vec::new()
    })
}

fn write_atomic(path: &Path, entries: &[OrderHistoryEntry]) -> io::Result<()> {
    let json = serde_json::to_vec_pretty(entries)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)
}
