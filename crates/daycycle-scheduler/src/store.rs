//! Record stores: durable participant records.
//! The whole collection is written on every change; participants are few and
//! records are small, so a full rewrite keeps the file consistent.

use daycycle_core::{DaycycleError, ParticipantId, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::record::ParticipantRecord;

/// All records, keyed by participant.
pub type Records = BTreeMap<ParticipantId, ParticipantRecord>;

/// Load/save interface for participant records.
pub trait RecordStore: Send {
    /// Load every record. A store that does not exist yet loads as empty.
    fn load_all(&self) -> Result<Records>;

    /// Replace the stored collection with `records`.
    fn save_all(&self, records: &Records) -> Result<()>;

    fn name(&self) -> &str;
}

/// Single JSON document keyed by participant id (`user_data.json`).
pub struct JsonRecordStore {
    path: PathBuf,
}

impl JsonRecordStore {
    pub const FILE_NAME: &'static str = "user_data.json";

    /// Store at an explicit file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store in `dir/user_data.json`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(Self::FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for JsonRecordStore {
    fn load_all(&self) -> Result<Records> {
        if !self.path.exists() {
            tracing::info!("📂 No record file at {}, starting empty", self.path.display());
            return Ok(Records::new());
        }
        let json = std::fs::read_to_string(&self.path).map_err(|e| {
            DaycycleError::Persistence(format!("read {}: {e}", self.path.display()))
        })?;
        if json.trim().is_empty() {
            return Ok(Records::new());
        }
        let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(&json).map_err(|e| {
            DaycycleError::Persistence(format!("parse {}: {e}", self.path.display()))
        })?;
        decode_entries(raw)
    }

    fn save_all(&self, records: &Records) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DaycycleError::Persistence(format!("create dir: {e}")))?;
        }
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| DaycycleError::Persistence(format!("serialize: {e}")))?;
        // Write next to the target, then rename over it.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)
            .map_err(|e| DaycycleError::Persistence(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            DaycycleError::Persistence(format!("replace {}: {e}", self.path.display()))
        })?;
        tracing::debug!("💾 Saved {} records to {}", records.len(), self.path.display());
        Ok(())
    }

    fn name(&self) -> &str {
        "json"
    }
}

/// Decode raw `id → record` entries. Any entry that does not decode fails the
/// whole load: saves rewrite the full collection, so a skipped record would be
/// lost on the next write.
pub(crate) fn decode_entries(raw: BTreeMap<String, serde_json::Value>) -> Result<Records> {
    let mut records = Records::new();
    let mut unreadable = Vec::new();
    for (key, value) in raw {
        let Ok(id) = key.parse::<ParticipantId>() else {
            tracing::error!("❌ Record key '{key}' is not a participant id");
            unreadable.push(key);
            continue;
        };
        match serde_json::from_value::<ParticipantRecord>(value) {
            Ok(mut record) => {
                record.normalize();
                records.insert(id, record);
            }
            Err(e) => {
                tracing::error!("❌ Record {id} is unreadable: {e}");
                unreadable.push(key);
            }
        }
    }
    if !unreadable.is_empty() {
        return Err(DaycycleError::Persistence(format!(
            "unreadable records: {}",
            unreadable.join(", ")
        )));
    }
    Ok(records)
}

/// In-memory store. Saves can be made to fail to exercise rollback paths.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<Records>,
    fail_saves: AtomicBool,
    saves: Mutex<usize>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Records) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    /// Make subsequent saves fail (or succeed again).
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Copy of what was last saved.
    pub fn stored(&self) -> Records {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|g| *g).unwrap_or(0)
    }
}

impl RecordStore for MemoryRecordStore {
    fn load_all(&self) -> Result<Records> {
        Ok(self.stored())
    }

    fn save_all(&self, records: &Records) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(DaycycleError::Persistence("memory store: saves disabled".into()));
        }
        let mut guard = self
            .records
            .lock()
            .map_err(|_| DaycycleError::Persistence("memory store poisoned".into()))?;
        *guard = records.clone();
        if let Ok(mut saves) = self.saves.lock() {
            *saves += 1;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

impl<S: RecordStore + ?Sized> RecordStore for Box<S> {
    fn load_all(&self) -> Result<Records> {
        (**self).load_all()
    }

    fn save_all(&self, records: &Records) -> Result<()> {
        (**self).save_all(records)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Shared store handle, so callers can keep a reference to a store they hand over.
impl<S: RecordStore + Sync> RecordStore for std::sync::Arc<S> {
    fn load_all(&self) -> Result<Records> {
        (**self).load_all()
    }

    fn save_all(&self, records: &Records) -> Result<()> {
        (**self).save_all(records)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
