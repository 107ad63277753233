//! SQLite-backed record store.
//! One row per participant with the record as a JSON document, so the
//! record layout matches the JSON file store exactly.

use chrono::Utc;
use daycycle_core::{DaycycleError, ParticipantId, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use crate::store::{RecordStore, Records, decode_entries};

/// SQLite persistence for participant records.
pub struct SqliteRecordStore {
    conn: Mutex<rusqlite::Connection>,
}

fn db_err(context: &str) -> impl FnOnce(rusqlite::Error) -> DaycycleError + '_ {
    move |e| DaycycleError::Persistence(format!("{context}: {e}"))
}

impl SqliteRecordStore {
    pub const FILE_NAME: &'static str = "daycycle.db";

    /// Open or create the database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DaycycleError::Persistence(format!("create dir: {e}")))?;
        }
        let conn = rusqlite::Connection::open(path).map_err(db_err("DB open"))?;
        Self::with_connection(conn)
    }

    /// Database in `dir/daycycle.db`.
    pub fn in_dir(dir: &Path) -> Result<Self> {
        Self::open(&dir.join(Self::FILE_NAME))
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(db_err("DB open"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: rusqlite::Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS participants (
                id INTEGER PRIMARY KEY,         -- participant / chat id
                record TEXT NOT NULL,           -- JSON document
                updated_at TEXT NOT NULL
            );
            ",
        )
        .map_err(db_err("Migration"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>> {
        self.conn
            .lock()
            .map_err(|_| DaycycleError::Persistence("DB connection poisoned".into()))
    }
}

impl RecordStore for SqliteRecordStore {
    fn load_all(&self) -> Result<Records> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, record FROM participants ORDER BY id")
            .map_err(db_err("Load"))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))
            .map_err(db_err("Load"))?;

        let mut raw = BTreeMap::new();
        for row in rows {
            let (id, json) = row.map_err(db_err("Load row"))?;
            let value = serde_json::from_str::<serde_json::Value>(&json).map_err(|e| {
                DaycycleError::Persistence(format!("unreadable records: {id} ({e})"))
            })?;
            raw.insert(id.to_string(), value);
        }
        decode_entries(raw)
    }

    fn save_all(&self, records: &Records) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err("Begin"))?;
        let now = Utc::now().to_rfc3339();

        let existing: Vec<i64> = {
            let mut stmt = tx
                .prepare("SELECT id FROM participants")
                .map_err(db_err("Save"))?;
            let ids = stmt
                .query_map([], |row| row.get::<_, i64>(0))
                .map_err(db_err("Save"))?
                .collect::<std::result::Result<_, _>>()
                .map_err(db_err("Save"))?;
            ids
        };
        for id in existing {
            if !records.contains_key(&ParticipantId(id)) {
                tx.execute("DELETE FROM participants WHERE id = ?1", [id])
                    .map_err(db_err("Delete"))?;
            }
        }

        {
            let mut upsert = tx
                .prepare(
                    "INSERT INTO participants (id, record, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET record = excluded.record, updated_at = excluded.updated_at
                     WHERE participants.record <> excluded.record",
                )
                .map_err(db_err("Save"))?;
            for (id, record) in records {
                let json = serde_json::to_string(record)
                    .map_err(|e| DaycycleError::Persistence(format!("serialize: {e}")))?;
                upsert
                    .execute(rusqlite::params![id.0, json, now])
                    .map_err(db_err("Save"))?;
            }
        }

        tx.commit().map_err(db_err("Commit"))?;
        tracing::debug!("💾 Saved {} records to SQLite", records.len());
        Ok(())
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ParticipantRecord;
    use daycycle_core::Identity;

    #[test]
    fn test_open_and_migrate() {
        let dir = std::env::temp_dir().join("daycycle-sqlite-test");
        std::fs::remove_dir_all(&dir).ok();
        let store = SqliteRecordStore::in_dir(&dir).unwrap();
        assert!(store.load_all().unwrap().is_empty());
        drop(store);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_replaces_collection() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let mut records = Records::new();
        for id in [1, 2, 3] {
            let mut r = ParticipantRecord::new(Identity::default());
            r.day = id as u8;
            records.insert(ParticipantId(id), r);
        }
        store.save_all(&records).unwrap();
        assert_eq!(store.load_all().unwrap(), records);

        records.remove(&ParticipantId(2));
        if let Some(r) = records.get_mut(&ParticipantId(3)) {
            r.completed = true;
        }
        store.save_all(&records).unwrap();
        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded[&ParticipantId(3)].completed);
        assert!(!loaded.contains_key(&ParticipantId(2)));
    }

    #[test]
    fn test_unreadable_row_fails_load_and_survives() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let mut records = Records::new();
        records.insert(ParticipantId(1), ParticipantRecord::new(Identity::default()));
        store.save_all(&records).unwrap();
        store
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO participants (id, record, updated_at) VALUES (77, '{\"day\": \"three\"}', 'x')",
                [],
            )
            .unwrap();

        assert!(matches!(store.load_all(), Err(DaycycleError::Persistence(_))));
        let count: i64 = store
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM participants", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_reopen_keeps_records() {
        let dir = std::env::temp_dir().join("daycycle-sqlite-reopen");
        std::fs::remove_dir_all(&dir).ok();
        let mut records = Records::new();
        records.insert(ParticipantId(9), ParticipantRecord::new(Identity::default()));
        {
            let store = SqliteRecordStore::in_dir(&dir).unwrap();
            store.save_all(&records).unwrap();
        }
        let store = SqliteRecordStore::in_dir(&dir).unwrap();
        assert_eq!(store.load_all().unwrap(), records);
        drop(store);
        std::fs::remove_dir_all(&dir).ok();
    }
}
