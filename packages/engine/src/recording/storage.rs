// packages/engine/src/recording/storage.rs
//! Log storage using SQLite + file system
//!
//! Compressed batches go to one file each under `events_dir`; SQLite keeps the
//! batch index (in write order) and the registered classes.

use crate::probe::{ClassId, ProbeId};
use crate::recording::compressor::Compressor;
use crate::recording::event::{LogEntry, RecordedEvent};
use crate::utils::errors::{EngineError, Result};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory for storage
    pub base_dir: PathBuf,

    /// SQLite database file name
    pub db_name: String,

    /// Batch file directory, relative to `base_dir`
    pub events_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(".probelog"),
            db_name: "events.db".to_string(),
            events_dir: "events".to_string(),
        }
    }
}

/// Event log storage
pub struct EventStorage {
    config: StorageConfig,
    db: Arc<Mutex<Connection>>,
}

impl EventStorage {
    /// Open (or create) the storage under `config.base_dir`
    pub async fn new(config: StorageConfig) -> Result<Self> {
        let events_dir = config.base_dir.join(&config.events_dir);
        fs::create_dir_all(&events_dir).await.map_err(|e| {
            EngineError::StorageFailed(format!("Failed to create events directory: {}", e))
        })?;

        let db_path = config.base_dir.join(&config.db_name);
        let conn = Connection::open(&db_path).map_err(|e| {
            EngineError::StorageFailed(format!("Failed to open database: {}", e))
        })?;

        let storage = Self {
            config,
            db: Arc::new(Mutex::new(conn)),
        };

        storage.init_schema().await?;

        info!("Event storage opened at {:?}", storage.config.base_dir);

        Ok(storage)
    }

    async fn init_schema(&self) -> Result<()> {
        let db = self.db.lock().await;

        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS event_batches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_path TEXT NOT NULL,
                entry_count INTEGER NOT NULL,
                compressed_size INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS classes (
                class_id INTEGER PRIMARY KEY,
                anchor_probe_id INTEGER,
                probe_count INTEGER NOT NULL,
                registered_at INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| EngineError::StorageFailed(format!("Schema creation failed: {}", e)))?;

        Ok(())
    }

    /// Write a compressed batch holding `entry_count` entries; returns its sequence number
    pub async fn write_batch(&self, compressed_data: &[u8], entry_count: usize) -> Result<i64> {
        // Holding the connection across the file write keeps sequence numbers
        // and files in the same order
        let db = self.db.lock().await;

        let sequence: i64 = db
            .query_row(
                "SELECT COALESCE(MAX(id), 0) + 1 FROM event_batches",
                [],
                |row| row.get(0),
            )
            .map_err(|e| EngineError::StorageFailed(format!("Sequence query failed: {}", e)))?;

        let file_path = self
            .config
            .base_dir
            .join(&self.config.events_dir)
            .join(format!("batch_{:08}.zst", sequence));

        fs::write(&file_path, compressed_data).await.map_err(|e| {
            EngineError::StorageFailed(format!("Failed to write batch file: {}", e))
        })?;

        db.execute(
            r#"
            INSERT INTO event_batches (id, file_path, entry_count, compressed_size, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                sequence,
                file_path.to_string_lossy(),
                entry_count as i64,
                compressed_data.len() as i64,
                chrono::Utc::now().timestamp(),
            ],
        )
        .map_err(|e| {
            EngineError::StorageFailed(format!("Failed to record batch metadata: {}", e))
        })?;

        debug!(
            "Wrote batch {} ({} entries, {} bytes)",
            sequence,
            entry_count,
            compressed_data.len()
        );

        Ok(sequence)
    }

    /// Record a class registration; a repeated registration overwrites the first
    pub async fn record_class(&self, class_id: ClassId, probe_ids: &[ProbeId]) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            r#"
            INSERT OR REPLACE INTO classes (class_id, anchor_probe_id, probe_count, registered_at)
            VALUES (?, ?, ?, ?)
            "#,
            params![
                class_id,
                probe_ids.first().copied(),
                probe_ids.len() as i64,
                chrono::Utc::now().timestamp(),
            ],
        )
        .map_err(|e| EngineError::StorageFailed(format!("Failed to record class: {}", e)))?;
        Ok(())
    }

    /// Read a compressed batch by sequence number
    pub async fn read_batch(&self, sequence: i64) -> Result<Vec<u8>> {
        let db = self.db.lock().await;
        let file_path: String = db
            .query_row(
                "SELECT file_path FROM event_batches WHERE id = ?",
                params![sequence],
                |row| row.get(0),
            )
            .map_err(|e| EngineError::StorageFailed(format!("Batch not found: {}", e)))?;

        drop(db);

        fs::read(&file_path).await.map_err(|e| {
            EngineError::StorageFailed(format!("Failed to read batch file: {}", e))
        })
    }

    /// List all batches in write order
    pub async fn list_batches(&self) -> Result<Vec<BatchMetadata>> {
        let db = self.db.lock().await;

        let mut stmt = db
            .prepare(
                "SELECT id, entry_count, compressed_size, created_at FROM event_batches ORDER BY id",
            )
            .map_err(|e| {
                EngineError::StorageFailed(format!("Query preparation failed: {}", e))
            })?;

        let batches = stmt
            .query_map([], |row| {
                Ok(BatchMetadata {
                    sequence: row.get(0)?,
                    entry_count: row.get(1)?,
                    compressed_size: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })
            .map_err(|e| EngineError::StorageFailed(format!("Query execution failed: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| {
                EngineError::StorageFailed(format!("Result collection failed: {}", e))
            })?;

        Ok(batches)
    }

    /// Every stored entry, in log order
    pub async fn read_entries(&self, compressor: &Compressor) -> Result<Vec<LogEntry>> {
        let mut entries = Vec::new();
        for batch in self.list_batches().await? {
            let data = self.read_batch(batch.sequence).await?;
            entries.extend(compressor.decode_batch(&data)?);
        }
        Ok(entries)
    }

    /// Every stored event, in log order
    pub async fn read_events(&self, compressor: &Compressor) -> Result<Vec<RecordedEvent>> {
        Ok(self
            .read_entries(compressor)
            .await?
            .into_iter()
            .filter_map(|entry| match entry {
                LogEntry::Event(event) => Some(event),
                LogEntry::Weave { .. } => None,
            })
            .collect())
    }

    /// Registered classes ordered by id
    pub async fn list_classes(&self) -> Result<Vec<ClassRecord>> {
        let db = self.db.lock().await;

        let mut stmt = db
            .prepare("SELECT class_id, anchor_probe_id, probe_count FROM classes ORDER BY class_id")
            .map_err(|e| {
                EngineError::StorageFailed(format!("Query preparation failed: {}", e))
            })?;

        let classes = stmt
            .query_map([], |row| {
                Ok(ClassRecord {
                    class_id: row.get(0)?,
                    anchor_probe_id: row.get(1)?,
                    probe_count: row.get(2)?,
                })
            })
            .map_err(|e| EngineError::StorageFailed(format!("Query execution failed: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| {
                EngineError::StorageFailed(format!("Result collection failed: {}", e))
            })?;

        Ok(classes)
    }

    /// Get storage statistics
    pub async fn stats(&self) -> Result<StorageStats> {
        let db = self.db.lock().await;

        let (total_batches, total_entries, total_size): (i64, i64, i64) = db
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(entry_count), 0), COALESCE(SUM(compressed_size), 0) FROM event_batches",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(|e| EngineError::StorageFailed(format!("Stats query failed: {}", e)))?;

        let total_classes: i64 = db
            .query_row("SELECT COUNT(*) FROM classes", [], |row| row.get(0))
            .map_err(|e| EngineError::StorageFailed(format!("Stats query failed: {}", e)))?;

        Ok(StorageStats {
            total_batches: total_batches as u64,
            total_entries: total_entries as u64,
            total_size_bytes: total_size as u64,
            total_classes: total_classes as u64,
        })
    }
}

/// Batch metadata
#[derive(Debug, Clone)]
pub struct BatchMetadata {
    pub sequence: i64,
    pub entry_count: i64,
    pub compressed_size: i64,
    pub created_at: i64,
}

/// Registered class row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRecord {
    pub class_id: ClassId,
    pub anchor_probe_id: Option<ProbeId>,
    pub probe_count: i64,
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    pub total_batches: u64,
    pub total_entries: u64,
    pub total_size_bytes: u64,
    pub total_classes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_in(dir: &std::path::Path) -> StorageConfig {
        StorageConfig {
            base_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_storage_creation() {
        let dir = tempdir().unwrap();
        let storage = EventStorage::new(config_in(dir.path())).await;
        assert!(storage.is_ok());
        assert!(dir.path().join("events").is_dir());
    }

    #[tokio::test]
    async fn test_write_read_batch() {
        let dir = tempdir().unwrap();
        let storage = EventStorage::new(config_in(dir.path())).await.unwrap();

        let first = storage.write_batch(b"first", 2).await.unwrap();
        let second = storage.write_batch(b"second", 3).await.unwrap();
        assert!(first < second);

        let batches = storage.list_batches().await.unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].entry_count, 3);

        assert_eq!(storage.read_batch(first).await.unwrap(), b"first");
        assert!(storage.read_batch(99).await.is_err());
    }

    #[tokio::test]
    async fn test_entries_read_back_in_order() {
        let dir = tempdir().unwrap();
        let storage = EventStorage::new(config_in(dir.path())).await.unwrap();
        let compressor = Compressor::default();

        let first = vec![
            LogEntry::Weave {
                class_id: 1,
                probe_ids: vec![10, 11],
            },
            LogEntry::Event(RecordedEvent::now(10, 1, None)),
        ];
        let second = vec![LogEntry::Event(RecordedEvent::now(11, 2, Some(b"42")))];

        storage
            .write_batch(&compressor.encode_batch(&first).unwrap(), first.len())
            .await
            .unwrap();
        storage
            .write_batch(&compressor.encode_batch(&second).unwrap(), second.len())
            .await
            .unwrap();

        let entries = storage.read_entries(&compressor).await.unwrap();
        assert_eq!(entries.len(), 3);

        let events = storage.read_events(&compressor).await.unwrap();
        assert_eq!(events.iter().map(|e| e.value).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_classes_and_stats() {
        let dir = tempdir().unwrap();
        let storage = EventStorage::new(config_in(dir.path())).await.unwrap();

        storage.record_class(2, &[20, 21, 22]).await.unwrap();
        storage.record_class(1, &[]).await.unwrap();
        storage.write_batch(b"data1", 4).await.unwrap();
        storage.write_batch(b"data2", 6).await.unwrap();

        let classes = storage.list_classes().await.unwrap();
        assert_eq!(
            classes[1],
            ClassRecord {
                class_id: 2,
                anchor_probe_id: Some(20),
                probe_count: 3,
            }
        );
        assert_eq!(classes[0].anchor_probe_id, None);

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.total_batches, 2);
        assert_eq!(stats.total_entries, 10);
        assert_eq!(stats.total_classes, 2);
    }

    #[tokio::test]
    async fn test_reopen_continues_sequence() {
        let dir = tempdir().unwrap();
        {
            let storage = EventStorage::new(config_in(dir.path())).await.unwrap();
            storage.write_batch(b"one", 1).await.unwrap();
        }

        let storage = EventStorage::new(config_in(dir.path())).await.unwrap();
        assert_eq!(storage.write_batch(b"two", 1).await.unwrap(), 2);
        assert_eq!(storage.list_batches().await.unwrap().len(), 2);
    }
}
