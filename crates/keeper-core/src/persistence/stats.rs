//! Storage statistics and manual maintenance.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::backup::{BackupLabel, BackupManager};
use super::config::StoreConfig;
use super::engine::{load_value, Store};
use super::error::StoreError;
use super::retention;
use super::schema;
use super::types::Document;
use crate::event_bus::StatusKind;

/// Snapshot of how much the store holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    /// Record count per collection, keyed by serialized name.
    pub counts: BTreeMap<String, usize>,
    /// Size of the primary file on disk; 0 if it doesn't exist yet.
    pub file_size_bytes: u64,
    pub backup_count: usize,
    /// Completed durable writes since open.
    pub write_count: u64,
    pub dirty: bool,
}

fn named_counts(doc: &Document) -> BTreeMap<String, usize> {
    doc.collection_counts()
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect()
}

impl StorageStats {
    /// Read statistics straight from disk without opening a store.
    ///
    /// Takes no snapshots and writes nothing, so it is safe to run while
    /// another process owns the store. An unreadable primary file counts as
    /// empty.
    pub fn inspect(data_dir: &Path, backup_dir: &Path, config: &StoreConfig) -> StorageStats {
        let primary = data_dir.join(&config.file_name);
        let doc = match load_value(&primary) {
            Ok(raw) => schema::validate(raw).0,
            Err(e) => {
                log::debug!("Inspecting unreadable store file {:?}: {}", primary, e);
                Document::default()
            }
        };
        let backups = BackupManager::new(
            primary.clone(),
            backup_dir.to_path_buf(),
            &config.backup_prefix,
            config.backup_keep,
        );

        StorageStats {
            counts: named_counts(&doc),
            file_size_bytes: fs::metadata(&primary).map(|m| m.len()).unwrap_or(0),
            backup_count: backups.backup_count(),
            write_count: 0,
            dirty: false,
        }
    }
}

impl Store {
    pub async fn storage_stats(&self) -> StorageStats {
        let counts = self.read(named_counts);

        let file_size_bytes = match tokio::fs::metadata(self.primary_path()).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        StorageStats {
            counts,
            file_size_bytes,
            backup_count: self.backups().backup_count(),
            write_count: self.write_count(),
            dirty: self.is_dirty(),
        }
    }

    /// Flush pending changes, then snapshot the primary file.
    pub async fn create_manual_backup(&self) -> Option<PathBuf> {
        if let Err(e) = self.force_flush().await {
            log::warn!("Flush before manual backup failed: {}", e);
        }
        self.create_backup(BackupLabel::Manual).await
    }

    /// Apply the retention caps now and write the result. Returns how many
    /// entries were removed.
    pub async fn compact_now(&self) -> Result<usize, StoreError> {
        let policy = self.config().retention.clone();
        let removed = self.update(|doc| retention::compact(doc, &policy));
        log::info!("Compacted store, removed {} entries", removed);
        self.emit(StatusKind::Compacted, format!("{removed} entries removed"));

        self.force_flush().await?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::test_support::open_store;
    use crate::persistence::NewCommand;
    use tempfile::tempdir;

    #[tokio::test]
    async fn inspect_reads_disk_without_touching_backups() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;
        store.add_command_history(NewCommand::new("list"));
        let manual = store.create_manual_backup().await.unwrap();
        store.shutdown().await;
        let listed = store.backups().list_backups().unwrap();

        let config = StoreConfig::default();
        let (data, backups) = (dir.path().join("data"), dir.path().join("backups"));
        for _ in 0..3 {
            let stats = StorageStats::inspect(&data, &backups, &config);
            assert_eq!(stats.counts["commandHistory"], 1);
            assert_eq!(stats.backup_count, listed.len());
            assert!(stats.file_size_bytes > 0);
        }

        assert!(manual.exists());
        assert_eq!(store.backups().list_backups().unwrap(), listed);
    }

    #[test]
    fn inspect_of_missing_store_is_empty() {
        let dir = tempdir().unwrap();
        let stats = StorageStats::inspect(dir.path(), dir.path(), &StoreConfig::default());

        assert_eq!(stats.file_size_bytes, 0);
        assert_eq!(stats.backup_count, 0);
        assert!(stats.counts.values().all(|count| *count == 0));
    }

    #[tokio::test]
    async fn stats_reflect_counts_and_disk() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;
        store.add_command_history(NewCommand::new("list"));
        store.add_note("todo", "");

        let stats = store.storage_stats().await;
        assert_eq!(stats.counts["commandHistory"], 1);
        assert_eq!(stats.counts["notes"], 1);
        assert_eq!(stats.counts["servers"], 0);
        assert!(stats.file_size_bytes > 0);
        assert_eq!(stats.write_count, 1);
        assert!(stats.dirty);

        let json = serde_json::to_value(&stats).unwrap();
        assert!(json.get("fileSizeBytes").is_some());
    }

    #[tokio::test]
    async fn manual_backup_flushes_first() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;
        store.add_command_history(NewCommand::new("save-all"));

        let path = store.create_manual_backup().await.unwrap();

        assert!(!store.is_dirty());
        assert!(path.file_name().unwrap().to_string_lossy().ends_with("-manual.json"));
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.contains("save-all"));
    }

    #[tokio::test]
    async fn compact_now_writes_trimmed_document() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;
        let cap = store.config().retention.command_history;
        // Bypass the accessor so the cap is exceeded in memory.
        store.update(|doc| {
            for n in 0..cap + 7 {
                doc.command_history.push(crate::persistence::CommandHistoryEntry {
                    id: format!("c-{n}"),
                    command: "list".to_string(),
                    args: Vec::new(),
                    success: true,
                    response: None,
                    source: None,
                    created_at: chrono::Utc::now(),
                });
            }
        });

        assert_eq!(store.compact_now().await.unwrap(), 7);
        assert!(!store.is_dirty());
        assert_eq!(store.storage_stats().await.counts["commandHistory"], cap);
        assert_eq!(store.compact_now().await.unwrap(), 0);
    }
}
