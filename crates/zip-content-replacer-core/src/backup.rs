//! Backup snapshots of record bodies.
//!
//! Before an import overwrites a body, the previous body is stored as a
//! [`BackupSnapshot`] in the record's metadata under [`BACKUP_META_KEY`].
//! A record holds at most one snapshot; taking a new one replaces it.
//! Snapshots never expire on their own.

use chrono::Utc;
use serde::Serialize;

use crate::error::{ImportError, ImportResult};
use crate::models::{BackupSnapshot, Record};
use crate::store::ContentStore;

/// Metadata key holding the JSON-encoded snapshot.
pub const BACKUP_META_KEY: &str = "_zcr_backup";

/// Outcome of a bulk operation on one record.
#[derive(Debug, Clone, Serialize)]
pub struct BulkItem {
    pub record_id: i64,
    pub ok: bool,
    pub message: String,
}

/// Per-record results of [`BackupManager::restore_all`] / [`BackupManager::delete_all`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkReport {
    pub succeeded: usize,
    pub failed: usize,
    pub items: Vec<BulkItem>,
}

impl BulkReport {
    fn push(&mut self, record_id: i64, result: ImportResult<String>) {
        let (ok, message) = match result {
            Ok(m) => (true, m),
            Err(e) => (false, e.to_string()),
        };
        if ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.items.push(BulkItem {
            record_id,
            ok,
            message,
        });
    }
}

/// Takes, restores, and discards backup snapshots.
pub struct BackupManager<'a> {
    store: &'a dyn ContentStore,
}

impl<'a> BackupManager<'a> {
    pub fn new(store: &'a dyn ContentStore) -> Self {
        Self { store }
    }

    /// Snapshot `record.body`, replacing any existing snapshot.
    pub async fn backup(&self, record: &Record, source_filename: &str) -> ImportResult<()> {
        let snapshot = BackupSnapshot {
            previous_body: record.body.clone(),
            captured_at: Utc::now(),
            source_filename: source_filename.to_string(),
        };
        let raw = serde_json::to_string(&snapshot).map_err(anyhow::Error::from)?;
        self.store
            .set_meta(record.id, BACKUP_META_KEY, &raw)
            .await?;
        Ok(())
    }

    /// The snapshot of `record_id`, if any.
    pub async fn get_backup(&self, record_id: i64) -> ImportResult<Option<BackupSnapshot>> {
        validate_id(record_id)?;
        let Some(raw) = self.store.get_meta(record_id, BACKUP_META_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                tracing::warn!(record_id, error = %e, "ignoring unreadable backup snapshot");
                Ok(None)
            }
        }
    }

    /// Write the snapshot back into the record body. The snapshot is kept.
    pub async fn restore(&self, record_id: i64) -> ImportResult<BackupSnapshot> {
        let snapshot = self
            .get_backup(record_id)
            .await?
            .ok_or(ImportError::NoBackupFound(record_id))?;
        self.store
            .update_body(record_id, &snapshot.previous_body)
            .await?;
        tracing::info!(record_id, "restored backup");
        Ok(snapshot)
    }

    /// Remove the snapshot of `record_id`. Absent snapshots are not an error.
    pub async fn delete_backup(&self, record_id: i64) -> ImportResult<()> {
        validate_id(record_id)?;
        self.store.delete_meta(record_id, BACKUP_META_KEY).await?;
        Ok(())
    }

    /// Every record carrying a snapshot, with the snapshot.
    pub async fn list_backups(&self) -> ImportResult<Vec<(i64, BackupSnapshot)>> {
        let ids = self.store.records_with_meta(BACKUP_META_KEY).await?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(snapshot) = self.get_backup(id).await? {
                out.push((id, snapshot));
            }
        }
        Ok(out)
    }

    /// Restore every snapshot; one failure does not stop the others.
    pub async fn restore_all(&self) -> ImportResult<BulkReport> {
        let ids = self.store.records_with_meta(BACKUP_META_KEY).await?;
        let mut report = BulkReport::default();
        for id in ids {
            let result = self
                .restore(id)
                .await
                .map(|s| format!("restored from backup of '{}'", s.source_filename));
            report.push(id, result);
        }
        Ok(report)
    }

    /// Delete every snapshot; one failure does not stop the others.
    pub async fn delete_all(&self) -> ImportResult<BulkReport> {
        let ids = self.store.records_with_meta(BACKUP_META_KEY).await?;
        let mut report = BulkReport::default();
        for id in ids {
            let result = self
                .delete_backup(id)
                .await
                .map(|_| "backup deleted".to_string());
            report.push(id, result);
        }
        Ok(report)
    }
}

/// Parse a caller-supplied record identifier.
pub fn parse_record_id(raw: &str) -> ImportResult<i64> {
    let id: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ImportError::InvalidIdentifier(raw.to_string()))?;
    validate_id(id)?;
    Ok(id)
}

fn validate_id(id: i64) -> ImportResult<()> {
    if id <= 0 {
        return Err(ImportError::InvalidIdentifier(id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewRecord;
    use crate::store::memory::InMemoryContentStore;

    async fn seeded() -> (InMemoryContentStore, i64) {
        let store = InMemoryContentStore::new();
        let id = store
            .insert_record(&NewRecord {
                kind: "chapter".to_string(),
                title: "One".to_string(),
                slug: "one".to_string(),
                container_id: Some(1),
                body: "original".to_string(),
            })
            .await
            .unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn backup_then_restore() {
        let (store, id) = seeded().await;
        let mgr = BackupManager::new(&store);
        let record = store.get_record(id).await.unwrap().unwrap();
        mgr.backup(&record, "One.txt").await.unwrap();
        store.update_body(id, "replaced").await.unwrap();

        let snap = mgr.restore(id).await.unwrap();
        assert_eq!(snap.source_filename, "One.txt");
        assert_eq!(store.get_record(id).await.unwrap().unwrap().body, "original");
        // Snapshot survives a restore.
        assert!(mgr.get_backup(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn restore_without_backup_fails_and_leaves_body() {
        let (store, id) = seeded().await;
        let mgr = BackupManager::new(&store);
        let err = mgr.restore(id).await.unwrap_err();
        assert!(matches!(err, ImportError::NoBackupFound(x) if x == id));
        assert_eq!(store.get_record(id).await.unwrap().unwrap().body, "original");
    }

    #[tokio::test]
    async fn new_backup_overwrites_old() {
        let (store, id) = seeded().await;
        let mgr = BackupManager::new(&store);
        let mut record = store.get_record(id).await.unwrap().unwrap();
        mgr.backup(&record, "a.txt").await.unwrap();
        record.body = "second".to_string();
        mgr.backup(&record, "b.txt").await.unwrap();

        let snap = mgr.get_backup(id).await.unwrap().unwrap();
        assert_eq!(snap.previous_body, "second");
        assert_eq!(snap.source_filename, "b.txt");
        assert_eq!(mgr.list_backups().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_is_unconditional() {
        let (store, id) = seeded().await;
        let mgr = BackupManager::new(&store);
        mgr.delete_backup(id).await.unwrap();
        let record = store.get_record(id).await.unwrap().unwrap();
        mgr.backup(&record, "a.txt").await.unwrap();
        mgr.delete_backup(id).await.unwrap();
        assert!(mgr.get_backup(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bulk_operations_are_independent() {
        let (store, id) = seeded().await;
        let mgr = BackupManager::new(&store);
        let record = store.get_record(id).await.unwrap().unwrap();
        mgr.backup(&record, "a.txt").await.unwrap();
        store.update_body(id, "changed").await.unwrap();
        // A corrupt snapshot on a second record reads as "no backup".
        let other = store
            .insert_record(&NewRecord {
                kind: "chapter".to_string(),
                title: "Two".to_string(),
                slug: "two".to_string(),
                container_id: Some(1),
                body: "two".to_string(),
            })
            .await
            .unwrap();
        store.set_meta(other, BACKUP_META_KEY, "garbage").await.unwrap();

        let report = mgr.restore_all().await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(store.get_record(id).await.unwrap().unwrap().body, "original");

        let report = mgr.delete_all().await.unwrap();
        assert_eq!(report.succeeded, 2);
        assert!(store.records_with_meta(BACKUP_META_KEY).await.unwrap().is_empty());
    }

    #[test]
    fn record_ids_are_validated() {
        assert_eq!(parse_record_id(" 12 ").unwrap(), 12);
        assert!(matches!(
            parse_record_id("0"),
            Err(ImportError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            parse_record_id("abc"),
            Err(ImportError::InvalidIdentifier(_))
        ));
    }
}
