//! Content store abstraction.
//!
//! The [`ContentStore`] trait covers every record operation the importer
//! needs: container lookup, scoped queries by title and slug, body updates,
//! and per-record key-value metadata (used for backup snapshots).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{NewRecord, Record, UpdateOutcome};

/// Abstract record backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_record`](ContentStore::get_record) | Fetch one record by id |
/// | [`records_in_container`](ContentStore::records_in_container) | All records whose container is `scope_id` |
/// | [`find_by_title`](ContentStore::find_by_title) | Scoped exact-title query |
/// | [`find_by_slug`](ContentStore::find_by_slug) | Scoped slug query |
/// | [`update_body`](ContentStore::update_body) | Replace a body, reporting no-op writes |
/// | [`get_meta`](ContentStore::get_meta) / [`set_meta`](ContentStore::set_meta) / [`delete_meta`](ContentStore::delete_meta) | Record metadata |
/// | [`records_with_meta`](ContentStore::records_with_meta) | Ids of records carrying a metadata key |
///
/// Query methods return records ordered by ascending id so that the "first"
/// candidate is deterministic.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert a record and return its id.
    async fn insert_record(&self, record: &NewRecord) -> Result<i64>;

    async fn get_record(&self, id: i64) -> Result<Option<Record>>;

    /// Records whose `container_id` equals `scope_id`, of any kind.
    async fn records_in_container(&self, scope_id: i64) -> Result<Vec<Record>>;

    /// Records of `kind` in `scope_id` whose title equals `title` exactly.
    async fn find_by_title(&self, scope_id: i64, kind: &str, title: &str) -> Result<Vec<Record>>;

    /// Records of `kind` in `scope_id` whose slug equals `slug`.
    async fn find_by_slug(&self, scope_id: i64, kind: &str, slug: &str) -> Result<Vec<Record>>;

    /// All records, optionally filtered by kind and container.
    async fn list_records(
        &self,
        kind: Option<&str>,
        container_id: Option<i64>,
    ) -> Result<Vec<Record>>;

    /// Replace the body of record `id`.
    ///
    /// Returns [`UpdateOutcome::Unchanged`] when `body` equals the stored
    /// body. Fails when the record does not exist.
    async fn update_body(&self, id: i64, body: &str) -> Result<UpdateOutcome>;

    async fn get_meta(&self, id: i64, key: &str) -> Result<Option<String>>;

    async fn set_meta(&self, id: i64, key: &str, value: &str) -> Result<()>;

    /// Remove a metadata key. Absent keys are not an error.
    async fn delete_meta(&self, id: i64, key: &str) -> Result<()>;

    /// Ids of every record that has metadata under `key`, ascending.
    async fn records_with_meta(&self, key: &str) -> Result<Vec<i64>>;
}
