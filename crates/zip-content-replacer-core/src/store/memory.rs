//! In-memory [`ContentStore`] implementation for tests and embedding.
//!
//! Uses a `BTreeMap` behind `std::sync::RwLock` so iteration is ordered by
//! record id, matching the ordering contract of the trait.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::models::{NewRecord, Record, UpdateOutcome};

use super::ContentStore;

#[derive(Default)]
struct Inner {
    records: BTreeMap<i64, Record>,
    meta: BTreeMap<(i64, String), String>,
    next_id: i64,
}

/// In-memory record store.
pub struct InMemoryContentStore {
    inner: RwLock<Inner>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                next_id: 1,
                ..Inner::default()
            }),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| anyhow!("content store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| anyhow!("content store lock poisoned"))
    }

    fn filter(&self, pred: impl Fn(&Record) -> bool) -> Result<Vec<Record>> {
        Ok(self
            .read()?
            .records
            .values()
            .filter(|r| pred(r))
            .cloned()
            .collect())
    }
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn insert_record(&self, record: &NewRecord) -> Result<i64> {
        let mut inner = self.write()?;
        let id = inner.next_id;
        inner.next_id += 1;
        inner.records.insert(
            id,
            Record {
                id,
                kind: record.kind.clone(),
                title: record.title.clone(),
                slug: record.slug.clone(),
                container_id: record.container_id,
                body: record.body.clone(),
            },
        );
        Ok(id)
    }

    async fn get_record(&self, id: i64) -> Result<Option<Record>> {
        Ok(self.read()?.records.get(&id).cloned())
    }

    async fn records_in_container(&self, scope_id: i64) -> Result<Vec<Record>> {
        self.filter(|r| r.container_id == Some(scope_id))
    }

    async fn find_by_title(&self, scope_id: i64, kind: &str, title: &str) -> Result<Vec<Record>> {
        self.filter(|r| r.container_id == Some(scope_id) && r.kind == kind && r.title == title)
    }

    async fn find_by_slug(&self, scope_id: i64, kind: &str, slug: &str) -> Result<Vec<Record>> {
        self.filter(|r| r.container_id == Some(scope_id) && r.kind == kind && r.slug == slug)
    }

    async fn list_records(
        &self,
        kind: Option<&str>,
        container_id: Option<i64>,
    ) -> Result<Vec<Record>> {
        self.filter(|r| {
            kind.map_or(true, |k| r.kind == k)
                && container_id.map_or(true, |c| r.container_id == Some(c))
        })
    }

    async fn update_body(&self, id: i64, body: &str) -> Result<UpdateOutcome> {
        let mut inner = self.write()?;
        let Some(record) = inner.records.get_mut(&id) else {
            bail!("record not found: {}", id);
        };
        if record.body == body {
            return Ok(UpdateOutcome::Unchanged);
        }
        record.body = body.to_string();
        Ok(UpdateOutcome::Updated)
    }

    async fn get_meta(&self, id: i64, key: &str) -> Result<Option<String>> {
        Ok(self.read()?.meta.get(&(id, key.to_string())).cloned())
    }

    async fn set_meta(&self, id: i64, key: &str, value: &str) -> Result<()> {
        let mut inner = self.write()?;
        if !inner.records.contains_key(&id) {
            bail!("record not found: {}", id);
        }
        inner.meta.insert((id, key.to_string()), value.to_string());
        Ok(())
    }

    async fn delete_meta(&self, id: i64, key: &str) -> Result<()> {
        self.write()?.meta.remove(&(id, key.to_string()));
        Ok(())
    }

    async fn records_with_meta(&self, key: &str) -> Result<Vec<i64>> {
        Ok(self
            .read()?
            .meta
            .keys()
            .filter(|(_, k)| k == key)
            .map(|(id, _)| *id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(title: &str, scope: i64) -> NewRecord {
        NewRecord {
            kind: "chapter".to_string(),
            title: title.to_string(),
            slug: title.to_lowercase(),
            container_id: Some(scope),
            body: format!("<p>{}</p>", title),
        }
    }

    #[tokio::test]
    async fn update_reports_unchanged_body() {
        let store = InMemoryContentStore::new();
        let id = store.insert_record(&chapter("One", 1)).await.unwrap();

        let same = store.update_body(id, "<p>One</p>").await.unwrap();
        assert_eq!(same, UpdateOutcome::Unchanged);

        let changed = store.update_body(id, "<p>Uno</p>").await.unwrap();
        assert_eq!(changed, UpdateOutcome::Updated);
        assert_eq!(store.get_record(id).await.unwrap().unwrap().body, "<p>Uno</p>");
    }

    #[tokio::test]
    async fn update_missing_record_fails() {
        let store = InMemoryContentStore::new();
        assert!(store.update_body(42, "x").await.is_err());
    }

    #[tokio::test]
    async fn title_query_is_scoped_and_ordered() {
        let store = InMemoryContentStore::new();
        let a = store.insert_record(&chapter("Same", 1)).await.unwrap();
        store.insert_record(&chapter("Same", 2)).await.unwrap();
        let c = store.insert_record(&chapter("Same", 1)).await.unwrap();

        let found = store.find_by_title(1, "chapter", "Same").await.unwrap();
        let ids: Vec<i64> = found.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a, c]);
    }

    #[tokio::test]
    async fn meta_round_trip_and_listing() {
        let store = InMemoryContentStore::new();
        let a = store.insert_record(&chapter("A", 1)).await.unwrap();
        let b = store.insert_record(&chapter("B", 1)).await.unwrap();
        store.set_meta(b, "k", "v").await.unwrap();
        store.set_meta(a, "k", "w").await.unwrap();

        assert_eq!(store.records_with_meta("k").await.unwrap(), vec![a, b]);
        store.delete_meta(a, "k").await.unwrap();
        store.delete_meta(a, "k").await.unwrap();
        assert_eq!(store.get_meta(a, "k").await.unwrap(), None);
        assert_eq!(store.get_meta(b, "k").await.unwrap().as_deref(), Some("v"));
    }
}
