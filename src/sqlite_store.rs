//! SQLite-backed [`ContentStore`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use zip_content_replacer_core::models::{NewRecord, Record, UpdateOutcome};
use zip_content_replacer_core::store::ContentStore;

pub struct SqliteContentStore {
    pool: SqlitePool,
}

impl SqliteContentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const RECORD_COLUMNS: &str = "id, kind, title, slug, container_id, body";

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Record {
    Record {
        id: row.get("id"),
        kind: row.get("kind"),
        title: row.get("title"),
        slug: row.get("slug"),
        container_id: row.get("container_id"),
        body: row.get("body"),
    }
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn insert_record(&self, record: &NewRecord) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT INTO records (kind, title, slug, container_id, body, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.kind)
        .bind(&record.title)
        .bind(&record.slug)
        .bind(record.container_id)
        .bind(&record.body)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn get_record(&self, id: i64) -> Result<Option<Record>> {
        let row = sqlx::query(&format!("SELECT {} FROM records WHERE id = ?", RECORD_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_record))
    }

    async fn records_in_container(&self, scope_id: i64) -> Result<Vec<Record>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM records WHERE container_id = ? ORDER BY id ASC",
            RECORD_COLUMNS
        ))
        .bind(scope_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn find_by_title(&self, scope_id: i64, kind: &str, title: &str) -> Result<Vec<Record>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM records
             WHERE container_id = ? AND kind = ? AND title = ?
             ORDER BY id ASC",
            RECORD_COLUMNS
        ))
        .bind(scope_id)
        .bind(kind)
        .bind(title)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn find_by_slug(&self, scope_id: i64, kind: &str, slug: &str) -> Result<Vec<Record>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM records
             WHERE container_id = ? AND kind = ? AND slug = ?
             ORDER BY id ASC",
            RECORD_COLUMNS
        ))
        .bind(scope_id)
        .bind(kind)
        .bind(slug)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn list_records(
        &self,
        kind: Option<&str>,
        container_id: Option<i64>,
    ) -> Result<Vec<Record>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM records
             WHERE (? IS NULL OR kind = ?)
               AND (? IS NULL OR container_id = ?)
             ORDER BY id ASC",
            RECORD_COLUMNS
        ))
        .bind(kind)
        .bind(kind)
        .bind(container_id)
        .bind(container_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn update_body(&self, id: i64, body: &str) -> Result<UpdateOutcome> {
        let current: Option<String> = sqlx::query_scalar("SELECT body FROM records WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(current) = current else {
            bail!("record {} does not exist", id);
        };
        if current == body {
            return Ok(UpdateOutcome::Unchanged);
        }
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE records SET body = ?, updated_at = ? WHERE id = ?")
            .bind(body)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(UpdateOutcome::Updated)
    }

    async fn get_meta(&self, id: i64, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT meta_value FROM record_meta WHERE record_id = ? AND meta_key = ?",
        )
        .bind(id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn set_meta(&self, id: i64, key: &str, value: &str) -> Result<()> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM records WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            bail!("record {} does not exist", id);
        }
        sqlx::query(
            "INSERT INTO record_meta (record_id, meta_key, meta_value)
             VALUES (?, ?, ?)
             ON CONFLICT(record_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value",
        )
        .bind(id)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_meta(&self, id: i64, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM record_meta WHERE record_id = ? AND meta_key = ?")
            .bind(id)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn records_with_meta(&self, key: &str) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT record_id FROM record_meta WHERE meta_key = ? ORDER BY record_id ASC",
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::apply_schema;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteContentStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();
        SqliteContentStore::new(pool)
    }

    fn chapter(title: &str, container: i64) -> NewRecord {
        NewRecord {
            kind: "chapter".to_string(),
            title: title.to_string(),
            slug: zip_content_replacer_core::slug::slugify(title),
            container_id: Some(container),
            body: format!("{} body", title),
        }
    }

    #[tokio::test]
    async fn scoped_queries_are_ordered() {
        let s = store().await;
        let a = s.insert_record(&chapter("Same", 1)).await.unwrap();
        let b = s.insert_record(&chapter("Same", 1)).await.unwrap();
        s.insert_record(&chapter("Same", 2)).await.unwrap();

        let found = s.find_by_title(1, "chapter", "Same").await.unwrap();
        assert_eq!(found.iter().map(|r| r.id).collect::<Vec<_>>(), vec![a, b]);
        assert_eq!(s.find_by_slug(1, "chapter", "same").await.unwrap().len(), 2);
        assert!(s.find_by_slug(1, "page", "same").await.unwrap().is_empty());
        assert_eq!(s.list_records(Some("chapter"), None).await.unwrap().len(), 3);
        assert_eq!(s.list_records(None, Some(2)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_reports_unchanged() {
        let s = store().await;
        let id = s.insert_record(&chapter("One", 1)).await.unwrap();
        assert_eq!(
            s.update_body(id, "One body").await.unwrap(),
            UpdateOutcome::Unchanged
        );
        assert_eq!(s.update_body(id, "new").await.unwrap(), UpdateOutcome::Updated);
        assert_eq!(s.get_record(id).await.unwrap().unwrap().body, "new");
        assert!(s.update_body(999, "x").await.is_err());
    }

    #[tokio::test]
    async fn meta_upserts_and_lists() {
        let s = store().await;
        let id = s.insert_record(&chapter("One", 1)).await.unwrap();
        s.set_meta(id, "k", "v1").await.unwrap();
        s.set_meta(id, "k", "v2").await.unwrap();
        assert_eq!(s.get_meta(id, "k").await.unwrap().as_deref(), Some("v2"));
        assert_eq!(s.records_with_meta("k").await.unwrap(), vec![id]);
        s.delete_meta(id, "k").await.unwrap();
        assert!(s.get_meta(id, "k").await.unwrap().is_none());
        assert!(s.set_meta(999, "k", "v").await.is_err());
    }
}
