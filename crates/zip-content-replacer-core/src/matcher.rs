//! Record matching.
//!
//! Resolves an archive filename stem to a record inside one container
//! scope. Title matching goes through a [`LookupCache`] built once per
//! `(scope, method)` and kept in the session store for a bounded TTL; slug
//! matching always queries the content store directly.
//!
//! Duplicate detection ([`Matcher::count_candidates`]) is never cached, so
//! it sees the store as it is at the moment of the call.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{MatchMethod, Record};
use crate::session::{load_json, save_json, SessionStore};
use crate::slug::slugify;
use crate::store::ContentStore;

/// Match key → record id, for one scope and method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupCache {
    pub scope_id: i64,
    pub method: MatchMethod,
    pub entries: HashMap<String, i64>,
    pub built_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl LookupCache {
    /// True while the cache is younger than its TTL.
    pub fn is_valid(&self) -> bool {
        let age = Utc::now().signed_duration_since(self.built_at);
        age.num_seconds() >= 0 && (age.num_seconds() as u64) < self.ttl_secs
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        self.entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Session-store key of the cache for `(scope_id, method)`.
pub fn cache_key(scope_id: i64, method: MatchMethod) -> String {
    format!("lookup:{}:{}", scope_id, method.as_str())
}

/// Filename stem: the final path component without its extension.
pub fn filename_stem(name: &str) -> &str {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match base.rfind('.') {
        Some(0) | None => base,
        Some(i) => &base[..i],
    }
}

/// Matches filename stems to records of one kind.
pub struct Matcher<'a> {
    store: &'a dyn ContentStore,
    record_kind: &'a str,
}

impl<'a> Matcher<'a> {
    pub fn new(store: &'a dyn ContentStore, record_kind: &'a str) -> Self {
        Self { store, record_kind }
    }

    /// Query every eligible record in `scope_id` and key it by title or slug.
    ///
    /// Records returned by the container query that fail the kind/scope
    /// check are skipped. When two records share a key the lower id wins.
    pub async fn build_cache(
        &self,
        scope_id: i64,
        method: MatchMethod,
        ttl: Duration,
    ) -> Result<LookupCache> {
        let records = self.store.records_in_container(scope_id).await?;
        let mut entries = HashMap::new();
        let mut skipped = 0usize;
        for record in records {
            if !record.is_eligible(scope_id, self.record_kind) {
                skipped += 1;
                continue;
            }
            let key = match method {
                MatchMethod::Title => record.title,
                MatchMethod::Slug => record.slug,
            };
            entries
                .entry(key)
                .and_modify(|id: &mut i64| *id = (*id).min(record.id))
                .or_insert(record.id);
        }
        tracing::debug!(
            scope_id,
            method = method.as_str(),
            keys = entries.len(),
            skipped,
            "built lookup cache"
        );
        Ok(LookupCache {
            scope_id,
            method,
            entries,
            built_at: Utc::now(),
            ttl_secs: ttl.as_secs(),
        })
    }

    /// Read a still-valid cache from `sessions`, or build and store one.
    pub async fn load_cache(
        &self,
        sessions: &dyn SessionStore,
        scope_id: i64,
        method: MatchMethod,
        ttl: Duration,
    ) -> Result<LookupCache> {
        let key = cache_key(scope_id, method);
        if let Some(cache) = load_json::<LookupCache>(sessions, &key).await? {
            if cache.is_valid() && cache.scope_id == scope_id && cache.method == method {
                return Ok(cache);
            }
        }
        let cache = self.build_cache(scope_id, method, ttl).await?;
        save_json(sessions, &key, &cache, ttl).await?;
        Ok(cache)
    }

    /// Resolve `stem` to a single record.
    ///
    /// Slug: the stem is slugified and looked up with a direct scoped query.
    /// Title: the exact stem is looked up in `cache`; the record is then
    /// re-read and dropped if it no longer belongs to the scope.
    pub async fn resolve(
        &self,
        stem: &str,
        scope_id: i64,
        method: MatchMethod,
        cache: &LookupCache,
    ) -> Result<Option<Record>> {
        match method {
            MatchMethod::Slug => {
                let slug = slugify(stem);
                if slug.is_empty() {
                    return Ok(None);
                }
                let found = self
                    .store
                    .find_by_slug(scope_id, self.record_kind, &slug)
                    .await?;
                Ok(found
                    .into_iter()
                    .find(|r| r.is_eligible(scope_id, self.record_kind)))
            }
            MatchMethod::Title => {
                let Some(id) = cache.get(stem) else {
                    return Ok(None);
                };
                let record = self.store.get_record(id).await?;
                Ok(record.filter(|r| r.is_eligible(scope_id, self.record_kind)))
            }
        }
    }

    /// Number of records in scope that `stem` could match, always queried fresh.
    pub async fn count_candidates(
        &self,
        stem: &str,
        scope_id: i64,
        method: MatchMethod,
    ) -> Result<usize> {
        let found = match method {
            MatchMethod::Title => {
                self.store
                    .find_by_title(scope_id, self.record_kind, stem)
                    .await?
            }
            MatchMethod::Slug => {
                let slug = slugify(stem);
                if slug.is_empty() {
                    return Ok(0);
                }
                self.store
                    .find_by_slug(scope_id, self.record_kind, &slug)
                    .await?
            }
        };
        Ok(found
            .iter()
            .filter(|r| r.is_eligible(scope_id, self.record_kind))
            .count())
    }
}

/// Drop the cached lookup for `(scope_id, method)`.
pub async fn invalidate_cache(
    sessions: &dyn SessionStore,
    scope_id: i64,
    method: MatchMethod,
) -> Result<()> {
    sessions.delete(&cache_key(scope_id, method)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewRecord;
    use crate::session::memory::InMemorySessionStore;
    use crate::store::memory::InMemoryContentStore;

    const TTL: Duration = Duration::from_secs(300);

    async fn add(
        store: &InMemoryContentStore,
        kind: &str,
        title: &str,
        scope: Option<i64>,
    ) -> i64 {
        store
            .insert_record(&NewRecord {
                kind: kind.to_string(),
                title: title.to_string(),
                slug: slugify(title),
                container_id: scope,
                body: String::new(),
            })
            .await
            .unwrap()
    }

    #[test]
    fn stem_strips_directories_and_extension() {
        assert_eq!(filename_stem("book/Chapter 1.txt"), "Chapter 1");
        assert_eq!(filename_stem("a.b.md"), "a.b");
        assert_eq!(filename_stem("win\\dir\\x.html"), "x");
        assert_eq!(filename_stem(".hidden"), ".hidden");
        assert_eq!(filename_stem("noext"), "noext");
    }

    #[tokio::test]
    async fn title_match_uses_cache_within_scope() {
        let store = InMemoryContentStore::new();
        let story = add(&store, "story", "Saga", None).await;
        let other = add(&store, "story", "Other", None).await;
        let ch = add(&store, "chapter", "Chapter 1", Some(story)).await;
        add(&store, "chapter", "Chapter 1", Some(other)).await;
        add(&store, "page", "Chapter 2", Some(story)).await;

        let m = Matcher::new(&store, "chapter");
        let cache = m.build_cache(story, MatchMethod::Title, TTL).await.unwrap();
        assert_eq!(cache.len(), 1);

        let hit = m
            .resolve("Chapter 1", story, MatchMethod::Title, &cache)
            .await
            .unwrap();
        assert_eq!(hit.map(|r| r.id), Some(ch));

        let wrong_kind = m
            .resolve("Chapter 2", story, MatchMethod::Title, &cache)
            .await
            .unwrap();
        assert!(wrong_kind.is_none());
    }

    #[tokio::test]
    async fn slug_match_normalizes_stem() {
        let store = InMemoryContentStore::new();
        let story = add(&store, "story", "Saga", None).await;
        let ch = add(&store, "chapter", "The Crème Chapter!", Some(story)).await;

        let m = Matcher::new(&store, "chapter");
        let cache = m.build_cache(story, MatchMethod::Slug, TTL).await.unwrap();
        let hit = m
            .resolve("the_creme chapter", story, MatchMethod::Slug, &cache)
            .await
            .unwrap();
        assert_eq!(hit.map(|r| r.id), Some(ch));
    }

    #[tokio::test]
    async fn duplicates_are_counted_and_first_wins() {
        let store = InMemoryContentStore::new();
        let story = add(&store, "story", "Saga", None).await;
        let first = add(&store, "chapter", "Twin", Some(story)).await;
        add(&store, "chapter", "Twin", Some(story)).await;

        let m = Matcher::new(&store, "chapter");
        assert_eq!(
            m.count_candidates("Twin", story, MatchMethod::Title)
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            m.count_candidates("twin", story, MatchMethod::Slug)
                .await
                .unwrap(),
            2
        );
        let cache = m.build_cache(story, MatchMethod::Title, TTL).await.unwrap();
        let hit = m
            .resolve("Twin", story, MatchMethod::Title, &cache)
            .await
            .unwrap();
        assert_eq!(hit.map(|r| r.id), Some(first));
    }

    #[tokio::test]
    async fn cache_is_persisted_and_invalidated() {
        let store = InMemoryContentStore::new();
        let sessions = InMemorySessionStore::new();
        let story = add(&store, "story", "Saga", None).await;
        add(&store, "chapter", "One", Some(story)).await;

        let m = Matcher::new(&store, "chapter");
        let c1 = m
            .load_cache(&sessions, story, MatchMethod::Title, TTL)
            .await
            .unwrap();
        add(&store, "chapter", "Two", Some(story)).await;

        // Stale until invalidated.
        let c2 = m
            .load_cache(&sessions, story, MatchMethod::Title, TTL)
            .await
            .unwrap();
        assert_eq!(c1, c2);
        assert!(c2.get("Two").is_none());

        invalidate_cache(&sessions, story, MatchMethod::Title)
            .await
            .unwrap();
        let c3 = m
            .load_cache(&sessions, story, MatchMethod::Title, TTL)
            .await
            .unwrap();
        assert!(c3.get("Two").is_some());
    }

    #[test]
    fn zero_ttl_cache_is_never_valid() {
        let cache = LookupCache {
            scope_id: 1,
            method: MatchMethod::Title,
            entries: HashMap::new(),
            built_at: Utc::now(),
            ttl_secs: 0,
        };
        assert!(!cache.is_valid());
    }
}
