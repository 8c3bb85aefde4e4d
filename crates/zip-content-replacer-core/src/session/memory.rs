//! In-memory [`SessionStore`] for tests and single-process use.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::SessionStore;

struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Session store backed by a `HashMap`. Expired entries are dropped lazily.
#[derive(Default)]
pub struct InMemorySessionStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.entries
            .lock()
            .map(|m| m.values().filter(|e| e.expires_at > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn expiry(ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::days(3650));
    Utc::now() + ttl
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("session store lock poisoned"))?;
        let now = Utc::now();
        match entries.get(key) {
            Some(e) if e.expires_at > now => Ok(Some(e.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("session store lock poisoned"))?;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: expiry(ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("session store lock poisoned"))?
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{load_json, save_json};

    #[tokio::test]
    async fn put_get_delete() {
        let store = InMemorySessionStore::new();
        store.put("a", "1", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
        store.delete("a").await.unwrap();
        store.delete("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn zero_ttl_expires_immediately() {
        let store = InMemorySessionStore::new();
        store.put("a", "1", Duration::ZERO).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn json_helpers_round_trip() {
        let store = InMemorySessionStore::new();
        save_json(&store, "v", &vec![1u32, 2, 3], Duration::from_secs(5))
            .await
            .unwrap();
        let v: Option<Vec<u32>> = load_json(&store, "v").await.unwrap();
        assert_eq!(v, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn corrupt_json_is_an_error() {
        let store = InMemorySessionStore::new();
        store.put("v", "{not json", Duration::from_secs(5)).await.unwrap();
        let v: Result<Option<Vec<u32>>> = load_json(&store, "v").await;
        assert!(v.is_err());
    }
}
