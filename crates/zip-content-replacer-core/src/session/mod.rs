//! Session store abstraction.
//!
//! A [`SessionStore`] holds opaque string values between requests, keyed by
//! string, each with its own expiry. Run descriptors, resume records, lookup
//! caches, and rate-limit windows all live here; nothing survives between
//! continuation calls in process memory.
//!
//! The typed helpers [`load_json`] and [`save_json`] serialize values with
//! `serde_json`.

pub mod memory;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Key-value store with per-entry expiry.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read a value. Expired entries read as `None`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a value that expires after `ttl`.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Remove a value. Absent keys are not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Key of the live run descriptor for `caller`.
pub fn run_key(caller: &str) -> String {
    format!("run:{}", caller)
}

/// Key of the resume record for `caller`.
pub fn resume_key(caller: &str) -> String {
    format!("resume:{}", caller)
}

/// Key of the rate-limit window for `caller`.
pub fn rate_key(caller: &str) -> String {
    format!("rate:{}", caller)
}

/// Read and deserialize a JSON value.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn SessionStore,
    key: &str,
) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(raw) => {
            let value = serde_json::from_str(&raw)
                .with_context(|| format!("corrupt session value under '{}'", key))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Serialize and store a JSON value.
pub async fn save_json<T: Serialize + Sync>(
    store: &dyn SessionStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.put(key, &raw, ttl).await
}
