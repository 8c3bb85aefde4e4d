//! # ZIP Content Replacer Core
//!
//! Shared logic for ZIP Content Replacer: data models, the content and
//! session store abstractions, encoding normalization, content
//! transformation, record matching, and backup snapshots.
//!
//! This crate contains no tokio, sqlx, archive, or filesystem I/O. The
//! batch engine, the SQLite backends, and the transports live in the
//! `zip-content-replacer` crate.

pub mod backup;
pub mod encoding;
pub mod error;
pub mod matcher;
pub mod models;
pub mod session;
pub mod slug;
pub mod store;
pub mod transform;
