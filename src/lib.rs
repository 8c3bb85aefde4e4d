//! # ZIP Content Replacer
//!
//! Batch-imports text files from a ZIP archive into existing content
//! records, matching each file to a record by title or slug.
//!
//! Runs are resumable: each call processes one bounded batch of archive
//! entries and persists the next offset in a session store. Dry runs report
//! what would change without writing; real runs can snapshot each record's
//! previous body so it can be restored later.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────────────────────┐   ┌──────────┐
//! │ ZIP file │──▶│ Engine: decode ▶ match ▶ transform ▶ │──▶│  SQLite  │
//! └──────────┘   │         backup ▶ update              │   │ records  │
//!                └──────────────────┬───────────────────┘   │ sessions │
//!                                   │                       └──────────┘
//!                      ┌────────────┴──────┐
//!                      ▼                   ▼
//!                 ┌──────────┐       ┌──────────┐
//!                 │   CLI    │       │   HTTP   │
//!                 │  (zcr)   │       │  (axum)  │
//!                 └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! zcr init
//! zcr record add --kind story --title "My Story"
//! zcr record add --kind chapter --title "Chapter 1" --container 1
//! zcr import chapters.zip --scope 1 --dry-run --preview
//! zcr import chapters.zip --scope 1
//! zcr backup list
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`archive`] | Random-access ZIP reader |
//! | [`engine`] | Start / continue / resume / abandon |
//! | [`rate_limit`] | Per-caller request limiting |
//! | [`server`] | HTTP server |
//! | [`progress`] | CLI progress reporting |
//! | [`report`] | Processing report export |
//! | [`sqlite_store`] | SQLite content store |
//! | [`sqlite_session`] | SQLite session store |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//!
//! Matching, transformation, encoding detection and backups live in the
//! `zip-content-replacer-core` crate.

pub mod archive;
pub mod backup_cmd;
pub mod config;
pub mod db;
pub mod engine;
pub mod import_cmd;
pub mod migrate;
pub mod progress;
pub mod rate_limit;
pub mod record_cmd;
pub mod report;
pub mod server;
pub mod sqlite_session;
pub mod sqlite_store;
