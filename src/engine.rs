//! Batch import engine.
//!
//! A run goes through four states:
//!
//! ```text
//! Created ──▶ Running ──▶ Completed
//!                │  ▲
//!                ▼  │
//!          AwaitingResume
//! ```
//!
//! [`ImportEngine::start`] accepts an upload and persists a
//! [`RunDescriptor`]; each [`ImportEngine::continue_batch`] call processes
//! one bounded slice of archive entries and persists the new offset. The
//! engine holds no state between calls: everything lives in the
//! [`SessionStore`] under keys derived from the caller identity.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use zip_content_replacer_core::backup::BackupManager;
use zip_content_replacer_core::encoding::normalize;
use zip_content_replacer_core::error::{ImportError, ImportResult};
use zip_content_replacer_core::matcher::{filename_stem, invalidate_cache, LookupCache, Matcher};
use zip_content_replacer_core::models::{
    LogLine, MatchMethod, Record, ResumeRecord, RunDescriptor, UpdateOutcome,
};
use zip_content_replacer_core::session::{
    load_json, resume_key, run_key, save_json, SessionStore,
};
use zip_content_replacer_core::store::ContentStore;
use zip_content_replacer_core::transform::{preview, transform, ContentKind};

use crate::archive::{is_directory, sniff_zip, ArchiveReader};
use crate::config::Config;

/// Engine limits and lifetimes, taken from [`Config`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub container_kind: String,
    pub record_kind: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub max_batch_size: usize,
    pub max_entry_bytes: u64,
    pub preview_chars: usize,
    pub session_ttl: Duration,
    pub resume_ttl: Duration,
    pub cache_ttl: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            container_kind: config.content.container_kind.clone(),
            record_kind: config.content.record_kind.clone(),
            upload_dir: config.import.upload_dir.clone(),
            max_upload_bytes: config.import.max_upload_bytes,
            max_batch_size: config.import.max_batch_size,
            max_entry_bytes: config.import.max_entry_bytes,
            preview_chars: config.import.preview_chars,
            session_ttl: config.session_ttl(),
            resume_ttl: config.resume_ttl(),
            cache_ttl: config.cache_ttl(),
        }
    }
}

/// Parameters of a new run.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub archive: Vec<u8>,
    pub scope_id: i64,
    pub batch_size: usize,
    pub dry_run: bool,
    pub match_method: MatchMethod,
    pub backup: bool,
    pub preview: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartResponse {
    pub total: usize,
    pub batch_size: usize,
    pub is_dry_run: bool,
    pub scope_id: i64,
    pub match_method: MatchMethod,
}

/// Per-batch outcome counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub examined: usize,
    pub skipped: usize,
    pub unmatched: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub would_update: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResponse {
    /// Cumulative: equal to `next_offset`.
    pub processed: usize,
    pub remaining: usize,
    pub total: usize,
    pub next_offset: usize,
    pub logs: Vec<LogLine>,
    pub is_dry_run: bool,
    pub stats: BatchStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResumeStatus {
    pub resumable: bool,
    pub offset: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResumedRun {
    pub offset: usize,
    pub total: usize,
    pub is_dry_run: bool,
}

/// Hooks around each body update.
pub trait UpdateObserver: Send + Sync {
    fn before_update(&self, _record: &Record, _new_body: &str) {}
    fn after_update(&self, _record: &Record, _new_body: &str) {}
}

pub struct NoopObserver;

impl UpdateObserver for NoopObserver {}

#[derive(Clone)]
pub struct ImportEngine {
    store: Arc<dyn ContentStore>,
    sessions: Arc<dyn SessionStore>,
    settings: EngineSettings,
}

impl ImportEngine {
    pub fn new(
        store: Arc<dyn ContentStore>,
        sessions: Arc<dyn SessionStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            sessions,
            settings,
        }
    }

    pub fn store(&self) -> &dyn ContentStore {
        self.store.as_ref()
    }

    pub fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn backups(&self) -> BackupManager<'_> {
        BackupManager::new(self.store.as_ref())
    }

    /// Validate an upload, store it, and create the run descriptor.
    ///
    /// Any previous run of `caller` is replaced and its archive deleted.
    pub async fn start(&self, caller: &str, req: StartRequest) -> ImportResult<StartResponse> {
        let settings = &self.settings;
        if req.archive.is_empty() {
            return Err(ImportError::UploadRejected("no file uploaded".to_string()));
        }
        if req.archive.len() as u64 > settings.max_upload_bytes {
            return Err(ImportError::UploadRejected(format!(
                "file exceeds the {} byte limit",
                settings.max_upload_bytes
            )));
        }
        if !sniff_zip(&req.archive) {
            return Err(ImportError::UploadRejected(
                "only ZIP archives are accepted".to_string(),
            ));
        }
        if req.batch_size == 0 || req.batch_size > settings.max_batch_size {
            return Err(ImportError::InvalidRequest(format!(
                "batch size must be between 1 and {}",
                settings.max_batch_size
            )));
        }
        self.check_scope(req.scope_id).await?;

        std::fs::create_dir_all(&settings.upload_dir).map_err(anyhow::Error::from)?;
        let location = settings
            .upload_dir
            .join(format!("{}.zip", uuid::Uuid::new_v4()));
        std::fs::write(&location, &req.archive).map_err(anyhow::Error::from)?;

        let total = match ArchiveReader::open(&location, settings.max_entry_bytes) {
            Ok(reader) => {
                let n = reader.len();
                reader.close();
                n
            }
            Err(e) => {
                remove_archive(&location);
                return Err(e);
            }
        };

        if let Err(e) = self.discard_previous(caller, &location).await {
            remove_archive(&location);
            return Err(e);
        }

        let descriptor = RunDescriptor {
            archive_location: location,
            container_scope_id: req.scope_id,
            batch_size: req.batch_size,
            dry_run: req.dry_run,
            match_method: req.match_method,
            backup_enabled: req.backup,
            show_preview: req.preview,
            offset: 0,
            total,
            created_at: Utc::now(),
        };
        self.persist(caller, &descriptor).await?;

        tracing::info!(
            caller,
            scope_id = req.scope_id,
            total,
            batch_size = req.batch_size,
            dry_run = req.dry_run,
            "import run created"
        );

        Ok(StartResponse {
            total,
            batch_size: req.batch_size,
            is_dry_run: req.dry_run,
            scope_id: req.scope_id,
            match_method: req.match_method,
        })
    }

    /// Process `[offset, min(offset + batch_size, total))`.
    ///
    /// A missing `offset` means 0; callers continuing an interrupted run
    /// take the offset from [`ImportEngine::resume`]. Offsets beyond the
    /// archive are clamped to its end.
    pub async fn continue_batch(
        &self,
        caller: &str,
        offset: Option<usize>,
        observer: &dyn UpdateObserver,
    ) -> ImportResult<BatchResponse> {
        let mut descriptor: RunDescriptor = load_json(self.sessions(), &run_key(caller))
            .await?
            .ok_or(ImportError::NoSession)?;
        if !descriptor.archive_location.exists() {
            return Err(ImportError::NoSession);
        }

        let mut reader =
            ArchiveReader::open(&descriptor.archive_location, self.settings.max_entry_bytes)?;
        let total = reader.len();
        let start = offset.unwrap_or(0).min(total);
        let end = (start + descriptor.batch_size).min(total);

        let matcher = Matcher::new(self.store(), &self.settings.record_kind);
        let cache = matcher
            .load_cache(
                self.sessions(),
                descriptor.container_scope_id,
                descriptor.match_method,
                self.settings.cache_ttl,
            )
            .await?;

        let mut logs = Vec::new();
        let mut stats = BatchStats::default();
        for index in start..end {
            self.process_entry(
                &mut reader,
                index,
                &descriptor,
                &matcher,
                &cache,
                observer,
                &mut logs,
                &mut stats,
            )
            .await;
        }
        reader.close();

        let remaining = total - end;
        if remaining == 0 {
            self.complete(caller, &descriptor).await?;
            logs.push(LogLine::info("All files processed. Cleanup complete."));
        } else {
            descriptor.offset = end;
            descriptor.total = total;
            self.persist(caller, &descriptor).await?;
        }

        tracing::debug!(caller, start, end, total, ?stats, "batch processed");

        Ok(BatchResponse {
            processed: end,
            remaining,
            total,
            next_offset: end,
            logs,
            is_dry_run: descriptor.dry_run,
            stats,
        })
    }

    /// Whether `caller` has an incomplete run to pick up.
    pub async fn resume_status(&self, caller: &str) -> ImportResult<ResumeStatus> {
        let record: Option<ResumeRecord> = load_json(self.sessions(), &resume_key(caller)).await?;
        Ok(match record {
            Some(r) if r.offset < r.total && r.settings.archive_location.exists() => {
                ResumeStatus {
                    resumable: true,
                    offset: r.offset,
                    total: r.total,
                }
            }
            _ => ResumeStatus {
                resumable: false,
                offset: 0,
                total: 0,
            },
        })
    }

    /// Rebuild the run descriptor from the resume record.
    pub async fn resume(&self, caller: &str) -> ImportResult<ResumedRun> {
        let record: ResumeRecord = load_json(self.sessions(), &resume_key(caller))
            .await?
            .ok_or(ImportError::NoSession)?;
        if !record.settings.archive_location.exists() {
            self.sessions.delete(&resume_key(caller)).await?;
            return Err(ImportError::NoSession);
        }
        let mut descriptor = record.settings;
        descriptor.offset = record.offset;
        descriptor.total = record.total;
        save_json(
            self.sessions(),
            &run_key(caller),
            &descriptor,
            self.settings.session_ttl,
        )
        .await?;
        tracing::info!(caller, offset = record.offset, total = record.total, "run resumed");
        Ok(ResumedRun {
            offset: record.offset,
            total: record.total,
            is_dry_run: descriptor.dry_run,
        })
    }

    /// Drop the run of `caller`. Returns false when there was nothing to drop.
    pub async fn abandon(&self, caller: &str) -> ImportResult<bool> {
        let descriptor: Option<RunDescriptor> =
            load_json(self.sessions(), &run_key(caller)).await?;
        let record: Option<ResumeRecord> = load_json(self.sessions(), &resume_key(caller)).await?;
        let found = descriptor.is_some() || record.is_some();

        if let Some(d) = &descriptor {
            remove_archive(&d.archive_location);
            invalidate_cache(self.sessions(), d.container_scope_id, d.match_method).await?;
        }
        if let Some(r) = &record {
            remove_archive(&r.settings.archive_location);
            invalidate_cache(
                self.sessions(),
                r.settings.container_scope_id,
                r.settings.match_method,
            )
            .await?;
        }
        self.sessions.delete(&run_key(caller)).await?;
        self.sessions.delete(&resume_key(caller)).await?;
        if found {
            tracing::info!(caller, "run abandoned");
        }
        Ok(found)
    }

    /// The scope must name a record of the container kind.
    async fn check_scope(&self, scope_id: i64) -> ImportResult<Record> {
        if scope_id <= 0 {
            return Err(ImportError::InvalidScope(format!(
                "'{}' is not a valid id",
                scope_id
            )));
        }
        match self.store.get_record(scope_id).await? {
            Some(r) if r.kind == self.settings.container_kind => Ok(r),
            Some(r) => Err(ImportError::InvalidScope(format!(
                "record {} is a '{}', not a '{}'",
                scope_id, r.kind, self.settings.container_kind
            ))),
            None => Err(ImportError::InvalidScope(format!(
                "no {} with id {}",
                self.settings.container_kind, scope_id
            ))),
        }
    }

    async fn discard_previous(&self, caller: &str, keep: &Path) -> ImportResult<()> {
        let previous: Option<RunDescriptor> =
            load_json(self.sessions(), &run_key(caller)).await?;
        let record: Option<ResumeRecord> =
            load_json(self.sessions(), &resume_key(caller)).await?;
        let stale = previous
            .map(|d| d.archive_location)
            .into_iter()
            .chain(record.map(|r| r.settings.archive_location));
        for path in stale {
            if path != keep {
                remove_archive(&path);
            }
        }
        self.sessions.delete(&resume_key(caller)).await?;
        Ok(())
    }

    /// Save the descriptor and a matching resume record.
    async fn persist(&self, caller: &str, descriptor: &RunDescriptor) -> ImportResult<()> {
        save_json(
            self.sessions(),
            &run_key(caller),
            descriptor,
            self.settings.session_ttl,
        )
        .await?;
        let record = ResumeRecord {
            offset: descriptor.offset,
            total: descriptor.total,
            settings: descriptor.clone(),
            saved_at: Utc::now(),
        };
        save_json(
            self.sessions(),
            &resume_key(caller),
            &record,
            self.settings.resume_ttl,
        )
        .await?;
        Ok(())
    }

    async fn complete(&self, caller: &str, descriptor: &RunDescriptor) -> ImportResult<()> {
        remove_archive(&descriptor.archive_location);
        self.sessions.delete(&run_key(caller)).await?;
        self.sessions.delete(&resume_key(caller)).await?;
        invalidate_cache(
            self.sessions(),
            descriptor.container_scope_id,
            descriptor.match_method,
        )
        .await?;
        tracing::info!(caller, total = descriptor.total, "import run completed");
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_entry(
        &self,
        reader: &mut ArchiveReader,
        index: usize,
        run: &RunDescriptor,
        matcher: &Matcher<'_>,
        cache: &LookupCache,
        observer: &dyn UpdateObserver,
        logs: &mut Vec<LogLine>,
        stats: &mut BatchStats,
    ) {
        stats.examined += 1;

        let name = match reader.entry_name(index) {
            Ok(name) => name,
            Err(e) => {
                stats.failed += 1;
                logs.push(LogLine::error(format!("Entry #{}: {}", index, e)));
                return;
            }
        };
        let kind = match ContentKind::from_filename(&name) {
            Some(kind) if !is_directory(&name) => kind,
            _ => {
                stats.skipped += 1;
                logs.push(LogLine::skip(format!(
                    "Skipping directory or unsupported file: {}",
                    name
                )));
                return;
            }
        };

        let entry = match reader.entry_at(index) {
            Ok(entry) => entry,
            Err(e) => {
                stats.failed += 1;
                logs.push(LogLine::warning(format!("Could not read {}: {}", name, e)));
                return;
            }
        };

        let normalized = normalize(&entry.raw_bytes);
        if let Some(note) = &normalized.note {
            logs.push(LogLine::info(format!("{}: {}", name, note)));
        }

        let stem = filename_stem(&name);
        let record_kind = &self.settings.record_kind;
        let scope = run.container_scope_id;

        let candidates = match matcher.count_candidates(stem, scope, run.match_method).await {
            Ok(n) => n,
            Err(e) => {
                stats.failed += 1;
                logs.push(LogLine::error(format!("{}: lookup failed: {}", name, e)));
                return;
            }
        };
        let record = match matcher.resolve(stem, scope, run.match_method, cache).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                stats.unmatched += 1;
                logs.push(LogLine::info(format!(
                    "No matching {} found for '{}' (by {}); skipping {}",
                    record_kind, stem, run.match_method, name
                )));
                return;
            }
            Err(e) => {
                stats.failed += 1;
                logs.push(LogLine::error(format!("{}: lookup failed: {}", name, e)));
                return;
            }
        };
        if candidates > 1 {
            logs.push(LogLine::warning(format!(
                "Found {} {}s matching '{}'; using the first (ID {})",
                candidates, record_kind, stem, record.id
            )));
        }

        let new_body = transform(&normalized.text, kind);

        if run.dry_run {
            stats.would_update += 1;
            logs.push(LogLine::info(format!(
                "[DRY RUN] Would update {} '{}' (ID {}) from {} ({})",
                record_kind,
                record.title,
                record.id,
                name,
                kind.label()
            )));
            if run.show_preview {
                logs.push(LogLine::info(format!(
                    "Preview: {}",
                    preview(&normalized.text, self.settings.preview_chars)
                )));
            }
            return;
        }

        if new_body == record.body {
            stats.unchanged += 1;
            logs.push(LogLine::info(format!(
                "{}: no content changes were detected for '{}' (ID {})",
                name, record.title, record.id
            )));
            return;
        }

        if run.backup_enabled {
            if let Err(e) = self.backups().backup(&record, &name).await {
                stats.failed += 1;
                logs.push(LogLine::error(format!(
                    "{}: backup of '{}' (ID {}) failed, not updated: {}",
                    name, record.title, record.id, e
                )));
                return;
            }
        }

        observer.before_update(&record, &new_body);
        match self.store.update_body(record.id, &new_body).await {
            Ok(UpdateOutcome::Updated) => {
                observer.after_update(&record, &new_body);
                stats.updated += 1;
                logs.push(LogLine::success(format!(
                    "Updated {} '{}' (ID {}) from {}",
                    record_kind, record.title, record.id, name
                )));
            }
            Ok(UpdateOutcome::Unchanged) => {
                stats.unchanged += 1;
                logs.push(LogLine::info(format!(
                    "{}: no content changes were detected for '{}' (ID {})",
                    name, record.title, record.id
                )));
            }
            Err(e) => {
                stats.failed += 1;
                tracing::warn!(record_id = record.id, error = %e, "update failed");
                logs.push(LogLine::error(format!(
                    "Failed to update '{}' (ID {}) from {}: {}",
                    record.title, record.id, name, e
                )));
            }
        }
    }
}

fn remove_archive(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not delete archive"),
    }
}
