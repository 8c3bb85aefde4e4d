//! `zcr import`, `zcr resume`, `zcr status` and `zcr abandon`.
//!
//! The CLI drives the same continuation protocol as an HTTP client: one
//! `continue_batch` call per batch, feeding back `next_offset`, until
//! nothing remains. If a batch fails the run stays persisted and
//! `zcr resume` picks it up.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use zip_content_replacer_core::models::{LogLevel, LogLine, MatchMethod, Record};

use crate::config::Config;
use crate::db;
use crate::engine::{BatchStats, ImportEngine, StartRequest, UpdateObserver};
use crate::progress::{ImportProgressEvent, ProgressMode};
use crate::report::{filter_lines, render_report, summarize};

/// Flags of `zcr import`.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub archive: PathBuf,
    pub scope_id: i64,
    pub batch_size: Option<usize>,
    pub dry_run: bool,
    pub match_method: MatchMethod,
    pub backup: bool,
    pub preview: bool,
}

/// How batch output is presented.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub progress: ProgressMode,
    pub only: Option<LogLevel>,
    pub report: Option<PathBuf>,
}

/// Traces each write so `--verbose` shows them as they happen.
struct TracingObserver;

impl UpdateObserver for TracingObserver {
    fn before_update(&self, record: &Record, new_body: &str) {
        tracing::debug!(
            record_id = record.id,
            old_len = record.body.len(),
            new_len = new_body.len(),
            "updating record body"
        );
    }

    fn after_update(&self, record: &Record, _new_body: &str) {
        tracing::debug!(record_id = record.id, "record body updated");
    }
}

pub async fn run_import(
    config: &Config,
    caller: &str,
    opts: ImportOptions,
    output: &OutputOptions,
) -> Result<()> {
    let archive = std::fs::read(&opts.archive)
        .with_context(|| format!("Failed to read archive: {}", opts.archive.display()))?;
    let engine = db::open_engine(config).await?;

    let started = engine
        .start(
            caller,
            StartRequest {
                archive,
                scope_id: opts.scope_id,
                batch_size: opts.batch_size.unwrap_or(config.import.default_batch_size),
                dry_run: opts.dry_run,
                match_method: opts.match_method,
                backup: opts.backup,
                preview: opts.preview,
            },
        )
        .await?;

    println!(
        "Accepted {}: {} entries, batch size {}, matching by {}{}",
        opts.archive.display(),
        started.total,
        started.batch_size,
        started.match_method,
        if started.is_dry_run { " (dry run)" } else { "" }
    );

    drive(&engine, caller, 0, started.total, output).await
}

pub async fn run_resume(config: &Config, caller: &str, output: &OutputOptions) -> Result<()> {
    let engine = db::open_engine(config).await?;
    let resumed = engine.resume(caller).await?;
    println!(
        "Resuming at entry {} of {}{}",
        resumed.offset,
        resumed.total,
        if resumed.is_dry_run { " (dry run)" } else { "" }
    );
    drive(&engine, caller, resumed.offset, resumed.total, output).await
}

pub async fn run_status(config: &Config, caller: &str) -> Result<()> {
    let engine = db::open_engine(config).await?;
    let status = engine.resume_status(caller).await?;
    if status.resumable {
        println!(
            "Incomplete run: {} of {} entries processed. Run `zcr resume` to continue.",
            status.offset, status.total
        );
    } else {
        println!("No incomplete run.");
    }
    Ok(())
}

pub async fn run_abandon(config: &Config, caller: &str) -> Result<()> {
    let engine = db::open_engine(config).await?;
    if engine.abandon(caller).await? {
        println!("Run abandoned.");
    } else {
        println!("No run to abandon.");
    }
    Ok(())
}

/// Call `continue_batch` until the run completes.
async fn drive(
    engine: &ImportEngine,
    caller: &str,
    mut offset: usize,
    total: usize,
    output: &OutputOptions,
) -> Result<()> {
    let reporter = output.progress.reporter(offset as u64);
    reporter.report(ImportProgressEvent::Started {
        total: total as u64,
    });

    let observer = TracingObserver;
    let mut all_logs: Vec<LogLine> = Vec::new();
    let mut totals = BatchStats::default();

    loop {
        let batch = match engine
            .continue_batch(caller, Some(offset), &observer)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                eprintln!(
                    "Stopped at entry {} of {}. Run `zcr resume` to continue.",
                    offset, total
                );
                write_report(output.report.as_deref(), &all_logs)?;
                return Err(e.into());
            }
        };

        for line in filter_lines(&batch.logs, output.only) {
            println!("{}", line);
        }
        add_stats(&mut totals, &batch.stats);
        all_logs.extend(batch.logs);

        reporter.report(ImportProgressEvent::Batch {
            processed: batch.processed as u64,
            total: batch.total as u64,
        });

        if batch.remaining == 0 {
            reporter.report(ImportProgressEvent::Finished {
                total: batch.total as u64,
            });
            break;
        }
        offset = batch.next_offset;
    }

    println!();
    println!(
        "Done: {} examined, {} skipped, {} unmatched, {} updated, {} unchanged, {} would update, {} failed",
        totals.examined,
        totals.skipped,
        totals.unmatched,
        totals.updated,
        totals.unchanged,
        totals.would_update,
        totals.failed
    );
    let by_level: Vec<String> = summarize(&all_logs)
        .into_iter()
        .filter(|(_, n)| *n > 0)
        .map(|(lvl, n)| format!("{} {}", n, lvl))
        .collect();
    if !by_level.is_empty() {
        println!("Log lines: {}", by_level.join(", "));
    }

    write_report(output.report.as_deref(), &all_logs)
}

fn add_stats(totals: &mut BatchStats, batch: &BatchStats) {
    totals.examined += batch.examined;
    totals.skipped += batch.skipped;
    totals.unmatched += batch.unmatched;
    totals.updated += batch.updated;
    totals.unchanged += batch.unchanged;
    totals.would_update += batch.would_update;
    totals.failed += batch.failed;
}

fn write_report(path: Option<&Path>, logs: &[LogLine]) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    std::fs::write(path, render_report(logs, Utc::now()))
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    println!("Report written to {}", path.display());
    Ok(())
}
