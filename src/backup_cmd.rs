//! `zcr backup` subcommands.

use anyhow::Result;
use zip_content_replacer_core::backup::{parse_record_id, BulkReport};

use crate::config::Config;
use crate::db;

pub async fn list(config: &Config) -> Result<()> {
    let engine = db::open_engine(config).await?;
    let backups = engine.backups().list_backups().await?;
    if backups.is_empty() {
        println!("No backups.");
        return Ok(());
    }
    println!("{:<8} {:<25} {:<30} TITLE", "ID", "CAPTURED", "SOURCE");
    for (id, snapshot) in backups {
        let title = engine
            .store()
            .get_record(id)
            .await?
            .map(|r| r.title)
            .unwrap_or_else(|| "(missing)".to_string());
        println!(
            "{:<8} {:<25} {:<30} {}",
            id,
            snapshot.captured_at.format("%Y-%m-%d %H:%M:%S"),
            snapshot.source_filename,
            title
        );
    }
    Ok(())
}

pub async fn restore(config: &Config, id: &str) -> Result<()> {
    let record_id = parse_record_id(id)?;
    let engine = db::open_engine(config).await?;
    let snapshot = engine.backups().restore(record_id).await?;
    println!(
        "Restored record {} from backup of '{}' ({})",
        record_id,
        snapshot.source_filename,
        snapshot.captured_at.format("%Y-%m-%d %H:%M:%S")
    );
    Ok(())
}

pub async fn delete(config: &Config, id: &str) -> Result<()> {
    let record_id = parse_record_id(id)?;
    let engine = db::open_engine(config).await?;
    engine.backups().delete_backup(record_id).await?;
    println!("Deleted backup of record {}", record_id);
    Ok(())
}

pub async fn restore_all(config: &Config) -> Result<()> {
    let engine = db::open_engine(config).await?;
    let report = engine.backups().restore_all().await?;
    print_bulk("Restored", &report);
    Ok(())
}

pub async fn delete_all(config: &Config) -> Result<()> {
    let engine = db::open_engine(config).await?;
    let report = engine.backups().delete_all().await?;
    print_bulk("Deleted", &report);
    Ok(())
}

fn print_bulk(verb: &str, report: &BulkReport) {
    for item in &report.items {
        let mark = if item.ok { "ok" } else { "FAILED" };
        println!("  {:<6} record {}: {}", mark, item.record_id, item.message);
    }
    println!(
        "{} {} backup(s), {} failed.",
        verb, report.succeeded, report.failed
    );
}
