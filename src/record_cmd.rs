//! `zcr record` subcommands for seeding and inspecting the content store.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use zip_content_replacer_core::models::NewRecord;
use zip_content_replacer_core::slug::slugify;

use crate::config::Config;
use crate::db;

pub async fn add(
    config: &Config,
    kind: &str,
    title: &str,
    slug: Option<String>,
    container: Option<i64>,
    body_file: Option<PathBuf>,
) -> Result<()> {
    if title.trim().is_empty() {
        bail!("title must not be empty");
    }
    let body = match body_file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read body file: {}", path.display()))?,
        None => String::new(),
    };
    let slug = slug.unwrap_or_else(|| slugify(title));

    let engine = db::open_engine(config).await?;
    if let Some(container_id) = container {
        match engine.store().get_record(container_id).await? {
            Some(c) if c.kind == config.content.container_kind => {}
            _ => bail!(
                "container {} is not a '{}'",
                container_id,
                config.content.container_kind
            ),
        }
    }
    let id = engine
        .store()
        .insert_record(&NewRecord {
            kind: kind.to_string(),
            title: title.to_string(),
            slug: slug.clone(),
            container_id: container,
            body,
        })
        .await?;
    println!("{}", id);
    tracing::info!(id, kind, slug = %slug, "record added");
    Ok(())
}

pub async fn get(config: &Config, id: i64) -> Result<()> {
    let engine = db::open_engine(config).await?;
    let Some(record) = engine.store().get_record(id).await? else {
        bail!("record {} not found", id);
    };
    println!("--- Record ---");
    println!("id:        {}", record.id);
    println!("kind:      {}", record.kind);
    println!("title:     {}", record.title);
    println!("slug:      {}", record.slug);
    match record.container_id {
        Some(c) => println!("container: {}", c),
        None => println!("container: -"),
    }
    println!();
    println!("{}", record.body);
    Ok(())
}

pub async fn list(config: &Config, kind: Option<&str>, container: Option<i64>) -> Result<()> {
    let engine = db::open_engine(config).await?;
    let records = engine.store().list_records(kind, container).await?;
    if records.is_empty() {
        println!("No records.");
        return Ok(());
    }
    println!("{:<6} {:<10} {:<10} {:<30} SLUG", "ID", "KIND", "CONTAINER", "TITLE");
    for r in records {
        println!(
            "{:<6} {:<10} {:<10} {:<30} {}",
            r.id,
            r.kind,
            r.container_id.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
            r.title,
            r.slug
        );
    }
    Ok(())
}
