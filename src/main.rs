//! # ZIP Content Replacer CLI (`zcr`)
//!
//! ## Usage
//!
//! ```bash
//! zcr --config ./config/zcr.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `zcr init` | Create the SQLite database and schema |
//! | `zcr import <zip> --scope <id>` | Import an archive into a container's records |
//! | `zcr resume` | Continue an interrupted import |
//! | `zcr status` | Show whether an import can be resumed |
//! | `zcr abandon` | Discard the current import |
//! | `zcr backup list` | List backup snapshots |
//! | `zcr backup restore <id>` | Restore one record from its snapshot |
//! | `zcr record add` | Add a record to the content store |
//! | `zcr serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Preview what an archive would change
//! zcr import chapters.zip --scope 12 --dry-run --preview
//!
//! # Import by slug, 25 files per batch, keeping a report
//! zcr import chapters.zip --scope 12 --match slug --batch-size 25 --report report.txt
//!
//! # Show only the failures
//! zcr import chapters.zip --scope 12 --only error
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use zip_content_replacer::config;
use zip_content_replacer::import_cmd::{self, ImportOptions, OutputOptions};
use zip_content_replacer::progress::ProgressMode;
use zip_content_replacer::{backup_cmd, migrate, record_cmd, server};
use zip_content_replacer_core::models::{LogLevel, MatchMethod};

/// ZIP Content Replacer: batch-import text files from ZIP archives into
/// existing content records.
#[derive(Parser)]
#[command(
    name = "zcr",
    about = "Batch-import text files from ZIP archives into existing content records",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/zcr.toml")]
    config: PathBuf,

    /// Caller identity that owns the import run.
    #[arg(long, global = true, default_value = "cli")]
    caller: String,

    /// Enable debug diagnostics on stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and upload directory.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Import a ZIP archive into the records of one container.
    ///
    /// Each entry is matched to a record by its filename (without
    /// extension). `.txt`, `.md`/`.markdown` and `.html`/`.htm` files are
    /// converted to block content; other entries are skipped.
    Import {
        /// Path to the ZIP archive.
        archive: PathBuf,

        /// Id of the container whose records may be replaced.
        #[arg(long)]
        scope: i64,

        /// Entries per batch (defaults to `[import].default_batch_size`).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Report what would change without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Match filenames against record titles or slugs.
        #[arg(long = "match", default_value = "title")]
        match_method: MatchMethod,

        /// Do not snapshot record bodies before overwriting them.
        #[arg(long)]
        no_backup: bool,

        /// Include a content preview in dry-run output.
        #[arg(long)]
        preview: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Continue the interrupted import.
    Resume {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show whether an import can be resumed.
    Status,

    /// Discard the current import and its uploaded archive.
    Abandon,

    /// Manage backup snapshots.
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Add and inspect content records.
    Record {
        #[command(subcommand)]
        action: RecordAction,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(clap::Args)]
struct OutputArgs {
    /// Only print log lines of this level.
    #[arg(long)]
    only: Option<LogLevel>,

    /// Write a plain-text processing report to this file.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Progress on stderr: human (default when a TTY), json, or off.
    #[arg(long, value_enum)]
    progress: Option<ProgressArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl OutputArgs {
    fn into_options(self) -> OutputOptions {
        let progress = match self.progress {
            Some(ProgressArg::Off) => ProgressMode::Off,
            Some(ProgressArg::Human) => ProgressMode::Human,
            Some(ProgressArg::Json) => ProgressMode::Json,
            None => ProgressMode::default_for_tty(),
        };
        OutputOptions {
            progress,
            only: self.only,
            report: self.report,
        }
    }
}

#[derive(Subcommand)]
enum BackupAction {
    /// List every record that has a snapshot.
    List,
    /// Restore one record's body from its snapshot.
    Restore { id: String },
    /// Restore every snapshot.
    RestoreAll,
    /// Delete one record's snapshot.
    Delete { id: String },
    /// Delete every snapshot.
    DeleteAll,
}

#[derive(Subcommand)]
enum RecordAction {
    /// Add a record; prints its id.
    Add {
        #[arg(long)]
        kind: String,
        #[arg(long)]
        title: String,
        /// Defaults to the slugified title.
        #[arg(long)]
        slug: Option<String>,
        #[arg(long)]
        container: Option<i64>,
        /// File whose contents become the record body.
        #[arg(long)]
        body_file: Option<PathBuf>,
    },
    /// Print one record with its body.
    Get { id: i64 },
    /// List records.
    List {
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        container: Option<i64>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;
    let caller = cli.caller;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            std::fs::create_dir_all(&cfg.import.upload_dir)?;
            println!("Database initialized successfully.");
        }
        Commands::Import {
            archive,
            scope,
            batch_size,
            dry_run,
            match_method,
            no_backup,
            preview,
            output,
        } => {
            let opts = ImportOptions {
                archive,
                scope_id: scope,
                batch_size,
                dry_run,
                match_method,
                backup: !no_backup,
                preview,
            };
            import_cmd::run_import(&cfg, &caller, opts, &output.into_options()).await?;
        }
        Commands::Resume { output } => {
            import_cmd::run_resume(&cfg, &caller, &output.into_options()).await?;
        }
        Commands::Status => {
            import_cmd::run_status(&cfg, &caller).await?;
        }
        Commands::Abandon => {
            import_cmd::run_abandon(&cfg, &caller).await?;
        }
        Commands::Backup { action } => match action {
            BackupAction::List => backup_cmd::list(&cfg).await?,
            BackupAction::Restore { id } => backup_cmd::restore(&cfg, &id).await?,
            BackupAction::RestoreAll => backup_cmd::restore_all(&cfg).await?,
            BackupAction::Delete { id } => backup_cmd::delete(&cfg, &id).await?,
            BackupAction::DeleteAll => backup_cmd::delete_all(&cfg).await?,
        },
        Commands::Record { action } => match action {
            RecordAction::Add {
                kind,
                title,
                slug,
                container,
                body_file,
            } => record_cmd::add(&cfg, &kind, &title, slug, container, body_file).await?,
            RecordAction::Get { id } => record_cmd::get(&cfg, id).await?,
            RecordAction::List { kind, container } => {
                record_cmd::list(&cfg, kind.as_deref(), container).await?
            }
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
