//! schemagraph-sync: reconcile declared types with a schemagraph database.
//!
//! Reads a JSON type manifest, syncs it into a SQLite-backed store and
//! prints one line per type. Exit status: 0 on success, 1 if any type had an
//! unsafe change or failed, 2 if the run could not start.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use schemagraph::backend::Backend;
use schemagraph::{SqliteBackend, SyncOptions, SyncReport, TypeManifest, TypeRegistry, TypeSync};

#[derive(Parser, Debug)]
#[command(name = "schemagraph-sync")]
#[command(version, about = "Sync declared element and link types into a schemagraph database")]
struct Args {
    /// SQLite database file (created if missing)
    #[arg(long, env = "SCHEMAGRAPH_DB")]
    db: PathBuf,

    /// JSON manifest of element_types and link_types
    #[arg(long, env = "SCHEMAGRAPH_MANIFEST")]
    manifest: PathBuf,

    /// Delete stored types missing from the manifest, with all their elements and links
    #[arg(long)]
    prune: bool,

    /// Report what would change without writing
    #[arg(long)]
    dry_run: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Log filter, e.g. "info" or "schemagraph=debug"
    #[arg(long, env = "SCHEMAGRAPH_LOG", default_value = "info")]
    log_level: String,
}

impl Args {
    fn options(&self) -> SyncOptions {
        SyncOptions {
            prune: self.prune,
            dry_run: self.dry_run,
        }
    }
}

fn load_manifest(path: &Path) -> Result<TypeManifest> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    TypeManifest::from_json(&text)
        .with_context(|| format!("failed to parse manifest {}", path.display()))
}

fn run(args: &Args) -> Result<SyncReport> {
    info!(
        db = %args.db.display(),
        manifest = %args.manifest.display(),
        prune = args.prune,
        dry_run = args.dry_run,
        "starting type sync"
    );
    let manifest = load_manifest(&args.manifest)?;
    let backend: Arc<dyn Backend> = Arc::new(
        SqliteBackend::open(&args.db)
            .with_context(|| format!("failed to open database {}", args.db.display()))?,
    );
    let registry = TypeRegistry::new(Arc::clone(&backend));
    let report = TypeSync::new(registry, backend)
        .run(&manifest, args.options())
        .context("failed to read stored types")?;
    Ok(report)
}

fn print_report(report: &SyncReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    for entry in &report.entries {
        println!("{entry}");
    }
    let s = report.summary();
    println!(
        "{}{} added, {} updated, {} unchanged, {} orphaned, {} pruned, {} error(s)",
        if report.dry_run { "(dry run) " } else { "" },
        s.added,
        s.updated,
        s.unchanged,
        s.orphaned,
        s.pruned,
        s.errors
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let report = match run(&args) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::from(2);
        }
    };
    if let Err(err) = print_report(&report, args.json) {
        eprintln!("error: {err:#}");
        return ExitCode::from(2);
    }

    if report.has_errors() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}
