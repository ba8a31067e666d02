use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use civic_reconcile::output::{removal_stamp, RemovedRecords};
use civic_reconcile::pipeline::{self, DiffTargets, MergePaths};
use civic_reconcile::{archive, db, DatasetKind, NeighbourhoodConfig};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "civic-reconcile", version)]
#[command(about = "Reconcile business licenses with property owners and diff snapshots")]
struct Cli {
    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Neighbourhood tables as JSON (defaults to the built-in Strathcona tables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Audit database; no audit event is recorded without it
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Match licenses to owners and write listing, error and import files
    Merge {
        owners: PathBuf,
        licenses: PathBuf,
        output: PathBuf,
        errors: PathBuf,
        import: PathBuf,

        /// Snapshot archive: removed caches are read from it, inputs copied into it
        #[arg(long)]
        archive_dir: Option<PathBuf>,
    },

    /// Compare two snapshots of one dataset and print the HTML report
    Diff {
        /// PO or BL
        kind: DatasetKind,
        current: PathBuf,
        previous: PathBuf,

        /// Where the removed cache for the next merge goes
        #[arg(long)]
        archive_dir: Option<PathBuf>,

        /// Where the differences CSV goes
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => NeighbourhoodConfig::from_file(path)?,
        None => NeighbourhoodConfig::default(),
    };
    let today = Local::now().date_naive();

    match cli.command {
        Command::Merge {
            owners,
            licenses,
            output,
            errors,
            import,
            archive_dir,
        } => {
            let paths = MergePaths {
                owners,
                licenses,
                output,
                errors,
                import,
            };
            run_merge(&paths, &config, archive_dir.as_deref(), cli.db.as_deref(), today)
        }
        Command::Diff {
            kind,
            current,
            previous,
            archive_dir,
            out_dir,
        } => {
            let targets = DiffTargets {
                out_dir: Some(out_dir.as_path()),
                cache_dir: archive_dir.as_deref(),
                date: today,
            };
            run_diff(kind, &current, &previous, &config, &targets, cli.db.as_deref())
        }
    }
}

fn run_merge(
    paths: &MergePaths,
    config: &NeighbourhoodConfig,
    archive_dir: Option<&Path>,
    db_path: Option<&Path>,
    today: NaiveDate,
) -> Result<()> {
    let removed = match archive_dir {
        Some(dir) => pipeline::load_removed(dir, config)?,
        None => RemovedRecords::default(),
    };

    let summary = pipeline::run_merge(paths, config, &removed, &removal_stamp(today))?;

    if let Some(dir) = archive_dir {
        archive::archive_copy(&paths.owners, dir, DatasetKind::PropertyOwners, today)?;
        archive::archive_copy(&paths.licenses, dir, DatasetKind::BusinessLicenses, today)?;
    }

    if let Some(db_path) = db_path {
        let run = db::RunRecord::new(db::RunKind::Merge, "cli", serde_json::to_value(&summary)?)
            .with_input(db::InputFile::from_path("property_owners", &paths.owners)?)
            .with_input(db::InputFile::from_path("business_licenses", &paths.licenses)?);
        record_run(db_path, &run)?;
    }

    Ok(())
}

fn run_diff(
    kind: DatasetKind,
    current: &Path,
    previous: &Path,
    config: &NeighbourhoodConfig,
    targets: &DiffTargets<'_>,
    db_path: Option<&Path>,
) -> Result<()> {
    let outcome = pipeline::run_diff(kind, current, Some(previous), config, targets)?;
    println!("{}", outcome.html);

    if let Some(db_path) = db_path {
        let run = db::RunRecord::new(db::RunKind::Diff, "cli", serde_json::to_value(&outcome.summary)?)
            .with_dataset(kind)
            .with_input(db::InputFile::from_path("current", current)?)
            .with_input(db::InputFile::from_path("previous", previous)?);
        record_run(db_path, &run)?;
    }

    Ok(())
}

fn record_run(db_path: &Path, run: &db::RunRecord) -> Result<()> {
    let conn = db::open_database(db_path)?;
    db::record_run(&conn, run).context("Failed to record run")?;
    info!(run = %run.run_id, kind = run.kind.as_str(), "run recorded");

    Ok(())
}
