mod logging;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hoard_core::{Catalog, Config, ResourceReference, SaveStore, populate};
use output::{DepsOutput, GcOutput, InventoryOutput, ItemInfo, OutputWriter, PopulateOutput};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Hoard - rebuilds a save's inventory from game archives
#[derive(Parser)]
#[command(name = "hoard")]
#[command(about = "Rebuilds a save's inventory from content-addressed game archives", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to HOARD_CONFIG env var, then built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add every admissible catalog plan to a save's inventory
    Populate {
        /// Save store to update
        save: PathBuf,

        /// Game directory holding the database and archives
        game_dir: PathBuf,
    },

    /// List the items in a save's inventory
    Inventory {
        /// Save store to read
        save: PathBuf,
    },

    /// Show everything a catalog entry or blob depends on
    Deps {
        /// Game directory holding the database and archives
        game_dir: PathBuf,

        /// Catalog identifier (g123, 123 or 0x7b) or content hash (h<40 hex>)
        reference: String,
    },

    /// Drop blobs the save's root no longer reaches
    Gc {
        /// Save store to collect
        save: PathBuf,

        /// Dry run - show what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let output = OutputWriter::new(cli.json);

    if let Err(err) = logging::init(cli.verbose) {
        output.write_error(&err, 1);
        return ExitCode::from(1);
    }

    match run(cli, &output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output.write_error(&err, 1);
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli, output: &OutputWriter) -> Result<()> {
    // Config: CLI arg > HOARD_CONFIG env var > built-in defaults
    let config_path = cli
        .config
        .or_else(|| std::env::var("HOARD_CONFIG").ok().map(PathBuf::from));

    match cli.command {
        Commands::Populate { save, game_dir } => {
            let config = load_config(config_path.as_deref())?;
            cmd_populate(output, &save, &game_dir, &config)
        }
        Commands::Inventory { save } => cmd_inventory(output, &save),
        Commands::Deps {
            game_dir,
            reference,
        } => {
            let config = load_config(config_path.as_deref())?;
            cmd_deps(output, &game_dir, &reference, &config)
        }
        Commands::Gc { save, dry_run } => cmd_gc(output, &save, dry_run),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn cmd_populate(output: &OutputWriter, save: &Path, game_dir: &Path, config: &Config) -> Result<()> {
    let summary = populate(save, game_dir, config).with_context(|| {
        format!(
            "Failed to populate {} from {}",
            save.display(),
            game_dir.display()
        )
    })?;

    let data = PopulateOutput {
        success: true,
        result_code: 0,
        save: summary.save.display().to_string(),
        root: summary.root,
        archives: summary.archives,
        rows: summary.report.rows,
        added: summary.report.added.clone(),
        skipped_rows: summary.report.skipped.clone(),
        highlighted: summary.highlighted,
        skipped_sources: summary.skipped_sources.clone(),
    };

    output.write(&data, || {
        let mut text = String::new();
        for source in &summary.skipped_sources {
            let _ = writeln!(text, "Skipped {}: {}", source.source, source.reason);
        }
        let _ = writeln!(
            text,
            "Scanned {} rows across {} archives",
            summary.report.rows, summary.archives
        );
        for (reason, count) in &summary.report.skipped {
            let _ = writeln!(text, "  {:<20} {}", reason, count);
        }
        let _ = writeln!(text, "Highlighted {} items", summary.highlighted);
        let _ = writeln!(text, "Added {} items", summary.report.added.len());
        let _ = writeln!(text, "Root: {}", summary.root);
        text
    })
}

fn cmd_inventory(output: &OutputWriter, save: &Path) -> Result<()> {
    let store = SaveStore::open(save)
        .with_context(|| format!("Failed to open save store at {}", save.display()))?;
    let profile = store
        .load_root()
        .with_context(|| format!("Failed to load profile from {}", save.display()))?;
    let root = store.root().map(|(_, hash)| hash).unwrap_or_default();

    let items: Vec<ItemInfo> = profile.items().iter().map(ItemInfo::from).collect();
    let data = InventoryOutput {
        success: true,
        result_code: 0,
        root,
        progression_status: profile.progression.status,
        items: items.clone(),
    };

    output.write(&data, || {
        let mut text = String::new();
        for item in &items {
            let _ = writeln!(
                text,
                "{:>6}  {:<12} {}{}",
                item.uid,
                item.plan.to_string(),
                if item.hearted { "* " } else { "" },
                item.title.as_deref().unwrap_or("-")
            );
        }
        let _ = writeln!(text, "{} items", items.len());
        text
    })
}

fn cmd_deps(output: &OutputWriter, game_dir: &Path, reference: &str, config: &Config) -> Result<()> {
    let reference: ResourceReference = reference
        .parse()
        .with_context(|| format!("Invalid reference: {}", reference))?;

    let catalog = Catalog::open(game_dir, config)
        .with_context(|| format!("Failed to open catalog in {}", game_dir.display()))?;
    let closure = catalog
        .dependencies(reference)
        .with_context(|| format!("Failed to read {}", reference))?;

    let data = DepsOutput {
        success: true,
        result_code: 0,
        reference,
        found: closure.found.clone(),
        missing: closure.missing.clone(),
    };

    output.write(&data, || {
        let mut text = String::new();
        for reference in &closure.found {
            let _ = writeln!(text, "{}", reference);
        }
        for reference in &closure.missing {
            let _ = writeln!(text, "{} (missing)", reference);
        }
        let _ = writeln!(
            text,
            "{} dependencies, {} missing",
            closure.found.len(),
            closure.missing.len()
        );
        text
    })
}

fn cmd_gc(output: &OutputWriter, save: &Path, dry_run: bool) -> Result<()> {
    let mut store = SaveStore::open(save)
        .with_context(|| format!("Failed to open save store at {}", save.display()))?;

    let stats = store
        .gc(dry_run)
        .with_context(|| "Failed to run garbage collection")?;

    if !dry_run && stats.objects_deleted > 0 {
        store
            .persist()
            .with_context(|| format!("Failed to write {}", save.display()))?;
    }

    let data = GcOutput {
        success: true,
        result_code: 0,
        dry_run,
        objects_deleted: stats.objects_deleted,
        bytes_freed: stats.bytes_freed,
    };

    output.write(&data, || {
        if dry_run {
            format!(
                "Dry run - no objects deleted\nWould delete {} objects\nWould free {} bytes\n",
                stats.objects_deleted, stats.bytes_freed
            )
        } else {
            format!(
                "Deleted {} objects\nFreed {} bytes\n",
                stats.objects_deleted, stats.bytes_freed
            )
        }
    })
}
