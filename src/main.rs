// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! photoatlas: district photo toolkit
//!
//! Renames geotagged photos by location, writes CSV indexes, labels photos
//! with a vision model and sanitizes web exports before deployment.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

use photoatlas::config::AppConfig;
use photoatlas::geocode::Geocoder;
use photoatlas::history::{History, UndoOutcome};
use photoatlas::index::write_index;
use photoatlas::labeler::{run_labeling, LabelOptions, LabelSummary};
use photoatlas::pipeline::{run_pipeline, PipelineOptions, SetOutcome};
use photoatlas::renamer::{index_folder, rename_folder, RenameOptions};
use photoatlas::sanitizer::{report_path, sanitize};
use photoatlas::{AtlasError, Result};

/// photoatlas CLI - district photo renamer, indexer and labeler
#[derive(Parser, Debug)]
#[command(name = "photoatlas")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Rename, index, label and sanitize district photos for web maps", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rename photos by location and time, then write the index CSV
    Rename {
        /// Folder holding the photos
        #[arg(long)]
        input_dir: PathBuf,

        /// File name prefix, e.g. the district name
        #[arg(long)]
        prefix: String,

        /// Index CSV to write
        #[arg(long)]
        csv_out: PathBuf,

        /// Move renamed photos here instead of renaming in place
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Zero padding of the location number (overrides config)
        #[arg(long)]
        digits: Option<usize>,

        /// Same-spot radius in metres (overrides config)
        #[arg(long)]
        same_spot_m: Option<f64>,

        /// Look up place names for each location group
        #[arg(long)]
        geocode: bool,

        /// Use this place name instead of geocoding
        #[arg(long)]
        place_name: Option<String>,

        /// Apply --place-name to the first N photos only (0 = all)
        #[arg(long, default_value = "0")]
        place_name_first_n: usize,

        /// Show the planned names and write the CSV without renaming
        #[arg(long)]
        dry_run: bool,
    },

    /// Write the index CSV for a folder without renaming
    Index {
        #[arg(long)]
        input_dir: PathBuf,

        /// Prefix of earlier generated names, used to keep their order
        #[arg(long)]
        prefix: String,

        #[arg(long)]
        csv_out: PathBuf,

        /// Look up place names for each location group
        #[arg(long)]
        geocode: bool,
    },

    /// Add AI labels to an index CSV
    Label {
        #[arg(long)]
        input_csv: PathBuf,

        #[arg(long)]
        output_csv: PathBuf,

        #[arg(long)]
        photo_dir: PathBuf,

        /// Vision model (overrides config)
        #[arg(long)]
        model: Option<String>,

        /// Send at most N rows to the API (0 = all)
        #[arg(long, default_value = "0")]
        limit: usize,

        /// Skip rows that already have all five labels
        #[arg(long)]
        skip_if_filled: bool,
    },

    /// Run rename, index and labeling for every set of a district
    Pipeline {
        /// District name from the configuration
        district: String,

        /// Base folder for relative paths in the district configuration
        #[arg(long, default_value = ".")]
        project_root: PathBuf,

        /// Reuse existing index CSVs
        #[arg(long)]
        skip_rename: bool,

        /// Stop after writing the index CSVs
        #[arg(long)]
        skip_labels: bool,

        /// Only run these sets (repeatable)
        #[arg(long)]
        only: Vec<String>,

        /// Label row limit per set (0 = all)
        #[arg(long, default_value = "0")]
        limit: usize,

        /// Look up place names for each location group
        #[arg(long)]
        geocode: bool,
    },

    /// Copy a web export, stripping image metadata and reporting leaks
    Sanitize {
        #[arg(long)]
        source: PathBuf,

        #[arg(long)]
        target: PathBuf,
    },

    /// History and undo operations
    History {
        /// Folder the configured history path is relative to (as for `pipeline`)
        #[arg(long, global = true, default_value = ".")]
        project_root: PathBuf,

        #[command(subcommand)]
        action: HistoryCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCommands {
    /// List recent history entries
    List {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
    },

    /// Undo recent renames
    Undo {
        /// Number of renames to undo (0 = all)
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Dry run (show what would be undone)
        #[arg(long)]
        dry_run: bool,
    },

    /// Clear all history
    Clear {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(&cli.config)?;
    let json = cli.format == "json";

    match cli.command {
        Commands::Rename {
            input_dir,
            prefix,
            csv_out,
            output_dir,
            digits,
            same_spot_m,
            geocode,
            place_name,
            place_name_first_n,
            dry_run,
        } => {
            let opts = RenameOptions {
                input_dir,
                output_dir,
                prefix,
                digits: digits.unwrap_or(config.renamer.digits),
                same_spot_m: same_spot_m.unwrap_or(config.renamer.same_spot_m),
                place_name,
                place_name_first_n,
                dry_run,
            };
            run_rename(&config, opts, &csv_out, geocode, json).await
        }
        Commands::Index { input_dir, prefix, csv_out, geocode } => {
            run_index(&config, &input_dir, &prefix, &csv_out, geocode, json).await
        }
        Commands::Label { input_csv, output_csv, photo_dir, model, limit, skip_if_filled } => {
            let mut labeler = config.labeler.clone();
            if let Some(model) = model {
                labeler.model = model;
            }
            let opts = LabelOptions { input_csv, output_csv, photo_dir, limit, skip_if_filled };
            let summary = run_labeling(&opts, &labeler).await?;
            print_label_summary(&summary, &opts.output_csv, json)
        }
        Commands::Pipeline { district, project_root, skip_rename, skip_labels, only, limit, geocode } => {
            let opts = PipelineOptions {
                project_root,
                skip_rename,
                skip_labels,
                only,
                limit,
                geocode: geocode || config.geocode.enabled,
            };
            let outcomes = run_pipeline(&config, &district, &opts).await?;
            print_pipeline(&outcomes, json)
        }
        Commands::Sanitize { source, target } => {
            let report = sanitize(&source, &target, &config.sanitizer)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.render_text());
                println!("Report written: {}", report_path(&report.target).display());
            }
            Ok(())
        }
        Commands::History { project_root, action } => run_history_command(&config, &project_root, action, json),
        Commands::Config { action } => run_config_command(config, action, &cli.config),
    }
}

fn geocoder_for(config: &AppConfig, requested: bool) -> Result<Option<Geocoder>> {
    if requested || config.geocode.enabled {
        Ok(Some(Geocoder::new(&config.geocode)?))
    } else {
        Ok(None)
    }
}

#[derive(Serialize)]
struct RenameSummary<'a> {
    photos: usize,
    groups: usize,
    renamed: usize,
    unchanged: usize,
    failed: usize,
    geocoded_groups: Option<usize>,
    csv: &'a Path,
    dry_run: bool,
}

/// Run the rename command
async fn run_rename(config: &AppConfig, opts: RenameOptions, csv_out: &Path, geocode: bool, json: bool) -> Result<()> {
    let geocoder = geocoder_for(config, geocode)?;
    let log = History::new(config.history.resolve(Path::new(".")));
    let history = if opts.dry_run { None } else { Some(&log) };

    let report = rename_folder(&opts, geocoder.as_ref(), history).await?;

    if opts.dry_run && !json {
        for rec in &report.records {
            println!("  {} -> {}", rec.original_name, rec.new_name);
        }
    }
    write_index(&report.records, csv_out)?;

    let summary = RenameSummary {
        photos: report.records.len(),
        groups: report.groups,
        renamed: report.renamed,
        unchanged: report.unchanged,
        failed: report.failed,
        geocoded_groups: report.geocoded_groups,
        csv: csv_out,
        dry_run: opts.dry_run,
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Photos: {} in {} location groups", summary.photos, summary.groups);
        println!("Renamed: {}, unchanged: {}, failed: {}", summary.renamed, summary.unchanged, summary.failed);
        if let Some(n) = summary.geocoded_groups {
            println!("Geocoded groups: {}", n);
        }
        println!("CSV written: {}", summary.csv.display());
    }
    Ok(())
}

/// Run the index command
async fn run_index(config: &AppConfig, input_dir: &Path, prefix: &str, csv_out: &Path, geocode: bool, json: bool) -> Result<()> {
    let geocoder = geocoder_for(config, geocode)?;
    let records = index_folder(input_dir, prefix, config.renamer.same_spot_m, geocoder.as_ref()).await?;
    let rows = write_index(&records, csv_out)?;

    if json {
        println!("{}", serde_json::json!({ "rows": rows, "csv": csv_out }));
    } else {
        println!("CSV written: {} ({} rows)", csv_out.display(), rows);
    }
    Ok(())
}

fn print_label_summary(summary: &LabelSummary, output: &Path, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    println!("Rows total: {}", summary.rows);
    println!("Labeled rows: {}", summary.labeled);
    println!("Skipped already-filled: {}", summary.skipped_filled);
    println!("Missing image: {}", summary.missing_image);
    println!("Failed API/parse: {}", summary.failed);
    println!("CSV written: {}", output.display());
    Ok(())
}

fn print_pipeline(outcomes: &[SetOutcome], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcomes)?);
        return Ok(());
    }
    for outcome in outcomes {
        println!("{}:", outcome.name);
        if let Some(rows) = outcome.indexed {
            println!(
                "  renamed {} ({} failed), index {} ({} rows)",
                outcome.renamed,
                outcome.rename_failed,
                outcome.index_csv.display(),
                rows
            );
        }
        if let Some(labels) = &outcome.labels {
            println!(
                "  labeled {}/{} (skipped {}, missing image {}, failed {}), AI CSV {}",
                labels.labeled,
                labels.rows,
                labels.skipped_filled,
                labels.missing_image,
                labels.failed,
                outcome.ai_csv.display()
            );
        }
    }
    Ok(())
}

/// Run history commands
fn run_history_command(config: &AppConfig, project_root: &Path, action: HistoryCommands, json: bool) -> Result<()> {
    let history = History::new(config.history.resolve(project_root));

    match action {
        HistoryCommands::List { count } => {
            let entries = history.get_recent(count)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }
            println!("Recent history ({} entries):", entries.len());
            for entry in entries {
                let status = if entry.undone { "[UNDONE]" } else { "" };
                println!("  {} {} -> {} {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.original_path.display(),
                    entry.new_path.display(),
                    status
                );
            }
        }
        HistoryCommands::Undo { count, dry_run } => {
            let outcomes = history.undo(count, dry_run)?;
            if outcomes.is_empty() {
                println!("No renames to undo");
                return Ok(());
            }
            for outcome in outcomes {
                match outcome {
                    UndoOutcome::Undone(entry) => println!("Undone: {} -> {}",
                        entry.new_path.display(),
                        entry.original_path.display()
                    ),
                    UndoOutcome::WouldUndo(entry) => println!("Would undo: {} -> {}",
                        entry.new_path.display(),
                        entry.original_path.display()
                    ),
                    UndoOutcome::Skipped(entry, reason) => {
                        warn!("Skipped {:?}: {}", entry.new_path, reason);
                    }
                }
            }
        }
        HistoryCommands::Clear { force } => {
            if !force {
                eprintln!("Use --force to confirm clearing history");
                return Ok(());
            }
            history.clear()?;
            println!("History cleared");
        }
    }

    Ok(())
}

/// Run config commands
fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output } => {
            if output.exists() {
                return Err(AtlasError::Config(format!(
                    "{} already exists, remove it first",
                    output.display()
                )));
            }
            AppConfig::default().save(&output)?;
            info!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            config.validate()?;
            println!("Configuration at {:?} is valid", config_path);
            println!("  Model: {} (key from ${})", config.labeler.model, config.labeler.api_key_env);
            println!("  Same-spot radius: {} m", config.renamer.same_spot_m);
            for district in &config.districts {
                let sets: Vec<_> = district.sets.iter().map(|s| s.name.as_str()).collect();
                println!("  District {}: {}", district.name, sets.join(", "));
            }
        }
    }

    Ok(())
}
