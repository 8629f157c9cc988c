// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! photoatlas undo utility
//!
//! Reverses photo renames recorded in the history log.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use photoatlas::config::HistoryConfig;
use photoatlas::history::{History, UndoOutcome};

#[derive(Parser, Debug)]
#[command(name = "photoatlas-undo")]
#[command(version)]
#[command(about = "Undo photoatlas photo renames")]
struct Args {
    /// Path to history file (default: the configured log under --project-root)
    #[arg(short = 'f', long)]
    history_file: Option<PathBuf>,

    /// Project folder the default history file lives in
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    /// Number of renames to undo (default: 1, use 0 for all)
    #[arg(short, long, default_value = "1")]
    count: usize,

    /// Dry run - show what would be undone without doing it
    #[arg(long)]
    dry_run: bool,

    /// List all entries in history
    #[arg(long)]
    list: bool,
}

fn run(args: Args) -> photoatlas::Result<()> {
    let path = args
        .history_file
        .clone()
        .unwrap_or_else(|| HistoryConfig::default().resolve(&args.project_root));
    let history = History::new(path);

    if !history.path().exists() {
        eprintln!("History file not found: {:?}", history.path());
        eprintln!("No renames to undo.");
        return Ok(());
    }

    if args.list {
        let entries = history.get_recent(usize::MAX)?;
        println!("Rename History ({} entries):", entries.len());
        println!("{:-<80}", "");
        for (i, entry) in entries.iter().enumerate() {
            println!(
                "{:3}. [{}] {} -> {}{}",
                i + 1,
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.original_path.display(),
                entry.new_path.display(),
                if entry.undone { " [UNDONE]" } else { "" }
            );
        }
        return Ok(());
    }

    println!(
        "{}Undoing {} rename(s)...",
        if args.dry_run { "[DRY RUN] " } else { "" },
        if args.count == 0 { "all".to_string() } else { args.count.to_string() }
    );

    let mut undone = 0;
    let mut would = 0;
    let mut skipped = 0;

    for outcome in history.undo(args.count, args.dry_run)? {
        match outcome {
            UndoOutcome::Undone(entry) => {
                println!("  Undone: {} -> {}", entry.new_path.display(), entry.original_path.display());
                undone += 1;
            }
            UndoOutcome::WouldUndo(entry) => {
                println!("  Would rename: {} -> {}", entry.new_path.display(), entry.original_path.display());
                would += 1;
            }
            UndoOutcome::Skipped(entry, reason) => {
                eprintln!("  Skip: {} ({})", entry.new_path.display(), reason);
                skipped += 1;
            }
        }
    }

    println!();
    if args.dry_run {
        println!("Dry run complete. {} rename(s) would be undone, {} skipped.", would, skipped);
    } else {
        println!("Done. {} undone, {} skipped.", undone, skipped);
    }

    Ok(())
}

fn main() -> ExitCode {
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
