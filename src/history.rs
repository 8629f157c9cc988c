// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Rename history for undo support

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use tempfile::NamedTempFile;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::Result;

/// A single rename operation in history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub original_path: PathBuf,
    pub new_path: PathBuf,
    /// blake3 of the file after the rename
    pub file_hash: String,
    pub undone: bool,
}

/// What happened to one entry during undo
#[derive(Debug, Clone, PartialEq)]
pub enum UndoOutcome {
    Undone(HistoryEntry),
    WouldUndo(HistoryEntry),
    /// Entry left alone, with the reason
    Skipped(HistoryEntry, String),
}

/// History manager for tracking photo renames
pub struct History {
    path: PathBuf,
}

impl History {
    /// Create a new history manager
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append an entry to the history
    pub fn append(&self, entry: &HistoryEntry) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }

    /// Read all history entries
    pub fn read_all(&self) -> Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);

        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!("Failed to parse history entry: {}", e);
                }
            }
        }

        Ok(entries)
    }

    /// Get the most recent N entries (newest first)
    pub fn get_recent(&self, count: usize) -> Result<Vec<HistoryEntry>> {
        let mut entries = self.read_all()?;
        entries.reverse();
        entries.truncate(count);
        Ok(entries)
    }

    /// Flag entries as undone. The log is rewritten through a temporary
    /// file next to it, so an interrupted rewrite leaves the old log.
    pub fn mark_undone(&self, ids: &[String]) -> Result<()> {
        let entries = self.read_all()?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            for mut entry in entries {
                entry.undone |= ids.contains(&entry.id);
                writeln!(writer, "{}", serde_json::to_string(&entry)?)?;
            }
            writer.flush()?;
        }
        tmp.persist(&self.path)?;
        Ok(())
    }

    /// Get entries that haven't been undone
    pub fn get_undoable(&self) -> Result<Vec<HistoryEntry>> {
        let entries = self.read_all()?;
        Ok(entries.into_iter().filter(|e| !e.undone).collect())
    }

    /// Undo the `count` most recent renames (0 = all), newest first.
    ///
    /// An entry is skipped when its file is gone, when the original name is
    /// taken again, or when the file content changed since the rename.
    pub fn undo(&self, count: usize, dry_run: bool) -> Result<Vec<UndoOutcome>> {
        let mut entries = self.get_undoable()?;
        entries.reverse();
        if count > 0 {
            entries.truncate(count);
        }

        let mut outcomes = Vec::with_capacity(entries.len());
        let mut undone_ids = Vec::new();

        for entry in entries {
            if !entry.new_path.exists() {
                outcomes.push(UndoOutcome::Skipped(entry, "file not found".to_string()));
                continue;
            }
            if entry.original_path.exists() {
                outcomes.push(UndoOutcome::Skipped(entry, "original path already exists".to_string()));
                continue;
            }
            if !entry.file_hash.is_empty() {
                match file_hash(&entry.new_path) {
                    Ok(hash) if hash == entry.file_hash => {}
                    Ok(_) => {
                        outcomes.push(UndoOutcome::Skipped(entry, "file changed since rename".to_string()));
                        continue;
                    }
                    Err(e) => {
                        outcomes.push(UndoOutcome::Skipped(entry, e.to_string()));
                        continue;
                    }
                }
            }

            if dry_run {
                outcomes.push(UndoOutcome::WouldUndo(entry));
                continue;
            }

            match fs::rename(&entry.new_path, &entry.original_path) {
                Ok(()) => {
                    undone_ids.push(entry.id.clone());
                    outcomes.push(UndoOutcome::Undone(entry));
                }
                Err(e) => outcomes.push(UndoOutcome::Skipped(entry, e.to_string())),
            }
        }

        if !undone_ids.is_empty() {
            self.mark_undone(&undone_ids)?;
        }

        Ok(outcomes)
    }

    /// Clear all history
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    /// Get history file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Calculate a file's content hash
pub fn file_hash(path: &Path) -> Result<String> {
    let data = fs::read(path)?;
    Ok(blake3::hash(&data).to_hex().to_string())
}

/// Absolute form of a path whose file may no longer exist; the parent
/// directory is canonicalized when the file itself is gone.
fn absolute_path(path: &Path) -> PathBuf {
    if let Ok(full) = path.canonicalize() {
        return full;
    }
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        let parent = if parent.as_os_str().is_empty() { Path::new(".") } else { parent };
        if let Ok(dir) = parent.canonicalize() {
            return dir.join(name);
        }
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// Create a new history entry. Paths are stored absolute so undo works
/// from any working directory.
pub fn create_entry(original_path: PathBuf, new_path: PathBuf, file_hash: String) -> HistoryEntry {
    HistoryEntry {
        id: uuid::Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        original_path: absolute_path(&original_path),
        new_path: absolute_path(&new_path),
        file_hash,
        undone: false,
    }
}
