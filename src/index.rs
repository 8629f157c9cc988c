// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! CSV photo index files
//!
//! Index files are always written whole: rows go to a temporary file next to
//! the target, which is then persisted over it. A failed run leaves the
//! previous file untouched.

use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::labeler::LABEL_COLUMNS;
use crate::scanner::PhotoRecord;
use crate::{AtlasError, Result};

/// Column holding the resolved photo location
pub const PHOTO_PATH_COLUMN: &str = "photo_path";

/// Columns describing the photo itself, in output order
pub const BASE_COLUMNS: &[&str] = &[
    "original_name",
    "new_name",
    PHOTO_PATH_COLUMN,
    "latitude",
    "longitude",
    "address",
    "place_slug",
    "location_group_id",
    "location_sequence",
    "duplicate_index",
    "capture_datetime",
];

/// Full header of a freshly built index: base columns then empty label columns
pub fn index_columns() -> Vec<String> {
    BASE_COLUMNS
        .iter()
        .chain(LABEL_COLUMNS.iter())
        .map(|c| c.to_string())
        .collect()
}

/// In-memory CSV table that keeps column order and unknown columns intact
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Pad or cut a row to `width` cells; returns how many non-empty cells
/// were cut off.
fn fit_row(row: &mut Vec<String>, width: usize, path: &Path, line: usize) -> usize {
    let dropped = row.iter().skip(width).filter(|c| !c.is_empty()).count();
    if row.len() > width {
        warn!(
            "{}: line {} has {} cells for {} columns, extra cells dropped",
            path.display(),
            line,
            row.len(),
            width
        );
    }
    row.resize(width, String::new());
    dropped
}

impl CsvTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self { headers, rows: Vec::new() }
    }

    /// Read a CSV file. Rows are padded or cut to the header width.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(AtlasError::MissingInput(path.to_path_buf()));
        }
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;

        let mut headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if let Some(first) = headers.first_mut() {
            *first = first.trim_start_matches('\u{feff}').to_string();
        }

        let mut rows = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            fit_row(&mut row, headers.len(), path, i + 2);
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Index of `name`, appending an empty column when it is missing
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(i) = self.column(name) {
            return i;
        }
        self.headers.push(name.to_string());
        for row in self.rows.iter_mut() {
            row.push(String::new());
        }
        self.headers.len() - 1
    }

    /// Cell value by column name, empty when the column is absent
    pub fn get<'a>(&'a self, row: usize, name: &str) -> &'a str {
        self.column(name)
            .and_then(|c| self.rows.get(row).and_then(|r| r.get(c)))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn set(&mut self, row: usize, name: &str, value: impl Into<String>) {
        let col = self.ensure_column(name);
        if let Some(r) = self.rows.get_mut(row) {
            r[col] = value.into();
        }
    }

    /// Write the table atomically, creating parent directories
    pub fn write(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&parent)?;

        let mut tmp = NamedTempFile::new_in(&parent)?;
        {
            let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
            writer.write_record(&self.headers)?;
            for row in &self.rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
        }
        tmp.persist(path)?;
        Ok(())
    }
}

fn format_coord(value: Option<f64>) -> String {
    value.map(|v| format!("{:.8}", v)).unwrap_or_default()
}

/// Row for one photo in `index_columns()` order
pub fn index_row(rec: &PhotoRecord) -> Vec<String> {
    let photo_path = std::fs::canonicalize(&rec.path).unwrap_or_else(|_| rec.path.clone());
    let mut row = vec![
        rec.original_name.clone(),
        rec.new_name.clone(),
        photo_path.to_string_lossy().to_string(),
        format_coord(rec.coords.map(|c| c.lat)),
        format_coord(rec.coords.map(|c| c.lon)),
        rec.address.clone(),
        rec.place_slug.clone(),
        rec.location_group.to_string(),
        rec.location_seq.to_string(),
        rec.duplicate_idx.to_string(),
        rec.captured_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default(),
    ];
    row.resize(BASE_COLUMNS.len() + LABEL_COLUMNS.len(), String::new());
    row
}

/// Build the index table for a set of records
pub fn build_index(records: &[PhotoRecord]) -> CsvTable {
    let mut table = CsvTable::new(index_columns());
    table.rows = records.iter().map(index_row).collect();
    table
}

/// Build and write the index CSV, replacing any previous file.
/// Returns the number of rows written.
pub fn write_index(records: &[PhotoRecord], path: &Path) -> Result<usize> {
    let table = build_index(records);
    table.write(path)?;
    info!("CSV written: {:?} ({} rows)", path, table.rows.len());
    Ok(table.rows.len())
}
