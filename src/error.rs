// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for photoatlas

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for photoatlas operations
pub type Result<T> = std::result::Result<T, AtlasError>;

/// photoatlas error types
#[derive(Error, Debug)]
pub enum AtlasError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("Missing API credential: set the {0} environment variable")]
    MissingCredential(String),

    #[error("Authentication rejected by labeling API (status {status}): {message}")]
    Auth { status: u16, message: String },

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("API error: {0}")]
    Api(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("EXIF error: {0}")]
    Exif(#[from] exif::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Malformed image: {0}")]
    MalformedImage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Failed to persist output file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl AtlasError {
    /// Errors that must abort a whole run instead of being recorded against a
    /// single file or row.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(
            self,
            AtlasError::Config(_)
                | AtlasError::MissingInput(_)
                | AtlasError::MissingCredential(_)
                | AtlasError::Auth { .. }
        )
    }

    /// Transient failures worth one more attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            AtlasError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            AtlasError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
