// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Deploy package sanitizer
//!
//! Copies a web export to a fresh target folder, strips image metadata on the
//! way and reports absolute local paths and key-like strings found in text
//! files. The source tree is only ever read.

pub mod strip;

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::SanitizerConfig;
use crate::{AtlasError, Result};

pub use strip::{strip_image, strip_jpeg_metadata};

/// Longest excerpt kept for a finding
const EXCERPT_LIMIT: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingKind {
    AbsolutePath,
    PotentialSecret,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingKind::AbsolutePath => write!(f, "absolute-path"),
            FindingKind::PotentialSecret => write!(f, "potential-secret"),
        }
    }
}

/// One pattern match in a text file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    /// Path relative to the package root
    pub file: PathBuf,
    /// One-based line number
    pub line: usize,
    pub kind: FindingKind,
    pub excerpt: String,
}

/// Compiled path and secret patterns
pub struct PatternSet {
    paths: Vec<Regex>,
    secrets: Vec<Regex>,
}

impl PatternSet {
    pub fn from_config(config: &SanitizerConfig) -> Result<Self> {
        fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
            patterns.iter().map(|p| Regex::new(p).map_err(AtlasError::from)).collect()
        }
        Ok(Self {
            paths: compile(&config.path_patterns)?,
            secrets: compile(&config.secret_patterns)?,
        })
    }

    /// Scan text line by line. Secret matches are redacted in the excerpt.
    pub fn scan_text(&self, file: &Path, content: &str) -> Vec<Finding> {
        let mut findings = Vec::new();
        for (n, line) in content.lines().enumerate() {
            for re in &self.paths {
                for m in re.find_iter(line) {
                    findings.push(Finding {
                        file: file.to_path_buf(),
                        line: n + 1,
                        kind: FindingKind::AbsolutePath,
                        excerpt: m.as_str().chars().take(EXCERPT_LIMIT).collect(),
                    });
                }
            }
            for re in &self.secrets {
                for m in re.find_iter(line) {
                    findings.push(Finding {
                        file: file.to_path_buf(),
                        line: n + 1,
                        kind: FindingKind::PotentialSecret,
                        excerpt: redact(m.as_str()),
                    });
                }
            }
        }
        findings
    }
}

/// Keep the first four characters of a match and mask the rest
pub fn redact(secret: &str) -> String {
    let shown: String = secret.chars().take(4).collect();
    let hidden = secret.chars().count().saturating_sub(4).min(EXCERPT_LIMIT);
    format!("{}{}", shown, "*".repeat(hidden))
}

/// Outcome of a sanitize run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SanitizeReport {
    pub source: PathBuf,
    pub target: PathBuf,
    pub files_copied: usize,
    pub images_found: usize,
    pub images_cleaned: usize,
    /// Images left out of the target because their metadata could not be removed
    pub images_failed: Vec<PathBuf>,
    pub text_files_scanned: usize,
    pub findings: Vec<Finding>,
}

impl SanitizeReport {
    /// Files with at least one finding, sorted
    pub fn flagged_files(&self) -> Vec<&Path> {
        let files: BTreeSet<&Path> = self.findings.iter().map(|f| f.file.as_path()).collect();
        files.into_iter().collect()
    }

    pub fn render_text(&self) -> String {
        let mut lines = vec![
            "Sanitization Report".to_string(),
            format!("Source: {}", self.source.display()),
            format!("Target: {}", self.target.display()),
            String::new(),
            format!("Files copied: {}", self.files_copied),
            format!("Images found: {}", self.images_found),
            format!("Images cleaned: {}", self.images_cleaned),
            format!("Images failed: {}", self.images_failed.len()),
        ];
        for path in &self.images_failed {
            lines.push(format!("  not copied: {}", path.display()));
        }
        lines.push(String::new());
        lines.push(format!("Text files scanned: {}", self.text_files_scanned));
        lines.push(format!("Findings: {}", self.findings.len()));
        if self.findings.is_empty() {
            lines.push("No path/secret findings.".to_string());
        }
        for f in &self.findings {
            lines.push(format!("{}:{}: {} -> {}", f.file.display(), f.line, f.kind, f.excerpt));
        }
        let flagged = self.flagged_files();
        if !flagged.is_empty() {
            lines.push(String::new());
            lines.push(format!("Flagged files: {}", flagged.len()));
            for file in flagged {
                lines.push(format!("  {}", file.display()));
            }
        }
        lines.join("\n") + "\n"
    }
}

/// Where the text report for `target` is written: `<target>.SANITIZE_REPORT.txt`
pub fn report_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".SANITIZE_REPORT.txt");
    target.with_file_name(name)
}

/// Absolute form of a path that may not exist yet
fn absolute(path: &Path) -> Result<PathBuf> {
    if let Ok(real) = fs::canonicalize(path) {
        return Ok(real);
    }
    let base = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => absolute(parent)?,
        None => std::env::current_dir()?,
    };
    Ok(match path.file_name() {
        Some(name) => base.join(name),
        None => base,
    })
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Copy `source` to `target`, stripping image metadata and scanning text.
///
/// An existing target is replaced. The text report is written next to the
/// target.
pub fn sanitize(source: &Path, target: &Path, config: &SanitizerConfig) -> Result<SanitizeReport> {
    if !source.is_dir() {
        return Err(AtlasError::MissingInput(source.to_path_buf()));
    }
    let source = fs::canonicalize(source)?;
    let target = absolute(target)?;
    if target.starts_with(&source) {
        return Err(AtlasError::Config(format!(
            "Target {} must not be inside the source folder",
            target.display()
        )));
    }
    if source.starts_with(&target) {
        return Err(AtlasError::Config(format!(
            "Source {} must not be inside the target folder",
            source.display()
        )));
    }

    let patterns = PatternSet::from_config(config)?;

    if target.exists() {
        info!("Replacing existing target {:?}", target);
        fs::remove_dir_all(&target)?;
    }
    fs::create_dir_all(&target)?;

    let mut report = SanitizeReport {
        source: source.clone(),
        target: target.clone(),
        ..SanitizeReport::default()
    };

    for entry in WalkDir::new(&source).sort_by_file_name() {
        let entry = entry.map_err(|e| AtlasError::FileSystem(e.into()))?;
        let path = entry.path();
        let rel = path.strip_prefix(&source).unwrap_or(path).to_path_buf();
        let dest = target.join(&rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
            continue;
        }
        if !entry.file_type().is_file() {
            debug!("Skipping non-regular file {:?}", rel);
            continue;
        }

        if has_extension(path, &config.image_extensions) {
            report.images_found += 1;
            let data = fs::read(path)?;
            match strip_image(path, &data) {
                Ok(clean) => {
                    fs::write(&dest, clean)?;
                    report.images_cleaned += 1;
                    report.files_copied += 1;
                }
                Err(e) => {
                    warn!("Cannot strip metadata from {:?}, leaving it out: {}", rel, e);
                    report.images_failed.push(rel);
                }
            }
            continue;
        }

        fs::copy(path, &dest)?;
        report.files_copied += 1;

        if has_extension(path, &config.text_extensions) {
            let data = fs::read(path)?;
            let content = String::from_utf8_lossy(&data);
            report.findings.extend(patterns.scan_text(&rel, &content));
            report.text_files_scanned += 1;
        }
    }

    let report_file = report_path(&target);
    fs::write(&report_file, report.render_text())?;
    info!(
        "Sanitized {} files into {:?}: {} findings, {} images failed",
        report.files_copied,
        target,
        report.findings.len(),
        report.images_failed.len()
    );

    Ok(report)
}
