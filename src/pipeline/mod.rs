// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! District pipelines: rename, index and label each photo set in turn

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::{AppConfig, DistrictConfig, PhotoSetConfig};
use crate::geocode::Geocoder;
use crate::history::History;
use crate::index::write_index;
use crate::labeler::{label_index, resolve_api_key, LabelOptions, LabelSummary, PhotoLabeler, VisionLabeler};
use crate::renamer::{rename_folder, RenameOptions};
use crate::{AtlasError, Result};

/// Options for one pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Base for relative paths in the district configuration
    pub project_root: PathBuf,
    /// Reuse existing index CSVs instead of renaming
    pub skip_rename: bool,
    pub skip_labels: bool,
    /// Set names to run, all sets when empty
    pub only: Vec<String>,
    /// Label row limit per set, 0 for all
    pub limit: usize,
    pub geocode: bool,
}

/// A photo set with its paths resolved against the project root
#[derive(Debug, Clone)]
pub struct PlannedSet {
    pub name: String,
    pub prefix: String,
    pub photo_dir: PathBuf,
    pub index_csv: PathBuf,
    pub ai_csv: PathBuf,
}

/// What happened to one set
#[derive(Debug, Clone, Serialize)]
pub struct SetOutcome {
    pub name: String,
    pub renamed: usize,
    pub rename_failed: usize,
    /// Rows written to the index, `None` when renaming was skipped
    pub indexed: Option<usize>,
    pub index_csv: PathBuf,
    pub labels: Option<LabelSummary>,
    pub ai_csv: PathBuf,
}

/// Join a configured path onto the project root unless it is absolute
pub fn resolve_path(root: &Path, configured: &str) -> PathBuf {
    let path = Path::new(configured);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn planned_set(set: &PhotoSetConfig, root: &Path) -> PlannedSet {
    PlannedSet {
        name: set.name.clone(),
        prefix: set.prefix.clone(),
        photo_dir: resolve_path(root, &set.photo_dir),
        index_csv: resolve_path(root, &set.index_csv),
        ai_csv: resolve_path(root, &set.ai_csv),
    }
}

/// Select and check the sets of a district before anything is written.
///
/// Fails on an unknown `--only` name, a missing photo folder, or a missing
/// index CSV when renaming is skipped.
pub fn plan_sets(district: &DistrictConfig, opts: &PipelineOptions) -> Result<Vec<PlannedSet>> {
    for wanted in &opts.only {
        if !district.sets.iter().any(|s| s.name.eq_ignore_ascii_case(wanted)) {
            return Err(AtlasError::Config(format!(
                "District '{}' has no set named '{}'",
                district.name, wanted
            )));
        }
    }

    let sets: Vec<PlannedSet> = district
        .sets
        .iter()
        .filter(|s| opts.only.is_empty() || opts.only.iter().any(|o| o.eq_ignore_ascii_case(&s.name)))
        .map(|s| planned_set(s, &opts.project_root))
        .collect();

    for set in &sets {
        if !set.photo_dir.is_dir() {
            return Err(AtlasError::Config(format!(
                "Photo directory not found for set '{}': {}",
                set.name,
                set.photo_dir.display()
            )));
        }
        if opts.skip_rename && !set.index_csv.is_file() {
            return Err(AtlasError::MissingInput(set.index_csv.clone()));
        }
    }

    Ok(sets)
}

/// Run the planned sets one after the other
pub async fn run_sets(
    sets: &[PlannedSet],
    config: &AppConfig,
    opts: &PipelineOptions,
    geocoder: Option<&Geocoder>,
    labeler: Option<&dyn PhotoLabeler>,
    history: Option<&History>,
) -> Result<Vec<SetOutcome>> {
    let mut outcomes = Vec::with_capacity(sets.len());

    for set in sets {
        info!("=== {} ===", set.name);
        let mut outcome = SetOutcome {
            name: set.name.clone(),
            renamed: 0,
            rename_failed: 0,
            indexed: None,
            index_csv: set.index_csv.clone(),
            labels: None,
            ai_csv: set.ai_csv.clone(),
        };

        if !opts.skip_rename {
            let rename = RenameOptions {
                input_dir: set.photo_dir.clone(),
                output_dir: None,
                prefix: set.prefix.clone(),
                digits: config.renamer.digits,
                same_spot_m: config.renamer.same_spot_m,
                place_name: None,
                place_name_first_n: 0,
                dry_run: false,
            };
            let report = rename_folder(&rename, geocoder, history).await?;
            outcome.renamed = report.renamed;
            outcome.rename_failed = report.failed;
            outcome.indexed = Some(write_index(&report.records, &set.index_csv)?);
        }

        if let Some(labeler) = labeler {
            let label = LabelOptions {
                input_csv: set.index_csv.clone(),
                output_csv: set.ai_csv.clone(),
                photo_dir: set.photo_dir.clone(),
                limit: opts.limit,
                skip_if_filled: false,
            };
            outcome.labels = Some(label_index(&label, labeler).await?);
        }

        outcomes.push(outcome);
    }

    info!("Pipeline complete");
    Ok(outcomes)
}

/// Run a configured district end to end.
///
/// Every check that can fail for the whole run (district name, folders,
/// credential) happens before the first file is renamed.
pub async fn run_pipeline(config: &AppConfig, district: &str, opts: &PipelineOptions) -> Result<Vec<SetOutcome>> {
    let district = config
        .district(district)
        .ok_or_else(|| AtlasError::Config(format!("Unknown district '{}'", district)))?;
    let sets = plan_sets(district, opts)?;

    let labeler = if opts.skip_labels {
        None
    } else {
        let api_key = resolve_api_key(&config.labeler.api_key_env)?;
        Some(VisionLabeler::new(&config.labeler, api_key)?)
    };
    let geocoder = if opts.geocode {
        Some(Geocoder::new(&config.geocode)?)
    } else {
        None
    };
    let history = History::new(config.history.resolve(&opts.project_root));

    run_sets(
        &sets,
        config,
        opts,
        geocoder.as_ref(),
        labeler.as_ref().map(|l| l as &dyn PhotoLabeler),
        Some(&history),
    )
    .await
}
