// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Location-based photo renaming

pub mod grouping;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::geocode::Geocoder;
use crate::history::{create_entry, file_hash, History};
use crate::scanner::{self, file_name, PhotoRecord, TEMP_PREFIX};
use crate::{AtlasError, Result};

pub use grouping::{assign_location_groups, haversine_m, order_records, parse_renamed_stem};

/// Options for one rename run
#[derive(Debug, Clone)]
pub struct RenameOptions {
    pub input_dir: PathBuf,
    /// Where renamed photos go, defaults to `input_dir`
    pub output_dir: Option<PathBuf>,
    pub prefix: String,
    pub digits: usize,
    pub same_spot_m: f64,
    /// Forced place name for all photos, or the first N when set
    pub place_name: Option<String>,
    pub place_name_first_n: usize,
    pub dry_run: bool,
}

/// Result of a rename run
#[derive(Debug)]
pub struct RenameReport {
    pub records: Vec<PhotoRecord>,
    pub renamed: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub groups: usize,
    pub geocoded_groups: Option<usize>,
}

/// Clean a place name into a file-name slug
pub fn slugify_place(text: &str) -> String {
    let lower = text.trim().to_lowercase();
    let mut slug = String::with_capacity(lower.len());
    for c in lower.chars() {
        let c = if c.is_alphanumeric() { c } else { '_' };
        if c == '_' && slug.ends_with('_') {
            continue;
        }
        slug.push(c);
    }
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        scanner::UNKNOWN_PLACE.to_string()
    } else {
        slug.to_string()
    }
}

/// `{prefix}_{seq}[-{dup}]_{slug}{ext}`
pub fn build_new_filename(prefix: &str, rec: &PhotoRecord, digits: usize) -> String {
    let mut base = format!("{}_{:0width$}", prefix, rec.location_seq, width = digits);
    if rec.duplicate_idx > 0 {
        base = format!("{}-{}", base, rec.duplicate_idx);
    }
    format!("{}_{}{}", base, rec.place_slug, rec.extension())
}

fn with_dup_suffix(name: &str, n: usize) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{}_dup{}.{}", stem, n, ext),
        None => format!("{}_dup{}", name, n),
    }
}

/// Pick a final name for every record.
///
/// Names already taken by planned records, or by files in `output_dir` that
/// are not part of this run, get a `_dup{n}` suffix.
pub fn plan_renames(records: &mut [PhotoRecord], output_dir: &Path, prefix: &str, digits: usize) -> Result<()> {
    let sources: HashSet<PathBuf> = records.iter().map(|r| r.path.clone()).collect();
    let mut reserved: HashSet<String> = HashSet::new();
    if output_dir.is_dir() {
        for entry in std::fs::read_dir(output_dir)?.flatten() {
            let path = entry.path();
            if path.is_file() && !sources.contains(&path) {
                reserved.insert(file_name(&path));
            }
        }
    }

    let mut planned: HashSet<String> = HashSet::new();
    for rec in records.iter_mut() {
        let base = build_new_filename(prefix, rec, digits);
        let mut candidate = base.clone();
        let mut n = 1;
        while planned.contains(&candidate) || reserved.contains(&candidate) {
            candidate = with_dup_suffix(&base, n);
            n += 1;
        }
        planned.insert(candidate.clone());
        rec.new_name = candidate;
    }
    Ok(())
}

fn unique_path(target: PathBuf) -> PathBuf {
    if !target.exists() {
        return target;
    }
    let name = file_name(&target);
    let parent = target.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut n = 1;
    loop {
        let candidate = parent.join(with_dup_suffix(&name, n));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Move records to their planned names in two phases through temporary
/// names, so that swapped names never overwrite each other. Records already
/// carrying their planned name are left alone. Returns (renamed, failed).
pub fn apply_renames(records: &mut [PhotoRecord], output_dir: &Path, history: Option<&History>) -> Result<(usize, usize)> {
    std::fs::create_dir_all(output_dir)?;

    let mut moving: Vec<(usize, PathBuf)> = Vec::new();
    let mut failed = 0;

    for (i, rec) in records.iter_mut().enumerate() {
        let target = output_dir.join(&rec.new_name);
        if rec.path == target {
            continue;
        }
        let temp = unique_path(output_dir.join(format!(
            "{}{}{}",
            TEMP_PREFIX,
            uuid::Uuid::new_v4().simple(),
            rec.extension()
        )));
        match std::fs::rename(&rec.path, &temp) {
            Ok(()) => moving.push((i, std::mem::replace(&mut rec.path, temp))),
            Err(e) => {
                warn!("Failed to move {:?}: {}", rec.path, e);
                rec.new_name = file_name(&rec.path);
                failed += 1;
            }
        }
    }

    let mut renamed = 0;
    for (i, original) in moving {
        let rec = &mut records[i];
        let target = unique_path(output_dir.join(&rec.new_name));
        match std::fs::rename(&rec.path, &target) {
            Ok(()) => {
                debug!("Renamed {:?} -> {:?}", original, target);
                rec.new_name = file_name(&target);
                rec.path = target;
                renamed += 1;
                if let Some(history) = history {
                    let hash = file_hash(&rec.path).unwrap_or_default();
                    let entry = create_entry(original, rec.path.clone(), hash);
                    if let Err(e) = history.append(&entry) {
                        warn!("Failed to record rename in history: {}", e);
                    }
                }
            }
            Err(e) => {
                warn!("Failed to rename {:?} to {:?}: {}", original, target, e);
                if std::fs::rename(&rec.path, &original).is_ok() {
                    rec.path = original;
                }
                rec.new_name = file_name(&rec.path);
                failed += 1;
            }
        }
    }

    Ok((renamed, failed))
}

/// Scan, group, optionally geocode, name and rename the photos of a folder
pub async fn rename_folder(
    opts: &RenameOptions,
    geocoder: Option<&Geocoder>,
    history: Option<&History>,
) -> Result<RenameReport> {
    if !opts.input_dir.is_dir() {
        return Err(AtlasError::MissingInput(opts.input_dir.clone()));
    }
    let output_dir = opts.output_dir.clone().unwrap_or_else(|| opts.input_dir.clone());

    let mut records = scanner::scan_folder(&opts.input_dir)?;
    order_records(&mut records, &opts.prefix);
    let groups = assign_location_groups(&mut records, opts.same_spot_m);

    let geocoded_groups = match geocoder {
        Some(geocoder) => Some(geocoder.geocode_groups(&mut records).await),
        None => None,
    };

    if let Some(ref place) = opts.place_name {
        let slug = slugify_place(place);
        let n = if opts.place_name_first_n > 0 {
            opts.place_name_first_n.min(records.len())
        } else {
            records.len()
        };
        for rec in records.iter_mut().take(n) {
            rec.place_slug = slug.clone();
        }
    }

    plan_renames(&mut records, &output_dir, &opts.prefix, opts.digits)?;

    let (renamed, failed) = if opts.dry_run {
        for rec in &records {
            if rec.original_name != rec.new_name {
                info!("DRY RUN: Would rename {} -> {}", rec.original_name, rec.new_name);
            }
        }
        (0, 0)
    } else {
        apply_renames(&mut records, &output_dir, history)?
    };
    let unchanged = records.len() - renamed - failed;

    info!(
        "Processed {} photos in {} location groups: {} renamed, {} unchanged, {} failed",
        records.len(),
        groups,
        renamed,
        unchanged,
        failed
    );

    Ok(RenameReport {
        records,
        renamed,
        unchanged,
        failed,
        groups,
        geocoded_groups,
    })
}

/// Scan and group a folder without renaming. Every record keeps its current
/// name as `new_name`.
pub async fn index_folder(
    input_dir: &Path,
    prefix: &str,
    same_spot_m: f64,
    geocoder: Option<&Geocoder>,
) -> Result<Vec<PhotoRecord>> {
    if !input_dir.is_dir() {
        return Err(AtlasError::MissingInput(input_dir.to_path_buf()));
    }
    let mut records = scanner::scan_folder(input_dir)?;
    order_records(&mut records, prefix);
    let groups = assign_location_groups(&mut records, same_spot_m);
    if let Some(geocoder) = geocoder {
        geocoder.geocode_groups(&mut records).await;
    }
    debug!("Indexed {} photos in {} location groups", records.len(), groups);
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{file_names, write_photo, ExifSpec};

    fn options(dir: &Path) -> RenameOptions {
        RenameOptions {
            input_dir: dir.to_path_buf(),
            output_dir: None,
            prefix: "Kivenlahti".to_string(),
            digits: 2,
            same_spot_m: 12.0,
            place_name: None,
            place_name_first_n: 0,
            dry_run: false,
        }
    }

    #[test]
    fn test_slugify_place() {
        assert_eq!(slugify_place("  Hatsinan  Puisto "), "hatsinan_puisto");
        assert_eq!(slugify_place("Länsiväylä / Ring I"), "länsiväylä_ring_i");
        assert_eq!(slugify_place("--"), "unknown_place");
    }

    #[test]
    fn test_dup_suffix() {
        assert_eq!(with_dup_suffix("A_01_x.jpg", 2), "A_01_x_dup2.jpg");
        assert_eq!(with_dup_suffix("noext", 1), "noext_dup1");
    }

    #[tokio::test]
    async fn test_rename_by_location_and_time() {
        let dir = tempfile::tempdir().unwrap();
        write_photo(dir.path(), "c.jpg", &ExifSpec::at("2024:05:01 12:00:00").with_gps(60.0, 24.0));
        write_photo(dir.path(), "a.jpg", &ExifSpec::at("2024:05:01 10:00:00").with_gps(60.0, 24.0));
        write_photo(dir.path(), "b.jpg", &ExifSpec::at("2024:05:01 11:00:00").with_gps(60.1, 24.1));

        let report = rename_folder(&options(dir.path()), None, None).await.unwrap();
        assert_eq!(report.renamed, 3);
        assert_eq!(report.groups, 2);

        let pairs: Vec<_> = report
            .records
            .iter()
            .map(|r| (r.original_name.as_str(), r.new_name.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("a.jpg", "Kivenlahti_01_unknown_place.jpg"),
                ("b.jpg", "Kivenlahti_02_unknown_place.jpg"),
                ("c.jpg", "Kivenlahti_01-1_unknown_place.jpg"),
            ]
        );
        assert_eq!(
            file_names(dir.path()),
            vec![
                "Kivenlahti_01-1_unknown_place.jpg",
                "Kivenlahti_01_unknown_place.jpg",
                "Kivenlahti_02_unknown_place.jpg",
            ]
        );
    }

    #[tokio::test]
    async fn test_rename_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let tags = ExifSpec::at("2024:05:01 10:00:00").with_gps(60.0, 24.0);
        write_photo(dir.path(), "IMG_2.jpg", &tags);
        write_photo(dir.path(), "IMG_1.jpg", &tags);
        write_photo(dir.path(), "IMG_3.jpg", &ExifSpec::default());

        let first = rename_folder(&options(dir.path()), None, None).await.unwrap();
        assert_eq!(first.renamed, 3);
        let after_first = file_names(dir.path());

        let second = rename_folder(&options(dir.path()), None, None).await.unwrap();
        assert_eq!(second.renamed, 0);
        assert_eq!(second.unchanged, 3);
        assert_eq!(file_names(dir.path()), after_first);
    }

    #[tokio::test]
    async fn test_earlier_photo_shifts_existing_names() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_photo(dir.path(), "a.jpg", &ExifSpec::at("2024:05:01 10:00:00").with_gps(60.0, 24.0));
        let b = write_photo(dir.path(), "b.jpg", &ExifSpec::at("2024:05:01 11:00:00").with_gps(60.1, 24.0));
        let a_bytes = std::fs::read(&a).unwrap();
        let b_bytes = std::fs::read(&b).unwrap();
        rename_folder(&options(dir.path()), None, None).await.unwrap();

        let z = write_photo(dir.path(), "z.jpg", &ExifSpec::at("2024:05:01 09:00:00").with_gps(60.2, 24.0));
        let z_bytes = std::fs::read(&z).unwrap();
        let report = rename_folder(&options(dir.path()), None, None).await.unwrap();
        assert_eq!(report.renamed, 3);
        assert_eq!(report.failed, 0);

        assert_eq!(
            file_names(dir.path()),
            vec![
                "Kivenlahti_01_unknown_place.jpg",
                "Kivenlahti_02_unknown_place.jpg",
                "Kivenlahti_03_unknown_place.jpg",
            ]
        );
        assert_eq!(std::fs::read(dir.path().join("Kivenlahti_01_unknown_place.jpg")).unwrap(), z_bytes);
        assert_eq!(std::fs::read(dir.path().join("Kivenlahti_02_unknown_place.jpg")).unwrap(), a_bytes);
        assert_eq!(std::fs::read(dir.path().join("Kivenlahti_03_unknown_place.jpg")).unwrap(), b_bytes);
    }

    #[tokio::test]
    async fn test_forced_place_name() {
        let dir = tempfile::tempdir().unwrap();
        write_photo(dir.path(), "a.jpg", &ExifSpec::at("2024:05:01 10:00:00"));

        let mut opts = options(dir.path());
        opts.place_name = Some("Ranta".to_string());
        let report = rename_folder(&opts, None, None).await.unwrap();
        assert_eq!(report.records[0].new_name, "Kivenlahti_01_ranta.jpg");
        assert!(dir.path().join("Kivenlahti_01_ranta.jpg").exists());
    }

    #[test]
    fn test_plan_avoids_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("P_01_unknown_place.jpg"), "not ours").unwrap();
        let src = tempfile::tempdir().unwrap();
        let path = write_photo(src.path(), "a.jpg", &ExifSpec::default());
        let mut records = vec![scanner::scan_photo(&path)];
        assign_location_groups(&mut records, 12.0);

        plan_renames(&mut records, dir.path(), "P", 2).unwrap();
        assert_eq!(records[0].new_name, "P_01_unknown_place_dup1.jpg");

        let (renamed, failed) = apply_renames(&mut records, dir.path(), None).unwrap();
        assert_eq!((renamed, failed), (1, 0));
        assert!(dir.path().join("P_01_unknown_place_dup1.jpg").exists());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_photo(dir.path(), "a.jpg", &ExifSpec::at("2024:05:01 10:00:00"));
        let mut opts = options(dir.path());
        opts.dry_run = true;

        let report = rename_folder(&opts, None, None).await.unwrap();
        assert_eq!(report.records[0].new_name, "Kivenlahti_01_unknown_place.jpg");
        assert_eq!(file_names(dir.path()), vec!["a.jpg"]);
    }

    #[tokio::test]
    async fn test_place_name_first_n() {
        let dir = tempfile::tempdir().unwrap();
        write_photo(dir.path(), "a.jpg", &ExifSpec::at("2024:05:01 10:00:00"));
        write_photo(dir.path(), "b.jpg", &ExifSpec::at("2024:05:01 11:00:00"));
        let mut opts = options(dir.path());
        opts.place_name = Some("Espoonlahti".to_string());
        opts.place_name_first_n = 1;
        opts.dry_run = true;

        let report = rename_folder(&opts, None, None).await.unwrap();
        assert_eq!(report.records[0].place_slug, "espoonlahti");
        assert_eq!(report.records[1].place_slug, "unknown_place");
    }

    #[tokio::test]
    async fn test_index_folder_keeps_names() {
        let dir = tempfile::tempdir().unwrap();
        write_photo(dir.path(), "b.jpg", &ExifSpec::at("2024:05:01 11:00:00").with_gps(60.0, 24.0));
        write_photo(dir.path(), "a.jpg", &ExifSpec::at("2024:05:01 10:00:00").with_gps(60.0, 24.0));

        let records = index_folder(dir.path(), "Kivenlahti", 12.0, None).await.unwrap();
        let names: Vec<_> = records.iter().map(|r| (r.new_name.as_str(), r.duplicate_idx)).collect();
        assert_eq!(names, vec![("a.jpg", 0), ("b.jpg", 1)]);
        assert_eq!(file_names(dir.path()), vec!["a.jpg", "b.jpg"]);
    }

    #[tokio::test]
    async fn test_history_records_renames() {
        let dir = tempfile::tempdir().unwrap();
        let log = tempfile::tempdir().unwrap();
        let history = History::new(log.path().join("history.jsonl"));
        write_photo(dir.path(), "a.jpg", &ExifSpec::at("2024:05:01 10:00:00"));

        rename_folder(&options(dir.path()), None, Some(&history)).await.unwrap();
        let entries = history.read_all().unwrap();
        assert_eq!(entries.len(), 1);
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(entries[0].original_path, root.join("a.jpg"));
        assert_eq!(entries[0].new_path, root.join("Kivenlahti_01_unknown_place.jpg"));
        assert!(!entries[0].file_hash.is_empty());
    }
}
