// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! AI labeling of indexed photos
//!
//! Every row of an index CSV gets five urban-experience labels, one reason per
//! label and a confidence. Rows are labeled one at a time; a failing row is
//! left with empty labels, while a missing or rejected credential stops the
//! run before the output file is touched.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::config::LabelerConfig;
use crate::index::{CsvTable, PHOTO_PATH_COLUMN};
use crate::openai::OpenAiClient;
use crate::{AtlasError, Result};

/// Label columns added to an index, in output order
pub const LABEL_COLUMNS: &[&str] = &[
    "AI-Social_environment",
    "AI-Active_environment",
    "AI-Aesthetic_environment",
    "AI-Atmosphere",
    "AI_significance",
    "AI_Social_environment_reason",
    "AI_Active_environment_reason",
    "AI_Aesthetic_environment_reason",
    "AI_Atmosphere_reason",
    "AI_significance_reason",
    "AI_confidence",
];

/// Reply keys for each dimension, matching the first five label columns
const DIMENSIONS: &[&str] = &["social", "active", "aesthetic", "atmosphere", "significance"];

/// Reason written for rows whose image could not be found
pub const IMAGE_NOT_FOUND: &str = "image_not_found";

/// Labels and reasons for one photo
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelSet {
    /// `Negative`, `Neutral`, `Positive` or empty, in `DIMENSIONS` order
    pub labels: [String; 5],
    pub reasons: [String; 5],
    pub confidence: Option<f64>,
}

impl LabelSet {
    /// Parse a model reply. `None` when no JSON object can be found.
    pub fn from_reply(text: &str) -> Option<Self> {
        let object = parse_json_object(text)?;
        let mut set = LabelSet::default();
        for (i, dim) in DIMENSIONS.iter().enumerate() {
            set.labels[i] = normalize_label(object.get(&format!("{}_label", dim)));
            set.reasons[i] = clean_reason(object.get(&format!("{}_reason", dim)));
        }
        set.confidence = object.get("confidence").and_then(parse_confidence);
        Some(set)
    }

    /// Cell values in `LABEL_COLUMNS` order
    pub fn cells(&self) -> Vec<String> {
        self.labels
            .iter()
            .chain(self.reasons.iter())
            .cloned()
            .chain(std::iter::once(
                self.confidence.map(|c| format!("{:.3}", c)).unwrap_or_default(),
            ))
            .collect()
    }
}

fn value_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Map loose label spellings onto the three allowed values
pub fn normalize_label(value: Option<&Value>) -> String {
    match value_text(value).trim().to_lowercase().as_str() {
        "negative" | "neg" => "Negative".to_string(),
        "neutral" | "neu" => "Neutral".to_string(),
        "positive" | "pos" => "Positive".to_string(),
        _ => String::new(),
    }
}

/// Collapse whitespace runs into single spaces
pub fn clean_reason(value: Option<&Value>) -> String {
    value_text(value).split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_confidence(value: &Value) -> Option<f64> {
    let c = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if c.is_nan() {
        return None;
    }
    Some(c.clamp(0.0, 1.0))
}

/// Outermost `{...}` span of a reply, compiled once
fn outer_object() -> Option<&'static Regex> {
    static OUTER: OnceLock<Option<Regex>> = OnceLock::new();
    OUTER.get_or_init(|| Regex::new(r"(?s)\{.*\}").ok()).as_ref()
}

/// Parse a JSON object from a reply, falling back to the outermost `{...}`
/// when the object is wrapped in prose or code fences.
pub fn parse_json_object(text: &str) -> Option<Map<String, Value>> {
    let raw = text.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return value.as_object().cloned();
    }
    let found = outer_object()?.find(raw)?;
    match serde_json::from_str::<Value>(found.as_str()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Something that can label one photo
#[async_trait]
pub trait PhotoLabeler: Send + Sync {
    /// Label JPEG bytes
    async fn label(&self, image: &[u8]) -> Result<LabelSet>;
}

/// Labeler backed by a vision chat model
pub struct VisionLabeler {
    client: OpenAiClient,
    prompt: String,
    retries: u32,
}

impl VisionLabeler {
    pub fn new(config: &LabelerConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: OpenAiClient::new(config, api_key)?,
            prompt: config.prompt.clone(),
            retries: config.retries,
        })
    }
}

#[async_trait]
impl PhotoLabeler for VisionLabeler {
    async fn label(&self, image: &[u8]) -> Result<LabelSet> {
        let encoded = general_purpose::STANDARD.encode(image);
        let reply = self.client.chat_with_retry(&self.prompt, &encoded, self.retries).await?;
        debug!("Reply from {}: {}", self.client.model(), reply);
        LabelSet::from_reply(&reply).ok_or_else(|| {
            let excerpt: String = reply.chars().take(220).collect();
            AtlasError::Api(format!("unparseable reply: {}", excerpt))
        })
    }
}

/// Read the API key from the named environment variable
pub fn resolve_api_key(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(AtlasError::MissingCredential(var.to_string())),
    }
}

/// Options for one labeling run
#[derive(Debug, Clone)]
pub struct LabelOptions {
    pub input_csv: PathBuf,
    pub output_csv: PathBuf,
    pub photo_dir: PathBuf,
    /// Maximum number of rows sent to the API, 0 for all
    pub limit: usize,
    /// Leave rows whose five labels are all set
    pub skip_if_filled: bool,
}

/// Totals of a labeling run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LabelSummary {
    pub rows: usize,
    pub labeled: usize,
    pub skipped_filled: usize,
    pub missing_image: usize,
    pub failed: usize,
}

/// Find the image for a row: `new_name` then `original_name`, each under
/// the photo folder, next to the CSV, then as written
pub fn resolve_photo_path(table: &CsvTable, row: usize, photo_dir: &Path, input_csv: &Path) -> Option<PathBuf> {
    let csv_dir = input_csv.parent().unwrap_or_else(|| Path::new(""));
    ["new_name", "original_name"]
        .iter()
        .map(|key| table.get(row, key).trim())
        .filter(|name| !name.is_empty())
        .flat_map(|name| [photo_dir.join(name), csv_dir.join(name), PathBuf::from(name)])
        .find(|candidate| candidate.is_file())
}

fn is_filled(table: &CsvTable, row: usize) -> bool {
    LABEL_COLUMNS[..DIMENSIONS.len()]
        .iter()
        .all(|col| !table.get(row, col).trim().is_empty())
}

fn clear_labels(table: &mut CsvTable, row: usize) {
    for col in LABEL_COLUMNS {
        table.set(row, col, "");
    }
}

fn apply_labels(table: &mut CsvTable, row: usize, labels: &LabelSet) {
    for (col, value) in LABEL_COLUMNS.iter().zip(labels.cells()) {
        table.set(row, col, value);
    }
}

/// Label every row of an index CSV and write the result.
///
/// Fatal errors (missing input, rejected credential) return before anything is
/// written. Other per-row failures leave that row with empty labels.
pub async fn label_index(opts: &LabelOptions, labeler: &dyn PhotoLabeler) -> Result<LabelSummary> {
    let mut table = CsvTable::read(&opts.input_csv)?;
    for col in LABEL_COLUMNS {
        table.ensure_column(col);
    }
    table.ensure_column(PHOTO_PATH_COLUMN);

    let total = table.rows.len();
    let mut summary = LabelSummary { rows: total, ..LabelSummary::default() };
    let mut attempted = 0;

    for row in 0..total {
        let image_path = resolve_photo_path(&table, row, &opts.photo_dir, &opts.input_csv)
            .map(|p| std::fs::canonicalize(&p).unwrap_or(p));
        if let Some(path) = &image_path {
            table.set(row, PHOTO_PATH_COLUMN, path.to_string_lossy());
        }

        if opts.limit > 0 && attempted >= opts.limit {
            continue;
        }
        if opts.skip_if_filled && is_filled(&table, row) {
            summary.skipped_filled += 1;
            continue;
        }

        let Some(path) = image_path else {
            warn!("Image not found for row {}: {}", row + 1, table.get(row, "new_name"));
            summary.missing_image += 1;
            clear_labels(&mut table, row);
            table.set(row, "AI_Social_environment_reason", IMAGE_NOT_FOUND);
            continue;
        };

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cannot read {:?}: {}", path, e);
                summary.failed += 1;
                clear_labels(&mut table, row);
                continue;
            }
        };

        attempted += 1;
        match labeler.label(&bytes).await {
            Ok(labels) => {
                apply_labels(&mut table, row, &labels);
                summary.labeled += 1;
                info!("[{}/{}] labeled {:?}", row + 1, total, path.file_name().unwrap_or_default());
            }
            Err(e) if e.is_fatal_for_run() => return Err(e),
            Err(e) => {
                warn!("Labeling failed for {:?}: {}", path, e);
                summary.failed += 1;
                clear_labels(&mut table, row);
            }
        }
    }

    table.write(&opts.output_csv)?;
    info!("CSV written: {:?}", opts.output_csv);
    Ok(summary)
}

/// Label with the configured vision API. The credential is checked before the
/// CSV is read or any request is made.
pub async fn run_labeling(opts: &LabelOptions, config: &LabelerConfig) -> Result<LabelSummary> {
    let api_key = resolve_api_key(&config.api_key_env)?;
    let labeler = VisionLabeler::new(config, api_key)?;
    label_index(opts, &labeler).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::index_columns;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Labels every photo Positive, failing on the calls listed in `fail_on`
    struct MockLabeler {
        calls: AtomicUsize,
        fail_on: Vec<usize>,
        error: fn() -> AtlasError,
    }

    impl MockLabeler {
        fn ok() -> Self {
            Self { calls: AtomicUsize::new(0), fail_on: Vec::new(), error: || AtlasError::Api("x".into()) }
        }

        fn failing(fail_on: Vec<usize>, error: fn() -> AtlasError) -> Self {
            Self { calls: AtomicUsize::new(0), fail_on, error }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PhotoLabeler for MockLabeler {
        async fn label(&self, _image: &[u8]) -> Result<LabelSet> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on.contains(&n) {
                return Err((self.error)());
            }
            Ok(LabelSet::from_reply(
                r#"{"social_label":"pos","social_reason":"people  on\nbenches","active_label":"Neutral",
                    "aesthetic_label":"positive","atmosphere_label":"neg","significance_label":"Positive",
                    "confidence":0.87}"#,
            )
            .unwrap())
        }
    }

    /// Index CSV with `n` rows pointing at photos in `dir`
    fn setup(dir: &Path, n: usize) -> LabelOptions {
        let photos = dir.join("photos");
        std::fs::create_dir_all(&photos).unwrap();
        let mut table = CsvTable::new(index_columns());
        for i in 0..n {
            let name = format!("Set_{:02}_park.jpg", i + 1);
            std::fs::write(photos.join(&name), b"jpeg bytes").unwrap();
            let mut row = vec![String::new(); table.headers.len()];
            row[0] = format!("IMG_{}.jpg", i);
            row[1] = name;
            table.rows.push(row);
        }
        let input_csv = dir.join("Data/index.csv");
        table.write(&input_csv).unwrap();
        LabelOptions {
            input_csv,
            output_csv: dir.join("Data/index_ai.csv"),
            photo_dir: photos,
            limit: 0,
            skip_if_filled: false,
        }
    }

    #[test]
    fn test_reply_normalization() {
        let set = LabelSet::from_reply(
            "Sure! ```json\n{\"social_label\": \"NEU\", \"social_reason\": \"  quiet\\n street \",\
             \"active_label\": \"very good\", \"confidence\": \"1.7\"}\n```",
        )
        .unwrap();
        assert_eq!(set.labels[0], "Neutral");
        assert_eq!(set.reasons[0], "quiet street");
        assert_eq!(set.labels[1], "");
        assert_eq!(set.confidence, Some(1.0));
        assert_eq!(set.cells().len(), LABEL_COLUMNS.len());
        assert_eq!(set.cells()[10], "1.000");
    }

    #[test]
    fn test_reply_without_object() {
        assert_eq!(LabelSet::from_reply("I cannot help with that."), None);
        assert_eq!(LabelSet::from_reply(""), None);
        assert_eq!(LabelSet::from_reply("[1, 2]"), None);
    }

    #[test]
    fn test_outer_object_compiled_once() {
        let first = outer_object().unwrap();
        assert!(std::ptr::eq(first, outer_object().unwrap()));
        let map = parse_json_object("note: {\"a\": 1} end").unwrap();
        assert_eq!(map["a"], 1);
    }

    #[test]
    fn test_confidence_values() {
        assert_eq!(parse_confidence(&json!(-0.2)), Some(0.0));
        assert_eq!(parse_confidence(&json!(0.25)), Some(0.25));
        assert_eq!(parse_confidence(&json!("high")), None);
        assert_eq!(parse_confidence(&json!(null)), None);
    }

    #[test]
    fn test_resolve_api_key() {
        let var = "PHOTOATLAS_TEST_KEY_RESOLVE";
        std::env::remove_var(var);
        assert!(matches!(resolve_api_key(var), Err(AtlasError::MissingCredential(_))));
        std::env::set_var(var, " sk-abc ");
        assert_eq!(resolve_api_key(var).unwrap(), "sk-abc");
        std::env::remove_var(var);
    }

    #[tokio::test]
    async fn test_missing_credential_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let opts = setup(dir.path(), 2);
        let config = LabelerConfig {
            api_key_env: "PHOTOATLAS_TEST_KEY_UNSET".to_string(),
            ..LabelerConfig::default()
        };
        std::env::remove_var(&config.api_key_env);

        let err = run_labeling(&opts, &config).await.unwrap_err();
        assert!(matches!(err, AtlasError::MissingCredential(_)));
        assert!(!opts.output_csv.exists());
    }

    #[tokio::test]
    async fn test_auth_failure_aborts_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let opts = setup(dir.path(), 3);
        std::fs::write(&opts.output_csv, "previous").unwrap();
        let labeler = MockLabeler::failing(vec![1], || AtlasError::Auth { status: 401, message: "bad key".into() });

        let err = label_index(&opts, &labeler).await.unwrap_err();
        assert!(matches!(err, AtlasError::Auth { status: 401, .. }));
        assert_eq!(std::fs::read_to_string(&opts.output_csv).unwrap(), "previous");
        assert_eq!(labeler.calls(), 2);
    }

    #[tokio::test]
    async fn test_row_failure_only_empties_that_row() {
        let dir = tempfile::tempdir().unwrap();
        let opts = setup(dir.path(), 3);
        let labeler = MockLabeler::failing(vec![1], || AtlasError::Status { status: 500, message: "boom".into() });

        let summary = label_index(&opts, &labeler).await.unwrap();
        assert_eq!(summary, LabelSummary { rows: 3, labeled: 2, failed: 1, ..LabelSummary::default() });

        let out = CsvTable::read(&opts.output_csv).unwrap();
        assert_eq!(out.get(0, "AI-Social_environment"), "Positive");
        assert_eq!(out.get(0, "AI_Social_environment_reason"), "people on benches");
        assert_eq!(out.get(0, "AI-Atmosphere"), "Negative");
        assert_eq!(out.get(0, "AI_confidence"), "0.870");
        assert_eq!(out.get(1, "AI-Social_environment"), "");
        assert_eq!(out.get(1, "AI_confidence"), "");
        assert_eq!(out.get(2, "AI_significance"), "Positive");
    }

    #[tokio::test]
    async fn test_output_rows_match_input_by_filename() {
        let dir = tempfile::tempdir().unwrap();
        let opts = setup(dir.path(), 4);
        std::fs::remove_file(opts.photo_dir.join("Set_03_park.jpg")).unwrap();

        let summary = label_index(&opts, &MockLabeler::ok()).await.unwrap();
        assert_eq!(summary.missing_image, 1);
        assert_eq!(summary.labeled, 3);

        let base = CsvTable::read(&opts.input_csv).unwrap();
        let out = CsvTable::read(&opts.output_csv).unwrap();
        let names = |t: &CsvTable| (0..t.rows.len()).map(|i| t.get(i, "new_name").to_string()).collect::<HashSet<_>>();
        assert_eq!(names(&base), names(&out));
        assert_eq!(out.rows.len(), base.rows.len());
        assert_eq!(out.headers, base.headers);

        assert_eq!(out.get(2, "AI_Social_environment_reason"), IMAGE_NOT_FOUND);
        assert!(out.get(0, PHOTO_PATH_COLUMN).ends_with("Set_01_park.jpg"));
    }

    #[tokio::test]
    async fn test_limit_and_skip_if_filled() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = setup(dir.path(), 4);
        opts.limit = 2;
        let labeler = MockLabeler::ok();
        let first = label_index(&opts, &labeler).await.unwrap();
        assert_eq!(first.labeled, 2);
        assert_eq!(labeler.calls(), 2);

        opts.input_csv = opts.output_csv.clone();
        opts.limit = 0;
        opts.skip_if_filled = true;
        let labeler = MockLabeler::ok();
        let second = label_index(&opts, &labeler).await.unwrap();
        assert_eq!(second.skipped_filled, 2);
        assert_eq!(second.labeled, 2);
        assert_eq!(labeler.calls(), 2);
    }

    #[tokio::test]
    async fn test_original_name_fallback_and_extra_columns() {
        let dir = tempfile::tempdir().unwrap();
        let photos = dir.path().join("photos");
        std::fs::create_dir_all(&photos).unwrap();
        std::fs::write(dir.path().join("IMG_1.jpg"), b"jpeg").unwrap();
        let input_csv = dir.path().join("in.csv");
        std::fs::write(&input_csv, "original_name,new_name,notes\nIMG_1.jpg,Gone_01_x.jpg,keep me\n").unwrap();

        let opts = LabelOptions {
            input_csv,
            output_csv: dir.path().join("out.csv"),
            photo_dir: photos,
            limit: 0,
            skip_if_filled: false,
        };
        label_index(&opts, &MockLabeler::ok()).await.unwrap();

        let out = CsvTable::read(&opts.output_csv).unwrap();
        assert_eq!(&out.headers[..3], &["original_name", "new_name", "notes"]);
        assert_eq!(out.headers.len(), 3 + LABEL_COLUMNS.len() + 1);
        assert_eq!(out.get(0, "notes"), "keep me");
        assert!(out.get(0, PHOTO_PATH_COLUMN).ends_with("IMG_1.jpg"));
        assert_eq!(out.get(0, "AI-Active_environment"), "Neutral");
    }
}
