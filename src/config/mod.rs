// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for photoatlas

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// AI labeling API settings
    #[serde(default)]
    pub labeler: LabelerConfig,

    /// Rename and grouping rules
    #[serde(default)]
    pub renamer: RenamerConfig,

    /// Reverse geocoding settings
    #[serde(default)]
    pub geocode: GeocodeConfig,

    /// Deploy package scanning rules
    #[serde(default)]
    pub sanitizer: SanitizerConfig,

    /// District pipelines
    #[serde(default = "default_districts")]
    pub districts: Vec<DistrictConfig>,

    /// Rename history log
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LabelerConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_label_prompt")]
    pub prompt: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RenamerConfig {
    /// Zero padding of the location sequence number
    #[serde(default = "default_digits")]
    pub digits: usize,
    /// Photos closer than this (metres) share a location group
    #[serde(default = "default_same_spot_m")]
    pub same_spot_m: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeocodeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_geocode_url")]
    pub url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_geocode_timeout")]
    pub timeout_secs: u64,
    /// Pause between requests, Nominatim allows one per second
    #[serde(default = "default_geocode_delay")]
    pub delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SanitizerConfig {
    #[serde(default = "default_text_extensions")]
    pub text_extensions: Vec<String>,
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
    #[serde(default = "default_path_patterns")]
    pub path_patterns: Vec<String>,
    #[serde(default = "default_secret_patterns")]
    pub secret_patterns: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DistrictConfig {
    pub name: String,
    pub sets: Vec<PhotoSetConfig>,
}

/// One photo folder of a district and its output files.
/// Relative paths resolve against the project root.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PhotoSetConfig {
    pub name: String,
    pub photo_dir: String,
    pub prefix: String,
    pub index_csv: String,
    pub ai_csv: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_history_path")]
    pub path: String,
}

// Default value functions
fn default_endpoint() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_model() -> String { "gpt-4.1-mini".to_string() }
fn default_api_key_env() -> String { "OPENAI_API_KEY".to_string() }
fn default_timeout() -> u64 { 120 }
fn default_retries() -> u32 { 1 }
fn default_max_tokens() -> u32 { 350 }
fn default_digits() -> usize { 2 }
fn default_same_spot_m() -> f64 { 12.0 }
fn default_geocode_url() -> String { "https://nominatim.openstreetmap.org/reverse".to_string() }
fn default_user_agent() -> String { "photoatlas/1.0 (district photo renamer)".to_string() }
fn default_geocode_timeout() -> u64 { 20 }
fn default_geocode_delay() -> u64 { 1000 }
fn default_history_path() -> String { "photoatlas_history.jsonl".to_string() }

fn default_label_prompt() -> String {
    "Assess the place shown in one urban photo. Return ONLY JSON with keys:\n\
     social_label, social_reason, active_label, active_reason, \
     aesthetic_label, aesthetic_reason, atmosphere_label, atmosphere_reason, \
     significance_label, significance_reason, confidence.\n\
     Rules:\n\
     - Labels must be exactly one of: Negative, Neutral, Positive.\n\
     - Each *_reason must be one short concrete sentence based on visible cues.\n\
     - confidence must be 0..1."
        .to_string()
}

fn default_text_extensions() -> Vec<String> {
    vec!["html", "htm", "js", "css", "json", "geojson", "csv", "txt", "md", "xml", "yml", "yaml"]
        .into_iter().map(String::from).collect()
}

fn default_image_extensions() -> Vec<String> {
    vec!["jpg", "jpeg", "png", "webp", "tif", "tiff"]
        .into_iter().map(String::from).collect()
}

fn default_path_patterns() -> Vec<String> {
    vec![
        r#"/Users/[^\s"']+"#,
        r#"C:\\{1,2}Users\\{1,2}[^\s"']+"#,
        r#"/home/[^\s"']+"#,
    ]
    .into_iter().map(String::from).collect()
}

fn default_secret_patterns() -> Vec<String> {
    vec![
        r"sk-[A-Za-z0-9]{20,}",
        r"AIza[0-9A-Za-z\-_]{20,}",
        r#"(?i)api[_-]?key\s*[:=]\s*['"][^'"]+['"]"#,
        r#"(?i)token\s*[:=]\s*['"][^'"]+['"]"#,
    ]
    .into_iter().map(String::from).collect()
}

fn photo_set(name: &str, photo_dir: &str, prefix: &str, stem: &str) -> PhotoSetConfig {
    PhotoSetConfig {
        name: name.to_string(),
        photo_dir: photo_dir.to_string(),
        prefix: prefix.to_string(),
        index_csv: format!("Data/{}_photo_index.csv", stem),
        ai_csv: format!("Data/{}_photo_index_ai.csv", stem),
    }
}

fn default_districts() -> Vec<DistrictConfig> {
    vec![
        DistrictConfig {
            name: "kivenlahti".to_string(),
            sets: vec![photo_set("Kivenlahti", "Kivenlahti_photos", "Kivenlahti", "kivenlahti")],
        },
        DistrictConfig {
            name: "mankkaa".to_string(),
            sets: vec![
                photo_set("Light", "Mankkaa_photos/Light", "MankkaaLight", "mankkaa_light"),
                photo_set("Dark", "Mankkaa_photos/Dark", "MankkaaDark", "mankkaa_dark"),
            ],
        },
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            labeler: LabelerConfig::default(),
            renamer: RenamerConfig::default(),
            geocode: GeocodeConfig::default(),
            sanitizer: SanitizerConfig::default(),
            districts: default_districts(),
            history: HistoryConfig::default(),
        }
    }
}

impl Default for LabelerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout(),
            retries: default_retries(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            prompt: default_label_prompt(),
        }
    }
}

impl Default for RenamerConfig {
    fn default() -> Self {
        Self {
            digits: default_digits(),
            same_spot_m: default_same_spot_m(),
        }
    }
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_geocode_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_geocode_timeout(),
            delay_ms: default_geocode_delay(),
        }
    }
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            text_extensions: default_text_extensions(),
            image_extensions: default_image_extensions(),
            path_patterns: default_path_patterns(),
            secret_patterns: default_secret_patterns(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
        }
    }
}

impl HistoryConfig {
    /// Location of the history log for a project; relative paths resolve
    /// against `project_root`.
    pub fn resolve(&self, project_root: &Path) -> PathBuf {
        let path = Path::new(&self.path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            project_root.join(path)
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::AtlasError::Config(format!("Failed to parse config: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values no run could work with
    pub fn validate(&self) -> crate::Result<()> {
        if self.renamer.same_spot_m < 0.0 {
            return Err(crate::AtlasError::Config("renamer.same_spot_m must not be negative".to_string()));
        }
        if self.labeler.api_key_env.trim().is_empty() {
            return Err(crate::AtlasError::Config("labeler.api_key_env must name a variable".to_string()));
        }
        for district in &self.districts {
            if district.sets.is_empty() {
                return Err(crate::AtlasError::Config(format!("District '{}' has no photo sets", district.name)));
            }
        }
        Ok(())
    }

    /// Look up a district pipeline by name (case-insensitive)
    pub fn district(&self, name: &str) -> Option<&DistrictConfig> {
        self.districts.iter().find(|d| d.name.eq_ignore_ascii_case(name))
    }
}
