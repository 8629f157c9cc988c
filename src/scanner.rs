// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Photo folder scanning and EXIF metadata extraction

use chrono::{DateTime, Local, NaiveDateTime};
use exif::{In, Reader, Tag, Value};
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::{AtlasError, Result};

/// Extensions treated as photos (compared case-insensitively)
pub const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// Prefix of the temporary names used while renaming
pub const TEMP_PREFIX: &str = ".tmp_ren_";

/// Place slug used when no place is known
pub const UNKNOWN_PLACE: &str = "unknown_place";

/// EXIF capture time format
const EXIF_DATETIME: &str = "%Y:%m:%d %H:%M:%S";

/// A WGS84 coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon);
        valid.then_some(Self { lat, lon })
    }
}

/// Metadata embedded in a photo
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhotoMetadata {
    pub captured_at: Option<NaiveDateTime>,
    pub coords: Option<GeoPoint>,
}

/// One photo flowing through rename, index and labeling
#[derive(Debug, Clone, Serialize)]
pub struct PhotoRecord {
    /// Current location on disk
    pub path: PathBuf,
    /// File name at scan time
    pub original_name: String,
    /// Capture time from EXIF
    pub captured_at: Option<NaiveDateTime>,
    /// Filesystem modification time, used for ordering when EXIF has no time
    pub modified_at: Option<NaiveDateTime>,
    pub coords: Option<GeoPoint>,
    pub address: String,
    pub place_slug: String,
    /// Zero-based location group id
    pub location_group: usize,
    /// One-based location sequence used in file names
    pub location_seq: usize,
    /// Position of the photo inside its location group
    pub duplicate_idx: usize,
    pub new_name: String,
}

impl PhotoRecord {
    pub fn new(path: PathBuf, metadata: PhotoMetadata, modified_at: Option<NaiveDateTime>) -> Self {
        let original_name = file_name(&path);
        Self {
            new_name: original_name.clone(),
            path,
            original_name,
            captured_at: metadata.captured_at,
            modified_at,
            coords: metadata.coords,
            address: String::new(),
            place_slug: UNKNOWN_PLACE.to_string(),
            location_group: 0,
            location_seq: 0,
            duplicate_idx: 0,
        }
    }

    /// EXIF capture time, else filesystem time
    pub fn effective_time(&self) -> Option<NaiveDateTime> {
        self.captured_at.or(self.modified_at)
    }

    /// Lower-cased extension including the dot
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default()
    }
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Check if a path looks like a photo this toolkit handles
pub fn is_photo(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(true);
    if hidden {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| PHOTO_EXTENSIONS.iter().any(|p| p.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Read capture time and GPS position from a photo's EXIF block
pub fn read_metadata(path: &Path) -> Result<PhotoMetadata> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let exif = Reader::new().read_from_container(&mut reader)?;

    let lat = gps_coord(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef);
    let lon = gps_coord(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef);
    let coords = match (lat, lon) {
        (Some(lat), Some(lon)) => GeoPoint::new(lat, lon),
        _ => None,
    };

    Ok(PhotoMetadata {
        captured_at: capture_time(&exif),
        coords,
    })
}

fn capture_time(exif: &exif::Exif) -> Option<NaiveDateTime> {
    [Tag::DateTimeOriginal, Tag::DateTime].iter().find_map(|&tag| {
        let field = exif.get_field(tag, In::PRIMARY)?;
        match field.value {
            Value::Ascii(ref vec) => {
                let raw = std::str::from_utf8(vec.first()?).ok()?;
                NaiveDateTime::parse_from_str(raw.trim_end_matches('\0').trim(), EXIF_DATETIME).ok()
            }
            _ => None,
        }
    })
}

/// Degrees/minutes/seconds rationals to signed decimal degrees
fn gps_coord(exif: &exif::Exif, coord_tag: Tag, ref_tag: Tag) -> Option<f64> {
    let coord = exif.get_field(coord_tag, In::PRIMARY)?;
    let reference = exif.get_field(ref_tag, In::PRIMARY)?;

    let Value::Rational(ref parts) = coord.value else {
        return None;
    };
    if parts.len() != 3 {
        return None;
    }
    let decimal = parts[0].to_f64() + parts[1].to_f64() / 60.0 + parts[2].to_f64() / 3600.0;

    let hemisphere = match reference.value {
        Value::Ascii(ref vec) => vec.first().and_then(|s| s.first()).copied(),
        _ => None,
    }?;
    match hemisphere {
        b'S' | b's' | b'W' | b'w' => Some(-decimal),
        _ => Some(decimal),
    }
}

fn modified_time(path: &Path) -> Option<NaiveDateTime> {
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(DateTime::<Local>::from(modified).naive_local())
}

/// Scan one photo. Metadata problems never fail the photo.
pub fn scan_photo(path: &Path) -> PhotoRecord {
    let metadata = match read_metadata(path) {
        Ok(m) => m,
        Err(AtlasError::Exif(exif::Error::NotFound(_))) => {
            debug!("No EXIF block in {:?}", path);
            PhotoMetadata::default()
        }
        Err(e) => {
            warn!("Unreadable metadata in {:?}: {}, falling back to file time", path, e);
            PhotoMetadata::default()
        }
    };
    PhotoRecord::new(path.to_path_buf(), metadata, modified_time(path))
}

/// Scan a folder (non-recursive) for photos, sorted by file name
pub fn scan_folder(dir: &Path) -> Result<Vec<PhotoRecord>> {
    if !dir.is_dir() {
        return Err(AtlasError::MissingInput(dir.to_path_buf()));
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                if path.is_file() && is_photo(&path) {
                    paths.push(path);
                }
            }
            Err(e) => warn!("Skipping unreadable entry in {:?}: {}", dir, e),
        }
    }
    paths.sort();

    let records: Vec<PhotoRecord> = paths.iter().map(|p| scan_photo(p)).collect();
    let with_time = records.iter().filter(|r| r.captured_at.is_some()).count();
    let with_gps = records.iter().filter(|r| r.coords.is_some()).count();
    info!(
        "Scanned {} photos in {:?} ({} with capture time, {} with GPS)",
        records.len(),
        dir,
        with_time,
        with_gps
    );

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{write_corrupt_photo, write_photo, ExifSpec};

    #[test]
    fn test_is_photo() {
        assert!(is_photo(Path::new("a/IMG_1.JPG")));
        assert!(is_photo(Path::new("b.jpeg")));
        assert!(!is_photo(Path::new("c.png")));
        assert!(!is_photo(Path::new(".tmp_ren_abc.jpg")));
        assert!(!is_photo(Path::new("noext")));
    }

    #[test]
    fn test_geopoint_rejects_out_of_range() {
        assert!(GeoPoint::new(60.2, 24.6).is_some());
        assert!(GeoPoint::new(91.0, 0.0).is_none());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_none());
    }

    #[test]
    fn test_reads_time_and_gps() {
        let dir = tempfile::tempdir().unwrap();
        let tags = ExifSpec::at("2024:05:01 10:15:30").with_gps(60.1501, -24.6502);
        let path = write_photo(dir.path(), "a.jpg", &tags);

        let meta = read_metadata(&path).unwrap();
        assert_eq!(
            meta.captured_at,
            NaiveDateTime::parse_from_str("2024-05-01 10:15:30", "%Y-%m-%d %H:%M:%S").ok()
        );
        let coords = meta.coords.unwrap();
        assert!((coords.lat - 60.1501).abs() < 1e-5);
        assert!((coords.lon + 24.6502).abs() < 1e-5);
    }

    #[test]
    fn test_corrupt_exif_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_corrupt_photo(dir.path(), "broken.jpg");

        let record = scan_photo(&path);
        assert!(record.captured_at.is_none());
        assert!(record.coords.is_none());
        assert!(record.modified_at.is_some());
        assert_eq!(record.effective_time(), record.modified_at);
    }

    #[test]
    fn test_scan_folder_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        write_photo(dir.path(), "b.jpg", &ExifSpec::at("2024:01:01 00:00:00"));
        write_photo(dir.path(), "a.JPG", &ExifSpec::default());
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let records = scan_folder(dir.path()).unwrap();
        let names: Vec<_> = records.iter().map(|r| r.original_name.as_str()).collect();
        assert_eq!(names, vec!["a.JPG", "b.jpg"]);
        assert_eq!(records[0].extension(), ".jpg");
        assert_eq!(records[0].place_slug, UNKNOWN_PLACE);
    }

    #[test]
    fn test_scan_missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(scan_folder(&missing), Err(AtlasError::MissingInput(_))));
    }
}
