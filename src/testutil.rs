// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Fixtures for tests: small JPEGs with hand-built EXIF blocks

use exif::experimental::Writer;
use exif::{Field, In, Rational, Tag, Value};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// EXIF content to embed in a generated test photo
#[derive(Default, Clone)]
pub struct ExifSpec {
    pub datetime: Option<&'static str>,
    pub gps: Option<(f64, f64)>,
}

impl ExifSpec {
    pub fn at(datetime: &'static str) -> Self {
        Self { datetime: Some(datetime), gps: None }
    }

    pub fn with_gps(mut self, lat: f64, lon: f64) -> Self {
        self.gps = Some((lat, lon));
        self
    }
}

/// Encode a tiny solid-colour JPEG
pub fn plain_jpeg() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(8, 8, image::Rgb([200, 120, 40]));
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, image::ImageFormat::Jpeg)
        .unwrap();
    buf.into_inner()
}

fn dms(value: f64) -> Vec<Rational> {
    let value = value.abs();
    let deg = value.trunc();
    let min = ((value - deg) * 60.0).trunc();
    let sec = (value - deg - min / 60.0) * 3600.0;
    vec![
        Rational { num: deg as u32, denom: 1 },
        Rational { num: min as u32, denom: 1 },
        Rational { num: (sec * 10_000.0).round() as u32, denom: 10_000 },
    ]
}

/// Build a TIFF structure holding the requested fields
pub fn tiff_block(tags: &ExifSpec) -> Vec<u8> {
    let mut fields = Vec::new();
    if let Some(dt) = tags.datetime {
        fields.push(Field {
            tag: Tag::DateTimeOriginal,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![dt.as_bytes().to_vec()]),
        });
    }
    if let Some((lat, lon)) = tags.gps {
        let lat_ref = if lat < 0.0 { "S" } else { "N" };
        let lon_ref = if lon < 0.0 { "W" } else { "E" };
        fields.push(Field {
            tag: Tag::GPSLatitudeRef,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![lat_ref.as_bytes().to_vec()]),
        });
        fields.push(Field { tag: Tag::GPSLatitude, ifd_num: In::PRIMARY, value: Value::Rational(dms(lat)) });
        fields.push(Field {
            tag: Tag::GPSLongitudeRef,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![lon_ref.as_bytes().to_vec()]),
        });
        fields.push(Field { tag: Tag::GPSLongitude, ifd_num: In::PRIMARY, value: Value::Rational(dms(lon)) });
    }
    if fields.is_empty() {
        fields.push(Field {
            tag: Tag::Make,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![b"TestCam".to_vec()]),
        });
    }

    let mut writer = Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    let mut buf = Cursor::new(Vec::new());
    writer.write(&mut buf, false).unwrap();
    buf.into_inner()
}

/// Insert an APP1 Exif segment right after the SOI marker
pub fn splice_app1(jpeg: &[u8], tiff: &[u8]) -> Vec<u8> {
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    let payload_len = 6 + tiff.len() + 2;
    let mut out = Vec::with_capacity(jpeg.len() + payload_len + 2);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&(payload_len as u16).to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(tiff);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// Write a JPEG with the given EXIF content into `dir`
pub fn write_photo(dir: &Path, name: &str, tags: &ExifSpec) -> PathBuf {
    let bytes = splice_app1(&plain_jpeg(), &tiff_block(tags));
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Write a JPEG whose APP1 segment claims to be EXIF but is garbage
pub fn write_corrupt_photo(dir: &Path, name: &str) -> PathBuf {
    let garbage = b"II*\0\xff\xff\xff\x7f\x00\x00";
    let bytes = splice_app1(&plain_jpeg(), garbage);
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Sorted file names of a directory, hidden files excluded
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();
    names
}
