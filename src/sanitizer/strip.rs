// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Metadata removal for images in a deploy package

use image::ImageFormat;
use std::io::Cursor;
use std::path::Path;

use crate::{AtlasError, Result};

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const COM: u8 = 0xFE;
const APP0: u8 = 0xE0;
const APP2: u8 = 0xE2;
const APP14: u8 = 0xEE;
const APP15: u8 = 0xEF;

/// Keep segments that only describe how to decode the pixels: colour
/// profiles and the Adobe colour transform flag.
fn keep_app_segment(marker: u8, payload: &[u8]) -> bool {
    match marker {
        APP0 => true,
        APP2 => payload.starts_with(b"ICC_PROFILE\0"),
        APP14 => payload.starts_with(b"Adobe"),
        _ => false,
    }
}

/// Copy entropy-coded scan data starting at `start`. Stuffed bytes and
/// restart markers stay in place; returns the offset of the next marker.
fn copy_scan_data(data: &[u8], start: usize, out: &mut Vec<u8>) -> usize {
    let mut i = start;
    while i < data.len() {
        if data[i] != 0xFF {
            out.push(data[i]);
            i += 1;
            continue;
        }
        match data.get(i + 1) {
            Some(0x00) | Some(0xD0..=0xD7) => {
                out.extend_from_slice(&data[i..i + 2]);
                i += 2;
            }
            Some(0xFF) => i += 1,
            _ => return i,
        }
    }
    i
}

/// Remove APP1..APP15 and COM segments from a JPEG without re-encoding it.
///
/// Scan data is copied byte for byte. Segments between progressive scans
/// are filtered like header segments, and output ends at the first
/// end-of-image marker, so appended images (MPF gain maps, thumbnails)
/// never reach the copy.
pub fn strip_jpeg_metadata(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != SOI {
        return Err(AtlasError::MalformedImage("missing JPEG start marker".to_string()));
    }

    let mut out = Vec::with_capacity(data.len());
    out.extend_from_slice(&data[..2]);
    let mut i = 2;
    let mut seen_scan = false;

    while i < data.len() {
        if data[i] != 0xFF {
            return Err(AtlasError::MalformedImage(format!("expected marker at offset {}", i)));
        }
        // Fill bytes may precede a marker
        let mut m = i + 1;
        while m < data.len() && data[m] == 0xFF {
            m += 1;
        }
        if m >= data.len() {
            break;
        }
        let marker = data[m];

        match marker {
            EOI => {
                out.extend_from_slice(&[0xFF, EOI]);
                return Ok(out);
            }
            0x01 | 0xD0..=0xD7 => {
                out.extend_from_slice(&[0xFF, marker]);
                i = m + 1;
                continue;
            }
            _ => {}
        }

        if m + 3 > data.len() {
            return Err(AtlasError::MalformedImage("truncated segment header".to_string()));
        }
        let len = u16::from_be_bytes([data[m + 1], data[m + 2]]) as usize;
        let end = m + 1 + len;
        if len < 2 || end > data.len() {
            return Err(AtlasError::MalformedImage(format!("bad segment length at offset {}", m)));
        }

        if marker == SOS {
            out.push(0xFF);
            out.extend_from_slice(&data[m..end]);
            seen_scan = true;
            i = copy_scan_data(data, end, &mut out);
            continue;
        }

        let payload = &data[m + 3..end];
        let drop = marker == COM || ((APP0..=APP15).contains(&marker) && !keep_app_segment(marker, payload));
        if !drop {
            out.push(0xFF);
            out.extend_from_slice(&data[m..end]);
        }
        i = end;
    }

    let reason = if seen_scan { "missing end-of-image marker" } else { "no image data" };
    Err(AtlasError::MalformedImage(reason.to_string()))
}

/// Decode and re-encode an image in its own format, which drops any
/// metadata the file carried.
pub fn reencode_image(data: &[u8], format: ImageFormat) -> Result<Vec<u8>> {
    let img = image::load_from_memory_with_format(data, format)?;
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, format)?;
    Ok(buffer.into_inner())
}

/// Strip metadata from an image file's bytes, choosing the method by extension
pub fn strip_image(path: &Path, data: &[u8]) -> Result<Vec<u8>> {
    let format = ImageFormat::from_path(path)?;
    match format {
        ImageFormat::Jpeg => strip_jpeg_metadata(data),
        other => reencode_image(data, other),
    }
}
