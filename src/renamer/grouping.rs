// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Ordering and same-spot grouping of photo records

use std::cmp::Ordering;

use crate::scanner::{GeoPoint, PhotoRecord};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in metres
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let dphi = (b.lat - a.lat).to_radians();
    let dlambda = (b.lon - a.lon).to_radians();

    let h = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Parse `{prefix}_{seq}[-{dup}]_...` back into `(seq, dup)`
pub fn parse_renamed_stem(stem: &str, prefix: &str) -> Option<(usize, usize)> {
    let rest = stem.strip_prefix(prefix)?.strip_prefix('_')?;
    let (numbers, slug) = rest.split_once('_')?;
    if slug.is_empty() {
        return None;
    }
    let (seq, dup) = match numbers.split_once('-') {
        Some((seq, dup)) => (seq, Some(dup)),
        None => (numbers, None),
    };
    if seq.is_empty() || !seq.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let seq = seq.parse().ok()?;
    let dup = match dup {
        Some(d) if !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()) => d.parse().ok()?,
        Some(_) => return None,
        None => 0,
    };
    Some((seq, dup))
}

fn renamed_position(rec: &PhotoRecord, prefix: &str) -> Option<(usize, usize)> {
    let stem = rec.original_name.rsplit_once('.').map(|(s, _)| s).unwrap_or(&rec.original_name);
    parse_renamed_stem(stem, prefix)
}

/// Sort records by effective time, then by the position encoded in an earlier
/// generated name, then by name. Undated records go last.
///
/// Using the earlier position keeps photos with equal timestamps in the same
/// order across runs.
pub fn order_records(records: &mut [PhotoRecord], prefix: &str) {
    records.sort_by(|a, b| {
        let ta = a.effective_time();
        let tb = b.effective_time();
        let by_time = match (ta, tb) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_time
            .then_with(|| {
                let pa = renamed_position(a, prefix).unwrap_or((usize::MAX, usize::MAX));
                let pb = renamed_position(b, prefix).unwrap_or((usize::MAX, usize::MAX));
                pa.cmp(&pb)
            })
            .then_with(|| a.original_name.cmp(&b.original_name))
    });
}

/// Assign location groups, sequences and duplicate indices.
///
/// Records must already be ordered. A record with GPS joins the first group
/// whose anchor is within `same_spot_m`; a record without GPS always opens a
/// group of its own. Returns the number of groups.
pub fn assign_location_groups(records: &mut [PhotoRecord], same_spot_m: f64) -> usize {
    let mut anchors: Vec<Option<GeoPoint>> = Vec::new();
    let mut members: Vec<usize> = Vec::new();

    for rec in records.iter_mut() {
        let matched = rec.coords.and_then(|point| {
            anchors.iter().position(|anchor| {
                anchor.map(|a| haversine_m(point, a) <= same_spot_m).unwrap_or(false)
            })
        });
        let group = match matched {
            Some(group) => group,
            None => {
                anchors.push(rec.coords);
                members.push(0);
                anchors.len() - 1
            }
        };
        rec.location_group = group;
        rec.location_seq = group + 1;
        rec.duplicate_idx = members[group];
        members[group] += 1;
    }

    anchors.len()
}
