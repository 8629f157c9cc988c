// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Reverse geocoding through a Nominatim-compatible endpoint

use reqwest::Client;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::GeocodeConfig;
use crate::renamer::slugify_place;
use crate::scanner::{GeoPoint, PhotoRecord, UNKNOWN_PLACE};
use crate::{AtlasError, Result};

/// Address keys tried in order when naming a place
const PLACE_KEYS: &[&str] = &[
    "park",
    "road",
    "pedestrian",
    "suburb",
    "neighbourhood",
    "city_district",
    "city",
];

/// A resolved place
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub address: String,
    pub slug: String,
}

impl Place {
    pub fn unknown() -> Self {
        Self {
            address: String::new(),
            slug: UNKNOWN_PLACE.to_string(),
        }
    }
}

#[derive(Deserialize, Default)]
struct ReverseResponse {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: HashMap<String, serde_json::Value>,
}

impl ReverseResponse {
    fn into_place(self) -> Place {
        let from_address = PLACE_KEYS.iter().find_map(|key| {
            self.address
                .get(*key)
                .and_then(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
        });
        let place = from_address.or_else(|| self.name.clone().filter(|n| !n.trim().is_empty()));

        Place {
            address: self.display_name.unwrap_or_default(),
            slug: place.map(|p| slugify_place(&p)).unwrap_or_else(|| UNKNOWN_PLACE.to_string()),
        }
    }
}

/// Reverse geocoding client
pub struct Geocoder {
    client: Client,
    url: String,
    delay: Duration,
}

impl Geocoder {
    /// Create a client from configuration
    pub fn new(config: &GeocodeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| AtlasError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            delay: Duration::from_millis(config.delay_ms),
        })
    }

    /// Resolve one coordinate to an address and place slug
    pub async fn reverse(&self, point: GeoPoint) -> Result<Place> {
        debug!("Reverse geocoding {:.6},{:.6}", point.lat, point.lon);

        let response = self.client
            .get(&self.url)
            .query(&[
                ("lat", point.lat.to_string()),
                ("lon", point.lon.to_string()),
                ("format", "jsonv2".to_string()),
                ("addressdetails", "1".to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AtlasError::Status {
                status: response.status().as_u16(),
                message: "reverse geocoding failed".to_string(),
            });
        }

        let body: ReverseResponse = response.json().await?;
        Ok(body.into_place())
    }

    /// Geocode one representative per location group and copy the place to
    /// every member. Returns the number of groups that resolved to a place.
    pub async fn geocode_groups(&self, records: &mut [PhotoRecord]) -> usize {
        let mut anchors: BTreeMap<usize, GeoPoint> = BTreeMap::new();
        for rec in records.iter() {
            if let Some(point) = rec.coords {
                anchors.entry(rec.location_group).or_insert(point);
            }
        }

        let mut resolved = 0;
        let mut places: HashMap<usize, Place> = HashMap::new();
        for (i, (group, point)) in anchors.iter().enumerate() {
            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let place = match self.reverse(*point).await {
                Ok(place) => place,
                Err(e) => {
                    warn!("Reverse geocoding failed for group {}: {}", group, e);
                    Place::unknown()
                }
            };
            if place.slug != UNKNOWN_PLACE {
                resolved += 1;
            }
            places.insert(*group, place);
        }

        for rec in records.iter_mut() {
            if let Some(place) = places.get(&rec.location_group) {
                rec.address = place.address.clone();
                rec.place_slug = place.slug.clone();
            }
        }

        info!("Geocoded groups: {}/{}", resolved, anchors.len());
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Place {
        serde_json::from_str::<ReverseResponse>(json).unwrap().into_place()
    }

    #[test]
    fn test_place_prefers_park() {
        let place = parse(r#"{
            "display_name": "Hatsinanpuisto, Leppävaara, Espoo",
            "name": "Something",
            "address": { "road": "Hatsinanpolku", "park": "Hatsinanpuisto", "city": "Espoo" }
        }"#);
        assert_eq!(place.slug, "hatsinanpuisto");
        assert_eq!(place.address, "Hatsinanpuisto, Leppävaara, Espoo");
    }

    #[test]
    fn test_place_falls_back_to_name() {
        let place = parse(r#"{ "name": "Iso Omena", "address": { "postcode": "02230" } }"#);
        assert_eq!(place.slug, "iso_omena");
        assert_eq!(place.address, "");
    }

    #[test]
    fn test_place_unknown_when_empty() {
        let place = parse(r#"{ "error": "Unable to geocode" }"#);
        assert_eq!(place, Place::unknown());
    }

    #[tokio::test]
    async fn test_groups_without_gps_are_untouched() {
        let config = GeocodeConfig { delay_ms: 0, ..GeocodeConfig::default() };
        let geocoder = Geocoder::new(&config).unwrap();
        let mut records = vec![PhotoRecord::new(
            "x.jpg".into(),
            crate::scanner::PhotoMetadata::default(),
            None,
        )];
        assert_eq!(geocoder.geocode_groups(&mut records).await, 0);
        assert_eq!(records[0].place_slug, UNKNOWN_PLACE);
    }
}
