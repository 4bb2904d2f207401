//! FieldPin feed adapter.
//!
//! Wire contract: bounding-box query
//! `GET {base}/v1/pins?ne_lat=..&ne_lon=..&sw_lat=..&sw_lon=..` where the box
//! is the scan offset around the center. Pins report their age in seconds;
//! creation = fetch time minus age.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::domain::{GeoPoint, Sighting, SpeciesId};
use crate::error::Result;

use super::SightingSource;

const DEFAULT_BASE_URL: &str = "https://fieldpin.app";

#[derive(Debug, Deserialize)]
struct FieldpinResponse {
    pins: Vec<FieldpinPin>,
}

#[derive(Debug, Deserialize)]
struct FieldpinPin {
    pos: FieldpinPos,
    kind: u16,
    age_secs: u64,
}

#[derive(Debug, Deserialize)]
struct FieldpinPos {
    lat: f64,
    lon: f64,
}

pub struct FieldpinSource {
    http: Client,
    base_url: Url,
    scan_offset_deg: f64,
}

impl FieldpinSource {
    pub fn new(http: Client, base_url: Option<&str>, scan_offset_deg: f64) -> Result<Self> {
        let base_url = Url::parse(base_url.unwrap_or(DEFAULT_BASE_URL))?;
        Ok(Self {
            http,
            base_url,
            scan_offset_deg,
        })
    }
}

fn convert(response: FieldpinResponse, fetched_at: DateTime<Utc>) -> Vec<Sighting> {
    response
        .pins
        .into_iter()
        .map(|pin| Sighting {
            species: SpeciesId(pin.kind),
            position: GeoPoint::new(pin.pos.lat, pin.pos.lon),
            reported_at: fetched_at - Duration::seconds(pin.age_secs as i64),
        })
        .collect()
}

#[async_trait]
impl SightingSource for FieldpinSource {
    fn name(&self) -> &'static str {
        "fieldpin"
    }

    async fn fetch(&self, center: GeoPoint) -> Result<Vec<Sighting>> {
        let url = self.base_url.join("/v1/pins")?;
        let offset = self.scan_offset_deg;
        let response = self
            .http
            .get(url)
            .query(&[
                ("ne_lat", (center.latitude + offset).to_string()),
                ("ne_lon", (center.longitude + offset).to_string()),
                ("sw_lat", (center.latitude - offset).to_string()),
                ("sw_lon", (center.longitude - offset).to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let payload: FieldpinResponse = response.json().await?;
        Ok(convert(payload, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_is_fetch_time_minus_age() {
        let payload: FieldpinResponse = serde_json::from_str(
            r#"{
                "pins": [
                    {"pos": {"lat": 35.6762, "lon": 139.6503}, "kind": 8, "age_secs": 120}
                ]
            }"#,
        )
        .unwrap();

        let fetched_at = "2026-08-01T09:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let sightings = convert(payload, fetched_at);
        assert_eq!(sightings.len(), 1);
        assert_eq!(sightings[0].species, SpeciesId(8));
        assert_eq!(sightings[0].reported_at, fetched_at - Duration::seconds(120));
    }

    #[test]
    fn rejects_missing_position() {
        let parsed: std::result::Result<FieldpinResponse, _> =
            serde_json::from_str(r#"{"pins": [{"kind": 8, "age_secs": 10}]}"#);
        assert!(parsed.is_err());
    }
}
