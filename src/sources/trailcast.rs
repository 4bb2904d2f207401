//! TrailCast feed adapter.
//!
//! Wire contract: `GET {base}/api/reports/live?lat=..&lon=..` returning
//! reports that carry an RFC3339 *expiry* instead of a creation time. The
//! adapter inverts it: creation = expiry minus the uniform validity window,
//! so TrailCast targets age on the same clock as every other feed.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::domain::{GeoPoint, Sighting, SpeciesId};
use crate::error::Result;

use super::SightingSource;

const DEFAULT_BASE_URL: &str = "https://trailcast.net";

#[derive(Debug, Deserialize)]
struct TrailcastResponse {
    reports: Vec<TrailcastReport>,
}

#[derive(Debug, Deserialize)]
struct TrailcastReport {
    latitude: f64,
    longitude: f64,
    species_id: u16,
    expires_at: DateTime<Utc>,
}

pub struct TrailcastSource {
    http: Client,
    base_url: Url,
    validity: Duration,
}

impl TrailcastSource {
    pub fn new(http: Client, base_url: Option<&str>, validity: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url.unwrap_or(DEFAULT_BASE_URL))?;
        Ok(Self {
            http,
            base_url,
            validity,
        })
    }
}

fn convert(response: TrailcastResponse, validity: Duration) -> Vec<Sighting> {
    response
        .reports
        .into_iter()
        .map(|report| Sighting {
            species: SpeciesId(report.species_id),
            position: GeoPoint::new(report.latitude, report.longitude),
            reported_at: report.expires_at - validity,
        })
        .collect()
}

#[async_trait]
impl SightingSource for TrailcastSource {
    fn name(&self) -> &'static str {
        "trailcast"
    }

    async fn fetch(&self, center: GeoPoint) -> Result<Vec<Sighting>> {
        let url = self.base_url.join("/api/reports/live")?;
        let response = self
            .http
            .get(url)
            .query(&[
                ("lat", center.latitude.to_string()),
                ("lon", center.longitude.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let payload: TrailcastResponse = response.json().await?;
        Ok(convert(payload, self.validity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_is_expiry_minus_validity_window() {
        let payload: TrailcastResponse = serde_json::from_str(
            r#"{
                "reports": [
                    {
                        "latitude": 51.5074,
                        "longitude": -0.1278,
                        "species_id": 21,
                        "expires_at": "2026-08-01T12:15:00Z"
                    }
                ]
            }"#,
        )
        .unwrap();

        let sightings = convert(payload, Duration::minutes(15));
        assert_eq!(sightings.len(), 1);
        assert_eq!(sightings[0].species, SpeciesId(21));
        assert_eq!(
            sightings[0].reported_at,
            "2026-08-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn rejects_malformed_expiry() {
        let parsed: std::result::Result<TrailcastResponse, _> = serde_json::from_str(
            r#"{"reports": [{"latitude": 1.0, "longitude": 2.0, "species_id": 3, "expires_at": "not-a-time"}]}"#,
        );
        assert!(parsed.is_err());
    }
}
