//! SpotMesh feed adapter.
//!
//! Wire contract: `GET {base}/v2/sightings?lat=..&lon=..&radius_m=..`
//! returning a flat list with unix-second report timestamps.

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::domain::{GeoPoint, Sighting, SpeciesId};
use crate::error::Result;

use super::SightingSource;

const DEFAULT_BASE_URL: &str = "https://api.spotmesh.io";
const SCAN_RADIUS_M: u32 = 5_000;

#[derive(Debug, Deserialize)]
struct SpotmeshResponse {
    sightings: Vec<SpotmeshSighting>,
}

#[derive(Debug, Deserialize)]
struct SpotmeshSighting {
    lat: f64,
    lon: f64,
    species: u16,
    /// Unix seconds
    reported_at: i64,
}

pub struct SpotmeshSource {
    http: Client,
    base_url: Url,
}

impl SpotmeshSource {
    pub fn new(http: Client, base_url: Option<&str>) -> Result<Self> {
        let base_url = Url::parse(base_url.unwrap_or(DEFAULT_BASE_URL))?;
        Ok(Self { http, base_url })
    }
}

fn convert(response: SpotmeshResponse) -> Vec<Sighting> {
    response
        .sightings
        .into_iter()
        .filter_map(|item| {
            // Out-of-range timestamps are provider garbage; drop the item.
            let reported_at = DateTime::from_timestamp(item.reported_at, 0)?;
            Some(Sighting {
                species: SpeciesId(item.species),
                position: GeoPoint::new(item.lat, item.lon),
                reported_at,
            })
        })
        .collect()
}

#[async_trait]
impl SightingSource for SpotmeshSource {
    fn name(&self) -> &'static str {
        "spotmesh"
    }

    async fn fetch(&self, center: GeoPoint) -> Result<Vec<Sighting>> {
        let url = self.base_url.join("/v2/sightings")?;
        let response = self
            .http
            .get(url)
            .query(&[
                ("lat", center.latitude.to_string()),
                ("lon", center.longitude.to_string()),
                ("radius_m", SCAN_RADIUS_M.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let payload: SpotmeshResponse = response.json().await?;
        Ok(convert(payload))
    }
}
