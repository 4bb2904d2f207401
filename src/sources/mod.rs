//! Sighting feeds: one adapter per upstream provider.
//!
//! Every adapter maps its provider's wire schema and time semantics into the
//! canonical [`Sighting`], so the rest of the engine sees a uniform validity
//! window. Provider vocabulary never leaves its adapter module.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use reqwest::Client;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::domain::{GeoPoint, Sighting};
use crate::error::Result;

pub mod fieldpin;
pub mod spotmesh;
pub mod trailcast;

pub use fieldpin::FieldpinSource;
pub use spotmesh::SpotmeshSource;
pub use trailcast::TrailcastSource;

/// One upstream sighting feed.
#[async_trait]
pub trait SightingSource: Send + Sync {
    /// Short provider name used in logs.
    fn name(&self) -> &'static str;

    /// Query the feed around a center position.
    async fn fetch(&self, center: GeoPoint) -> Result<Vec<Sighting>>;
}

/// Fetch with per-source failure isolation: any transport, parse or schema
/// error is logged and converted to an empty result so one feed can never
/// abort a refresh cycle.
pub async fn fetch_soft(source: &dyn SightingSource, center: GeoPoint) -> Vec<Sighting> {
    match source.fetch(center).await {
        Ok(sightings) => {
            debug!(
                source = source.name(),
                count = sightings.len(),
                "sighting fetch complete"
            );
            sightings
        }
        Err(e) => {
            warn!(
                source = source.name(),
                error = %e,
                "sighting fetch failed, treating as empty"
            );
            Vec::new()
        }
    }
}

/// Build the enabled sources from configuration, sharing one HTTP client.
pub fn build_sources(config: &AppConfig) -> Result<Vec<Arc<dyn SightingSource>>> {
    let http = Client::new();
    let validity = Duration::seconds(config.pursuit.validity_window_secs as i64);
    let mut sources: Vec<Arc<dyn SightingSource>> = Vec::new();

    if config.sources.spotmesh.enabled {
        sources.push(Arc::new(SpotmeshSource::new(
            http.clone(),
            config.sources.spotmesh.base_url.as_deref(),
        )?));
    }
    if config.sources.trailcast.enabled {
        sources.push(Arc::new(TrailcastSource::new(
            http.clone(),
            config.sources.trailcast.base_url.as_deref(),
            validity,
        )?));
    }
    if config.sources.fieldpin.enabled {
        sources.push(Arc::new(FieldpinSource::new(
            http.clone(),
            config.sources.fieldpin.base_url.as_deref(),
            config.sources.fieldpin.scan_offset_deg,
        )?));
    }

    Ok(sources)
}
