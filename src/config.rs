use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::domain::{GeoPoint, PolicyTable, PursuitPolicy, SpeciesId};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Species ids the engine is subscribed to
    pub watchlist: Vec<u16>,
    pub pursuit: PursuitConfig,
    /// Global default policy applied to species without an override
    #[serde(default)]
    pub policy: PursuitPolicy,
    /// Per-species policy overrides, keyed by species id
    #[serde(default)]
    pub overrides: HashMap<String, PursuitPolicy>,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PursuitConfig {
    /// Base travel speed in km/h (used when no policy boost applies)
    pub base_speed_kmh: f64,
    /// Minimum seconds between two full refresh cycles
    #[serde(default = "default_min_refresh_interval")]
    pub min_refresh_interval_secs: u64,
    /// Validity window applied to every sighting, seconds
    #[serde(default = "default_validity_window")]
    pub validity_window_secs: u64,
    /// Two live sightings of one species within this range are one target
    #[serde(default = "default_proximity_tolerance")]
    pub proximity_tolerance_m: f64,
    /// Match range for reconciling catches made outside the pipeline
    #[serde(default = "default_reconcile_tolerance")]
    pub reconcile_tolerance_m: f64,
    /// Remaining distance above which en-route primary actions may fire
    #[serde(default = "default_engage_threshold")]
    pub engage_threshold_m: f64,
    /// The pursuit loop fully engages every N-th invocation
    #[serde(default = "default_engage_stride")]
    pub engage_stride: u32,
    /// Fan out to the fallback location when it is farther than this
    #[serde(default = "default_fallback_distance")]
    pub fallback_distance_m: f64,
    /// Baseline-coverage location scanned in addition to the current position
    #[serde(default)]
    pub fallback_location: Option<LocationConfig>,
    /// Keep selecting targets until none are feasible
    #[serde(default = "default_true")]
    pub continue_until_exhausted: bool,
    /// Stay at the last destination instead of returning to the cycle origin
    #[serde(default)]
    pub remain_at_destination: bool,
    /// Master toggle for the pursuit loop (scans keep running regardless)
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Resource kind checked by the gate before pursuit entry
    #[serde(default = "default_resource_kind")]
    pub resource_kind: String,
    /// Minimum resource count required to enter the pursuit loop
    #[serde(default = "default_min_resources")]
    pub min_resources: u32,
    /// Upper bound on tracked entries; worst-ranked live entries are evicted
    #[serde(default = "default_max_tracked")]
    pub max_tracked: usize,
    /// Engine loop cadence: periodic refresh trigger, seconds
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    /// Engine loop cadence: pursuit invocation trigger, seconds
    #[serde(default = "default_pursuit_interval")]
    pub pursuit_interval_secs: u64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LocationConfig {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<LocationConfig> for GeoPoint {
    fn from(value: LocationConfig) -> Self {
        GeoPoint::new(value.latitude, value.longitude)
    }
}

fn default_min_refresh_interval() -> u64 {
    30
}

fn default_validity_window() -> u64 {
    900
}

fn default_proximity_tolerance() -> f64 {
    10.0
}

fn default_reconcile_tolerance() -> f64 {
    200.0
}

fn default_engage_threshold() -> f64 {
    50.0
}

fn default_engage_stride() -> u32 {
    3
}

fn default_fallback_distance() -> f64 {
    1_000.0
}

fn default_resource_kind() -> String {
    "capture_charge".to_string()
}

fn default_min_resources() -> u32 {
    10
}

fn default_max_tracked() -> usize {
    512
}

fn default_scan_interval() -> u64 {
    60
}

fn default_pursuit_interval() -> u64 {
    15
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub spotmesh: SourceEndpoint,
    #[serde(default)]
    pub trailcast: SourceEndpoint,
    #[serde(default)]
    pub fieldpin: FieldpinConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceEndpoint {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for SourceEndpoint {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldpinConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Half-width of the bounding box sent to the provider, degrees
    #[serde(default = "default_scan_offset")]
    pub scan_offset_deg: f64,
}

impl Default for FieldpinConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            scan_offset_deg: default_scan_offset(),
        }
    }
}

fn default_scan_offset() -> f64 {
    0.015
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for rolling daily log files; stdout only when unset
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("pursuit.base_speed_kmh", 7.2)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("QUARRY_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (QUARRY_PURSUIT__BASE_SPEED_KMH, etc.)
            .add_source(
                Environment::with_prefix("QUARRY")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Default configuration used by one-shot CLI commands and tests
    pub fn default_config() -> Self {
        Self {
            watchlist: vec![1, 2, 3],
            pursuit: PursuitConfig {
                base_speed_kmh: 7.2,
                min_refresh_interval_secs: default_min_refresh_interval(),
                validity_window_secs: default_validity_window(),
                proximity_tolerance_m: default_proximity_tolerance(),
                reconcile_tolerance_m: default_reconcile_tolerance(),
                engage_threshold_m: default_engage_threshold(),
                engage_stride: default_engage_stride(),
                fallback_distance_m: default_fallback_distance(),
                fallback_location: None,
                continue_until_exhausted: true,
                remain_at_destination: false,
                enabled: true,
                resource_kind: default_resource_kind(),
                min_resources: default_min_resources(),
                max_tracked: default_max_tracked(),
                scan_interval_secs: default_scan_interval(),
                pursuit_interval_secs: default_pursuit_interval(),
            },
            policy: PursuitPolicy::default(),
            overrides: HashMap::new(),
            sources: SourcesConfig {
                spotmesh: SourceEndpoint::default(),
                trailcast: SourceEndpoint::default(),
                fieldpin: FieldpinConfig::default(),
            },
            logging: LoggingConfig::default(),
        }
    }

    /// Build the policy table, parsing override keys into species ids
    pub fn policy_table(&self) -> crate::error::Result<PolicyTable> {
        let mut overrides = HashMap::new();
        for (key, policy) in &self.overrides {
            let species: u16 = key.parse().map_err(|_| {
                crate::error::QuarryError::Validation(format!(
                    "override key '{key}' is not a species id"
                ))
            })?;
            overrides.insert(SpeciesId(species), policy.clone());
        }
        Ok(PolicyTable::new(self.policy.clone(), overrides))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.watchlist.is_empty() {
            errors.push("watchlist must name at least one species".to_string());
        }

        if self.pursuit.base_speed_kmh <= 0.0 {
            errors.push("base_speed_kmh must be positive".to_string());
        }

        if self.pursuit.validity_window_secs == 0 {
            errors.push("validity_window_secs must be positive".to_string());
        }

        if self.pursuit.engage_stride == 0 {
            errors.push("engage_stride must be at least 1".to_string());
        }

        if self.pursuit.max_tracked == 0 {
            errors.push("max_tracked must be at least 1".to_string());
        }

        if self.pursuit.proximity_tolerance_m < 0.0 {
            errors.push("proximity_tolerance_m must not be negative".to_string());
        }

        if self.policy.boost_speed_kmh <= 0.0 && self.policy.allow_speed_boost {
            errors.push("boost_speed_kmh must be positive when the boost is allowed".to_string());
        }

        for (key, policy) in &self.overrides {
            if key.parse::<u16>().is_err() {
                errors.push(format!("override key '{key}' is not a species id"));
            }
            if policy.allow_speed_boost && policy.boost_speed_kmh <= 0.0 {
                errors.push(format!(
                    "override '{key}': boost_speed_kmh must be positive when the boost is allowed"
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
