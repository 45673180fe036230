//! ## Cleaning Configuration
//!
//! All constants used by the pipeline (service-region box, zone table, fare schedule,
//! plausibility thresholds, calendar rules and exclusion sample sizes) live in
//! [`CleaningConfig`]. The defaults reproduce the reference behavior; any of them can be
//! overridden from a TOML file, where absent keys keep their default value.
//!
//! ```rust
//! use trip_cleaner::settings::CleaningConfig;
//!
//! let config = CleaningConfig::from_toml_str(
//!     r#"
//!     [fares]
//!     base_fare = 3.0
//!
//!     [plausibility]
//!     max_speed_kmh = 100.0
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.fares.base_fare, 3.0);
//! assert_eq!(config.fares.per_km_rate, 2.5);
//! assert_eq!(config.plausibility.max_speed_kmh, 100.0);
//! ```

use crate::exceptions::{TripCleanerError, TripCleanerResult};
use serde::Deserialize;
use std::path::Path;

/// An inclusive latitude/longitude rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    pub const fn new(
        (min_latitude, max_latitude): (f64, f64),
        (min_longitude, max_longitude): (f64, f64),
    ) -> Self {
        Self {
            min_latitude,
            max_latitude,
            min_longitude,
            max_longitude,
        }
    }

    /// Returns true if the point lies inside the box (edges included).
    pub fn contains(&self, longitude: f64, latitude: f64) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&latitude)
            && (self.min_longitude..=self.max_longitude).contains(&longitude)
    }

    fn validate(&self, what: &str) -> TripCleanerResult<()> {
        let values = [
            self.min_latitude,
            self.max_latitude,
            self.min_longitude,
            self.max_longitude,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(TripCleanerError::InvalidParameter(format!(
                "{}: bounds must be finite",
                what
            )));
        }
        if self.min_latitude > self.max_latitude || self.min_longitude > self.max_longitude {
            return Err(TripCleanerError::InvalidParameter(format!(
                "{}: lower bound exceeds upper bound",
                what
            )));
        }
        Ok(())
    }
}

/// Approximate service region (New York City).
pub const SERVICE_REGION: BoundingBox = BoundingBox::new((40.5, 41.0), (-74.5, -73.5));

/// A named rectangular zone.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Zone {
    pub name: String,
    #[serde(flatten)]
    pub area: BoundingBox,
}

impl Zone {
    pub fn new(name: &str, latitude: (f64, f64), longitude: (f64, f64)) -> Self {
        Self {
            name: name.to_string(),
            area: BoundingBox::new(latitude, longitude),
        }
    }
}

/// The zone table used when none is configured. Order matters: the first match wins.
pub fn default_zones() -> Vec<Zone> {
    vec![
        Zone::new("midtown", (40.74, 40.77), (-74.00, -73.97)),
        Zone::new("downtown", (40.70, 40.73), (-74.02, -73.99)),
        Zone::new("uptown", (40.77, 40.82), (-73.98, -73.93)),
        Zone::new("brooklyn", (40.60, 40.70), (-74.02, -73.90)),
        Zone::new("queens", (40.68, 40.78), (-73.95, -73.75)),
        Zone::new("bronx", (40.82, 40.90), (-73.93, -73.85)),
    ]
}

/// Fare schedule used to estimate trip fares.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct FareSchedule {
    pub base_fare: f64,
    pub per_km_rate: f64,
    pub per_minute_rate: f64,
}

impl Default for FareSchedule {
    fn default() -> Self {
        Self {
            base_fare: 2.50,
            per_km_rate: 2.50,
            per_minute_rate: 0.50,
        }
    }
}

/// Thresholds applied by the plausibility filter.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlausibilityBounds {
    pub max_speed_kmh: f64,
    pub max_passengers: i64,
    /// Unset by default; when set, longer trips are excluded as "invalid distance".
    pub max_distance_km: Option<f64>,
}

impl Default for PlausibilityBounds {
    fn default() -> Self {
        Self {
            max_speed_kmh: 120.0,
            max_passengers: 9,
            max_distance_km: None,
        }
    }
}

/// Calendar rules for the temporal features.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TemporalRules {
    pub peak_hours: Vec<i32>,
    /// ISO-style weekday numbers (0 = Monday .. 6 = Sunday).
    pub weekend_days: Vec<i32>,
}

impl Default for TemporalRules {
    fn default() -> Self {
        Self {
            peak_hours: vec![7, 8, 9, 16, 17, 18],
            weekend_days: vec![5, 6],
        }
    }
}

/// How many excluded rows each filter writes to the exclusion log.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SampleLimits {
    pub missing_values: usize,
    pub invalid_coordinates: usize,
    pub plausibility: usize,
}

impl Default for SampleLimits {
    fn default() -> Self {
        Self {
            missing_values: 10,
            invalid_coordinates: 10,
            plausibility: 20,
        }
    }
}

/// Complete configuration of a cleaning run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    pub geo_bounds: BoundingBox,
    pub zones: Vec<Zone>,
    pub fares: FareSchedule,
    pub plausibility: PlausibilityBounds,
    pub temporal: TemporalRules,
    pub earth_radius_km: f64,
    pub sample_limits: SampleLimits,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            geo_bounds: SERVICE_REGION,
            zones: default_zones(),
            fares: FareSchedule::default(),
            plausibility: PlausibilityBounds::default(),
            temporal: TemporalRules::default(),
            earth_radius_km: 6371.0,
            sample_limits: SampleLimits::default(),
        }
    }
}

impl CleaningConfig {
    /// Parses a configuration from TOML text and validates it.
    pub fn from_toml_str(text: &str) -> TripCleanerResult<Self> {
        let config: CleaningConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration from a TOML file and validates it.
    pub fn from_toml_file(path: impl AsRef<Path>) -> TripCleanerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks that every constant is usable.
    pub fn validate(&self) -> TripCleanerResult<()> {
        self.geo_bounds.validate("geo_bounds")?;
        for zone in &self.zones {
            if zone.name.trim().is_empty() {
                return Err(TripCleanerError::InvalidParameter(
                    "zone name cannot be empty".to_string(),
                ));
            }
            zone.area.validate(&format!("zone '{}'", zone.name))?;
        }

        let rates = [
            ("base_fare", self.fares.base_fare),
            ("per_km_rate", self.fares.per_km_rate),
            ("per_minute_rate", self.fares.per_minute_rate),
        ];
        for (name, rate) in rates {
            if !rate.is_finite() || rate < 0.0 {
                return Err(TripCleanerError::InvalidParameter(format!(
                    "{} must be finite and non-negative, got {}",
                    name, rate
                )));
            }
        }

        if !(self.plausibility.max_speed_kmh > 0.0) {
            return Err(TripCleanerError::InvalidParameter(format!(
                "max_speed_kmh must be positive, got {}",
                self.plausibility.max_speed_kmh
            )));
        }
        if self.plausibility.max_passengers < 1 {
            return Err(TripCleanerError::InvalidParameter(format!(
                "max_passengers must be at least 1, got {}",
                self.plausibility.max_passengers
            )));
        }
        if let Some(max_distance) = self.plausibility.max_distance_km {
            if !(max_distance > 0.0) {
                return Err(TripCleanerError::InvalidParameter(format!(
                    "max_distance_km must be positive, got {}",
                    max_distance
                )));
            }
        }

        if let Some(hour) = self
            .temporal
            .peak_hours
            .iter()
            .find(|h| !(0..=23).contains(*h))
        {
            return Err(TripCleanerError::InvalidParameter(format!(
                "peak hour {} is outside 0..=23",
                hour
            )));
        }
        if let Some(day) = self
            .temporal
            .weekend_days
            .iter()
            .find(|d| !(0..=6).contains(*d))
        {
            return Err(TripCleanerError::InvalidParameter(format!(
                "weekend day {} is outside 0..=6",
                day
            )));
        }

        if !(self.earth_radius_km > 0.0) || !self.earth_radius_km.is_finite() {
            return Err(TripCleanerError::InvalidParameter(format!(
                "earth_radius_km must be positive, got {}",
                self.earth_radius_km
            )));
        }
        Ok(())
    }
}
