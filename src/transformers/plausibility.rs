//! ## Plausibility filter
//!
//! [`PlausibilityFilter`] is the last validation pass. It drops every trip whose derived values
//! are physically implausible:
//!
//! - speed outside `(0, max_speed_kmh]`
//! - duration or distance not positive (and, when configured, distance above `max_distance_km`)
//! - passenger count outside `(0, max_passengers]`
//! - pickup or dropoff outside the service region (re-checked after derivation)
//!
//! For a bounded sample of the dropped trips, every violated condition is logged.

use crate::audit::{AuditEvent, ExclusionLog, ExclusionReason};
use crate::dataset::{
    DROPOFF_LATITUDE, DROPOFF_LONGITUDE, ID, PASSENGER_COUNT, PICKUP_LATITUDE, PICKUP_LONGITUDE,
    TRIP_DISTANCE_KM, TRIP_DURATION_SECONDS, TRIP_SPEED_KMH,
};
use crate::exceptions::{TripCleanerError, TripCleanerResult};
use crate::impl_stage;
use crate::settings::{BoundingBox, PlausibilityBounds};
use crate::transformers::geo_validation::trip_inside_region;
use crate::transformers::helpers::{
    all_of, count_matching, f64_values, i64_values, sample_rows, string_values, validate_columns,
    UNKNOWN_ID,
};
use datafusion::prelude::*;

pub const STAGE_NAME: &str = "plausibility filter";

/// The values of one trip that the plausibility rules look at.
#[derive(Debug, Clone, PartialEq)]
pub struct TripMetrics {
    pub speed_kmh: f64,
    pub duration_seconds: f64,
    pub distance_km: f64,
    pub passenger_count: i64,
    pub pickup: (f64, f64),
    pub dropoff: (f64, f64),
}

/// Returns every rule the trip violates, in a fixed order. An empty list means the trip passes.
pub fn violations(
    trip: &TripMetrics,
    bounds: &PlausibilityBounds,
    region: &BoundingBox,
) -> Vec<ExclusionReason> {
    let mut reasons = Vec::new();
    if !(trip.speed_kmh > 0.0 && trip.speed_kmh <= bounds.max_speed_kmh) {
        reasons.push(ExclusionReason::InvalidSpeed(trip.speed_kmh));
    }
    if !(trip.duration_seconds > 0.0) {
        reasons.push(ExclusionReason::InvalidDuration);
    }
    let too_far = bounds
        .max_distance_km
        .is_some_and(|max| trip.distance_km > max);
    if !(trip.distance_km > 0.0) || too_far {
        reasons.push(ExclusionReason::InvalidDistance);
    }
    if !(trip.passenger_count > 0 && trip.passenger_count <= bounds.max_passengers) {
        reasons.push(ExclusionReason::InvalidPassengerCount(trip.passenger_count));
    }
    let (pickup_lon, pickup_lat) = trip.pickup;
    let (dropoff_lon, dropoff_lat) = trip.dropoff;
    if !(region.contains(pickup_lon, pickup_lat) && region.contains(dropoff_lon, dropoff_lat)) {
        reasons.push(ExclusionReason::InvalidCoordinates);
    }
    reasons
}

const SAMPLE_COLUMNS: [&str; 9] = [
    ID,
    TRIP_SPEED_KMH,
    TRIP_DURATION_SECONDS,
    TRIP_DISTANCE_KM,
    PASSENGER_COUNT,
    PICKUP_LONGITUDE,
    PICKUP_LATITUDE,
    DROPOFF_LONGITUDE,
    DROPOFF_LATITUDE,
];

/// Drops trips with implausible derived values.
pub struct PlausibilityFilter {
    pub bounds: PlausibilityBounds,
    pub region: BoundingBox,
    pub sample_limit: usize,
}

impl PlausibilityFilter {
    pub fn new(bounds: PlausibilityBounds, region: BoundingBox, sample_limit: usize) -> Self {
        Self {
            bounds,
            region,
            sample_limit,
        }
    }

    /// Predicate that is true for plausible trips.
    pub fn plausible(&self) -> Expr {
        let mut rules = vec![
            col(TRIP_SPEED_KMH).gt(lit(0.0)),
            col(TRIP_SPEED_KMH).lt_eq(lit(self.bounds.max_speed_kmh)),
            col(TRIP_DURATION_SECONDS).gt(lit(0.0)),
            col(TRIP_DISTANCE_KM).gt(lit(0.0)),
            col(PASSENGER_COUNT).gt(lit(0_i64)),
            col(PASSENGER_COUNT).lt_eq(lit(self.bounds.max_passengers)),
            trip_inside_region(&self.region),
        ];
        if let Some(max_distance) = self.bounds.max_distance_km {
            rules.push(col(TRIP_DISTANCE_KM).lt_eq(lit(max_distance)));
        }
        all_of(rules)
    }

    async fn sampled_metrics(&self, df: &DataFrame) -> TripCleanerResult<Vec<(String, TripMetrics)>> {
        let batches = sample_rows(
            df,
            self.plausible().not(),
            &SAMPLE_COLUMNS,
            self.sample_limit,
        )
        .await?;

        let mut trips = Vec::new();
        for batch in &batches {
            let ids = string_values(batch.column(0))?;
            let speed = f64_values(batch.column(1))?;
            let duration = f64_values(batch.column(2))?;
            let distance = f64_values(batch.column(3))?;
            let passengers = i64_values(batch.column(4))?;
            let coords: Vec<Vec<Option<f64>>> = (5..9)
                .map(|i| f64_values(batch.column(i)))
                .collect::<TripCleanerResult<_>>()?;
            for row in 0..batch.num_rows() {
                let id = ids[row].clone().unwrap_or_else(|| UNKNOWN_ID.to_string());
                let metrics = TripMetrics {
                    speed_kmh: speed[row].unwrap_or(f64::NAN),
                    duration_seconds: duration[row].unwrap_or(f64::NAN),
                    distance_km: distance[row].unwrap_or(f64::NAN),
                    passenger_count: passengers[row].unwrap_or(0),
                    pickup: (
                        coords[0][row].unwrap_or(f64::NAN),
                        coords[1][row].unwrap_or(f64::NAN),
                    ),
                    dropoff: (
                        coords[2][row].unwrap_or(f64::NAN),
                        coords[3][row].unwrap_or(f64::NAN),
                    ),
                };
                trips.push((id, metrics));
            }
        }
        Ok(trips)
    }

    /// Logs the violated rules of a sample of the trips about to be removed, and the total.
    pub async fn inspect(&self, df: &DataFrame, log: &mut ExclusionLog) -> TripCleanerResult<()> {
        validate_columns(df, &SAMPLE_COLUMNS)?;
        let removed = count_matching(df, self.plausible().not()).await?;
        if removed == 0 {
            return Ok(());
        }
        for (id, metrics) in self.sampled_metrics(df).await? {
            let mut reasons = violations(&metrics, &self.bounds, &self.region);
            if reasons.is_empty() {
                // Non-finite values fail the vectorized rules without tripping a scalar one.
                reasons.push(ExclusionReason::InvalidSpeed(metrics.speed_kmh));
            }
            log.exclude(&id, STAGE_NAME, reasons);
        }
        log.record(AuditEvent::StageTotal {
            stage: STAGE_NAME.to_string(),
            removed,
        });
        Ok(())
    }

    /// Returns a new DataFrame with only the plausible trips.
    pub fn transform(&self, df: DataFrame) -> TripCleanerResult<DataFrame> {
        validate_columns(&df, &SAMPLE_COLUMNS)?;
        df.filter(self.plausible()).map_err(TripCleanerError::from)
    }

    fn inherent_is_filter(&self) -> bool {
        true
    }
}

impl_stage!(PlausibilityFilter);
