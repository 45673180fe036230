//! ## Distance, duration and speed
//!
//! [`TripKinematics`] appends:
//!
//! - `trip_distance_km`: great-circle distance between pickup and dropoff, computed with the
//!   haversine formula on a sphere of the configured radius (6371 km by default).
//! - `trip_duration_seconds` / `trip_duration_minutes`: dropoff time minus pickup time, always
//!   derived from the parsed timestamps (a raw `trip_duration` column is ignored).
//! - `trip_speed_kmh`: `distance / duration * 3600`, or 0 when the duration is not positive.
//!
//! The vectorized expressions evaluate the same formulas as the scalar functions
//! [`haversine_km`] and [`speed_kmh`].

use crate::audit::ExclusionLog;
use crate::dataset::{
    DROPOFF_DATETIME, DROPOFF_LATITUDE, DROPOFF_LONGITUDE, PICKUP_DATETIME, PICKUP_LATITUDE,
    PICKUP_LONGITUDE, TRIP_DISTANCE_KM, TRIP_DURATION_MINUTES, TRIP_DURATION_SECONDS,
    TRIP_SPEED_KMH,
};
use crate::exceptions::{TripCleanerError, TripCleanerResult};
use crate::impl_stage;
use crate::transformers::helpers::{columns_except, validate_columns};
use datafusion::arrow::datatypes::DataType;
use datafusion::prelude::*;
use datafusion_expr::expr::Case as DFCase;
use datafusion_functions::datetime::to_unixtime;
use datafusion_functions::math::{asin, cos, radians, sin, sqrt};

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometres between two (longitude, latitude) points in degrees.
pub fn haversine_km(lon1: f64, lat1: f64, lon2: f64, lat2: f64, radius_km: f64) -> f64 {
    let (lon1, lat1, lon2, lat2) = (
        lon1.to_radians(),
        lat1.to_radians(),
        lon2.to_radians(),
        lat2.to_radians(),
    );
    let half_dlat = ((lat2 - lat1) / 2.0).sin();
    let half_dlon = ((lon2 - lon1) / 2.0).sin();
    let a = half_dlat * half_dlat + lat1.cos() * lat2.cos() * half_dlon * half_dlon;
    2.0 * radius_km * a.sqrt().asin()
}

/// Average speed in km/h; 0 when the duration is not positive.
pub fn speed_kmh(distance_km: f64, duration_seconds: f64) -> f64 {
    if duration_seconds > 0.0 {
        distance_km / duration_seconds * 3600.0
    } else {
        0.0
    }
}

/// Haversine distance expression over four coordinate columns.
pub fn haversine_expr(
    lon1: &str,
    lat1: &str,
    lon2: &str,
    lat2: &str,
    radius_km: f64,
) -> Expr {
    let to_radians = |name: &str| radians().call(vec![col(name)]);
    let (lon1, lat1, lon2, lat2) = (
        to_radians(lon1),
        to_radians(lat1),
        to_radians(lon2),
        to_radians(lat2),
    );
    let half_dlat = sin().call(vec![(lat2.clone() - lat1.clone()) / lit(2.0)]);
    let half_dlon = sin().call(vec![(lon2 - lon1) / lit(2.0)]);
    let a = half_dlat.clone() * half_dlat
        + cos().call(vec![lat1]) * cos().call(vec![lat2]) * half_dlon.clone() * half_dlon;
    lit(2.0 * radius_km) * asin().call(vec![sqrt().call(vec![a])])
}

/// Seconds between two timestamp columns.
fn duration_seconds_expr(start: &str, end: &str) -> Expr {
    let end = to_unixtime().call(vec![col(end)]);
    let start = to_unixtime().call(vec![col(start)]);
    cast(end - start, DataType::Float64)
}

/// `CASE WHEN duration > 0 THEN distance / duration * 3600 ELSE 0 END`
fn speed_expr(distance: Expr, duration: Expr) -> Expr {
    Expr::Case(DFCase {
        expr: None,
        when_then_expr: vec![(
            Box::new(duration.clone().gt(lit(0.0))),
            Box::new(distance / duration * lit(3600.0)),
        )],
        else_expr: Some(Box::new(lit(0.0))),
    })
}

/// Derives trip distance, duration and speed.
pub struct TripKinematics {
    pub earth_radius_km: f64,
}

impl TripKinematics {
    pub fn new(earth_radius_km: f64) -> Self {
        Self { earth_radius_km }
    }

    fn required_columns() -> [&'static str; 6] {
        [
            PICKUP_LONGITUDE,
            PICKUP_LATITUDE,
            DROPOFF_LONGITUDE,
            DROPOFF_LATITUDE,
            PICKUP_DATETIME,
            DROPOFF_DATETIME,
        ]
    }

    /// Validates the radius and the presence of the input columns.
    pub async fn inspect(&self, df: &DataFrame, _log: &mut ExclusionLog) -> TripCleanerResult<()> {
        if !(self.earth_radius_km > 0.0) {
            return Err(TripCleanerError::InvalidParameter(format!(
                "Earth radius must be positive, got {}",
                self.earth_radius_km
            )));
        }
        validate_columns(df, &Self::required_columns())
    }

    /// Returns a new DataFrame with distance, duration (seconds and minutes) and speed appended.
    pub fn transform(&self, df: DataFrame) -> TripCleanerResult<DataFrame> {
        validate_columns(&df, &Self::required_columns())?;
        let derived = [
            TRIP_DISTANCE_KM,
            TRIP_DURATION_SECONDS,
            TRIP_DURATION_MINUTES,
            TRIP_SPEED_KMH,
        ];

        let mut exprs = columns_except(&df, &derived);
        exprs.push(
            haversine_expr(
                PICKUP_LONGITUDE,
                PICKUP_LATITUDE,
                DROPOFF_LONGITUDE,
                DROPOFF_LATITUDE,
                self.earth_radius_km,
            )
            .alias(TRIP_DISTANCE_KM),
        );
        exprs.push(duration_seconds_expr(PICKUP_DATETIME, DROPOFF_DATETIME).alias(TRIP_DURATION_SECONDS));
        let df = df.select(exprs)?;

        let mut exprs = columns_except(&df, &[]);
        exprs.push((col(TRIP_DURATION_SECONDS) / lit(60.0)).alias(TRIP_DURATION_MINUTES));
        exprs.push(speed_expr(col(TRIP_DISTANCE_KM), col(TRIP_DURATION_SECONDS)).alias(TRIP_SPEED_KMH));
        df.select(exprs).map_err(TripCleanerError::from)
    }

    fn inherent_is_filter(&self) -> bool {
        false
    }
}

impl_stage!(TripKinematics);
