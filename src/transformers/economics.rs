//! ## Fare estimation and idle time
//!
//! [`FareEstimator`] appends three columns derived from distance, duration and speed:
//!
//! - `estimated_fare = base_fare + distance_km * per_km_rate + duration_minutes * per_minute_rate`
//! - `fare_per_km = estimated_fare / distance_km`, or 0 for a zero distance
//! - `idle_time_ratio`: the share of the trip duration not explained by travelling at the realized
//!   average speed, clamped to `[0, 1]`; 0 when the duration is not positive. When the speed is
//!   not positive no idling is assumed.

use crate::audit::ExclusionLog;
use crate::dataset::{
    ESTIMATED_FARE, FARE_PER_KM, IDLE_TIME_RATIO, TRIP_DISTANCE_KM, TRIP_DURATION_MINUTES,
    TRIP_DURATION_SECONDS, TRIP_SPEED_KMH,
};
use crate::exceptions::{TripCleanerError, TripCleanerResult};
use crate::impl_stage;
use crate::settings::FareSchedule;
use crate::transformers::helpers::{columns_except, validate_columns};
use datafusion::prelude::*;
use datafusion_expr::expr::Case as DFCase;

/// Estimated fare of one trip.
pub fn estimated_fare(fares: &FareSchedule, distance_km: f64, duration_minutes: f64) -> f64 {
    fares.base_fare + distance_km * fares.per_km_rate + duration_minutes * fares.per_minute_rate
}

/// Fare per kilometre; 0 for a zero distance.
pub fn fare_per_km(fare: f64, distance_km: f64) -> f64 {
    if distance_km > 0.0 {
        fare / distance_km
    } else {
        0.0
    }
}

/// Fraction of the trip time not accounted for by steady travel at `speed_kmh`.
pub fn idle_time_ratio(distance_km: f64, duration_seconds: f64, speed_kmh: f64) -> f64 {
    if !(duration_seconds > 0.0) {
        return 0.0;
    }
    let expected_seconds = if speed_kmh > 0.0 {
        distance_km / speed_kmh * 3600.0
    } else {
        duration_seconds
    };
    (1.0 - expected_seconds / duration_seconds).clamp(0.0, 1.0)
}

fn case_when(condition: Expr, then: Expr, otherwise: Expr) -> Expr {
    Expr::Case(DFCase {
        expr: None,
        when_then_expr: vec![(Box::new(condition), Box::new(then))],
        else_expr: Some(Box::new(otherwise)),
    })
}

fn clamp_unit_interval(value: Expr) -> Expr {
    Expr::Case(DFCase {
        expr: None,
        when_then_expr: vec![
            (Box::new(value.clone().lt(lit(0.0))), Box::new(lit(0.0))),
            (Box::new(value.clone().gt(lit(1.0))), Box::new(lit(1.0))),
        ],
        else_expr: Some(Box::new(value)),
    })
}

fn idle_time_ratio_expr(distance: Expr, duration: Expr, speed: Expr) -> Expr {
    let expected_seconds = case_when(
        speed.clone().gt(lit(0.0)),
        distance / speed * lit(3600.0),
        duration.clone(),
    );
    case_when(
        duration.clone().gt(lit(0.0)),
        clamp_unit_interval(lit(1.0) - expected_seconds / duration),
        lit(0.0),
    )
}

/// Derives the estimated fare, fare per kilometre and idle-time ratio.
pub struct FareEstimator {
    pub fares: FareSchedule,
}

impl FareEstimator {
    pub fn new(fares: FareSchedule) -> Self {
        Self { fares }
    }

    fn required_columns() -> [&'static str; 4] {
        [
            TRIP_DISTANCE_KM,
            TRIP_DURATION_SECONDS,
            TRIP_DURATION_MINUTES,
            TRIP_SPEED_KMH,
        ]
    }

    /// Validates the fare schedule and the presence of the kinematic columns.
    pub async fn inspect(&self, df: &DataFrame, _log: &mut ExclusionLog) -> TripCleanerResult<()> {
        let rates = [
            self.fares.base_fare,
            self.fares.per_km_rate,
            self.fares.per_minute_rate,
        ];
        if rates.iter().any(|rate| !rate.is_finite()) {
            return Err(TripCleanerError::InvalidParameter(format!(
                "Fare rates must be finite, got {:?}",
                self.fares
            )));
        }
        validate_columns(df, &Self::required_columns())
    }

    /// Returns a new DataFrame with the fare and idle-time columns appended.
    pub fn transform(&self, df: DataFrame) -> TripCleanerResult<DataFrame> {
        validate_columns(&df, &Self::required_columns())?;
        let derived = [ESTIMATED_FARE, FARE_PER_KM, IDLE_TIME_RATIO];

        let mut exprs = columns_except(&df, &derived);
        exprs.push(
            (lit(self.fares.base_fare)
                + col(TRIP_DISTANCE_KM) * lit(self.fares.per_km_rate)
                + col(TRIP_DURATION_MINUTES) * lit(self.fares.per_minute_rate))
            .alias(ESTIMATED_FARE),
        );
        let df = df.select(exprs)?;

        let mut exprs = columns_except(&df, &[]);
        exprs.push(
            case_when(
                col(TRIP_DISTANCE_KM).gt(lit(0.0)),
                col(ESTIMATED_FARE) / col(TRIP_DISTANCE_KM),
                lit(0.0),
            )
            .alias(FARE_PER_KM),
        );
        exprs.push(
            idle_time_ratio_expr(
                col(TRIP_DISTANCE_KM),
                col(TRIP_DURATION_SECONDS),
                col(TRIP_SPEED_KMH),
            )
            .alias(IDLE_TIME_RATIO),
        );
        df.select(exprs).map_err(TripCleanerError::from)
    }

    fn inherent_is_filter(&self) -> bool {
        false
    }
}

impl_stage!(FareEstimator);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_estimated_fare_uses_schedule() {
        let fares = FareSchedule::default();
        assert_abs_diff_eq!(estimated_fare(&fares, 2.0, 15.0), 2.5 + 5.0 + 7.5);

        let custom = FareSchedule {
            base_fare: 3.0,
            per_km_rate: 1.0,
            per_minute_rate: 0.0,
        };
        assert_abs_diff_eq!(estimated_fare(&custom, 2.0, 15.0), 5.0);
    }

    #[test]
    fn test_fare_per_km_zero_distance() {
        assert_eq!(fare_per_km(10.0, 0.0), 0.0);
        assert_abs_diff_eq!(fare_per_km(10.0, 4.0), 2.5);
    }

    #[test]
    fn test_idle_ratio_bounds() {
        assert_eq!(idle_time_ratio(2.0, 0.0, 10.0), 0.0);
        assert_eq!(idle_time_ratio(2.0, 900.0, 0.0), 0.0);

        let cases = [
            (2.0, 1.0, 7200.0),
            (2.0, 900.0, 1e-9),
            (0.001, 1.0, 3.6),
            (5.0, 600.0, 30.0),
            (5.0, 600.0, 1e6),
        ];
        for (distance, duration, speed) in cases {
            let ratio = idle_time_ratio(distance, duration, speed);
            assert!((0.0..=1.0).contains(&ratio), "ratio {} out of bounds", ratio);
        }
    }

    #[test]
    fn test_idle_ratio_at_realized_speed_is_zero() {
        // The realized speed explains the whole duration.
        let speed = crate::transformers::kinematics::speed_kmh(3.0, 600.0);
        assert_abs_diff_eq!(idle_time_ratio(3.0, 600.0, speed), 0.0, epsilon = 1e-12);
    }
}
