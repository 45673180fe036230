//! ## Finalizing the cleaned table
//!
//! [`Finalizer`] turns the enriched frame into the output artifact layout:
//!
//! - NaN, infinite and missing values of the derived numeric columns become `0`.
//! - The store-and-forward flag is encoded as `"Y"` or `"N"`.
//! - Timestamps are rendered as `YYYY-MM-DD HH:MM:SS`.
//! - The frame is projected to [`OUTPUT_COLUMNS`], in that order.

use crate::audit::ExclusionLog;
use crate::dataset::{
    require_columns, DROPOFF_DATETIME, ESTIMATED_FARE, FARE_PER_KM, IDLE_TIME_RATIO,
    OUTPUT_COLUMNS, PICKUP_DATETIME, STORE_AND_FWD_FLAG, TRIP_SPEED_KMH,
};
use crate::exceptions::{TripCleanerError, TripCleanerResult};
use crate::impl_stage;
use datafusion::arrow::datatypes::DataType;
use datafusion::prelude::*;
use datafusion_expr::expr::Case as DFCase;
use datafusion_functions::datetime::to_char;
use datafusion_functions::math::isnan;
use datafusion_functions::string::{btrim, upper};

/// Derived columns whose non-finite values are replaced with 0.
pub const SANITIZED_COLUMNS: [&str; 4] = [TRIP_SPEED_KMH, FARE_PER_KM, IDLE_TIME_RATIO, ESTIMATED_FARE];

/// Format of the serialized timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const FLAG_YES: &str = "Y";
const FLAG_NO: &str = "N";

fn finite_or_zero_expr(name: &str) -> Expr {
    let value = cast(col(name), DataType::Float64);
    let non_finite = value
        .clone()
        .is_null()
        .or(isnan().call(vec![value.clone()]))
        .or(value.clone().eq(lit(f64::INFINITY)))
        .or(value.clone().eq(lit(f64::NEG_INFINITY)));
    Expr::Case(DFCase {
        expr: None,
        when_then_expr: vec![(Box::new(non_finite), Box::new(lit(0.0)))],
        else_expr: Some(Box::new(value)),
    })
}

fn store_and_fwd_expr() -> Expr {
    let normalized = upper().call(vec![btrim().call(vec![cast(
        col(STORE_AND_FWD_FLAG),
        DataType::Utf8,
    )])]);
    Expr::Case(DFCase {
        expr: None,
        when_then_expr: vec![(
            Box::new(normalized.in_list(vec![lit("1"), lit(FLAG_YES)], false)),
            Box::new(lit(FLAG_YES)),
        )],
        else_expr: Some(Box::new(lit(FLAG_NO))),
    })
}

/// Sanitizes, encodes and projects the cleaned frame to the output layout.
#[derive(Default)]
pub struct Finalizer;

impl Finalizer {
    pub fn new() -> Self {
        Self
    }

    /// Fails when any output column is missing; nothing is removed here.
    pub async fn inspect(&self, df: &DataFrame, _log: &mut ExclusionLog) -> TripCleanerResult<()> {
        require_columns(df, &OUTPUT_COLUMNS)
    }

    /// Returns the frame in output layout.
    pub fn transform(&self, df: DataFrame) -> TripCleanerResult<DataFrame> {
        require_columns(&df, &OUTPUT_COLUMNS)?;
        let exprs: Vec<Expr> = OUTPUT_COLUMNS
            .iter()
            .map(|name| match *name {
                PICKUP_DATETIME | DROPOFF_DATETIME => to_char()
                    .call(vec![col(*name), lit(TIMESTAMP_FORMAT)])
                    .alias(*name),
                STORE_AND_FWD_FLAG => store_and_fwd_expr().alias(*name),
                name if SANITIZED_COLUMNS.contains(&name) => finite_or_zero_expr(name).alias(name),
                name => col(name),
            })
            .collect();
        df.select(exprs).map_err(TripCleanerError::from)
    }

    fn inherent_is_filter(&self) -> bool {
        false
    }
}

impl_stage!(Finalizer);
