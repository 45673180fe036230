//! ## Timestamp parsing and calendar features
//!
//! [`TemporalFeatures`] parses the pickup and dropoff timestamp strings in place and derives the
//! calendar features of the pickup time:
//!
//! - `pickup_date` (`YYYY-MM-DD`), `pickup_month`, `pickup_hour` (0-23)
//! - `pickup_day_of_week` (0 = Monday .. 6 = Sunday) and `pickup_day_name` (e.g. `Friday`)
//! - `is_pickup_weekend` and `is_pickup_peak_hour` (0/1 flags from the configured day/hour sets)
//! - `time_of_day`: hours 6-11 are `Morning`, 12-16 `Afternoon`, 17-20 `Evening`, anything else
//!   `Night`. Buckets are tested in that order and the first match wins.
//!
//! A timestamp that cannot be parsed aborts the run with
//! [`TripCleanerError::InvalidTimestamp`]; timestamps are never dropped row by row.

use crate::audit::ExclusionLog;
use crate::dataset::{
    DROPOFF_DATETIME, IS_PICKUP_PEAK_HOUR, IS_PICKUP_WEEKEND, PICKUP_DATE, PICKUP_DATETIME,
    PICKUP_DAY_NAME, PICKUP_DAY_OF_WEEK, PICKUP_HOUR, PICKUP_MONTH, TIME_OF_DAY,
};
use crate::exceptions::{TripCleanerError, TripCleanerResult};
use crate::impl_stage;
use crate::settings::TemporalRules;
use crate::transformers::helpers::columns_except;
use datafusion::arrow::datatypes::DataType;
use datafusion::functions_aggregate::expr_fn::min;
use datafusion::prelude::*;
use datafusion_expr::expr::Case as DFCase;
use datafusion_functions::datetime::{date_part, to_char, to_timestamp};

/// Named time-of-day buckets as inclusive hour ranges, in evaluation order.
pub const TIME_OF_DAY_BUCKETS: [(&str, i32, i32); 3] = [
    ("Morning", 6, 11),
    ("Afternoon", 12, 16),
    ("Evening", 17, 20),
];

/// Bucket used for hours outside every range of [`TIME_OF_DAY_BUCKETS`].
pub const NIGHT: &str = "Night";

/// Returns the time-of-day bucket of an hour.
pub fn time_of_day(hour: i32) -> &'static str {
    TIME_OF_DAY_BUCKETS
        .iter()
        .find(|(_, start, end)| (*start..=*end).contains(&hour))
        .map_or(NIGHT, |(name, _, _)| *name)
}

/// Converts the `dow` date part (0 = Sunday) into Monday-based numbering (0 = Monday).
pub fn monday_based_weekday(sunday_based: i32) -> i32 {
    (sunday_based + 6) % 7
}

/// Validates that a column exists and holds text or timestamps.
fn validate_timestamp_column(df: &DataFrame, col_name: &str) -> TripCleanerResult<()> {
    let field = df.schema().field_with_name(None, col_name).map_err(|_| {
        TripCleanerError::MissingColumn(format!("Column '{}' not found", col_name))
    })?;
    match field.data_type() {
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View | DataType::Timestamp(_, _) => {
            Ok(())
        }
        dt => Err(TripCleanerError::InvalidTimestamp {
            column: col_name.to_string(),
            reason: format!("expected text or timestamps, found {:?}", dt),
        }),
    }
}

fn parse_timestamp(col_name: &str) -> Expr {
    to_timestamp().call(vec![col(col_name)])
}

fn part(name: &str, ts: Expr) -> Expr {
    cast(date_part().call(vec![lit(name), ts]), DataType::Int32)
}

/// `CASE WHEN <value> IN (<members>) THEN 1 ELSE 0 END`
fn membership_flag(value: Expr, members: &[i32]) -> Expr {
    if members.is_empty() {
        return lit(0_i32);
    }
    let list: Vec<Expr> = members.iter().map(|m| lit(*m)).collect();
    Expr::Case(DFCase {
        expr: None,
        when_then_expr: vec![(Box::new(value.in_list(list, false)), Box::new(lit(1_i32)))],
        else_expr: Some(Box::new(lit(0_i32))),
    })
}

fn time_of_day_expr(hour: Expr) -> Expr {
    let when_then_expr = TIME_OF_DAY_BUCKETS
        .iter()
        .map(|(name, start, end)| {
            (
                Box::new(hour.clone().between(lit(*start), lit(*end))),
                Box::new(lit(*name)),
            )
        })
        .collect();
    Expr::Case(DFCase {
        expr: None,
        when_then_expr,
        else_expr: Some(Box::new(lit(NIGHT))),
    })
}

/// Parses trip timestamps and derives calendar features from the pickup time.
pub struct TemporalFeatures {
    pub rules: TemporalRules,
}

impl TemporalFeatures {
    pub fn new(rules: TemporalRules) -> Self {
        Self { rules }
    }

    /// Checks that both timestamp columns parse. Any unparseable value is fatal.
    pub async fn inspect(&self, df: &DataFrame, _log: &mut ExclusionLog) -> TripCleanerResult<()> {
        for col_name in [PICKUP_DATETIME, DROPOFF_DATETIME] {
            validate_timestamp_column(df, col_name)?;
            df.clone()
                .aggregate(vec![], vec![min(parse_timestamp(col_name)).alias("earliest")])?
                .collect()
                .await
                .map_err(|e| TripCleanerError::InvalidTimestamp {
                    column: col_name.to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// Returns a new DataFrame with parsed timestamps and the calendar features appended.
    pub fn transform(&self, df: DataFrame) -> TripCleanerResult<DataFrame> {
        for col_name in [PICKUP_DATETIME, DROPOFF_DATETIME] {
            validate_timestamp_column(&df, col_name)?;
        }

        // Parse the timestamps in place, keeping the column order.
        let parsed: Vec<Expr> = df
            .schema()
            .fields()
            .iter()
            .map(|field| {
                let name = field.name();
                if name == PICKUP_DATETIME || name == DROPOFF_DATETIME {
                    parse_timestamp(name).alias(name)
                } else {
                    col(name)
                }
            })
            .collect();
        let df = df.select(parsed)?;

        let pickup = col(PICKUP_DATETIME);
        let hour = part("hour", pickup.clone());
        let day_of_week = (part("dow", pickup.clone()) + lit(6_i32)) % lit(7_i32);

        let mut exprs = columns_except(&df, &[]);
        exprs.push(
            to_char()
                .call(vec![pickup.clone(), lit("%Y-%m-%d")])
                .alias(PICKUP_DATE),
        );
        exprs.push(part("month", pickup.clone()).alias(PICKUP_MONTH));
        exprs.push(hour.clone().alias(PICKUP_HOUR));
        exprs.push(day_of_week.clone().alias(PICKUP_DAY_OF_WEEK));
        exprs.push(
            to_char()
                .call(vec![pickup, lit("%A")])
                .alias(PICKUP_DAY_NAME),
        );
        exprs.push(membership_flag(day_of_week, &self.rules.weekend_days).alias(IS_PICKUP_WEEKEND));
        exprs.push(membership_flag(hour.clone(), &self.rules.peak_hours).alias(IS_PICKUP_PEAK_HOUR));
        exprs.push(time_of_day_expr(hour).alias(TIME_OF_DAY));

        df.select(exprs).map_err(TripCleanerError::from)
    }

    fn inherent_is_filter(&self) -> bool {
        false
    }
}

impl_stage!(TemporalFeatures);
