//! ## Dropping incomplete trips
//!
//! [`DropMissingValues`] removes every row that has a missing value in any column. A null is
//! missing, and so is `NaN` in a floating-point column. Rows are never repaired: a row is either
//! complete or excluded.
//!
//! Before removal, the stage logs the number of missing values per column and a bounded sample
//! of the excluded trip identifiers.

use crate::audit::{AuditEvent, ExclusionLog, ExclusionReason};
use crate::dataset::ID;
use crate::exceptions::{TripCleanerError, TripCleanerResult};
use crate::impl_stage;
use crate::transformers::helpers::{any_of, count_matching, i64_values, sample_ids};
use datafusion::arrow::datatypes::DataType;
use datafusion::functions_aggregate::expr_fn::sum;
use datafusion::prelude::*;
use datafusion_functions::math::isnan;

pub const STAGE_NAME: &str = "missing value filter";

/// Removes rows that contain a missing value.
pub struct DropMissingValues {
    /// How many excluded identifiers are written to the exclusion log.
    pub sample_limit: usize,
}

impl DropMissingValues {
    pub fn new(sample_limit: usize) -> Self {
        Self { sample_limit }
    }

    fn columns(df: &DataFrame) -> Vec<(String, DataType)> {
        df.schema()
            .fields()
            .iter()
            .map(|field| (field.name().to_string(), field.data_type().clone()))
            .collect()
    }

    /// Predicate that is true when the value of one column is missing. Never null.
    fn missing(name: &str, data_type: &DataType) -> Expr {
        let is_null = col(name).is_null();
        match data_type {
            DataType::Float32 | DataType::Float64 => {
                is_null.or(isnan().call(vec![col(name)]))
            }
            _ => is_null,
        }
    }

    /// Predicate that is true for rows with at least one missing field.
    fn incomplete_rows(columns: &[(String, DataType)]) -> Expr {
        any_of(
            columns
                .iter()
                .map(|(name, data_type)| Self::missing(name, data_type))
                .collect(),
        )
    }

    /// Counts missing values per column (before removal) and logs a sample of excluded trips.
    pub async fn inspect(&self, df: &DataFrame, log: &mut ExclusionLog) -> TripCleanerResult<()> {
        let columns = Self::columns(df);
        if columns.is_empty() {
            return Ok(());
        }

        let missing_counts: Vec<Expr> = columns
            .iter()
            .map(|(name, data_type)| {
                sum(cast(Self::missing(name, data_type), DataType::Int64)).alias(name)
            })
            .collect();
        let batches = df.clone().aggregate(vec![], missing_counts)?.collect().await?;
        if let Some(batch) = batches.first() {
            for (i, (name, _)) in columns.iter().enumerate() {
                let missing = i64_values(batch.column(i))?
                    .first()
                    .copied()
                    .flatten()
                    .unwrap_or(0) as usize;
                if missing > 0 {
                    log.record(AuditEvent::MissingValues {
                        column: name.clone(),
                        count: missing,
                    });
                }
            }
        }

        let removed = count_matching(df, Self::incomplete_rows(&columns)).await?;
        if removed == 0 {
            return Ok(());
        }
        let id_column = if columns.iter().any(|(name, _)| name == ID) {
            ID
        } else {
            columns[0].0.as_str()
        };
        let ids = sample_ids(
            df,
            Self::incomplete_rows(&columns),
            id_column,
            self.sample_limit,
        )
        .await?;
        for id in ids {
            log.exclude(&id, STAGE_NAME, vec![ExclusionReason::MissingValue]);
        }
        log.record(AuditEvent::StageTotal {
            stage: STAGE_NAME.to_string(),
            removed,
        });
        Ok(())
    }

    /// Returns a new DataFrame that excludes rows with any missing value.
    pub fn transform(&self, df: DataFrame) -> TripCleanerResult<DataFrame> {
        let columns = Self::columns(&df);
        if columns.is_empty() {
            return Ok(df);
        }
        df.filter(Self::incomplete_rows(&columns).not())
            .map_err(TripCleanerError::from)
    }

    fn inherent_is_filter(&self) -> bool {
        true
    }
}

impl_stage!(DropMissingValues);
