//! ## Removing duplicate trips
//!
//! [`DropDuplicates`] removes rows whose every field equals an earlier row, keeping the first
//! occurrence in table order. Missing values compare equal to each other, so two rows that are
//! both missing the same field are still duplicates.
//!
//! The plan numbers rows with `row_number()`, groups on every column while keeping the smallest
//! row number, and sorts on it, which restores the input order of the surviving rows.

use crate::audit::{AuditEvent, ExclusionLog};
use crate::exceptions::{TripCleanerError, TripCleanerResult};
use crate::impl_stage;
use datafusion::functions_aggregate::expr_fn::min;
use datafusion::functions_window::expr_fn::row_number;
use datafusion::prelude::*;

const ROW_INDEX: &str = "__row_index";
const FIRST_ROW: &str = "__first_row";

/// Drops exact-duplicate rows and reports how many were removed.
#[derive(Debug, Default)]
pub struct DropDuplicates;

impl DropDuplicates {
    pub fn new() -> Self {
        Self
    }

    /// Counts the duplicates and records the count in the exclusion log.
    pub async fn inspect(&self, df: &DataFrame, log: &mut ExclusionLog) -> TripCleanerResult<()> {
        let before = df.clone().count().await?;
        let after = self.transform(df.clone())?.count().await?;
        let duplicates = before - after;
        if duplicates > 0 {
            log.record(AuditEvent::DuplicatesDropped(duplicates));
        }
        Ok(())
    }

    /// Returns a new DataFrame with only the first occurrence of every distinct row.
    pub fn transform(&self, df: DataFrame) -> TripCleanerResult<DataFrame> {
        let columns: Vec<Expr> = df
            .schema()
            .fields()
            .iter()
            .map(|field| col(field.name()))
            .collect();
        if columns.is_empty() {
            return Ok(df);
        }
        df.with_column(ROW_INDEX, row_number())?
            .aggregate(columns.clone(), vec![min(col(ROW_INDEX)).alias(FIRST_ROW)])?
            .sort(vec![col(FIRST_ROW).sort(true, false)])?
            .select(columns)
            .map_err(TripCleanerError::from)
    }

    fn inherent_is_filter(&self) -> bool {
        true
    }
}

impl_stage!(DropDuplicates);
