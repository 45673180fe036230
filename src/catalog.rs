//! ## Trip Catalog
//!
//! Read-only lookups over a cleaned trip artifact: the first trips of the table, one trip by
//! identifier, and trips filtered by pickup date, distance range or pickup zone. Every lookup
//! returns the matching rows in file order, capped at a limit.

use crate::dataset::{
    read_table, require_columns, session_context, ID, OUTPUT_COLUMNS, PICKUP_DATE, PICKUP_ZONE,
    TRIP_DISTANCE_KM,
};
use crate::exceptions::{TripCleanerError, TripCleanerResult};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use datafusion::arrow::datatypes::DataType;
use datafusion::prelude::*;
use datafusion_functions::string::lower;
use std::path::Path;

/// Number of rows returned when the caller does not choose a limit.
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Distance range used by callers that do not pass one, in kilometres.
pub const DEFAULT_DISTANCE_RANGE: (f64, f64) = (0.0, 10.0);

/// Lookups over a cleaned trip table.
pub struct TripCatalog {
    df: DataFrame,
}

impl TripCatalog {
    /// Opens a cleaned artifact, checking that it carries every output column.
    pub async fn open(path: impl AsRef<Path>) -> TripCleanerResult<Self> {
        let ctx = session_context();
        let df = read_table(&ctx, path.as_ref()).await?;
        Self::from_frame(df).await
    }

    /// Wraps an already loaded frame of cleaned trips.
    pub async fn from_frame(df: DataFrame) -> TripCleanerResult<Self> {
        require_columns(&df, &OUTPUT_COLUMNS)?;
        Ok(Self {
            df: df.cache().await?,
        })
    }

    /// Number of trips in the catalog.
    pub async fn len(&self) -> TripCleanerResult<usize> {
        Ok(self.df.clone().count().await?)
    }

    pub async fn is_empty(&self) -> TripCleanerResult<bool> {
        Ok(self.len().await? == 0)
    }

    async fn matching(&self, predicate: Option<Expr>, limit: usize) -> TripCleanerResult<Vec<RecordBatch>> {
        let df = match predicate {
            Some(predicate) => self.df.clone().filter(predicate)?,
            None => self.df.clone(),
        };
        let batches = df.limit(0, Some(limit))?.collect().await?;
        Ok(batches.into_iter().filter(|b| b.num_rows() > 0).collect())
    }

    /// The first `limit` trips.
    pub async fn trips(&self, limit: usize) -> TripCleanerResult<Vec<RecordBatch>> {
        self.matching(None, limit).await
    }

    /// The trip with the given identifier, if any.
    pub async fn trip_by_id(&self, id: &str) -> TripCleanerResult<Option<RecordBatch>> {
        let predicate = cast(col(ID), DataType::Utf8).eq(lit(id));
        let batches = self.matching(Some(predicate), 1).await?;
        Ok(batches.first().map(|batch| batch.slice(0, 1)))
    }

    /// Trips picked up on the given `YYYY-MM-DD` date.
    pub async fn trips_by_date(&self, date: &str, limit: usize) -> TripCleanerResult<Vec<RecordBatch>> {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|e| {
            TripCleanerError::InvalidParameter(format!(
                "Invalid date '{}', expected YYYY-MM-DD: {}",
                date, e
            ))
        })?;
        let predicate =
            cast(col(PICKUP_DATE), DataType::Utf8).eq(lit(date.format("%Y-%m-%d").to_string()));
        self.matching(Some(predicate), limit).await
    }

    /// Trips whose distance lies in `[min_km, max_km]`.
    pub async fn trips_by_distance(
        &self,
        min_km: f64,
        max_km: f64,
        limit: usize,
    ) -> TripCleanerResult<Vec<RecordBatch>> {
        if !(min_km <= max_km) {
            return Err(TripCleanerError::InvalidParameter(format!(
                "Invalid distance range [{}, {}]",
                min_km, max_km
            )));
        }
        let predicate = cast(col(TRIP_DISTANCE_KM), DataType::Float64)
            .between(lit(min_km), lit(max_km));
        self.matching(Some(predicate), limit).await
    }

    /// Trips picked up in the named zone, ignoring case.
    pub async fn trips_by_zone(&self, zone: &str, limit: usize) -> TripCleanerResult<Vec<RecordBatch>> {
        let predicate = lower()
            .call(vec![cast(col(PICKUP_ZONE), DataType::Utf8)])
            .eq(lit(zone.trim().to_lowercase()));
        self.matching(Some(predicate), limit).await
    }
}

/// Total number of rows across batches.
pub fn row_count(batches: &[RecordBatch]) -> usize {
    batches.iter().map(|b| b.num_rows()).sum()
}
