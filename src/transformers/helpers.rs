//! Shared plumbing for the stages: column validation, predicate building, and reading small
//! collected results back into Rust values.

use crate::exceptions::{TripCleanerError, TripCleanerResult};
use crate::settings::BoundingBox;
use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use datafusion::prelude::*;

/// Placeholder used in the exclusion log when the trip identifier itself is missing.
pub(crate) const UNKNOWN_ID: &str = "<unknown>";

/// Validates that every column in `target_cols` exists in the DataFrame.
pub(crate) fn validate_columns(df: &DataFrame, target_cols: &[&str]) -> TripCleanerResult<()> {
    let schema = df.schema();
    for col_name in target_cols {
        if schema.field_with_name(None, col_name).is_err() {
            return Err(TripCleanerError::MissingColumn(format!(
                "Column '{}' not found in DataFrame",
                col_name
            )));
        }
    }
    Ok(())
}

/// Expressions selecting every current column, optionally skipping some of them.
pub(crate) fn columns_except(df: &DataFrame, skip: &[&str]) -> Vec<Expr> {
    df.schema()
        .fields()
        .iter()
        .filter(|field| !skip.contains(&field.name().as_str()))
        .map(|field| col(field.name()))
        .collect()
}

/// Conjunction of all predicates; an empty list is always true.
pub(crate) fn all_of(predicates: Vec<Expr>) -> Expr {
    predicates
        .into_iter()
        .reduce(|acc, expr| acc.and(expr))
        .unwrap_or_else(|| lit(true))
}

/// Disjunction of all predicates; an empty list is always false.
pub(crate) fn any_of(predicates: Vec<Expr>) -> Expr {
    predicates
        .into_iter()
        .reduce(|acc, expr| acc.or(expr))
        .unwrap_or_else(|| lit(false))
}

/// True when the point given by the two column names lies inside the box (edges included).
pub(crate) fn inside_box(longitude: &str, latitude: &str, area: &BoundingBox) -> Expr {
    col(latitude)
        .between(lit(area.min_latitude), lit(area.max_latitude))
        .and(col(longitude).between(lit(area.min_longitude), lit(area.max_longitude)))
}

/// Number of rows matching the predicate.
pub(crate) async fn count_matching(df: &DataFrame, predicate: Expr) -> TripCleanerResult<usize> {
    Ok(df.clone().filter(predicate)?.count().await?)
}

/// Collects at most `limit` rows matching the predicate, projected to `columns`.
pub(crate) async fn sample_rows(
    df: &DataFrame,
    predicate: Expr,
    columns: &[&str],
    limit: usize,
) -> TripCleanerResult<Vec<RecordBatch>> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let exprs: Vec<Expr> = columns.iter().map(|name| col(*name)).collect();
    let batches = df
        .clone()
        .filter(predicate)?
        .select(exprs)?
        .limit(0, Some(limit))?
        .collect()
        .await?;
    Ok(batches)
}

/// Identifiers of at most `limit` rows matching the predicate, in table order.
pub(crate) async fn sample_ids(
    df: &DataFrame,
    predicate: Expr,
    id_column: &str,
    limit: usize,
) -> TripCleanerResult<Vec<String>> {
    let batches = sample_rows(df, predicate, &[id_column], limit).await?;
    let mut ids = Vec::new();
    for batch in &batches {
        ids.extend(
            string_values(batch.column(0))?
                .into_iter()
                .map(|id| id.unwrap_or_else(|| UNKNOWN_ID.to_string())),
        );
    }
    Ok(ids)
}

/// Reads any array as optional strings.
pub(crate) fn string_values(array: &ArrayRef) -> TripCleanerResult<Vec<Option<String>>> {
    let casted = cast(array, &DataType::Utf8)?;
    let values = casted
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| TripCleanerError::InvalidParameter("expected a text column".to_string()))?;
    Ok((0..values.len())
        .map(|i| (!values.is_null(i)).then(|| values.value(i).to_string()))
        .collect())
}

/// Reads a numeric array as optional `f64`s.
pub(crate) fn f64_values(array: &ArrayRef) -> TripCleanerResult<Vec<Option<f64>>> {
    let casted = cast(array, &DataType::Float64)?;
    let values = casted
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| {
            TripCleanerError::InvalidParameter("expected a numeric column".to_string())
        })?;
    Ok((0..values.len())
        .map(|i| (!values.is_null(i)).then(|| values.value(i)))
        .collect())
}

/// Reads an integer array as optional `i64`s.
pub(crate) fn i64_values(array: &ArrayRef) -> TripCleanerResult<Vec<Option<i64>>> {
    let casted = cast(array, &DataType::Int64)?;
    let values = casted
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| {
            TripCleanerError::InvalidParameter("expected an integer column".to_string())
        })?;
    Ok((0..values.len())
        .map(|i| (!values.is_null(i)).then(|| values.value(i)))
        .collect())
}
