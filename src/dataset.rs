//! ## Reading and Writing Trip Tables
//!
//! Column names of the raw and cleaned tables, the raw-trip loader, and the writer for the cleaned
//! artifact.
//!
//! The loader accepts delimited text (`.csv`, or any other extension treated as CSV) and Parquet
//! files. It checks that every required raw column exists and projects the table to the known
//! columns with canonical types, so later stages never depend on what schema inference guessed.
//! Delimited text is read with every field as text and converted afterwards: a value that does
//! not convert becomes missing and is dropped by the missing-value filter.
//!
//! The writer produces CSV unless the output path ends in `.parquet`.

use crate::exceptions::{TripCleanerError, TripCleanerResult};
use arrow::csv::WriterBuilder;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use datafusion::prelude::*;
use parquet::arrow::ArrowWriter;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub const ID: &str = "id";
pub const VENDOR_ID: &str = "vendor_id";
pub const PICKUP_DATETIME: &str = "pickup_datetime";
pub const DROPOFF_DATETIME: &str = "dropoff_datetime";
pub const PICKUP_LONGITUDE: &str = "pickup_longitude";
pub const PICKUP_LATITUDE: &str = "pickup_latitude";
pub const DROPOFF_LONGITUDE: &str = "dropoff_longitude";
pub const DROPOFF_LATITUDE: &str = "dropoff_latitude";
pub const PASSENGER_COUNT: &str = "passenger_count";
pub const STORE_AND_FWD_FLAG: &str = "store_and_fwd_flag";
/// Optional raw duration; never trusted, the duration is derived from the timestamps.
pub const RAW_TRIP_DURATION: &str = "trip_duration";

pub const PICKUP_DATE: &str = "pickup_date";
pub const PICKUP_MONTH: &str = "pickup_month";
pub const PICKUP_HOUR: &str = "pickup_hour";
pub const PICKUP_DAY_OF_WEEK: &str = "pickup_day_of_week";
pub const PICKUP_DAY_NAME: &str = "pickup_day_name";
pub const IS_PICKUP_WEEKEND: &str = "is_pickup_weekend";
pub const IS_PICKUP_PEAK_HOUR: &str = "is_pickup_peak_hour";
pub const TIME_OF_DAY: &str = "time_of_day";
pub const PICKUP_ZONE: &str = "pickup_zone";
pub const DROPOFF_ZONE: &str = "dropoff_zone";
pub const TRIP_DISTANCE_KM: &str = "trip_distance_km";
pub const TRIP_DURATION_SECONDS: &str = "trip_duration_seconds";
pub const TRIP_DURATION_MINUTES: &str = "trip_duration_minutes";
pub const TRIP_SPEED_KMH: &str = "trip_speed_kmh";
pub const ESTIMATED_FARE: &str = "estimated_fare";
pub const FARE_PER_KM: &str = "fare_per_km";
pub const IDLE_TIME_RATIO: &str = "idle_time_ratio";

/// Raw columns with the type each one is projected to.
pub const RAW_COLUMNS: [(&str, DataType); 10] = [
    (ID, DataType::Utf8),
    (VENDOR_ID, DataType::Utf8),
    (PICKUP_DATETIME, DataType::Utf8),
    (DROPOFF_DATETIME, DataType::Utf8),
    (PICKUP_LONGITUDE, DataType::Float64),
    (PICKUP_LATITUDE, DataType::Float64),
    (DROPOFF_LONGITUDE, DataType::Float64),
    (DROPOFF_LATITUDE, DataType::Float64),
    (PASSENGER_COUNT, DataType::Int64),
    (STORE_AND_FWD_FLAG, DataType::Utf8),
];

/// Columns of the cleaned artifact, in output order.
pub const OUTPUT_COLUMNS: [&str; 27] = [
    ID,
    VENDOR_ID,
    PICKUP_DATETIME,
    DROPOFF_DATETIME,
    PICKUP_DATE,
    PICKUP_MONTH,
    PICKUP_HOUR,
    PICKUP_DAY_OF_WEEK,
    PICKUP_DAY_NAME,
    IS_PICKUP_WEEKEND,
    IS_PICKUP_PEAK_HOUR,
    TIME_OF_DAY,
    PICKUP_LONGITUDE,
    PICKUP_LATITUDE,
    DROPOFF_LONGITUDE,
    DROPOFF_LATITUDE,
    PICKUP_ZONE,
    DROPOFF_ZONE,
    PASSENGER_COUNT,
    STORE_AND_FWD_FLAG,
    TRIP_DISTANCE_KM,
    TRIP_DURATION_SECONDS,
    TRIP_DURATION_MINUTES,
    TRIP_SPEED_KMH,
    FARE_PER_KM,
    IDLE_TIME_RATIO,
    ESTIMATED_FARE,
];

/// Creates the execution context used for cleaning.
///
/// A single target partition keeps rows in input order through every stage, which is what makes
/// repeated runs produce byte-identical output.
pub fn session_context() -> SessionContext {
    SessionContext::new_with_config(SessionConfig::new().with_target_partitions(1))
}

/// Returns an error naming every column of `required` that is absent from the frame.
pub fn require_columns(df: &DataFrame, required: &[&str]) -> TripCleanerResult<()> {
    let schema = df.schema();
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|name| schema.field_with_name(None, name).is_err())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(TripCleanerError::MissingColumn(missing.join(", ")))
    }
}

fn has_column(df: &DataFrame, name: &str) -> bool {
    df.schema().field_with_name(None, name).is_ok()
}

fn lowercase_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn csv_file_extension(extension: &str) -> String {
    if extension.is_empty() {
        String::new()
    } else {
        format!(".{}", extension)
    }
}

/// Reads a table, detecting the format from the file extension.
pub async fn read_table(ctx: &SessionContext, path: &Path) -> TripCleanerResult<DataFrame> {
    if !path.is_file() {
        return Err(TripCleanerError::MissingInput(path.display().to_string()));
    }
    let path_str = path.to_string_lossy();
    let extension = lowercase_extension(path);

    let df = if extension == "parquet" {
        ctx.read_parquet(path_str.as_ref(), ParquetReadOptions::default())
            .await?
    } else {
        let file_extension = csv_file_extension(&extension);
        let options = CsvReadOptions::new()
            .has_header(true)
            .file_extension(&file_extension);
        ctx.read_csv(path_str.as_ref(), options).await?
    };
    Ok(df)
}

/// Schema with the columns of `df`, in order, all as nullable text.
fn text_schema(df: &DataFrame) -> Schema {
    let fields: Vec<Field> = df
        .schema()
        .fields()
        .iter()
        .map(|field| Field::new(field.name(), DataType::Utf8, true))
        .collect();
    Schema::new(fields)
}

/// Converts a raw column to its canonical type; unconvertible values become null.
fn canonical(name: &str, data_type: &DataType) -> Expr {
    let converted = match data_type {
        // Integers pass through floats so that `1.0` is read as 1.
        DataType::Int64 => try_cast(try_cast(col(name), DataType::Float64), DataType::Int64),
        other => try_cast(col(name), other.clone()),
    };
    converted.alias(name)
}

/// Loads raw trip records and projects them to the canonical raw schema.
///
/// Fails with [`TripCleanerError::MissingInput`] if the file does not exist and with
/// [`TripCleanerError::MissingColumn`] if any required column is absent.
pub async fn load_raw_trips(
    ctx: &SessionContext,
    path: impl AsRef<Path>,
) -> TripCleanerResult<DataFrame> {
    let path = path.as_ref();
    let mut df = read_table(ctx, path).await?;
    let required: Vec<&str> = RAW_COLUMNS.iter().map(|(name, _)| *name).collect();
    require_columns(&df, &required)?;

    let extension = lowercase_extension(path);
    if extension != "parquet" {
        // Inference only samples the leading records, so the file is read again as text.
        let schema = text_schema(&df);
        let file_extension = csv_file_extension(&extension);
        let options = CsvReadOptions::new()
            .has_header(true)
            .file_extension(&file_extension)
            .schema(&schema);
        df = ctx.read_csv(path.to_string_lossy().as_ref(), options).await?;
    }

    let mut exprs: Vec<Expr> = RAW_COLUMNS
        .iter()
        .map(|(name, data_type)| canonical(name, data_type))
        .collect();
    if has_column(&df, RAW_TRIP_DURATION) {
        exprs.push(canonical(RAW_TRIP_DURATION, &DataType::Float64));
    }
    info!("Loading raw trips from {}", path.display());
    df.select(exprs).map_err(TripCleanerError::from)
}

fn temporary_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

fn write_csv_batches(path: &Path, schema: SchemaRef, batches: &[RecordBatch]) -> TripCleanerResult<()> {
    let file = BufWriter::new(File::create(path)?);
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    // The header is written even when no trip survived.
    writer.write(&RecordBatch::new_empty(schema))?;
    for batch in batches {
        writer.write(batch)?;
    }
    let mut inner = writer.into_inner();
    inner.flush()?;
    Ok(())
}

fn write_parquet_batches(
    path: &Path,
    schema: SchemaRef,
    batches: &[RecordBatch],
) -> TripCleanerResult<()> {
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    for batch in batches {
        writer.write(batch)?;
    }
    writer.close()?;
    Ok(())
}

/// Runs `write` against a temporary sibling of `path` and renames the result into place.
///
/// A failure never leaves a partial artifact at `path`.
fn write_atomically(
    path: &Path,
    write: impl FnOnce(&Path) -> TripCleanerResult<()>,
) -> TripCleanerResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let partial = temporary_sibling(path);
    if let Err(e) = write(&partial) {
        let _ = std::fs::remove_file(&partial);
        return Err(e);
    }
    std::fs::rename(&partial, path)?;
    Ok(())
}

/// Writes record batches as a CSV file with a header row.
pub fn write_csv(
    path: impl AsRef<Path>,
    schema: SchemaRef,
    batches: &[RecordBatch],
) -> TripCleanerResult<()> {
    write_atomically(path.as_ref(), |partial| {
        write_csv_batches(partial, schema, batches)
    })
}

/// Writes record batches as a Parquet file.
pub fn write_parquet(
    path: impl AsRef<Path>,
    schema: SchemaRef,
    batches: &[RecordBatch],
) -> TripCleanerResult<()> {
    write_atomically(path.as_ref(), |partial| {
        write_parquet_batches(partial, schema, batches)
    })
}

/// Executes the frame and writes it to `path`. Returns the number of rows written.
///
/// A `.parquet` extension selects Parquet; anything else is written as CSV.
pub async fn write_clean_trips(df: DataFrame, path: impl AsRef<Path>) -> TripCleanerResult<usize> {
    let path = path.as_ref();
    let schema = df.schema().inner().clone();
    let batches = df.collect().await?;
    let rows = batches.iter().map(|b| b.num_rows()).sum();
    let is_parquet = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("parquet"));
    if is_parquet {
        write_parquet(path, schema, &batches)?;
    } else {
        write_csv(path, schema, &batches)?;
    }
    info!("Wrote {} cleaned trips to {}", rows, path.display());
    Ok(rows)
}
