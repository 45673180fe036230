//! ## Trip Cleaner
//!
//! [`TripCleaner`] assembles the full cleaning pipeline from one [`CleaningConfig`] and runs it
//! end to end: load the raw trips, run the nine stages, compute the closing statistics and write
//! the cleaned artifact.
//!
//! ```rust,no_run
//! use trip_cleaner::audit::ExclusionLog;
//! use trip_cleaner::cleaner::TripCleaner;
//! use trip_cleaner::settings::CleaningConfig;
//!
//! # async fn example() -> trip_cleaner::exceptions::TripCleanerResult<()> {
//! let cleaner = TripCleaner::new(CleaningConfig::default())?;
//! let mut log = ExclusionLog::new();
//! let report = cleaner
//!     .run("data/raw/train.csv", "data/processed/clean_trips.csv", &mut log)
//!     .await?;
//! println!("{}", report);
//! log.append_to_file("logs/excluded_records.log")?;
//! # Ok(())
//! # }
//! ```

use crate::audit::{AuditEvent, ExclusionLog};
use crate::dataset::{
    load_raw_trips, session_context, write_clean_trips, PICKUP_DATE, TRIP_DISTANCE_KM,
    TRIP_DURATION_MINUTES, TRIP_SPEED_KMH,
};
use crate::exceptions::TripCleanerResult;
use crate::make_pipeline;
use crate::pipeline::{Pipeline, PipelineOutput, StageOutcome};
use crate::settings::CleaningConfig;
use crate::transformers::deduplication::DropDuplicates;
use crate::transformers::economics::FareEstimator;
use crate::transformers::finalize::Finalizer;
use crate::transformers::geo_validation::{self, ServiceRegionFilter};
use crate::transformers::helpers::{f64_values, string_values};
use crate::transformers::kinematics::TripKinematics;
use crate::transformers::missing_values::{self, DropMissingValues};
use crate::transformers::plausibility::{self, PlausibilityFilter};
use crate::transformers::temporal::TemporalFeatures;
use crate::transformers::zones::ZoneMapper;
use datafusion::functions_aggregate::expr_fn::{avg, max, min};
use datafusion::prelude::*;
use std::fmt;
use std::path::Path;
use tracing::info;

/// Name of the deduplication stage.
pub const DEDUPLICATION_STAGE: &str = "deduplicator";

/// Closing statistics of the cleaned dataset. Averages are `None` when no trip survived.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DatasetStatistics {
    pub average_distance_km: Option<f64>,
    pub average_duration_minutes: Option<f64>,
    pub average_speed_kmh: Option<f64>,
    pub first_pickup_date: Option<String>,
    pub last_pickup_date: Option<String>,
}

impl DatasetStatistics {
    /// Computes the statistics of a finalized frame.
    pub async fn compute(df: &DataFrame) -> TripCleanerResult<Self> {
        let batches = df
            .clone()
            .aggregate(
                vec![],
                vec![
                    avg(col(TRIP_DISTANCE_KM)).alias("average_distance_km"),
                    avg(col(TRIP_DURATION_MINUTES)).alias("average_duration_minutes"),
                    avg(col(TRIP_SPEED_KMH)).alias("average_speed_kmh"),
                    min(col(PICKUP_DATE)).alias("first_pickup_date"),
                    max(col(PICKUP_DATE)).alias("last_pickup_date"),
                ],
            )?
            .collect()
            .await?;

        let Some(batch) = batches.iter().find(|b| b.num_rows() > 0) else {
            return Ok(Self::default());
        };
        let first_f64 = |i: usize| -> TripCleanerResult<Option<f64>> {
            Ok(f64_values(batch.column(i))?.first().copied().flatten())
        };
        let first_string = |i: usize| -> TripCleanerResult<Option<String>> {
            Ok(string_values(batch.column(i))?.into_iter().next().flatten())
        };
        Ok(Self {
            average_distance_km: first_f64(0)?,
            average_duration_minutes: first_f64(1)?,
            average_speed_kmh: first_f64(2)?,
            first_pickup_date: first_string(3)?,
            last_pickup_date: first_string(4)?,
        })
    }
}

/// Outcome of a complete cleaning run.
#[derive(Debug, Clone, PartialEq)]
pub struct CleaningReport {
    pub initial_rows: usize,
    /// Rows removed by each filtering stage, in execution order.
    pub removed_per_stage: Vec<StageOutcome>,
    pub final_rows: usize,
    pub statistics: DatasetStatistics,
}

impl CleaningReport {
    pub fn total_removed(&self) -> usize {
        self.initial_rows - self.final_rows
    }
}

fn fmt_optional(value: Option<f64>, unit: &str) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2} {}", v, unit))
}

impl fmt::Display for CleaningReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Initial records: {}", self.initial_rows)?;
        for outcome in &self.removed_per_stage {
            writeln!(f, "  removed by {}: {}", outcome.stage, outcome.removed())?;
        }
        writeln!(f, "Final records: {}", self.final_rows)?;
        writeln!(f, "Total removed: {}", self.total_removed())?;
        let stats = &self.statistics;
        writeln!(
            f,
            "Average distance: {}",
            fmt_optional(stats.average_distance_km, "km")
        )?;
        writeln!(
            f,
            "Average duration: {}",
            fmt_optional(stats.average_duration_minutes, "min")
        )?;
        writeln!(
            f,
            "Average speed: {}",
            fmt_optional(stats.average_speed_kmh, "km/h")
        )?;
        write!(
            f,
            "Date range: {} to {}",
            stats.first_pickup_date.as_deref().unwrap_or("n/a"),
            stats.last_pickup_date.as_deref().unwrap_or("n/a")
        )
    }
}

/// The configuration-driven trip cleaning pipeline.
#[derive(Debug, Clone, Default)]
pub struct TripCleaner {
    config: CleaningConfig,
}

impl TripCleaner {
    /// Creates a cleaner after validating the configuration.
    pub fn new(config: CleaningConfig) -> TripCleanerResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CleaningConfig {
        &self.config
    }

    /// Builds the pipeline of cleaning stages for this configuration.
    pub fn pipeline(&self) -> Pipeline {
        let config = &self.config;
        make_pipeline!(
            (DEDUPLICATION_STAGE, DropDuplicates::new()),
            (
                missing_values::STAGE_NAME,
                DropMissingValues::new(config.sample_limits.missing_values)
            ),
            (
                geo_validation::STAGE_NAME,
                ServiceRegionFilter::new(
                    config.geo_bounds,
                    config.sample_limits.invalid_coordinates
                )
            ),
            (
                "temporal normalizer",
                TemporalFeatures::new(config.temporal.clone())
            ),
            ("zone mapper", ZoneMapper::new(config.zones.clone())),
            (
                "kinematics calculator",
                TripKinematics::new(config.earth_radius_km)
            ),
            ("economics estimator", FareEstimator::new(config.fares)),
            (
                plausibility::STAGE_NAME,
                PlausibilityFilter::new(
                    config.plausibility,
                    config.geo_bounds,
                    config.sample_limits.plausibility
                )
            ),
            ("finalizer", Finalizer::new()),
        )
    }

    /// Cleans a frame of raw trips, recording every exclusion in `log`.
    pub async fn clean(
        &self,
        raw: DataFrame,
        log: &mut ExclusionLog,
    ) -> TripCleanerResult<PipelineOutput> {
        self.pipeline().run(raw, log).await
    }

    /// Loads `input`, cleans it and writes the cleaned trips to `output`.
    ///
    /// The closing summary is recorded in `log` once the artifact is written. On any error the
    /// output file is left untouched and no summary is recorded.
    pub async fn run(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        log: &mut ExclusionLog,
    ) -> TripCleanerResult<CleaningReport> {
        let ctx = session_context();
        let raw = load_raw_trips(&ctx, input).await?;
        let cleaned = self.clean(raw, log).await?;
        let statistics = DatasetStatistics::compute(&cleaned.df).await?;
        let final_rows = cleaned.final_rows();

        let written = write_clean_trips(cleaned.df, output).await?;
        debug_assert_eq!(written, final_rows);
        log.record(AuditEvent::Summary {
            initial: cleaned.initial_rows,
            final_count: final_rows,
            removed: cleaned.initial_rows - final_rows,
        });
        info!(
            "Cleaning finished: {} of {} trips kept",
            final_rows, cleaned.initial_rows
        );

        Ok(CleaningReport {
            initial_rows: cleaned.initial_rows,
            removed_per_stage: cleaned.outcomes,
            final_rows,
            statistics,
        })
    }
}
