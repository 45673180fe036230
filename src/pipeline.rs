//! ## Trip Cleaner Pipeline
//!
//! This module provides the core abstractions for chaining cleaning stages over a DataFusion
//! [`DataFrame`].
//!
//! ### Overview
//!
//! - The [`Stage`] trait defines one step of the pipeline. A stage first *inspects* the incoming
//!   frame (counting and sampling the rows it is about to remove, and writing them to the
//!   [`ExclusionLog`]) and then *transforms* it by rewriting the logical plan.
//! - The [`Pipeline`] struct runs named stages in order. After each stage the frame is cached in
//!   memory so that the next stage's audit queries never re-read the source.
//! - Macros [`crate::impl_stage`] and [`crate::make_pipeline`] simplify implementing stages and
//!   building pipelines.

use crate::audit::{AuditEvent, ExclusionLog};
use crate::exceptions::{TripCleanerError, TripCleanerResult};
use async_trait::async_trait;
use datafusion::prelude::*;
use std::time::Instant;
use tracing::debug;

/// Trait for the steps of the cleaning pipeline.
#[async_trait]
pub trait Stage {
    /// Inspect the frame before it is transformed and record audit events.
    ///
    /// # Arguments
    ///
    /// * `df` - The input DataFrame.
    /// * `log` - The exclusion log of the current run.
    async fn inspect(&self, df: &DataFrame, log: &mut ExclusionLog) -> TripCleanerResult<()>;

    /// Transform the input DataFrame, returning a new DataFrame with the stage applied.
    /// This only rewrites the logical plan; nothing is executed.
    fn transform(&self, df: DataFrame) -> TripCleanerResult<DataFrame>;

    /// Returns true if the stage removes rows (as opposed to only deriving columns).
    fn is_filter(&self) -> bool;
}

/// Macro to implement the [`Stage`] trait for pipeline stages.
///
/// The type must already have inherent methods:
/// - `async fn inspect(&self, &DataFrame, &mut ExclusionLog) -> TripCleanerResult<()>`
/// - `fn transform(&self, DataFrame) -> TripCleanerResult<DataFrame>`
/// - **`fn inherent_is_filter(&self) -> bool`**
///
/// # Example
///
/// ```rust,no_run
/// use datafusion::prelude::DataFrame;
/// use trip_cleaner::audit::ExclusionLog;
/// use trip_cleaner::exceptions::TripCleanerResult;
/// use trip_cleaner::impl_stage;
///
/// pub struct KeepEverything;
///
/// impl KeepEverything {
///     pub async fn inspect(&self, _df: &DataFrame, _log: &mut ExclusionLog) -> TripCleanerResult<()> {
///         Ok(())
///     }
///
///     pub fn transform(&self, df: DataFrame) -> TripCleanerResult<DataFrame> {
///         Ok(df)
///     }
///
///     pub fn inherent_is_filter(&self) -> bool {
///         false
///     }
/// }
///
/// impl_stage!(KeepEverything);
/// ```
#[macro_export]
macro_rules! impl_stage {
    ($ty:ty) => {
        #[async_trait::async_trait]
        impl $crate::pipeline::Stage for $ty {
            async fn inspect(
                &self,
                df: &datafusion::prelude::DataFrame,
                log: &mut $crate::audit::ExclusionLog,
            ) -> $crate::exceptions::TripCleanerResult<()> {
                <$ty>::inspect(self, df, log).await
            }
            fn transform(
                &self,
                df: datafusion::prelude::DataFrame,
            ) -> $crate::exceptions::TripCleanerResult<datafusion::prelude::DataFrame> {
                <$ty>::transform(self, df)
            }
            fn is_filter(&self) -> bool {
                <$ty>::inherent_is_filter(self)
            }
        }
    };
}

/// Number of rows removed by one filtering stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub stage: String,
    pub rows_in: usize,
    pub rows_out: usize,
}

impl StageOutcome {
    pub fn removed(&self) -> usize {
        self.rows_in - self.rows_out
    }
}

/// Result of running a pipeline: the final frame plus the row counts of each filtering stage.
pub struct PipelineOutput {
    pub df: DataFrame,
    pub initial_rows: usize,
    pub outcomes: Vec<StageOutcome>,
}

impl PipelineOutput {
    pub fn final_rows(&self) -> usize {
        self.outcomes
            .last()
            .map_or(self.initial_rows, |outcome| outcome.rows_out)
    }
}

/// A pipeline that chains a sequence of stages.
pub struct Pipeline {
    steps: Vec<(String, Box<dyn Stage + Send + Sync>)>,
}

impl Pipeline {
    /// Creates a new pipeline from (name, stage) pairs.
    pub fn new(steps: Vec<(String, Box<dyn Stage + Send + Sync>)>) -> Self {
        Self { steps }
    }

    /// Names of the stages, in execution order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.steps.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Runs every stage in order, recording audit events in `log`.
    pub async fn run(
        &self,
        df: DataFrame,
        log: &mut ExclusionLog,
    ) -> TripCleanerResult<PipelineOutput> {
        if self.steps.is_empty() {
            return Err(TripCleanerError::InvalidParameter(
                "Pipeline must have at least one stage.".to_string(),
            ));
        }
        let mut current_df = df.cache().await?;
        let initial_rows = current_df.clone().count().await?;
        log.record(AuditEvent::InitialCount(initial_rows));
        let mut rows = initial_rows;
        let mut outcomes = Vec::new();

        for (name, step) in self.steps.iter() {
            debug!("Running stage: {}", name);
            let start = Instant::now();
            step.inspect(&current_df, log)
                .await
                .map_err(|e| e.in_stage(name))?;
            let transformed = step.transform(current_df).map_err(|e| e.in_stage(name))?;
            current_df = transformed
                .cache()
                .await
                .map_err(|e| TripCleanerError::from(e).in_stage(name))?;

            if step.is_filter() {
                let rows_out = current_df.clone().count().await?;
                outcomes.push(StageOutcome {
                    stage: name.clone(),
                    rows_in: rows,
                    rows_out,
                });
                debug!("Stage '{}' kept {} of {} rows", name, rows_out, rows);
                rows = rows_out;
            }
            debug!("Stage '{}' completed in {:?}", name, start.elapsed());
        }

        Ok(PipelineOutput {
            df: current_df,
            initial_rows,
            outcomes,
        })
    }
}

/// Macro to simplify pipeline creation by automatically boxing stages.
///
/// # Example
///
/// ```rust,no_run
/// use trip_cleaner::make_pipeline;
/// use trip_cleaner::transformers::deduplication::DropDuplicates;
///
/// let pipeline = make_pipeline!(("deduplicate", DropDuplicates::new()));
/// ```
#[macro_export]
macro_rules! make_pipeline {
    ($(($name:expr, $stage:expr)),+ $(,)?) => {
        {
            let steps: Vec<(String, Box<dyn $crate::pipeline::Stage + Send + Sync>)> = vec![
                $(
                    ($name.to_string(), Box::new($stage)),
                )+
            ];
            $crate::pipeline::Pipeline::new(steps)
        }
    };
}
