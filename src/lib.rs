//! # Trip Cleaner
//!
//! A cleaning and feature-derivation pipeline for urban-mobility trip records, built on
//! [Apache DataFusion](https://datafusion.apache.org/).
//!
//! Raw trips (timestamps, GPS coordinates, passenger counts, vendor identifiers) go through a
//! fixed sequence of stages: deduplication, missing-value and service-region filters, calendar
//! features, zone classification, distance/duration/speed, fare estimation, a plausibility
//! filter and a finalizer that writes the cleaned artifact. Every removed row is accounted for
//! in an [`ExclusionLog`](audit::ExclusionLog).
//!
//! - [`cleaner::TripCleaner`] runs the whole pipeline from a [`settings::CleaningConfig`].
//! - [`transformers`] holds the individual stages; [`pipeline`] chains them.
//! - [`catalog::TripCatalog`] offers read-only lookups over a cleaned artifact.
//!
//! Set `DEBUG_TRIP_CLEANER=1` to see the diagnostic logs.

pub mod audit;
pub mod catalog;
pub mod cleaner;
pub mod dataset;
pub mod exceptions;
mod logging;
pub mod pipeline;
pub mod settings;
pub mod transformers;

pub use audit::{AuditEvent, ExclusionLog, ExclusionReason};
pub use catalog::{TripCatalog, DEFAULT_QUERY_LIMIT};
pub use cleaner::{CleaningReport, DatasetStatistics, TripCleaner};
pub use exceptions::{TripCleanerError, TripCleanerResult};
pub use settings::CleaningConfig;
