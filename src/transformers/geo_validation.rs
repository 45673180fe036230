//! ## Service-region validation
//!
//! [`ServiceRegionFilter`] keeps only trips whose pickup and dropoff points both lie inside the
//! configured bounding box (edges included). Excluded trips are sampled into the exclusion log
//! with the reason "invalid coordinates".

use crate::audit::{AuditEvent, ExclusionLog, ExclusionReason};
use crate::dataset::{DROPOFF_LATITUDE, DROPOFF_LONGITUDE, ID, PICKUP_LATITUDE, PICKUP_LONGITUDE};
use crate::exceptions::{TripCleanerError, TripCleanerResult};
use crate::impl_stage;
use crate::settings::BoundingBox;
use crate::transformers::helpers::{count_matching, inside_box, sample_ids, validate_columns};
use datafusion::prelude::*;

pub const STAGE_NAME: &str = "geographic validator";

/// Predicate that is true when both trip endpoints lie inside `area`.
pub fn trip_inside_region(area: &BoundingBox) -> Expr {
    inside_box(PICKUP_LONGITUDE, PICKUP_LATITUDE, area).and(inside_box(
        DROPOFF_LONGITUDE,
        DROPOFF_LATITUDE,
        area,
    ))
}

/// Drops trips with a pickup or dropoff point outside the service region.
pub struct ServiceRegionFilter {
    pub region: BoundingBox,
    pub sample_limit: usize,
}

impl ServiceRegionFilter {
    pub fn new(region: BoundingBox, sample_limit: usize) -> Self {
        Self {
            region,
            sample_limit,
        }
    }

    fn required_columns() -> [&'static str; 5] {
        [
            ID,
            PICKUP_LONGITUDE,
            PICKUP_LATITUDE,
            DROPOFF_LONGITUDE,
            DROPOFF_LATITUDE,
        ]
    }

    /// Logs a sample of the trips about to be removed and the total removed.
    pub async fn inspect(&self, df: &DataFrame, log: &mut ExclusionLog) -> TripCleanerResult<()> {
        validate_columns(df, &Self::required_columns())?;
        let outside = trip_inside_region(&self.region).not();
        let removed = count_matching(df, outside.clone()).await?;
        if removed == 0 {
            return Ok(());
        }
        for id in sample_ids(df, outside, ID, self.sample_limit).await? {
            log.exclude(&id, STAGE_NAME, vec![ExclusionReason::InvalidCoordinates]);
        }
        log.record(AuditEvent::StageTotal {
            stage: STAGE_NAME.to_string(),
            removed,
        });
        Ok(())
    }

    /// Returns a new DataFrame with only the trips inside the service region.
    pub fn transform(&self, df: DataFrame) -> TripCleanerResult<DataFrame> {
        validate_columns(&df, &Self::required_columns())?;
        df.filter(trip_inside_region(&self.region))
            .map_err(TripCleanerError::from)
    }

    fn inherent_is_filter(&self) -> bool {
        true
    }
}

impl_stage!(ServiceRegionFilter);
