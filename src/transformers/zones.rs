//! ## Zone classification
//!
//! [`ZoneMapper`] classifies the pickup and the dropoff point of every trip into one of the named
//! zones of an ordered zone table. Zones are tested in table order and the first zone whose
//! rectangle contains the point wins; a point inside no zone is unclassified (null).
//!
//! [`classify_zone`] is the same rule for a single point.

use crate::audit::ExclusionLog;
use crate::dataset::{
    DROPOFF_LATITUDE, DROPOFF_LONGITUDE, DROPOFF_ZONE, PICKUP_LATITUDE, PICKUP_LONGITUDE,
    PICKUP_ZONE,
};
use crate::exceptions::{TripCleanerError, TripCleanerResult};
use crate::impl_stage;
use crate::settings::Zone;
use crate::transformers::helpers::{columns_except, inside_box, validate_columns};
use datafusion::prelude::*;
use datafusion::scalar::ScalarValue;
use datafusion_expr::expr::Case as DFCase;

/// Returns the name of the first zone containing the point, if any.
pub fn classify_zone(zones: &[Zone], longitude: f64, latitude: f64) -> Option<&str> {
    zones
        .iter()
        .find(|zone| zone.area.contains(longitude, latitude))
        .map(|zone| zone.name.as_str())
}

/// Builds the zone expression for the point given by two column names.
pub fn zone_expr(zones: &[Zone], longitude: &str, latitude: &str) -> Expr {
    if zones.is_empty() {
        return lit(ScalarValue::Utf8(None));
    }
    Expr::Case(DFCase {
        expr: None,
        when_then_expr: zones
            .iter()
            .map(|zone| {
                (
                    Box::new(inside_box(longitude, latitude, &zone.area)),
                    Box::new(lit(zone.name.as_str())),
                )
            })
            .collect(),
        else_expr: None,
    })
}

/// Adds `pickup_zone` and `dropoff_zone` columns.
pub struct ZoneMapper {
    pub zones: Vec<Zone>,
}

impl ZoneMapper {
    pub fn new(zones: Vec<Zone>) -> Self {
        Self { zones }
    }

    /// This stage removes nothing, so there is nothing to audit.
    pub async fn inspect(&self, df: &DataFrame, _log: &mut ExclusionLog) -> TripCleanerResult<()> {
        validate_columns(
            df,
            &[
                PICKUP_LONGITUDE,
                PICKUP_LATITUDE,
                DROPOFF_LONGITUDE,
                DROPOFF_LATITUDE,
            ],
        )
    }

    /// Returns a new DataFrame with the two zone columns appended.
    pub fn transform(&self, df: DataFrame) -> TripCleanerResult<DataFrame> {
        let mut exprs = columns_except(&df, &[PICKUP_ZONE, DROPOFF_ZONE]);
        exprs.push(zone_expr(&self.zones, PICKUP_LONGITUDE, PICKUP_LATITUDE).alias(PICKUP_ZONE));
        exprs.push(zone_expr(&self.zones, DROPOFF_LONGITUDE, DROPOFF_LATITUDE).alias(DROPOFF_ZONE));
        df.select(exprs).map_err(TripCleanerError::from)
    }

    fn inherent_is_filter(&self) -> bool {
        false
    }
}

impl_stage!(ZoneMapper);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::default_zones;

    #[test]
    fn test_point_in_single_zone() {
        let zones = default_zones();
        assert_eq!(classify_zone(&zones, -73.98, 40.75), Some("midtown"));
        assert_eq!(classify_zone(&zones, -73.99, 40.73), Some("downtown"));
        assert_eq!(classify_zone(&zones, -73.88, 40.85), Some("bronx"));
    }

    #[test]
    fn test_point_outside_every_zone() {
        let zones = default_zones();
        assert_eq!(classify_zone(&zones, -74.40, 40.55), None);
        assert_eq!(classify_zone(&[], -73.98, 40.75), None);
    }

    #[test]
    fn test_overlap_resolves_to_first_zone() {
        // Brooklyn and Queens overlap around (40.69, -73.93); Brooklyn comes first.
        let zones = default_zones();
        assert_eq!(classify_zone(&zones, -73.93, 40.69), Some("brooklyn"));

        let mut reversed = zones.clone();
        reversed.reverse();
        assert_eq!(classify_zone(&reversed, -73.93, 40.69), Some("queens"));
    }
}
