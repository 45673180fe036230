//! # Cleaning Stages
//!
//! The submodules contain one stage each, in the order the cleaning pipeline runs them:
//!
//! 1. [`deduplication`] removes exact-duplicate rows.
//! 2. [`missing_values`] drops rows with any missing field.
//! 3. [`geo_validation`] drops rows outside the service region.
//! 4. [`temporal`] parses timestamps and derives calendar features.
//! 5. [`zones`] classifies pickup and dropoff points into named zones.
//! 6. [`kinematics`] derives distance, duration and speed.
//! 7. [`economics`] estimates fares and the idle-time ratio.
//! 8. [`plausibility`] drops rows with implausible derived values.
//! 9. [`finalize`] sanitizes, encodes and projects the output columns.

pub mod deduplication;
pub mod economics;
pub mod finalize;
pub mod geo_validation;
pub mod kinematics;
pub mod missing_values;
pub mod plausibility;
pub mod temporal;
pub mod zones;

pub(crate) mod helpers;
