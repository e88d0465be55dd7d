//! # Current Velocity Lookup
//!
//! Maps a [`Query`] onto a grid cell of an open [`DatasetSession`] and reads
//! the two velocity components there.
//!
//! ## Coordinate Handling
//! - **Time**: converted to the dataset's numeric time axis with the same
//!   CF convention used for file selection
//! - **Latitude**: clamped to `[-80, 80]`, the OSCAR polar coverage limit
//! - **Longitude**: shifted onto the `[20, 420]` OSCAR axis
//! - **Depth**: matched as given, no clamping
//!
//! Each axis is resolved independently with [`closest_index`](crate::grid::closest_index).

use crate::catalog::TimeUnits;
use crate::dataset::{DatasetSession, GridIndex};
use crate::grid::GridError;
use crate::longitude;
use crate::{ExtractionMode, Query, VelocityResult};

/// Southern edge of OSCAR latitude coverage.
pub const LAT_MIN: f64 = -80.0;

/// Northern edge of OSCAR latitude coverage.
pub const LAT_MAX: f64 = 80.0;

/// Pin latitude to the dataset's coverage instead of rejecting it.
pub fn clamp_latitude(lat: f64) -> f64 {
    lat.clamp(LAT_MIN, LAT_MAX)
}

/// Resolve the nearest grid cell for `query`.
pub fn resolve_index(
    session: &DatasetSession,
    time_units: &TimeUnits,
    query: &Query,
) -> Result<GridIndex, GridError> {
    let t = time_units.to_offset(query.time);
    let lat = clamp_latitude(query.latitude);
    let lon = longitude::to_oscar(query.longitude);

    Ok(GridIndex {
        time: session.time.closest(t)?,
        depth: session.depth.closest(query.depth)?,
        latitude: session.latitude.closest(lat)?,
        longitude: session.longitude.closest(lon)?,
    })
}

/// Read the current at the grid cell nearest to `query`.
///
/// NaN components are passed through untouched; check
/// [`VelocityResult::has_data`].
pub fn lookup(
    session: &DatasetSession,
    time_units: &TimeUnits,
    query: &Query,
    mode: ExtractionMode,
) -> Result<VelocityResult, GridError> {
    let idx = resolve_index(session, time_units, query)?;
    let fields = &session.fields;
    let (north, east) = match mode {
        ExtractionMode::Instantaneous => (&fields.north, &fields.east),
        ExtractionMode::Maximum => (&fields.north_max, &fields.east_max),
    };
    Ok(VelocityResult {
        north: north.get(idx),
        east: east.get(idx),
    })
}
