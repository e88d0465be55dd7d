//! # Longitude Normalization
//!
//! OSCAR grids store longitude on a shifted axis running from 20°E to 420°E
//! so that the global wrap stays contiguous: everything west of 20°E is
//! carried +360° to the far end of the axis. Queries arrive in ordinary
//! geographic degrees and must be moved onto that convention before the
//! nearest-index search runs.

/// Lower bound of the OSCAR longitude convention (degrees east).
pub const OSCAR_LON_MIN: f64 = 20.0;

/// Upper bound of the OSCAR longitude convention (degrees east).
pub const OSCAR_LON_MAX: f64 = 420.0;

/// Shift `value` by whole turns until it lies within `[lower, upper]`.
///
/// The result is congruent to `value` modulo 360: values below the window
/// land in `[lower, lower + 360)`, values above it in `(upper - 360, upper]`,
/// values inside are returned as is. Runs in constant time for any finite
/// input; non-finite input yields NaN. Callers must pass `lower < upper`.
///
/// # Example
/// ```
/// use oscar_current_lib::longitude::normalize;
///
/// assert_eq!(normalize(10.0, 20.0, 420.0), 370.0);
/// assert_eq!(normalize(430.0, 20.0, 420.0), 70.0);
/// ```
pub fn normalize(value: f64, lower: f64, upper: f64) -> f64 {
    if value < lower {
        lower + (value - lower).rem_euclid(360.0)
    } else if value > upper {
        upper - (upper - value).rem_euclid(360.0)
    } else if value.is_finite() {
        value
    } else {
        f64::NAN
    }
}

/// Normalize a geographic longitude onto the OSCAR `[20, 420]` axis.
pub fn to_oscar(lon: f64) -> f64 {
    normalize(lon, OSCAR_LON_MIN, OSCAR_LON_MAX)
}
