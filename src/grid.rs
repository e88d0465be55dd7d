//! # Nearest-Neighbor Grid Indexing
//!
//! Every dimension of an OSCAR snapshot (time, depth, latitude, longitude) is
//! a 1-D coordinate axis. Mapping a continuous query value onto the grid is a
//! plain argmin over squared distance; no interpolation, no clamping. Callers
//! that need clamping (latitude) do it before calling in.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while resolving an index on a coordinate axis.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    /// The axis has no sample points, so there is nothing to be closest to.
    #[error("cannot resolve nearest index on empty axis '{0}'")]
    EmptyAxis(String),
}

/// A named, immutable sequence of coordinate samples along one dimension.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Axis {
    /// Variable name in the source dataset (e.g. `latitude`)
    pub name: String,
    /// Coordinate values in dataset units
    pub values: Vec<f64>,
}

impl Axis {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Index of the sample closest to `target`, see [`closest_index`].
    pub fn closest(&self, target: f64) -> Result<usize, GridError> {
        closest_index(&self.values, target).ok_or_else(|| GridError::EmptyAxis(self.name.clone()))
    }
}

/// Return the index minimizing `(axis[i] - target)^2`.
///
/// Ties go to the lowest index. `None` only for an empty axis. NaN samples
/// never win, since every comparison against them is false.
///
/// # Example
/// ```
/// use oscar_current_lib::grid::closest_index;
///
/// // 4 is equidistant from 3 and 5; the first one wins
/// assert_eq!(closest_index(&[1.0, 3.0, 5.0, 7.0], 4.0), Some(1));
/// ```
pub fn closest_index(axis: &[f64], target: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in axis.iter().enumerate() {
        let d = (v - target) * (v - target);
        // strict improvement only, so the first minimum is kept
        let better = match best {
            None => true,
            Some((_, best_d)) => d < best_d || (best_d.is_nan() && !d.is_nan()),
        };
        if better {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}
