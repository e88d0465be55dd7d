//! # Change Gate
//!
//! Downstream consumers only want to hear about a current when it actually
//! changes. The gate keeps the last emitted `(magnitude, heading)` pair and
//! suppresses a new one only when **both** are approximately equal to it.
//!
//! ## Heading Convention
//! The heading is `atan(north / east)`, the single-argument arctangent. It
//! cannot tell opposite quadrants apart and gives NaN for a zero vector.
//! Downstream consumers depend on this exact value, so it is kept as is.
//!
//! ## Tolerance
//! Closeness is `|a - b| <= max(rel_tol * max(|a|, |b|), abs_tol)` with
//! `rel_tol = 1e-5` and `abs_tol = 1e-8`. NaN is never close to anything,
//! so a NaN heading always emits.

/// Default relative tolerance for change detection.
pub const REL_TOL: f64 = 1e-5;

/// Default absolute tolerance for change detection.
pub const ABS_TOL: f64 = 1e-8;

/// Relative/absolute closeness test.
pub fn is_close(a: f64, b: f64, rel_tol: f64, abs_tol: f64) -> bool {
    if a == b {
        return true;
    }
    let diff = (a - b).abs();
    diff <= (rel_tol * a.abs().max(b.abs())).max(abs_tol)
}

/// Speed (m/s) and heading (radians) of a velocity vector.
pub fn magnitude_and_heading(north: f64, east: f64) -> (f64, f64) {
    let magnitude = (north * north + east * east).sqrt();
    let heading = (north / east).atan();
    (magnitude, heading)
}

/// Last emitted values; `None` until the first emission.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EmissionState {
    pub magnitude: Option<f64>,
    pub heading: Option<f64>,
}

/// Outcome of one gate evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decision {
    pub emit: bool,
    pub magnitude: f64,
    pub heading: f64,
}

/// Hysteresis on `(magnitude, heading)` pairs.
#[derive(Clone, Debug)]
pub struct ChangeGate {
    state: EmissionState,
    rel_tol: f64,
    abs_tol: f64,
}

impl Default for ChangeGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeGate {
    pub fn new() -> Self {
        Self {
            state: EmissionState::default(),
            rel_tol: REL_TOL,
            abs_tol: ABS_TOL,
        }
    }

    /// Gate primed with a previously emitted pair.
    pub fn with_last(magnitude: f64, heading: f64) -> Self {
        Self {
            state: EmissionState {
                magnitude: Some(magnitude),
                heading: Some(heading),
            },
            ..Self::new()
        }
    }

    pub fn state(&self) -> EmissionState {
        self.state
    }

    fn unchanged(&self, last: Option<f64>, new: f64) -> bool {
        last.is_some_and(|last| is_close(new, last, self.rel_tol, self.abs_tol))
    }

    /// Decide on an already derived pair and record it if it goes out.
    pub fn evaluate(&mut self, magnitude: f64, heading: f64) -> Decision {
        let suppress = self.unchanged(self.state.magnitude, magnitude)
            && self.unchanged(self.state.heading, heading);
        if !suppress {
            self.state = EmissionState {
                magnitude: Some(magnitude),
                heading: Some(heading),
            };
        }
        Decision {
            emit: !suppress,
            magnitude,
            heading,
        }
    }

    /// Derive speed and heading from the components, then [`evaluate`](Self::evaluate).
    ///
    /// The state is updated as soon as the decision is to emit, before anyone
    /// tries to deliver the update.
    pub fn should_emit(&mut self, north: f64, east: f64) -> Decision {
        let (magnitude, heading) = magnitude_and_heading(north, east);
        self.evaluate(magnitude, heading)
    }
}
