//! # OSCAR Dataset Sessions
//!
//! A [`DatasetSession`] is one opened snapshot file: four coordinate axes and
//! four velocity fields, all read-only for the life of the session.
//!
//! ## Layout
//! Every field is a 4-D array indexed `(time, depth, latitude, longitude)` and
//! stored flat in row-major order. Two components (meridional/north `v`,
//! zonal/east `u`) each come in two variants:
//! - **Instantaneous**: `u`, `v`
//! - **Maximum**: `um`, `vm`
//!
//! ## Sources
//! - **JSON snapshots**: serde encoding of the session itself, used as a local
//!   cache and for fixtures
//! - **NetCDF**: OSCAR `.nc` files through the `netcdf` crate (cargo feature
//!   `netcdf`, needs libnetcdf on the host)
//!
//! Any field whose shape disagrees with the axis lengths is rejected when the
//! session is built. That check never runs per query.

use crate::grid::Axis;
use serde::{Deserialize, Serialize};
use std::{fs, io, path::Path};
use thiserror::Error;
use tracing::info;

/// Errors raised while opening or building a dataset session.
///
/// All of these are fatal at startup.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("dataset IO: {0}")]
    Io(#[from] io::Error),

    #[error("dataset snapshot decode: {0}")]
    Json(#[from] serde_json::Error),

    /// A field's dimensions don't line up with the session axes
    #[error("field '{field}' has shape {actual:?}, axes require {expected:?}")]
    ShapeMismatch {
        field: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("missing variable: {0}")]
    MissingVariable(String),

    #[error("unsupported dataset format: {0}")]
    UnsupportedFormat(String),

    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),
}

/// Position of one cell in a 4-D velocity field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridIndex {
    pub time: usize,
    pub depth: usize,
    pub latitude: usize,
    pub longitude: usize,
}

/// Variable names to read from a NetCDF snapshot.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VariableNames {
    pub time: String,
    pub depth: String,
    pub latitude: String,
    pub longitude: String,
    /// Instantaneous meridional component
    pub north: String,
    /// Instantaneous zonal component
    pub east: String,
    /// Maximum-extraction meridional component
    pub north_max: String,
    /// Maximum-extraction zonal component
    pub east_max: String,
}

impl Default for VariableNames {
    fn default() -> Self {
        Self {
            time: "time".to_string(),
            depth: "depth".to_string(),
            latitude: "latitude".to_string(),
            longitude: "longitude".to_string(),
            north: "v".to_string(),
            east: "u".to_string(),
            north_max: "vm".to_string(),
            east_max: "um".to_string(),
        }
    }
}

/// One scalar field over `(time, depth, latitude, longitude)`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VelocityField {
    pub name: String,
    pub shape: [usize; 4],
    /// Row-major samples; NaN marks masked cells (land, no coverage)
    #[serde(with = "nan_as_null")]
    pub values: Vec<f64>,
}

impl VelocityField {
    /// Build a field, checking that `values` fills `shape` exactly.
    pub fn new(
        name: impl Into<String>,
        shape: [usize; 4],
        values: Vec<f64>,
    ) -> Result<Self, DatasetError> {
        let name = name.into();
        let expected: usize = shape.iter().product();
        if values.len() != expected {
            return Err(DatasetError::ShapeMismatch {
                field: name,
                expected: vec![expected],
                actual: vec![values.len()],
            });
        }
        Ok(Self {
            name,
            shape,
            values,
        })
    }

    /// Sample at `idx`. Indices come from the session axes, so they are in range.
    pub fn get(&self, idx: GridIndex) -> f64 {
        let [_, nd, ny, nx] = self.shape;
        let flat = ((idx.time * nd + idx.depth) * ny + idx.latitude) * nx + idx.longitude;
        self.values[flat]
    }
}

/// JSON has no NaN; masked cells are stored as `null`.
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(values.iter().map(|v| (!v.is_nan()).then_some(*v)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f64>, D::Error> {
        let raw = Vec::<Option<f64>>::deserialize(d)?;
        Ok(raw.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}

/// The four velocity fields of a snapshot.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VelocityFields {
    pub north: VelocityField,
    pub east: VelocityField,
    pub north_max: VelocityField,
    pub east_max: VelocityField,
}

impl VelocityFields {
    fn iter(&self) -> impl Iterator<Item = &VelocityField> {
        [&self.north, &self.east, &self.north_max, &self.east_max].into_iter()
    }
}

/// One opened OSCAR snapshot.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DatasetSession {
    /// Snapshot file name, e.g. `oscar_vel9134.nc.gz`
    pub filename: String,
    pub time: Axis,
    pub depth: Axis,
    pub latitude: Axis,
    pub longitude: Axis,
    pub fields: VelocityFields,
}

impl DatasetSession {
    /// Assemble a session from its parts, rejecting any field whose shape
    /// disagrees with the axes.
    pub fn from_parts(
        filename: impl Into<String>,
        time: Axis,
        depth: Axis,
        latitude: Axis,
        longitude: Axis,
        fields: VelocityFields,
    ) -> Result<Self, DatasetError> {
        let session = Self {
            filename: filename.into(),
            time,
            depth,
            latitude,
            longitude,
            fields,
        };
        session.validate()?;
        Ok(session)
    }

    /// Axis lengths in field order.
    pub fn shape(&self) -> [usize; 4] {
        [
            self.time.len(),
            self.depth.len(),
            self.latitude.len(),
            self.longitude.len(),
        ]
    }

    fn validate(&self) -> Result<(), DatasetError> {
        let expected = self.shape();
        for field in self.fields.iter() {
            let expected_len: usize = expected.iter().product();
            if field.shape != expected || field.values.len() != expected_len {
                return Err(DatasetError::ShapeMismatch {
                    field: field.name.clone(),
                    expected: expected.to_vec(),
                    actual: field.shape.to_vec(),
                });
            }
        }
        Ok(())
    }

    /// Open a snapshot from disk, choosing the reader by file extension.
    pub fn open<P: AsRef<Path>>(path: P, names: &VariableNames) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let session = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::load_json(path)?,
            Some("nc") => open_netcdf(path, names)?,
            _ => return Err(DatasetError::UnsupportedFormat(path.display().to_string())),
        };
        info!(
            path = %path.display(),
            shape = ?session.shape(),
            "opened dataset"
        );
        Ok(session)
    }

    /// Load a JSON snapshot written by [`DatasetSession::save_json`].
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, DatasetError> {
        let data = fs::read(path)?;
        let session: Self = serde_json::from_slice(&data)?;
        session.validate()?;
        Ok(session)
    }

    /// Write the session as a JSON snapshot.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), DatasetError> {
        let data = serde_json::to_vec(self)?;
        fs::write(path, data)?;
        Ok(())
    }
}

#[cfg(feature = "netcdf")]
fn open_netcdf(path: &Path, names: &VariableNames) -> Result<DatasetSession, DatasetError> {
    let file = netcdf::open(path)?;

    let variable = |name: &str| {
        file.variable(name)
            .ok_or_else(|| DatasetError::MissingVariable(name.to_string()))
    };

    let read_axis = |name: &str| -> Result<Axis, DatasetError> {
        let values: Vec<f64> = variable(name)?.get_values(..)?;
        Ok(Axis::new(name, values))
    };

    let read_field = |name: &str| -> Result<VelocityField, DatasetError> {
        let var = variable(name)?;
        let dims: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        let shape: [usize; 4] =
            dims.clone()
                .try_into()
                .map_err(|_| DatasetError::ShapeMismatch {
                    field: name.to_string(),
                    expected: vec![0; 4],
                    actual: dims,
                })?;
        let fill = get_f64_attr(&var, "_FillValue").or_else(|| get_f64_attr(&var, "missing_value"));
        let raw: Vec<f64> = var.get_values(..)?;
        let values = raw
            .into_iter()
            .map(|v| match fill {
                Some(f) if v == f => f64::NAN,
                _ => v,
            })
            .collect();
        VelocityField::new(name, shape, values)
    };

    let session = DatasetSession::from_parts(
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        read_axis(&names.time)?,
        read_axis(&names.depth)?,
        read_axis(&names.latitude)?,
        read_axis(&names.longitude)?,
        VelocityFields {
            north: read_field(&names.north)?,
            east: read_field(&names.east)?,
            north_max: read_field(&names.north_max)?,
            east_max: read_field(&names.east_max)?,
        },
    )?;
    Ok(session)
}

#[cfg(feature = "netcdf")]
fn get_f64_attr(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !var.attributes().any(|attr| attr.name() == name) {
        return None;
    }
    let value = var.attribute_value(name)?.ok()?;
    f64::try_from(value).ok()
}

#[cfg(not(feature = "netcdf"))]
fn open_netcdf(path: &Path, _names: &VariableNames) -> Result<DatasetSession, DatasetError> {
    Err(DatasetError::UnsupportedFormat(format!(
        "{} (rebuild with --features netcdf)",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn field(name: &str, shape: [usize; 4]) -> VelocityField {
        let n = shape.iter().product();
        VelocityField::new(name, shape, (0..n).map(|i| i as f64).collect()).unwrap()
    }

    fn fields(shape: [usize; 4]) -> VelocityFields {
        VelocityFields {
            north: field("v", shape),
            east: field("u", shape),
            north_max: field("vm", shape),
            east_max: field("um", shape),
        }
    }

    fn axes() -> (Axis, Axis, Axis, Axis) {
        (
            Axis::new("time", vec![9134.0]),
            Axis::new("depth", vec![15.0]),
            Axis::new("latitude", vec![10.0, 0.0, -10.0]),
            Axis::new("longitude", vec![20.0, 120.0, 220.0, 320.0]),
        )
    }

    #[test]
    fn test_row_major_indexing() {
        let f = field("v", [2, 1, 3, 4]);
        let idx = GridIndex {
            time: 1,
            depth: 0,
            latitude: 2,
            longitude: 3,
        };
        assert_eq!(f.get(idx), 23.0);
    }

    #[test]
    fn test_field_value_count_checked() {
        let err = VelocityField::new("u", [1, 1, 2, 2], vec![0.0; 3]).unwrap_err();
        assert!(matches!(err, DatasetError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_from_parts_rejects_mismatched_field() {
        let (t, d, y, x) = axes();
        let mut f = fields([1, 1, 3, 4]);
        f.east_max = field("um", [1, 1, 4, 3]);
        let err = DatasetSession::from_parts("oscar_vel9134.nc.gz", t, d, y, x, f).unwrap_err();
        match err {
            DatasetError::ShapeMismatch { field, expected, .. } => {
                assert_eq!(field, "um");
                assert_eq!(expected, vec![1, 1, 3, 4]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_json_snapshot_roundtrip_through_open() {
        let (t, d, y, x) = axes();
        let session =
            DatasetSession::from_parts("oscar_vel9134.nc.gz", t, d, y, x, fields([1, 1, 3, 4]))
                .unwrap();

        let file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        session.save_json(file.path()).unwrap();
        let loaded = DatasetSession::open(file.path(), &VariableNames::default()).unwrap();
        assert_eq!(loaded, session);
    }

    #[test]
    fn test_masked_cells_survive_snapshot() {
        let (t, d, y, x) = axes();
        let mut f = fields([1, 1, 3, 4]);
        f.north.values[5] = f64::NAN;
        let session = DatasetSession::from_parts("oscar_vel9134.nc.gz", t, d, y, x, f).unwrap();

        let file = NamedTempFile::new().unwrap();
        session.save_json(file.path()).unwrap();
        let loaded = DatasetSession::load_json(file.path()).unwrap();
        assert!(loaded.fields.north.values[5].is_nan());
        assert_eq!(loaded.fields.north.values[6], 6.0);
    }

    #[test]
    fn test_corrupt_snapshot_is_rejected() {
        let (t, d, y, x) = axes();
        let mut session =
            DatasetSession::from_parts("oscar_vel9134.nc.gz", t, d, y, x, fields([1, 1, 3, 4]))
                .unwrap();
        // bypass from_parts to simulate a tampered cache file
        session.latitude.values.pop();

        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), serde_json::to_vec(&session).unwrap()).unwrap();
        assert!(matches!(
            DatasetSession::load_json(file.path()),
            Err(DatasetError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_extension() {
        let err = DatasetSession::open("/tmp/currents.grib2", &VariableNames::default()).unwrap_err();
        assert!(matches!(err, DatasetError::UnsupportedFormat(_)));
    }

    #[cfg(not(feature = "netcdf"))]
    #[test]
    fn test_netcdf_needs_feature() {
        let err =
            DatasetSession::open("/tmp/oscar_vel9134.nc", &VariableNames::default()).unwrap_err();
        assert!(matches!(err, DatasetError::UnsupportedFormat(_)));
    }
}
