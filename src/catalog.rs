//! # OSCAR Dataset Catalog and Snapshot Selection
//!
//! OSCAR publishes one velocity snapshot per file. Each file name carries the
//! snapshot's time as a whole number of days since the dataset epoch:
//!
//! ```text
//! oscar_vel <digits> .nc.gz        e.g. oscar_vel9134.nc.gz
//! ```
//!
//! ## Selection Pipeline
//! 1. **List**: fetch the THREDDS catalog and read the `name` of every
//!    `<dataset>` element matching the grammar above (anything else is ignored)
//! 2. **Decode**: turn the embedded day-offset into a UTC timestamp using the
//!    configured CF time-unit string (`"days since 1992-10-05 00:00:00"`)
//! 3. **Pick**: keep the snapshot whose timestamp is closest to the target
//! 4. **Rebuild**: the returned file name is re-encoded from the picked
//!    timestamp, not copied from the catalog entry
//!
//! Step 4 means a catalog entry with leading zeros (`oscar_vel0100.nc.gz`)
//! comes back as `oscar_vel100.nc.gz`.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use tracing::{debug, info};

/// File name prefix shared by all OSCAR velocity snapshots.
pub const FILE_PREFIX: &str = "oscar_vel";

/// File name suffix of the compressed snapshots.
pub const FILE_SUFFIX: &str = ".nc.gz";

/// Time-unit string used by OSCAR third-degree products.
pub const DEFAULT_TIME_UNITS: &str = "days since 1992-10-05 00:00:00";

/// Errors from catalog listing and snapshot selection.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// No catalog identifier carried a decodable date
    #[error("no candidate dataset in catalog")]
    NoCandidateDataset,

    /// The configured time-unit string is not `<unit> since <timestamp>`
    #[error("invalid time units: '{0}'")]
    InvalidTimeUnits(String),

    /// Catalog listing request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Catalog document is not well-formed XML
    #[error("catalog XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// Step size of a CF time axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeStep {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeStep {
    fn seconds(self) -> f64 {
        match self {
            TimeStep::Seconds => 1.0,
            TimeStep::Minutes => 60.0,
            TimeStep::Hours => 3600.0,
            TimeStep::Days => 86400.0,
        }
    }
}

/// Parsed CF `"<unit> since <epoch>"` time convention.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeUnits {
    pub step: TimeStep,
    pub epoch: DateTime<Utc>,
}

impl TimeUnits {
    /// Parse a CF time-unit string such as `"days since 1992-10-05 00:00:00"`.
    ///
    /// The epoch accepts `YYYY-MM-DD HH:MM:SS`, the `T`-separated form, or a
    /// bare date.
    pub fn parse(units: &str) -> Result<Self, CatalogError> {
        let invalid = || CatalogError::InvalidTimeUnits(units.to_string());

        let (unit, base) = units.split_once(" since ").ok_or_else(invalid)?;
        let step = match unit.trim().to_lowercase().as_str() {
            "seconds" | "second" | "s" => TimeStep::Seconds,
            "minutes" | "minute" | "min" => TimeStep::Minutes,
            "hours" | "hour" | "h" => TimeStep::Hours,
            "days" | "day" | "d" => TimeStep::Days,
            _ => return Err(invalid()),
        };

        let base = base.trim();
        let naive = NaiveDateTime::parse_from_str(base, "%Y-%m-%d %H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(base, "%Y-%m-%dT%H:%M:%S"))
            .or_else(|_| {
                NaiveDateTime::parse_from_str(&format!("{base} 00:00:00"), "%Y-%m-%d %H:%M:%S")
            })
            .map_err(|_| invalid())?;

        Ok(Self {
            step,
            epoch: Utc.from_utc_datetime(&naive),
        })
    }

    /// Numeric offset of `time` from the epoch, in this convention's steps.
    pub fn to_offset(&self, time: DateTime<Utc>) -> f64 {
        let delta = time - self.epoch;
        let secs = delta.num_milliseconds() as f64 / 1000.0;
        secs / self.step.seconds()
    }

    /// Timestamp `offset` steps after the epoch, or `None` when it falls
    /// outside the representable date range.
    pub fn from_offset(&self, offset: f64) -> Option<DateTime<Utc>> {
        let millis = (offset * self.step.seconds() * 1000.0).round();
        if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
            return None;
        }
        let delta = Duration::try_milliseconds(millis as i64)?;
        self.epoch.checked_add_signed(delta)
    }
}

impl Default for TimeUnits {
    fn default() -> Self {
        Self {
            step: TimeStep::Days,
            epoch: Utc
                .with_ymd_and_hms(1992, 10, 5, 0, 0, 0)
                .single()
                .expect("OSCAR epoch should be a valid date"),
        }
    }
}

/// Extract the day-offset from an OSCAR file name.
///
/// Only the exact grammar `oscar_vel<digits>.nc.gz` is accepted.
pub fn parse_filename(identifier: &str) -> Option<i64> {
    let digits = identifier
        .strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Build the OSCAR file name for a day-offset.
pub fn dataset_filename(offset: i64) -> String {
    format!("{FILE_PREFIX}{offset}{FILE_SUFFIX}")
}

/// Snapshot identifiers listed by a catalog, decoded with one time convention.
#[derive(Clone, Debug)]
pub struct Catalog {
    pub time_units: TimeUnits,
    pub identifiers: Vec<String>,
}

impl Catalog {
    pub fn new(time_units: TimeUnits, identifiers: Vec<String>) -> Self {
        Self {
            time_units,
            identifiers,
        }
    }

    /// Snapshot time encoded in `identifier`, or `None` if it doesn't match.
    pub fn file_date(&self, identifier: &str) -> Option<DateTime<Utc>> {
        parse_filename(identifier).and_then(|offset| self.time_units.from_offset(offset as f64))
    }

    /// Pick the snapshot closest in time to `target` and return its file name.
    ///
    /// Equal distances keep the first catalog entry. The name is rebuilt from
    /// the chosen snapshot's day-offset.
    pub fn select_closest(&self, target: DateTime<Utc>) -> Result<String, CatalogError> {
        let mut best: Option<(&str, DateTime<Utc>, Duration)> = None;
        for id in &self.identifiers {
            let Some(date) = self.file_date(id) else {
                debug!(identifier = %id, "skipping catalog entry without a date");
                continue;
            };
            let distance = (date - target).abs();
            if best.map_or(true, |(_, _, d)| distance < d) {
                best = Some((id, date, distance));
            }
        }

        let (id, date, _) = best.ok_or(CatalogError::NoCandidateDataset)?;
        let offset = self.time_units.to_offset(date).round() as i64;
        let filename = dataset_filename(offset);
        info!(
            requested = %target,
            matched = %id,
            snapshot = %date,
            filename = %filename,
            "selected dataset"
        );
        Ok(filename)
    }
}

/// List the snapshot names declared by a THREDDS catalog document.
///
/// Reads the `name` attribute of every `<dataset>` element and keeps the ones
/// matching the snapshot grammar. Text content, `urlPath` attributes and
/// other elements are never consulted. Duplicates are dropped and first-seen
/// order is kept.
pub fn extract_identifiers(document: &str) -> Result<Vec<String>, CatalogError> {
    let mut reader = Reader::from_str(document);
    reader.trim_text(true);

    let mut found: Vec<String> = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => {
                if let Some(name) = dataset_name(&e)? {
                    if parse_filename(&name).is_some() && !found.contains(&name) {
                        found.push(name);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(found)
}

/// `name` attribute of a `<dataset>` element; `None` for any other element.
fn dataset_name(e: &BytesStart) -> Result<Option<String>, CatalogError> {
    if e.local_name().as_ref() != b"dataset" {
        return Ok(None);
    }
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == b"name" {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Fetch a catalog document and list the snapshot identifiers it names.
pub async fn fetch_identifiers(url: &str) -> Result<Vec<String>, CatalogError> {
    info!(url, "fetching dataset catalog");
    let body = reqwest::get(url).await?.error_for_status()?.text().await?;
    let ids = extract_identifiers(&body)?;
    info!(count = ids.len(), "catalog listing parsed");
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(ids: &[&str]) -> Catalog {
        Catalog::new(
            TimeUnits::default(),
            ids.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn test_parse_time_units() {
        let units = TimeUnits::parse(DEFAULT_TIME_UNITS).unwrap();
        assert_eq!(units, TimeUnits::default());

        let hours = TimeUnits::parse("hours since 2000-01-01").unwrap();
        assert_eq!(hours.step, TimeStep::Hours);
        assert_eq!(hours.epoch, Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap());

        assert!(TimeUnits::parse("fortnights since 2000-01-01").is_err());
        assert!(TimeUnits::parse("days after 2000-01-01").is_err());
        assert!(TimeUnits::parse("days since yesterday").is_err());
    }

    #[test]
    fn test_offset_conversion() {
        let units = TimeUnits::default();
        let t = Utc.with_ymd_and_hms(1992, 10, 15, 12, 0, 0).unwrap();
        assert_eq!(units.to_offset(t), 10.5);
        assert_eq!(units.from_offset(10.5), Some(t));
    }

    #[test]
    fn test_parse_filename_grammar() {
        assert_eq!(parse_filename("oscar_vel9134.nc.gz"), Some(9134));
        assert_eq!(parse_filename("oscar_vel0100.nc.gz"), Some(100));
        assert_eq!(parse_filename("oscar_vel.nc.gz"), None);
        assert_eq!(parse_filename("oscar_vel12a.nc.gz"), None);
        assert_eq!(parse_filename("oscar_vel1234.nc"), None);
        assert_eq!(parse_filename("catalog.xml"), None);
    }

    #[test]
    fn test_file_date() {
        let cat = catalog(&[]);
        assert_eq!(
            cat.file_date("oscar_vel1.nc.gz"),
            Some(Utc.with_ymd_and_hms(1992, 10, 6, 0, 0, 0).unwrap())
        );
        assert_eq!(cat.file_date("readme.txt"), None);
    }

    #[test]
    fn test_select_closest_picks_nearest_offset() {
        let cat = catalog(&["oscar_vel100.nc.gz", "oscar_vel150.nc.gz", "oscar_vel200.nc.gz"]);
        let target = TimeUnits::default().from_offset(120.0).unwrap();
        assert_eq!(cat.select_closest(target).unwrap(), "oscar_vel100.nc.gz");
    }

    #[test]
    fn test_select_closest_tie_keeps_first() {
        let cat = catalog(&["oscar_vel150.nc.gz", "oscar_vel100.nc.gz"]);
        let target = TimeUnits::default().from_offset(125.0).unwrap();
        assert_eq!(cat.select_closest(target).unwrap(), "oscar_vel150.nc.gz");
    }

    #[test]
    fn test_select_closest_rebuilds_name() {
        let cat = catalog(&["oscar_vel0100.nc.gz", "notes.html"]);
        let target = TimeUnits::default().from_offset(90.0).unwrap();
        assert_eq!(cat.select_closest(target).unwrap(), "oscar_vel100.nc.gz");
    }

    #[test]
    fn test_select_closest_without_candidates() {
        let cat = catalog(&["catalog.xml", "oscar_vel.nc.gz"]);
        let err = cat.select_closest(Utc::now()).unwrap_err();
        assert!(matches!(err, CatalogError::NoCandidateDataset));
    }

    #[test]
    fn test_from_offset_out_of_range() {
        let units = TimeUnits::default();
        assert_eq!(units.from_offset(1e12), None);
        assert_eq!(units.from_offset(-1e12), None);
        assert_eq!(units.from_offset(1e300), None);
        assert_eq!(units.from_offset(f64::NAN), None);
        assert_eq!(units.from_offset(f64::INFINITY), None);
    }

    #[test]
    fn test_file_date_rejects_unrepresentable_offsets() {
        let cat = catalog(&[]);
        // overflows i64 milliseconds
        assert_eq!(cat.file_date("oscar_vel999999999999.nc.gz"), None);
        // fits in milliseconds, past the last representable date
        assert_eq!(cat.file_date("oscar_vel99999999.nc.gz"), None);
        // too many digits for i64
        assert_eq!(cat.file_date("oscar_vel99999999999999999999.nc.gz"), None);
    }

    #[test]
    fn test_select_closest_skips_overflowing_entries() {
        let cat = catalog(&["oscar_vel999999999999.nc.gz", "oscar_vel100.nc.gz"]);
        let target = TimeUnits::default().from_offset(120.0).unwrap();
        assert_eq!(cat.select_closest(target).unwrap(), "oscar_vel100.nc.gz");

        let only_bad = catalog(&["oscar_vel999999999999.nc.gz", "oscar_vel99999999.nc.gz"]);
        let err = only_bad.select_closest(target).unwrap_err();
        assert!(matches!(err, CatalogError::NoCandidateDataset));
    }

    #[test]
    fn test_extract_identifiers_reads_dataset_names() {
        let doc = r#"<?xml version="1.0" encoding="UTF-8"?>
<catalog xmlns="http://www.unidata.ucar.edu/namespaces/thredds/InvCatalog/v1.0" name="OSCAR">
  <service name="http" serviceType="HTTPServer" base="/thredds/fileServer/"/>
  <dataset name="OSCAR third degree" ID="oscar">
    <documentation type="summary">Files look like oscar_vel1.nc.gz, one per snapshot.</documentation>
    <dataset name="oscar_vel9129.nc.gz" urlPath="oscar/oscar_vel9129.nc.gz"/>
    <dataset name="oscar_vel9134.nc.gz" urlPath="oscar/oscar_vel9134.nc.gz">
      <dataSize units="Mbytes">36.1</dataSize>
    </dataset>
    <dataset name="latest" urlPath="oscar/oscar_vel2.nc.gz"/>
    <dataset name="oscar_vel_readme.txt"/>
    <dataset name="oscar_vel9139.nc"/>
    <dataset name="oscar_vel9129.nc.gz"/>
  </dataset>
</catalog>"#;
        assert_eq!(
            extract_identifiers(doc).unwrap(),
            vec!["oscar_vel9129.nc.gz", "oscar_vel9134.nc.gz"]
        );
    }

    #[test]
    fn test_extract_identifiers_rejects_malformed_xml() {
        let doc = r#"<catalog><dataset name="oscar_vel1.nc.gz"></catalog>"#;
        let err = extract_identifiers(doc).unwrap_err();
        assert!(matches!(err, CatalogError::Xml(_)));
    }
}
