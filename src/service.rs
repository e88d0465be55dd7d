//! # Current Service
//!
//! [`CurrentService`] owns everything a running session needs: the open
//! snapshot, the time convention, the extraction mode, the change gate and
//! the optional downstream sender. Handlers take `&mut self`, so inbound
//! queries and position updates are processed one at a time and the gate
//! never sees concurrent read-modify-write.
//!
//! ## Inbound Paths
//! - **Query** ([`CurrentService::handle_query`]): answer with the current
//!   vector or "no data"; never touches the gate
//! - **Position feed** ([`CurrentService::handle_position`]): look up, gate,
//!   and forward approved updates downstream

use crate::catalog::TimeUnits;
use crate::dataset::DatasetSession;
use crate::gate::{magnitude_and_heading, ChangeGate};
use crate::grid::GridError;
use crate::lookup::lookup;
use crate::notify::{CurrentUpdate, UpdateSender};
use crate::{ExtractionMode, Query, VelocityResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::str::FromStr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Query-scoped failures. None of them leave the session inconsistent.
#[derive(Error, Debug, PartialEq)]
pub enum LookupError {
    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("invalid timestamp: '{0}'")]
    InvalidTime(String),

    /// Latitude, longitude or altitude is NaN or infinite
    #[error("non-finite {0} in query")]
    NonFinite(&'static str),
}

/// Requested time of a query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum QueryTime {
    Now,
    At(DateTime<Utc>),
}

impl QueryTime {
    pub fn resolve(self) -> DateTime<Utc> {
        match self {
            QueryTime::Now => Utc::now(),
            QueryTime::At(t) => t,
        }
    }
}

impl FromStr for QueryTime {
    type Err = LookupError;

    /// Accepts `now`, RFC 3339, `YYYY-MM-DD HH:MM:SS` / `YYYY-MM-DDTHH:MM:SS` (UTC)
    /// or a bare date.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("now") {
            return Ok(QueryTime::Now);
        }
        parse_timestamp(s)
            .map(QueryTime::At)
            .ok_or_else(|| LookupError::InvalidTime(s.to_string()))
    }
}

/// Parse a UTC timestamp in any of the forms [`QueryTime`] accepts.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(&format!("{s} 00:00:00"), "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(|n| n.and_utc())
}

/// Reject coordinates that can't be placed on the grid.
pub fn check_finite(query: &Query) -> Result<(), LookupError> {
    for (name, value) in [
        ("latitude", query.latitude),
        ("longitude", query.longitude),
        ("altitude", query.depth),
    ] {
        if !value.is_finite() {
            return Err(LookupError::NonFinite(name));
        }
    }
    Ok(())
}

/// Answer to a synchronous query.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryResponse {
    Velocity {
        north: f64,
        east: f64,
        magnitude: f64,
        heading: f64,
    },
    /// The nearest grid cell is masked in at least one component
    NoData,
}

impl From<VelocityResult> for QueryResponse {
    fn from(v: VelocityResult) -> Self {
        if !v.has_data() {
            return QueryResponse::NoData;
        }
        let (magnitude, heading) = magnitude_and_heading(v.north, v.east);
        QueryResponse::Velocity {
            north: v.north,
            east: v.east,
            magnitude,
            heading,
        }
    }
}

/// Rate limiter for "no data" log lines.
///
/// Vessels sitting next to a masked cell would otherwise log on every
/// position update.
#[derive(Debug)]
pub struct NoDataLog {
    interval: Duration,
    last: Option<Instant>,
    suppressed: u64,
}

impl NoDataLog {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
            suppressed: 0,
        }
    }

    /// Note one no-data result; returns whether a line was written.
    pub fn record(&mut self, query: &Query) -> bool {
        let now = Instant::now();
        let due = self
            .last
            .map_or(true, |last| now.duration_since(last) >= self.interval);
        if !due {
            self.suppressed += 1;
            return false;
        }
        warn!(
            latitude = query.latitude,
            longitude = query.longitude,
            depth = query.depth,
            suppressed = self.suppressed,
            "no current data at position"
        );
        self.last = Some(now);
        self.suppressed = 0;
        true
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}

/// One dataset session plus its emission state.
#[derive(Debug)]
pub struct CurrentService {
    session: DatasetSession,
    time_units: TimeUnits,
    mode: ExtractionMode,
    gate: ChangeGate,
    no_data: NoDataLog,
    updates: Option<UpdateSender>,
}

impl CurrentService {
    pub fn new(session: DatasetSession, time_units: TimeUnits, mode: ExtractionMode) -> Self {
        Self {
            session,
            time_units,
            mode,
            gate: ChangeGate::new(),
            no_data: NoDataLog::new(Duration::from_secs(60)),
            updates: None,
        }
    }

    /// Forward approved updates through `sender`.
    pub fn with_updates(mut self, sender: UpdateSender) -> Self {
        self.updates = Some(sender);
        self
    }

    pub fn with_no_data_interval(mut self, interval: Duration) -> Self {
        self.no_data = NoDataLog::new(interval);
        self
    }

    pub fn session(&self) -> &DatasetSession {
        &self.session
    }

    pub fn gate(&self) -> &ChangeGate {
        &self.gate
    }

    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    /// Look up the current for `query` without touching the gate.
    pub fn lookup(&self, query: &Query) -> Result<VelocityResult, LookupError> {
        check_finite(query)?;
        Ok(lookup(&self.session, &self.time_units, query, self.mode)?)
    }

    /// Synchronous query path.
    pub fn handle_query(
        &mut self,
        time: QueryTime,
        latitude: f64,
        longitude: f64,
        altitude: f64,
    ) -> Result<QueryResponse, LookupError> {
        let query = Query {
            time: time.resolve(),
            latitude,
            longitude,
            depth: altitude,
        };
        let velocity = self.lookup(&query)?;
        if !velocity.has_data() {
            self.no_data.record(&query);
        }
        Ok(velocity.into())
    }

    /// Position feed path.
    ///
    /// Returns the update when the gate approved one. The gate state moves
    /// before delivery, so an update the consumer never received still counts
    /// as the last emitted value.
    pub async fn handle_position(
        &mut self,
        query: Query,
    ) -> Result<Option<CurrentUpdate>, LookupError> {
        let velocity = self.lookup(&query)?;
        if !velocity.has_data() {
            self.no_data.record(&query);
            return Ok(None);
        }

        let decision = self.gate.should_emit(velocity.north, velocity.east);
        if !decision.emit {
            debug!(
                magnitude = decision.magnitude,
                heading = decision.heading,
                "current unchanged"
            );
            return Ok(None);
        }

        let update = CurrentUpdate::horizontal(decision.magnitude, decision.heading);
        info!(
            magnitude = update.magnitude,
            heading = update.heading,
            "current changed"
        );
        if let Some(sender) = &self.updates {
            if let Err(e) = sender.send(update).await {
                warn!(error = %e, "dropping current update");
            }
        }
        Ok(Some(update))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_query_time_parsing() {
        assert_eq!("now".parse::<QueryTime>().unwrap(), QueryTime::Now);
        assert_eq!("NOW".parse::<QueryTime>().unwrap(), QueryTime::Now);

        let expected = Utc.with_ymd_and_hms(2017, 9, 1, 6, 0, 0).unwrap();
        for s in [
            "2017-09-01T06:00:00Z",
            "2017-09-01T08:00:00+02:00",
            "2017-09-01 06:00:00",
            "2017-09-01T06:00:00",
        ] {
            assert_eq!(s.parse::<QueryTime>().unwrap(), QueryTime::At(expected), "{s}");
        }
        assert_eq!(
            "2017-09-01".parse::<QueryTime>().unwrap(),
            QueryTime::At(Utc.with_ymd_and_hms(2017, 9, 1, 0, 0, 0).unwrap())
        );
        assert!("yesterday".parse::<QueryTime>().is_err());
    }

    #[test]
    fn test_check_finite() {
        let mut query = Query {
            time: Utc::now(),
            latitude: 10.0,
            longitude: 1e20,
            depth: 0.0,
        };
        assert_eq!(check_finite(&query), Ok(()));
        query.longitude = f64::INFINITY;
        assert_eq!(check_finite(&query), Err(LookupError::NonFinite("longitude")));
        query.longitude = 0.0;
        query.depth = f64::NAN;
        assert_eq!(check_finite(&query), Err(LookupError::NonFinite("altitude")));
    }

    #[test]
    fn test_no_data_log_rate_limits() {
        let query = Query {
            time: Utc::now(),
            latitude: 0.0,
            longitude: 0.0,
            depth: 15.0,
        };
        let mut log = NoDataLog::new(Duration::from_secs(3600));
        assert!(log.record(&query));
        assert!(!log.record(&query));
        assert!(!log.record(&query));
        assert_eq!(log.suppressed(), 2);

        let mut every_time = NoDataLog::new(Duration::ZERO);
        assert!(every_time.record(&query));
        assert!(every_time.record(&query));
    }

    #[test]
    fn test_response_from_velocity() {
        let resp: QueryResponse = VelocityResult {
            north: 0.0,
            east: 0.5,
        }
        .into();
        assert_eq!(
            resp,
            QueryResponse::Velocity {
                north: 0.0,
                east: 0.5,
                magnitude: 0.5,
                heading: 0.0
            }
        );

        let masked: QueryResponse = VelocityResult {
            north: f64::NAN,
            east: 0.5,
        }
        .into();
        assert_eq!(masked, QueryResponse::NoData);
    }
}
