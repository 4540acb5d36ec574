//! Synthetic signal events, grouped rolling statistics and lookback resolution.
//!
//! The crate is pure apart from calls through [`EventStore`]:
//! - [`generate_events`] produces deterministic synthetic batches.
//! - [`compute_rolling_metrics`] flags anomalies per `(source_id, signal_name)` group.
//! - [`resolve_lookback`] fetches just enough history for complete rolling windows.
//! - [`generate_and_persist`] appends batches without timestamp collisions.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

mod batch;
mod generator;
mod lookback;
mod rolling;

pub use batch::{choose_effective_start, default_run_id, generate_and_persist, GenerationReport};
pub use generator::{generate_events, stable_signal_base, GeneratorRequest};
pub use lookback::{
    lookback_satisfied, resolve_lookback, LookbackTermination, LookbackWindow,
    DEFAULT_MAX_FETCH_LIMIT, LOOKBACK_HEADROOM_FACTOR,
};
pub use rolling::{compute_rolling_metrics, RollingMetricRow};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ObservatoryError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

/// Partition key for independent time series.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct GroupKey {
    pub source_id: String,
    pub signal_name: String,
}

impl Display for GroupKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.source_id, self.signal_name)
    }
}

/// An event as produced by the generator or handed in for ingestion.
///
/// The timestamp may carry any offset and the quality score may be out of
/// range; [`RawEvent::normalize`] fixes both.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub event_id: String,
    pub event_ts: OffsetDateTime,
    pub source_id: String,
    pub signal_name: String,
    pub signal_value: f64,
    pub quality_score: f64,
    pub run_id: String,
}

impl RawEvent {
    /// Validates identifiers and values, then normalizes to UTC with a
    /// clamped quality score.
    ///
    /// # Errors
    /// Returns [`ObservatoryError::InvalidInput`] when a required identifier
    /// is empty or a numeric field is not a number.
    pub fn normalize(&self) -> Result<Event, ObservatoryError> {
        for (name, value) in [
            ("event_id", &self.event_id),
            ("source_id", &self.source_id),
            ("signal_name", &self.signal_name),
            ("run_id", &self.run_id),
        ] {
            if value.trim().is_empty() {
                return Err(ObservatoryError::InvalidInput(format!(
                    "{name} MUST be a non-empty string"
                )));
            }
        }

        if !self.signal_value.is_finite() {
            return Err(ObservatoryError::InvalidInput(format!(
                "signal_value MUST be finite for event {}",
                self.event_id
            )));
        }

        if self.quality_score.is_nan() {
            return Err(ObservatoryError::InvalidInput(format!(
                "quality_score MUST be a number for event {}",
                self.event_id
            )));
        }

        let event_ts = self.event_ts.to_offset(UtcOffset::UTC);

        Ok(Event {
            event_id: self.event_id.clone(),
            event_ts,
            event_date: event_ts.date(),
            source_id: self.source_id.clone(),
            signal_name: self.signal_name.clone(),
            signal_value: self.signal_value,
            quality_score: clamp_quality(self.quality_score),
            run_id: self.run_id.clone(),
        })
    }
}

/// A normalized, persisted event. Never mutated; corrections are new events.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_id: String,
    pub event_ts: OffsetDateTime,
    pub event_date: Date,
    pub source_id: String,
    pub signal_name: String,
    pub signal_value: f64,
    pub quality_score: f64,
    pub run_id: String,
}

impl Event {
    #[must_use]
    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            source_id: self.source_id.clone(),
            signal_name: self.signal_name.clone(),
        }
    }

    pub(crate) fn group(&self) -> (&str, &str) {
        (self.source_id.as_str(), self.signal_name.as_str())
    }
}

/// Newest-first read request against an [`EventStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchQuery {
    pub limit: Option<usize>,
    pub source_id: Option<String>,
    pub signal_name: Option<String>,
}

impl FetchQuery {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn latest(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_source_id(mut self, source_id: Option<String>) -> Self {
        self.source_id = source_id;
        self
    }

    #[must_use]
    pub fn with_signal_name(mut self, signal_name: Option<String>) -> Self {
        self.signal_name = signal_name;
        self
    }

    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        self.source_id
            .as_deref()
            .map_or(true, |source_id| event.source_id == source_id)
            && self
                .signal_name
                .as_deref()
                .map_or(true, |signal_name| event.signal_name == signal_name)
    }
}

/// Append-only event persistence consumed by the lookback resolver and the
/// generation orchestration.
pub trait EventStore {
    /// Normalizes and durably appends `events`, creating storage if absent.
    /// Either every event is stored or none is.
    ///
    /// # Errors
    /// [`ObservatoryError::InvalidInput`] when an event fails normalization,
    /// [`ObservatoryError::StoreUnavailable`] for storage failures.
    fn append(&mut self, events: &[RawEvent]) -> Result<usize, ObservatoryError>;

    /// Returns up to `query.limit` events ordered by timestamp descending.
    ///
    /// # Errors
    /// [`ObservatoryError::StoreUnavailable`] for storage failures.
    fn fetch(&self, query: &FetchQuery) -> Result<Vec<Event>, ObservatoryError>;

    /// Destructively clears every persisted event. Safe to call repeatedly.
    ///
    /// # Errors
    /// [`ObservatoryError::StoreUnavailable`] for storage failures.
    fn reset(&mut self) -> Result<(), ObservatoryError>;
}

/// Normalizes a batch, failing on the first invalid event.
///
/// # Errors
/// Returns [`ObservatoryError::InvalidInput`] for the first event that fails
/// [`RawEvent::normalize`].
pub fn normalize_events(events: &[RawEvent]) -> Result<Vec<Event>, ObservatoryError> {
    events.iter().map(RawEvent::normalize).collect()
}

#[must_use]
pub fn clamp_quality(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Parses an RFC3339 timestamp with any offset and normalizes it to UTC.
///
/// # Errors
/// Returns [`ObservatoryError::InvalidInput`] when the value has no offset
/// (a naive timestamp) or is not RFC3339.
pub fn parse_timestamp(value: &str) -> Result<OffsetDateTime, ObservatoryError> {
    match OffsetDateTime::parse(value, &Rfc3339) {
        Ok(parsed) => Ok(parsed.to_offset(UtcOffset::UTC)),
        Err(err) => {
            if PrimitiveDateTime::parse(value, &Iso8601::DEFAULT).is_ok() {
                return Err(ObservatoryError::InvalidInput(format!(
                    "timestamp must be timezone-aware: {value}"
                )));
            }
            Err(ObservatoryError::InvalidInput(format!(
                "invalid RFC3339 timestamp {value}: {err}"
            )))
        }
    }
}

/// Formats a timestamp as RFC3339 after normalizing to UTC.
///
/// # Errors
/// Returns [`ObservatoryError::InvalidInput`] when formatting fails.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, ObservatoryError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&Rfc3339)
        .map_err(|err| {
            ObservatoryError::InvalidInput(format!("failed to format RFC3339 timestamp: {err}"))
        })
}

#[must_use]
pub fn format_date(value: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        value.year(),
        u8::from(value.month()),
        value.day()
    )
}

#[must_use]
pub fn truncate_to_second(value: OffsetDateTime) -> OffsetDateTime {
    value - Duration::nanoseconds(i64::from(value.nanosecond()))
}

#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}
