use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::{QuakeReplayError, Result, SeismicEvent};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Body returned by the event query endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct EventResponse {
    #[serde(default)]
    pub data: Vec<EventRecord>,
    pub count: Option<u64>,
    pub error: Option<String>,
}

/// One result row. The query service returns every column as a string, so
/// numeric fields accept either form.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct EventRecord {
    #[serde(alias = "time")]
    pub full_time: Option<String>,
    pub latitude: Option<LooseNumber>,
    pub longitude: Option<LooseNumber>,
    pub depth: Option<LooseNumber>,
    #[serde(alias = "magnitude")]
    pub mag: Option<LooseNumber>,
    pub place: Option<String>,
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum LooseNumber {
    Number(f64),
    Text(String),
}

impl LooseNumber {
    fn value(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}

impl EventRecord {
    pub(crate) fn into_event(self) -> Result<SeismicEvent> {
        let raw_time = self
            .full_time
            .as_deref()
            .ok_or_else(|| invalid("missing time"))?;
        let time = parse_timestamp(raw_time)
            .ok_or_else(|| invalid(format!("unrecognised time `{raw_time}`")))?;
        let latitude = finite(self.latitude.as_ref(), "latitude")?;
        let longitude = finite(self.longitude.as_ref(), "longitude")?;
        let magnitude = finite(self.mag.as_ref(), "magnitude")?.max(0.0);
        let depth = self
            .depth
            .as_ref()
            .and_then(LooseNumber::value)
            .filter(|value| value.is_finite())
            .unwrap_or(0.0);

        Ok(SeismicEvent {
            time,
            latitude,
            longitude,
            magnitude,
            depth,
            place: self.place.unwrap_or_default(),
            id: self.id.filter(|id| !id.is_empty()),
        })
    }
}

/// Converts rows, skipping (and logging) the ones that cannot be used.
pub(crate) fn events_from_records(records: Vec<EventRecord>) -> Vec<SeismicEvent> {
    let total = records.len();
    let events: Vec<SeismicEvent> = records
        .into_iter()
        .filter_map(|record| match record.into_event() {
            Ok(event) => Some(event),
            Err(err) => {
                tracing::warn!(error = %err, "skipping event record");
                None
            }
        })
        .collect();

    if events.len() < total {
        tracing::warn!(kept = events.len(), total, "some event records were dropped");
    }
    events
}

/// Parses a response body into events, surfacing a server-side `error` field.
pub(crate) fn events_from_body(body: &str) -> Result<Vec<SeismicEvent>> {
    let response: EventResponse = serde_json::from_str(body)?;
    if let Some(error) = response.error {
        return Err(QuakeReplayError::msg(error));
    }
    if let Some(count) = response.count {
        tracing::debug!(count, rows = response.data.len(), "event response received");
    }
    Ok(events_from_records(response.data))
}

/// Accepts `YYYY-MM-DD HH:MM:SS`, the `T`-separated form and RFC 3339.
/// Timestamps without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(raw) {
        return Some(time.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

fn finite(value: Option<&LooseNumber>, field: &str) -> Result<f64> {
    value
        .and_then(LooseNumber::value)
        .filter(|value| value.is_finite())
        .ok_or_else(|| invalid(format!("missing or invalid {field}")))
}

fn invalid(reason: impl Into<String>) -> QuakeReplayError {
    QuakeReplayError::InvalidRecord(reason.into())
}
