//! Acquisition of seismic events for a date range.

mod records;

use std::{fmt, path::PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

pub use records::parse_timestamp;

use crate::{config::SourceConfig, QuakeReplayError, Result, SeismicEvent};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive range of event dates to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(QuakeReplayError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// True when `date` lies inside the range.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[derive(Debug, Serialize)]
struct EventQuery {
    start_date: String,
    end_date: String,
}

impl From<&DateRange> for EventQuery {
    fn from(range: &DateRange) -> Self {
        Self {
            start_date: range.start.format(DATE_FORMAT).to_string(),
            end_date: range.end.format(DATE_FORMAT).to_string(),
        }
    }
}

/// Produces the events for a date range. Implementations do not need to sort;
/// the store does that.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch(&self, range: &DateRange) -> Result<Vec<SeismicEvent>>;

    /// Short description used in log lines.
    fn describe(&self) -> String;
}

/// Queries the event API with a JSON `POST`.
pub struct HttpEventSource {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpEventSource {
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let url = config
            .api_url
            .clone()
            .ok_or_else(|| QuakeReplayError::msg("no event API URL configured"))?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            url,
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn fetch(&self, range: &DateRange) -> Result<Vec<SeismicEvent>> {
        tracing::info!(url = %self.url, %range, "requesting events");

        let mut request = self.client.post(&self.url).json(&EventQuery::from(range));
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }
        let response = request.send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(QuakeReplayError::Status {
                status: status.as_u16(),
                body,
            });
        }
        records::events_from_body(&body)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Reads a saved API response from disk and keeps the events inside the
/// requested range.
pub struct FileEventSource {
    path: PathBuf,
}

impl FileEventSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl EventSource for FileEventSource {
    async fn fetch(&self, range: &DateRange) -> Result<Vec<SeismicEvent>> {
        let body = tokio::fs::read_to_string(&self.path).await?;
        let mut events = records::events_from_body(&body)?;
        events.retain(|event| range.contains(event.time.date_naive()));
        tracing::info!(path = ?self.path, %range, events = events.len(), "read events from file");
        Ok(events)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
