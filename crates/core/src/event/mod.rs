use std::{fmt, sync::Arc};

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// A single earthquake as delivered by the data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeismicEvent {
    pub time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub magnitude: f64,
    /// Depth in kilometres.
    pub depth: f64,
    pub place: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl SeismicEvent {
    pub fn new(time: DateTime<Utc>, latitude: f64, longitude: f64, magnitude: f64) -> Self {
        Self {
            time,
            latitude,
            longitude,
            magnitude,
            depth: 0.0,
            place: String::new(),
            id: None,
        }
    }

    pub fn with_depth(mut self, depth: f64) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_place(mut self, place: impl Into<String>) -> Self {
        self.place = place.into();
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// The clock hour this event falls in.
    pub fn hour_bucket(&self) -> HourBucket {
        HourBucket::of(&self.time)
    }
}

/// Timestamp truncated to the enclosing clock hour. Events sharing a bucket
/// are revealed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HourBucket {
    pub date: NaiveDate,
    pub hour: u32,
}

impl HourBucket {
    pub fn of(time: &DateTime<Utc>) -> Self {
        Self {
            date: time.date_naive(),
            hour: time.hour(),
        }
    }
}

impl fmt::Display for HourBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:02}:00", self.date, self.hour)
    }
}

/// Immutable, time-sorted sequence of events.
///
/// A store is built once per successful fetch and never mutated afterwards.
/// Clones share the same backing slice, so anything still holding an older
/// store keeps reading a consistent sequence after a newer one replaces it.
#[derive(Debug, Clone, Default)]
pub struct EventStore {
    events: Arc<[SeismicEvent]>,
}

impl EventStore {
    /// Builds a store sorted by time. The sort is stable, so events with equal
    /// timestamps keep their incoming order.
    pub fn load(mut events: Vec<SeismicEvent>) -> Self {
        events.sort_by_key(|event| event.time);
        Self {
            events: events.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn at(&self, index: usize) -> Option<&SeismicEvent> {
        self.events.get(index)
    }

    /// The first `count` events (clamped to the store length).
    pub fn prefix(&self, count: usize) -> &[SeismicEvent] {
        &self.events[..count.min(self.events.len())]
    }

    pub fn iter(&self) -> impl Iterator<Item = &SeismicEvent> {
        self.events.iter()
    }

    /// Time of the first and last event, if any.
    pub fn time_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.events.first()?.time, self.events.last()?.time))
    }

    /// True when both handles point at the same loaded sequence.
    #[cfg(test)]
    fn same_as(&self, other: &EventStore) -> bool {
        Arc::ptr_eq(&self.events, &other.events)
    }
}
