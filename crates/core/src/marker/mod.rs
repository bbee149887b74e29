use serde::{Deserialize, Serialize};

use crate::SeismicEvent;

const LABEL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Describes how an event's magnitude is routed to a marker size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerStyle {
    pub min_size: f64,
    pub size_scale: f64,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            min_size: 4.0,
            size_scale: 3.0,
        }
    }
}

impl MarkerStyle {
    /// `max(min_size, magnitude * size_scale)`; tiny and negative magnitudes
    /// still get a visible marker.
    pub fn size_for(&self, magnitude: f64) -> f64 {
        let scaled = magnitude * self.size_scale;
        if scaled.is_nan() {
            self.min_size
        } else {
            scaled.max(self.min_size)
        }
    }

    pub fn marker(&self, event: &SeismicEvent) -> Marker {
        Marker {
            latitude: event.latitude,
            longitude: event.longitude,
            size: self.size_for(event.magnitude),
            label: label_for(event),
        }
    }
}

/// Concrete values handed to the marker layer for a revealed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub latitude: f64,
    pub longitude: f64,
    pub size: f64,
    pub label: String,
}

/// Hover text for an event.
pub fn label_for(event: &SeismicEvent) -> String {
    format!(
        "Mag: {}\nLocation: {}\nTime: {}\nDepth: {} km",
        event.magnitude,
        event.place,
        event.time.format(LABEL_TIME_FORMAT),
        event.depth
    )
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn size_is_clamped_to_minimum() {
        let style = MarkerStyle::default();
        assert_eq!(style.size_for(5.0), 15.0);
        assert_eq!(style.size_for(1.0), 4.0);
        assert_eq!(style.size_for(-0.5), 4.0);
        assert_eq!(style.size_for(f64::NAN), 4.0);
    }

    #[test]
    fn marker_carries_position_and_label() {
        let event = SeismicEvent::new(
            Utc.with_ymd_and_hms(2025, 8, 18, 3, 4, 5).unwrap(),
            -21.5,
            -68.25,
            4.6,
        )
        .with_depth(112.0)
        .with_place("Antofagasta, Chile");

        let marker = MarkerStyle::default().marker(&event);

        assert_eq!(marker.latitude, -21.5);
        assert_eq!(marker.longitude, -68.25);
        assert!((marker.size - 13.8).abs() < 1e-9);
        assert_eq!(
            marker.label,
            "Mag: 4.6\nLocation: Antofagasta, Chile\nTime: 2025-08-18 03:04:05\nDepth: 112 km"
        );
    }
}
