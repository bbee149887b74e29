//! Core library for the Quake Replay application.
//!
//! The crate turns a date range of seismic events into a timed reveal
//! animation. Events are grouped by clock hour, revealed batch by batch, and
//! handed to a render sink together with an optional plate boundary overlay.
//! The playback logic is a pure state machine ([`playback`]); the [`session`]
//! module is the only place where real timers and network calls happen.

pub mod config;
pub mod error;
pub mod event;
pub mod marker;
pub mod overlay;
pub mod playback;
pub mod record;
pub mod render;
pub mod session;
pub mod source;

pub use config::{AppConfig, OverlayConfig, PlaybackConfig, SourceConfig};
pub use error::{QuakeReplayError, Result};
pub use event::{EventStore, HourBucket, SeismicEvent};
pub use marker::{Marker, MarkerStyle};
pub use overlay::{
    FileGeometrySource, GeometrySource, HttpGeometrySource, OverlayCache, OverlayGeometry,
    OverlayView,
};
pub use playback::{
    Effect, PlaybackController, PlaybackEvent, PlaybackMode, PlaybackSettings, PlaybackState,
    Snapshot,
};
pub use record::{Recorder, RecordingSettings};
pub use render::{RenderSink, RenderSync, TracingSink};
pub use session::{Session, SessionCommand, SessionHandle, SessionStatus};
pub use source::{DateRange, EventSource, FileEventSource, HttpEventSource};
