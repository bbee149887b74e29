use crate::{overlay::OverlayView, playback::Snapshot, Result};

/// Receives everything the map needs to draw. How it is drawn is up to the
/// implementation.
pub trait RenderSink: Send {
    fn present_snapshot(&mut self, snapshot: &Snapshot) -> Result<()>;

    fn present_overlay(&mut self, overlay: &OverlayView) -> Result<()>;

    /// A user-facing message, e.g. a failed fetch.
    fn present_error(&mut self, message: &str) -> Result<()>;
}

/// Forwards frames to a [`RenderSink`] and remembers the most recent ones.
/// Sink failures are logged, never propagated into playback.
pub struct RenderSync {
    sink: Box<dyn RenderSink>,
    last_snapshot: Option<Snapshot>,
    last_overlay: Option<OverlayView>,
}

impl RenderSync {
    pub fn new(sink: Box<dyn RenderSink>) -> Self {
        Self {
            sink,
            last_snapshot: None,
            last_overlay: None,
        }
    }

    pub fn push_snapshot(&mut self, snapshot: Snapshot) {
        if let Err(err) = self.sink.present_snapshot(&snapshot) {
            tracing::warn!(error = %err, "render sink rejected snapshot");
        }
        self.last_snapshot = Some(snapshot);
    }

    pub fn push_overlay(&mut self, overlay: OverlayView) {
        if let Err(err) = self.sink.present_overlay(&overlay) {
            tracing::warn!(error = %err, "render sink rejected overlay");
        }
        self.last_overlay = Some(overlay);
    }

    pub fn report_error(&mut self, message: &str) {
        if let Err(err) = self.sink.present_error(message) {
            tracing::warn!(error = %err, "render sink rejected error message");
        }
    }

    pub fn last_snapshot(&self) -> Option<&Snapshot> {
        self.last_snapshot.as_ref()
    }

    pub fn last_overlay(&self) -> Option<&OverlayView> {
        self.last_overlay.as_ref()
    }
}

impl std::fmt::Debug for RenderSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSync")
            .field("last_snapshot", &self.last_snapshot.as_ref().map(Snapshot::revealed))
            .field("overlay_visible", &self.last_overlay.as_ref().map(|o| o.visible))
            .finish()
    }
}

/// Logs a one-line summary of every frame.
#[derive(Debug, Default)]
pub struct TracingSink;

impl RenderSink for TracingSink {
    fn present_snapshot(&mut self, snapshot: &Snapshot) -> Result<()> {
        let newest = snapshot.markers.last().map(|marker| marker.label.replace('\n', " | "));
        tracing::info!(
            showing = snapshot.revealed(),
            total = snapshot.total,
            newest = newest.as_deref().unwrap_or("-"),
            "frame"
        );
        Ok(())
    }

    fn present_overlay(&mut self, overlay: &OverlayView) -> Result<()> {
        tracing::info!(
            visible = overlay.visible,
            polylines = overlay.geometry.as_ref().map_or(0, |g| g.len()),
            "plate boundaries"
        );
        Ok(())
    }

    fn present_error(&mut self, message: &str) -> Result<()> {
        tracing::error!("{message}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::QuakeReplayError;

    #[derive(Clone, Default)]
    struct Failing {
        attempts: Arc<Mutex<usize>>,
    }

    impl RenderSink for Failing {
        fn present_snapshot(&mut self, _snapshot: &Snapshot) -> Result<()> {
            *self.attempts.lock().unwrap() += 1;
            Err(QuakeReplayError::msg("display gone"))
        }

        fn present_overlay(&mut self, _overlay: &OverlayView) -> Result<()> {
            Err(QuakeReplayError::msg("display gone"))
        }

        fn present_error(&mut self, _message: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn remembers_frames_even_when_sink_fails() {
        let sink = Failing::default();
        let mut render = RenderSync::new(Box::new(sink.clone()));

        render.push_snapshot(Snapshot::empty(4));
        render.push_overlay(OverlayView {
            visible: true,
            geometry: None,
        });

        assert_eq!(*sink.attempts.lock().unwrap(), 1);
        assert_eq!(render.last_snapshot().map(|s| s.total), Some(4));
        assert!(render.last_overlay().unwrap().visible);
    }
}
