use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
};

use serde::{Deserialize, Serialize};

use crate::{
    marker::Marker,
    overlay::{FlatLines, OverlayView},
    playback::Snapshot,
    render::RenderSink,
    Result,
};

/// Configuration options for the recording subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSettings {
    pub output_path: PathBuf,
    /// Write the flattened boundary lines with every overlay frame. Off by
    /// default; the plate dataset is large.
    #[serde(default)]
    pub include_boundaries: bool,
}

impl RecordingSettings {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            include_boundaries: false,
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Frame<'a> {
    Snapshot {
        showing: usize,
        total: usize,
        markers: &'a [Marker],
    },
    Overlay {
        visible: bool,
        polylines: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        lines: Option<FlatLines>,
    },
    Error {
        message: &'a str,
    },
}

/// Render sink that appends every frame to a JSON Lines file, so a replay can
/// be inspected or re-rendered later.
pub struct Recorder {
    settings: RecordingSettings,
    writer: BufWriter<File>,
    frames: usize,
}

impl Recorder {
    pub fn create(settings: RecordingSettings) -> Result<Self> {
        let file = File::create(&settings.output_path)?;
        tracing::info!(path = ?settings.output_path, "recording frames");
        Ok(Self {
            settings,
            writer: BufWriter::new(file),
            frames: 0,
        })
    }

    pub fn frames_written(&self) -> usize {
        self.frames
    }

    fn write(&mut self, frame: &Frame<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.writer, frame)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.frames += 1;
        Ok(())
    }
}

impl RenderSink for Recorder {
    fn present_snapshot(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.write(&Frame::Snapshot {
            showing: snapshot.revealed(),
            total: snapshot.total,
            markers: &snapshot.markers,
        })
    }

    fn present_overlay(&mut self, overlay: &OverlayView) -> Result<()> {
        let lines = if self.settings.include_boundaries {
            overlay.drawable().map(|geometry| geometry.flatten())
        } else {
            None
        };
        self.write(&Frame::Overlay {
            visible: overlay.visible,
            polylines: overlay.geometry.as_ref().map_or(0, |g| g.len()),
            lines,
        })
    }

    fn present_error(&mut self, message: &str) -> Result<()> {
        self.write(&Frame::Error { message })
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("settings", &self.settings)
            .field("frames", &self.frames)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::overlay::{GeoPoint, OverlayGeometry};

    #[test]
    fn writes_one_json_line_per_frame() {
        let path = std::env::temp_dir()
            .join(format!("quake-replay-rec-{}.jsonl", std::process::id()));
        let mut settings = RecordingSettings::new(&path);
        settings.include_boundaries = true;
        let mut recorder = Recorder::create(settings).unwrap();

        let line = vec![
            GeoPoint {
                latitude: 1.0,
                longitude: 2.0,
            },
            GeoPoint {
                latitude: 3.0,
                longitude: 4.0,
            },
        ];
        recorder.present_snapshot(&Snapshot::empty(2)).unwrap();
        recorder
            .present_overlay(&OverlayView {
                visible: true,
                geometry: Some(Arc::new(OverlayGeometry::new(vec![line]))),
            })
            .unwrap();
        recorder.present_error("Failed to fetch data: timeout").unwrap();
        assert_eq!(recorder.frames_written(), 3);

        let written = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        let frames: Vec<serde_json::Value> = written
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(frames[0]["kind"], "snapshot");
        assert_eq!(frames[0]["total"], 2);
        assert_eq!(frames[1]["kind"], "overlay");
        assert_eq!(frames[1]["lines"]["latitudes"][2], serde_json::Value::Null);
        assert_eq!(frames[2]["message"], "Failed to fetch data: timeout");
    }
}
