use std::{path::PathBuf, sync::Arc};

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use quake_replay_core::{
    AppConfig, DateRange, EventSource, FileEventSource, FileGeometrySource, GeometrySource,
    HttpEventSource, HttpGeometrySource, OverlayCache, PlaybackMode, PlaybackSettings,
    QuakeReplayError, Recorder, RecordingSettings, RenderSink, Session, TracingSink,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> quake_replay_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Replay(args) => run_replay(&config, args).await,
        Commands::Plates { file } => run_plates(&config, file).await,
    }
}

async fn run_replay(config: &AppConfig, args: ReplayArgs) -> quake_replay_core::Result<()> {
    let range = DateRange::new(
        args.start.unwrap_or(config.source.default_start),
        args.end.unwrap_or(config.source.default_end),
    )?;
    tracing::info!(%range, "starting replay");

    let source: Arc<dyn EventSource> = match &args.events {
        Some(path) => Arc::new(FileEventSource::new(path)),
        None => Arc::new(HttpEventSource::from_config(&config.source)?),
    };
    let overlay = OverlayCache::new(geometry_source(config, args.plates_file)?);
    let sink: Box<dyn RenderSink> = match args.record {
        Some(path) => Box::new(Recorder::create(RecordingSettings::new(path))?),
        None => Box::new(TracingSink),
    };

    let (session, handle) =
        Session::new(PlaybackSettings::from_config(config), source, overlay, sink);
    let task = session.spawn();
    let mut watcher = handle.clone();

    if config.overlay.visible_on_start && !args.no_plates {
        handle.set_overlay_visible(true)?;
    }
    handle.fetch(range)?;
    let loaded = watcher.wait_for(|s| s.fetches_completed >= 1).await?;

    let outcome = if let Some(error) = loaded.last_error {
        Err(QuakeReplayError::msg(error))
    } else if loaded.total == 0 {
        tracing::warn!(%range, "no earthquakes in range, nothing to play");
        Ok(())
    } else {
        if let Some(speed) = args.speed {
            handle.set_speed(speed)?;
        }
        handle.start()?;

        let finished = tokio::select! {
            status = watcher.wait_for(|s| s.runs_started >= 1 && s.mode != PlaybackMode::Playing) => status?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, stopping playback");
                handle.stop()?;
                watcher.wait_for(|s| s.mode != PlaybackMode::Playing).await?
            }
        };
        tracing::info!(
            showing = finished.revealed,
            total = finished.total,
            "replay finished"
        );
        Ok(())
    };

    handle.shutdown()?;
    task.await
        .map_err(|err| QuakeReplayError::msg(format!("session task failed: {err}")))?;
    outcome
}

async fn run_plates(config: &AppConfig, file: Option<PathBuf>) -> quake_replay_core::Result<()> {
    let cache = OverlayCache::new(geometry_source(config, file)?);
    let geometry = cache.ensure_loaded().await?;
    let flat = geometry.flatten();

    tracing::info!(
        polylines = geometry.len(),
        points = geometry.point_count(),
        flattened = flat.latitudes.len(),
        "plate boundary summary"
    );
    Ok(())
}

fn geometry_source(
    config: &AppConfig,
    file: Option<PathBuf>,
) -> quake_replay_core::Result<Arc<dyn GeometrySource>> {
    Ok(match file {
        Some(path) => Arc::new(FileGeometrySource::new(path)),
        None => Arc::new(HttpGeometrySource::new(
            config.overlay.url.clone(),
            config.source.timeout(),
        )?),
    })
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Animated replay of earthquakes over time", long_about = None)]
struct Cli {
    /// JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch events for a date range and replay them hour by hour.
    Replay(ReplayArgs),
    /// Load the plate boundary overlay and print a summary.
    Plates {
        /// Read boundaries from a local GeoJSON file instead of the network.
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct ReplayArgs {
    /// First day to include (YYYY-MM-DD).
    #[arg(long)]
    start: Option<NaiveDate>,
    /// Last day to include (YYYY-MM-DD).
    #[arg(long)]
    end: Option<NaiveDate>,
    /// Read a saved API response instead of querying the event API.
    #[arg(long)]
    events: Option<PathBuf>,
    /// Read plate boundaries from a local GeoJSON file.
    #[arg(long)]
    plates_file: Option<PathBuf>,
    /// Do not show the plate boundary overlay.
    #[arg(long)]
    no_plates: bool,
    /// Speed multiplier (must be one of the configured speeds).
    #[arg(long)]
    speed: Option<u32>,
    /// Write every rendered frame to this JSON Lines file.
    #[arg(long)]
    record: Option<PathBuf>,
}
