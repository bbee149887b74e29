//! Async driver that wires playback, overlay and data acquisition together.
//!
//! A [`Session`] runs as a single task. Commands arrive through a
//! [`SessionHandle`], fetches and overlay loads run as spawned tasks that
//! report back over an internal channel, and the one pending reveal timer is
//! a `sleep_until` raced in the same `select!`. Every state change is
//! published on a `watch` channel as a [`SessionStatus`].

use std::sync::Arc;

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::Instant,
};

use crate::{
    overlay::{OverlayCache, OverlayGeometry, OverlayLoad},
    playback::{Effect, PlaybackController, PlaybackMode, PlaybackSettings, TimerToken},
    render::{RenderSink, RenderSync},
    source::{DateRange, EventSource},
    EventStore, QuakeReplayError, Result, SeismicEvent,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Fetch(DateRange),
    Start,
    Stop,
    Reset,
    SetSpeed(u32),
    CycleSpeed,
    SetOverlayVisible(bool),
    ToggleOverlay,
    Shutdown,
}

/// Observable state of a running session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatus {
    pub mode: PlaybackMode,
    pub cursor: Option<usize>,
    pub revealed: usize,
    pub total: usize,
    pub speed: u32,
    /// Number of `Start` commands that began a run.
    pub runs_started: u64,
    pub overlay_visible: bool,
    pub overlay_loaded: bool,
    /// A fetch is in flight.
    pub loading: bool,
    /// Fetches whose outcome was applied. Superseded results are not counted.
    pub fetches_completed: u64,
    pub last_error: Option<String>,
}

enum Completion {
    Events {
        generation: u64,
        outcome: Result<Vec<SeismicEvent>>,
    },
    Overlay(Result<Arc<OverlayGeometry>>),
}

#[derive(Debug, Clone, Copy)]
struct PendingTimer {
    deadline: Instant,
    token: TimerToken,
}

/// Cheap, cloneable control surface for a [`Session`]. Every call returns
/// immediately; effects show up in later status updates and render frames.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    status: watch::Receiver<SessionStatus>,
}

impl SessionHandle {
    pub fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| QuakeReplayError::msg("session has shut down"))
    }

    pub fn fetch(&self, range: DateRange) -> Result<()> {
        self.send(SessionCommand::Fetch(range))
    }

    pub fn start(&self) -> Result<()> {
        self.send(SessionCommand::Start)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(SessionCommand::Stop)
    }

    pub fn reset(&self) -> Result<()> {
        self.send(SessionCommand::Reset)
    }

    pub fn set_speed(&self, speed: u32) -> Result<()> {
        self.send(SessionCommand::SetSpeed(speed))
    }

    pub fn cycle_speed(&self) -> Result<()> {
        self.send(SessionCommand::CycleSpeed)
    }

    pub fn set_overlay_visible(&self, visible: bool) -> Result<()> {
        self.send(SessionCommand::SetOverlayVisible(visible))
    }

    pub fn toggle_overlay(&self) -> Result<()> {
        self.send(SessionCommand::ToggleOverlay)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(SessionCommand::Shutdown)
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Waits until the published status satisfies `predicate`. The current
    /// value is checked first.
    pub async fn wait_for<F>(&mut self, predicate: F) -> Result<SessionStatus>
    where
        F: FnMut(&SessionStatus) -> bool,
    {
        let status = self
            .status
            .wait_for(predicate)
            .await
            .map_err(|_| QuakeReplayError::msg("session has shut down"))?;
        Ok(status.clone())
    }
}

pub struct Session {
    controller: PlaybackController,
    overlay: OverlayCache,
    source: Arc<dyn EventSource>,
    render: RenderSync,
    timer: Option<PendingTimer>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    status: watch::Sender<SessionStatus>,
    fetch_generation: u64,
    fetches_in_flight: u64,
    fetches_completed: u64,
    runs_started: u64,
    last_error: Option<String>,
}

impl Session {
    pub fn new(
        settings: PlaybackSettings,
        source: Arc<dyn EventSource>,
        overlay: OverlayCache,
        sink: Box<dyn RenderSink>,
    ) -> (Self, SessionHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (status, status_rx) = watch::channel(SessionStatus::default());

        let mut session = Self {
            controller: PlaybackController::new(settings),
            overlay,
            source,
            render: RenderSync::new(sink),
            timer: None,
            commands,
            completions_tx,
            completions,
            status,
            fetch_generation: 0,
            fetches_in_flight: 0,
            fetches_completed: 0,
            runs_started: 0,
            last_error: None,
        };
        session.publish();

        let handle = SessionHandle {
            commands: commands_tx,
            status: status_rx,
        };
        (session, handle)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        tracing::debug!(source = %self.source.describe(), "session started");
        loop {
            let timer = self.timer;
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                Some(completion) = self.completions.recv() => self.complete(completion),
                token = fire(timer) => {
                    self.timer = None;
                    let effects = self.controller.on_timer(token);
                    self.apply(effects);
                }
            }
            self.publish();
        }

        let effects = self.controller.stop();
        self.apply(effects);
        self.publish();
        tracing::debug!("session stopped");
    }

    fn handle(&mut self, command: SessionCommand) {
        tracing::debug!(?command, "session command");
        let effects = match command {
            SessionCommand::Fetch(range) => {
                self.begin_fetch(range);
                Vec::new()
            }
            SessionCommand::Start => {
                let effects = self.controller.start();
                if !effects.is_empty() {
                    self.runs_started += 1;
                }
                effects
            }
            SessionCommand::Stop => self.controller.stop(),
            SessionCommand::Reset => self.controller.reset(),
            SessionCommand::SetSpeed(speed) => self.controller.set_speed(speed),
            SessionCommand::CycleSpeed => self.controller.cycle_speed(),
            SessionCommand::SetOverlayVisible(visible) => {
                let load = self.overlay.set_visible(visible);
                self.after_overlay_change(load);
                Vec::new()
            }
            SessionCommand::ToggleOverlay => {
                let load = self.overlay.toggle_visible();
                self.after_overlay_change(load);
                Vec::new()
            }
            SessionCommand::Shutdown => Vec::new(),
        };
        self.apply(effects);
    }

    fn begin_fetch(&mut self, range: DateRange) {
        self.fetch_generation += 1;
        self.fetches_in_flight += 1;
        let generation = self.fetch_generation;
        let source = Arc::clone(&self.source);
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let outcome = source.fetch(&range).await;
            let _ = completions.send(Completion::Events {
                generation,
                outcome,
            });
        });
    }

    fn after_overlay_change(&mut self, load: Result<Option<OverlayLoad>>) {
        match load {
            Ok(Some(load)) => {
                let completions = self.completions_tx.clone();
                tokio::spawn(async move {
                    let _ = completions.send(Completion::Overlay(load.await));
                });
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "overlay update failed"),
        }
        self.push_overlay();
    }

    fn complete(&mut self, completion: Completion) {
        match completion {
            Completion::Events {
                generation,
                outcome,
            } => {
                self.fetches_in_flight = self.fetches_in_flight.saturating_sub(1);
                if generation != self.fetch_generation {
                    tracing::debug!(generation, "dropping superseded fetch result");
                    return;
                }
                self.fetches_completed += 1;
                match outcome {
                    Ok(events) => {
                        let store = EventStore::load(events);
                        tracing::info!(events = store.len(), "event store replaced");
                        self.last_error = None;
                        let effects = self.controller.replace_store(store);
                        self.apply(effects);
                    }
                    Err(err) => {
                        let message = format!("Failed to fetch data: {err}");
                        tracing::warn!(error = %err, "event fetch failed");
                        self.render.report_error(&message);
                        self.last_error = Some(message);
                    }
                }
            }
            Completion::Overlay(outcome) => {
                if let Err(err) = outcome {
                    self.render
                        .report_error(&format!("Failed to load plate boundaries: {err}"));
                }
                self.push_overlay();
            }
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::ScheduleTimer { token, delay } => {
                    self.timer = Some(PendingTimer {
                        deadline: Instant::now() + delay,
                        token,
                    });
                }
                Effect::CancelTimer(token) => {
                    if self.timer.is_some_and(|timer| timer.token == token) {
                        self.timer = None;
                    }
                }
                Effect::EmitSnapshot(snapshot) => self.render.push_snapshot(snapshot),
            }
        }
    }

    fn push_overlay(&mut self) {
        match self.overlay.view() {
            Ok(view) => self.render.push_overlay(view),
            Err(err) => tracing::warn!(error = %err, "overlay state unavailable"),
        }
    }

    fn publish(&mut self) {
        let overlay = self.overlay.view().unwrap_or_default();
        let state = self.controller.state();
        let next = SessionStatus {
            mode: state.mode,
            cursor: state.cursor,
            revealed: state.revealed(),
            total: self.controller.store().len(),
            speed: state.speed,
            runs_started: self.runs_started,
            overlay_visible: overlay.visible,
            overlay_loaded: overlay.is_loaded(),
            loading: self.fetches_in_flight > 0,
            fetches_completed: self.fetches_completed,
            last_error: self.last_error.clone(),
        };
        self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

async fn fire(timer: Option<PendingTimer>) -> TimerToken {
    match timer {
        Some(timer) => {
            tokio::time::sleep_until(timer.deadline).await;
            timer.token
        }
        None => std::future::pending().await,
    }
}
