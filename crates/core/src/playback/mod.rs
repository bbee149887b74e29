//! Time-driven reveal of an [`EventStore`].
//!
//! All playback logic lives in [`transition`], a pure function from a
//! [`PlaybackState`] and a [`PlaybackEvent`] to the next state plus a list of
//! [`Effect`]s. Nothing here owns a real timer: whoever drives the controller
//! turns `ScheduleTimer` effects into delayed `TimerFired` events and drops
//! them again on `CancelTimer`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    config::AppConfig,
    marker::{Marker, MarkerStyle},
    EventStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackMode {
    #[default]
    Idle,
    Playing,
    Stopped,
}

/// Identifies one scheduled reveal timer. A fired timer whose token no longer
/// matches the pending one is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackState {
    /// Index of the last revealed event; `None` when nothing is revealed.
    pub cursor: Option<usize>,
    pub mode: PlaybackMode,
    pub speed: u32,
    /// Pending reveal timer. Only ever set while `Playing`.
    pub timer: Option<TimerToken>,
    next_token: u64,
}

impl PlaybackState {
    pub fn new(speed: u32) -> Self {
        Self {
            cursor: None,
            mode: PlaybackMode::Idle,
            speed,
            timer: None,
            next_token: 0,
        }
    }

    /// Number of events currently revealed.
    pub fn revealed(&self) -> usize {
        self.cursor.map_or(0, |cursor| cursor + 1)
    }

    fn issue_token(&mut self) -> TimerToken {
        self.next_token += 1;
        TimerToken(self.next_token)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSettings {
    pub base_interval: Duration,
    /// Supported speed multipliers in cycling order.
    pub speeds: Vec<u32>,
    pub marker: MarkerStyle,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl PlaybackSettings {
    /// Zero and duplicate multipliers are dropped; an empty list falls back to
    /// a single `1`.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut speeds: Vec<u32> = Vec::new();
        for &speed in &config.playback.speeds {
            if speed > 0 && !speeds.contains(&speed) {
                speeds.push(speed);
            }
        }
        if speeds.is_empty() {
            speeds.push(1);
        }

        Self {
            base_interval: config.playback.base_interval(),
            speeds,
            marker: config.marker,
        }
    }

    pub fn supports(&self, speed: u32) -> bool {
        self.speeds.contains(&speed)
    }

    pub fn initial_speed(&self) -> u32 {
        self.speeds.first().copied().unwrap_or(1)
    }

    /// The multiplier after `current`, wrapping around to the first.
    pub fn next_speed(&self, current: u32) -> u32 {
        match self.speeds.iter().position(|&speed| speed == current) {
            Some(index) => self.speeds[(index + 1) % self.speeds.len()],
            None => self.initial_speed(),
        }
    }

    pub fn delay(&self, speed: u32) -> Duration {
        self.base_interval / speed.max(1)
    }
}

/// The revealed prefix of the store, ready for the marker layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub cursor: Option<usize>,
    pub total: usize,
    pub markers: Vec<Marker>,
}

impl Snapshot {
    pub fn empty(total: usize) -> Self {
        Self {
            cursor: None,
            total,
            markers: Vec::new(),
        }
    }

    pub fn capture(store: &EventStore, cursor: Option<usize>, style: &MarkerStyle) -> Self {
        let revealed = cursor.map_or(0, |cursor| cursor + 1);
        Self {
            cursor,
            total: store.len(),
            markers: store
                .prefix(revealed)
                .iter()
                .map(|event| style.marker(event))
                .collect(),
        }
    }

    pub fn revealed(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    Start,
    Stop,
    Reset,
    SetSpeed(u32),
    TimerFired(TimerToken),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ScheduleTimer { token: TimerToken, delay: Duration },
    CancelTimer(TimerToken),
    EmitSnapshot(Snapshot),
}

/// Computes the next playback state for `event`.
pub fn transition(
    mut state: PlaybackState,
    store: &EventStore,
    settings: &PlaybackSettings,
    event: PlaybackEvent,
) -> (PlaybackState, Vec<Effect>) {
    let mut effects = Vec::new();

    match event {
        PlaybackEvent::Start => {
            if state.mode == PlaybackMode::Playing {
                tracing::debug!("start ignored: already playing");
            } else if store.is_empty() {
                tracing::debug!("start ignored: nothing to play");
            } else {
                state.mode = PlaybackMode::Playing;
                state.cursor = None;
                reveal_step(&mut state, store, settings, &mut effects);
            }
        }
        PlaybackEvent::Stop => {
            if state.mode == PlaybackMode::Playing {
                cancel_timer(&mut state, &mut effects);
                state.mode = PlaybackMode::Stopped;
                effects.push(Effect::EmitSnapshot(Snapshot::capture(
                    store,
                    state.cursor,
                    &settings.marker,
                )));
            }
        }
        PlaybackEvent::Reset => {
            cancel_timer(&mut state, &mut effects);
            if state.mode != PlaybackMode::Idle {
                state.mode = PlaybackMode::Stopped;
            }
            state.cursor = None;
            effects.push(Effect::EmitSnapshot(Snapshot::empty(store.len())));
        }
        PlaybackEvent::SetSpeed(speed) => {
            if settings.supports(speed) {
                state.speed = speed;
            } else {
                tracing::debug!(speed, "unsupported speed multiplier ignored");
            }
        }
        PlaybackEvent::TimerFired(token) => {
            if state.mode == PlaybackMode::Playing && state.timer == Some(token) {
                state.timer = None;
                reveal_step(&mut state, store, settings, &mut effects);
            } else {
                tracing::trace!(?token, "stale reveal timer ignored");
            }
        }
    }

    (state, effects)
}

fn cancel_timer(state: &mut PlaybackState, effects: &mut Vec<Effect>) {
    if let Some(token) = state.timer.take() {
        effects.push(Effect::CancelTimer(token));
    }
}

/// Reveals every event in the clock hour of the next unrevealed event.
fn reveal_step(
    state: &mut PlaybackState,
    store: &EventStore,
    settings: &PlaybackSettings,
    effects: &mut Vec<Effect>,
) {
    let next = state.revealed();
    let Some(first) = store.at(next) else {
        state.mode = PlaybackMode::Stopped;
        return;
    };

    let bucket = first.hour_bucket();
    let mut last = next;
    while store
        .at(last + 1)
        .is_some_and(|event| event.hour_bucket() == bucket)
    {
        last += 1;
    }

    state.cursor = Some(last);
    effects.push(Effect::EmitSnapshot(Snapshot::capture(
        store,
        state.cursor,
        &settings.marker,
    )));

    if last + 1 >= store.len() {
        state.mode = PlaybackMode::Stopped;
        return;
    }

    let token = state.issue_token();
    state.timer = Some(token);
    effects.push(Effect::ScheduleTimer {
        token,
        delay: settings.delay(state.speed),
    });
}

/// Owns the playback state together with the store it plays.
#[derive(Debug)]
pub struct PlaybackController {
    state: PlaybackState,
    store: EventStore,
    staged: Option<EventStore>,
    settings: PlaybackSettings,
}

impl PlaybackController {
    pub fn new(settings: PlaybackSettings) -> Self {
        Self {
            state: PlaybackState::new(settings.initial_speed()),
            store: EventStore::default(),
            staged: None,
            settings,
        }
    }

    pub fn with_store(settings: PlaybackSettings, store: EventStore) -> Self {
        Self {
            store,
            ..Self::new(settings)
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn cursor(&self) -> Option<usize> {
        self.state.cursor
    }

    pub fn mode(&self) -> PlaybackMode {
        self.state.mode
    }

    pub fn speed(&self) -> u32 {
        self.state.speed
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn settings(&self) -> &PlaybackSettings {
        &self.settings
    }

    /// True when a newer store is waiting for the current run to end.
    pub fn has_staged_store(&self) -> bool {
        self.staged.is_some()
    }

    /// The snapshot matching the current cursor.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.store, self.state.cursor, &self.settings.marker)
    }

    pub fn start(&mut self) -> Vec<Effect> {
        if self.state.mode != PlaybackMode::Playing {
            self.swap_in_staged();
        }
        self.apply(PlaybackEvent::Start)
    }

    pub fn stop(&mut self) -> Vec<Effect> {
        self.apply(PlaybackEvent::Stop)
    }

    pub fn reset(&mut self) -> Vec<Effect> {
        self.swap_in_staged();
        self.apply(PlaybackEvent::Reset)
    }

    pub fn set_speed(&mut self, speed: u32) -> Vec<Effect> {
        self.apply(PlaybackEvent::SetSpeed(speed))
    }

    pub fn cycle_speed(&mut self) -> Vec<Effect> {
        let next = self.settings.next_speed(self.state.speed);
        self.apply(PlaybackEvent::SetSpeed(next))
    }

    pub fn on_timer(&mut self, token: TimerToken) -> Vec<Effect> {
        self.apply(PlaybackEvent::TimerFired(token))
    }

    /// Installs a freshly fetched store. A running animation is never
    /// interrupted: the store is staged and picked up by the next `start` or
    /// `reset`.
    pub fn replace_store(&mut self, store: EventStore) -> Vec<Effect> {
        if self.state.mode == PlaybackMode::Playing {
            tracing::debug!(events = store.len(), "staging store until playback ends");
            self.staged = Some(store);
            return Vec::new();
        }

        self.staged = None;
        self.store = store;
        self.state.cursor = None;
        self.state.mode = PlaybackMode::Idle;
        vec![Effect::EmitSnapshot(Snapshot::empty(self.store.len()))]
    }

    fn apply(&mut self, event: PlaybackEvent) -> Vec<Effect> {
        let (state, effects) = transition(self.state, &self.store, &self.settings, event);
        self.state = state;
        effects
    }

    fn swap_in_staged(&mut self) {
        if let Some(store) = self.staged.take() {
            self.store = store;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::SeismicEvent;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 17, h, m, s).unwrap()
    }

    fn store_at(times: &[(u32, u32, u32)]) -> EventStore {
        EventStore::load(
            times
                .iter()
                .map(|&(h, m, s)| SeismicEvent::new(at(h, m, s), 10.0, 20.0, 3.0))
                .collect(),
        )
    }

    fn controller(times: &[(u32, u32, u32)]) -> PlaybackController {
        PlaybackController::with_store(PlaybackSettings::default(), store_at(times))
    }

    fn snapshots(effects: &[Effect]) -> Vec<&Snapshot> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::EmitSnapshot(snapshot) => Some(snapshot),
                _ => None,
            })
            .collect()
    }

    fn scheduled(effects: &[Effect]) -> Option<(TimerToken, Duration)> {
        effects.iter().find_map(|effect| match effect {
            Effect::ScheduleTimer { token, delay } => Some((*token, *delay)),
            _ => None,
        })
    }

    /// Fires every scheduled timer in order, like a scheduler with a fake
    /// clock, and collects the emitted snapshots.
    fn play_to_end(controller: &mut PlaybackController) -> Vec<Snapshot> {
        let mut effects = controller.start();
        let mut emitted = Vec::new();
        loop {
            emitted.extend(snapshots(&effects).into_iter().cloned());
            match scheduled(&effects) {
                Some((token, _)) => effects = controller.on_timer(token),
                None => break,
            }
        }
        emitted
    }

    #[test]
    fn same_hour_events_are_revealed_in_one_step() {
        let mut controller = controller(&[(10, 0, 5), (10, 0, 40), (10, 59, 59), (11, 0, 1)]);

        let effects = controller.start();
        assert_eq!(controller.cursor(), Some(2));
        assert_eq!(snapshots(&effects)[0].revealed(), 3);
        let (token, delay) = scheduled(&effects).unwrap();
        assert_eq!(delay, Duration::from_millis(500));

        let effects = controller.on_timer(token);
        assert_eq!(controller.cursor(), Some(3));
        assert_eq!(snapshots(&effects)[0].revealed(), 4);
        assert!(scheduled(&effects).is_none());
        assert_eq!(controller.mode(), PlaybackMode::Stopped);
    }

    #[test]
    fn three_hours_take_three_steps() {
        let mut controller = controller(&[
            (8, 5, 0),
            (8, 50, 0),
            (9, 10, 0),
            (11, 0, 0),
            (11, 30, 0),
        ]);

        let emitted = play_to_end(&mut controller);

        assert_eq!(emitted.len(), 3);
        assert_eq!(emitted.last().unwrap().revealed(), 5);
        assert_eq!(controller.mode(), PlaybackMode::Stopped);
        assert_eq!(controller.state().timer, None);
    }

    #[test]
    fn cursor_never_decreases_while_playing() {
        let mut controller = controller(&[(1, 0, 0), (2, 0, 0), (2, 1, 0), (3, 0, 0), (5, 0, 0)]);

        let cursors: Vec<_> = play_to_end(&mut controller)
            .iter()
            .map(|snapshot| snapshot.cursor)
            .collect();

        assert_eq!(cursors, [Some(0), Some(2), Some(3), Some(4)]);
        assert!(cursors.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn single_hour_store_finishes_without_timer() {
        let mut controller = controller(&[(4, 0, 0), (4, 30, 0)]);

        let effects = controller.start();

        assert!(scheduled(&effects).is_none());
        assert_eq!(controller.cursor(), Some(1));
        assert_eq!(controller.mode(), PlaybackMode::Stopped);
    }

    #[test]
    fn new_speed_applies_to_next_delay_only() {
        let mut controller = controller(&[(1, 0, 0), (2, 0, 0), (3, 0, 0)]);

        let (pending, delay) = scheduled(&controller.start()).unwrap();
        assert_eq!(delay, Duration::from_millis(500));

        let effects = controller.set_speed(4);
        assert!(effects.is_empty());
        assert_eq!(controller.state().timer, Some(pending));

        let effects = controller.on_timer(pending);
        let (_, delay) = scheduled(&effects).unwrap();
        assert_eq!(delay, Duration::from_millis(125));
    }

    #[test]
    fn unsupported_speed_is_ignored() {
        let mut controller = controller(&[(1, 0, 0)]);
        controller.set_speed(2);
        controller.set_speed(3);
        controller.set_speed(0);
        assert_eq!(controller.speed(), 2);
    }

    #[test]
    fn cycling_speed_wraps_around() {
        let mut controller = controller(&[(1, 0, 0)]);
        let mut seen = Vec::new();
        for _ in 0..5 {
            controller.cycle_speed();
            seen.push(controller.speed());
        }
        assert_eq!(seen, [2, 4, 8, 1, 2]);
    }

    #[test]
    fn stop_keeps_cursor_and_resyncs() {
        let mut controller = controller(&[(1, 0, 0), (2, 0, 0), (3, 0, 0)]);
        let (token, _) = scheduled(&controller.start()).unwrap();

        let effects = controller.stop();

        assert_eq!(effects[0], Effect::CancelTimer(token));
        assert_eq!(snapshots(&effects)[0].cursor, Some(0));
        assert_eq!(controller.mode(), PlaybackMode::Stopped);
        assert_eq!(controller.cursor(), Some(0));
        assert!(controller.on_timer(token).is_empty());
    }

    #[test]
    fn start_after_stop_begins_fresh_run() {
        let mut controller = controller(&[(1, 0, 0), (2, 0, 0), (3, 0, 0)]);
        let (token, _) = scheduled(&controller.start()).unwrap();
        controller.on_timer(token);
        assert_eq!(controller.cursor(), Some(1));
        controller.stop();

        let effects = controller.start();

        assert_eq!(controller.cursor(), Some(0));
        assert_eq!(snapshots(&effects)[0].revealed(), 1);
        assert_eq!(controller.mode(), PlaybackMode::Playing);
    }

    #[test]
    fn reset_while_playing_cancels_and_clears() {
        let mut controller = controller(&[(1, 0, 0), (2, 0, 0), (3, 0, 0)]);
        let (token, _) = scheduled(&controller.start()).unwrap();

        let effects = controller.reset();

        assert_eq!(effects[0], Effect::CancelTimer(token));
        assert_eq!(snapshots(&effects).len(), 1);
        assert!(snapshots(&effects)[0].is_empty());
        assert_eq!(controller.cursor(), None);
        assert_eq!(controller.mode(), PlaybackMode::Stopped);
        assert!(controller.on_timer(token).is_empty());
        assert_eq!(controller.cursor(), None);
    }

    #[test]
    fn start_on_empty_store_is_a_no_op() {
        let mut controller = PlaybackController::new(PlaybackSettings::default());
        assert!(controller.start().is_empty());
        assert_eq!(controller.mode(), PlaybackMode::Idle);
    }

    #[test]
    fn stop_and_reset_are_safe_when_not_playing() {
        let mut controller = controller(&[(1, 0, 0)]);
        assert!(controller.stop().is_empty());
        assert_eq!(controller.mode(), PlaybackMode::Idle);

        let effects = controller.reset();
        assert_eq!(effects, vec![Effect::EmitSnapshot(Snapshot::empty(1))]);
        assert_eq!(controller.mode(), PlaybackMode::Idle);
    }

    #[test]
    fn start_while_playing_is_ignored() {
        let mut controller = controller(&[(1, 0, 0), (2, 0, 0)]);
        controller.start();
        let token = controller.state().timer;

        assert!(controller.start().is_empty());
        assert_eq!(controller.state().timer, token);
    }

    #[test]
    fn new_store_waits_for_running_animation() {
        let mut controller = controller(&[(1, 0, 0), (2, 0, 0), (3, 0, 0)]);
        let (token, _) = scheduled(&controller.start()).unwrap();

        assert!(controller.replace_store(store_at(&[(6, 0, 0)])).is_empty());
        assert!(controller.has_staged_store());

        let effects = controller.on_timer(token);
        assert_eq!(snapshots(&effects)[0].total, 3);
        assert_eq!(controller.cursor(), Some(1));

        controller.stop();
        controller.start();
        assert_eq!(controller.store().len(), 1);
        assert!(!controller.has_staged_store());
        assert_eq!(controller.mode(), PlaybackMode::Stopped);
    }

    #[test]
    fn reset_picks_up_staged_store() {
        let mut controller = controller(&[(1, 0, 0), (2, 0, 0)]);
        controller.start();
        controller.replace_store(store_at(&[(6, 0, 0), (7, 0, 0), (8, 0, 0)]));

        let effects = controller.reset();

        assert_eq!(snapshots(&effects)[0].total, 3);
        assert_eq!(controller.store().len(), 3);
    }

    #[test]
    fn new_store_when_idle_takes_effect_immediately() {
        let mut controller = controller(&[(1, 0, 0), (2, 0, 0)]);
        controller.start();
        controller.stop();

        let effects = controller.replace_store(store_at(&[(6, 0, 0)]));

        assert_eq!(effects, vec![Effect::EmitSnapshot(Snapshot::empty(1))]);
        assert_eq!(controller.cursor(), None);
        assert_eq!(controller.mode(), PlaybackMode::Idle);
    }

    #[test]
    fn settings_drop_invalid_speeds() {
        let mut config = AppConfig::default();
        config.playback.speeds = vec![0, 3, 3, 6];
        let settings = PlaybackSettings::from_config(&config);
        assert_eq!(settings.speeds, vec![3, 6]);
        assert_eq!(settings.initial_speed(), 3);
        assert_eq!(settings.delay(6), Duration::from_nanos(83_333_333));

        config.playback.speeds = vec![0];
        assert_eq!(PlaybackSettings::from_config(&config).speeds, vec![1]);
    }
}
