// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Live preview of patterns.
//!
//! At most one playback session exists at a time. Starting a new one stops
//! the previous session first: its pending triggers are cancelled and its
//! voices released before anything of the new session is scheduled.

use std::collections::BTreeSet;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::audio::{AudioBackend, BackendError, NoteTrigger, TriggerId, Voice};
use crate::config::{SettingsError, TrackSettings};
use crate::pattern::{Pattern, TrackKind};
use crate::timing::{beats_to_duration, TimingError};

/// Timing knobs for the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Delay between `play` and the first beat
    #[serde(default = "default_lead_in_ms")]
    pub lead_in_ms: u64,
    /// Pause after stopping a previous session, before scheduling the next
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Shortest time a note is held
    #[serde(default = "default_min_gate_ms")]
    pub min_gate_ms: u64,
    /// How long after the last note-off a session still counts as playing
    #[serde(default = "default_release_tail_ms")]
    pub release_tail_ms: u64,
}

fn default_lead_in_ms() -> u64 {
    100
}
fn default_settle_ms() -> u64 {
    50
}
fn default_min_gate_ms() -> u64 {
    20
}
fn default_release_tail_ms() -> u64 {
    500
}

/// Floor for `min_gate`, so a note-off never shares its note-on's instant
const MIN_AUDIBLE_GATE: Duration = Duration::from_millis(1);

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lead_in_ms: default_lead_in_ms(),
            settle_ms: default_settle_ms(),
            min_gate_ms: default_min_gate_ms(),
            release_tail_ms: default_release_tail_ms(),
        }
    }
}

impl SchedulerConfig {
    pub fn lead_in(&self) -> Duration {
        Duration::from_millis(self.lead_in_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Never shorter than one millisecond, whatever `min_gate_ms` says
    pub fn min_gate(&self) -> Duration {
        Duration::from_millis(self.min_gate_ms).max(MIN_AUDIBLE_GATE)
    }

    pub fn release_tail(&self) -> Duration {
        Duration::from_millis(self.release_tail_ms)
    }
}

/// Opaque handle to one playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(u64);

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session {}", self.0)
    }
}

/// What the transport is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Playing(SessionHandle),
}

/// Why playback could not start
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Nothing audible after filtering
    #[error("nothing to play: {scope} has no events")]
    EmptyPattern { scope: String },
    #[error("audio backend unavailable: {0}")]
    BackendAcquisition(#[source] BackendError),
    #[error(transparent)]
    Timing(#[from] TimingError),
    #[error("invalid track settings: {0}")]
    InvalidSettings(#[from] SettingsError),
}

/// Everything needed to silence a session
#[derive(Debug)]
struct Session {
    handle: SessionHandle,
    triggers: Vec<TriggerId>,
    voices: Vec<Voice>,
    /// Time of the last scheduled note-off
    end: Instant,
}

/// One note of the upcoming session, as offsets from the origin
struct PlannedNote {
    on: Duration,
    off: Duration,
    channel: u8,
    note: u8,
    velocity: u8,
}

/// Drives an [`AudioBackend`] from patterns, one session at a time
pub struct PlaybackScheduler<B: AudioBackend> {
    backend: B,
    config: SchedulerConfig,
    active: Option<Session>,
    next_session: u64,
}

impl<B: AudioBackend> PlaybackScheduler<B> {
    pub fn new(backend: B, config: SchedulerConfig) -> Self {
        Self {
            backend,
            config,
            active: None,
            next_session: 0,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Start playing `pattern`, or only its `filter` track.
    ///
    /// Any session already playing is stopped first, including when the
    /// new pattern turns out to be empty.
    pub fn play(
        &mut self,
        pattern: &Pattern,
        settings: &TrackSettings,
        filter: Option<TrackKind>,
    ) -> Result<SessionHandle, PlaybackError> {
        settings.validate()?;
        let plan = self.plan(pattern, settings, filter)?;

        if plan.is_empty() {
            self.stop_all();
            let scope = match filter {
                Some(kind) => format!("the {} track", kind),
                None => "the pattern".to_string(),
            };
            return Err(PlaybackError::EmptyPattern { scope });
        }

        self.backend
            .acquire()
            .map_err(PlaybackError::BackendAcquisition)?;

        if let Some(previous) = self.active.take() {
            self.stop_session(previous);
            thread::sleep(self.config.settle());
        }

        let origin = Instant::now() + self.config.lead_in();
        let mut triggers = Vec::with_capacity(plan.len() * 2);
        let mut voices = BTreeSet::new();
        let mut last_off = Duration::ZERO;

        for note in &plan {
            triggers.push(self.backend.schedule_note_on(NoteTrigger {
                at: origin + note.on,
                channel: note.channel,
                note: note.note,
                velocity: note.velocity,
            }));
            triggers.push(self.backend.schedule_note_off(NoteTrigger {
                at: origin + note.off,
                channel: note.channel,
                note: note.note,
                velocity: 0,
            }));
            voices.insert(Voice {
                channel: note.channel,
                note: note.note,
            });
            last_off = last_off.max(note.off);
        }

        self.next_session += 1;
        let handle = SessionHandle(self.next_session);
        info!(
            session = handle.id(),
            notes = plan.len(),
            tempo = settings.tempo,
            track = filter.map(TrackKind::key).unwrap_or("all"),
            "playback started"
        );

        self.active = Some(Session {
            handle,
            triggers,
            voices: voices.into_iter().collect(),
            end: origin + last_off,
        });
        Ok(handle)
    }

    /// Stop `handle` if it is the live session; otherwise do nothing
    pub fn stop(&mut self, handle: SessionHandle) {
        match self.active.take() {
            Some(session) if session.handle == handle => self.stop_session(session),
            other => {
                self.active = other;
                debug!(session = handle.id(), "stop ignored, session not active");
            }
        }
    }

    /// Stop whatever is playing
    pub fn stop_all(&mut self) {
        if let Some(session) = self.active.take() {
            self.stop_session(session);
        }
    }

    /// Current transport state; finished sessions are retired here
    pub fn state(&mut self) -> TransportState {
        self.retire_finished();
        match &self.active {
            Some(session) => TransportState::Playing(session.handle),
            None => TransportState::Idle,
        }
    }

    /// Whether `handle` is the live session
    pub fn is_active(&mut self, handle: SessionHandle) -> bool {
        self.state() == TransportState::Playing(handle)
    }

    fn retire_finished(&mut self) {
        let finished = self
            .active
            .as_ref()
            .is_some_and(|s| Instant::now() >= s.end + self.config.release_tail());
        if finished {
            if let Some(session) = self.active.take() {
                info!(session = session.handle.id(), "playback finished");
            }
        }
    }

    fn stop_session(&mut self, session: Session) {
        self.backend.cancel(&session.triggers);
        self.backend.release(&session.voices);
        info!(
            session = session.handle.id(),
            voices = session.voices.len(),
            "playback stopped"
        );
    }

    /// Offsets for every note, in pattern order
    fn plan(
        &self,
        pattern: &Pattern,
        settings: &TrackSettings,
        filter: Option<TrackKind>,
    ) -> Result<Vec<PlannedNote>, TimingError> {
        let tempo = settings.tempo_bpm();
        pattern
            .played_notes(filter)
            .into_iter()
            .map(|(_, note)| {
                let on = beats_to_duration(note.start_beat, tempo)?;
                let off = beats_to_duration(note.end_beat(), tempo)?.max(on + self.config.min_gate());
                Ok(PlannedNote {
                    on,
                    off,
                    channel: note.channel,
                    note: note.pitch,
                    velocity: note.velocity,
                })
            })
            .collect()
    }
}

impl<B: AudioBackend> Drop for PlaybackScheduler<B> {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeSignature;
    use crate::pattern::{DrumHit, DrumLane, NoteEvent, Track};
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Acquire,
        On(NoteTrigger),
        Off(NoteTrigger),
        Cancel(Vec<TriggerId>),
        Release(Vec<Voice>),
    }

    /// Backend that records every call in order
    #[derive(Clone, Default)]
    struct MockBackend {
        calls: Arc<Mutex<Vec<Call>>>,
        fail_acquire: bool,
        next_id: u64,
    }

    impl MockBackend {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&mut self, call: Call) -> TriggerId {
            self.calls.lock().unwrap().push(call);
            self.next_id += 1;
            TriggerId(self.next_id)
        }
    }

    impl AudioBackend for MockBackend {
        fn acquire(&mut self) -> Result<(), BackendError> {
            if self.fail_acquire {
                return Err(BackendError::NoDevice);
            }
            self.record(Call::Acquire);
            Ok(())
        }

        fn schedule_note_on(&mut self, trigger: NoteTrigger) -> TriggerId {
            self.record(Call::On(trigger))
        }

        fn schedule_note_off(&mut self, trigger: NoteTrigger) -> TriggerId {
            self.record(Call::Off(trigger))
        }

        fn cancel(&mut self, ids: &[TriggerId]) {
            self.record(Call::Cancel(ids.to_vec()));
        }

        fn release(&mut self, voices: &[Voice]) {
            self.record(Call::Release(voices.to_vec()));
        }
    }

    fn quick_config() -> SchedulerConfig {
        SchedulerConfig {
            lead_in_ms: 0,
            settle_ms: 0,
            min_gate_ms: 20,
            release_tail_ms: 0,
        }
    }

    fn settings(tempo: u16) -> TrackSettings {
        TrackSettings::new(tempo, TimeSignature::default(), 1)
    }

    fn groove() -> Pattern {
        let mut lanes = BTreeMap::new();
        lanes.insert(
            "kick".to_string(),
            DrumLane {
                note: 36,
                hits: vec![
                    DrumHit { start_beat: 0.0, duration_beats: 0.25, velocity: 110 },
                    DrumHit { start_beat: 2.0, duration_beats: 0.25, velocity: 100 },
                ],
            },
        );
        Pattern::new()
            .with_track(TrackKind::Drums, Track::Drums(lanes))
            .with_track(
                TrackKind::Bassline,
                Track::Notes(vec![NoteEvent {
                    start_beat: 0.0,
                    duration_beats: 1.0,
                    pitch: 40,
                    velocity: 90,
                }]),
            )
    }

    #[test]
    fn test_play_schedules_every_note() {
        let backend = MockBackend::default();
        let mut scheduler = PlaybackScheduler::new(backend.clone(), quick_config());

        let handle = scheduler.play(&groove(), &settings(120), None).unwrap();
        assert_eq!(scheduler.state(), TransportState::Playing(handle));

        let calls = backend.calls();
        assert_eq!(calls[0], Call::Acquire);
        let ons: Vec<_> = calls.iter().filter(|c| matches!(c, Call::On(_))).collect();
        let offs: Vec<_> = calls.iter().filter(|c| matches!(c, Call::Off(_))).collect();
        assert_eq!(ons.len(), 3);
        assert_eq!(offs.len(), 3);
    }

    #[test]
    fn test_trigger_offsets_follow_tempo() {
        let backend = MockBackend::default();
        let mut scheduler = PlaybackScheduler::new(backend.clone(), quick_config());
        scheduler.play(&groove(), &settings(120), Some(TrackKind::Drums)).unwrap();

        let times: Vec<(Instant, u8)> = backend
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::On(t) => Some((t.at, t.note)),
                _ => None,
            })
            .collect();
        assert_eq!(times.len(), 2);
        // Beat 2 at 120 BPM is one second after beat 0
        assert_eq!(times[1].0 - times[0].0, Duration::from_secs(1));
        assert!(times.iter().all(|(_, note)| *note == 36));
    }

    #[test]
    fn test_min_gate_applied() {
        let backend = MockBackend::default();
        let mut scheduler = PlaybackScheduler::new(backend.clone(), quick_config());
        let pattern = Pattern::new().with_track(
            TrackKind::Melody,
            Track::Notes(vec![NoteEvent {
                start_beat: 0.0,
                duration_beats: 0.001,
                pitch: 72,
                velocity: 100,
            }]),
        );
        scheduler.play(&pattern, &settings(120), None).unwrap();

        let calls = backend.calls();
        let on = calls.iter().find_map(|c| match c {
            Call::On(t) => Some(t.at),
            _ => None,
        });
        let off = calls.iter().find_map(|c| match c {
            Call::Off(t) => Some(t.at),
            _ => None,
        });
        assert_eq!(off.unwrap() - on.unwrap(), Duration::from_millis(20));
    }

    #[test]
    fn test_zero_min_gate_keeps_off_after_on() {
        let backend = MockBackend::default();
        let config = SchedulerConfig {
            min_gate_ms: 0,
            ..quick_config()
        };
        let mut scheduler = PlaybackScheduler::new(backend.clone(), config);
        let pattern = Pattern::new().with_track(
            TrackKind::Melody,
            Track::Notes(vec![NoteEvent {
                start_beat: 1.0,
                duration_beats: 1e-12,
                pitch: 60,
                velocity: 100,
            }]),
        );
        scheduler.play(&pattern, &settings(120), None).unwrap();

        let calls = backend.calls();
        let on = calls.iter().find_map(|c| match c {
            Call::On(t) => Some(t.at),
            _ => None,
        });
        let off = calls.iter().find_map(|c| match c {
            Call::Off(t) => Some(t.at),
            _ => None,
        });
        assert_eq!(off.unwrap() - on.unwrap(), Duration::from_millis(1));
    }

    #[test]
    fn test_restart_cancels_before_scheduling() {
        let backend = MockBackend::default();
        let mut scheduler = PlaybackScheduler::new(backend.clone(), quick_config());

        let first = scheduler.play(&groove(), &settings(120), None).unwrap();
        let first_calls = backend.calls().len();
        let second = scheduler.play(&groove(), &settings(120), None).unwrap();

        assert_ne!(first, second);
        assert!(!scheduler.is_active(first));
        assert!(scheduler.is_active(second));

        let calls = backend.calls();
        let after: Vec<_> = calls[first_calls..].iter().collect();
        let cancel_at = after
            .iter()
            .position(|c| matches!(c, Call::Cancel(_)))
            .expect("previous session cancelled");
        let release_at = after
            .iter()
            .position(|c| matches!(c, Call::Release(_)))
            .expect("previous voices released");
        let first_new = after
            .iter()
            .position(|c| matches!(c, Call::On(_) | Call::Off(_)))
            .unwrap();
        assert!(cancel_at < first_new);
        assert!(release_at < first_new);

        // Every trigger of the first session was cancelled
        match after[cancel_at] {
            Call::Cancel(ids) => assert_eq!(ids.len(), 6),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_stop_releases_voices_once() {
        let backend = MockBackend::default();
        let mut scheduler = PlaybackScheduler::new(backend.clone(), quick_config());
        let handle = scheduler.play(&groove(), &settings(120), None).unwrap();

        scheduler.stop(handle);
        assert_eq!(scheduler.state(), TransportState::Idle);

        let released: Vec<Voice> = backend
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::Release(v) => Some(v),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            released,
            vec![Voice { channel: 1, note: 40 }, Voice { channel: 9, note: 36 }]
        );

        // Stopping again is a no-op
        let count = backend.calls().len();
        scheduler.stop(handle);
        assert_eq!(backend.calls().len(), count);
    }

    #[test]
    fn test_stop_while_idle() {
        let backend = MockBackend::default();
        let mut scheduler = PlaybackScheduler::new(backend.clone(), quick_config());

        scheduler.stop(SessionHandle(42));
        scheduler.stop_all();
        assert_eq!(scheduler.state(), TransportState::Idle);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_stale_handle_leaves_live_session() {
        let backend = MockBackend::default();
        let mut scheduler = PlaybackScheduler::new(backend.clone(), quick_config());
        let first = scheduler.play(&groove(), &settings(120), None).unwrap();
        let second = scheduler.play(&groove(), &settings(120), None).unwrap();

        scheduler.stop(first);
        assert!(scheduler.is_active(second));
    }

    #[test]
    fn test_empty_pattern_stops_previous() {
        let backend = MockBackend::default();
        let mut scheduler = PlaybackScheduler::new(backend.clone(), quick_config());
        scheduler.play(&groove(), &settings(120), None).unwrap();

        let err = scheduler
            .play(&groove(), &settings(120), Some(TrackKind::Melody))
            .unwrap_err();
        assert!(matches!(err, PlaybackError::EmptyPattern { .. }));
        assert_eq!(err.to_string(), "nothing to play: the melody track has no events");
        assert_eq!(scheduler.state(), TransportState::Idle);
        assert!(backend.calls().iter().any(|c| matches!(c, Call::Cancel(_))));
    }

    #[test]
    fn test_backend_failure() {
        let backend = MockBackend {
            fail_acquire: true,
            ..Default::default()
        };
        let mut scheduler = PlaybackScheduler::new(backend.clone(), quick_config());

        let err = scheduler.play(&groove(), &settings(120), None).unwrap_err();
        assert!(matches!(err, PlaybackError::BackendAcquisition(BackendError::NoDevice)));
        assert_eq!(scheduler.state(), TransportState::Idle);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_invalid_settings() {
        let mut scheduler = PlaybackScheduler::new(MockBackend::default(), quick_config());
        let err = scheduler.play(&groove(), &settings(10), None).unwrap_err();
        assert!(matches!(err, PlaybackError::InvalidSettings(SettingsError::Tempo(10))));
    }

    #[test]
    fn test_natural_completion() {
        let mut scheduler = PlaybackScheduler::new(MockBackend::default(), quick_config());
        let pattern = Pattern::new().with_track(
            TrackKind::Melody,
            Track::Notes(vec![NoteEvent {
                start_beat: 0.0,
                duration_beats: 0.1,
                pitch: 60,
                velocity: 100,
            }]),
        );
        // 0.1 beat at 300 BPM = 20 ms
        let handle = scheduler.play(&pattern, &settings(300), None).unwrap();
        assert!(scheduler.is_active(handle));

        thread::sleep(Duration::from_millis(80));
        assert_eq!(scheduler.state(), TransportState::Idle);
        assert!(!scheduler.is_active(handle));
    }

    #[test]
    fn test_config_accessors() {
        let config = SchedulerConfig::default();
        assert_eq!(config.lead_in(), Duration::from_millis(100));
        assert_eq!(config.settle(), Duration::from_millis(50));
        assert_eq!(config.min_gate(), Duration::from_millis(20));
        assert_eq!(config.release_tail(), Duration::from_millis(500));

        let partial: SchedulerConfig = serde_yaml::from_str("settle_ms: 10").unwrap();
        assert_eq!(partial.settle_ms, 10);
        assert_eq!(partial.lead_in_ms, 100);
    }
}
