// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Validation of untrusted pattern data.
//!
//! Generated data is treated like a wire format from an unreliable peer.
//! Every irregularity ends up in exactly one of three buckets:
//!
//! - the offending event (or drum lane, or track) is dropped,
//! - the value is clamped, rounded or defaulted into range,
//! - the whole request fails ([`ValidationError`]).
//!
//! Drops and adjustments are reported as [`ValidationWarning`]s next to the
//! resulting [`Pattern`], so callers can tell the user what changed.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use super::parse::{json_type_name, MalformedInputError};
use super::{ChordEvent, DrumHit, DrumLane, NoteEvent, Pattern, Track, TrackKind, TrackSet};
use crate::music::drum_map;

/// Velocity used when an event does not give one
pub const DEFAULT_VELOCITY: u8 = 100;

/// Latest beat an event may reach; keeps tick math inside SMF delta range
pub const MAX_EVENT_BEAT: f64 = 65_536.0;

const TIME_FIELDS: &[&str] = &["time", "start", "start_beat", "startBeat", "beat"];
const DURATION_FIELDS: &[&str] = &["duration", "duration_beats", "durationBeats", "length"];
const PITCH_FIELDS: &[&str] = &["pitch", "note", "midi"];
const CHORD_NOTE_FIELDS: &[&str] = &["notes", "pitches"];
const LABEL_FIELDS: &[&str] = &["label", "name", "chord"];
const VELOCITY_FIELDS: &[&str] = &["velocity", "vel"];

/// Request-level validation failure
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The input is not a pattern-shaped object at all
    #[error(transparent)]
    Malformed(#[from] MalformedInputError),
    /// The caller asked for no tracks
    #[error("no tracks were requested")]
    NoTracksRequested,
}

/// Why a single event was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NotAnObject,
    MissingTime,
    InvalidTime,
    MissingDuration,
    InvalidDuration,
    BeyondMaxBeat,
    MissingPitch,
    InvalidPitch,
    EmptyChord,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DropReason::NotAnObject => "not an object",
            DropReason::MissingTime => "missing time",
            DropReason::InvalidTime => "time is not a finite number >= 0",
            DropReason::MissingDuration => "missing duration",
            DropReason::InvalidDuration => "duration is not a finite number > 0",
            DropReason::BeyondMaxBeat => "ends too far in the future",
            DropReason::MissingPitch => "missing pitch",
            DropReason::InvalidPitch => "pitch is not a finite number",
            DropReason::EmptyChord => "chord has no usable notes",
        };
        f.write_str(text)
    }
}

/// Why a whole track or drum lane was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackDropReason {
    /// No events were given
    Empty,
    /// Events were given but none survived
    AllEventsInvalid,
    /// The value had the wrong JSON type
    WrongType(&'static str),
}

impl fmt::Display for TrackDropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackDropReason::Empty => f.write_str("no events"),
            TrackDropReason::AllEventsInvalid => f.write_str("every event was invalid"),
            TrackDropReason::WrongType(found) => write!(f, "expected a list of events, found {}", found),
        }
    }
}

/// What a warning is about
#[derive(Debug, Clone, PartialEq)]
pub enum WarningKind {
    EventDropped { index: usize, reason: DropReason },
    PitchClamped { index: usize, from: f64, to: u8 },
    PitchRounded { index: usize, from: f64, to: u8 },
    ChordPitchDropped { index: usize, position: usize },
    ChordPitchDuplicate { index: usize, position: usize, pitch: u8 },
    VelocityClamped { index: usize, from: f64, to: u8 },
    VelocityDefaulted { index: usize },
    UnknownDrum { fallback: u8 },
    LaneDropped { reason: TrackDropReason },
    TrackDropped { reason: TrackDropReason },
    TrackMissing,
    DuplicateTrack { key: String },
}

/// A non-fatal irregularity found during validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationWarning {
    pub track: TrackKind,
    /// Drum lane key for drum warnings
    pub lane: Option<String>,
    pub kind: WarningKind,
}

impl ValidationWarning {
    /// A value was changed but the event kept
    pub fn is_adjustment(&self) -> bool {
        matches!(
            self.kind,
            WarningKind::PitchClamped { .. }
                | WarningKind::PitchRounded { .. }
                | WarningKind::VelocityClamped { .. }
                | WarningKind::VelocityDefaulted { .. }
                | WarningKind::ChordPitchDropped { .. }
                | WarningKind::ChordPitchDuplicate { .. }
        )
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lane {
            Some(lane) => write!(f, "{}/{}: ", self.track, lane)?,
            None => write!(f, "{}: ", self.track)?,
        }
        match &self.kind {
            WarningKind::EventDropped { index, reason } => {
                write!(f, "event {} dropped ({})", index, reason)
            }
            WarningKind::PitchClamped { index, from, to } => {
                write!(f, "event {} pitch {} clamped to {}", index, from, to)
            }
            WarningKind::PitchRounded { index, from, to } => {
                write!(f, "event {} pitch {} rounded to {}", index, from, to)
            }
            WarningKind::ChordPitchDropped { index, position } => {
                write!(f, "event {} chord note {} is not a number and was removed", index, position)
            }
            WarningKind::ChordPitchDuplicate { index, position, pitch } => {
                write!(f, "event {} chord note {} repeats pitch {} and was removed", index, position, pitch)
            }
            WarningKind::VelocityClamped { index, from, to } => {
                write!(f, "event {} velocity {} adjusted to {}", index, from, to)
            }
            WarningKind::VelocityDefaulted { index } => write!(
                f,
                "event {} velocity is not a number, using {}",
                index, DEFAULT_VELOCITY
            ),
            WarningKind::UnknownDrum { fallback } => {
                write!(f, "unrecognized drum name, playing it on note {}", fallback)
            }
            WarningKind::LaneDropped { reason } => write!(f, "drum lane dropped ({})", reason),
            WarningKind::TrackDropped { reason } => write!(f, "track dropped ({})", reason),
            WarningKind::TrackMissing => f.write_str("requested track missing from input"),
            WarningKind::DuplicateTrack { key } => {
                write!(f, "duplicate track under key '{}' ignored", key)
            }
        }
    }
}

/// A validated pattern plus everything that had to be fixed along the way
#[derive(Debug, Clone)]
pub struct Validated {
    pub pattern: Pattern,
    pub warnings: Vec<ValidationWarning>,
}

impl Validated {
    /// No warnings at all
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Number of values that were clamped, rounded or defaulted
    pub fn adjusted_count(&self) -> usize {
        self.warnings.iter().filter(|w| w.is_adjustment()).count()
    }

    /// Number of individual events that were dropped
    pub fn dropped_count(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w.kind, WarningKind::EventDropped { .. }))
            .count()
    }

    /// One-line, user-facing digest of the warnings (None when clean)
    pub fn summary(&self) -> Option<String> {
        let count = |pred: fn(&WarningKind) -> bool| {
            self.warnings.iter().filter(|w| pred(&w.kind)).count()
        };

        let mut parts = Vec::new();
        let adjusted = self.adjusted_count();
        if adjusted > 0 {
            parts.push(plural(adjusted, "value was adjusted", "values were adjusted"));
        }
        let dropped = self.dropped_count();
        if dropped > 0 {
            parts.push(plural(dropped, "event was dropped", "events were dropped"));
        }
        let unknown = count(|k| matches!(k, WarningKind::UnknownDrum { .. }));
        if unknown > 0 {
            parts.push(plural(
                unknown,
                "unknown drum was mapped to a fallback",
                "unknown drums were mapped to a fallback",
            ));
        }
        let tracks = count(|k| {
            matches!(
                k,
                WarningKind::TrackDropped { .. } | WarningKind::TrackMissing | WarningKind::LaneDropped { .. }
            )
        });
        if tracks > 0 {
            parts.push(plural(tracks, "track or lane was unusable", "tracks or lanes were unusable"));
        }

        if parts.is_empty() && !self.warnings.is_empty() {
            parts.push(plural(self.warnings.len(), "warning", "warnings"));
        }

        (!parts.is_empty()).then(|| parts.join(", "))
    }
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("1 {}", one)
    } else {
        format!("{} {}", n, many)
    }
}

/// Converts raw JSON into a canonical [`Pattern`]
#[derive(Debug, Clone)]
pub struct PatternValidator {
    default_velocity: u8,
}

impl PatternValidator {
    /// Create a validator with the standard defaults
    pub fn new() -> Self {
        Self {
            default_velocity: DEFAULT_VELOCITY,
        }
    }

    /// Validate `raw`, reading only the `requested` tracks.
    ///
    /// Fails only when `raw` is not an object or nothing was requested;
    /// every other problem becomes a warning.
    pub fn validate(&self, raw: &Value, requested: &TrackSet) -> Result<Validated, ValidationError> {
        if requested.is_empty() {
            return Err(ValidationError::NoTracksRequested);
        }

        let object = raw.as_object().ok_or(MalformedInputError::NotAnObject {
            found: json_type_name(raw),
        })?;

        let mut warnings = Vec::new();
        let mut sources: BTreeMap<TrackKind, &Value> = BTreeMap::new();

        for (key, value) in object {
            let Some(kind) = TrackKind::from_key(key) else {
                debug!(key = %key, "ignoring unrecognized top-level key");
                continue;
            };
            if !requested.contains(&kind) {
                debug!(track = %kind, "ignoring unrequested track");
                continue;
            }
            if sources.contains_key(&kind) {
                warnings.push(ValidationWarning {
                    track: kind,
                    lane: None,
                    kind: WarningKind::DuplicateTrack { key: key.clone() },
                });
                continue;
            }
            sources.insert(kind, value);
        }

        let mut tracks = Vec::new();
        for &kind in requested {
            let mut pass = TrackPass {
                kind,
                default_velocity: self.default_velocity,
                warnings: &mut warnings,
            };
            match sources.get(&kind) {
                Some(value) => {
                    if let Some(track) = pass.track(value) {
                        tracks.push((kind, track));
                    }
                }
                None => pass.warn(None, WarningKind::TrackMissing),
            }
        }

        let pattern = Pattern::from_tracks(tracks);
        for warning in &warnings {
            debug!(%warning, "pattern validation");
        }
        info!(
            tracks = pattern.kinds().len(),
            events = pattern.event_count(),
            warnings = warnings.len(),
            "pattern validated"
        );

        Ok(Validated { pattern, warnings })
    }
}

impl Default for PatternValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate with default settings
pub fn validate(raw: &Value, requested: &TrackSet) -> Result<Validated, ValidationError> {
    PatternValidator::new().validate(raw, requested)
}

enum Field {
    Missing,
    NotNumber,
    Number(f64),
}

/// First present, non-null field among `names`
fn number_field(obj: &Map<String, Value>, names: &[&str]) -> Field {
    for name in names {
        match obj.get(*name) {
            None | Some(Value::Null) => continue,
            Some(value) => {
                return match value.as_f64() {
                    Some(n) => Field::Number(n),
                    None => Field::NotNumber,
                }
            }
        }
    }
    Field::Missing
}

/// Validation state for one track
struct TrackPass<'w> {
    kind: TrackKind,
    default_velocity: u8,
    warnings: &'w mut Vec<ValidationWarning>,
}

impl TrackPass<'_> {
    fn warn(&mut self, lane: Option<&str>, kind: WarningKind) {
        self.warnings.push(ValidationWarning {
            track: self.kind,
            lane: lane.map(str::to_string),
            kind,
        });
    }

    fn drop_event<T>(&mut self, lane: Option<&str>, index: usize, reason: DropReason) -> Option<T> {
        self.warn(lane, WarningKind::EventDropped { index, reason });
        None
    }

    fn drop_track<T>(&mut self, reason: TrackDropReason) -> Option<T> {
        self.warn(None, WarningKind::TrackDropped { reason });
        None
    }

    fn track(&mut self, value: &Value) -> Option<Track> {
        match self.kind {
            TrackKind::Drums => self.drums(value),
            TrackKind::Chords => {
                let events = self.event_list(value)?;
                let mut chords: Vec<ChordEvent> = events
                    .iter()
                    .enumerate()
                    .filter_map(|(index, event)| self.chord(index, event))
                    .collect();
                if chords.is_empty() {
                    return self.drop_track(TrackDropReason::AllEventsInvalid);
                }
                chords.sort_by(|a, b| a.start_beat.total_cmp(&b.start_beat));
                Some(Track::Chords(chords))
            }
            TrackKind::Bassline | TrackKind::Melody => {
                let events = self.event_list(value)?;
                let mut notes: Vec<NoteEvent> = events
                    .iter()
                    .enumerate()
                    .filter_map(|(index, event)| self.note(index, event))
                    .collect();
                if notes.is_empty() {
                    return self.drop_track(TrackDropReason::AllEventsInvalid);
                }
                notes.sort_by(|a, b| a.start_beat.total_cmp(&b.start_beat));
                Some(Track::Notes(notes))
            }
        }
    }

    /// Non-empty event array, or a TrackDropped warning
    fn event_list<'v>(&mut self, value: &'v Value) -> Option<&'v Vec<Value>> {
        match value.as_array() {
            Some(events) if events.is_empty() => self.drop_track(TrackDropReason::Empty),
            Some(events) => Some(events),
            None => self.drop_track(TrackDropReason::WrongType(json_type_name(value))),
        }
    }

    /// Start and duration in beats, or drop the event
    fn timing(&mut self, lane: Option<&str>, index: usize, obj: &Map<String, Value>) -> Option<(f64, f64)> {
        let start = match number_field(obj, TIME_FIELDS) {
            Field::Missing => return self.drop_event(lane, index, DropReason::MissingTime),
            Field::Number(t) if t.is_finite() && t >= 0.0 => t,
            _ => return self.drop_event(lane, index, DropReason::InvalidTime),
        };
        let duration = match number_field(obj, DURATION_FIELDS) {
            Field::Missing => return self.drop_event(lane, index, DropReason::MissingDuration),
            Field::Number(d) if d.is_finite() && d > 0.0 => d,
            _ => return self.drop_event(lane, index, DropReason::InvalidDuration),
        };
        if start + duration > MAX_EVENT_BEAT {
            return self.drop_event(lane, index, DropReason::BeyondMaxBeat);
        }
        Some((start, duration))
    }

    /// Bring a finite pitch into 0..=127, warning about any change
    fn pitch(&mut self, index: usize, raw: f64) -> u8 {
        let rounded = raw.round();
        let pitch = rounded.clamp(0.0, 127.0) as u8;
        if rounded != f64::from(pitch) {
            self.warn(None, WarningKind::PitchClamped { index, from: raw, to: pitch });
        } else if rounded != raw {
            self.warn(None, WarningKind::PitchRounded { index, from: raw, to: pitch });
        }
        pitch
    }

    fn velocity(&mut self, lane: Option<&str>, index: usize, obj: &Map<String, Value>) -> u8 {
        match number_field(obj, VELOCITY_FIELDS) {
            Field::Missing => self.default_velocity,
            Field::Number(v) if v.is_finite() => {
                let velocity = v.round().clamp(1.0, 127.0) as u8;
                if f64::from(velocity) != v {
                    self.warn(lane, WarningKind::VelocityClamped { index, from: v, to: velocity });
                }
                velocity
            }
            _ => {
                self.warn(lane, WarningKind::VelocityDefaulted { index });
                self.default_velocity
            }
        }
    }

    fn note(&mut self, index: usize, value: &Value) -> Option<NoteEvent> {
        let Some(obj) = value.as_object() else {
            return self.drop_event(None, index, DropReason::NotAnObject);
        };
        let (start_beat, duration_beats) = self.timing(None, index, obj)?;
        let pitch = match number_field(obj, PITCH_FIELDS) {
            Field::Missing => return self.drop_event(None, index, DropReason::MissingPitch),
            Field::Number(p) if p.is_finite() => self.pitch(index, p),
            _ => return self.drop_event(None, index, DropReason::InvalidPitch),
        };
        let velocity = self.velocity(None, index, obj);

        Some(NoteEvent {
            start_beat,
            duration_beats,
            pitch,
            velocity,
        })
    }

    fn chord(&mut self, index: usize, value: &Value) -> Option<ChordEvent> {
        let Some(obj) = value.as_object() else {
            return self.drop_event(None, index, DropReason::NotAnObject);
        };
        let (start_beat, duration_beats) = self.timing(None, index, obj)?;

        let raw_notes = CHORD_NOTE_FIELDS
            .iter()
            .find_map(|name| obj.get(*name).filter(|v| !v.is_null()));
        let raw_notes = match raw_notes {
            None => return self.drop_event(None, index, DropReason::MissingPitch),
            Some(Value::Array(items)) => items,
            Some(_) => return self.drop_event(None, index, DropReason::InvalidPitch),
        };

        let mut notes = Vec::with_capacity(raw_notes.len());
        for (position, raw) in raw_notes.iter().enumerate() {
            match raw.as_f64().filter(|p| p.is_finite()) {
                Some(p) => {
                    let pitch = self.pitch(index, p);
                    if notes.contains(&pitch) {
                        self.warn(None, WarningKind::ChordPitchDuplicate { index, position, pitch });
                    } else {
                        notes.push(pitch);
                    }
                }
                None => self.warn(None, WarningKind::ChordPitchDropped { index, position }),
            }
        }
        if notes.is_empty() {
            return self.drop_event(None, index, DropReason::EmptyChord);
        }

        let label = LABEL_FIELDS
            .iter()
            .find_map(|name| obj.get(*name).and_then(Value::as_str))
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(str::to_string);
        let velocity = self.velocity(None, index, obj);

        Some(ChordEvent {
            start_beat,
            duration_beats,
            notes,
            velocity,
            label,
        })
    }

    fn hit(&mut self, lane: &str, index: usize, value: &Value) -> Option<DrumHit> {
        let Some(obj) = value.as_object() else {
            return self.drop_event(Some(lane), index, DropReason::NotAnObject);
        };
        let (start_beat, duration_beats) = self.timing(Some(lane), index, obj)?;
        let velocity = self.velocity(Some(lane), index, obj);

        Some(DrumHit {
            start_beat,
            duration_beats,
            velocity,
        })
    }

    fn drums(&mut self, value: &Value) -> Option<Track> {
        let Some(raw_lanes) = value.as_object() else {
            return self.drop_track(TrackDropReason::WrongType(json_type_name(value)));
        };

        let mut lanes: BTreeMap<String, DrumLane> = BTreeMap::new();
        let mut given = 0usize;

        for (raw_key, raw_hits) in raw_lanes {
            let resolved = drum_map::resolve(raw_key);
            let lane_name = if resolved.key.is_empty() {
                raw_key.as_str()
            } else {
                resolved.key.as_str()
            };

            let Some(hits) = raw_hits.as_array() else {
                self.warn(
                    Some(lane_name),
                    WarningKind::LaneDropped {
                        reason: TrackDropReason::WrongType(json_type_name(raw_hits)),
                    },
                );
                continue;
            };
            if resolved.key.is_empty() {
                given += hits.len();
                self.warn(
                    Some(raw_key),
                    WarningKind::LaneDropped {
                        reason: TrackDropReason::AllEventsInvalid,
                    },
                );
                continue;
            }
            if !resolved.known {
                self.warn(
                    Some(&resolved.key),
                    WarningKind::UnknownDrum {
                        fallback: resolved.note,
                    },
                );
            }

            given += hits.len();
            let valid: Vec<DrumHit> = hits
                .iter()
                .enumerate()
                .filter_map(|(index, hit)| self.hit(&resolved.key, index, hit))
                .collect();

            if valid.is_empty() {
                let reason = if hits.is_empty() {
                    TrackDropReason::Empty
                } else {
                    TrackDropReason::AllEventsInvalid
                };
                self.warn(Some(&resolved.key), WarningKind::LaneDropped { reason });
                continue;
            }

            if lanes.contains_key(&resolved.key) {
                debug!(lane = %resolved.key, raw = %raw_key, "merging drum lane aliases");
            }
            lanes
                .entry(resolved.key)
                .or_insert_with(|| DrumLane {
                    note: resolved.note,
                    hits: Vec::new(),
                })
                .hits
                .extend(valid);
        }

        if lanes.is_empty() {
            let reason = if given == 0 {
                TrackDropReason::Empty
            } else {
                TrackDropReason::AllEventsInvalid
            };
            return self.drop_track(reason);
        }

        for lane in lanes.values_mut() {
            lane.hits.sort_by(|a, b| a.start_beat.total_cmp(&b.start_beat));
        }
        Some(Track::Drums(lanes))
    }
}
