// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Canonical pattern model.
//!
//! This module provides:
//! - Track kinds and the event types stored per track
//! - The immutable [`Pattern`] produced by validation
//! - Parsing of generated text into raw JSON ([`parse`])
//! - The validation pass that turns raw JSON into a `Pattern` ([`validate`])

pub mod parse;
pub mod validate;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use parse::{from_generated_text, parse_generated, strip_code_fence, MalformedInputError};
pub use validate::{
    validate, DropReason, PatternValidator, TrackDropReason, Validated, ValidationError,
    ValidationWarning, WarningKind, DEFAULT_VELOCITY, MAX_EVENT_BEAT,
};

/// Instrument group a track belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Chords,
    Bassline,
    Melody,
    Drums,
}

/// Set of requested track kinds
pub type TrackSet = BTreeSet<TrackKind>;

impl TrackKind {
    /// All kinds, in file order
    pub const ALL: [TrackKind; 4] = [
        TrackKind::Chords,
        TrackKind::Bassline,
        TrackKind::Melody,
        TrackKind::Drums,
    ];

    /// Lowercase key used in JSON and on the command line
    pub fn key(self) -> &'static str {
        match self {
            TrackKind::Chords => "chords",
            TrackKind::Bassline => "bassline",
            TrackKind::Melody => "melody",
            TrackKind::Drums => "drums",
        }
    }

    /// Display name used for MIDI track names
    pub fn title(self) -> &'static str {
        match self {
            TrackKind::Chords => "Chords",
            TrackKind::Bassline => "Bassline",
            TrackKind::Melody => "Melody",
            TrackKind::Drums => "Drums",
        }
    }

    /// MIDI channel (0-15); drums sit on the GM percussion channel
    pub fn channel(self) -> u8 {
        match self {
            TrackKind::Chords => 0,
            TrackKind::Bassline => 1,
            TrackKind::Melody => 2,
            TrackKind::Drums => 9,
        }
    }

    /// Match a track key as a generator might spell it
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_lowercase().as_str() {
            "chords" | "chord" | "harmony" => Some(TrackKind::Chords),
            "bassline" | "bass" | "bass_line" => Some(TrackKind::Bassline),
            "melody" | "lead" => Some(TrackKind::Melody),
            "drums" | "drum" | "percussion" => Some(TrackKind::Drums),
            _ => None,
        }
    }

    /// Every kind as a set
    pub fn all() -> TrackSet {
        Self::ALL.into_iter().collect()
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Unrecognized track name
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown track '{0}' (expected chords, bassline, melody or drums)")]
pub struct UnknownTrackKind(pub String);

impl FromStr for TrackKind {
    type Err = UnknownTrackKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrackKind::from_key(s).ok_or_else(|| UnknownTrackKind(s.to_string()))
    }
}

/// A single pitched note (bassline, melody)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteEvent {
    pub start_beat: f64,
    pub duration_beats: f64,
    /// MIDI note number (0-127)
    pub pitch: u8,
    /// Velocity (1-127)
    pub velocity: u8,
}

/// A chord: several pitches sharing one start and length
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChordEvent {
    pub start_beat: f64,
    pub duration_beats: f64,
    /// Constituent pitches in input order (never empty)
    pub notes: Vec<u8>,
    pub velocity: u8,
    /// Display name such as "Am7"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A single drum hit; the note comes from its lane
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrumHit {
    pub start_beat: f64,
    pub duration_beats: f64,
    pub velocity: u8,
}

/// All hits for one drum element
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrumLane {
    /// Resolved GM percussion note
    pub note: u8,
    pub hits: Vec<DrumHit>,
}

/// Events of one track
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Track {
    Chords(Vec<ChordEvent>),
    Notes(Vec<NoteEvent>),
    /// Lanes keyed by canonical drum key
    Drums(BTreeMap<String, DrumLane>),
}

/// One sounding note, flattened out of any track shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayedNote {
    pub start_beat: f64,
    pub duration_beats: f64,
    pub pitch: u8,
    pub velocity: u8,
    pub channel: u8,
}

impl PlayedNote {
    pub fn end_beat(&self) -> f64 {
        self.start_beat + self.duration_beats
    }
}

impl Track {
    /// Number of events (chords count once, drum hits individually)
    pub fn event_count(&self) -> usize {
        match self {
            Track::Chords(chords) => chords.len(),
            Track::Notes(notes) => notes.len(),
            Track::Drums(lanes) => lanes.values().map(|lane| lane.hits.len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.event_count() == 0
    }

    /// Latest `start + duration` over all events
    pub fn end_beat(&self) -> f64 {
        match self {
            Track::Chords(chords) => chords
                .iter()
                .map(|c| c.start_beat + c.duration_beats)
                .fold(0.0, f64::max),
            Track::Notes(notes) => notes
                .iter()
                .map(|n| n.start_beat + n.duration_beats)
                .fold(0.0, f64::max),
            Track::Drums(lanes) => lanes
                .values()
                .flat_map(|lane| lane.hits.iter())
                .map(|h| h.start_beat + h.duration_beats)
                .fold(0.0, f64::max),
        }
    }

    /// Flatten into individual notes on `channel`.
    ///
    /// Chords expand to one note per pitch; drum hits take their lane's note.
    /// Order is deterministic: input order, lanes by key.
    pub fn played_notes(&self, channel: u8) -> Vec<PlayedNote> {
        match self {
            Track::Chords(chords) => chords
                .iter()
                .flat_map(|chord| {
                    chord.notes.iter().map(move |&pitch| PlayedNote {
                        start_beat: chord.start_beat,
                        duration_beats: chord.duration_beats,
                        pitch,
                        velocity: chord.velocity,
                        channel,
                    })
                })
                .collect(),
            Track::Notes(notes) => notes
                .iter()
                .map(|note| PlayedNote {
                    start_beat: note.start_beat,
                    duration_beats: note.duration_beats,
                    pitch: note.pitch,
                    velocity: note.velocity,
                    channel,
                })
                .collect(),
            Track::Drums(lanes) => lanes
                .values()
                .flat_map(|lane| {
                    lane.hits.iter().map(move |hit| PlayedNote {
                        start_beat: hit.start_beat,
                        duration_beats: hit.duration_beats,
                        pitch: lane.note,
                        velocity: hit.velocity,
                        channel,
                    })
                })
                .collect(),
        }
    }
}

/// Validated, read-only musical content for one loop or section
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Pattern {
    tracks: BTreeMap<TrackKind, Track>,
}

impl Pattern {
    /// Create an empty pattern
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pattern from tracks; a later entry for the same kind wins
    pub fn from_tracks(tracks: impl IntoIterator<Item = (TrackKind, Track)>) -> Self {
        Self {
            tracks: tracks.into_iter().collect(),
        }
    }

    /// Return a copy with `kind` set to `track`
    pub fn with_track(mut self, kind: TrackKind, track: Track) -> Self {
        self.tracks.insert(kind, track);
        self
    }

    /// Get a track
    pub fn track(&self, kind: TrackKind) -> Option<&Track> {
        self.tracks.get(&kind)
    }

    /// Iterate tracks in file order
    pub fn tracks(&self) -> impl Iterator<Item = (TrackKind, &Track)> {
        self.tracks.iter().map(|(kind, track)| (*kind, track))
    }

    /// Kinds present
    pub fn kinds(&self) -> TrackSet {
        self.tracks.keys().copied().collect()
    }

    /// Total event count across tracks
    pub fn event_count(&self) -> usize {
        self.tracks.values().map(Track::event_count).sum()
    }

    /// True when there is nothing to play or export
    pub fn is_empty(&self) -> bool {
        self.event_count() == 0
    }

    /// Latest event end in beats (0 for an empty pattern)
    pub fn end_beat(&self) -> f64 {
        self.tracks.values().map(Track::end_beat).fold(0.0, f64::max)
    }

    /// Single-track view, empty if the track is absent
    pub fn filtered(&self, kind: TrackKind) -> Pattern {
        Pattern {
            tracks: self
                .tracks
                .get(&kind)
                .map(|track| (kind, track.clone()))
                .into_iter()
                .collect(),
        }
    }

    /// New pattern where only `kind` comes from `regenerated`.
    ///
    /// If `regenerated` has no such track the entry is removed; every other
    /// track is carried over from `self` untouched.
    pub fn with_track_replaced(&self, regenerated: &Pattern, kind: TrackKind) -> Pattern {
        let mut tracks = self.tracks.clone();
        match regenerated.tracks.get(&kind) {
            Some(track) => {
                tracks.insert(kind, track.clone());
            }
            None => {
                tracks.remove(&kind);
            }
        }
        Pattern { tracks }
    }

    /// Every sounding note, optionally restricted to one track
    pub fn played_notes(&self, filter: Option<TrackKind>) -> Vec<(TrackKind, PlayedNote)> {
        self.tracks()
            .filter(|(kind, _)| filter.map_or(true, |f| f == *kind))
            .flat_map(|(kind, track)| {
                track
                    .played_notes(kind.channel())
                    .into_iter()
                    .map(move |note| (kind, note))
            })
            .collect()
    }
}
