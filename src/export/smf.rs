// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Format 1 Standard MIDI File encoder.
//!
//! Encoding is pure: the same settings and pattern always produce the
//! same bytes. Track order follows [`TrackKind`] order and events at the
//! same tick are ordered meta, note-off, note-on, so a repeated pitch is
//! released before it is struck again.

use thiserror::Error;
use tracing::debug;

use crate::config::{SettingsError, TrackSettings};
use crate::midi::messages;
use crate::music::KeySignature;
use crate::pattern::{Pattern, Track, TrackKind};
use crate::timing::{beats_to_ticks, loop_beats, PPQN};

/// SMF format word for simultaneous multi-track files
pub const FORMAT_MULTI_TRACK: u16 = 1;

/// Largest value a four-byte variable-length quantity can hold
const MAX_VARIABLE_LENGTH: u64 = 0x0FFF_FFFF;

const RANK_META: u8 = 0;
const RANK_NOTE_OFF: u8 = 1;
const RANK_NOTE_ON: u8 = 2;

/// Why a pattern could not be written
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Nothing audible to write
    #[error("nothing to export: {scope} has no events")]
    EmptyPattern { scope: String },
    #[error("invalid track settings: {0}")]
    InvalidSettings(#[from] SettingsError),
    /// A delta time does not fit in a variable-length quantity
    #[error("event at tick {tick} is beyond what a MIDI file can address")]
    TickOverflow { tick: u64 },
}

/// One event waiting to be written
#[derive(Debug, Clone)]
struct TrackEvent {
    /// Absolute tick
    tick: u64,
    /// Tie-break for events on the same tick
    rank: u8,
    /// Status byte onwards
    data: Vec<u8>,
}

impl TrackEvent {
    fn note_on(tick: u64, channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            tick,
            rank: RANK_NOTE_ON,
            data: vec![messages::NOTE_ON | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
        }
    }

    fn note_off(tick: u64, channel: u8, note: u8) -> Self {
        Self {
            tick,
            rank: RANK_NOTE_OFF,
            data: vec![messages::NOTE_OFF | (channel & 0x0F), note & 0x7F, 0],
        }
    }

    fn meta(tick: u64, kind: u8, payload: &[u8]) -> Self {
        let mut data = vec![messages::META, kind];
        write_variable_length(&mut data, payload.len() as u32);
        data.extend_from_slice(payload);
        Self {
            tick,
            rank: RANK_META,
            data,
        }
    }

    fn track_name(name: &str) -> Self {
        Self::meta(0, messages::META_TRACK_NAME, name.as_bytes())
    }

    fn marker(tick: u64, text: &str) -> Self {
        Self::meta(tick, messages::META_MARKER, text.as_bytes())
    }

    fn tempo(bpm: u16) -> Self {
        let micros = 60_000_000 / u32::from(bpm.max(1));
        Self::meta(0, messages::META_TEMPO, &micros.to_be_bytes()[1..])
    }

    fn time_signature(numerator: u8, denominator: u8) -> Self {
        // Denominator is written as a power of two
        let power = denominator.max(1).trailing_zeros() as u8;
        Self::meta(
            0,
            messages::META_TIME_SIGNATURE,
            &[
                numerator,
                power,
                24, // MIDI clocks per metronome click
                8,  // 32nd notes per MIDI quarter note
            ],
        )
    }

    fn key_signature(key: KeySignature) -> Self {
        Self::meta(
            0,
            messages::META_KEY_SIGNATURE,
            &[key.sharps_flats as u8, u8::from(key.minor)],
        )
    }
}

/// Writes patterns as format 1 MIDI files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiFileEncoder {
    ppqn: u16,
}

impl MidiFileEncoder {
    /// Encoder at the standard 480 ticks per quarter note
    pub fn new() -> Self {
        Self { ppqn: PPQN }
    }

    /// Encoder at a custom resolution (1..=0x7FFF; bit 15 selects SMPTE time)
    pub fn with_ppqn(ppqn: u16) -> Self {
        Self {
            ppqn: ppqn.clamp(1, 0x7FFF),
        }
    }

    pub fn ppqn(&self) -> u16 {
        self.ppqn
    }

    /// Encode every non-empty track of `pattern`
    pub fn encode(&self, settings: &TrackSettings, pattern: &Pattern) -> Result<Vec<u8>, EncodeError> {
        self.encode_selected(settings, pattern, None)
    }

    /// Encode a single track (plus the meta track)
    pub fn encode_track(
        &self,
        settings: &TrackSettings,
        pattern: &Pattern,
        kind: TrackKind,
    ) -> Result<Vec<u8>, EncodeError> {
        self.encode_selected(settings, pattern, Some(kind))
    }

    fn encode_selected(
        &self,
        settings: &TrackSettings,
        pattern: &Pattern,
        only: Option<TrackKind>,
    ) -> Result<Vec<u8>, EncodeError> {
        settings.validate()?;

        let instrument_tracks: Vec<(TrackKind, Vec<TrackEvent>)> = pattern
            .tracks()
            .filter(|(kind, track)| only.map_or(true, |k| k == *kind) && !track.is_empty())
            .map(|(kind, track)| (kind, self.instrument_events(kind, track)))
            .collect();

        if instrument_tracks.is_empty() {
            let scope = match only {
                Some(kind) => format!("the {} track", kind),
                None => "the pattern".to_string(),
            };
            return Err(EncodeError::EmptyPattern { scope });
        }

        let loop_end = u64::from(loop_beats(settings)) * u64::from(self.ppqn);
        let end_tick = instrument_tracks
            .iter()
            .flat_map(|(_, events)| events.iter().map(|e| e.tick))
            .fold(loop_end, u64::max);

        let mut bytes = Vec::new();
        write_header(&mut bytes, (instrument_tracks.len() + 1) as u16, self.ppqn);
        write_track(&mut bytes, &meta_events(settings), end_tick)?;
        for (kind, events) in &instrument_tracks {
            debug!(track = %kind, events = events.len(), "encoding track");
            write_track(&mut bytes, events, end_tick)?;
        }

        debug!(
            bytes = bytes.len(),
            tracks = instrument_tracks.len() + 1,
            end_tick,
            "encoded MIDI file"
        );
        Ok(bytes)
    }

    /// Sorted events for one instrument track
    fn instrument_events(&self, kind: TrackKind, track: &Track) -> Vec<TrackEvent> {
        let channel = kind.channel();
        let mut events = vec![TrackEvent::track_name(kind.title())];

        if let Track::Chords(chords) = track {
            for chord in chords {
                if let Some(label) = chord.label.as_deref().filter(|l| !l.is_empty()) {
                    events.push(TrackEvent::marker(beats_to_ticks(chord.start_beat, self.ppqn), label));
                }
            }
        }

        for note in track.played_notes(channel) {
            let on = beats_to_ticks(note.start_beat, self.ppqn);
            let off = beats_to_ticks(note.end_beat(), self.ppqn).max(on + 1);
            events.push(TrackEvent::note_on(on, channel, note.pitch, note.velocity));
            events.push(TrackEvent::note_off(off, channel, note.pitch));
        }

        // Stable, so same-rank events keep insertion order
        events.sort_by_key(|e| (e.tick, e.rank));
        events
    }
}

impl Default for MidiFileEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Tempo, meter, key and a name for track 0
fn meta_events(settings: &TrackSettings) -> Vec<TrackEvent> {
    let name = if settings.song_section.trim().is_empty() {
        "Tempo"
    } else {
        settings.song_section.trim()
    };

    let mut events = vec![
        TrackEvent::track_name(name),
        TrackEvent::tempo(settings.tempo),
        TrackEvent::time_signature(
            settings.time_signature.numerator,
            settings.time_signature.denominator,
        ),
    ];
    match KeySignature::parse(&settings.key) {
        Some(key) => events.push(TrackEvent::key_signature(key)),
        None => debug!(key = %settings.key, "key label not recognized, no key signature written"),
    }
    events
}

/// Write the MThd chunk
fn write_header(out: &mut Vec<u8>, num_tracks: u16, ppqn: u16) {
    out.extend_from_slice(b"MThd");
    // Chunk length (always 6)
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&FORMAT_MULTI_TRACK.to_be_bytes());
    out.extend_from_slice(&num_tracks.to_be_bytes());
    out.extend_from_slice(&ppqn.to_be_bytes());
}

/// Write one MTrk chunk; `events` must already be sorted
fn write_track(out: &mut Vec<u8>, events: &[TrackEvent], end_tick: u64) -> Result<(), EncodeError> {
    let mut body = Vec::new();
    let mut last_tick = 0u64;

    for event in events {
        write_delta(&mut body, event.tick, last_tick)?;
        body.extend_from_slice(&event.data);
        last_tick = event.tick;
    }

    let end_tick = end_tick.max(last_tick);
    write_delta(&mut body, end_tick, last_tick)?;
    body.extend_from_slice(&[messages::META, messages::META_END_OF_TRACK, 0x00]);

    out.extend_from_slice(b"MTrk");
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    Ok(())
}

fn write_delta(out: &mut Vec<u8>, tick: u64, last_tick: u64) -> Result<(), EncodeError> {
    let delta = tick.saturating_sub(last_tick);
    if delta > MAX_VARIABLE_LENGTH {
        return Err(EncodeError::TickOverflow { tick });
    }
    write_variable_length(out, delta as u32);
    Ok(())
}

/// Append `value` as a MIDI variable-length quantity (7 bits per byte, big-endian)
pub fn write_variable_length(out: &mut Vec<u8>, mut value: u32) {
    let mut bytes = [0u8; 5];
    let mut len = 1;

    bytes[0] = (value & 0x7F) as u8;
    value >>= 7;

    while value > 0 {
        bytes[len] = (value & 0x7F) as u8 | 0x80;
        value >>= 7;
        len += 1;
    }

    out.extend(bytes[..len].iter().rev());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeSignature;
    use crate::export::read::{read_smf, SmfEventKind};
    use crate::pattern::{ChordEvent, DrumHit, DrumLane, NoteEvent};
    use rand::Rng;
    use std::collections::BTreeMap;

    fn settings() -> TrackSettings {
        TrackSettings::new(120, TimeSignature::default(), 1)
    }

    fn kick_pattern() -> Pattern {
        let mut lanes = BTreeMap::new();
        lanes.insert(
            "kick".to_string(),
            DrumLane {
                note: 36,
                hits: vec![DrumHit {
                    start_beat: 0.0,
                    duration_beats: 0.25,
                    velocity: 100,
                }],
            },
        );
        Pattern::new().with_track(TrackKind::Drums, Track::Drums(lanes))
    }

    fn melody(notes: &[(f64, f64, u8)]) -> Track {
        Track::Notes(
            notes
                .iter()
                .map(|&(start_beat, duration_beats, pitch)| NoteEvent {
                    start_beat,
                    duration_beats,
                    pitch,
                    velocity: 90,
                })
                .collect(),
        )
    }

    #[test]
    fn test_variable_length() {
        let cases: [(u32, &[u8]); 6] = [
            (0, &[0x00]),
            (0x40, &[0x40]),
            (0x7F, &[0x7F]),
            (0x80, &[0x81, 0x00]),
            (0x3FFF, &[0xFF, 0x7F]),
            (0x0FFF_FFFF, &[0xFF, 0xFF, 0xFF, 0x7F]),
        ];
        for (value, expected) in cases {
            let mut out = Vec::new();
            write_variable_length(&mut out, value);
            assert_eq!(out, expected, "value {:#x}", value);
        }
    }

    #[test]
    fn test_header() {
        let bytes = MidiFileEncoder::new().encode(&settings(), &kick_pattern()).unwrap();

        assert_eq!(&bytes[0..4], b"MThd");
        assert_eq!(&bytes[4..8], &[0, 0, 0, 6]);
        assert_eq!(&bytes[8..10], &1u16.to_be_bytes()); // Format 1
        assert_eq!(&bytes[10..12], &2u16.to_be_bytes()); // Meta + drums
        assert_eq!(&bytes[12..14], &480u16.to_be_bytes());
        assert_eq!(&bytes[14..18], b"MTrk");
    }

    #[test]
    fn test_kick_scenario() {
        let bytes = MidiFileEncoder::new().encode(&settings(), &kick_pattern()).unwrap();
        let file = read_smf(&bytes).unwrap();

        let drums = &file.tracks[1];
        let notes: Vec<_> = drums
            .events
            .iter()
            .filter(|e| !matches!(e.kind, SmfEventKind::Meta { .. }))
            .collect();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].tick, 0);
        assert_eq!(
            notes[0].kind,
            SmfEventKind::NoteOn { channel: 9, key: 36, velocity: 100 }
        );
        assert_eq!(notes[1].tick, 120);
        assert_eq!(notes[1].kind, SmfEventKind::NoteOff { channel: 9, key: 36 });
    }

    #[test]
    fn test_meta_track() {
        let mut settings = TrackSettings::new(90, TimeSignature::new(6, 8), 2);
        settings.key = "E minor".to_string();
        settings.song_section = "verse".to_string();

        let bytes = MidiFileEncoder::new().encode(&settings, &kick_pattern()).unwrap();
        let file = read_smf(&bytes).unwrap();
        let meta = &file.tracks[0];

        assert_eq!(meta.name(), Some("verse".to_string()));
        assert_eq!(meta.meta(messages::META_TEMPO), Some(&[0x0A, 0x2C, 0x2A][..])); // 666_666 us
        assert_eq!(meta.meta(messages::META_TIME_SIGNATURE), Some(&[6, 3, 24, 8][..]));
        assert_eq!(meta.meta(messages::META_KEY_SIGNATURE), Some(&[1, 1][..]));
    }

    #[test]
    fn test_unparseable_key_skips_key_signature() {
        let mut settings = settings();
        settings.key = "dorian-ish".to_string();
        let bytes = MidiFileEncoder::new().encode(&settings, &kick_pattern()).unwrap();
        let file = read_smf(&bytes).unwrap();
        assert!(file.tracks[0].meta(messages::META_KEY_SIGNATURE).is_none());
    }

    #[test]
    fn test_end_of_track_covers_loop_length() {
        // 2 bars of 4/4 = 8 beats, the kick ends long before
        let settings = TrackSettings::new(120, TimeSignature::default(), 2);
        let bytes = MidiFileEncoder::new().encode(&settings, &kick_pattern()).unwrap();
        let file = read_smf(&bytes).unwrap();
        for track in &file.tracks {
            assert_eq!(track.end_tick(), Some(8 * 480));
        }
    }

    #[test]
    fn test_end_of_track_covers_overhang() {
        let pattern = Pattern::new().with_track(TrackKind::Melody, melody(&[(3.0, 3.0, 60)]));
        let bytes = MidiFileEncoder::new().encode(&settings(), &pattern).unwrap();
        let file = read_smf(&bytes).unwrap();
        assert_eq!(file.tracks[1].end_tick(), Some(6 * 480));
        assert_eq!(file.tracks[0].end_tick(), Some(6 * 480));
    }

    #[test]
    fn test_deterministic() {
        let pattern = kick_pattern()
            .with_track(TrackKind::Melody, melody(&[(0.0, 1.0, 60), (1.5, 0.5, 67)]))
            .with_track(TrackKind::Bassline, melody(&[(0.0, 2.0, 36)]));
        let encoder = MidiFileEncoder::new();
        let first = encoder.encode(&settings(), &pattern).unwrap();
        for _ in 0..5 {
            assert_eq!(encoder.encode(&settings(), &pattern).unwrap(), first);
        }
    }

    #[test]
    fn test_track_order_and_channels() {
        let pattern = kick_pattern()
            .with_track(TrackKind::Melody, melody(&[(0.0, 1.0, 72)]))
            .with_track(TrackKind::Bassline, melody(&[(0.0, 1.0, 40)]));
        let bytes = MidiFileEncoder::new().encode(&settings(), &pattern).unwrap();
        let file = read_smf(&bytes).unwrap();

        let names: Vec<_> = file.tracks.iter().skip(1).filter_map(|t| t.name()).collect();
        assert_eq!(names, vec!["Bassline", "Melody", "Drums"]);

        let channels: Vec<_> = file
            .tracks
            .iter()
            .skip(1)
            .filter_map(|t| {
                t.events.iter().find_map(|e| match e.kind {
                    SmfEventKind::NoteOn { channel, .. } => Some(channel),
                    _ => None,
                })
            })
            .collect();
        assert_eq!(channels, vec![1, 2, 9]);
    }

    #[test]
    fn test_chords_expand_with_markers() {
        let pattern = Pattern::new().with_track(
            TrackKind::Chords,
            Track::Chords(vec![ChordEvent {
                start_beat: 0.0,
                duration_beats: 4.0,
                notes: vec![57, 60, 64],
                velocity: 80,
                label: Some("Am".to_string()),
            }]),
        );
        let bytes = MidiFileEncoder::new().encode(&settings(), &pattern).unwrap();
        let file = read_smf(&bytes).unwrap();
        let chords = &file.tracks[1];

        assert_eq!(chords.meta(messages::META_MARKER), Some(&b"Am"[..]));
        let ons = chords
            .events
            .iter()
            .filter(|e| matches!(e.kind, SmfEventKind::NoteOn { channel: 0, .. }))
            .count();
        let offs: Vec<_> = chords
            .events
            .iter()
            .filter(|e| matches!(e.kind, SmfEventKind::NoteOff { .. }))
            .map(|e| e.tick)
            .collect();
        assert_eq!(ons, 3);
        assert_eq!(offs, vec![1920, 1920, 1920]);
    }

    #[test]
    fn test_same_tick_releases_before_strike() {
        let pattern = Pattern::new().with_track(TrackKind::Melody, melody(&[(0.0, 1.0, 60), (1.0, 1.0, 60)]));
        let bytes = MidiFileEncoder::new().encode(&settings(), &pattern).unwrap();
        let file = read_smf(&bytes).unwrap();

        let at_beat_one: Vec<_> = file.tracks[1].events.iter().filter(|e| e.tick == 480).collect();
        assert_eq!(at_beat_one.len(), 2);
        assert!(matches!(at_beat_one[0].kind, SmfEventKind::NoteOff { .. }));
        assert!(matches!(at_beat_one[1].kind, SmfEventKind::NoteOn { .. }));
    }

    #[test]
    fn test_note_off_always_after_note_on() {
        let mut rng = rand::thread_rng();
        let encoder = MidiFileEncoder::new();

        for _ in 0..500 {
            let start = rng.gen_range(0.0..64.0);
            // Include durations well below one tick
            let duration = rng.gen_range(0.000_01..2.0);
            let track = melody(&[(start, duration, rng.gen_range(0..=127))]);

            let events = encoder.instrument_events(TrackKind::Melody, &track);
            let on = events.iter().find(|e| e.rank == RANK_NOTE_ON).unwrap();
            let off = events.iter().find(|e| e.rank == RANK_NOTE_OFF).unwrap();
            assert!(off.tick > on.tick, "start {} duration {}", start, duration);
        }
    }

    #[test]
    fn test_tiny_duration_bumped_one_tick() {
        let pattern = Pattern::new().with_track(TrackKind::Melody, melody(&[(1.0, 0.0001, 64)]));
        let bytes = MidiFileEncoder::new().encode(&settings(), &pattern).unwrap();
        let file = read_smf(&bytes).unwrap();
        let ticks: Vec<_> = file.tracks[1]
            .events
            .iter()
            .filter(|e| !matches!(e.kind, SmfEventKind::Meta { .. }))
            .map(|e| e.tick)
            .collect();
        assert_eq!(ticks, vec![480, 481]);
    }

    #[test]
    fn test_empty_pattern_rejected() {
        let err = MidiFileEncoder::new().encode(&settings(), &Pattern::new()).unwrap_err();
        assert!(matches!(err, EncodeError::EmptyPattern { .. }));

        let err = MidiFileEncoder::new()
            .encode_track(&settings(), &kick_pattern(), TrackKind::Melody)
            .unwrap_err();
        assert_eq!(err.to_string(), "nothing to export: the melody track has no events");
    }

    #[test]
    fn test_encode_single_track() {
        let pattern = kick_pattern().with_track(TrackKind::Melody, melody(&[(0.0, 1.0, 60)]));
        let bytes = MidiFileEncoder::new()
            .encode_track(&settings(), &pattern, TrackKind::Drums)
            .unwrap();
        let file = read_smf(&bytes).unwrap();
        assert_eq!(file.tracks.len(), 2);
        assert_eq!(file.tracks[1].name(), Some("Drums".to_string()));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = TrackSettings::new(120, TimeSignature::new(5, 6), 1);
        let err = MidiFileEncoder::new().encode(&settings, &kick_pattern()).unwrap_err();
        assert!(matches!(err, EncodeError::InvalidSettings(SettingsError::Denominator(6))));
    }

    #[test]
    fn test_custom_ppqn() {
        let encoder = MidiFileEncoder::with_ppqn(96);
        assert_eq!(encoder.ppqn(), 96);
        let bytes = encoder.encode(&settings(), &kick_pattern()).unwrap();
        let file = read_smf(&bytes).unwrap();
        assert_eq!(file.division, 96);
        assert_eq!(file.tracks[1].end_tick(), Some(4 * 96));

        assert_eq!(MidiFileEncoder::with_ppqn(0).ppqn(), 1);
        assert_eq!(MidiFileEncoder::with_ppqn(u16::MAX).ppqn(), 0x7FFF);
    }
}
