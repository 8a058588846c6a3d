// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Standard MIDI File reading, on top of `midly`.
//!
//! Flattens a parsed file into owned, absolute-tick events for the
//! `inspect` command and for checking what the encoder wrote.

use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use thiserror::Error;

use crate::midi::messages;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("invalid MIDI file: {0}")]
    Parse(#[from] midly::Error),
    /// SMPTE timecode division instead of ticks per quarter note
    #[error("timecode division is not supported")]
    TimecodeDivision,
}

/// A parsed MIDI file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmfFile {
    pub format: u16,
    /// Ticks per quarter note
    pub division: u16,
    pub tracks: Vec<SmfTrack>,
}

/// Events of one `MTrk` chunk, in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmfTrack {
    pub events: Vec<SmfEvent>,
}

/// An event at an absolute tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmfEvent {
    pub tick: u64,
    pub kind: SmfEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmfEventKind {
    NoteOn { channel: u8, key: u8, velocity: u8 },
    /// Also produced for note-on with velocity 0
    NoteOff { channel: u8, key: u8 },
    /// Meta event type and its payload bytes
    Meta { kind: u8, data: Vec<u8> },
    /// Any other event, by status byte
    Other { status: u8 },
}

impl SmfTrack {
    /// Payload of the first meta event of `kind`
    pub fn meta(&self, kind: u8) -> Option<&[u8]> {
        self.events.iter().find_map(|e| match &e.kind {
            SmfEventKind::Meta { kind: k, data } if *k == kind => Some(data.as_slice()),
            _ => None,
        })
    }

    /// Track name meta event, if any
    pub fn name(&self) -> Option<String> {
        self.meta(messages::META_TRACK_NAME)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Tick of the end-of-track marker
    pub fn end_tick(&self) -> Option<u64> {
        self.events.iter().find_map(|e| match e.kind {
            SmfEventKind::Meta { kind, .. } if kind == messages::META_END_OF_TRACK => Some(e.tick),
            _ => None,
        })
    }

    /// Number of note-on events
    pub fn note_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.kind, SmfEventKind::NoteOn { .. }))
            .count()
    }
}

/// Parse a complete MIDI file
pub fn read_smf(bytes: &[u8]) -> Result<SmfFile, ReadError> {
    let smf = Smf::parse(bytes)?;

    let division = match smf.header.timing {
        Timing::Metrical(ticks) => ticks.as_int(),
        Timing::Timecode(..) => return Err(ReadError::TimecodeDivision),
    };
    let format = match smf.header.format {
        Format::SingleTrack => 0,
        Format::Parallel => 1,
        Format::Sequential => 2,
    };

    Ok(SmfFile {
        format,
        division,
        tracks: smf.tracks.into_iter().map(read_track).collect(),
    })
}

fn read_track(events: Vec<TrackEvent<'_>>) -> SmfTrack {
    let mut tick = 0u64;
    let events = events
        .into_iter()
        .map(|event| {
            tick += u64::from(event.delta.as_int());
            SmfEvent {
                tick,
                kind: event_kind(event.kind),
            }
        })
        .collect();
    SmfTrack { events }
}

fn event_kind(kind: TrackEventKind<'_>) -> SmfEventKind {
    match kind {
        TrackEventKind::Midi { channel, message } => {
            let channel = channel.as_int();
            match message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => SmfEventKind::NoteOn {
                    channel,
                    key: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => SmfEventKind::NoteOff {
                    channel,
                    key: key.as_int(),
                },
                other => SmfEventKind::Other {
                    status: channel_status(&other) | channel,
                },
            }
        }
        TrackEventKind::Meta(meta) => meta_kind(meta),
        TrackEventKind::SysEx(_) => SmfEventKind::Other {
            status: messages::SYSEX_START,
        },
        TrackEventKind::Escape(_) => SmfEventKind::Other {
            status: messages::SYSEX_END,
        },
    }
}

fn channel_status(message: &MidiMessage) -> u8 {
    match message {
        MidiMessage::NoteOff { .. } => messages::NOTE_OFF,
        MidiMessage::NoteOn { .. } => messages::NOTE_ON,
        MidiMessage::Aftertouch { .. } => messages::POLY_AFTERTOUCH,
        MidiMessage::Controller { .. } => messages::CONTROL_CHANGE,
        MidiMessage::ProgramChange { .. } => messages::PROGRAM_CHANGE,
        MidiMessage::ChannelAftertouch { .. } => messages::CHANNEL_AFTERTOUCH,
        MidiMessage::PitchBend { .. } => messages::PITCH_BEND,
    }
}

/// Meta events the encoder writes keep their raw payload
fn meta_kind(meta: MetaMessage<'_>) -> SmfEventKind {
    let (kind, data) = match meta {
        MetaMessage::TrackName(name) => (messages::META_TRACK_NAME, name.to_vec()),
        MetaMessage::Marker(text) => (messages::META_MARKER, text.to_vec()),
        MetaMessage::EndOfTrack => (messages::META_END_OF_TRACK, Vec::new()),
        MetaMessage::Tempo(micros) => (messages::META_TEMPO, micros.as_int().to_be_bytes()[1..].to_vec()),
        MetaMessage::TimeSignature(numerator, power, clocks, notated) => (
            messages::META_TIME_SIGNATURE,
            vec![numerator, power, clocks, notated],
        ),
        MetaMessage::KeySignature(accidentals, minor) => (
            messages::META_KEY_SIGNATURE,
            vec![accidentals as u8, u8::from(minor)],
        ),
        MetaMessage::Unknown(kind, data) => (kind, data.to_vec()),
        _ => {
            return SmfEventKind::Other {
                status: messages::META,
            }
        }
    };
    SmfEventKind::Meta { kind, data }
}
