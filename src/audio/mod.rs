// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Audio backends for live preview.
//!
//! This module provides:
//! - The [`AudioBackend`] capability the playback scheduler drives
//! - [`NoteSink`], the thing that actually makes sound (or logs, or sends MIDI)
//! - [`TimedBackend`], a dispatcher thread that fires scheduled notes into a sink
//! - FluidLite synthesis through cpal (feature `synth`)

pub mod dispatch;
#[cfg(feature = "synth")]
pub mod synth;

pub use dispatch::TimedBackend;
#[cfg(feature = "synth")]
pub use synth::{SynthConfig, SynthSink};

use std::fmt;
use std::time::Instant;

use thiserror::Error;
use tracing::info;

/// Identifies one scheduled trigger so it can be cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TriggerId(pub u64);

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A note event due at an absolute time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteTrigger {
    pub at: Instant,
    /// MIDI channel (0-15)
    pub channel: u8,
    pub note: u8,
    /// Ignored for note-offs
    pub velocity: u8,
}

/// A channel/note pair a session may have left sounding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Voice {
    pub channel: u8,
    pub note: u8,
}

/// The audio output could not be brought up
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("no audio output device available")]
    NoDevice,
    #[error("audio initialization failed: {0}")]
    InitFailed(String),
    #[error("soundfont load failed: {0}")]
    SoundfontLoadFailed(String),
    #[error("audio stream failed: {0}")]
    StreamFailed(String),
    #[error("MIDI output unavailable: {0}")]
    MidiPort(String),
    #[error("failed to start the dispatcher thread: {0}")]
    Dispatcher(String),
}

/// Timed note output driven by the playback scheduler.
///
/// Implementations must guarantee that once [`cancel`](AudioBackend::cancel)
/// returns, none of the cancelled triggers will fire.
pub trait AudioBackend {
    /// Bring the output up. Calls after a success do nothing.
    fn acquire(&mut self) -> Result<(), BackendError>;

    fn schedule_note_on(&mut self, trigger: NoteTrigger) -> TriggerId;

    fn schedule_note_off(&mut self, trigger: NoteTrigger) -> TriggerId;

    /// Drop pending triggers; unknown or already fired ids are ignored
    fn cancel(&mut self, ids: &[TriggerId]);

    /// Send an immediate note-off to each voice
    fn release(&mut self, voices: &[Voice]);
}

/// Something that reacts to note events as they happen
pub trait NoteSink: Send {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8);

    fn note_off(&mut self, channel: u8, note: u8);
}

impl<S: NoteSink + ?Sized> NoteSink for Box<S> {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        (**self).note_on(channel, note, velocity);
    }

    fn note_off(&mut self, channel: u8, note: u8) {
        (**self).note_off(channel, note);
    }
}

/// Sink that only logs, for machines without audio or MIDI
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceSink;

impl NoteSink for TraceSink {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        info!(channel, note, velocity, "note on");
    }

    fn note_off(&mut self, channel: u8, note: u8) {
        info!(channel, note, "note off");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(BackendError::NoDevice.to_string(), "no audio output device available");
        assert_eq!(
            BackendError::SoundfontLoadFailed("gm.sf2".to_string()).to_string(),
            "soundfont load failed: gm.sf2"
        );
    }

    #[test]
    fn test_boxed_sink() {
        let mut sink: Box<dyn NoteSink> = Box::new(TraceSink);
        sink.note_on(9, 36, 100);
        sink.note_off(9, 36);
    }

    #[test]
    fn test_voice_ordering() {
        let mut voices = vec![
            Voice { channel: 9, note: 36 },
            Voice { channel: 0, note: 64 },
            Voice { channel: 0, note: 60 },
        ];
        voices.sort();
        assert_eq!(voices[0], Voice { channel: 0, note: 60 });
        assert_eq!(TriggerId(7).to_string(), "#7");
    }
}
