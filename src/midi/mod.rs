// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! MIDI protocol constants and MIDI output.
//!
//! This module provides a trait-based abstraction for MIDI output so live
//! preview can drive an external synth or DAW through any backend, and the
//! byte-level constants shared with the file encoder.

#[cfg(feature = "midi-port")]
pub mod port;

#[cfg(feature = "midi-port")]
pub use port::{list_ports, print_ports, PortOutput};

use anyhow::Result;
use tracing::warn;

use crate::audio::NoteSink;

/// Trait for MIDI output implementations.
///
/// This trait abstracts over different MIDI backends, providing a unified
/// interface for sending raw MIDI messages.
pub trait MidiOutput: Send {
    /// Send a MIDI message immediately.
    ///
    /// # Arguments
    /// * `message` - Raw MIDI bytes (e.g., `[0x90, 60, 127]` for Note On)
    fn send(&mut self, message: &[u8]) -> Result<()>;
}

/// [`NoteSink`] that forwards notes to a [`MidiOutput`]
pub struct OutputSink<O: MidiOutput> {
    output: O,
}

impl<O: MidiOutput> OutputSink<O> {
    pub fn new(output: O) -> Self {
        Self { output }
    }

    pub fn into_inner(self) -> O {
        self.output
    }

    fn send(&mut self, message: &[u8]) {
        if let Err(e) = self.output.send(message) {
            warn!(error = %e, "failed to send MIDI message");
        }
    }
}

impl<O: MidiOutput> NoteSink for OutputSink<O> {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        self.send(&[
            messages::NOTE_ON | (channel & 0x0F),
            note & 0x7F,
            velocity & 0x7F,
        ]);
    }

    fn note_off(&mut self, channel: u8, note: u8) {
        self.send(&[messages::NOTE_OFF | (channel & 0x0F), note & 0x7F, 0]);
    }
}

/// MIDI message constants
pub mod messages {
    // Channel Voice Messages (upper nibble, lower nibble is channel 0-15)
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const POLY_AFTERTOUCH: u8 = 0xA0;
    pub const CONTROL_CHANGE: u8 = 0xB0;
    pub const PROGRAM_CHANGE: u8 = 0xC0;
    pub const CHANNEL_AFTERTOUCH: u8 = 0xD0;
    pub const PITCH_BEND: u8 = 0xE0;

    // Channel Mode controller numbers
    pub const ALL_NOTES_OFF: u8 = 123;

    // System Common Messages (SysEx framing in files)
    pub const SYSEX_START: u8 = 0xF0;
    pub const SYSEX_END: u8 = 0xF7;

    // Standard MIDI File meta events (0xFF, type, length, data)
    pub const META: u8 = 0xFF;
    pub const META_TRACK_NAME: u8 = 0x03;
    pub const META_MARKER: u8 = 0x06;
    pub const META_END_OF_TRACK: u8 = 0x2F;
    pub const META_TEMPO: u8 = 0x51;
    pub const META_TIME_SIGNATURE: u8 = 0x58;
    pub const META_KEY_SIGNATURE: u8 = 0x59;
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::{Arc, Mutex};

    /// Mock MIDI output for testing
    struct MockMidiOutput {
        messages: Arc<Mutex<Vec<Vec<u8>>>>,
        fail: bool,
    }

    impl MockMidiOutput {
        fn new() -> Self {
            Self {
                messages: Arc::new(Mutex::new(Vec::new())),
                fail: false,
            }
        }

        fn get_messages(&self) -> Vec<Vec<u8>> {
            self.messages.lock().unwrap().clone()
        }
    }

    impl MidiOutput for MockMidiOutput {
        fn send(&mut self, message: &[u8]) -> Result<()> {
            if self.fail {
                return Err(anyhow!("port closed"));
            }
            self.messages.lock().unwrap().push(message.to_vec());
            Ok(())
        }
    }

    #[test]
    fn test_output_sink_note_bytes() {
        let mut sink = OutputSink::new(MockMidiOutput::new());

        sink.note_on(9, 36, 110);
        sink.note_off(9, 36);

        let output = sink.into_inner();
        assert_eq!(output.get_messages(), vec![vec![0x99, 36, 110], vec![0x89, 36, 0]]);
    }

    #[test]
    fn test_output_sink_masks_data_bytes() {
        let mut sink = OutputSink::new(MockMidiOutput::new());
        sink.note_on(17, 200, 255);
        assert_eq!(sink.into_inner().get_messages(), vec![vec![0x91, 72, 127]]);
    }

    #[test]
    fn test_output_sink_survives_send_errors() {
        let mut output = MockMidiOutput::new();
        output.fail = true;
        let mut sink = OutputSink::new(output);
        sink.note_on(0, 60, 100);
        assert!(sink.into_inner().get_messages().is_empty());
    }

    #[test]
    fn test_midi_message_constants() {
        assert_eq!(messages::NOTE_ON, 0x90);
        assert_eq!(messages::NOTE_OFF, 0x80);
        assert_eq!(messages::META_TEMPO, 0x51);
        assert_eq!(messages::META_END_OF_TRACK, 0x2F);
    }
}
