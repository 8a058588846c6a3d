// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Standard MIDI file export.
//!
//! Patterns are written as format 1 files: a meta track carrying tempo,
//! meter and key, followed by one track per instrument. A small reader is
//! included for inspecting what was written.

pub mod read;
pub mod smf;

pub use read::{read_smf, ReadError, SmfEvent, SmfEventKind, SmfFile, SmfTrack};
pub use smf::{write_variable_length, EncodeError, MidiFileEncoder, FORMAT_MULTI_TRACK};
