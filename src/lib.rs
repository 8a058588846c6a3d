// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! groovecraft - turns generated music patterns into MIDI files and live preview.
//!
//! Generated text is validated into an immutable [`pattern::Pattern`], which
//! can then be written as a Standard MIDI File ([`export`]) or auditioned
//! through an audio or MIDI backend ([`playback`]).

pub mod audio;
pub mod config;
pub mod export;
pub mod midi;
pub mod music;
pub mod pattern;
pub mod playback;
pub mod timing;

pub use config::{AppConfig, TimeSignature, TrackSettings};
pub use export::MidiFileEncoder;
pub use pattern::{Pattern, TrackKind, TrackSet};
pub use playback::{PlaybackScheduler, SchedulerConfig, SessionHandle, TransportState};
