// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Musical-time conversions.
//!
//! A beat is one quarter note. Every conversion that needs a tempo
//! rejects non-positive or non-finite tempos instead of defaulting.

use std::time::Duration;

use thiserror::Error;

use crate::config::TrackSettings;
use crate::pattern::Pattern;

/// Ticks per quarter note used for every MIDI file we write
pub const PPQN: u16 = 480;

/// Invalid timing input (a caller error)
#[derive(Debug, Clone, Copy, Error, PartialEq)]
pub enum TimingError {
    #[error("tempo must be a positive, finite BPM value (got {0})")]
    InvalidTempo(f64),
}

fn check_tempo(tempo_bpm: f64) -> Result<f64, TimingError> {
    if tempo_bpm.is_finite() && tempo_bpm > 0.0 {
        Ok(tempo_bpm)
    } else {
        Err(TimingError::InvalidTempo(tempo_bpm))
    }
}

/// Seconds per beat: `60 / tempo`
pub fn seconds_per_beat(tempo_bpm: f64) -> Result<f64, TimingError> {
    Ok(60.0 / check_tempo(tempo_bpm)?)
}

/// Position in seconds of `beat` at `tempo_bpm`
pub fn beats_to_seconds(beat: f64, tempo_bpm: f64) -> Result<f64, TimingError> {
    Ok(beat * seconds_per_beat(tempo_bpm)?)
}

/// Same as [`beats_to_seconds`], as a `Duration` (negative beats clamp to zero)
pub fn beats_to_duration(beat: f64, tempo_bpm: f64) -> Result<Duration, TimingError> {
    let seconds = beats_to_seconds(beat, tempo_bpm)?;
    Ok(Duration::from_secs_f64(seconds.max(0.0)))
}

/// Total beats in a loop: `bars * numerator`
pub fn total_beats(bars: u32, numerator: u32) -> u32 {
    bars * numerator
}

/// Loop length in beats for the given settings
pub fn loop_beats(settings: &TrackSettings) -> u32 {
    total_beats(
        u32::from(settings.bars),
        u32::from(settings.time_signature.numerator),
    )
}

/// Nearest tick for `beat` at `ppqn` ticks per beat
pub fn beats_to_ticks(beat: f64, ppqn: u16) -> u64 {
    (beat.max(0.0) * f64::from(ppqn)).round() as u64
}

/// Wall-clock length of the pattern: the latest event end, in seconds
pub fn total_duration_seconds(pattern: &Pattern, settings: &TrackSettings) -> Result<f64, TimingError> {
    beats_to_seconds(pattern.end_beat(), settings.tempo_bpm())
}
