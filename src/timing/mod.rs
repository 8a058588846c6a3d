// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Timing module.
//!
//! This module provides conversions between musical time (beats, bars,
//! ticks) and wall-clock time for the encoder and the playback scheduler.

pub mod convert;

pub use convert::{
    beats_to_duration, beats_to_seconds, beats_to_ticks, loop_beats, seconds_per_beat,
    total_beats, total_duration_seconds, TimingError, PPQN,
};
