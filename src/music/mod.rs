// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Music reference data for the pattern engine.
//!
//! This module provides the General MIDI drum registry used to resolve
//! drum names, and key-signature parsing for MIDI file export.

pub mod drum_map;
pub mod key;

pub use drum_map::{gm_drums, lookup, normalize, resolve, DrumEntry, DrumResolution, FALLBACK_NOTE};
pub use key::KeySignature;
