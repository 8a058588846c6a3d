// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Configuration system for groovecraft.
//!
//! This module provides the track settings that accompany every pattern
//! (tempo, meter, bars, targeted instruments) and the application config
//! file that bundles them with scheduler and backend options.

pub mod watcher;

pub use watcher::{ConfigWatcher, WatchEvent};

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pattern::{TrackKind, TrackSet};
use crate::playback::SchedulerConfig;

/// Tempo range accepted by [`TrackSettings::validate`]
pub const TEMPO_RANGE: std::ops::RangeInclusive<u16> = 30..=300;
/// Bar count range accepted by [`TrackSettings::validate`]
pub const BARS_RANGE: std::ops::RangeInclusive<u8> = 1..=32;

/// Out-of-range track settings
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("tempo {0} BPM is outside 30-300")]
    Tempo(u16),
    #[error("bar count {0} is outside 1-32")]
    Bars(u8),
    #[error("time signature numerator {0} is outside 1-32")]
    Numerator(u8),
    #[error("time signature denominator {0} must be a power of two up to 32")]
    Denominator(u8),
}

/// Time signature (numerator / denominator)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl TimeSignature {
    pub fn new(numerator: u8, denominator: u8) -> Self {
        Self {
            numerator,
            denominator,
        }
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

impl std::fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Musical parameters a pattern was generated for
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackSettings {
    /// Musical key label (e.g., "A minor", "F#")
    #[serde(default = "default_key")]
    pub key: String,
    /// Tempo in BPM
    #[serde(default = "default_tempo")]
    pub tempo: u16,
    #[serde(default)]
    pub time_signature: TimeSignature,
    /// Free-text progression label (e.g., "i - VI - III - VII")
    #[serde(default)]
    pub chord_progression: String,
    #[serde(default)]
    pub genre: String,
    /// Loop length in bars
    #[serde(default = "default_bars")]
    pub bars: u8,
    /// Instruments the pattern should contain
    #[serde(default = "TrackKind::all")]
    pub target_instruments: TrackSet,
    /// Section label (e.g., "chorus")
    #[serde(default)]
    pub song_section: String,
}

fn default_key() -> String {
    "C".to_string()
}
fn default_tempo() -> u16 {
    120
}
fn default_bars() -> u8 {
    4
}

impl Default for TrackSettings {
    fn default() -> Self {
        Self {
            key: default_key(),
            tempo: default_tempo(),
            time_signature: TimeSignature::default(),
            chord_progression: String::new(),
            genre: String::new(),
            bars: default_bars(),
            target_instruments: TrackKind::all(),
            song_section: String::new(),
        }
    }
}

impl TrackSettings {
    /// Create settings with the given tempo, meter and length
    pub fn new(tempo: u16, time_signature: TimeSignature, bars: u8) -> Self {
        Self {
            tempo,
            time_signature,
            bars,
            ..Default::default()
        }
    }

    /// Check every range the encoder and scheduler rely on
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !TEMPO_RANGE.contains(&self.tempo) {
            return Err(SettingsError::Tempo(self.tempo));
        }
        if !BARS_RANGE.contains(&self.bars) {
            return Err(SettingsError::Bars(self.bars));
        }
        let TimeSignature {
            numerator,
            denominator,
        } = self.time_signature;
        if !(1..=32).contains(&numerator) {
            return Err(SettingsError::Numerator(numerator));
        }
        if !denominator.is_power_of_two() || denominator > 32 {
            return Err(SettingsError::Denominator(denominator));
        }
        Ok(())
    }

    /// Tempo as a float for time conversion
    pub fn tempo_bpm(&self) -> f64 {
        f64::from(self.tempo)
    }
}

/// Application config file: settings plus playback options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: TrackSettings,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// SF2 soundfont for the built-in synth
    #[serde(default)]
    pub soundfont: Option<String>,
    /// MIDI output port index for external playback
    #[serde(default)]
    pub midi_port: Option<usize>,
}

impl AppConfig {
    /// Load from a YAML or TOML file, chosen by extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let is_toml = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("toml"));
        let config = if is_toml {
            Self::from_toml(&contents)?
        } else {
            Self::from_yaml(&contents)?
        };

        config
            .settings
            .validate()
            .with_context(|| format!("Invalid settings in {:?}", path))?;
        Ok(config)
    }

    /// Parse from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse YAML configuration")
    }

    /// Parse from TOML string
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse TOML configuration")
    }

    /// Serialize to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize configuration to YAML")
    }

    /// Save configuration as YAML
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = self.to_yaml()?;
        fs::write(path.as_ref(), yaml)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))
    }
}
