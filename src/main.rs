// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

use std::env;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use groovecraft::audio::{BackendError, NoteSink, TimedBackend, TraceSink};
use groovecraft::config::{AppConfig, ConfigWatcher, WatchEvent};
use groovecraft::export::{read_smf, SmfEventKind};
use groovecraft::midi::messages;
use groovecraft::pattern::{self, TrackKind, TrackSet, Validated};
use groovecraft::{MidiFileEncoder, PlaybackScheduler, TransportState};

fn print_usage() {
    println!("groovecraft - MIDI pattern engine");
    println!();
    println!("Usage: groovecraft [-v] <COMMAND> [ARGS]");
    println!();
    println!("Commands:");
    println!("  --validate <PATTERN> [--tracks a,b]          Validate generated pattern text");
    println!("  --export <CONFIG> <PATTERN> <OUT.mid> [--track K]");
    println!("                                               Write a Standard MIDI File");
    println!("  --play <CONFIG> <PATTERN> [--track K]        Preview through the configured backend");
    println!("  --watch <CONFIG> <PATTERN> <OUT.mid>         Re-export whenever either file changes");
    println!("  --inspect <FILE.mid>                         Summarize a MIDI file");
    #[cfg(feature = "midi-port")]
    println!("  --list-midi                                  List available MIDI outputs");
    println!("  --help                                       Show this help message");
    println!();
    println!("Options:");
    println!("  -v, -vv                 More log output (RUST_LOG overrides)");
    println!("  --track K               Only chords, bassline, melody or drums");
    println!("  --tracks a,b            Tracks to accept when validating (default: all)");
}

/// Parsed command line: positional words plus the few named options
struct Args {
    positional: Vec<String>,
    verbosity: u8,
    track: Option<TrackKind>,
    tracks: Option<TrackSet>,
}

impl Args {
    fn parse(mut raw: impl Iterator<Item = String>) -> Result<Self> {
        let mut args = Args {
            positional: Vec::new(),
            verbosity: 0,
            track: None,
            tracks: None,
        };

        while let Some(arg) = raw.next() {
            match arg.as_str() {
                "-v" | "--verbose" => args.verbosity += 1,
                "-vv" => args.verbosity += 2,
                "--track" => {
                    let value = raw.next().ok_or_else(|| anyhow!("--track requires a value"))?;
                    args.track = Some(value.parse()?);
                }
                "--tracks" => {
                    let value = raw.next().ok_or_else(|| anyhow!("--tracks requires a value"))?;
                    let set = value
                        .split(',')
                        .filter(|s| !s.trim().is_empty())
                        .map(|s| s.parse::<TrackKind>())
                        .collect::<Result<TrackSet, _>>()?;
                    args.tracks = Some(set);
                }
                _ => args.positional.push(arg),
            }
        }
        Ok(args)
    }

    /// Positional argument `index`, or an error naming what was expected
    fn require(&self, index: usize, what: &str) -> Result<&str> {
        self.positional
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("{} requires {}", self.positional[0], what))
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("groovecraft={}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn read_pattern(path: &str, requested: &TrackSet) -> Result<Validated> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read pattern file: {}", path))?;
    let validated = pattern::from_generated_text(&text, requested)
        .with_context(|| format!("Failed to read pattern from {}", path))?;
    for warning in &validated.warnings {
        warn!("{}", warning);
    }
    Ok(validated)
}

fn validate_pattern(path: &str, requested: &TrackSet) -> Result<()> {
    let validated = read_pattern(path, requested)?;

    println!("Pattern: {} event(s), ends at beat {}", validated.pattern.event_count(), validated.pattern.end_beat());
    for (kind, track) in validated.pattern.tracks() {
        println!("  {:<9} {} event(s)", kind.key(), track.event_count());
    }
    for warning in &validated.warnings {
        println!("  warning: {}", warning);
    }
    match validated.summary() {
        Some(summary) => println!("{}", summary),
        None => println!("No problems found."),
    }
    Ok(())
}

fn export_pattern(config_path: &str, pattern_path: &str, out: &str, track: Option<TrackKind>) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let validated = read_pattern(pattern_path, &config.settings.target_instruments)?;

    let encoder = MidiFileEncoder::new();
    let bytes = match track {
        Some(kind) => encoder.encode_track(&config.settings, &validated.pattern, kind)?,
        None => encoder.encode(&config.settings, &validated.pattern)?,
    };
    fs::write(out, &bytes).with_context(|| format!("Failed to write MIDI file: {}", out))?;

    info!(path = out, bytes = bytes.len(), "exported");
    println!("Wrote {} ({} bytes)", out, bytes.len());
    if let Some(summary) = validated.summary() {
        println!("{}", summary);
    }
    Ok(())
}

/// MIDI output sink when a port is configured
#[cfg(feature = "midi-port")]
fn port_sink(config: &AppConfig) -> Result<Option<Box<dyn NoteSink>>, BackendError> {
    use groovecraft::midi::{OutputSink, PortOutput};

    let Some(index) = config.midi_port else {
        return Ok(None);
    };
    let output = PortOutput::connect(index)?;
    info!(port = output.name(), "playing through MIDI output");
    let sink: Box<dyn NoteSink> = Box::new(OutputSink::new(output));
    Ok(Some(sink))
}

#[cfg(not(feature = "midi-port"))]
fn port_sink(_config: &AppConfig) -> Result<Option<Box<dyn NoteSink>>, BackendError> {
    Ok(None)
}

/// Soundfont synth sink when a soundfont is configured
#[cfg(feature = "synth")]
fn synth_sink(config: &AppConfig) -> Result<Option<Box<dyn NoteSink>>, BackendError> {
    use groovecraft::audio::{SynthConfig, SynthSink};

    let Some(soundfont) = &config.soundfont else {
        return Ok(None);
    };
    let sink: Box<dyn NoteSink> = Box::new(SynthSink::open(&SynthConfig::new(soundfont))?);
    Ok(Some(sink))
}

#[cfg(not(feature = "synth"))]
fn synth_sink(_config: &AppConfig) -> Result<Option<Box<dyn NoteSink>>, BackendError> {
    Ok(None)
}

/// Pick the note sink the config asks for, falling back to logging
fn open_sink(config: &AppConfig) -> Result<Box<dyn NoteSink>, BackendError> {
    if let Some(sink) = port_sink(config)? {
        return Ok(sink);
    }
    if let Some(sink) = synth_sink(config)? {
        return Ok(sink);
    }
    if config.midi_port.is_some() || config.soundfont.is_some() {
        warn!("configured output needs the midi-port or synth feature, logging notes instead");
    }
    Ok(Box::new(TraceSink))
}

fn play_pattern(config_path: &str, pattern_path: &str, track: Option<TrackKind>) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let validated = read_pattern(pattern_path, &config.settings.target_instruments)?;

    let sink_config = config.clone();
    let backend = TimedBackend::new(move || open_sink(&sink_config));
    let mut scheduler = PlaybackScheduler::new(backend, config.scheduler);

    let handle = scheduler.play(&validated.pattern, &config.settings, track)?;
    println!("Playing {} at {} BPM (press Ctrl+C to stop)...", handle, config.settings.tempo);

    while scheduler.state() != TransportState::Idle {
        thread::sleep(Duration::from_millis(20));
    }

    println!("Playback complete!");
    Ok(())
}

fn watch_and_export(config_path: &str, pattern_path: &str, out: &str) -> Result<()> {
    if let Err(e) = export_pattern(config_path, pattern_path, out, None) {
        warn!("initial export failed: {:#}", e);
    }

    let watcher = ConfigWatcher::new(&[config_path, pattern_path], None)?;
    println!("Watching {} and {} (press Ctrl+C to stop)...", config_path, pattern_path);

    while let Some(event) = watcher.recv() {
        match event {
            WatchEvent::Changed(path) => {
                info!(path = %path.display(), "change detected, re-exporting");
                if let Err(e) = export_pattern(config_path, pattern_path, out, None) {
                    warn!("export failed: {:#}", e);
                }
            }
            WatchEvent::Removed(path) => warn!(path = %path.display(), "watched file removed"),
            WatchEvent::Error(e) => warn!("watcher error: {}", e),
        }
    }
    Ok(())
}

fn inspect_file(path: &str) -> Result<()> {
    let bytes = fs::read(Path::new(path)).with_context(|| format!("Failed to read MIDI file: {}", path))?;
    let file = read_smf(&bytes).with_context(|| format!("Not a readable MIDI file: {}", path))?;

    println!("Format {}, {} track(s), {} ticks per quarter note", file.format, file.tracks.len(), file.division);
    for (i, track) in file.tracks.iter().enumerate() {
        let name = track.name().unwrap_or_else(|| "(unnamed)".to_string());
        let channels: std::collections::BTreeSet<u8> = track
            .events
            .iter()
            .filter_map(|e| match e.kind {
                SmfEventKind::NoteOn { channel, .. } => Some(channel + 1),
                _ => None,
            })
            .collect();
        println!(
            "  {}: {:<12} {:>4} note(s)  channels {:?}  ends at tick {}",
            i,
            name,
            track.note_count(),
            channels,
            track.end_tick().unwrap_or(0)
        );
        if let Some(tempo) = track.meta(messages::META_TEMPO) {
            let micros = tempo.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
            if micros > 0 {
                println!("     tempo {:.1} BPM", 60_000_000.0 / f64::from(micros));
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse(env::args().skip(1))?;

    let Some(command) = args.positional.first().map(String::as_str) else {
        println!("groovecraft - MIDI pattern engine");
        println!("Run with --help for usage information");
        return Ok(());
    };

    // Playback is only visible through the log when no device is configured
    let verbosity = if command == "--play" { args.verbosity.max(1) } else { args.verbosity };
    init_logging(verbosity);

    match command {
        "--validate" => {
            let requested = args.tracks.clone().unwrap_or_else(TrackKind::all);
            validate_pattern(args.require(1, "a pattern file")?, &requested)?;
        }
        "--export" => {
            export_pattern(
                args.require(1, "a config file")?,
                args.require(2, "a pattern file")?,
                args.require(3, "an output path")?,
                args.track,
            )?;
        }
        "--play" => {
            play_pattern(
                args.require(1, "a config file")?,
                args.require(2, "a pattern file")?,
                args.track,
            )?;
        }
        "--watch" => {
            watch_and_export(
                args.require(1, "a config file")?,
                args.require(2, "a pattern file")?,
                args.require(3, "an output path")?,
            )?;
        }
        "--inspect" => {
            inspect_file(args.require(1, "a MIDI file")?)?;
        }
        #[cfg(feature = "midi-port")]
        "--list-midi" => {
            groovecraft::midi::print_ports();
        }
        "--help" | "-h" => {
            print_usage();
        }
        other => {
            eprintln!("Unknown option: {}", other);
            print_usage();
            std::process::exit(1);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(words: &[&str]) -> Args {
        Args::parse(words.iter().map(|s| s.to_string())).unwrap()
    }

    #[test]
    fn test_parse_positional_and_options() {
        let args = parse(&["-v", "--export", "song.yaml", "p.json", "out.mid", "--track", "Drums"]);
        assert_eq!(args.verbosity, 1);
        assert_eq!(args.positional, vec!["--export", "song.yaml", "p.json", "out.mid"]);
        assert_eq!(args.track, Some(TrackKind::Drums));
    }

    #[test]
    fn test_parse_track_list() {
        let args = parse(&["--validate", "p.json", "--tracks", "bass,drums"]);
        assert_eq!(
            args.tracks,
            Some(TrackSet::from([TrackKind::Bassline, TrackKind::Drums]))
        );
    }

    #[test]
    fn test_parse_rejects_unknown_track() {
        assert!(Args::parse(["--track", "kazoo"].iter().map(|s| s.to_string())).is_err());
        assert!(Args::parse(["--track"].iter().map(|s| s.to_string())).is_err());
    }

    #[test]
    fn test_require_reports_missing() {
        let args = parse(&["--export", "song.yaml"]);
        assert_eq!(args.require(1, "a config file").unwrap(), "song.yaml");
        let err = args.require(2, "a pattern file").unwrap_err();
        assert_eq!(err.to_string(), "--export requires a pattern file");
    }
}
