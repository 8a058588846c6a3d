// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! FluidLite synthesis through cpal.
//!
//! The cpal stream is owned by its own thread (streams are not `Send` on
//! every platform); the sink only shares the synth with the audio callback.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use fluidlite::{IsSettings, Settings, Synth};
use tracing::{debug, error, info};

use super::{BackendError, NoteSink};
use crate::midi::messages;

/// Synth and output parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SynthConfig {
    pub soundfont: PathBuf,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Buffer size in frames
    pub buffer_size: u32,
    /// Master gain (0.0 - 1.0)
    pub gain: f32,
}

impl SynthConfig {
    pub fn new(soundfont: impl Into<PathBuf>) -> Self {
        Self {
            soundfont: soundfont.into(),
            sample_rate: 44100,
            buffer_size: 512,
            gain: 0.5,
        }
    }
}

/// [`NoteSink`] that plays through a General MIDI soundfont
pub struct SynthSink {
    synth: Arc<Mutex<Synth>>,
    stop_tx: Option<mpsc::Sender<()>>,
    stream_thread: Option<JoinHandle<()>>,
}

impl SynthSink {
    /// Load the soundfont and start the output stream
    pub fn open(config: &SynthConfig) -> Result<Self, BackendError> {
        let synth = Arc::new(Mutex::new(load_synth(config)?));

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), BackendError>>();

        let render_synth = Arc::clone(&synth);
        let stream_config = config.clone();
        let stream_thread = std::thread::Builder::new()
            .name("synth-output".to_string())
            .spawn(move || {
                let stream = match build_stream(&stream_config, render_synth) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Keep the stream alive until the sink is dropped
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| BackendError::StreamFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(BackendError::StreamFailed(
                    "output thread exited before starting".to_string(),
                ))
            }
        }

        info!(
            soundfont = %config.soundfont.display(),
            sample_rate = config.sample_rate,
            "synth output started"
        );
        Ok(Self {
            synth,
            stop_tx: Some(stop_tx),
            stream_thread: Some(stream_thread),
        })
    }
}

impl NoteSink for SynthSink {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        if let Ok(synth) = self.synth.lock() {
            let _ = synth.note_on(u32::from(channel), u32::from(note), u32::from(velocity));
        }
    }

    fn note_off(&mut self, channel: u8, note: u8) {
        if let Ok(synth) = self.synth.lock() {
            let _ = synth.note_off(u32::from(channel), u32::from(note));
        }
    }
}

impl Drop for SynthSink {
    fn drop(&mut self) {
        if let Ok(synth) = self.synth.lock() {
            for channel in 0..16 {
                let _ = synth.cc(channel, u32::from(messages::ALL_NOTES_OFF), 0);
            }
        }
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.stream_thread.take() {
            let _ = thread.join();
        }
        debug!("synth output stopped");
    }
}

fn load_synth(config: &SynthConfig) -> Result<Synth, BackendError> {
    if !Path::new(&config.soundfont).exists() {
        return Err(BackendError::SoundfontLoadFailed(format!(
            "soundfont file not found: {}",
            config.soundfont.display()
        )));
    }

    let settings = Settings::new()
        .map_err(|e| BackendError::InitFailed(format!("FluidLite settings: {:?}", e)))?;
    if let Some(setting) = settings.num("synth.sample-rate") {
        setting.set(f64::from(config.sample_rate));
    }
    if let Some(setting) = settings.num("synth.gain") {
        setting.set(f64::from(config.gain.clamp(0.0, 1.0)));
    }
    if let Some(setting) = settings.int("synth.polyphony") {
        setting.set(256);
    }
    if let Some(setting) = settings.int("synth.midi-channels") {
        setting.set(16);
    }

    let synth = Synth::new(settings)
        .map_err(|e| BackendError::InitFailed(format!("FluidLite synth: {:?}", e)))?;
    // Disable reverb and chorus for lower latency
    synth.set_reverb_on(false);
    synth.set_chorus_on(false);

    synth.sfload(&config.soundfont, true).map_err(|_| {
        BackendError::SoundfontLoadFailed(config.soundfont.display().to_string())
    })?;
    Ok(synth)
}

fn build_stream(config: &SynthConfig, synth: Arc<Mutex<Synth>>) -> Result<cpal::Stream, BackendError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(BackendError::NoDevice)?;

    let stream_config = StreamConfig {
        channels: 2,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Fixed(config.buffer_size),
    };

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                data.fill(0.0);
                if let Ok(synth) = synth.lock() {
                    let _ = synth.write(&mut *data);
                }
            },
            move |err| {
                error!(error = %err, "audio stream error");
            },
            None, // No timeout
        )
        .map_err(|e| BackendError::StreamFailed(format!("failed to build stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| BackendError::StreamFailed(format!("failed to start stream: {}", e)))?;
    Ok(stream)
}
