// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Hardware and virtual MIDI output ports through midir.

use anyhow::{anyhow, Result};
use midir::{MidiOutput as MidirOutput, MidiOutputConnection};

use super::MidiOutput;
use crate::audio::BackendError;

const CLIENT_NAME: &str = "groovecraft";

/// Connection to one MIDI output port
pub struct PortOutput {
    connection: MidiOutputConnection,
    name: String,
}

impl PortOutput {
    /// Connect to the port at `index` in [`list_ports`] order.
    ///
    /// # Returns
    /// * `Ok(PortOutput)` on success
    /// * `Err` if the client could not be created or the port is gone
    pub fn connect(index: usize) -> Result<Self, BackendError> {
        let output = MidirOutput::new(CLIENT_NAME)
            .map_err(|e| BackendError::MidiPort(format!("failed to create MIDI client: {}", e)))?;

        let ports = output.ports();
        let port = ports.get(index).ok_or_else(|| {
            BackendError::MidiPort(format!(
                "MIDI output {} not found (only {} available)",
                index,
                ports.len()
            ))
        })?;
        let name = output
            .port_name(port)
            .unwrap_or_else(|_| format!("Unknown {}", index));

        let connection = output
            .connect(port, "groovecraft-out")
            .map_err(|e| BackendError::MidiPort(format!("failed to connect to {}: {}", name, e)))?;

        Ok(Self { connection, name })
    }

    /// Name of the connected port
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl MidiOutput for PortOutput {
    fn send(&mut self, message: &[u8]) -> Result<()> {
        self.connection
            .send(message)
            .map_err(|e| anyhow!("Failed to send to {}: {}", self.name, e))
    }
}

/// List all available MIDI output ports
pub fn list_ports() -> Vec<(usize, String)> {
    let Ok(output) = MidirOutput::new(CLIENT_NAME) else {
        return Vec::new();
    };
    output
        .ports()
        .iter()
        .enumerate()
        .map(|(i, port)| {
            let name = output
                .port_name(port)
                .unwrap_or_else(|_| format!("Unknown {}", i));
            (i, name)
        })
        .collect()
}

/// Print all available MIDI output ports to stdout
pub fn print_ports() {
    let ports = list_ports();
    if ports.is_empty() {
        println!("No MIDI outputs found.");
    } else {
        println!("Available MIDI outputs:");
        for (i, name) in ports {
            println!("  {}: {}", i, name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_ports() {
        // May be empty on CI machines; just make sure it doesn't panic
        let ports = list_ports();
        for (i, (index, _)) in ports.iter().enumerate() {
            assert_eq!(i, *index);
        }
    }

    #[test]
    fn test_connect_out_of_range() {
        assert!(matches!(
            PortOutput::connect(usize::MAX),
            Err(BackendError::MidiPort(_))
        ));
    }
}
