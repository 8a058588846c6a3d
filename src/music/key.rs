// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Key signatures for MIDI export.
//!
//! Parses free-text key labels ("F# minor", "Bbm", "E") into the
//! sharps/flats count and mode used by the SMF key-signature meta event.

/// Key signature as stored in an SMF `FF 59` meta event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySignature {
    /// Negative = flats, positive = sharps (-7..=7)
    pub sharps_flats: i8,
    /// Minor mode
    pub minor: bool,
}

impl KeySignature {
    /// Parse a key label.
    ///
    /// Accepts a tonic letter with an optional accidental (`#`, `b`, `♯`,
    /// `♭`) followed by an optional mode (`major`, `maj`, `minor`, `min`,
    /// `m`). Returns `None` for anything else, including modal names.
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        let mut chars = label.chars().peekable();

        let letter = chars.next()?.to_ascii_uppercase();
        // Position of the natural tonic on the circle of fifths
        let mut fifths: i8 = match letter {
            'F' => -1,
            'C' => 0,
            'G' => 1,
            'D' => 2,
            'A' => 3,
            'E' => 4,
            'B' => 5,
            _ => return None,
        };

        match chars.peek() {
            Some('#') | Some('♯') => {
                fifths += 7;
                chars.next();
            }
            Some('b') | Some('♭') => {
                fifths -= 7;
                chars.next();
            }
            _ => {}
        }

        let mode: String = chars.collect::<String>().trim().to_lowercase();
        let minor = match mode.as_str() {
            "" | "maj" | "major" | "ionian" => false,
            "m" | "min" | "minor" | "aeolian" => true,
            _ => return None,
        };

        if minor {
            fifths -= 3;
        }

        // Respell theoretical keys (e.g. G# major) with their enharmonic
        if fifths > 7 {
            fifths -= 12;
        } else if fifths < -7 {
            fifths += 12;
        }

        Some(Self {
            sharps_flats: fifths,
            minor,
        })
    }
}
