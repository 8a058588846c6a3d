// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Drum name registry.
//!
//! Maps canonical drum-element names (and the many ways a generator
//! might phrase them) to General MIDI percussion note numbers. The table
//! is closed: anything not listed resolves through [`resolve`] to the
//! documented fallback note instead of failing.

/// Standard General MIDI drum notes
pub mod gm_drums {
    pub const KICK_ACOUSTIC: u8 = 35;
    pub const KICK: u8 = 36;
    pub const RIM: u8 = 37;
    pub const SNARE: u8 = 38;
    pub const CLAP: u8 = 39;
    pub const SNARE_ELECTRIC: u8 = 40;
    pub const FLOOR_TOM_LOW: u8 = 41;
    pub const CLOSED_HAT: u8 = 42;
    pub const FLOOR_TOM_HIGH: u8 = 43;
    pub const PEDAL_HAT: u8 = 44;
    pub const LOW_TOM: u8 = 45;
    pub const OPEN_HAT: u8 = 46;
    pub const MID_TOM: u8 = 47;
    pub const HIGH_MID_TOM: u8 = 48;
    pub const CRASH: u8 = 49;
    pub const HIGH_TOM: u8 = 50;
    pub const RIDE: u8 = 51;
    pub const CHINA: u8 = 52;
    pub const RIDE_BELL: u8 = 53;
    pub const TAMBOURINE: u8 = 54;
    pub const SPLASH: u8 = 55;
    pub const COWBELL: u8 = 56;
    pub const CRASH_2: u8 = 57;
    pub const RIDE_2: u8 = 59;
    pub const BONGO_HIGH: u8 = 60;
    pub const BONGO_LOW: u8 = 61;
    pub const CONGA_MUTE: u8 = 62;
    pub const CONGA_HIGH: u8 = 63;
    pub const CONGA_LOW: u8 = 64;
    pub const CABASA: u8 = 69;
    pub const MARACAS: u8 = 70;
    pub const CLAVES: u8 = 75;
    pub const WOODBLOCK: u8 = 76;
    pub const TRIANGLE: u8 = 81;
}

/// Note used for drum names the registry does not know.
pub const FALLBACK_NOTE: u8 = gm_drums::SNARE;

/// A registry hit: the canonical key and its percussion note
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrumEntry {
    /// Canonical drum key (e.g. `hihat_closed`)
    pub key: &'static str,
    /// GM percussion note number
    pub note: u8,
}

struct Row {
    key: &'static str,
    note: u8,
    aliases: &'static [&'static str],
}

// Aliases are stored already normalized.
const TABLE: &[Row] = &[
    Row { key: "kick", note: gm_drums::KICK, aliases: &["kick_drum", "bass_drum", "bass_drum_1", "bd", "kik"] },
    Row { key: "kick_acoustic", note: gm_drums::KICK_ACOUSTIC, aliases: &["acoustic_bass_drum", "acoustic_kick", "kick_2"] },
    Row { key: "rimshot", note: gm_drums::RIM, aliases: &["rim", "rim_shot", "side_stick", "sidestick", "rim_click"] },
    Row { key: "snare", note: gm_drums::SNARE, aliases: &["snare_drum", "acoustic_snare", "sd", "snr"] },
    Row { key: "clap", note: gm_drums::CLAP, aliases: &["hand_clap", "handclap", "claps", "cp"] },
    Row { key: "snare_electric", note: gm_drums::SNARE_ELECTRIC, aliases: &["electric_snare", "snare_2"] },
    Row { key: "tom_floor_low", note: gm_drums::FLOOR_TOM_LOW, aliases: &["low_floor_tom", "floor_tom_low"] },
    Row { key: "hihat_closed", note: gm_drums::CLOSED_HAT, aliases: &[
        "hi_hat_closed", "closed_hihat", "closed_hi_hat", "closed_hat", "hat_closed", "hihat", "hi_hat",
        "hh", "chh", "ch", "hat", "hats", "hihats", "hi_hats",
    ] },
    Row { key: "tom_floor_high", note: gm_drums::FLOOR_TOM_HIGH, aliases: &["high_floor_tom", "floor_tom", "floor_tom_high"] },
    Row { key: "hihat_pedal", note: gm_drums::PEDAL_HAT, aliases: &["hi_hat_pedal", "pedal_hihat", "pedal_hi_hat", "pedal_hat", "phh"] },
    Row { key: "tom_low", note: gm_drums::LOW_TOM, aliases: &["low_tom", "tom_1"] },
    Row { key: "hihat_open", note: gm_drums::OPEN_HAT, aliases: &[
        "hi_hat_open", "open_hihat", "open_hi_hat", "open_hat", "hat_open", "ohh", "oh",
    ] },
    Row { key: "tom_mid", note: gm_drums::MID_TOM, aliases: &["mid_tom", "low_mid_tom", "tom", "toms", "tom_2"] },
    Row { key: "tom_high_mid", note: gm_drums::HIGH_MID_TOM, aliases: &["high_mid_tom", "hi_mid_tom"] },
    Row { key: "crash", note: gm_drums::CRASH, aliases: &["crash_cymbal", "crash_cymbal_1", "crash_1", "cymbal"] },
    Row { key: "tom_high", note: gm_drums::HIGH_TOM, aliases: &["high_tom", "hi_tom", "tom_3"] },
    Row { key: "ride", note: gm_drums::RIDE, aliases: &["ride_cymbal", "ride_cymbal_1", "ride_1"] },
    Row { key: "china", note: gm_drums::CHINA, aliases: &["china_cymbal", "chinese_cymbal"] },
    Row { key: "ride_bell", note: gm_drums::RIDE_BELL, aliases: &["bell"] },
    Row { key: "tambourine", note: gm_drums::TAMBOURINE, aliases: &["tamb", "tambo"] },
    Row { key: "splash", note: gm_drums::SPLASH, aliases: &["splash_cymbal"] },
    Row { key: "cowbell", note: gm_drums::COWBELL, aliases: &["cow_bell"] },
    Row { key: "crash_2", note: gm_drums::CRASH_2, aliases: &["crash_cymbal_2"] },
    Row { key: "ride_2", note: gm_drums::RIDE_2, aliases: &["ride_cymbal_2"] },
    Row { key: "bongo_high", note: gm_drums::BONGO_HIGH, aliases: &["hi_bongo", "high_bongo", "bongo"] },
    Row { key: "bongo_low", note: gm_drums::BONGO_LOW, aliases: &["low_bongo"] },
    Row { key: "conga_mute", note: gm_drums::CONGA_MUTE, aliases: &["mute_conga", "mute_hi_conga", "mute_high_conga"] },
    Row { key: "conga_high", note: gm_drums::CONGA_HIGH, aliases: &["conga", "high_conga", "hi_conga", "open_hi_conga"] },
    Row { key: "conga_low", note: gm_drums::CONGA_LOW, aliases: &["low_conga"] },
    Row { key: "cabasa", note: gm_drums::CABASA, aliases: &[] },
    Row { key: "shaker", note: gm_drums::MARACAS, aliases: &["maracas", "shakers"] },
    Row { key: "claves", note: gm_drums::CLAVES, aliases: &["clave"] },
    Row { key: "woodblock", note: gm_drums::WOODBLOCK, aliases: &["wood_block", "hi_wood_block", "high_woodblock"] },
    Row { key: "triangle", note: gm_drums::TRIANGLE, aliases: &["open_triangle"] },
];

/// Normalize a drum name into key form.
///
/// Lowercases, trims, and collapses every run of whitespace, `-` or `_`
/// into a single underscore. Applying it twice is the same as once.
pub fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;

    for ch in name.trim().chars() {
        if ch.is_whitespace() || ch == '-' || ch == '_' {
            pending_sep = true;
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push('_');
        }
        pending_sep = false;
        out.extend(ch.to_lowercase());
    }

    out
}

/// Look up an already-normalized name (canonical key or alias)
pub fn lookup(name: &str) -> Option<DrumEntry> {
    TABLE
        .iter()
        .find(|row| row.key == name || row.aliases.contains(&name))
        .map(|row| DrumEntry {
            key: row.key,
            note: row.note,
        })
}

/// Outcome of resolving a raw drum name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrumResolution {
    /// Canonical key when known, otherwise the normalized raw name
    pub key: String,
    /// Percussion note (fallback note when unknown)
    pub note: u8,
    /// Whether the registry recognized the name
    pub known: bool,
}

/// Normalize and look up a raw drum name, falling back to [`FALLBACK_NOTE`]
pub fn resolve(raw: &str) -> DrumResolution {
    let normalized = normalize(raw);
    match lookup(&normalized) {
        Some(entry) => DrumResolution {
            key: entry.key.to_string(),
            note: entry.note,
            known: true,
        },
        None => DrumResolution {
            key: normalized,
            note: FALLBACK_NOTE,
            known: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize("Kick"), "kick");
        assert_eq!(normalize("  Hi-Hat   Closed "), "hi_hat_closed");
        assert_eq!(normalize("crash__cymbal - 1"), "crash_cymbal_1");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" -_ "), "");
    }

    #[test]
    fn test_normalize_idempotent() {
        let samples = [
            "Hi-Hat Closed",
            "  OPEN hat ",
            "__ride__",
            "Crash\tCymbal\n1",
            "Tom-Tom - High",
            "ÉTRANGE Drum",
            "kick",
            "",
        ];
        for raw in samples {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_lookup_canonical_and_alias() {
        assert_eq!(lookup("kick").unwrap().note, 36);
        assert_eq!(lookup("crash").unwrap().note, 49);
        assert_eq!(lookup("crash_cymbal_1").unwrap().note, 49);
        assert_eq!(lookup("crash_cymbal_1").unwrap().key, "crash");
        assert!(lookup("theremin").is_none());
    }

    #[test]
    fn test_resolve_hihat_phrasing() {
        let resolved = resolve("Hi-Hat Closed");
        assert_eq!(resolved.key, "hihat_closed");
        assert_eq!(resolved.note, 42);
        assert!(resolved.known);
    }

    #[test]
    fn test_resolve_unknown_uses_fallback() {
        let resolved = resolve("Laser Zap");
        assert_eq!(resolved.key, "laser_zap");
        assert_eq!(resolved.note, FALLBACK_NOTE);
        assert!(!resolved.known);
    }

    #[test]
    fn test_aliases_are_normalized() {
        for row in TABLE {
            assert_eq!(normalize(row.key), row.key);
            for alias in row.aliases {
                assert_eq!(normalize(alias), *alias);
            }
        }
    }

    #[test]
    fn test_aliases_unique() {
        let mut seen = std::collections::HashSet::new();
        for row in TABLE {
            assert!(seen.insert(row.key), "duplicate {}", row.key);
            for alias in row.aliases {
                assert!(seen.insert(*alias), "duplicate {}", alias);
            }
        }
    }
}
