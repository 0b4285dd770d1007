// STPM3x DAQ - Multiplexed metering acquisition layer
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Channel descriptor files.
//!
//! A deployment describes its wiring as `chN_config.json` files in a
//! configuration directory. Each file carries a `_config` block naming
//! the bus ("SPI" for a muxed metering slot, "VIRTUAL" for sensors
//! derived from other channels) and a sensor list, each sensor with its
//! own `_config` block. Unknown keys are tolerated so site files can
//! carry annotations the acquisition layer does not consume.

use std::fs;
use std::path::Path;

use log::error;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One `chN_config.json` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    #[serde(rename = "_config")]
    pub config: BusConfig,
    pub sensors: Vec<SensorDescriptor>,
}

/// The `_config` block of a channel file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    /// "SPI" or "VIRTUAL".
    pub bus_type: String,
    #[serde(default)]
    pub bus_index: u8,
    /// Device family on the slot; only "STPM3X" is supported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    /// Mux slot, 1 to 4.
    #[serde(default)]
    pub device_index: u8,
}

/// One sensor entry of a channel file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDescriptor {
    pub id: String,
    #[serde(rename = "_config")]
    pub config: SensorConfig,
}

/// The `_config` block of a sensor entry.
///
/// `register`, `scale` and `threshold` apply to SPI sensors; `sources`
/// applies to virtual sensors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Measurement type ("VAC", "CAC", "PIB", ...).
    #[serde(rename = "type")]
    pub kind: String,
    pub units: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub range: Vec<f64>,
    /// Register mnemonic, resolved through the driver's register map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register: Option<String>,
    /// Calibration scale factor set during device calibration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    /// Noise gate in bits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u8>,
    /// `"chId.sensorId"` references into other channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

/// Find and parse channel descriptors in `dir`.
///
/// Only files named `ch*_config.json` participate, sorted by filename.
/// The channel id is the filename prefix before the first underscore,
/// so `ch0_config.json` defines channel "ch0". Files that cannot be
/// read or parsed are logged and skipped; they never abort discovery.
pub fn discover(dir: &Path) -> Result<Vec<(String, ChannelDescriptor)>> {
    let mut names: Vec<String> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("ch") && name.ends_with("_config.json") {
            names.push(name);
        }
    }
    names.sort();

    let mut channels = Vec::with_capacity(names.len());
    for name in names {
        let path = dir.join(&name);
        let id = name.split('_').next().unwrap_or_default().to_string();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                error!("error loading {}: {}", path.display(), e);
                continue;
            }
        };
        match serde_json::from_str::<ChannelDescriptor>(&text) {
            Ok(descriptor) => channels.push((id, descriptor)),
            Err(e) => error!("error loading {}: {}", path.display(), e),
        }
    }
    Ok(channels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SPI_CHANNEL: &str = r#"{
        "_config": {
            "bus_type": "SPI",
            "bus_index": 0,
            "device_type": "STPM3X",
            "device_index": 1,
            "rra": "site annotation"
        },
        "sensors": [
            {
                "id": "s0",
                "_config": {
                    "type": "VAC",
                    "units": "Vrms",
                    "range": [0, 350],
                    "register": "V1RMS",
                    "scale": 0.035430
                }
            },
            {
                "id": "s1",
                "_config": {
                    "type": "CAC",
                    "units": "Arms",
                    "register": "C1RMS",
                    "scale": 0.003333,
                    "threshold": 7
                }
            }
        ]
    }"#;

    const VIRTUAL_CHANNEL: &str = r#"{
        "_config": { "bus_type": "VIRTUAL" },
        "sensors": [
            {
                "id": "s0",
                "_config": {
                    "type": "PIB",
                    "units": "%",
                    "range": [0, 100],
                    "sources": ["ch0.s0", "ch1.s0"]
                }
            }
        ]
    }"#;

    #[test]
    fn test_parse_spi_channel() {
        let descriptor: ChannelDescriptor = serde_json::from_str(SPI_CHANNEL).unwrap();
        assert_eq!(descriptor.config.bus_type, "SPI");
        assert_eq!(descriptor.config.device_type.as_deref(), Some("STPM3X"));
        assert_eq!(descriptor.config.device_index, 1);
        assert_eq!(descriptor.sensors.len(), 2);

        let s0 = &descriptor.sensors[0];
        assert_eq!(s0.id, "s0");
        assert_eq!(s0.config.kind, "VAC");
        assert_eq!(s0.config.register.as_deref(), Some("V1RMS"));
        assert_eq!(s0.config.threshold, None);

        let s1 = &descriptor.sensors[1];
        assert_eq!(s1.config.threshold, Some(7));
        assert_eq!(s1.config.sources, None);
    }

    #[test]
    fn test_parse_virtual_channel() {
        let descriptor: ChannelDescriptor = serde_json::from_str(VIRTUAL_CHANNEL).unwrap();
        assert_eq!(descriptor.config.bus_type, "VIRTUAL");
        assert_eq!(descriptor.config.device_index, 0);
        let sources = descriptor.sensors[0].config.sources.as_ref().unwrap();
        assert_eq!(sources, &["ch0.s0", "ch1.s0"]);
    }

    #[test]
    fn test_serialization_round_trips() {
        let descriptor: ChannelDescriptor = serde_json::from_str(SPI_CHANNEL).unwrap();
        let text = serde_json::to_string(&descriptor).unwrap();
        let again: ChannelDescriptor = serde_json::from_str(&text).unwrap();
        assert_eq!(descriptor, again);
    }

    #[test]
    fn test_discover_sorts_by_filename() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ch2_config.json"), VIRTUAL_CHANNEL).unwrap();
        fs::write(dir.path().join("ch0_config.json"), SPI_CHANNEL).unwrap();
        fs::write(dir.path().join("ch1_config.json"), SPI_CHANNEL).unwrap();

        let channels = discover(dir.path()).unwrap();
        let ids: Vec<&str> = channels.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["ch0", "ch1", "ch2"]);
    }

    #[test]
    fn test_discover_skips_unparsable_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ch0_config.json"), SPI_CHANNEL).unwrap();
        fs::write(dir.path().join("ch1_config.json"), "{ not json").unwrap();

        let channels = discover(dir.path()).unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].0, "ch0");
    }

    #[test]
    fn test_discover_ignores_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ch0_config.json"), VIRTUAL_CHANNEL).unwrap();
        fs::write(dir.path().join("channels.json"), "{}").unwrap();
        fs::write(dir.path().join("ch0_config.json.bak"), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "wiring").unwrap();

        let channels = discover(dir.path()).unwrap();
        assert_eq!(channels.len(), 1);
    }

    #[test]
    fn test_discover_missing_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(discover(&missing).is_err());
    }
}
