// STPM3x DAQ - Multiplexed metering acquisition layer
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Channels, sensors and their in-memory sample rings.
//!
//! A [`Channel`] groups the sensors that share one bus binding: either
//! a muxed STPM3x slot or a virtual computation over other channels.
//! Every sensor keeps a short ring of recent samples, newest first, and
//! each channel persists one record per tick to its [`SampleLog`].

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use stpm3x::registers::RegisterField;

use crate::datalog::SampleLog;

/// One timestamped measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Milliseconds since the Unix epoch. Every sensor read on the same
    /// tick shares the timestamp of that tick's sync strobe.
    pub timestamp_ms: u64,
    pub value: f64,
}

/// Reference to a sensor on another channel, spelled `"chId.sensorId"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorRef {
    pub channel: String,
    pub sensor: String,
}

impl SensorRef {
    pub fn parse(text: &str) -> Option<Self> {
        let (channel, sensor) = text.split_once('.')?;
        if channel.is_empty() || sensor.is_empty() {
            return None;
        }
        Some(Self {
            channel: channel.to_string(),
            sensor: sensor.to_string(),
        })
    }
}

impl fmt::Display for SensorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.channel, self.sensor)
    }
}

/// Computation backing a virtual sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedKind {
    /// Phase imbalance across source voltages, in percent.
    PhaseImbalance,
}

impl DerivedKind {
    /// Map a descriptor type string to a computation.
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "PIB" => Some(DerivedKind::PhaseImbalance),
            _ => None,
        }
    }

    /// Combine same-tick source values.
    ///
    /// `None` marks the tick as uncomputable; the channel reports an
    /// error for that tick only.
    pub fn compute(&self, values: &[f64]) -> Option<f64> {
        match self {
            DerivedKind::PhaseImbalance => phase_imbalance(values),
        }
    }
}

/// Largest deviation of any phase from the phase sum, over the average,
/// as a percentage.
fn phase_imbalance(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().sum();
    let avg = sum / values.len() as f64;
    if avg == 0.0 {
        return None;
    }
    let max_dev = values
        .iter()
        .map(|v| (sum - v).abs())
        .fold(0.0_f64, f64::max);
    Some(100.0 * (max_dev / avg))
}

/// Where a sensor's values come from.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorSource {
    /// A register field on a muxed device.
    Physical {
        device: u8,
        register: RegisterField,
        scale: f64,
        threshold: Option<u8>,
    },
    /// A computation over other channels' sensors.
    Derived {
        kind: DerivedKind,
        sources: Vec<SensorRef>,
    },
}

/// A sensor and its ring of recent samples, newest first.
#[derive(Debug)]
pub struct Sensor {
    id: String,
    kind: String,
    units: String,
    range: Vec<f64>,
    source: SensorSource,
    ring: VecDeque<Sample>,
    capacity: usize,
}

impl Sensor {
    pub fn new(
        id: String,
        kind: String,
        units: String,
        range: Vec<f64>,
        source: SensorSource,
        capacity: usize,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            id,
            kind,
            units,
            range,
            source,
            ring: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    pub fn range(&self) -> &[f64] {
        &self.range
    }

    pub fn source(&self) -> &SensorSource {
        &self.source
    }

    /// Record a sample, evicting the oldest when the ring is full.
    pub fn record(&mut self, sample: Sample) {
        if self.ring.len() == self.capacity {
            self.ring.pop_back();
        }
        self.ring.push_front(sample);
    }

    /// Most recent sample, if anything has been recorded.
    pub fn latest(&self) -> Option<Sample> {
        self.ring.front().copied()
    }

    /// Recent samples, newest first.
    pub fn history(&self) -> impl Iterator<Item = &Sample> {
        self.ring.iter()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

/// How a channel is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusBinding {
    /// A muxed STPM3x slot on an SPI bus.
    Spi { bus: u8, device: u8 },
    /// Derived from other channels.
    Virtual,
}

/// A named group of sensors sharing one bus binding and one data log.
#[derive(Debug)]
pub struct Channel {
    id: String,
    binding: BusBinding,
    error: bool,
    sensors: Vec<Sensor>,
    log: SampleLog,
}

impl Channel {
    pub(crate) fn new(
        id: String,
        binding: BusBinding,
        sensors: Vec<Sensor>,
        log: SampleLog,
    ) -> Self {
        Self {
            id,
            binding,
            error: false,
            sensors,
            log,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn binding(&self) -> BusBinding {
        self.binding
    }

    /// Latched error flag.
    ///
    /// A transport fault latches it and suppresses further reads; it
    /// clears only when the registry is rebuilt.
    pub fn error(&self) -> bool {
        self.error
    }

    pub(crate) fn set_error(&mut self) {
        self.error = true;
    }

    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    pub(crate) fn sensors_mut(&mut self) -> &mut [Sensor] {
        &mut self.sensors
    }

    pub fn sensor(&self, id: &str) -> Option<&Sensor> {
        self.sensors.iter().find(|s| s.id() == id)
    }

    pub fn log(&self) -> &SampleLog {
        &self.log
    }

    pub(crate) fn log_mut(&mut self) -> &mut SampleLog {
        &mut self.log
    }
}
