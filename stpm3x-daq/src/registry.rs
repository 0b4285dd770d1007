// STPM3x DAQ - Multiplexed metering acquisition layer
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! The channel registry and its per-tick update pass.
//!
//! [`ChannelRegistry::setup`] turns discovered descriptors into live
//! channels: SPI channels get the device defaults written to their slot
//! and a persisted sample log opened, virtual channels get their source
//! references parsed. A descriptor that fails validation is logged and
//! skipped whole; one bad channel never takes down the rest.
//!
//! [`ChannelRegistry::update_all`] runs in two phases. Physical
//! channels are read first, in channel id order, so every virtual
//! channel then resolves against values from the same measurement
//! latch. A transport failure latches the channel in error: it is
//! excluded from later ticks until the registry is rebuilt. Virtual
//! channels report per-tick errors instead and recover on their own
//! once their inputs do.

use std::collections::BTreeMap;
use std::path::PathBuf;

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;
use log::{debug, error, warn};
use stpm3x::registers;
use stpm3x::{DeviceConfig, WriteVerify};

use crate::bus::SensorBus;
use crate::channel::{BusBinding, Channel, DerivedKind, Sample, Sensor, SensorRef, SensorSource};
use crate::datalog::SampleLog;
use crate::descriptor::{ChannelDescriptor, SensorDescriptor};
use crate::io::DigitalIo;
use crate::snapshot::{ChannelSnapshot, SensorReading};

/// Registry construction parameters.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Directory holding the per-channel sample logs.
    pub data_dir: PathBuf,
    /// Tick records retained per channel log.
    pub log_capacity: usize,
    /// Samples retained in each sensor's in-memory ring.
    pub ring_points: usize,
    /// Defaults written to every STPM3x slot during setup.
    pub device_config: DeviceConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            log_capacity: 3600,
            ring_points: 30,
            device_config: DeviceConfig::new(),
        }
    }
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    pub fn with_ring_points(mut self, points: usize) -> Self {
        self.ring_points = points;
        self
    }

    pub fn with_device_config(mut self, device_config: DeviceConfig) -> Self {
        self.device_config = device_config;
        self
    }
}

/// Live channels, keyed and iterated in id order.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: BTreeMap<String, Channel>,
}

impl ChannelRegistry {
    /// Build channels from discovered descriptors.
    ///
    /// Never fails as a whole: each invalid descriptor is logged and
    /// dropped. A channel whose device setup writes fail on transport
    /// is kept but starts latched in error.
    pub fn setup<SPI, IO, D>(
        defs: &[(String, ChannelDescriptor)],
        bus: &mut SensorBus<SPI, IO, D>,
        config: &RegistryConfig,
    ) -> Self
    where
        SPI: SpiDevice,
        IO: DigitalIo,
        D: DelayNs,
    {
        let mut channels = BTreeMap::new();
        for (id, descriptor) in defs {
            if channels.contains_key(id) {
                warn!("duplicate channel id {id}, keeping the first definition");
                continue;
            }
            let channel = match descriptor.config.bus_type.as_str() {
                "SPI" => Self::build_spi_channel(id, descriptor, bus, config),
                "VIRTUAL" => Self::build_virtual_channel(id, descriptor, config),
                other => {
                    error!("channel {id}: unsupported bus type {other:?}");
                    None
                }
            };
            if let Some(channel) = channel {
                channels.insert(id.clone(), channel);
            }
        }
        Self { channels }
    }

    fn build_spi_channel<SPI, IO, D>(
        id: &str,
        descriptor: &ChannelDescriptor,
        bus: &mut SensorBus<SPI, IO, D>,
        config: &RegistryConfig,
    ) -> Option<Channel>
    where
        SPI: SpiDevice,
        IO: DigitalIo,
        D: DelayNs,
    {
        if let Some(device_type) = descriptor.config.device_type.as_deref() {
            if device_type != "STPM3X" {
                error!("channel {id}: unsupported device type {device_type:?}");
                return None;
            }
        }
        let device = descriptor.config.device_index;

        let mut sensors = Vec::with_capacity(descriptor.sensors.len());
        for sensor in &descriptor.sensors {
            sensors.push(Self::resolve_spi_sensor(id, sensor, device, config)?);
        }

        if let Err(e) = bus.select(device) {
            error!("channel {id}: {e}");
            return None;
        }

        let log = Self::open_log(id, config)?;

        // Program the slot's measurement defaults before first use.
        let mut latched = false;
        for (name, field, value) in config.device_config.writes() {
            match bus.write_register(device, &field, value) {
                Ok(WriteVerify::Verified) => {}
                Ok(WriteVerify::Mismatch { intended, actual }) => {
                    warn!(
                        "channel {id}: {name} readback mismatch \
                         (wrote {intended:#010x}, read {actual:#010x})"
                    );
                }
                Err(e) => {
                    error!("channel {id}: device setup failed: {e}");
                    latched = true;
                    break;
                }
            }
        }
        debug!("channel {id}: device {device} configured");

        let binding = BusBinding::Spi {
            bus: descriptor.config.bus_index,
            device,
        };
        let mut channel = Channel::new(id.to_string(), binding, sensors, log);
        if latched {
            channel.set_error();
        }
        Some(channel)
    }

    fn resolve_spi_sensor(
        id: &str,
        sensor: &SensorDescriptor,
        device: u8,
        config: &RegistryConfig,
    ) -> Option<Sensor> {
        let sid = &sensor.id;
        if sensor.config.sources.is_some() {
            error!("channel {id}: sensor {sid}: sources are only valid on virtual channels");
            return None;
        }
        let name = match sensor.config.register.as_deref() {
            Some(name) => name,
            None => {
                error!("channel {id}: sensor {sid}: missing register");
                return None;
            }
        };
        let register = match registers::by_name(name) {
            Some(register) => register,
            None => {
                error!("channel {id}: sensor {sid}: unknown register {name:?}");
                return None;
            }
        };
        let scale = match sensor.config.scale {
            Some(scale) => scale,
            None => {
                error!("channel {id}: sensor {sid}: missing scale");
                return None;
            }
        };
        Some(Sensor::new(
            sensor.id.clone(),
            sensor.config.kind.clone(),
            sensor.config.units.clone(),
            sensor.config.range.clone(),
            SensorSource::Physical {
                device,
                register,
                scale,
                threshold: sensor.config.threshold,
            },
            config.ring_points,
        ))
    }

    fn build_virtual_channel(
        id: &str,
        descriptor: &ChannelDescriptor,
        config: &RegistryConfig,
    ) -> Option<Channel> {
        let mut sensors = Vec::with_capacity(descriptor.sensors.len());
        for sensor in &descriptor.sensors {
            let sid = &sensor.id;
            let kind = match DerivedKind::from_kind(&sensor.config.kind) {
                Some(kind) => kind,
                None => {
                    error!(
                        "channel {id}: sensor {sid}: unknown derived type {:?}",
                        sensor.config.kind
                    );
                    return None;
                }
            };
            let raw_sources = match sensor.config.sources.as_deref() {
                Some(sources) if !sources.is_empty() => sources,
                _ => {
                    error!("channel {id}: sensor {sid}: virtual sensors need sources");
                    return None;
                }
            };
            let mut sources = Vec::with_capacity(raw_sources.len());
            for raw in raw_sources {
                match SensorRef::parse(raw) {
                    Some(source) => sources.push(source),
                    None => {
                        error!("channel {id}: sensor {sid}: bad source reference {raw:?}");
                        return None;
                    }
                }
            }
            sensors.push(Sensor::new(
                sensor.id.clone(),
                sensor.config.kind.clone(),
                sensor.config.units.clone(),
                sensor.config.range.clone(),
                SensorSource::Derived { kind, sources },
                config.ring_points,
            ));
        }

        let log = Self::open_log(id, config)?;
        Some(Channel::new(
            id.to_string(),
            BusBinding::Virtual,
            sensors,
            log,
        ))
    }

    fn open_log(id: &str, config: &RegistryConfig) -> Option<SampleLog> {
        let path = config.data_dir.join(format!("{id}_sensors.json"));
        match SampleLog::open(path, config.log_capacity) {
            Ok(log) => Some(log),
            Err(e) => {
                error!("channel {id}: cannot open sample log: {e}");
                None
            }
        }
    }

    /// Read every channel once and return one snapshot per live channel.
    ///
    /// `tick_ms` stamps all samples of this pass, so co-acquired values
    /// share a timestamp. Latched channels are silently excluded.
    pub fn update_all<SPI, IO, D>(
        &mut self,
        bus: &mut SensorBus<SPI, IO, D>,
        tick_ms: u64,
    ) -> Vec<ChannelSnapshot>
    where
        SPI: SpiDevice,
        IO: DigitalIo,
        D: DelayNs,
    {
        let mut snapshots: BTreeMap<String, ChannelSnapshot> = BTreeMap::new();

        // Phase one: the muxed hardware, in id order.
        for (id, channel) in self.channels.iter_mut() {
            if channel.binding() == BusBinding::Virtual || channel.error() {
                continue;
            }

            let mut samples = Vec::with_capacity(channel.sensors().len());
            let mut fault = None;
            for sensor in channel.sensors() {
                let SensorSource::Physical {
                    device,
                    register,
                    scale,
                    threshold,
                } = sensor.source()
                else {
                    continue;
                };
                match bus.read_scaled(*device, register, *threshold, *scale) {
                    Ok(value) => samples.push(Sample {
                        timestamp_ms: tick_ms,
                        value,
                    }),
                    Err(e) => {
                        fault = Some(e);
                        break;
                    }
                }
            }

            match fault {
                Some(e) => {
                    error!("channel {id}: read failed, excluding channel: {e}");
                    channel.set_error();
                    snapshots.insert(id.clone(), error_snapshot(id, tick_ms));
                }
                None => {
                    snapshots.insert(id.clone(), apply_row(channel, samples, tick_ms));
                }
            }
        }

        // Phase two: virtual channels resolve against this tick's values.
        let resolved: Vec<(String, Option<Vec<Sample>>)> = self
            .channels
            .values()
            .filter(|channel| channel.binding() == BusBinding::Virtual)
            .map(|channel| {
                let row = resolve_virtual(&self.channels, channel, tick_ms);
                (channel.id().to_string(), row)
            })
            .collect();

        for (id, row) in resolved {
            let Some(channel) = self.channels.get_mut(&id) else {
                continue;
            };
            match row {
                Some(samples) => {
                    snapshots.insert(id.clone(), apply_row(channel, samples, tick_ms));
                }
                None => {
                    snapshots.insert(id.clone(), error_snapshot(&id, tick_ms));
                }
            }
        }

        snapshots.into_values().collect()
    }

    pub fn channel(&self, id: &str) -> Option<&Channel> {
        self.channels.get(id)
    }

    /// Channels in id order.
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Compute one tick's samples for a virtual channel.
///
/// `None` means at least one input was unavailable or the computation
/// was undefined; the caller reports a per-tick error without latching.
fn resolve_virtual(
    channels: &BTreeMap<String, Channel>,
    channel: &Channel,
    tick_ms: u64,
) -> Option<Vec<Sample>> {
    let id = channel.id();
    let mut samples = Vec::with_capacity(channel.sensors().len());
    for sensor in channel.sensors() {
        let SensorSource::Derived { kind, sources } = sensor.source() else {
            continue;
        };
        let sid = sensor.id();

        let mut values = Vec::with_capacity(sources.len());
        for source in sources {
            let Some(source_channel) = channels.get(&source.channel) else {
                warn!("channel {id}: sensor {sid}: unknown source channel {}", source.channel);
                return None;
            };
            if source_channel.error() {
                warn!("channel {id}: sensor {sid}: source channel {} is in error", source.channel);
                return None;
            }
            let Some(source_sensor) = source_channel.sensor(&source.sensor) else {
                warn!("channel {id}: sensor {sid}: unknown source sensor {source}");
                return None;
            };
            let Some(sample) = source_sensor.latest() else {
                warn!("channel {id}: sensor {sid}: no data yet from {source}");
                return None;
            };
            values.push(sample.value);
        }

        let Some(value) = kind.compute(&values) else {
            warn!("channel {id}: sensor {sid}: computation undefined for current inputs");
            return None;
        };
        samples.push(Sample {
            timestamp_ms: tick_ms,
            value,
        });
    }
    Some(samples)
}

/// Record a successful row into rings and log, then snapshot it.
fn apply_row(channel: &mut Channel, samples: Vec<Sample>, tick_ms: u64) -> ChannelSnapshot {
    for (sensor, sample) in channel.sensors_mut().iter_mut().zip(&samples) {
        sensor.record(*sample);
    }
    if let Err(e) = channel.log_mut().push(samples.clone()) {
        warn!("channel {}: log append failed: {e}", channel.id());
    }
    let oldest: Vec<Sample> = channel
        .log()
        .peek()
        .map(|record| record.to_vec())
        .unwrap_or_default();

    let readings = channel
        .sensors()
        .iter()
        .zip(&samples)
        .enumerate()
        .map(|(i, (sensor, sample))| SensorReading {
            id: sensor.id().to_string(),
            kind: sensor.kind().to_string(),
            units: sensor.units().to_string(),
            latest: *sample,
            oldest: oldest.get(i).copied().unwrap_or(*sample),
        })
        .collect();

    ChannelSnapshot {
        id: channel.id().to_string(),
        error: false,
        tick_ms,
        readings,
    }
}

fn error_snapshot(id: &str, tick_ms: u64) -> ChannelSnapshot {
    ChannelSnapshot {
        id: id.to_string(),
        error: true,
        tick_ms,
        readings: Vec::new(),
    }
}
