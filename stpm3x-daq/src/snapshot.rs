// STPM3x DAQ - Multiplexed metering acquisition layer
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Per-tick channel snapshots and the sink they are published to.

use std::fmt;

use serde::Serialize;

use crate::channel::Sample;

/// One sensor's contribution to a channel snapshot.
///
/// `latest` is the sample this tick produced; `oldest` is the oldest
/// record still retained in the channel's log, so a consumer can see
/// the span the history covers without reading the log itself.
#[derive(Debug, Clone, Serialize)]
pub struct SensorReading {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub units: String,
    pub latest: Sample,
    pub oldest: Sample,
}

/// State of one channel after a tick.
///
/// A snapshot with `error` set carries no readings. Channels whose
/// error latched on an earlier tick stop producing snapshots entirely
/// until the registry is rebuilt.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSnapshot {
    pub id: String,
    pub error: bool,
    pub tick_ms: u64,
    pub readings: Vec<SensorReading>,
}

/// Destination for channel snapshots.
///
/// Publish failures are reported per snapshot and never stop the
/// acquisition loop.
pub trait SnapshotSink {
    type Error: fmt::Display;

    fn publish(&mut self, snapshot: &ChannelSnapshot) -> Result<(), Self::Error>;
}
