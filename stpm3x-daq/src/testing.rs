// STPM3x DAQ - Multiplexed metering acquisition layer
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Test doubles for the acquisition stack.
//!
//! [`FakeIo`] journals every line transition so tests can assert exact
//! sequencing, [`FakeDelay`] records requested pauses instead of
//! sleeping, and [`MemorySink`] collects published snapshots. The IO
//! and delay fakes share state through `Rc` clones, so a test keeps
//! one handle while the acquisition stack owns the other.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;

use crate::io::{DigitalIo, Level, Line};
use crate::snapshot::{ChannelSnapshot, SnapshotSink};

#[derive(Debug, Default)]
struct IoState {
    levels: HashMap<Line, Level>,
    journal: Vec<(Line, Level)>,
}

/// In-memory GPIO bank.
#[derive(Debug, Clone, Default)]
pub struct FakeIo {
    state: Rc<RefCell<IoState>>,
}

impl FakeIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current level of a line, `Low` if never driven.
    pub fn level(&self, line: Line) -> Level {
        self.state
            .borrow()
            .levels
            .get(&line)
            .copied()
            .unwrap_or(Level::Low)
    }

    /// Every `set_line` call, in order.
    pub fn journal(&self) -> Vec<(Line, Level)> {
        self.state.borrow().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.state.borrow_mut().journal.clear();
    }
}

impl DigitalIo for FakeIo {
    fn set_line(&mut self, line: Line, level: Level) {
        let mut state = self.state.borrow_mut();
        state.levels.insert(line, level);
        state.journal.push((line, level));
    }

    fn line(&self, line: Line) -> Level {
        self.level(line)
    }
}

/// Delay recorder. No sleeping happens.
#[derive(Debug, Clone, Default)]
pub struct FakeDelay {
    recorded: Rc<RefCell<Vec<u32>>>,
}

impl FakeDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requested pauses in milliseconds, in call order.
    pub fn recorded_ms(&self) -> Vec<u32> {
        self.recorded.borrow().clone()
    }

    pub fn clear(&self) {
        self.recorded.borrow_mut().clear();
    }
}

impl DelayNs for FakeDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.recorded.borrow_mut().push(ns / 1_000_000);
    }

    fn delay_us(&mut self, us: u32) {
        self.recorded.borrow_mut().push(us / 1_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.recorded.borrow_mut().push(ms);
    }
}

/// Publish failure produced by [`MemorySink`].
#[derive(Debug)]
pub struct SinkError;

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("sink unavailable")
    }
}

/// Snapshot sink that collects everything published to it.
#[derive(Debug, Default)]
pub struct MemorySink {
    published: Vec<ChannelSnapshot>,
    fail_next: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> &[ChannelSnapshot] {
        &self.published
    }

    /// Fail the next publish only.
    pub fn set_fail_next(&mut self) {
        self.fail_next = true;
    }

    pub fn clear(&mut self) {
        self.published.clear();
    }
}

impl SnapshotSink for MemorySink {
    type Error = SinkError;

    fn publish(&mut self, snapshot: &ChannelSnapshot) -> Result<(), SinkError> {
        if self.fail_next {
            self.fail_next = false;
            return Err(SinkError);
        }
        self.published.push(snapshot.clone());
        Ok(())
    }
}
