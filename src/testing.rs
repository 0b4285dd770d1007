//! Test doubles for exercising the driver without hardware.
//!
//! [`FakeSpi`] records every frame the driver clocks out and replays
//! queued reply frames for readbacks. Handles are cheaply cloneable and
//! share state, so a test keeps one handle while the driver owns another.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::spi::{self, ErrorType, Operation, SpiDevice};

/// A bus operation recorded by [`FakeSpi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    /// Bytes clocked out in a write frame.
    Write(Vec<u8>),
    /// Length of a readback frame.
    Read(usize),
}

/// Error injected by [`FakeSpi::set_fail_next`] and [`FakeSpi::set_failing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeSpiError;

impl spi::Error for FakeSpiError {
    fn kind(&self) -> spi::ErrorKind {
        spi::ErrorKind::Other
    }
}

#[derive(Default)]
struct FakeSpiState {
    ops: Vec<BusOp>,
    replies: VecDeque<Vec<u8>>,
    fail_next: bool,
    fail_all: bool,
}

/// In-memory [`SpiDevice`] recording traffic and replaying queued frames.
///
/// A readback with no queued reply yields zero bytes.
#[derive(Clone, Default)]
pub struct FakeSpi {
    state: Rc<RefCell<FakeSpiState>>,
}

impl FakeSpi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw register image as the next readback frame.
    pub fn queue_raw(&self, value: u32) {
        let b = value.to_le_bytes();
        self.queue_reply(vec![b[0], b[1], b[2], b[3], 0x00]);
    }

    /// Queue an arbitrary reply frame.
    pub fn queue_reply(&self, bytes: Vec<u8>) {
        self.state.borrow_mut().replies.push_back(bytes);
    }

    /// All bus operations seen so far, in order.
    pub fn ops(&self) -> Vec<BusOp> {
        self.state.borrow().ops.clone()
    }

    /// Write frames seen so far, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state
            .borrow()
            .ops
            .iter()
            .filter_map(|op| match op {
                BusOp::Write(bytes) => Some(bytes.clone()),
                BusOp::Read(_) => None,
            })
            .collect()
    }

    /// Fail the next transaction, then recover.
    pub fn set_fail_next(&self) {
        self.state.borrow_mut().fail_next = true;
    }

    /// Fail every transaction until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.state.borrow_mut().fail_all = failing;
    }

    pub fn remaining_replies(&self) -> usize {
        self.state.borrow().replies.len()
    }

    /// Drop recorded operations and queued replies.
    pub fn clear(&self) {
        let mut state = self.state.borrow_mut();
        state.ops.clear();
        state.replies.clear();
    }

    fn fill_read(state: &mut FakeSpiState, words: &mut [u8]) {
        let reply = state.replies.pop_front().unwrap_or_default();
        for (slot, byte) in words
            .iter_mut()
            .zip(reply.into_iter().chain(std::iter::repeat(0)))
        {
            *slot = byte;
        }
        state.ops.push(BusOp::Read(words.len()));
    }
}

impl ErrorType for FakeSpi {
    type Error = FakeSpiError;
}

impl SpiDevice for FakeSpi {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        if state.fail_all || state.fail_next {
            state.fail_next = false;
            return Err(FakeSpiError);
        }
        for op in operations {
            match op {
                Operation::Write(words) => state.ops.push(BusOp::Write(words.to_vec())),
                Operation::Read(words) => Self::fill_read(&mut state, words),
                Operation::Transfer(read, write) => {
                    state.ops.push(BusOp::Write(write.to_vec()));
                    Self::fill_read(&mut state, read);
                }
                Operation::TransferInPlace(words) => {
                    let out = words.to_vec();
                    state.ops.push(BusOp::Write(out));
                    Self::fill_read(&mut state, words);
                }
                Operation::DelayNs(_) => {}
            }
        }
        Ok(())
    }
}
