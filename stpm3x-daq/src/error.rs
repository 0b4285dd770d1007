// STPM3x DAQ - Multiplexed metering acquisition layer
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for the acquisition layer.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for acquisition operations
pub type Result<T> = std::result::Result<T, DaqError>;

/// Main error type for the acquisition layer
#[derive(Error, Debug)]
pub enum DaqError {
    /// The multiplexer has no such sensor slot
    #[error("No sensor slot {0} on this board (valid slots are 1-4)")]
    BadDeviceIndex(u8),

    /// The SPI transport failed mid-transaction
    #[error("Transport fault: {0}")]
    Transport(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted data log has an unreadable record before its tail
    #[error("Corrupt data log {} at line {line}: {source}", path.display())]
    CorruptLog {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DaqError::BadDeviceIndex(7);
        let msg = format!("{}", err);
        assert!(msg.contains("slot 7"));

        let err = DaqError::Transport("SPI transfer failed".into());
        assert!(format!("{}", err).contains("Transport fault"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: DaqError = io_err.into();
        assert!(matches!(err, DaqError::Io(_)));
    }
}
