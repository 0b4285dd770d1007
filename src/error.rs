//! Error types for the STPM3x driver.

use core::fmt;

/// Errors returned by register-level operations.
///
/// The only failure a driver call can surface is a bus transport fault;
/// a write that lands but reads back wrong is reported through
/// [`WriteVerify`](crate::driver::WriteVerify) instead, so callers can
/// treat it as a status rather than an abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    /// The underlying SPI transfer failed.
    Spi(E),
}

impl<E> From<E> for Error<E> {
    fn from(err: E) -> Self {
        Error::Spi(err)
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Spi(e) => write!(f, "SPI transfer failed: {:?}", e),
        }
    }
}

#[cfg(feature = "std")]
impl<E: fmt::Debug> std::error::Error for Error<E> {}
