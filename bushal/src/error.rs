//! Error taxonomy shared by every bus type.
//!
//! All operations return [`Result`]. The variants collapse onto a small set of
//! [`ErrorKind`]s so callers can branch on the outcome without caring which
//! backend produced it.

use std::io;

/// Common error type for bus operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller-detectable problem, reported before any hardware access.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Underlying system call failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Wire operation completed with fewer bytes than requested.
    #[error("Short transfer: expected {expected} bytes, got {actual}")]
    ShortTransfer { expected: usize, actual: usize },

    /// Nothing answered at the given 7-bit address.
    #[error("No device at address 0x{0:02x}")]
    NoDevice(u8),

    /// The bus resource itself could not be opened or configured.
    #[error("Bus {bus} unavailable: {source}")]
    BusUnavailable {
        bus: String,
        #[source]
        source: io::Error,
    },

    /// Line request or port setting rejected by the backend.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse outcome classification, stable across backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    Io,
    NoDevice,
    BusUnavailable,
    Config,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Io(_) | Error::ShortTransfer { .. } => ErrorKind::Io,
            Error::NoDevice(_) => ErrorKind::NoDevice,
            Error::BusUnavailable { .. } => ErrorKind::BusUnavailable,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub(crate) fn unavailable(bus: impl Into<String>, source: io::Error) -> Self {
        Error::BusUnavailable {
            bus: bus.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
