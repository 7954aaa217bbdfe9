//! UART port handle.
//!
//! [`Uart`] validates the line settings, opens a [`UartBackend`] and provides
//! whole-buffer writes and timed reads on top of it. [`SerialPortUart`] talks
//! to a real tty; [`LoopbackUart`] echoes writes back for tests.

pub mod loopback;
pub mod serial;

pub use loopback::{LoopbackUart, UartPeer};
pub use serial::SerialPortUart;

use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::tracing::prelude::*;

/// Used when the configured baud rate is 0.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Rates the termios backend can program.
pub const SUPPORTED_BAUDS: &[u32] = &[
    50, 75, 110, 134, 150, 200, 300, 600, 1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600,
    115_200, 230_400, 460_800, 921_600,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

/// Which queue [`Uart::flush`] discards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTarget {
    Input,
    Output,
    Both,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UartConfig {
    /// tty path, e.g. `/dev/ttyUSB0`.
    pub device: String,
    /// 0 selects [`DEFAULT_BAUD`].
    pub baud: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    /// RTS/CTS.
    pub hw_flow: bool,
}

impl UartConfig {
    /// 115200 8N1, no flow control.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            baud: DEFAULT_BAUD,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            hw_flow: false,
        }
    }

    pub fn with_baud(mut self, baud: u32) -> Self {
        self.baud = baud;
        self
    }

    /// Baud rate after applying the default.
    pub fn effective_baud(&self) -> u32 {
        if self.baud == 0 {
            DEFAULT_BAUD
        } else {
            self.baud
        }
    }

    fn validate(&self) -> Result<()> {
        if self.device.is_empty() {
            return Err(Error::invalid("empty UART device name"));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(Error::invalid(format!("{} data bits", self.data_bits)));
        }
        if !matches!(self.stop_bits, 1 | 2) {
            return Err(Error::invalid(format!("{} stop bits", self.stop_bits)));
        }
        let baud = self.effective_baud();
        if !SUPPORTED_BAUDS.contains(&baud) {
            return Err(Error::Config(format!("unsupported baud rate {}", baud)));
        }
        Ok(())
    }
}

/// Primitive port operations.
pub trait UartBackend: Send {
    /// Open and program the port. `config` has been validated.
    fn open(config: &UartConfig) -> Result<Self>
    where
        Self: Sized;

    /// Write some of `data`, like [`io::Write::write`].
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Wait up to `timeout` (forever if `None`) for input, then read what is
    /// available. Returns 0 on timeout.
    fn read(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<usize>;

    fn flush(&mut self, target: FlushTarget) -> Result<()>;
}

/// An open UART.
pub struct Uart<B: UartBackend> {
    device: String,
    baud: u32,
    backend: Mutex<B>,
}

impl<B: UartBackend> Uart<B> {
    pub fn open(config: &UartConfig) -> Result<Self> {
        config.validate()?;
        let backend = B::open(config)?;
        info!(
            device = %config.device,
            baud = config.effective_baud(),
            data_bits = config.data_bits,
            stop_bits = config.stop_bits,
            parity = ?config.parity,
            hw_flow = config.hw_flow,
            "UART opened"
        );
        Ok(Self::from_backend(config, backend))
    }

    pub fn from_backend(config: &UartConfig, backend: B) -> Self {
        Self {
            device: config.device.clone(),
            baud: config.effective_baud(),
            backend: Mutex::new(backend),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn baud(&self) -> u32 {
        self.baud
    }

    /// Write every byte of `data`, retrying after signal interruptions.
    pub fn write_all(&self, data: &[u8]) -> Result<usize> {
        let mut backend = self.lock();
        let mut total = 0;
        while total < data.len() {
            match backend.write(&data[total..]) {
                Ok(0) => {
                    return Err(Error::Io(io::Error::from(io::ErrorKind::WriteZero)));
                }
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(device = %self.device, written = total, error = %e, "UART write failed");
                    return Err(Error::Io(e));
                }
            }
        }
        trace!(device = %self.device, len = total, "UART write");
        Ok(total)
    }

    pub fn write_str(&self, s: &str) -> Result<usize> {
        self.write_all(s.as_bytes())
    }

    /// Read up to `buf.len()` bytes.
    ///
    /// `Some(Duration::ZERO)` polls once; `None` waits indefinitely. Returns 0
    /// if nothing arrived in time.
    pub fn read(&self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize> {
        if buf.is_empty() {
            return Err(Error::invalid("empty UART read buffer"));
        }
        match self.lock().read(buf, timeout) {
            Ok(n) => {
                if n > 0 {
                    trace!(device = %self.device, len = n, "UART read");
                }
                Ok(n)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::Interrupted
                        | io::ErrorKind::TimedOut
                        | io::ErrorKind::WouldBlock
                ) =>
            {
                Ok(0)
            }
            Err(e) => {
                warn!(device = %self.device, error = %e, "UART read failed");
                Err(Error::Io(e))
            }
        }
    }

    pub fn flush(&self, target: FlushTarget) -> Result<()> {
        self.lock().flush(target)
    }

    pub fn close(self) {}

    fn lock(&self) -> MutexGuard<'_, B> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B: UartBackend> Drop for Uart<B> {
    fn drop(&mut self) {
        debug!(device = %self.device, "UART closed");
    }
}
