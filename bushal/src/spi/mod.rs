//! SPI device handle and backend contract.
//!
//! [`SpiBus`] owns one controller + chip-select target. It turns the
//! caller-facing operations (plain, two-phase and burst transfers) into a
//! list of [`Segment`]s and hands them to an [`SpiBackend`] as one message,
//! so chip select stays asserted across every segment of the message.
//! Each call holds the handle's lock for the whole message.
//!
//! Backends: [`LinuxSpi`] drives `/dev/spidevX.Y`; [`RecordingSpi`] records
//! messages for tests.

pub mod linux;
pub mod recorder;

pub use linux::LinuxSpi;
pub use recorder::{RecordedMessage, RecordedSegment, RecordingSpi, SpiRecorder};

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::hw_trait::Spi;
use crate::tracing::prelude::*;

/// Byte clocked out when the caller supplies no transmit data.
///
/// All-ones rather than zero: many devices treat `0x00` as a command.
pub const FILL_BYTE: u8 = 0xFF;

/// Clock polarity and phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SpiMode {
    /// CPOL 0, CPHA 0
    #[default]
    Mode0 = 0,
    /// CPOL 0, CPHA 1
    Mode1 = 1,
    /// CPOL 1, CPHA 0
    Mode2 = 2,
    /// CPOL 1, CPHA 1
    Mode3 = 3,
}

impl TryFrom<u8> for SpiMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Mode0),
            1 => Ok(Self::Mode1),
            2 => Ok(Self::Mode2),
            3 => Ok(Self::Mode3),
            _ => Err(Error::invalid(format!("SPI mode {} out of range", value))),
        }
    }
}

impl fmt::Display for SpiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mode{}", *self as u8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitOrder {
    #[default]
    MsbFirst,
    LsbFirst,
}

/// How to open an SPI device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiConfig {
    /// Device node, e.g. `/dev/spidev0.0`.
    pub device: String,
    pub mode: SpiMode,
    pub max_speed_hz: u32,
    pub bits_per_word: u8,
    pub bit_order: BitOrder,
}

impl SpiConfig {
    /// Mode 0, 1 MHz, 8 bits, MSB first.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            mode: SpiMode::Mode0,
            max_speed_hz: 1_000_000,
            bits_per_word: 8,
            bit_order: BitOrder::MsbFirst,
        }
    }

    pub fn with_mode(mut self, mode: SpiMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_speed(mut self, hz: u32) -> Self {
        self.max_speed_hz = hz;
        self
    }

    pub fn settings(&self) -> SpiSettings {
        SpiSettings {
            mode: self.mode,
            bits_per_word: self.bits_per_word,
            speed_hz: self.max_speed_hz,
            bit_order: self.bit_order,
        }
    }
}

/// Handle-wide settings; they persist across transfers until changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiSettings {
    pub mode: SpiMode,
    pub bits_per_word: u8,
    pub speed_hz: u32,
    pub bit_order: BitOrder,
}

/// Live configuration as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiInfo {
    pub name: String,
    pub mode: SpiMode,
    pub bits_per_word: u8,
    pub speed_hz: u32,
    pub bit_order: BitOrder,
}

/// One piece of a message.
///
/// `rx`, when present, is exactly as long as `tx`. `cs_change` follows
/// spidev: on the last segment it keeps chip select asserted after the
/// message; on earlier segments it pulses chip select between segments.
#[derive(Debug)]
pub struct Segment<'a> {
    pub tx: &'a [u8],
    pub rx: Option<&'a mut [u8]>,
    pub cs_change: bool,
}

/// Primitive operations a backend provides.
pub trait SpiBackend: Send {
    /// Open the device and apply mode, bit order, word size and speed.
    ///
    /// Any failing step is [`Error::BusUnavailable`]; nothing stays open.
    fn open(config: &SpiConfig) -> Result<Self>
    where
        Self: Sized;

    /// Run `segments` as one chip-select framed message.
    fn transfer(&mut self, segments: &mut [Segment<'_>], settings: &SpiSettings) -> Result<()>;

    fn set_speed(&mut self, hz: u32) -> Result<()>;

    fn read_mode(&mut self) -> Result<(SpiMode, BitOrder)>;

    fn read_bits_per_word(&mut self) -> Result<u8>;

    fn read_speed_hz(&mut self) -> Result<u32>;

    /// Drive a GPIO-routed chip select.
    ///
    /// Controller-driven backends leave this as a no-op; callers must not
    /// assume the line moves unless the backend says so.
    fn assert_chip_select(&mut self, _active: bool) -> Result<()> {
        Ok(())
    }
}

struct Inner<B> {
    backend: B,
    settings: SpiSettings,
}

/// An open SPI device.
pub struct SpiBus<B: SpiBackend> {
    name: String,
    inner: Mutex<Inner<B>>,
}

impl<B: SpiBackend> SpiBus<B> {
    /// Open a device with backend `B`.
    pub fn open(config: &SpiConfig) -> Result<Self> {
        if config.device.is_empty() {
            return Err(Error::invalid("empty SPI device name"));
        }
        if !(1..=32).contains(&config.bits_per_word) {
            return Err(Error::invalid(format!(
                "{} bits per word",
                config.bits_per_word
            )));
        }
        let backend = B::open(config)?;
        info!(
            device = %config.device,
            mode = %config.mode,
            bits = config.bits_per_word,
            lsb_first = config.bit_order == BitOrder::LsbFirst,
            speed_hz = config.max_speed_hz,
            "SPI device opened"
        );
        Ok(Self::from_backend(config, backend))
    }

    /// Wrap an already-configured backend.
    pub fn from_backend(config: &SpiConfig, backend: B) -> Self {
        Self {
            name: config.device.clone(),
            inner: Mutex::new(Inner {
                backend,
                settings: config.settings(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cached settings, without asking the backend.
    pub fn settings(&self) -> SpiSettings {
        self.lock().settings
    }

    /// Change the clock for subsequent transfers.
    pub fn set_speed(&self, hz: u32) -> Result<()> {
        if hz == 0 {
            return Err(Error::invalid("zero SPI clock"));
        }
        let mut inner = self.lock();
        inner.backend.set_speed(hz)?;
        inner.settings.speed_hz = hz;
        debug!(device = %self.name, speed_hz = hz, "SPI speed changed");
        Ok(())
    }

    /// Read back the live configuration.
    ///
    /// Fields the backend cannot report fall back to the cached value.
    pub fn info(&self) -> SpiInfo {
        let mut inner = self.lock();
        let cached = inner.settings;
        let (mode, bit_order) = inner
            .backend
            .read_mode()
            .unwrap_or((cached.mode, cached.bit_order));
        let bits_per_word = inner
            .backend
            .read_bits_per_word()
            .unwrap_or(cached.bits_per_word);
        let speed_hz = inner.backend.read_speed_hz().unwrap_or(cached.speed_hz);

        SpiInfo {
            name: self.name.clone(),
            mode,
            bits_per_word,
            speed_hz,
            bit_order,
        }
    }

    /// Drive a GPIO-routed chip select, where the backend supports one.
    pub fn assert_chip_select(&self, active: bool) -> Result<()> {
        self.lock().backend.assert_chip_select(active)
    }

    /// Like [`Spi::transfer`], but `hold_cs` keeps chip select asserted
    /// afterwards so the next call continues the same logical operation.
    pub fn burst_transfer(
        &self,
        tx: Option<&[u8]>,
        rx: Option<&mut [u8]>,
        len: usize,
        hold_cs: bool,
    ) -> Result<()> {
        self.single(tx, rx, len, hold_cs)
    }

    /// Close the device. Equivalent to dropping it.
    pub fn close(self) {}

    fn single(
        &self,
        tx: Option<&[u8]>,
        rx: Option<&mut [u8]>,
        len: usize,
        cs_change: bool,
    ) -> Result<()> {
        if len == 0 {
            return Err(Error::invalid("zero-length SPI transfer"));
        }
        check_buffer("tx", tx.map(<[u8]>::len), len)?;
        check_buffer("rx", rx.as_deref().map(<[u8]>::len), len)?;

        let filler;
        let tx = match tx {
            Some(tx) => tx,
            None => {
                filler = vec![FILL_BYTE; len];
                &filler[..]
            }
        };

        let mut segments = [Segment { tx, rx, cs_change }];
        self.run(&mut segments)
    }

    fn run(&self, segments: &mut [Segment<'_>]) -> Result<()> {
        let mut guard = self.lock();
        let Inner { backend, settings } = &mut *guard;
        backend.transfer(segments, settings).inspect_err(|e| {
            warn!(device = %self.name, error = %e, "SPI transfer failed");
        })?;
        trace!(
            device = %self.name,
            segments = segments.len(),
            hold_cs = segments.last().is_some_and(|s| s.cs_change),
            "SPI message"
        );
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner<B>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B: SpiBackend> Drop for SpiBus<B> {
    fn drop(&mut self) {
        debug!(device = %self.name, "SPI device closed");
    }
}

fn check_buffer(which: &str, actual: Option<usize>, len: usize) -> Result<()> {
    match actual {
        Some(actual) if actual != len => Err(Error::invalid(format!(
            "{} buffer is {} bytes, transfer is {}",
            which, actual, len
        ))),
        _ => Ok(()),
    }
}

impl<B: SpiBackend> Spi for SpiBus<B> {
    fn transfer(&self, tx: Option<&[u8]>, rx: Option<&mut [u8]>, len: usize) -> Result<()> {
        self.single(tx, rx, len, false)
    }

    fn transfer_segments(
        &self,
        cmd: &[u8],
        data: Option<&[u8]>,
        data_len: usize,
        rx: Option<&mut [u8]>,
    ) -> Result<()> {
        if cmd.is_empty() && data_len == 0 {
            return Err(Error::invalid("both SPI phases are empty"));
        }
        check_buffer("data", data.map(<[u8]>::len), data_len)?;

        let filler;
        let data_tx = match data {
            Some(data) => data,
            None => {
                filler = vec![FILL_BYTE; data_len];
                &filler[..]
            }
        };

        // A short rx buffer captures only the head of the data phase.
        let mut scratch = Vec::new();
        let mut short_rx = None;
        let data_rx = match rx {
            Some(rx) if rx.len() >= data_len => Some(&mut rx[..data_len]),
            Some(rx) => {
                scratch.resize(data_len, 0);
                short_rx = Some(rx);
                Some(scratch.as_mut_slice())
            }
            None => None,
        };

        let mut segments = Vec::with_capacity(2);
        if !cmd.is_empty() {
            segments.push(Segment {
                tx: cmd,
                rx: None,
                cs_change: false,
            });
        }
        if data_len > 0 {
            segments.push(Segment {
                tx: data_tx,
                rx: data_rx,
                cs_change: false,
            });
        }
        self.run(&mut segments)?;
        drop(segments);

        if let Some(rx) = short_rx {
            let n = rx.len();
            rx.copy_from_slice(&scratch[..n]);
        }
        Ok(())
    }
}
