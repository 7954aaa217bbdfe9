//! I2C bus handle and backend contract.
//!
//! [`I2cBus`] is the caller-owned handle. It validates arguments before any
//! hardware access and serializes each multi-step transaction (address
//! select, then write and/or read) under one per-handle lock, so concurrent
//! users of a shared handle never interleave their address selection.
//!
//! The wire work is done by an [`I2cBackend`]: [`LinuxI2c`] for `/dev/i2c-*`
//! and [`MockI2c`] for hardware-free runs. The backend is picked by type at
//! open time:
//!
//! ```no_run
//! use bushal::i2c::{I2cBus, I2cConfig, LinuxI2c};
//! use bushal::hw_trait::I2c;
//!
//! let bus = I2cBus::<LinuxI2c>::open(&I2cConfig::new("/dev/i2c-1"))?;
//! let id = bus.read_register_u8(0x4c, 0xfe)?;
//! # Ok::<(), bushal::Error>(())
//! ```

pub mod linux;
pub mod mock;

pub use linux::LinuxI2c;
pub use mock::MockI2c;

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::hw_trait::I2c;
use crate::tracing::prelude::*;

/// Largest single write, register index included.
pub const MAX_WRITE_LEN: usize = 256;

/// Highest valid 7-bit address.
const MAX_ADDR7: u8 = 0x7f;

/// How to open an I2C bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I2cConfig {
    /// Backend-specific bus name, e.g. `/dev/i2c-1`.
    pub bus: String,
    /// Clock hint; the Linux backend leaves the kernel's setting alone.
    pub speed_hz: u32,
}

impl I2cConfig {
    pub fn new(bus: impl Into<String>) -> Self {
        Self {
            bus: bus.into(),
            speed_hz: 100_000,
        }
    }

    pub fn with_speed(mut self, speed_hz: u32) -> Self {
        self.speed_hz = speed_hz;
        self
    }
}

/// Primitive operations a backend provides.
///
/// `select` changes bus-wide state; the provided sequences (`probe`,
/// `write_register`, `read_register`) assume nobody else touches the backend
/// between their steps. [`I2cBus`] guarantees that.
pub trait I2cBackend: Send {
    /// Open the bus described by `config`.
    fn open(config: &I2cConfig) -> Result<Self>
    where
        Self: Sized;

    /// Address the device that subsequent reads and writes go to.
    ///
    /// Fails with [`Error::NoDevice`] if the target cannot be selected.
    fn select(&mut self, addr: u8) -> Result<()>;

    /// Write all of `data` to the selected device.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Fill all of `buf` from the selected device.
    fn read(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Select `addr` and attempt a one-byte read.
    ///
    /// A failed read is taken to mean NACK. Devices that refuse reads without
    /// a register index will be misreported as absent.
    fn probe(&mut self, addr: u8) -> Result<()> {
        self.select(addr)?;
        let mut dummy = [0u8; 1];
        match self.read(&mut dummy) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == crate::ErrorKind::Io => Err(Error::NoDevice(addr)),
            Err(e) => Err(e),
        }
    }

    /// Select `addr` and write `[reg] ++ data` as one message.
    fn write_register(&mut self, addr: u8, reg: u8, data: &[u8]) -> Result<()> {
        let len = data.len() + 1;
        if len > MAX_WRITE_LEN {
            return Err(Error::invalid(format!(
                "register write of {} bytes exceeds {}",
                len, MAX_WRITE_LEN
            )));
        }
        let mut scratch = [0u8; MAX_WRITE_LEN];
        scratch[0] = reg;
        scratch[1..len].copy_from_slice(data);

        self.select(addr)?;
        self.write(&scratch[..len])
    }

    /// Select `addr`, write the register index, then read `buf.len()` bytes.
    ///
    /// Two bus operations, not a repeated start.
    fn read_register(&mut self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<()> {
        self.select(addr)?;
        self.write(&[reg])?;
        self.read(buf)
    }
}

/// An open I2C bus.
///
/// Dropping the handle closes the underlying resource.
pub struct I2cBus<B: I2cBackend> {
    name: String,
    speed_hz: u32,
    backend: Mutex<B>,
}

impl<B: I2cBackend> I2cBus<B> {
    /// Open a bus with backend `B`.
    pub fn open(config: &I2cConfig) -> Result<Self> {
        if config.bus.is_empty() {
            return Err(Error::invalid("empty I2C bus name"));
        }
        let backend = B::open(config)?;
        info!(bus = %config.bus, speed_hz = config.speed_hz, "I2C bus opened");
        Ok(Self::from_backend(config, backend))
    }

    /// Wrap an already-open backend.
    pub fn from_backend(config: &I2cConfig, backend: B) -> Self {
        Self {
            name: config.bus.clone(),
            speed_hz: config.speed_hz,
            backend: Mutex::new(backend),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn speed_hz(&self) -> u32 {
        self.speed_hz
    }

    /// Run `f` with exclusive access to the backend.
    pub fn with_backend<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        f(&mut self.lock())
    }

    /// Close the bus. Equivalent to dropping it.
    pub fn close(self) {}

    fn lock(&self) -> MutexGuard<'_, B> {
        // A panicking holder cannot leave the bus mid-transaction in a way
        // the next select wouldn't reset.
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B: I2cBackend> Drop for I2cBus<B> {
    fn drop(&mut self) {
        debug!(bus = %self.name, "I2C bus closed");
    }
}

fn check_addr(addr: u8) -> Result<()> {
    if addr > MAX_ADDR7 {
        return Err(Error::invalid(format!(
            "address 0x{:02x} is not a 7-bit address",
            addr
        )));
    }
    Ok(())
}

fn check_len(len: usize, what: &str) -> Result<()> {
    if len == 0 {
        return Err(Error::invalid(format!("zero-length {}", what)));
    }
    Ok(())
}

impl<B: I2cBackend> I2c for I2cBus<B> {
    fn probe(&self, addr: u8) -> Result<()> {
        check_addr(addr)?;
        let result = self.lock().probe(addr);
        trace!(bus = %self.name, addr, present = result.is_ok(), "I2C probe");
        result
    }

    fn write(&self, addr: u8, data: &[u8]) -> Result<()> {
        check_addr(addr)?;
        check_len(data.len(), "write")?;
        let mut backend = self.lock();
        backend.select(addr)?;
        backend.write(data)?;
        trace!(bus = %self.name, addr, data = ?data, "I2C write");
        Ok(())
    }

    fn read(&self, addr: u8, buf: &mut [u8]) -> Result<()> {
        check_addr(addr)?;
        check_len(buf.len(), "read")?;
        let mut backend = self.lock();
        backend.select(addr)?;
        backend.read(buf)?;
        trace!(bus = %self.name, addr, data = ?buf, "I2C read");
        Ok(())
    }

    fn write_register(&self, addr: u8, reg: u8, data: &[u8]) -> Result<()> {
        check_addr(addr)?;
        check_len(data.len(), "register write")?;
        self.lock().write_register(addr, reg, data)?;
        trace!(bus = %self.name, addr, reg, data = ?data, "I2C register write");
        Ok(())
    }

    fn read_register(&self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<()> {
        check_addr(addr)?;
        check_len(buf.len(), "register read")?;
        self.lock().read_register(addr, reg, buf)?;
        trace!(bus = %self.name, addr, reg, data = ?buf, "I2C register read");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    /// Backend that records every primitive call.
    #[derive(Default)]
    struct Script {
        calls: Vec<String>,
        fail_read: bool,
    }

    impl I2cBackend for Script {
        fn open(_config: &I2cConfig) -> Result<Self> {
            Ok(Self::default())
        }

        fn select(&mut self, addr: u8) -> Result<()> {
            self.calls.push(format!("select {:02x}", addr));
            Ok(())
        }

        fn write(&mut self, data: &[u8]) -> Result<()> {
            self.calls.push(format!("write {:02x?}", data));
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<()> {
            self.calls.push(format!("read {}", buf.len()));
            if self.fail_read {
                return Err(Error::ShortTransfer {
                    expected: buf.len(),
                    actual: 0,
                });
            }
            buf.fill(0x5a);
            Ok(())
        }
    }

    fn bus() -> I2cBus<Script> {
        I2cBus::open(&I2cConfig::new("script")).unwrap()
    }

    #[test]
    fn empty_bus_name_rejected() {
        let err = I2cBus::<Script>::open(&I2cConfig::new("")).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn register_read_is_select_write_read() {
        let bus = bus();
        let mut buf = [0u8; 2];
        bus.read_register(0x48, 0x01, &mut buf).unwrap();
        assert_eq!(buf, [0x5a, 0x5a]);
        bus.with_backend(|b| {
            assert_eq!(b.calls, vec!["select 48", "write [01]", "read 2"]);
        });
    }

    #[test]
    fn register_write_prefixes_index() {
        let bus = bus();
        bus.write_register(0x20, 0x0a, &[0xfc, 0x01]).unwrap();
        bus.with_backend(|b| {
            assert_eq!(b.calls, vec!["select 20", "write [0a, fc, 01]"]);
        });
    }

    #[test]
    fn every_operation_reselects() {
        let bus = bus();
        bus.write(0x10, &[1]).unwrap();
        bus.write(0x10, &[2]).unwrap();
        bus.with_backend(|b| {
            let selects = b.calls.iter().filter(|c| c.starts_with("select")).count();
            assert_eq!(selects, 2);
        });
    }

    #[test]
    fn arguments_checked_before_hardware() {
        let bus = bus();
        let mut empty = [0u8; 0];
        assert_eq!(
            bus.write(0x10, &[]).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            bus.read(0x10, &mut empty).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            bus.probe(0x80).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            bus.write_register(0x10, 0, &[]).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        bus.with_backend(|b| assert!(b.calls.is_empty()));
    }

    #[test]
    fn oversized_register_write_rejected() {
        let bus = bus();
        let payload = [0u8; MAX_WRITE_LEN];
        let err = bus.write_register(0x10, 0, &payload).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let payload = [0u8; MAX_WRITE_LEN - 1];
        assert!(bus.write_register(0x10, 0, &payload).is_ok());
    }

    #[test]
    fn probe_maps_failed_read_to_no_device() {
        let bus = bus();
        bus.with_backend(|b| b.fail_read = true);
        let err = bus.probe(0x33).unwrap_err();
        assert!(matches!(err, Error::NoDevice(0x33)));
    }
}
