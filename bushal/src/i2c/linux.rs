//! Linux i2c-dev backend.
//!
//! Built on [`i2cdev`]'s `LinuxI2CDevice`. The target address is set with
//! `set_slave_address` before every transfer; plain reads and writes then
//! move the bytes. Requires the kernel `i2c-dev` driver.
//!
//! i2c-dev transfers are all-or-nothing: the kernel either moves every
//! requested byte or fails the call, so there is no short count to check.

use std::fs::OpenOptions;
use std::io;

use i2cdev::core::I2CDevice;
use i2cdev::linux::{LinuxI2CDevice, LinuxI2CError};

use super::{I2cBackend, I2cConfig};
use crate::error::{Error, Result};
use crate::tracing::prelude::*;

/// Backend for a `/dev/i2c-*` node.
///
/// `LinuxI2CDevice` binds an address when it opens the node, so the device
/// is created by the first [`select`](I2cBackend::select).
pub struct LinuxI2c {
    device: Option<LinuxI2CDevice>,
    bus: String,
}

impl LinuxI2c {
    pub fn bus(&self) -> &str {
        &self.bus
    }

    fn device(&mut self) -> Result<&mut LinuxI2CDevice> {
        self.device
            .as_mut()
            .ok_or_else(|| Error::invalid("I2C transfer before an address was selected"))
    }
}

fn io_error(e: LinuxI2CError) -> Error {
    Error::Io(io::Error::from(e))
}

impl I2cBackend for LinuxI2c {
    fn open(config: &I2cConfig) -> Result<Self> {
        // Check the node up front so a bad path is reported at open.
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.bus)
            .map_err(|e| {
                warn!(bus = %config.bus, error = %e, "Failed to open I2C bus");
                Error::unavailable(&config.bus, e)
            })?;

        Ok(Self {
            device: None,
            bus: config.bus.clone(),
        })
    }

    fn select(&mut self, addr: u8) -> Result<()> {
        let result = match self.device.as_mut() {
            Some(device) => device.set_slave_address(addr.into()),
            None => LinuxI2CDevice::new(&self.bus, addr.into()).map(|device| {
                self.device = Some(device);
            }),
        };
        result.map_err(|e| {
            debug!(bus = %self.bus, addr, error = %e, "I2C address select failed");
            Error::NoDevice(addr)
        })
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.device()?.write(data).map_err(|e| {
            warn!(bus = %self.bus, len = data.len(), error = %e, "I2C write failed");
            io_error(e)
        })
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        let len = buf.len();
        self.device()?.read(buf).map_err(|e| {
            warn!(bus = %self.bus, len, error = %e, "I2C read failed");
            io_error(e)
        })
    }

    fn probe(&mut self, addr: u8) -> Result<()> {
        self.select(addr)?;
        // A NACK on the address phase fails the read.
        let mut dummy = [0u8; 1];
        match self.device()?.read(&mut dummy) {
            Ok(()) => Ok(()),
            Err(e) => {
                trace!(bus = %self.bus, addr, error = %e, "Probe read failed");
                Err(Error::NoDevice(addr))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn missing_bus_is_unavailable() {
        let config = I2cConfig::new("/dev/i2c-does-not-exist");
        let err = LinuxI2c::open(&config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::BusUnavailable);
    }

    #[test]
    fn transfer_needs_an_address() {
        // /dev/null opens fine; no address has been bound yet.
        let mut bus = LinuxI2c::open(&I2cConfig::new("/dev/null")).unwrap();
        let err = bus.write(&[0x00]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn select_on_non_i2c_node_is_no_device() {
        // /dev/null rejects the I2C_SLAVE ioctl.
        let mut bus = LinuxI2c::open(&I2cConfig::new("/dev/null")).unwrap();
        let err = bus.select(0x48).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoDevice);
    }

    #[test]
    #[ignore] // Needs a real bus: cargo test -- --ignored
    fn probe_real_bus() {
        use crate::hw_trait::I2c;
        use crate::i2c::I2cBus;

        let bus = I2cBus::<LinuxI2c>::open(&I2cConfig::new("/dev/i2c-1")).unwrap();
        for addr in 0x08..0x78 {
            if bus.probe(addr).is_ok() {
                println!("device at 0x{:02x}", addr);
            }
        }
    }
}
