//! I2C hardware abstraction trait.

use std::sync::Arc;

use crate::error::Result;

/// I2C bus abstraction.
///
/// Every method addresses the target anew; implementations must not rely on
/// whichever device a previous call selected.
pub trait I2c: Send + Sync {
    /// Check whether a device acknowledges at `addr`.
    fn probe(&self, addr: u8) -> Result<()>;

    /// Write raw bytes to a device.
    fn write(&self, addr: u8, data: &[u8]) -> Result<()>;

    /// Read raw bytes from a device, filling `buf` completely.
    fn read(&self, addr: u8, buf: &mut [u8]) -> Result<()>;

    /// Write `[reg] ++ data` in one bus operation.
    fn write_register(&self, addr: u8, reg: u8, data: &[u8]) -> Result<()>;

    /// Write the register index, then read `buf.len()` bytes.
    fn read_register(&self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<()>;

    /// Read one 8-bit register.
    fn read_register_u8(&self, addr: u8, reg: u8) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_register(addr, reg, &mut buf)?;
        Ok(buf[0])
    }

    /// Write one 8-bit register.
    fn write_register_u8(&self, addr: u8, reg: u8, value: u8) -> Result<()> {
        self.write_register(addr, reg, &[value])
    }
}

impl<T: I2c + ?Sized> I2c for &T {
    fn probe(&self, addr: u8) -> Result<()> {
        (**self).probe(addr)
    }

    fn write(&self, addr: u8, data: &[u8]) -> Result<()> {
        (**self).write(addr, data)
    }

    fn read(&self, addr: u8, buf: &mut [u8]) -> Result<()> {
        (**self).read(addr, buf)
    }

    fn write_register(&self, addr: u8, reg: u8, data: &[u8]) -> Result<()> {
        (**self).write_register(addr, reg, data)
    }

    fn read_register(&self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<()> {
        (**self).read_register(addr, reg, buf)
    }
}

impl<T: I2c + ?Sized> I2c for Arc<T> {
    fn probe(&self, addr: u8) -> Result<()> {
        (**self).probe(addr)
    }

    fn write(&self, addr: u8, data: &[u8]) -> Result<()> {
        (**self).write(addr, data)
    }

    fn read(&self, addr: u8, buf: &mut [u8]) -> Result<()> {
        (**self).read(addr, buf)
    }

    fn write_register(&self, addr: u8, reg: u8, data: &[u8]) -> Result<()> {
        (**self).write_register(addr, reg, data)
    }

    fn read_register(&self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<()> {
        (**self).read_register(addr, reg, buf)
    }
}
