//! MCP23008 8-bit I/O expander driver.
//!
//! Wired as two button inputs on GP0/GP1 and six outputs on GP2..GP7.

use crate::error::Result;
use crate::hw_trait::I2c;
use crate::tracing::prelude::*;

/// Default I2C address (A2..A0 low).
pub const DEFAULT_ADDRESS: u8 = 0x20;

/// GP0 and GP1 are inputs.
pub const INPUT_MASK: u8 = 0x03;

/// Pins that can be driven.
pub const OUTPUT_MASK: u8 = !INPUT_MASK;

mod regs {
    /// Direction: 1 = input, 0 = output
    pub const IODIR: u8 = 0x00;
    /// Port value (inputs)
    pub const GPIO: u8 = 0x09;
    /// Output latch
    pub const OLAT: u8 = 0x0A;
}

/// MCP23008 driver
pub struct Mcp23008<I: I2c> {
    i2c: I,
    address: u8,
}

impl<I: I2c> Mcp23008<I> {
    pub fn new(i2c: I) -> Self {
        Self::new_with_address(i2c, DEFAULT_ADDRESS)
    }

    pub fn new_with_address(i2c: I, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Configure pin directions and clear the outputs.
    pub fn init(&self) -> Result<()> {
        self.write_register(regs::IODIR, INPUT_MASK)?;
        self.write_register(regs::OLAT, 0x00)?;
        debug!(addr = self.address, iodir = INPUT_MASK, "MCP23008 initialized");
        Ok(())
    }

    /// Raw port state. Buttons are active-low.
    pub fn read_inputs(&self) -> Result<u8> {
        self.i2c.read_register_u8(self.address, regs::GPIO)
    }

    /// Drive the output pins; bits 0 and 1 are dropped.
    pub fn write_outputs(&self, value: u8) -> Result<()> {
        self.write_register(regs::OLAT, value & OUTPUT_MASK)
    }

    fn write_register(&self, reg: u8, value: u8) -> Result<()> {
        self.i2c.write_register_u8(self.address, reg, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Register file that logs writes.
    #[derive(Default)]
    struct Regs {
        file: Mutex<[u8; 16]>,
        writes: Mutex<Vec<(u8, u8, u8)>>,
    }

    impl I2c for Regs {
        fn probe(&self, _addr: u8) -> Result<()> {
            Ok(())
        }

        fn write(&self, _addr: u8, _data: &[u8]) -> Result<()> {
            Ok(())
        }

        fn read(&self, _addr: u8, _buf: &mut [u8]) -> Result<()> {
            Ok(())
        }

        fn write_register(&self, addr: u8, reg: u8, data: &[u8]) -> Result<()> {
            self.file.lock().unwrap()[usize::from(reg)] = data[0];
            self.writes.lock().unwrap().push((addr, reg, data[0]));
            Ok(())
        }

        fn read_register(&self, _addr: u8, reg: u8, buf: &mut [u8]) -> Result<()> {
            buf[0] = self.file.lock().unwrap()[usize::from(reg)];
            Ok(())
        }
    }

    #[test]
    fn init_sets_direction_then_clears_latch() {
        let bus = Regs::default();
        Mcp23008::new(&bus).init().unwrap();
        assert_eq!(
            *bus.writes.lock().unwrap(),
            vec![(0x20, regs::IODIR, 0x03), (0x20, regs::OLAT, 0x00)]
        );
    }

    #[test]
    fn outputs_never_touch_input_pins() {
        let bus = Regs::default();
        let io = Mcp23008::new_with_address(&bus, 0x21);
        io.write_outputs(0xff).unwrap();
        assert_eq!(bus.file.lock().unwrap()[usize::from(regs::OLAT)], 0xfc);
        io.write_outputs(0x07).unwrap();
        assert_eq!(bus.file.lock().unwrap()[usize::from(regs::OLAT)], 0x04);
    }

    #[test]
    fn inputs_read_gpio_register() {
        let bus = Regs::default();
        bus.file.lock().unwrap()[usize::from(regs::GPIO)] = 0b10;
        assert_eq!(Mcp23008::new(&bus).read_inputs().unwrap(), 0b10);
    }
}
