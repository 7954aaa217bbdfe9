//! GPIO hardware abstraction trait.

use std::sync::Arc;

use crate::error::Result;

/// Button bit for BTN0 in [`Gpio::read_buttons`] results.
pub const BTN0: u8 = 1 << 0;
/// Button bit for BTN1 in [`Gpio::read_buttons`] results.
pub const BTN1: u8 = 1 << 1;

/// LED bank plus two buttons, in logical (active = 1) terms.
pub trait Gpio: Send + Sync {
    /// Drive the LED bank; bit `i` maps to LED `i`.
    fn write_leds(&self, value: u8) -> Result<()>;

    /// Read both buttons as `BTN0 | BTN1` bits, pressed = 1.
    fn read_buttons(&self) -> Result<u8>;
}

impl<T: Gpio + ?Sized> Gpio for &T {
    fn write_leds(&self, value: u8) -> Result<()> {
        (**self).write_leds(value)
    }

    fn read_buttons(&self) -> Result<u8> {
        (**self).read_buttons()
    }
}

impl<T: Gpio + ?Sized> Gpio for Arc<T> {
    fn write_leds(&self, value: u8) -> Result<()> {
        (**self).write_leds(value)
    }

    fn read_buttons(&self) -> Result<u8> {
        (**self).read_buttons()
    }
}
