//! SPI hardware abstraction trait.

use std::sync::Arc;

use crate::error::Result;

/// SPI device abstraction (one controller plus one chip select).
pub trait Spi: Send + Sync {
    /// Full-duplex exchange of `len` bytes.
    ///
    /// With `tx` absent, `0xFF` filler is clocked out. With `rx` absent, the
    /// received bytes are discarded.
    fn transfer(&self, tx: Option<&[u8]>, rx: Option<&mut [u8]>, len: usize) -> Result<()>;

    /// Command phase then data phase under one chip-select assertion.
    ///
    /// The command response is ignored. The data phase clocks `data` (or
    /// `data_len` filler bytes) and captures up to `rx.len()` bytes.
    fn transfer_segments(
        &self,
        cmd: &[u8],
        data: Option<&[u8]>,
        data_len: usize,
        rx: Option<&mut [u8]>,
    ) -> Result<()>;

    /// Write-only transfer.
    fn write(&self, tx: &[u8]) -> Result<()> {
        self.transfer(Some(tx), None, tx.len())
    }

    /// Read-only transfer, clocking filler bytes.
    fn read(&self, rx: &mut [u8]) -> Result<()> {
        let len = rx.len();
        self.transfer(None, Some(rx), len)
    }
}

impl<T: Spi + ?Sized> Spi for &T {
    fn transfer(&self, tx: Option<&[u8]>, rx: Option<&mut [u8]>, len: usize) -> Result<()> {
        (**self).transfer(tx, rx, len)
    }

    fn transfer_segments(
        &self,
        cmd: &[u8],
        data: Option<&[u8]>,
        data_len: usize,
        rx: Option<&mut [u8]>,
    ) -> Result<()> {
        (**self).transfer_segments(cmd, data, data_len, rx)
    }
}

impl<T: Spi + ?Sized> Spi for Arc<T> {
    fn transfer(&self, tx: Option<&[u8]>, rx: Option<&mut [u8]>, len: usize) -> Result<()> {
        (**self).transfer(tx, rx, len)
    }

    fn transfer_segments(
        &self,
        cmd: &[u8],
        data: Option<&[u8]>,
        data_len: usize,
        rx: Option<&mut [u8]>,
    ) -> Result<()> {
        (**self).transfer_segments(cmd, data, data_len, rx)
    }
}
