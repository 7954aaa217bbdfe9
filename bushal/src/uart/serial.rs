//! tty backend on the `serialport` API re-exported by `tokio-serial`.

use std::io::{self, Read, Write};
use std::time::Duration;

use tokio_serial::{ClearBuffer, DataBits, FlowControl, SerialPort, StopBits};

use super::{FlushTarget, Parity, UartBackend, UartConfig};
use crate::error::{Error, Result};
use crate::tracing::prelude::*;

/// Wait slice for reads without a deadline.
const BLOCKING_SLICE: Duration = Duration::from_secs(3600);

fn data_bits(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

fn parity(parity: Parity) -> tokio_serial::Parity {
    match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Even => tokio_serial::Parity::Even,
        Parity::Odd => tokio_serial::Parity::Odd,
    }
}

/// A tty opened in raw mode.
pub struct SerialPortUart {
    port: Box<dyn SerialPort>,
}

impl UartBackend for SerialPortUart {
    fn open(config: &UartConfig) -> Result<Self> {
        let stop_bits = if config.stop_bits == 2 {
            StopBits::Two
        } else {
            StopBits::One
        };
        let flow = if config.hw_flow {
            FlowControl::Hardware
        } else {
            FlowControl::None
        };

        let port = tokio_serial::new(&config.device, config.effective_baud())
            .data_bits(data_bits(config.data_bits))
            .stop_bits(stop_bits)
            .parity(parity(config.parity))
            .flow_control(flow)
            .timeout(Duration::ZERO)
            .open()
            .map_err(|e| {
                warn!(device = %config.device, error = %e, "Failed to open UART");
                match e.kind() {
                    tokio_serial::ErrorKind::InvalidInput => Error::Config(e.to_string()),
                    _ => Error::unavailable(&config.device, io::Error::from(e)),
                }
            })?;

        // Drop whatever was queued before we opened.
        if let Err(e) = port.clear(ClearBuffer::All) {
            debug!(device = %config.device, error = %e, "Failed to clear stale UART data");
        }
        Ok(Self { port })
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.port.write(data)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<usize> {
        loop {
            self.port.set_timeout(timeout.unwrap_or(BLOCKING_SLICE))?;
            match self.port.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::TimedOut && timeout.is_none() => continue,
                result => return result,
            }
        }
    }

    fn flush(&mut self, target: FlushTarget) -> Result<()> {
        let which = match target {
            FlushTarget::Input => ClearBuffer::Input,
            FlushTarget::Output => ClearBuffer::Output,
            FlushTarget::Both => ClearBuffer::All,
        };
        self.port
            .clear(which)
            .map_err(|e| Error::Io(io::Error::from(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uart::Uart;
    use crate::ErrorKind;

    #[test]
    fn missing_tty_is_unavailable() {
        let config = UartConfig::new("/dev/ttyDOES-NOT-EXIST");
        let err = Uart::<SerialPortUart>::open(&config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::BusUnavailable);
    }

    #[test]
    fn data_bits_map() {
        assert_eq!(data_bits(5), DataBits::Five);
        assert_eq!(data_bits(8), DataBits::Eight);
    }

    #[test]
    #[ignore] // Needs a looped-back tty: cargo test -- --ignored
    fn echo_through_real_port() {
        let uart = Uart::<SerialPortUart>::open(&UartConfig::new("/dev/ttyUSB0")).unwrap();
        uart.write_str("ping").unwrap();
        let mut buf = [0u8; 4];
        let n = uart.read(&mut buf, Some(Duration::from_millis(200))).unwrap();
        assert_eq!(&buf[..n], b"ping");
    }
}
