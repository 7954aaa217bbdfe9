//! Daemon lifecycle for the `bushal` demo binary.
//!
//! Opens the configured buses, runs each enabled demo on its own blocking
//! worker, then waits for SIGINT or SIGTERM and shuts the workers down.

use std::sync::Arc;

use tokio::signal::unix::{self, SignalKind};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::tracing::prelude::*;
use crate::{
    config::{Backend, DemoConfig},
    demo,
    gpio::{Gpio, GpioChip, LinuxChip, MockChip},
    i2c::{I2cBackend, I2cBus, I2cConfig, LinuxI2c, MockI2c},
    peripheral::{Mcp23008, Tmp102},
    spi::{LinuxSpi, RecordingSpi, SpiBackend, SpiBus},
    uart::{LoopbackUart, SerialPortUart, Uart, UartBackend},
};

/// The main daemon.
pub struct Daemon {
    config: DemoConfig,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Daemon {
    pub fn new(config: DemoConfig) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Run the daemon until shutdown is requested.
    pub async fn run(self) -> anyhow::Result<()> {
        info!(backend = ?self.config.backend, "Starting demos");
        match self.config.backend {
            Backend::Mock => self.start::<MockI2c, MockChip, RecordingSpi, LoopbackUart>(),
            Backend::Linux => self.start::<LinuxI2c, LinuxChip, LinuxSpi, SerialPortUart>(),
        }
        self.tracker.close();

        info!("Started.");
        info!("For debugging, set RUST_LOG=bushal=debug or trace.");

        let mut sigint = unix::signal(SignalKind::interrupt())?;
        let mut sigterm = unix::signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT.");
            },
            _ = sigterm.recv() => {
                info!("Received SIGTERM.");
            },
        }

        self.shutdown.cancel();
        self.tracker.wait().await;
        info!("Exiting.");

        Ok(())
    }

    /// Open every configured bus with the given backends and spawn its demo.
    ///
    /// A bus that fails to open is logged and its demos are skipped.
    fn start<I, C, S, U>(&self)
    where
        I: I2cBackend + 'static,
        C: GpioChip + 'static,
        S: SpiBackend + 'static,
        U: UartBackend + 'static,
    {
        let config = &self.config;

        match I2cBus::<I>::open(&I2cConfig::new(&config.i2c_bus)) {
            Ok(bus) => {
                let bus = Arc::new(bus);

                let sensor = Tmp102::new_with_address(Arc::clone(&bus), config.temp_addr);
                let period = config.temp_period;
                let token = self.shutdown.clone();
                self.tracker
                    .spawn_blocking(move || demo::temperature_monitor(sensor, period, token));

                if let Some(addr) = config.expander_addr {
                    let io = Mcp23008::new_with_address(Arc::clone(&bus), addr);
                    let token = self.shutdown.clone();
                    self.tracker
                        .spawn_blocking(move || demo::expander_counter(io, token));
                }
            }
            Err(e) => error!(bus = %config.i2c_bus, error = %e, "I2C demos disabled"),
        }

        if let Some(gpio_config) = &config.gpio {
            match Gpio::<C>::open(gpio_config) {
                Ok(gpio) => {
                    let token = self.shutdown.clone();
                    self.tracker
                        .spawn_blocking(move || demo::button_mirror(gpio, token));
                }
                Err(e) => error!(chip = %gpio_config.chip, error = %e, "GPIO demo disabled"),
            }
        }

        if let Some(spi_config) = &config.spi {
            let spi_config = spi_config.clone();
            self.tracker.spawn_blocking(move || {
                let result = SpiBus::<S>::open(&spi_config).and_then(|bus| demo::spi_info(&bus));
                if let Err(e) = result {
                    error!(device = %spi_config.device, error = %e, "SPI demo failed");
                }
            });
        }

        if let Some(uart_config) = &config.uart {
            match Uart::<U>::open(uart_config) {
                Ok(uart) => {
                    let token = self.shutdown.clone();
                    self.tracker
                        .spawn_blocking(move || demo::uart_chatter(&uart, token));
                }
                Err(e) => error!(device = %uart_config.device, error = %e, "UART demo disabled"),
            }
        }
    }
}
