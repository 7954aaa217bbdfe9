//! Demo workers run by the daemon.
//!
//! Each worker is a blocking loop meant for
//! [`TaskTracker::spawn_blocking`](tokio_util::task::TaskTracker::spawn_blocking).
//! They poll a [`CancellationToken`] between iterations and put their
//! outputs back to a neutral state before returning.

use std::thread;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::hw_trait::gpio::{BTN0, BTN1};
use crate::hw_trait::{Gpio, I2c, Spi};
use crate::peripheral::{Mcp23008, Tmp102};
use crate::spi::{SpiBackend, SpiBus};
use crate::tracing::prelude::*;
use crate::uart::{Uart, UartBackend};

/// Every this many temperature reads, write the raw override register.
pub const KICK_INTERVAL: u32 = 10;

/// Low byte written on each kick.
pub const KICK_VALUE: u8 = 0x20;

const EXPANDER_POLL: Duration = Duration::from_millis(20);
const BUTTON_POLL: Duration = Duration::from_millis(5);
const UART_TX_PERIOD: Duration = Duration::from_secs(1);
const UART_RX_TIMEOUT: Duration = Duration::from_millis(200);

/// Longest single sleep, so cancellation is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// JEDEC "read identification" command.
const JEDEC_READ_ID: u8 = 0x9F;

/// What a [`ButtonCounter`] sample did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    /// BTN0 pressed; carries the new count.
    Incremented(u8),
    /// BTN1 pressed.
    Reset,
}

/// Counts BTN0 presses and clears on BTN1.
///
/// Samples are `BTN0 | BTN1` bits with pressed = 1. A change must persist for
/// `debounce` further samples before it counts. Only the press edge acts;
/// holding a button does nothing more.
#[derive(Debug, Clone)]
pub struct ButtonCounter {
    count: u8,
    debounce: u32,
    last_sample: u8,
    repeats: u32,
    stable: u8,
}

impl ButtonCounter {
    pub fn new(debounce: u32) -> Self {
        Self {
            count: 0,
            debounce,
            last_sample: 0,
            repeats: 0,
            stable: 0,
        }
    }

    pub fn count(&self) -> u8 {
        self.count
    }

    /// Feed one sample of pressed bits.
    pub fn update(&mut self, pressed: u8) -> Option<ButtonEvent> {
        let pressed = pressed & (BTN0 | BTN1);
        if pressed == self.last_sample {
            self.repeats = self.repeats.saturating_add(1);
        } else {
            self.repeats = 0;
        }
        self.last_sample = pressed;

        let previous = self.stable;
        if self.repeats >= self.debounce {
            self.stable = pressed;
        }
        let rising = self.stable & !previous;

        let mut event = None;
        if rising & BTN0 != 0 {
            self.count = self.count.saturating_add(1);
            event = Some(ButtonEvent::Incremented(self.count));
        }
        if rising & BTN1 != 0 {
            self.count = 0;
            event = Some(ButtonEvent::Reset);
        }
        event
    }

    /// Feed one raw sample from active-low inputs (pressed = 0).
    pub fn update_active_low(&mut self, raw: u8) -> Option<ButtonEvent> {
        self.update(!raw)
    }
}

/// Sleep for `duration` unless cancelled first. Returns false if cancelled.
pub fn sleep_unless_cancelled(token: &CancellationToken, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if token.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

/// Read the sensor every `period`; write the override register every
/// [`KICK_INTERVAL`] reads.
pub fn temperature_monitor<I: I2c>(
    sensor: Tmp102<I>,
    period: Duration,
    token: CancellationToken,
) {
    if let Err(e) = sensor.probe() {
        warn!(addr = sensor.address(), error = %e, "Temperature sensor not found");
        return;
    }
    info!(
        addr = sensor.address(),
        period_ms = period.as_millis() as u64,
        "Temperature monitor started"
    );

    let mut cycle: u32 = 0;
    while sleep_unless_cancelled(&token, period) {
        cycle = cycle.wrapping_add(1);
        match sensor.read_celsius() {
            Ok(celsius) => info!(celsius, "Temperature"),
            Err(e) => warn!(error = %e, "Temperature read failed"),
        }
        if cycle % KICK_INTERVAL == 0 {
            if let Err(e) = sensor.set_raw_low_byte(KICK_VALUE) {
                debug!(error = %e, "Override write failed");
            }
        }
    }
    info!("Temperature monitor stopped");
}

/// Show a button counter on the expander's outputs.
pub fn expander_counter<I: I2c>(io: Mcp23008<I>, token: CancellationToken) {
    if let Err(e) = io.init() {
        warn!(error = %e, "Expander init failed");
        return;
    }
    info!("Expander counter started (BTN0 = +1, BTN1 = reset)");

    let mut counter = ButtonCounter::new(0);
    while sleep_unless_cancelled(&token, EXPANDER_POLL) {
        let raw = match io.read_inputs() {
            Ok(raw) => raw,
            Err(e) => {
                trace!(error = %e, "Expander read failed");
                continue;
            }
        };
        if let Some(event) = counter.update_active_low(raw) {
            debug!(?event, count = counter.count(), "Expander buttons");
        }
        if let Err(e) = io.write_outputs(counter.count()) {
            trace!(error = %e, "Expander write failed");
        }
    }

    if let Err(e) = io.write_outputs(0) {
        warn!(error = %e, "Failed to clear expander outputs");
    }
    info!("Expander counter stopped");
}

/// Show a button counter on the GPIO LED bank.
pub fn button_mirror<G: Gpio>(gpio: G, token: CancellationToken) {
    let mut counter = ButtonCounter::new(1);
    if let Err(e) = gpio.write_leds(0) {
        warn!(error = %e, "LED write failed");
    }
    info!("Button demo started (BTN0 = +1 up to 255, BTN1 = reset)");

    while sleep_unless_cancelled(&token, BUTTON_POLL) {
        let pressed = match gpio.read_buttons() {
            Ok(bits) => bits,
            Err(e) => {
                trace!(error = %e, "Button read failed");
                continue;
            }
        };
        if let Some(event) = counter.update(pressed) {
            info!(?event, count = counter.count(), "Buttons");
            if let Err(e) = gpio.write_leds(counter.count()) {
                warn!(error = %e, "LED write failed");
            }
        }
    }

    if let Err(e) = gpio.write_leds(0) {
        warn!(error = %e, "Failed to clear LEDs");
    }
    info!("Button demo stopped");
}

/// Log the device configuration and its JEDEC ID.
pub fn spi_info<B: SpiBackend>(bus: &SpiBus<B>) -> Result<[u8; 3]> {
    let info = bus.info();
    info!(
        device = %info.name,
        mode = %info.mode,
        bits = info.bits_per_word,
        speed_hz = info.speed_hz,
        bit_order = ?info.bit_order,
        "SPI device"
    );

    let mut id = [0u8; 3];
    bus.transfer_segments(&[JEDEC_READ_ID], None, 3, Some(&mut id[..]))?;
    info!(
        manufacturer = id[0],
        memory_type = id[1],
        capacity = id[2],
        "JEDEC ID"
    );
    Ok(id)
}

/// Send a line every second and log whatever comes back.
pub fn uart_chatter<B: UartBackend>(uart: &Uart<B>, token: CancellationToken) {
    info!(device = uart.device(), baud = uart.baud(), "UART demo started");
    let mut tick: u32 = 0;
    let mut next_tx = Instant::now();
    let mut buf = [0u8; 128];

    while !token.is_cancelled() {
        if Instant::now() >= next_tx {
            let line = format!("Hello from bushal, tick={}\r\n", tick);
            tick = tick.wrapping_add(1);
            next_tx += UART_TX_PERIOD;
            match uart.write_str(&line) {
                Ok(n) => debug!(bytes = n, "UART TX"),
                Err(e) => warn!(error = %e, "UART write failed"),
            }
        }
        match uart.read(&mut buf, Some(UART_RX_TIMEOUT)) {
            Ok(0) => {}
            Ok(n) => {
                let text = String::from_utf8_lossy(&buf[..n]);
                info!(bytes = n, data = %text.trim_end(), "UART RX");
            }
            Err(e) => {
                warn!(error = %e, "UART read failed");
                if !sleep_unless_cancelled(&token, SLEEP_SLICE) {
                    break;
                }
            }
        }
    }
    info!("UART demo stopped");
}
