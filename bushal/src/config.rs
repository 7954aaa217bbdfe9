//! Configuration for the demo daemon.
//!
//! Everything comes from environment variables. Unset variables take their
//! defaults; unparsable ones are logged and also take their defaults, so a
//! typo never stops the daemon from starting.

use std::env;
use std::time::Duration;

use crate::gpio::GpioConfig;
use crate::i2c::mock::MOCK_ADDRESS;
use crate::spi::{SpiConfig, SpiMode};
use crate::tracing::prelude::*;
use crate::uart::UartConfig;

const DEFAULT_I2C_BUS: &str = "/dev/i2c-1";
const MOCK_I2C_BUS: &str = "mock-bus-0";
const DEFAULT_PERIOD_MS: u64 = 1000;
const MIN_PERIOD_MS: u64 = 50;
const MAX_PERIOD_MS: u64 = 60_000;

/// Which backend family the demos run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Software backends; no hardware needed.
    Mock,
    /// Kernel device nodes.
    Linux,
}

/// Demo daemon configuration parsed from environment variables.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub backend: Backend,

    /// I2C bus shared by the temperature and expander demos.
    pub i2c_bus: String,

    pub temp_addr: u8,

    /// Temperature read interval.
    pub temp_period: Duration,

    /// Expander address; `None` disables the expander demo.
    pub expander_addr: Option<u8>,

    /// `None` disables the button demo.
    pub gpio: Option<GpioConfig>,

    /// `None` disables the SPI info demo.
    pub spi: Option<SpiConfig>,

    /// `None` disables the UART demo.
    pub uart: Option<UartConfig>,
}

impl DemoConfig {
    /// Parse configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BUSHAL_BACKEND`: `mock` (default) or `linux`
    /// - `BUSHAL_I2C_BUS`: I2C bus (default `/dev/i2c-1`, `mock-bus-0` for mock)
    /// - `BUSHAL_TEMP_ADDR`: sensor address (default 0x48)
    /// - `BUSHAL_TEMP_PERIOD_MS`: read period (default 1000, clamped to 50-60000)
    /// - `BUSHAL_EXPANDER_ADDR`: expander address (presence enables the demo)
    /// - `BUSHAL_GPIO_CHIP`: GPIO chip (presence enables the demo)
    /// - `BUSHAL_GPIO_LED_BASE`, `BUSHAL_GPIO_LED_COUNT`: LED lines (default 0, 8)
    /// - `BUSHAL_GPIO_BTN0`, `BUSHAL_GPIO_BTN1`: button lines (default 8, 9)
    /// - `BUSHAL_GPIO_ACTIVE_LOW`: comma list of `leds`, `btns`
    /// - `BUSHAL_SPI_DEV`: spidev node (presence enables the demo)
    /// - `BUSHAL_SPI_SPEED_HZ`: clock (default 1000000)
    /// - `BUSHAL_SPI_MODE`: 0-3 (default 0)
    /// - `BUSHAL_UART_DEV`: tty (presence enables the demo)
    /// - `BUSHAL_UART_BAUD`: baud rate (default 115200)
    ///
    /// Addresses accept `0x`-prefixed hex or decimal.
    pub fn from_env() -> Self {
        let backend = match env::var("BUSHAL_BACKEND").as_deref() {
            Ok("linux") => Backend::Linux,
            Ok("mock") | Err(_) => Backend::Mock,
            Ok(other) => {
                warn!(value = other, "Unknown BUSHAL_BACKEND, using mock");
                Backend::Mock
            }
        };

        let i2c_bus = env::var("BUSHAL_I2C_BUS").unwrap_or_else(|_| match backend {
            Backend::Mock => MOCK_I2C_BUS.to_string(),
            Backend::Linux => DEFAULT_I2C_BUS.to_string(),
        });

        let temp_period_ms = parsed("BUSHAL_TEMP_PERIOD_MS", parse_number::<u64>)
            .unwrap_or(DEFAULT_PERIOD_MS)
            .clamp(MIN_PERIOD_MS, MAX_PERIOD_MS);

        let gpio = env::var("BUSHAL_GPIO_CHIP").ok().map(|chip| {
            let defaults = GpioConfig::new(chip);
            let active_low = env::var("BUSHAL_GPIO_ACTIVE_LOW").unwrap_or_default();
            let flags: Vec<&str> = active_low.split(',').map(str::trim).collect();
            GpioConfig {
                led_base: parsed("BUSHAL_GPIO_LED_BASE", parse_number)
                    .unwrap_or(defaults.led_base),
                led_count: parsed("BUSHAL_GPIO_LED_COUNT", parse_number)
                    .unwrap_or(defaults.led_count),
                btn0_offset: parsed("BUSHAL_GPIO_BTN0", parse_number)
                    .unwrap_or(defaults.btn0_offset),
                btn1_offset: parsed("BUSHAL_GPIO_BTN1", parse_number)
                    .unwrap_or(defaults.btn1_offset),
                leds_active_low: flags.contains(&"leds"),
                btns_active_low: flags.contains(&"btns"),
                ..defaults
            }
        });

        let spi = env::var("BUSHAL_SPI_DEV").ok().map(|device| {
            let defaults = SpiConfig::new(device);
            let mode = parsed("BUSHAL_SPI_MODE", |s| {
                parse_number::<u8>(s).and_then(|m| SpiMode::try_from(m).ok())
            })
            .unwrap_or(defaults.mode);
            SpiConfig {
                mode,
                max_speed_hz: parsed("BUSHAL_SPI_SPEED_HZ", parse_number)
                    .unwrap_or(defaults.max_speed_hz),
                ..defaults
            }
        });

        let uart = env::var("BUSHAL_UART_DEV").ok().map(|device| {
            let defaults = UartConfig::new(device);
            UartConfig {
                baud: parsed("BUSHAL_UART_BAUD", parse_number).unwrap_or(defaults.baud),
                ..defaults
            }
        });

        Self {
            backend,
            i2c_bus,
            temp_addr: parsed("BUSHAL_TEMP_ADDR", parse_number).unwrap_or(MOCK_ADDRESS),
            temp_period: Duration::from_millis(temp_period_ms),
            expander_addr: parsed("BUSHAL_EXPANDER_ADDR", parse_number),
            gpio,
            spi,
            uart,
        }
    }
}

/// Read `var` and parse it, warning about values that do not parse.
fn parsed<T>(var: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    let value = env::var(var).ok()?;
    let result = parse(value.trim());
    if result.is_none() {
        warn!(var, value = %value, "Ignoring unparsable value");
    }
    result
}

/// Parse `0x`-prefixed hex or plain decimal.
fn parse_number<T>(s: &str) -> Option<T>
where
    T: TryFrom<u64>,
{
    let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok()?,
        None => s.parse::<u64>().ok()?,
    };
    T::try_from(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "BUSHAL_BACKEND",
        "BUSHAL_I2C_BUS",
        "BUSHAL_TEMP_ADDR",
        "BUSHAL_TEMP_PERIOD_MS",
        "BUSHAL_EXPANDER_ADDR",
        "BUSHAL_GPIO_CHIP",
        "BUSHAL_GPIO_LED_BASE",
        "BUSHAL_GPIO_LED_COUNT",
        "BUSHAL_GPIO_BTN0",
        "BUSHAL_GPIO_BTN1",
        "BUSHAL_GPIO_ACTIVE_LOW",
        "BUSHAL_SPI_DEV",
        "BUSHAL_SPI_SPEED_HZ",
        "BUSHAL_SPI_MODE",
        "BUSHAL_UART_DEV",
        "BUSHAL_UART_BAUD",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number::<u8>("0x48"), Some(0x48));
        assert_eq!(parse_number::<u8>("0X2a"), Some(0x2a));
        assert_eq!(parse_number::<u8>("32"), Some(32));
        assert_eq!(parse_number::<u8>("0x100"), None);
        assert_eq!(parse_number::<u8>("-1"), None);
        assert_eq!(parse_number::<u32>("1000000"), Some(1_000_000));
        assert_eq!(parse_number::<u8>("0x"), None);
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = DemoConfig::from_env();
        assert_eq!(config.backend, Backend::Mock);
        assert_eq!(config.i2c_bus, MOCK_I2C_BUS);
        assert_eq!(config.temp_addr, 0x48);
        assert_eq!(config.temp_period, Duration::from_millis(1000));
        assert!(config.expander_addr.is_none());
        assert!(config.gpio.is_none());
        assert!(config.spi.is_none());
        assert!(config.uart.is_none());
    }

    #[test]
    #[serial]
    fn test_linux_backend_uses_real_bus() {
        clear_env();
        env::set_var("BUSHAL_BACKEND", "linux");
        let config = DemoConfig::from_env();
        assert_eq!(config.backend, Backend::Linux);
        assert_eq!(config.i2c_bus, DEFAULT_I2C_BUS);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_period_clamped() {
        clear_env();
        env::set_var("BUSHAL_TEMP_PERIOD_MS", "5");
        assert_eq!(DemoConfig::from_env().temp_period, Duration::from_millis(50));
        env::set_var("BUSHAL_TEMP_PERIOD_MS", "999999");
        assert_eq!(
            DemoConfig::from_env().temp_period,
            Duration::from_millis(60_000)
        );
        env::set_var("BUSHAL_TEMP_PERIOD_MS", "soon");
        assert_eq!(
            DemoConfig::from_env().temp_period,
            Duration::from_millis(1000)
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_gpio_settings() {
        clear_env();
        env::set_var("BUSHAL_GPIO_CHIP", "gpiochip2");
        env::set_var("BUSHAL_GPIO_LED_BASE", "32");
        env::set_var("BUSHAL_GPIO_LED_COUNT", "4");
        env::set_var("BUSHAL_GPIO_BTN1", "0x30");
        env::set_var("BUSHAL_GPIO_ACTIVE_LOW", "btns");
        let gpio = DemoConfig::from_env().gpio.unwrap();
        assert_eq!(gpio.chip, "gpiochip2");
        assert_eq!(gpio.led_base, 32);
        assert_eq!(gpio.led_count, 4);
        assert_eq!(gpio.btn0_offset, 8);
        assert_eq!(gpio.btn1_offset, 0x30);
        assert!(!gpio.leds_active_low);
        assert!(gpio.btns_active_low);

        env::set_var("BUSHAL_GPIO_ACTIVE_LOW", "leds, btns");
        let gpio = DemoConfig::from_env().gpio.unwrap();
        assert!(gpio.leds_active_low && gpio.btns_active_low);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_spi_and_expander() {
        clear_env();
        env::set_var("BUSHAL_SPI_DEV", "/dev/spidev1.0");
        env::set_var("BUSHAL_SPI_MODE", "3");
        env::set_var("BUSHAL_SPI_SPEED_HZ", "500000");
        env::set_var("BUSHAL_EXPANDER_ADDR", "0x21");
        let config = DemoConfig::from_env();
        let spi = config.spi.unwrap();
        assert_eq!(spi.device, "/dev/spidev1.0");
        assert_eq!(spi.mode, SpiMode::Mode3);
        assert_eq!(spi.max_speed_hz, 500_000);
        assert_eq!(config.expander_addr, Some(0x21));

        env::set_var("BUSHAL_SPI_MODE", "7");
        assert_eq!(DemoConfig::from_env().spi.unwrap().mode, SpiMode::Mode0);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_uart_settings() {
        clear_env();
        env::set_var("BUSHAL_UART_DEV", "/dev/ttyUSB0");
        let uart = DemoConfig::from_env().uart.unwrap();
        assert_eq!(uart.device, "/dev/ttyUSB0");
        assert_eq!(uart.baud, 115_200);

        env::set_var("BUSHAL_UART_BAUD", "9600");
        assert_eq!(DemoConfig::from_env().uart.unwrap().baud, 9600);
        clear_env();
    }
}
