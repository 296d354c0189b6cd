use std::path::Path;
use std::time::Duration;

use anyhow::Error;
use pi_pinout::{GpioPin, PhysicalPin, WiringPiPin};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct Config {
    pub pins: Pins,
    pub display: DisplayConfig,
    pub network: NetworkConfig,
    pub timeouts: Timeouts,
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct Pins {
    pub encoder_a: Pin,
    pub encoder_b: Pin,
    pub encoder_button: Pin,
    pub start_switch: Pin,
    pub stop_switch: Pin,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub enum Pin {
    Physical(PhysicalPin),
    Gpio(GpioPin),
    WiringPi(WiringPiPin),
}

impl Pin {
    /// BCM number as used by the GPIO peripheral.
    pub fn bcm(&self) -> u8 {
        let pin: GpioPin = match *self {
            Pin::Physical(pin) => pin.into(),
            Pin::Gpio(pin) => pin,
            Pin::WiringPi(pin) => pin.into(),
        };
        pin.0
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct DisplayConfig {
    /// Characters that fit on one display line
    pub line_width: usize,
    /// Scroll animation step interval in milliseconds
    pub scroll_tick_ms: u64,
}

impl DisplayConfig {
    pub fn scroll_tick(&self) -> Duration {
        Duration::from_millis(self.scroll_tick_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct NetworkConfig {
    pub hostname_prefix: String,
    pub interface_prefix: String,
    pub ssid_prefix: String,
    pub passphrase: String,
}

/// Per-operation budgets for the external network tool. Every command the
/// controller issues is bounded by one of these.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Timeouts {
    pub discover_secs: u64,
    pub hostname_secs: u64,
    pub rescan_secs: u64,
    pub list_secs: u64,
    pub connect_secs: u64,
    pub disconnect_secs: u64,
    pub ip_grace_secs: u64,
}

impl Timeouts {
    pub fn discover(&self) -> Duration {
        Duration::from_secs(self.discover_secs)
    }

    pub fn hostname(&self) -> Duration {
        Duration::from_secs(self.hostname_secs)
    }

    pub fn rescan(&self) -> Duration {
        Duration::from_secs(self.rescan_secs)
    }

    pub fn list(&self) -> Duration {
        Duration::from_secs(self.list_secs)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn disconnect(&self) -> Duration {
        Duration::from_secs(self.disconnect_secs)
    }

    pub fn ip_grace(&self) -> Duration {
        Duration::from_secs(self.ip_grace_secs)
    }
}

impl Config {
    pub fn load() -> Result<Config, Error> {
        Config::load_from("config.ron")
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Config, Error> {
        let config = std::fs::read_to_string(path)?;
        let config: Config = ron::from_str(&config)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            pins: Pins {
                encoder_a: Pin::Gpio(GpioPin(17)),
                encoder_b: Pin::Gpio(GpioPin(18)),
                encoder_button: Pin::Gpio(GpioPin(27)),
                start_switch: Pin::Gpio(GpioPin(16)),
                stop_switch: Pin::Gpio(GpioPin(26)),
            },
            display: DisplayConfig {
                line_width: 16,
                scroll_tick_ms: 300,
            },
            network: NetworkConfig {
                hostname_prefix: "RPi0-".to_string(),
                interface_prefix: "wlx".to_string(),
                ssid_prefix: "QW-".to_string(),
                passphrase: "password".to_string(),
            },
            timeouts: Timeouts {
                discover_secs: 10,
                hostname_secs: 10,
                rescan_secs: 15,
                list_secs: 10,
                connect_secs: 45,
                disconnect_secs: 10,
                ip_grace_secs: 3,
            },
        }
    }
}
