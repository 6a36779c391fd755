//! Spindle EEG Firmware - 4-channel ADS1299 acquisition core
//!
//! This crate contains the hardware-facing half of the Spindle EEG
//! front-end: the ADS1299 driver, the serial command console, and the
//! cooperative device supervisor that ties acquisition, framing, and
//! transmit draining together. Everything is generic over `embedded-hal`
//! traits plus three small seam traits ([`hal::Micros`], [`hal::SerialIo`],
//! [`hal::Watchdog`]), so the same logic runs on target hardware and in
//! host tests against mock peripherals.
//!
//! # Wiring
//!
//! The platform crate owns pins, SPI, the timer, and the DRDY interrupt.
//! A minimal setup looks like:
//!
//! ```ignore
//! static DRDY: SharedDrdy = SharedDrdy::new();
//!
//! // DRDY falling-edge ISR, registered by the platform:
//! fn drdy_isr() {
//!     DRDY.on_edge(timer::now_us());
//! }
//!
//! fn main() -> ! {
//!     let ads = Ads1299::new(spi, reset_pin, start_pin, drdy_pin, Delay);
//!     let mut device = Device::new(
//!         ads, &DRDY, serial, button_pin, led_pin, clock, watchdog,
//!         DeviceConfig::default(),
//!     );
//!     device.boot();
//!     loop {
//!         device.tick();
//!     }
//! }
//! ```
//!
//! # Bus configuration
//!
//! The ADS1299 expects SPI mode 1, MSB-first, at 1 MHz; the serial link
//! runs at 921600 baud 8N1. Both are configured by the platform when it
//! constructs the peripherals handed to [`device::Device`].

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod ads1299;
pub mod console;
pub mod device;
pub mod hal;

pub use ads1299::{Ads1299, SelfTestReport};
pub use console::{Command, LineBuffer, LineEvent};
pub use device::{Device, DeviceConfig, OutputMode};
pub use hal::{Micros, NoWatchdog, SerialIo, Watchdog};
