//! Spindle EEG Core - `no_std` types and wire format
//!
//! This crate provides the hardware-independent half of the Spindle EEG
//! front-end firmware: the binary wire protocol, byte codecs, the bounded
//! transmit ring, and the DRDY edge accounting shared with the interrupt
//! handler. It is designed to work in `no_std` environments (the firmware
//! itself) as well as `std` environments (host-side decoders and tests).
//!
//! # Modules
//!
//! - [`codec`]: Little-endian packing, 24-bit sign extension, CRC-16, COBS
//! - [`frame`]: Raw ADS1299 data frame parsing, status word, signal scaling
//! - [`protocol`]: Packet building/parsing and the framing layer
//! - [`ring`]: Bounded byte FIFO between the framer and the serial drainer
//! - [`drdy`]: Interrupt-side DRDY edge tracker with snapshot capture
//! - [`error`]: Error types for codecs, protocol, and the ADS driver
//!
//! # Features
//!
//! - `defmt`: Enable `defmt` formatting for embedded logging
//!
//! # Example
//!
//! ```rust
//! use spindle_eeg_core::protocol::{Framer, SampleBody};
//! use spindle_eeg_core::ring::TxRing;
//!
//! let mut ring: TxRing<256> = TxRing::new();
//! let mut framer = Framer::new();
//!
//! let body = SampleBody {
//!     t_us: 4000,
//!     status24: 0xC0_0000,
//!     channels: [1, -2, 3, -4],
//!     flags: 0x01,
//!     missed_drdy_frame: 0,
//!     recoveries_total: 0,
//! };
//! assert!(framer.emit_sample(&mut ring, &body));
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

#[cfg(test)]
extern crate std;

pub mod codec;
pub mod drdy;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod ring;

// Re-export commonly used types at crate root
pub use drdy::{DrdySnapshot, DrdyStats, SharedDrdy};
pub use error::{AdsError, CodecError, ProtocolError};
pub use frame::{SampleFrame, SignalScale, StatusWord};
pub use protocol::{Framer, Packet, PacketType, SampleRecord};
pub use ring::{SerialSink, TxRing};
