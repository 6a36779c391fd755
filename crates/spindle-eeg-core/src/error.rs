//! Error types for the Spindle EEG front-end.
//!
//! All errors work in `no_std` environments and carry enough context for
//! diagnostics without heap allocation. Driver errors are generic over the
//! underlying SPI error so the firmware crate can thread its HAL error
//! type through unchanged.

use core::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Codec Errors
// ============================================================================

/// Errors from the byte-level codecs (COBS decode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodecError {
    /// A zero byte appeared inside an encoded frame
    ZeroInFrame,
    /// A COBS run extended past the end of the input
    TruncatedFrame,
    /// The output buffer was too small for the decoded bytes
    OutputOverflow,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroInFrame => write!(f, "zero byte inside COBS frame"),
            Self::TruncatedFrame => write!(f, "truncated COBS frame"),
            Self::OutputOverflow => write!(f, "decode output buffer too small"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for CodecError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::ZeroInFrame => defmt::write!(f, "zero in COBS frame"),
            Self::TruncatedFrame => defmt::write!(f, "truncated COBS frame"),
            Self::OutputOverflow => defmt::write!(f, "decode overflow"),
        }
    }
}

// ============================================================================
// Protocol Errors
// ============================================================================

/// Errors raised while parsing a raw (COBS-decoded) packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolError {
    /// Packet shorter than the minimum envelope
    TooShort {
        /// Number of bytes received
        length: usize,
    },
    /// CRC over the packet body did not match the trailer
    BadCrc {
        /// CRC computed over the received body
        computed: u16,
        /// CRC carried in the packet trailer
        received: u16,
    },
    /// Unknown packet type byte
    UnknownPacketType {
        /// The type byte that was received
        packet_type: u8,
    },
    /// Protocol version byte not understood
    UnsupportedVersion {
        /// The version byte that was received
        version: u8,
    },
    /// Payload length wrong for the packet type
    BadLength {
        /// The type byte of the packet
        packet_type: u8,
        /// Payload length received
        length: usize,
        /// Payload length expected for this type
        expected: usize,
    },
    /// COBS decode failed before the packet could be parsed
    Codec(CodecError),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { length } => {
                write!(f, "packet too short: {length} bytes")
            }
            Self::BadCrc { computed, received } => {
                write!(f, "CRC mismatch: computed 0x{computed:04X}, received 0x{received:04X}")
            }
            Self::UnknownPacketType { packet_type } => {
                write!(f, "unknown packet type 0x{packet_type:02X}")
            }
            Self::UnsupportedVersion { version } => {
                write!(f, "unsupported protocol version 0x{version:02X}")
            }
            Self::BadLength { packet_type, length, expected } => {
                write!(
                    f,
                    "bad payload length for type 0x{packet_type:02X}: {length} (expected {expected})"
                )
            }
            Self::Codec(e) => write!(f, "codec error: {e}"),
        }
    }
}

impl From<CodecError> for ProtocolError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ProtocolError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::TooShort { length } => defmt::write!(f, "too short: {}", length),
            Self::BadCrc { computed, received } => {
                defmt::write!(f, "CRC: {:04X} != {:04X}", computed, received);
            }
            Self::UnknownPacketType { packet_type } => {
                defmt::write!(f, "bad type: {:02X}", packet_type);
            }
            Self::UnsupportedVersion { version } => {
                defmt::write!(f, "bad version: {:02X}", version);
            }
            Self::BadLength { packet_type, length, expected } => {
                defmt::write!(f, "type {:02X} length {} != {}", packet_type, length, expected);
            }
            Self::Codec(e) => defmt::write!(f, "codec: {}", e),
        }
    }
}

// ============================================================================
// ADS1299 Driver Errors
// ============================================================================

/// Errors from the ADS1299 front-end driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdsError<E> {
    /// SPI communication failure
    Spi(E),
    /// Chip ID read as all-zeros or all-ones (bus stuck or chip absent)
    BadChipId {
        /// The ID value that was read
        id: u8,
    },
    /// Register read-back after configuration did not match
    ReadbackMismatch {
        /// Register address that failed
        register: u8,
        /// Value that was written
        wrote: u8,
        /// Value that was read back
        read: u8,
    },
    /// DRDY did not assert within the timeout
    DrdyTimeout {
        /// Timeout that elapsed, in microseconds
        timeout_us: u32,
    },
}

impl<E: fmt::Debug> fmt::Display for AdsError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spi(e) => write!(f, "SPI communication error: {e:?}"),
            Self::BadChipId { id } => {
                write!(f, "bad chip ID 0x{id:02X} (bus stuck or chip absent)")
            }
            Self::ReadbackMismatch { register, wrote, read } => {
                write!(
                    f,
                    "readback mismatch: register 0x{register:02X} wrote 0x{wrote:02X}, read 0x{read:02X}"
                )
            }
            Self::DrdyTimeout { timeout_us } => {
                write!(f, "DRDY timeout after {timeout_us}us")
            }
        }
    }
}

#[cfg(feature = "defmt")]
impl<E: defmt::Format> defmt::Format for AdsError<E> {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Spi(e) => defmt::write!(f, "SPI error: {}", e),
            Self::BadChipId { id } => defmt::write!(f, "bad chip ID {:02X}", id),
            Self::ReadbackMismatch { register, wrote, read } => {
                defmt::write!(f, "reg {:02X}: wrote {:02X} read {:02X}", register, wrote, read);
            }
            Self::DrdyTimeout { timeout_us } => {
                defmt::write!(f, "DRDY timeout {}us", timeout_us);
            }
        }
    }
}
