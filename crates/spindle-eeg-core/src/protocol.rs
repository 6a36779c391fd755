//! Wire protocol between the front-end and the host.
//!
//! Every outbound packet shares one envelope:
//!
//! ```text
//! [type:1] [version:1] [payload:N] [crc16_le:2]
//! ```
//!
//! with CRC-16/CCITT-FALSE computed over `type..payload`. The raw packet is
//! then COBS-encoded and terminated with a single `0x00` on the wire, so a
//! receiver can resynchronize after arbitrary loss by scanning for the
//! delimiter. All multi-byte integers are little-endian.

use serde::{Deserialize, Serialize};

use crate::codec::{
    cobs_encode, cobs_max_encoded_len, crc16_ccitt_false, pack_i32_le, pack_u16_le, pack_u32_le,
};
use crate::error::ProtocolError;
use crate::frame::NUM_CHANNELS;
use crate::ring::TxRing;

/// Protocol version carried in every packet.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Largest raw packet the framer ever builds (the sample packet, 40 bytes,
/// rounded up to leave headroom for future payload growth).
pub const MAX_RAW_PACKET_LEN: usize = 64;

/// Largest COBS-encoded frame, including the `0x00` delimiter.
pub const MAX_WIRE_FRAME_LEN: usize = cobs_max_encoded_len(MAX_RAW_PACKET_LEN) + 1;

/// Raw length of a sample packet: envelope + 10 little-endian words.
pub const SAMPLE_PACKET_LEN: usize = 2 + 4 * 10 + 2;

/// Raw length of an event packet: envelope + code + 3 words.
pub const EVENT_PACKET_LEN: usize = 2 + 1 + 4 * 3 + 2;

/// Raw length of an error packet: envelope + code + 2 words.
pub const ERROR_PACKET_LEN: usize = 2 + 1 + 4 * 2 + 2;

// ============================================================================
// Packet Types and Codes
// ============================================================================

/// Packet type identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PacketType {
    /// One acquisition sample
    Sample = 0x01,
    /// Event/status notification
    Event = 0x02,
    /// Error notification
    Error = 0x7F,
}

impl PacketType {
    /// Try to convert a byte to a packet type.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Sample),
            0x02 => Some(Self::Event),
            0x7F => Some(Self::Error),
            _ => None,
        }
    }
}

/// Event codes carried in [`PacketType::Event`] packets.
pub mod event_code {
    /// Stream state change; `a` = 1 when streaming started, 0 when stopped
    pub const STREAM_STATE: u8 = 0x01;
    /// ADS init succeeded; `a` = chip ID, `b` = attempt number
    pub const INIT_OK: u8 = 0x10;
    /// Self-test finished; `a` = pass flag, `b` = good frames, `c` = bad
    /// status headers
    pub const SELF_TEST: u8 = 0x30;
}

/// Error codes carried in [`PacketType::Error`] packets.
pub mod error_code {
    /// ADS init failed after all retries
    pub const INIT_FAILED: u8 = 0xE1;
    /// A 15-byte frame read failed mid-stream
    pub const FRAME_READ_FAILED: u8 = 0xE2;
    /// DRDY stalled; `a` = current micros, `b` = recoveries so far
    pub const DRDY_TIMEOUT: u8 = 0xE3;
}

// ============================================================================
// Packet Bodies
// ============================================================================

/// Decoded contents of a sample packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SampleRecord {
    /// Monotonic sample counter (wraps at `u32::MAX`)
    pub sample_index: u32,
    /// DRDY timestamp in microseconds (processing time if DRDY was zero)
    pub t_us: u32,
    /// Raw 24-bit status word
    pub status24: u32,
    /// Channel samples in ADC counts
    pub channels: [i32; NUM_CHANNELS],
    /// Per-sample flag bits (see [`crate::frame::sample_flags`])
    pub flags: u32,
    /// DRDY edges missed since the previous consumed sample
    pub missed_drdy_frame: u32,
    /// Total successful recoveries since boot
    pub recoveries_total: u32,
}

/// Sample fields supplied by the pipeline; the framer assigns the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleBody {
    /// DRDY timestamp in microseconds
    pub t_us: u32,
    /// Raw 24-bit status word
    pub status24: u32,
    /// Channel samples in ADC counts
    pub channels: [i32; NUM_CHANNELS],
    /// Per-sample flag bits
    pub flags: u32,
    /// DRDY edges missed since the previous consumed sample
    pub missed_drdy_frame: u32,
    /// Total successful recoveries since boot
    pub recoveries_total: u32,
}

/// A parsed packet of any type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Packet {
    /// One acquisition sample
    Sample(SampleRecord),
    /// Event/status notification
    Event {
        /// Event code (see [`event_code`])
        code: u8,
        /// First argument
        a: u32,
        /// Second argument
        b: u32,
        /// Third argument
        c: u32,
    },
    /// Error notification
    Error {
        /// Error code (see [`error_code`])
        code: u8,
        /// First argument
        a: u32,
        /// Second argument
        b: u32,
    },
}

// ============================================================================
// Raw Packet Builders
// ============================================================================

fn finish_packet(buf: &mut [u8], len: usize) -> usize {
    let crc = crc16_ccitt_false(&buf[..len]);
    pack_u16_le(&mut buf[len..], crc);
    len + 2
}

/// Serialize a sample packet into `buf`, returning the raw length.
///
/// # Panics
///
/// Panics if `buf` is shorter than [`SAMPLE_PACKET_LEN`].
pub fn build_sample_packet(buf: &mut [u8], record: &SampleRecord) -> usize {
    let mut idx = 0;
    buf[idx] = PacketType::Sample as u8;
    idx += 1;
    buf[idx] = PROTOCOL_VERSION;
    idx += 1;

    pack_u32_le(&mut buf[idx..], record.sample_index);
    idx += 4;
    pack_u32_le(&mut buf[idx..], record.t_us);
    idx += 4;
    pack_u32_le(&mut buf[idx..], record.status24);
    idx += 4;
    for &ch in &record.channels {
        pack_i32_le(&mut buf[idx..], ch);
        idx += 4;
    }
    pack_u32_le(&mut buf[idx..], record.flags);
    idx += 4;
    pack_u32_le(&mut buf[idx..], record.missed_drdy_frame);
    idx += 4;
    pack_u32_le(&mut buf[idx..], record.recoveries_total);
    idx += 4;

    finish_packet(buf, idx)
}

/// Serialize an event packet into `buf`, returning the raw length.
///
/// # Panics
///
/// Panics if `buf` is shorter than [`EVENT_PACKET_LEN`].
pub fn build_event_packet(buf: &mut [u8], code: u8, a: u32, b: u32, c: u32) -> usize {
    let mut idx = 0;
    buf[idx] = PacketType::Event as u8;
    idx += 1;
    buf[idx] = PROTOCOL_VERSION;
    idx += 1;
    buf[idx] = code;
    idx += 1;
    pack_u32_le(&mut buf[idx..], a);
    idx += 4;
    pack_u32_le(&mut buf[idx..], b);
    idx += 4;
    pack_u32_le(&mut buf[idx..], c);
    idx += 4;

    finish_packet(buf, idx)
}

/// Serialize an error packet into `buf`, returning the raw length.
///
/// # Panics
///
/// Panics if `buf` is shorter than [`ERROR_PACKET_LEN`].
pub fn build_error_packet(buf: &mut [u8], code: u8, a: u32, b: u32) -> usize {
    let mut idx = 0;
    buf[idx] = PacketType::Error as u8;
    idx += 1;
    buf[idx] = PROTOCOL_VERSION;
    idx += 1;
    buf[idx] = code;
    idx += 1;
    pack_u32_le(&mut buf[idx..], a);
    idx += 4;
    pack_u32_le(&mut buf[idx..], b);
    idx += 4;

    finish_packet(buf, idx)
}

// ============================================================================
// Packet Parser
// ============================================================================

fn read_u32_le(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}

/// Parse a raw (COBS-decoded) packet.
///
/// Verifies the CRC trailer, version, type, and payload length, and
/// returns the typed contents. This is the host-side twin of the build
/// functions and backs the round-trip tests.
///
/// # Errors
///
/// Returns a [`ProtocolError`] describing the first check that failed.
pub fn parse_packet(raw: &[u8]) -> Result<Packet, ProtocolError> {
    if raw.len() < 4 {
        return Err(ProtocolError::TooShort { length: raw.len() });
    }

    let body = &raw[..raw.len() - 2];
    let received = u16::from_le_bytes([raw[raw.len() - 2], raw[raw.len() - 1]]);
    let computed = crc16_ccitt_false(body);
    if computed != received {
        return Err(ProtocolError::BadCrc { computed, received });
    }

    let packet_type = PacketType::from_byte(raw[0])
        .ok_or(ProtocolError::UnknownPacketType { packet_type: raw[0] })?;
    let version = raw[1];
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion { version });
    }

    let payload = &body[2..];
    match packet_type {
        PacketType::Sample => {
            let expected = SAMPLE_PACKET_LEN - 4;
            if payload.len() != expected {
                return Err(ProtocolError::BadLength {
                    packet_type: raw[0],
                    length: payload.len(),
                    expected,
                });
            }
            let mut channels = [0i32; NUM_CHANNELS];
            for (ch, value) in channels.iter_mut().enumerate() {
                *value = read_u32_le(&payload[12 + ch * 4..]) as i32;
            }
            Ok(Packet::Sample(SampleRecord {
                sample_index: read_u32_le(payload),
                t_us: read_u32_le(&payload[4..]),
                status24: read_u32_le(&payload[8..]),
                channels,
                flags: read_u32_le(&payload[28..]),
                missed_drdy_frame: read_u32_le(&payload[32..]),
                recoveries_total: read_u32_le(&payload[36..]),
            }))
        }
        PacketType::Event => {
            let expected = EVENT_PACKET_LEN - 4;
            if payload.len() != expected {
                return Err(ProtocolError::BadLength {
                    packet_type: raw[0],
                    length: payload.len(),
                    expected,
                });
            }
            Ok(Packet::Event {
                code: payload[0],
                a: read_u32_le(&payload[1..]),
                b: read_u32_le(&payload[5..]),
                c: read_u32_le(&payload[9..]),
            })
        }
        PacketType::Error => {
            let expected = ERROR_PACKET_LEN - 4;
            if payload.len() != expected {
                return Err(ProtocolError::BadLength {
                    packet_type: raw[0],
                    length: payload.len(),
                    expected,
                });
            }
            Ok(Packet::Error {
                code: payload[0],
                a: read_u32_le(&payload[1..]),
                b: read_u32_le(&payload[5..]),
            })
        }
    }
}

// ============================================================================
// Framer
// ============================================================================

/// The framing layer: builds raw packets, COBS-encodes them, and admits
/// the encoded frame plus delimiter to the transmit ring as one atomic
/// transaction.
///
/// Owns the `sample_index` counter. The counter advances on every sample
/// emission attempt, whether or not the ring accepted the packet and
/// regardless of output mode; the CSV debug path draws row indices from
/// the same counter so the stream keeps a single identity.
#[derive(Debug, Default)]
pub struct Framer {
    sample_index: u32,
}

impl Framer {
    /// Create a framer with the index at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self { sample_index: 0 }
    }

    /// Current value of the sample counter.
    #[must_use]
    pub const fn sample_index(&self) -> u32 {
        self.sample_index
    }

    /// Zero the sample counter (stream start).
    pub fn reset_index(&mut self) {
        self.sample_index = 0;
    }

    /// Claim the next sample index (CSV rows share the counter).
    pub fn next_sample_index(&mut self) -> u32 {
        let index = self.sample_index;
        self.sample_index = self.sample_index.wrapping_add(1);
        index
    }

    /// Build and enqueue a sample packet. Returns false if the ring
    /// dropped it.
    pub fn emit_sample<const N: usize>(&mut self, ring: &mut TxRing<N>, body: &SampleBody) -> bool {
        let record = SampleRecord {
            sample_index: self.next_sample_index(),
            t_us: body.t_us,
            status24: body.status24,
            channels: body.channels,
            flags: body.flags,
            missed_drdy_frame: body.missed_drdy_frame,
            recoveries_total: body.recoveries_total,
        };
        let mut raw = [0u8; MAX_RAW_PACKET_LEN];
        let len = build_sample_packet(&mut raw, &record);
        Self::emit_raw(ring, &raw[..len])
    }

    /// Build and enqueue an event packet.
    pub fn emit_event<const N: usize>(
        &mut self,
        ring: &mut TxRing<N>,
        code: u8,
        a: u32,
        b: u32,
        c: u32,
    ) -> bool {
        let mut raw = [0u8; MAX_RAW_PACKET_LEN];
        let len = build_event_packet(&mut raw, code, a, b, c);
        Self::emit_raw(ring, &raw[..len])
    }

    /// Build and enqueue an error packet.
    pub fn emit_error<const N: usize>(
        &mut self,
        ring: &mut TxRing<N>,
        code: u8,
        a: u32,
        b: u32,
    ) -> bool {
        let mut raw = [0u8; MAX_RAW_PACKET_LEN];
        let len = build_error_packet(&mut raw, code, a, b);
        Self::emit_raw(ring, &raw[..len])
    }

    fn emit_raw<const N: usize>(ring: &mut TxRing<N>, raw: &[u8]) -> bool {
        let mut encoded = [0u8; MAX_WIRE_FRAME_LEN];
        let len = cobs_encode(raw, &mut encoded);
        ring.write_frame(&encoded[..len])
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::cobs_decode;
    use crate::ring::TxRing;

    fn sample_record() -> SampleRecord {
        SampleRecord {
            sample_index: 7,
            t_us: 123_456,
            status24: 0xC0_0102,
            channels: [1, -1, 8_388_607, -8_388_608],
            flags: 0x21,
            missed_drdy_frame: 2,
            recoveries_total: 3,
        }
    }

    #[test]
    fn test_sample_packet_roundtrip() {
        let record = sample_record();
        let mut raw = [0u8; MAX_RAW_PACKET_LEN];
        let len = build_sample_packet(&mut raw, &record);

        assert_eq!(len, SAMPLE_PACKET_LEN);
        assert_eq!(parse_packet(&raw[..len]), Ok(Packet::Sample(record)));
    }

    #[test]
    fn test_event_packet_roundtrip() {
        let mut raw = [0u8; MAX_RAW_PACKET_LEN];
        let len = build_event_packet(&mut raw, event_code::INIT_OK, 0x3E, 2, 0);

        assert_eq!(len, EVENT_PACKET_LEN);
        assert_eq!(
            parse_packet(&raw[..len]),
            Ok(Packet::Event { code: event_code::INIT_OK, a: 0x3E, b: 2, c: 0 })
        );
    }

    #[test]
    fn test_error_packet_roundtrip() {
        let mut raw = [0u8; MAX_RAW_PACKET_LEN];
        let len = build_error_packet(&mut raw, error_code::DRDY_TIMEOUT, 99, 1);

        assert_eq!(len, ERROR_PACKET_LEN);
        assert_eq!(
            parse_packet(&raw[..len]),
            Ok(Packet::Error { code: error_code::DRDY_TIMEOUT, a: 99, b: 1 })
        );
    }

    #[test]
    fn test_parse_rejects_corruption() {
        let mut raw = [0u8; MAX_RAW_PACKET_LEN];
        let len = build_event_packet(&mut raw, event_code::STREAM_STATE, 1, 0, 0);

        raw[3] ^= 0x40;
        assert!(matches!(
            parse_packet(&raw[..len]),
            Err(ProtocolError::BadCrc { .. })
        ));

        assert!(matches!(
            parse_packet(&[0x02]),
            Err(ProtocolError::TooShort { .. })
        ));
    }

    #[test]
    fn test_sample_payload_is_little_endian() {
        let record = sample_record();
        let mut raw = [0u8; MAX_RAW_PACKET_LEN];
        build_sample_packet(&mut raw, &record);

        assert_eq!(raw[0], 0x01);
        assert_eq!(raw[1], PROTOCOL_VERSION);
        // sample_index = 7, LSB first
        assert_eq!(&raw[2..6], &[7, 0, 0, 0]);
        // ch2 = -1
        assert_eq!(&raw[18..22], &[0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_framer_increments_index_even_when_ring_drops() {
        // Ring too small for any sample packet: every emit drops.
        let mut ring: TxRing<16> = TxRing::new();
        let mut framer = Framer::new();
        let body = SampleBody {
            t_us: 0,
            status24: 0,
            channels: [0; 4],
            flags: 0,
            missed_drdy_frame: 0,
            recoveries_total: 0,
        };

        assert!(!framer.emit_sample(&mut ring, &body));
        assert!(!framer.emit_sample(&mut ring, &body));
        assert_eq!(framer.sample_index(), 2);
    }

    #[test]
    fn test_emitted_frame_decodes_and_crc_checks() {
        let mut ring: TxRing<256> = TxRing::new();
        let mut framer = Framer::new();
        let body = SampleBody {
            t_us: 4000,
            status24: 0xC0_0000,
            channels: [10, 20, 30, 40],
            flags: 0x01,
            missed_drdy_frame: 0,
            recoveries_total: 0,
        };
        assert!(framer.emit_sample(&mut ring, &body));

        // Drain the ring and strip the delimiter.
        let mut sink = crate::ring::tests_support::VecSink::unlimited();
        ring.service(&mut sink);
        let wire = sink.bytes();
        assert_eq!(*wire.last().unwrap(), 0x00);
        assert!(wire[..wire.len() - 1].iter().all(|&b| b != 0));

        let mut raw = [0u8; MAX_RAW_PACKET_LEN];
        let len = cobs_decode(&wire[..wire.len() - 1], &mut raw).unwrap();
        match parse_packet(&raw[..len]) {
            Ok(Packet::Sample(record)) => {
                assert_eq!(record.sample_index, 0);
                assert_eq!(record.channels, [10, 20, 30, 40]);
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }
}
