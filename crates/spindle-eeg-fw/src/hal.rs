//! Seam traits between the device logic and the platform.
//!
//! `embedded-hal` 1.x covers SPI, GPIO, and delays; it has no serial or
//! watchdog traits, so the three interfaces the supervisor needs beyond
//! the bus are defined here. Host tests implement them with plain structs.

use spindle_eeg_core::ring::SerialSink;

/// Monotonic microsecond/millisecond clock.
///
/// Both counters are free-running `u32`s and wrap (the microsecond one
/// after about 71 minutes); all consumers compare with wrapping
/// subtraction.
pub trait Micros {
    /// Current time in microseconds.
    fn now_us(&self) -> u32;

    /// Current time in milliseconds.
    fn now_ms(&self) -> u32 {
        self.now_us() / 1000
    }
}

/// Bidirectional serial port: the command input plus the transmit sink
/// behind the ring.
pub trait SerialIo: SerialSink {
    /// Pop one received byte, or `None` when the RX buffer is empty.
    fn read_byte(&mut self) -> Option<u8>;

    /// Write all of `data`, busy-looping on backpressure.
    ///
    /// Only the CSV/debug text path uses this; it may stall when the host
    /// stops reading, which the debug transport explicitly tolerates. The
    /// binary path goes through the transmit ring and never blocks.
    fn write_blocking(&mut self, data: &[u8]) {
        let mut offset = 0;
        while offset < data.len() {
            offset += self.write(&data[offset..]);
        }
    }
}

/// Hardware watchdog behind a trait so platforms without one stay
/// supported.
pub trait Watchdog {
    /// Arm the watchdog. Returns false when the platform has none; the
    /// feature then silently degrades to a no-op.
    fn start(&mut self, timeout_ms: u32) -> bool;

    /// Reset the countdown.
    fn feed(&mut self);

    /// Whether the last reset was caused by a watchdog timeout.
    fn caused_reboot(&self) -> bool {
        false
    }
}

/// The no-watchdog platform: reports unsupported, feeds do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWatchdog;

impl Watchdog for NoWatchdog {
    fn start(&mut self, _timeout_ms: u32) -> bool {
        false
    }

    fn feed(&mut self) {}
}
