//! Serial command console: line accumulation and command parsing.
//!
//! Commands are ASCII lines terminated by `\n` (`\r` ignored), at most
//! [`MAX_LINE_LEN`] characters, matched case-insensitively.

use heapless::Vec;

/// Longest accepted command line, excluding the terminator.
pub const MAX_LINE_LEN: usize = 95;

/// Accumulator capacity.
const LINE_BUF: usize = 96;

/// One parsed console command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Print the command list
    Help,
    /// Liveness check; answered with `# PONG`
    Ping,
    /// Full diagnostic dump
    Info,
    /// Counter and jitter summary
    Stats,
    /// ADS register dump
    Regs,
    /// Start streaming
    Start,
    /// Stop streaming
    Stop,
    /// Re-run the robust init sequence
    Reinit,
    /// Switch to the binary framed output
    ModeBin,
    /// Switch to the CSV debug output
    ModeCsv,
    /// Route the internal test signal to the channels
    TestOn,
    /// Back to electrode inputs
    TestOff,
    /// Run the internal self-test
    SelfTest,
    /// Enable lead-off detection
    LoffOn,
    /// Disable lead-off detection
    LoffOff,
    /// Print the last lead-off status word
    LoffStatus,
}

impl Command {
    /// Parse a trimmed command line, case-insensitively.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        const TABLE: &[(&str, Command)] = &[
            ("HELP", Command::Help),
            ("?", Command::Help),
            ("PING", Command::Ping),
            ("INFO", Command::Info),
            ("STATS", Command::Stats),
            ("REGS", Command::Regs),
            ("START", Command::Start),
            ("STOP", Command::Stop),
            ("REINIT", Command::Reinit),
            ("MODE BIN", Command::ModeBin),
            ("MODE CSV", Command::ModeCsv),
            ("TEST ON", Command::TestOn),
            ("TEST OFF", Command::TestOff),
            ("SELFTEST", Command::SelfTest),
            ("LOFF ON", Command::LoffOn),
            ("LOFF OFF", Command::LoffOff),
            ("LOFF STATUS", Command::LoffStatus),
        ];

        TABLE
            .iter()
            .find(|(name, _)| line.eq_ignore_ascii_case(name))
            .map(|&(_, command)| command)
    }
}

/// What a fed byte did to the line accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEvent {
    /// Byte consumed, line still building
    None,
    /// A full line is ready in the buffer
    Complete,
    /// The line exceeded [`MAX_LINE_LEN`]; the buffer was reset
    TooLong,
}

/// Fixed-capacity command line accumulator.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8, LINE_BUF>,
}

impl LineBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Feed one received byte.
    pub fn feed(&mut self, byte: u8) -> LineEvent {
        match byte {
            b'\r' => LineEvent::None,
            b'\n' => LineEvent::Complete,
            _ => {
                if self.buf.len() >= MAX_LINE_LEN {
                    self.buf.clear();
                    LineEvent::TooLong
                } else {
                    let _ = self.buf.push(byte);
                    LineEvent::None
                }
            }
        }
    }

    /// The accumulated line. Non-UTF-8 input yields an empty string,
    /// which the dispatcher ignores.
    #[must_use]
    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf).unwrap_or("")
    }

    /// Discard the accumulated line.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================
