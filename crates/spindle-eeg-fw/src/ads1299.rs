//! ADS1299 analog front-end driver.
//!
//! Blocking driver for the TI ADS1299-4 as wired on the Spindle V1 board:
//! SPI plus RESET/START output pins and the DRDY input. The driver owns
//! hardware sequencing only: reset, register programming with read-back
//! verification, stream start/stop, frame reads, and the internal
//! self-test. It knows nothing about the wire protocol; the device
//! supervisor translates driver results into packets.
//!
//! Every SPI exchange is one `SpiDevice` transaction, so chip select is
//! asserted for exactly the span of the exchange and released on every
//! exit path, including verification failures.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::{Operation, SpiDevice};

use spindle_eeg_core::error::AdsError;
use spindle_eeg_core::frame::{SampleFrame, SignalScale, NUM_CHANNELS, RAW_FRAME_LEN};

use crate::hal::Micros;

/// ADS1299 register addresses.
#[allow(dead_code)]
pub(crate) mod regs {
    pub const ID: u8 = 0x00;
    pub const CONFIG1: u8 = 0x01;
    pub const CONFIG2: u8 = 0x02;
    pub const CONFIG3: u8 = 0x03;
    pub const LOFF: u8 = 0x04;
    pub const CH1SET: u8 = 0x05;
    pub const CH2SET: u8 = 0x06;
    pub const CH3SET: u8 = 0x07;
    pub const CH4SET: u8 = 0x08;
    pub const BIAS_SENSP: u8 = 0x0D;
    pub const BIAS_SENSN: u8 = 0x0E;
    pub const LOFF_SENSP: u8 = 0x0F;
    pub const LOFF_SENSN: u8 = 0x10;
    pub const LOFF_FLIP: u8 = 0x11;
    pub const LOFF_STATP: u8 = 0x12;
    pub const LOFF_STATN: u8 = 0x13;
    pub const GPIO: u8 = 0x14;
    pub const MISC1: u8 = 0x15;
    pub const MISC2: u8 = 0x16;
    pub const CONFIG4: u8 = 0x17;
}

/// ADS1299 SPI opcodes.
#[allow(dead_code)]
mod cmd {
    pub const WAKEUP: u8 = 0x02;
    pub const STANDBY: u8 = 0x04;
    pub const RESET: u8 = 0x06;
    pub const START: u8 = 0x08;
    pub const STOP: u8 = 0x0A;
    pub const RDATAC: u8 = 0x10;
    pub const SDATAC: u8 = 0x11;
    pub const RDATA: u8 = 0x12;
    pub const RREG: u8 = 0x20;
    pub const WREG: u8 = 0x40;
}

/// V1 register configuration values.
mod cfg {
    /// High-resolution mode, 250 SPS
    pub const CONFIG1_HR_250SPS: u8 = 0x96;
    /// Reference buffer on, test signal off
    pub const CONFIG2_NORMAL: u8 = 0xD0;
    /// Internal test signal enabled
    pub const CONFIG2_TEST: u8 = 0xD3;
    /// Internal reference, bias buffer enabled
    pub const CONFIG3_INTREF_BIAS: u8 = 0xEC;
    /// Lead-off comparator preset for diagnostics
    pub const LOFF_DIAG: u8 = 0x13;
    /// Normal electrode input, gain 24
    pub const CH_NORMAL_24X: u8 = 0x60;
    /// Test-signal mux, gain 24
    pub const CH_TEST_24X: u8 = 0x65;
    /// Route all four channels into bias derivation
    pub const BIAS_ALL_4CH: u8 = 0x0F;
    /// Lead-off sensing on all four channels
    pub const LOFF_ALL_4CH: u8 = 0x0F;
    /// GPIO pins as inputs
    pub const GPIO_INPUTS: u8 = 0x0C;
}

/// Number of registers in the dump window (ID through CONFIG4).
pub const REG_DUMP_LEN: usize = 0x18;

/// Default number of frames sampled by the internal self-test.
pub const SELF_TEST_FRAMES: u8 = 32;

/// Minimum peak-to-peak swing, in counts, each channel must show while
/// the internal test signal is active.
const SELF_TEST_MIN_P2P: i32 = 50;

/// DRDY wait limit inside the self-test.
const SELF_TEST_DRDY_TIMEOUT_US: u32 = 50_000;

/// Settle pad after a command opcode.
const CMD_PAD_US: u32 = 4;
/// Settle pad after a register transaction.
const XFER_PAD_US: u32 = 2;

/// Outcome of the internal self-test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SelfTestReport {
    /// Overall verdict
    pub passed: bool,
    /// Frames that arrived and were parsed
    pub good_frames: u8,
    /// Frames whose status header nibble was invalid
    pub status_bad: u8,
}

/// ADS1299 driver. See the module docs for the layering contract.
pub struct Ads1299<SPI, RST, START, DRDY, D> {
    spi: SPI,
    reset: RST,
    start: START,
    drdy: DRDY,
    delay: D,
    scale: SignalScale,
    test_signal: bool,
    lead_off: bool,
    ready: bool,
}

impl<SPI, RST, START, DRDY, D, E> Ads1299<SPI, RST, START, DRDY, D>
where
    SPI: SpiDevice<Error = E>,
    RST: OutputPin,
    START: OutputPin,
    DRDY: InputPin,
    D: DelayNs,
{
    /// Create a driver over configured peripherals.
    pub fn new(spi: SPI, reset: RST, start: START, drdy: DRDY, delay: D) -> Self {
        Self {
            spi,
            reset,
            start,
            drdy,
            delay,
            scale: SignalScale::V1_DEFAULT,
            test_signal: false,
            lead_off: false,
            ready: false,
        }
    }

    /// True after a successful init, false after any failed one.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// The scale published by the last successful configuration.
    #[must_use]
    pub fn scale(&self) -> SignalScale {
        self.scale
    }

    /// Whether the internal test signal is routed to the channels.
    #[must_use]
    pub fn test_signal(&self) -> bool {
        self.test_signal
    }

    /// Whether lead-off current sources and comparators are enabled.
    #[must_use]
    pub fn lead_off(&self) -> bool {
        self.lead_off
    }

    /// Bounded settle wait, exposed for retry pacing in the supervisor.
    pub fn pause_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    // ------------------------------------------------------------------
    // SPI primitives
    // ------------------------------------------------------------------

    /// Send a single command opcode.
    ///
    /// # Errors
    ///
    /// Propagates the SPI bus error.
    pub fn send_command(&mut self, opcode: u8) -> Result<(), AdsError<E>> {
        self.spi.write(&[opcode]).map_err(AdsError::Spi)?;
        self.delay.delay_us(CMD_PAD_US);
        Ok(())
    }

    /// Read one register.
    ///
    /// # Errors
    ///
    /// Propagates the SPI bus error.
    pub fn read_register(&mut self, reg: u8) -> Result<u8, AdsError<E>> {
        let mut value = [0u8; 1];
        self.spi
            .transaction(&mut [
                Operation::Write(&[cmd::RREG | (reg & 0x1F), 0x00]),
                Operation::DelayNs(XFER_PAD_US * 1000),
                Operation::Read(&mut value),
            ])
            .map_err(AdsError::Spi)?;
        self.delay.delay_us(XFER_PAD_US);
        Ok(value[0])
    }

    /// Write one register.
    ///
    /// # Errors
    ///
    /// Propagates the SPI bus error.
    pub fn write_register(&mut self, reg: u8, value: u8) -> Result<(), AdsError<E>> {
        self.spi
            .write(&[cmd::WREG | (reg & 0x1F), 0x00, value])
            .map_err(AdsError::Spi)?;
        self.delay.delay_us(XFER_PAD_US);
        Ok(())
    }

    /// Burst-read `dest.len()` registers starting at `start_reg`.
    ///
    /// # Errors
    ///
    /// Propagates the SPI bus error.
    ///
    /// # Panics
    ///
    /// Panics if `dest` is empty or longer than 32 registers.
    pub fn read_registers(&mut self, start_reg: u8, dest: &mut [u8]) -> Result<(), AdsError<E>> {
        assert!(!dest.is_empty() && dest.len() <= 32);
        let count = dest.len() as u8;
        self.spi
            .transaction(&mut [
                Operation::Write(&[cmd::RREG | (start_reg & 0x1F), count - 1]),
                Operation::DelayNs(XFER_PAD_US * 1000),
                Operation::Read(dest),
            ])
            .map_err(AdsError::Spi)?;
        self.delay.delay_us(XFER_PAD_US);
        Ok(())
    }

    /// Read one 15-byte data frame with chip select held low for the
    /// whole burst.
    ///
    /// # Errors
    ///
    /// Propagates the SPI bus error.
    pub fn read_frame(&mut self) -> Result<[u8; RAW_FRAME_LEN], AdsError<E>> {
        let mut frame = [0u8; RAW_FRAME_LEN];
        self.spi.read(&mut frame).map_err(AdsError::Spi)?;
        Ok(frame)
    }

    /// Dump the full register window for the `REGS` command.
    ///
    /// # Errors
    ///
    /// Propagates the SPI bus error.
    pub fn dump_registers(&mut self) -> Result<[u8; REG_DUMP_LEN], AdsError<E>> {
        let mut window = [0u8; REG_DUMP_LEN];
        self.read_registers(regs::ID, &mut window)?;
        Ok(window)
    }

    // ------------------------------------------------------------------
    // Initialization
    // ------------------------------------------------------------------

    /// Pulse the RESET pin through the power-on reset sequence.
    pub fn hardware_reset(&mut self) {
        let _ = self.reset.set_high();
        self.delay.delay_ms(5);
        let _ = self.reset.set_low();
        self.delay.delay_ms(10);
        let _ = self.reset.set_high();
        self.delay.delay_ms(25);
    }

    /// One full init attempt: reset, identify, configure.
    ///
    /// Returns the chip ID on success.
    ///
    /// # Errors
    ///
    /// [`AdsError::BadChipId`] when the ID reads all-zeros or all-ones
    /// (bus stuck or chip absent), [`AdsError::ReadbackMismatch`] from
    /// the configuration pass, or the underlying SPI error.
    pub fn init(&mut self) -> Result<u8, AdsError<E>> {
        self.ready = false;

        let _ = self.start.set_low();
        self.hardware_reset();

        self.send_command(cmd::SDATAC)?;
        self.delay.delay_ms(5);

        let id = self.read_register(regs::ID)?;
        if id == 0x00 || id == 0xFF {
            return Err(AdsError::BadChipId { id });
        }

        self.configure_registers()?;
        self.ready = true;
        Ok(id)
    }

    /// Program the full V1 register set and verify it by read-back.
    ///
    /// On success publishes the V1 scale (250 SPS, gain 24, 4.5 V ref).
    ///
    /// # Errors
    ///
    /// [`AdsError::ReadbackMismatch`] naming the first register that did
    /// not verify, or the underlying SPI error.
    pub fn configure_registers(&mut self) -> Result<(), AdsError<E>> {
        self.send_command(cmd::SDATAC)?;
        self.delay.delay_ms(5);

        let config2 = if self.test_signal { cfg::CONFIG2_TEST } else { cfg::CONFIG2_NORMAL };
        let loff = if self.lead_off { cfg::LOFF_DIAG } else { 0x00 };
        let loff_sens = if self.lead_off { cfg::LOFF_ALL_4CH } else { 0x00 };
        let chset = if self.test_signal { cfg::CH_TEST_24X } else { cfg::CH_NORMAL_24X };

        self.write_register(regs::CONFIG1, cfg::CONFIG1_HR_250SPS)?;
        self.write_register(regs::CONFIG2, config2)?;
        self.write_register(regs::CONFIG3, cfg::CONFIG3_INTREF_BIAS)?;
        self.write_register(regs::LOFF, loff)?;
        for reg in [regs::CH1SET, regs::CH2SET, regs::CH3SET, regs::CH4SET] {
            self.write_register(reg, chset)?;
        }
        self.write_register(regs::BIAS_SENSP, cfg::BIAS_ALL_4CH)?;
        self.write_register(regs::BIAS_SENSN, cfg::BIAS_ALL_4CH)?;
        self.write_register(regs::LOFF_SENSP, loff_sens)?;
        self.write_register(regs::LOFF_SENSN, loff_sens)?;
        self.write_register(regs::GPIO, cfg::GPIO_INPUTS)?;
        self.write_register(regs::MISC1, 0x00)?;
        self.write_register(regs::MISC2, 0x00)?;
        self.write_register(regs::CONFIG4, 0x00)?;

        self.delay.delay_ms(2);

        self.verify_register(regs::CONFIG1, cfg::CONFIG1_HR_250SPS)?;
        self.verify_register(regs::CONFIG2, config2)?;
        self.verify_register(regs::CONFIG3, cfg::CONFIG3_INTREF_BIAS)?;
        self.verify_register(regs::LOFF, loff)?;
        self.verify_register(regs::LOFF_SENSP, loff_sens)?;
        self.verify_register(regs::LOFF_SENSN, loff_sens)?;
        for reg in [regs::CH1SET, regs::CH2SET, regs::CH3SET, regs::CH4SET] {
            self.verify_register(reg, chset)?;
        }

        self.scale = SignalScale::V1_DEFAULT;
        Ok(())
    }

    fn verify_register(&mut self, reg: u8, wrote: u8) -> Result<(), AdsError<E>> {
        let read = self.read_register(reg)?;
        if read != wrote {
            return Err(AdsError::ReadbackMismatch { register: reg, wrote, read });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Streaming
    // ------------------------------------------------------------------

    /// Put the chip into continuous acquisition.
    ///
    /// # Errors
    ///
    /// Propagates the SPI bus error.
    pub fn start_streaming(&mut self) -> Result<(), AdsError<E>> {
        self.send_command(cmd::SDATAC)?;
        self.delay.delay_us(10);
        let _ = self.start.set_high();
        self.send_command(cmd::START)?;
        self.delay.delay_us(10);
        self.send_command(cmd::RDATAC)?;
        self.delay.delay_us(10);
        Ok(())
    }

    /// Stop continuous acquisition.
    ///
    /// # Errors
    ///
    /// Propagates the SPI bus error.
    pub fn stop_streaming(&mut self) -> Result<(), AdsError<E>> {
        self.send_command(cmd::SDATAC)?;
        self.delay.delay_us(10);
        self.send_command(cmd::STOP)?;
        let _ = self.start.set_low();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Diagnostics configuration
    // ------------------------------------------------------------------

    /// Route the internal test signal to all channels (or back to the
    /// electrodes). Rolls the flag back and reconfigures on failure.
    ///
    /// # Errors
    ///
    /// The configuration error that caused the rollback.
    pub fn set_internal_test_signal(&mut self, enable: bool) -> Result<(), AdsError<E>> {
        let previous = self.test_signal;
        self.test_signal = enable;
        if let Err(e) = self.configure_registers() {
            self.test_signal = previous;
            let _ = self.configure_registers();
            return Err(e);
        }
        Ok(())
    }

    /// Enable or disable lead-off detection. Rolls the flag back and
    /// reconfigures on failure.
    ///
    /// # Errors
    ///
    /// The configuration error that caused the rollback.
    pub fn set_lead_off(&mut self, enable: bool) -> Result<(), AdsError<E>> {
        let previous = self.lead_off;
        self.lead_off = enable;
        if let Err(e) = self.configure_registers() {
            self.lead_off = previous;
            let _ = self.configure_registers();
            return Err(e);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Self-test
    // ------------------------------------------------------------------

    /// Run the internal self-test: `frames` frames with the test signal
    /// active, validating status headers and per-channel signal swing.
    ///
    /// The caller must have stopped streaming. `idle` is invoked while
    /// waiting on DRDY so the supervisor can feed the watchdog and drain
    /// the transmit ring. Prior test-signal and lead-off settings are
    /// restored by direct assignment and one reconfiguration before the
    /// report is returned.
    ///
    /// # Errors
    ///
    /// Configuration errors entering the test mode. Mid-run frame
    /// failures end the sampling loop early and show up as a failed
    /// report instead.
    pub fn run_self_test<C: Micros, F: FnMut()>(
        &mut self,
        clock: &C,
        frames: u8,
        mut idle: F,
    ) -> Result<SelfTestReport, AdsError<E>> {
        let frames = if frames == 0 { SELF_TEST_FRAMES } else { frames };
        let old_test = self.test_signal;
        let old_lead_off = self.lead_off;

        self.test_signal = true;
        self.lead_off = false;
        if let Err(e) = self.configure_registers() {
            self.test_signal = old_test;
            self.lead_off = old_lead_off;
            let _ = self.configure_registers();
            return Err(e);
        }

        self.start_streaming()?;

        let mut min = [i32::MAX; NUM_CHANNELS];
        let mut max = [i32::MIN; NUM_CHANNELS];
        let mut status_bad: u8 = 0;
        let mut good_frames: u8 = 0;

        for _ in 0..frames {
            idle();
            if !self.wait_drdy_low(clock, SELF_TEST_DRDY_TIMEOUT_US, &mut idle) {
                break;
            }
            let Ok(raw) = self.read_frame() else { break };
            let frame = SampleFrame::parse(&raw);

            if !frame.status.header_valid() {
                status_bad += 1;
            }
            for ch in 0..NUM_CHANNELS {
                min[ch] = min[ch].min(frame.channels[ch]);
                max[ch] = max[ch].max(frame.channels[ch]);
            }
            good_frames += 1;

            self.wait_drdy_high(clock, 5000);
        }

        let _ = self.stop_streaming();

        let mut dynamic_ok = good_frames > 0;
        for ch in 0..NUM_CHANNELS {
            if max[ch].saturating_sub(min[ch]) < SELF_TEST_MIN_P2P {
                dynamic_ok = false;
            }
        }
        let status_ok = good_frames == frames && status_bad <= frames / 4;

        self.test_signal = old_test;
        self.lead_off = old_lead_off;
        let _ = self.configure_registers();

        Ok(SelfTestReport {
            passed: dynamic_ok && status_ok,
            good_frames,
            status_bad,
        })
    }

    fn wait_drdy_low<C: Micros, F: FnMut()>(
        &mut self,
        clock: &C,
        timeout_us: u32,
        idle: &mut F,
    ) -> bool {
        let start = clock.now_us();
        while !self.drdy.is_low().unwrap_or(false) {
            idle();
            if clock.now_us().wrapping_sub(start) > timeout_us {
                return false;
            }
        }
        true
    }

    fn wait_drdy_high<C: Micros>(&mut self, clock: &C, timeout_us: u32) {
        let start = clock.now_us();
        while self.drdy.is_low().unwrap_or(false) {
            if clock.now_us().wrapping_sub(start) > timeout_us {
                break;
            }
        }
    }
}
