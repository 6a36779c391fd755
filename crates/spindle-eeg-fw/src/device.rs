//! Device supervisor: the cooperative main loop and everything it owns.
//!
//! One [`Device`] value bundles the ADS driver, the transmit ring, the
//! framer, the console, and all counters and one-shot flags, so the whole
//! firmware state travels through the loop as a single owned context.
//! The only state outside it is the [`SharedDrdy`] timing block, which
//! the DRDY interrupt handler owns and the supervisor reads through
//! snapshots.
//!
//! Loop contract: [`Device::tick`] never blocks beyond a single SPI burst
//! or UART poll. The bounded busy-waits (init settle times, self-test
//! DRDY polls) happen only inside explicit command handling.

use core::fmt::Write as _;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiDevice;
use heapless::String;

use spindle_eeg_core::drdy::SharedDrdy;
use spindle_eeg_core::frame::{sample_flags, SampleFrame, StatusWord};
use spindle_eeg_core::protocol::{error_code, event_code, Framer, SampleBody};
use spindle_eeg_core::ring::{TxRing, TX_RING_CAPACITY};

use crate::ads1299::{regs, Ads1299, SelfTestReport};
use crate::console::{Command, LineBuffer, LineEvent};
use crate::hal::{Micros, SerialIo, Watchdog};

/// Host-visible output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputMode {
    /// COBS-framed binary packets through the transmit ring
    #[default]
    Binary,
    /// Comma-separated debug rows written straight to the serial port
    CsvDebug,
}

/// Build-time constants the supervisor reports and paces itself with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Serial link speed, reported by `INFO`
    pub serial_baud: u32,
    /// SPI clock, reported by `INFO`
    pub spi_hz: u32,
    /// Init attempts before giving up
    pub init_attempts: u8,
    /// Watchdog timeout handed to the platform watchdog
    pub watchdog_timeout_ms: u32,
    /// Minimum spacing between button toggles
    pub button_debounce_ms: u32,
    /// Frames sampled by `SELFTEST`
    pub self_test_frames: u8,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            serial_baud: 921_600,
            spi_hz: 1_000_000,
            init_attempts: 3,
            watchdog_timeout_ms: 2000,
            button_debounce_ms: 250,
            self_test_frames: 32,
        }
    }
}

/// Monotonic diagnostic counters (wraparound tolerated).
#[derive(Debug, Clone, Copy, Default)]
pub struct Counters {
    /// Successful DRDY-stall recoveries
    pub recoveries_total: u32,
    /// Frames whose status header nibble was invalid
    pub status_invalid_total: u32,
    /// Frames with any lead-off comparator bit set
    pub lead_off_any_total: u32,
    /// Watchdog feeds since boot
    pub watchdog_feeds_total: u32,
}

/// One-shot signals consumed by the next emitted sample.
#[derive(Debug, Clone, Copy, Default)]
struct PendingFlags {
    recovered: bool,
    button_toggled: bool,
}

const CSV_HEADER: &str = "sample,drdy_t_us,proc_t_us,drdy_interval_us,status,\
ch1,ch2,ch3,ch4,ch1_uv,ch2_uv,ch3_uv,ch4_uv,flags,missed_drdy_frame,\
missed_drdy_total,recoveries_total";

/// The assembled front-end device.
pub struct Device<'a, SPI, RST, START, DRDY, D, BTN, LED, SER, CLK, W> {
    ads: Ads1299<SPI, RST, START, DRDY, D>,
    drdy: &'a SharedDrdy,
    ring: TxRing<TX_RING_CAPACITY>,
    framer: Framer,
    serial: SER,
    button: BTN,
    led: LED,
    clock: CLK,
    watchdog: W,
    config: DeviceConfig,
    mode: OutputMode,
    streaming: bool,
    flags: PendingFlags,
    counters: Counters,
    line: LineBuffer,
    last_good_frame_us: u32,
    last_process_us: u32,
    latency_us: u32,
    last_button_ms: u32,
    button_was_high: bool,
    last_status24: u32,
    last_loff_p: u8,
    last_loff_n: u8,
    watchdog_armed: bool,
    watchdog_reboot: bool,
}

impl<'a, SPI, RST, START, DRDY, D, BTN, LED, SER, CLK, W>
    Device<'a, SPI, RST, START, DRDY, D, BTN, LED, SER, CLK, W>
where
    SPI: SpiDevice,
    RST: OutputPin,
    START: OutputPin,
    DRDY: InputPin,
    D: DelayNs,
    BTN: InputPin,
    LED: OutputPin,
    SER: SerialIo,
    CLK: Micros,
    W: Watchdog,
{
    /// Assemble a device from its peripherals.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ads: Ads1299<SPI, RST, START, DRDY, D>,
        drdy: &'a SharedDrdy,
        serial: SER,
        button: BTN,
        led: LED,
        clock: CLK,
        watchdog: W,
        config: DeviceConfig,
    ) -> Self {
        let now_us = clock.now_us();
        Self {
            ads,
            drdy,
            ring: TxRing::new(),
            framer: Framer::new(),
            serial,
            button,
            led,
            clock,
            watchdog,
            config,
            mode: OutputMode::Binary,
            streaming: false,
            flags: PendingFlags::default(),
            counters: Counters::default(),
            line: LineBuffer::new(),
            last_good_frame_us: now_us,
            last_process_us: 0,
            latency_us: 0,
            last_button_ms: 0,
            button_was_high: true,
            last_status24: 0,
            last_loff_p: 0,
            last_loff_n: 0,
            watchdog_armed: false,
            watchdog_reboot: false,
        }
    }

    /// Arm the watchdog and bring up the front-end. Call once before the
    /// loop.
    pub fn boot(&mut self) {
        self.watchdog_reboot = self.watchdog.caused_reboot();
        self.watchdog_armed = self.watchdog.start(self.config.watchdog_timeout_ms);
        self.init_robust();
        self.last_good_frame_us = self.clock.now_us();
    }

    /// One cooperative loop iteration.
    pub fn tick(&mut self) {
        self.feed_watchdog();
        self.service_tx();
        self.poll_serial();
        self.poll_button();
        self.service_tx();

        if self.streaming {
            let _ = self.poll_sample();
        }

        self.recover_if_needed();
        self.service_tx();
    }

    /// Whether acquisition is currently streaming.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Current output mode.
    #[must_use]
    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Diagnostic counters.
    #[must_use]
    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Transmit-path statistics (drops and peak depth).
    #[must_use]
    pub fn tx_stats(&self) -> spindle_eeg_core::ring::TxStats {
        *self.ring.stats()
    }

    /// Bytes currently queued in the transmit ring.
    #[must_use]
    pub fn tx_queued_bytes(&self) -> usize {
        self.ring.queued_bytes()
    }

    fn feed_watchdog(&mut self) {
        if self.watchdog_armed {
            self.watchdog.feed();
            self.counters.watchdog_feeds_total =
                self.counters.watchdog_feeds_total.wrapping_add(1);
        }
    }

    /// Drain one bounded chunk of the transmit ring into the serial
    /// port. `tick` calls this three times per iteration; platforms may
    /// insert extra drain points.
    pub fn service_tx(&mut self) {
        self.ring.service(&mut self.serial);
    }

    // ------------------------------------------------------------------
    // Command input
    // ------------------------------------------------------------------

    fn poll_serial(&mut self) {
        while let Some(byte) = self.serial.read_byte() {
            match self.line.feed(byte) {
                LineEvent::None => {}
                LineEvent::TooLong => self.print_line("# ERR CMD_TOO_LONG"),
                LineEvent::Complete => {
                    let mut text: String<96> = String::new();
                    let _ = text.push_str(self.line.as_str().trim());
                    self.line.clear();
                    self.dispatch(&text);
                }
            }
        }
    }

    fn dispatch(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match Command::parse(text) {
            Some(command) => self.run_command(command),
            None => {
                let mut msg: String<128> = String::new();
                let _ = msg.push_str("# ERR UNKNOWN_CMD ");
                for ch in text.chars() {
                    let _ = msg.push(ch.to_ascii_uppercase());
                }
                self.print_line(&msg);
            }
        }
    }

    fn run_command(&mut self, command: Command) {
        match command {
            Command::Help => self.print_help(),
            Command::Ping => self.print_line("# PONG"),
            Command::Info => self.print_info(),
            Command::Stats => self.print_stats(),
            Command::Regs => self.dump_registers(),
            Command::Start => self.start_streaming(),
            Command::Stop => self.stop_streaming(),
            Command::Reinit => {
                let was_streaming = self.streaming;
                if self.streaming {
                    self.stop_streaming();
                }
                if self.init_robust() && was_streaming {
                    self.start_streaming();
                }
            }
            Command::ModeBin => {
                if self.streaming {
                    self.stop_streaming();
                }
                self.mode = OutputMode::Binary;
                self.print_line("# OK MODE BIN");
            }
            Command::ModeCsv => {
                if self.streaming {
                    self.stop_streaming();
                }
                self.mode = OutputMode::CsvDebug;
                self.print_line("# OK MODE CSV");
                self.print_line("# WARN CSV_DEBUG_ONLY");
            }
            Command::TestOn => self.set_test_signal(true),
            Command::TestOff => self.set_test_signal(false),
            Command::SelfTest => {
                self.print_line("# SELFTEST RUNNING");
                let passed = self.self_test();
                self.print_line(if passed { "# SELFTEST PASS" } else { "# SELFTEST FAIL" });
            }
            Command::LoffOn => self.set_lead_off(true),
            Command::LoffOff => self.set_lead_off(false),
            Command::LoffStatus => self.print_loff_status(),
        }
    }

    fn set_test_signal(&mut self, enable: bool) {
        let was_streaming = self.streaming;
        if self.streaming {
            self.stop_streaming();
        }
        if self.ads.set_internal_test_signal(enable).is_ok() {
            self.print_line(if enable { "# OK TEST ON" } else { "# OK TEST OFF" });
            if was_streaming {
                self.start_streaming();
            }
        } else {
            self.print_line(if enable { "# ERR TEST_ON_FAIL" } else { "# ERR TEST_OFF_FAIL" });
        }
    }

    fn set_lead_off(&mut self, enable: bool) {
        let was_streaming = self.streaming;
        if self.streaming {
            self.stop_streaming();
        }
        if self.ads.set_lead_off(enable).is_ok() {
            self.print_line(if enable { "# OK LOFF ON" } else { "# OK LOFF OFF" });
            if was_streaming {
                self.start_streaming();
            }
        } else {
            self.print_line(if enable { "# ERR LOFF_ON_FAIL" } else { "# ERR LOFF_OFF_FAIL" });
        }
    }

    // ------------------------------------------------------------------
    // Stream control
    // ------------------------------------------------------------------

    /// Start acquisition, initializing the front-end first if needed.
    pub fn start_streaming(&mut self) {
        if !self.ads.is_ready() && !self.init_robust() {
            return;
        }

        self.drdy.reset(self.ads.scale().expected_period_us());
        self.framer.reset_index();
        self.last_good_frame_us = self.clock.now_us();

        if self.ads.start_streaming().is_err() {
            return;
        }

        self.streaming = true;
        let _ = self.led.set_high();

        match self.mode {
            OutputMode::Binary => {
                self.framer.emit_event(&mut self.ring, event_code::STREAM_STATE, 1, 0, 0);
            }
            OutputMode::CsvDebug => {
                self.print_line(CSV_HEADER);
                self.print_line("# STREAM_ON");
                self.print_line("# WARN CSV_DEBUG_ONLY");
            }
        }
    }

    /// Stop acquisition.
    pub fn stop_streaming(&mut self) {
        let _ = self.ads.stop_streaming();
        self.streaming = false;
        let _ = self.led.set_low();

        match self.mode {
            OutputMode::Binary => {
                self.framer.emit_event(&mut self.ring, event_code::STREAM_STATE, 0, 0, 0);
            }
            OutputMode::CsvDebug => self.print_line("# STREAM_OFF"),
        }
    }

    fn init_robust(&mut self) -> bool {
        let attempts = self.config.init_attempts.max(1);
        for attempt in 1..=attempts {
            self.feed_watchdog();
            match self.ads.init() {
                Ok(id) => {
                    match self.mode {
                        OutputMode::Binary => {
                            self.framer.emit_event(
                                &mut self.ring,
                                event_code::INIT_OK,
                                u32::from(id),
                                u32::from(attempt),
                                0,
                            );
                        }
                        OutputMode::CsvDebug => {
                            self.print_kv_u32("# ADS_INIT_OK attempt", u32::from(attempt));
                        }
                    }
                    return true;
                }
                Err(_) => self.ads.pause_ms(20),
            }
        }

        match self.mode {
            OutputMode::Binary => {
                self.framer.emit_error(&mut self.ring, error_code::INIT_FAILED, 0, 0);
            }
            OutputMode::CsvDebug => self.print_line("# ERR ADS_INIT_FAIL"),
        }
        false
    }

    fn recover_if_needed(&mut self) {
        if !self.streaming {
            return;
        }

        let period_us = self.ads.scale().expected_period_us();
        let timeout_us = (period_us.saturating_mul(8)).max(50_000);
        let now_us = self.clock.now_us();
        if now_us.wrapping_sub(self.last_good_frame_us) < timeout_us {
            return;
        }

        let was_streaming = self.streaming;
        self.stop_streaming();

        match self.mode {
            OutputMode::Binary => {
                self.framer.emit_error(
                    &mut self.ring,
                    error_code::DRDY_TIMEOUT,
                    now_us,
                    self.counters.recoveries_total,
                );
            }
            OutputMode::CsvDebug => self.print_line("# WARN DRDY_TIMEOUT_RECOVER"),
        }

        if self.init_robust() {
            self.counters.recoveries_total = self.counters.recoveries_total.wrapping_add(1);
            self.flags.recovered = true;
            if was_streaming {
                self.start_streaming();
            }
        }
    }

    // ------------------------------------------------------------------
    // Sample pipeline
    // ------------------------------------------------------------------

    /// Consume at most one pending DRDY edge. Returns true when a frame
    /// was processed.
    fn poll_sample(&mut self) -> bool {
        let Some(snap) = self.drdy.capture_pending() else {
            return false;
        };

        let raw = match self.ads.read_frame() {
            Ok(raw) => raw,
            Err(_) => {
                match self.mode {
                    OutputMode::Binary => {
                        self.framer.emit_error(
                            &mut self.ring,
                            error_code::FRAME_READ_FAILED,
                            0,
                            0,
                        );
                    }
                    OutputMode::CsvDebug => self.print_line("# ERR FRAME_READ_FAIL"),
                }
                return false;
            }
        };

        let frame = SampleFrame::parse(&raw);

        let mut flags = 0u32;
        if self.streaming {
            flags |= sample_flags::STREAMING;
        }
        if self.flags.recovered {
            flags |= sample_flags::RECOVERED;
        }
        if self.flags.button_toggled {
            flags |= sample_flags::BUTTON_TOGGLED;
        }
        if snap.missed_frame > 0 {
            flags |= sample_flags::DRDY_MISSED;
        }
        if self.ring.overflow_pending() {
            flags |= sample_flags::TX_OVERFLOW;
        }

        self.last_status24 = frame.status.bits();
        self.last_loff_p = frame.status.lead_off_positive();
        self.last_loff_n = frame.status.lead_off_negative();

        if !frame.status.header_valid() {
            flags |= sample_flags::STATUS_INVALID;
            self.counters.status_invalid_total =
                self.counters.status_invalid_total.wrapping_add(1);
        }
        if frame.status.lead_off_any() {
            flags |= sample_flags::LEAD_OFF_ANY;
            self.counters.lead_off_any_total =
                self.counters.lead_off_any_total.wrapping_add(1);
        }

        let proc_us = self.clock.now_us();
        let t_us = if snap.timestamp_us != 0 { snap.timestamp_us } else { proc_us };
        self.last_good_frame_us = proc_us;
        self.last_process_us = proc_us;
        self.latency_us = proc_us.wrapping_sub(t_us);

        let emitted = match self.mode {
            OutputMode::Binary => self.framer.emit_sample(
                &mut self.ring,
                &SampleBody {
                    t_us,
                    status24: frame.status.bits(),
                    channels: frame.channels,
                    flags,
                    missed_drdy_frame: snap.missed_frame,
                    recoveries_total: self.counters.recoveries_total,
                },
            ),
            OutputMode::CsvDebug => {
                self.emit_csv_row(&frame, t_us, proc_us, flags, &snap);
                true
            }
        };

        self.flags.recovered = false;
        self.flags.button_toggled = false;
        if emitted {
            self.ring.clear_overflow();
        }
        true
    }

    // ------------------------------------------------------------------
    // Button
    // ------------------------------------------------------------------

    fn poll_button(&mut self) {
        let is_high = !self.button.is_low().unwrap_or(false);

        if self.button_was_high && !is_high {
            let now_ms = self.clock.now_ms();
            if now_ms.wrapping_sub(self.last_button_ms) > self.config.button_debounce_ms {
                self.last_button_ms = now_ms;
                self.flags.button_toggled = true;
                if self.streaming {
                    self.stop_streaming();
                } else {
                    self.start_streaming();
                }
            }
        }

        self.button_was_high = is_high;
    }

    // ------------------------------------------------------------------
    // Self-test
    // ------------------------------------------------------------------

    fn self_test(&mut self) -> bool {
        let was_streaming = self.streaming;
        if self.streaming {
            self.stop_streaming();
        }
        if !self.ads.is_ready() && !self.init_robust() {
            return false;
        }

        self.drdy.reset(self.ads.scale().expected_period_us());

        let frames = self.config.self_test_frames;
        let watchdog_armed = self.watchdog_armed;
        let result = {
            let Self { ads, watchdog, ring, serial, counters, clock, .. } = self;
            ads.run_self_test(&*clock, frames, || {
                if watchdog_armed {
                    watchdog.feed();
                    counters.watchdog_feeds_total = counters.watchdog_feeds_total.wrapping_add(1);
                }
                ring.service(serial);
            })
        };

        let passed = match result {
            Ok(report) => {
                self.report_self_test(&report);
                report.passed
            }
            Err(_) => false,
        };

        if was_streaming {
            self.start_streaming();
        }
        passed
    }

    fn report_self_test(&mut self, report: &SelfTestReport) {
        match self.mode {
            OutputMode::Binary => {
                self.framer.emit_event(
                    &mut self.ring,
                    event_code::SELF_TEST,
                    u32::from(report.passed),
                    u32::from(report.good_frames),
                    u32::from(report.status_bad),
                );
            }
            OutputMode::CsvDebug => {
                let mut line: String<96> = String::new();
                let _ = write!(
                    line,
                    "# SELFTEST good_frames={} status_bad={} result={}",
                    report.good_frames,
                    report.status_bad,
                    if report.passed { "PASS" } else { "FAIL" },
                );
                self.print_line(&line);
            }
        }
    }

    // ------------------------------------------------------------------
    // Text output
    // ------------------------------------------------------------------

    fn print_line(&mut self, line: &str) {
        self.serial.write_blocking(line.as_bytes());
        self.serial.write_blocking(b"\n");
    }

    fn print_kv_u32(&mut self, key: &str, value: u32) {
        let mut line: String<64> = String::new();
        let _ = write!(line, "{key}={value}");
        self.print_line(&line);
    }

    fn print_kv_u64(&mut self, key: &str, value: u64) {
        let mut line: String<64> = String::new();
        let _ = write!(line, "{key}={value}");
        self.print_line(&line);
    }

    fn print_kv_str(&mut self, key: &str, value: &str) {
        let mut line: String<64> = String::new();
        let _ = write!(line, "{key}={value}");
        self.print_line(&line);
    }

    fn emit_csv_row(
        &mut self,
        frame: &SampleFrame,
        t_us: u32,
        proc_us: u32,
        flags: u32,
        snap: &spindle_eeg_core::drdy::DrdySnapshot,
    ) {
        let scale = self.ads.scale();
        let index = self.framer.next_sample_index();

        let mut row: String<256> = String::new();
        let _ = write!(
            row,
            "{index},{t_us},{proc_us},{},{}",
            snap.interval_us,
            frame.status.bits()
        );
        for ch in frame.channels {
            let _ = write!(row, ",{ch}");
        }
        for ch in frame.channels {
            let _ = write!(row, ",{}", scale.counts_to_microvolts(ch));
        }
        let _ = write!(
            row,
            ",{flags},{},{},{}",
            snap.missed_frame, snap.missed_total, self.counters.recoveries_total
        );
        self.print_line(&row);
    }

    fn print_help(&mut self) {
        self.print_line("");
        self.print_line("Spindle EEG V1 commands:");
        self.print_line("  HELP");
        self.print_line("  INFO");
        self.print_line("  STATS");
        self.print_line("  REGS");
        self.print_line("  START");
        self.print_line("  STOP");
        self.print_line("  MODE BIN");
        self.print_line("  MODE CSV   (debug)");
        self.print_line("  REINIT");
        self.print_line("  TEST ON");
        self.print_line("  TEST OFF");
        self.print_line("  SELFTEST");
        self.print_line("  LOFF ON");
        self.print_line("  LOFF OFF");
        self.print_line("  LOFF STATUS");
        self.print_line("  PING");
        self.print_line("");
    }

    fn print_info(&mut self) {
        self.print_line("# Spindle EEG V1");
        self.print_kv_str("firmware", "robust+diag");
        self.print_kv_str(
            "transport",
            match self.mode {
                OutputMode::Binary => "bin+cobs+crc16",
                OutputMode::CsvDebug => "csv(debug)",
            },
        );
        self.print_kv_u32("serial_baud", self.config.serial_baud);
        self.print_kv_u32("spi_hz", self.config.spi_hz);

        let scale = self.ads.scale();
        self.print_kv_u32("sample_rate_sps", scale.sample_rate_sps);
        self.print_kv_u32("drdy_expected_period_us", scale.expected_period_us());
        self.print_kv_u32("ads_vref_uv", scale.vref_uv);
        self.print_kv_u32("ads_gain", u32::from(scale.gain));

        self.print_kv_u32("streaming", u32::from(self.streaming));
        self.print_kv_u32("ads_ready", u32::from(self.ads.is_ready()));
        self.print_kv_u32("test_signal", u32::from(self.ads.test_signal()));
        self.print_kv_u32("loff_diag", u32::from(self.ads.lead_off()));

        self.print_kv_u32("recoveries_total", self.counters.recoveries_total);
        self.print_kv_u32("status_invalid_total", self.counters.status_invalid_total);
        self.print_kv_u32("lead_off_any_total", self.counters.lead_off_any_total);

        let stats = *self.ring.stats();
        self.print_kv_u32("tx_bytes_dropped_total", stats.bytes_dropped_total);
        self.print_kv_u32("tx_packets_dropped_total", stats.packets_dropped_total);
        self.print_kv_u32("tx_queued_bytes", self.ring.queued_bytes() as u32);
        self.print_kv_u32("tx_max_queued_bytes", stats.max_queued_bytes);

        self.print_kv_u32("watchdog_supported", u32::from(self.watchdog_armed));
        self.print_kv_u32("watchdog_enabled", u32::from(self.watchdog_armed));
        self.print_kv_u32("watchdog_reboot_detected", u32::from(self.watchdog_reboot));
        self.print_kv_u32("watchdog_timeout_ms", self.config.watchdog_timeout_ms);
        self.print_kv_u32("watchdog_feeds_total", self.counters.watchdog_feeds_total);

        self.print_kv_u32("last_drdy_to_process_latency_us", self.latency_us);

        let drdy = self.drdy.capture_stats();
        self.print_kv_u32("drdy_edges_total", drdy.edges_total);
        self.print_kv_u32("missed_drdy_total", drdy.missed_total);
        self.print_kv_u32("last_drdy_us", drdy.last_edge_us);
        self.print_jitter_summary();

        self.print_kv_u32("last_status24", self.last_status24);
        self.print_kv_u32("last_loff_statp", u32::from(self.last_loff_p));
        self.print_kv_u32("last_loff_statn", u32::from(self.last_loff_n));

        let id = self.ads.read_register(regs::ID).unwrap_or(0);
        self.print_kv_u32("ads_id", u32::from(id));
    }

    fn print_stats(&mut self) {
        self.print_line("# STATS");
        self.print_kv_u32("sample_index", self.framer.sample_index());
        self.print_kv_u32("recoveries_total", self.counters.recoveries_total);
        self.print_kv_u32("status_invalid_total", self.counters.status_invalid_total);
        self.print_kv_u32("lead_off_any_total", self.counters.lead_off_any_total);

        let stats = *self.ring.stats();
        self.print_kv_u32("tx_bytes_dropped_total", stats.bytes_dropped_total);
        self.print_kv_u32("tx_packets_dropped_total", stats.packets_dropped_total);
        self.print_kv_u32("tx_queued_bytes", self.ring.queued_bytes() as u32);
        self.print_kv_u32("tx_free_bytes", self.ring.free_bytes() as u32);
        self.print_kv_u32("tx_max_queued_bytes", stats.max_queued_bytes);

        self.print_kv_u32("last_process_us", self.last_process_us);
        self.print_kv_u32("last_drdy_to_process_latency_us", self.latency_us);
        self.print_jitter_summary();
        self.print_loff_status();
    }

    fn print_jitter_summary(&mut self) {
        let stats = self.drdy.capture_stats();
        self.print_kv_u32("drdy_interval_last_us", stats.interval_last_us);
        self.print_kv_u32("drdy_interval_min_us", stats.interval_min_display());
        self.print_kv_u32("drdy_interval_max_us", stats.interval_max_us);
        self.print_kv_u32("drdy_jitter_abs_last_us", stats.jitter_last_us);
        self.print_kv_u32("drdy_jitter_abs_min_us", stats.jitter_min_display());
        self.print_kv_u32("drdy_jitter_abs_max_us", stats.jitter_max_us);
        self.print_kv_u32("drdy_interval_count", stats.interval_count);
        self.print_kv_u32("drdy_interval_avg_us", stats.interval_avg_us());
        self.print_kv_u32("drdy_jitter_abs_avg_us", stats.jitter_avg_us());
        self.print_kv_u64("drdy_interval_sum_us", stats.interval_sum_us);
        self.print_kv_u64("drdy_jitter_abs_sum_us", stats.jitter_sum_us);
    }

    fn print_loff_status(&mut self) {
        let header_ok = StatusWord::new(self.last_status24).header_valid();
        let mut line: String<96> = String::new();
        let _ = write!(
            line,
            "# LOFF status24=0x{:X} p=0x{:X} n=0x{:X} header_ok={}",
            self.last_status24,
            self.last_loff_p,
            self.last_loff_n,
            u8::from(header_ok)
        );
        self.print_line(&line);
    }

    fn dump_registers(&mut self) {
        match self.ads.dump_registers() {
            Ok(window) => {
                self.print_line("# REG_DUMP_BEGIN");
                for (reg, value) in window.iter().enumerate() {
                    let mut line: String<16> = String::new();
                    let _ = write!(line, "0x{reg:02X},0x{value:02X}");
                    self.print_line(&line);
                }
                self.print_line("# REG_DUMP_END");
            }
            Err(_) => self.print_line("# ERR REG_DUMP_FAIL"),
        }
    }
}
