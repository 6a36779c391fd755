//! End-to-end tests for the device supervisor against mock peripherals.
//!
//! The mocks model just enough of the board to drive the real loop: a
//! scripted ADS1299 behind the SPI transactions the driver issues, a
//! capturing serial port with settable backpressure, shared GPIO cells,
//! and a manually advanced microsecond clock. DRDY interrupts are
//! simulated by calling `SharedDrdy::on_edge` directly, exactly as the
//! platform ISR would.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::{ErrorKind, Operation, SpiDevice};

use spindle_eeg_core::codec::cobs_decode;
use spindle_eeg_core::drdy::SharedDrdy;
use spindle_eeg_core::frame::sample_flags;
use spindle_eeg_core::protocol::{error_code, event_code, parse_packet, Packet};
use spindle_eeg_fw::device::{Device, DeviceConfig, OutputMode};
use spindle_eeg_fw::hal::{Micros, NoWatchdog, SerialIo};
use spindle_eeg_fw::Ads1299;
use spindle_eeg_core::ring::SerialSink;

// ============================================================================
// Mock clock
// ============================================================================

#[derive(Clone)]
struct FakeClock {
    us: Rc<Cell<u32>>,
    step: Rc<Cell<u32>>,
}

impl FakeClock {
    fn at(start_us: u32) -> Self {
        Self { us: Rc::new(Cell::new(start_us)), step: Rc::new(Cell::new(0)) }
    }

    fn set_us(&self, t: u32) {
        self.us.set(t);
    }

    fn get_us(&self) -> u32 {
        self.us.get()
    }

    /// Make every `now_us` read advance time, so bounded busy-waits
    /// (self-test DRDY polls) terminate.
    fn set_auto_step(&self, step_us: u32) {
        self.step.set(step_us);
    }
}

impl Micros for FakeClock {
    fn now_us(&self) -> u32 {
        let t = self.us.get();
        let step = self.step.get();
        if step > 0 {
            self.us.set(t.wrapping_add(step));
        }
        t
    }
}

// ============================================================================
// Mock GPIO
// ============================================================================

#[derive(Clone)]
struct MockPin {
    high: Rc<Cell<bool>>,
}

impl MockPin {
    fn new(high: bool) -> Self {
        Self { high: Rc::new(Cell::new(high)) }
    }

    fn set(&self, high: bool) {
        self.high.set(high);
    }

    fn is_set_high(&self) -> bool {
        self.high.get()
    }
}

impl embedded_hal::digital::ErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.high.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.high.set(true);
        Ok(())
    }
}

impl InputPin for MockPin {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.high.get())
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.high.get())
    }
}

// ============================================================================
// Mock delay
// ============================================================================

struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

// ============================================================================
// Mock serial
// ============================================================================

struct SerialState {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    available: usize,
}

#[derive(Clone)]
struct MockSerial {
    state: Rc<RefCell<SerialState>>,
}

impl MockSerial {
    fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(SerialState {
                rx: VecDeque::new(),
                tx: Vec::new(),
                available: usize::MAX,
            })),
        }
    }

    fn push_line(&self, line: &str) {
        let mut st = self.state.borrow_mut();
        st.rx.extend(line.as_bytes());
        st.rx.push_back(b'\n');
    }

    fn set_available(&self, available: usize) {
        self.state.borrow_mut().available = available;
    }

    fn take_tx(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.borrow_mut().tx)
    }

    fn tx_text(&self) -> String {
        String::from_utf8_lossy(&self.state.borrow().tx).into_owned()
    }

    fn clear_tx(&self) {
        self.state.borrow_mut().tx.clear();
    }
}

impl SerialSink for MockSerial {
    fn available_for_write(&mut self) -> usize {
        self.state.borrow().available
    }

    fn write(&mut self, data: &[u8]) -> usize {
        let mut st = self.state.borrow_mut();
        let take = data.len().min(st.available);
        st.tx.extend_from_slice(&data[..take]);
        if st.available != usize::MAX {
            st.available -= take;
        }
        take
    }
}

impl SerialIo for MockSerial {
    fn read_byte(&mut self) -> Option<u8> {
        self.state.borrow_mut().rx.pop_front()
    }
}

// ============================================================================
// Mock ADS1299 behind the SPI
// ============================================================================

const REG_WINDOW: usize = 0x18;

struct AdsModel {
    regs: [u8; REG_WINDOW],
    id: u8,
    stuck_reg: Option<(u8, u8)>,
    frames: VecDeque<[u8; 15]>,
    default_frame: [u8; 15],
    frame_gen: Option<Box<dyn FnMut(u32) -> [u8; 15]>>,
    frame_counter: u32,
    fail_all: bool,
    fail_frame_reads: bool,
}

impl AdsModel {
    fn new() -> Self {
        Self {
            regs: [0; REG_WINDOW],
            id: 0x3E,
            stuck_reg: None,
            frames: VecDeque::new(),
            default_frame: frame_bytes(0xC0_0000, [1, 2, 3, 4]),
            frame_gen: None,
            frame_counter: 0,
            fail_all: false,
            fail_frame_reads: false,
        }
    }

    fn read_reg(&self, reg: usize) -> u8 {
        if reg == 0 {
            return self.id;
        }
        if let Some((stuck, value)) = self.stuck_reg {
            if usize::from(stuck) == reg {
                return value;
            }
        }
        self.regs.get(reg).copied().unwrap_or(0)
    }

    fn next_frame(&mut self) -> [u8; 15] {
        let counter = self.frame_counter;
        self.frame_counter = self.frame_counter.wrapping_add(1);
        if let Some(frame) = self.frames.pop_front() {
            return frame;
        }
        if let Some(gen) = self.frame_gen.as_mut() {
            return gen(counter);
        }
        self.default_frame
    }
}

fn frame_bytes(status24: u32, channels: [i32; 4]) -> [u8; 15] {
    let mut frame = [0u8; 15];
    frame[0] = (status24 >> 16) as u8;
    frame[1] = (status24 >> 8) as u8;
    frame[2] = status24 as u8;
    for (ch, value) in channels.iter().enumerate() {
        let raw = (*value as u32) & 0x00FF_FFFF;
        let offset = 3 + ch * 3;
        frame[offset] = (raw >> 16) as u8;
        frame[offset + 1] = (raw >> 8) as u8;
        frame[offset + 2] = raw as u8;
    }
    frame
}

#[derive(Debug)]
struct MockSpiError;

impl embedded_hal::spi::Error for MockSpiError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

#[derive(Clone)]
struct MockSpi {
    model: Rc<RefCell<AdsModel>>,
}

impl embedded_hal::spi::ErrorType for MockSpi {
    type Error = MockSpiError;
}

impl SpiDevice<u8> for MockSpi {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), MockSpiError> {
        let mut model = self.model.borrow_mut();
        if model.fail_all {
            return Err(MockSpiError);
        }

        let mut reg_read_start: Option<u8> = None;
        for op in operations.iter_mut() {
            match op {
                Operation::DelayNs(_) => {}
                Operation::Write(words) => {
                    let opcode = words[0];
                    if opcode & 0xE0 == 0x20 {
                        reg_read_start = Some(opcode & 0x1F);
                    } else if opcode & 0xE0 == 0x40 {
                        let reg = usize::from(opcode & 0x1F);
                        if reg < REG_WINDOW && words.len() >= 3 {
                            model.regs[reg] = words[2];
                        }
                    }
                    // Bare opcodes (SDATAC, START, ...) need no modeling.
                }
                Operation::Read(buf) => {
                    if let Some(start) = reg_read_start {
                        for (i, slot) in buf.iter_mut().enumerate() {
                            *slot = model.read_reg(usize::from(start) + i);
                        }
                    } else {
                        if model.fail_frame_reads {
                            return Err(MockSpiError);
                        }
                        let frame = model.next_frame();
                        buf.copy_from_slice(&frame[..buf.len()]);
                    }
                }
                _ => panic!("unexpected SPI operation"),
            }
        }
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

type TestDevice<'a> = Device<
    'a,
    MockSpi,
    MockPin,
    MockPin,
    MockPin,
    NoDelay,
    MockPin,
    MockPin,
    MockSerial,
    FakeClock,
    NoWatchdog,
>;

struct Harness {
    clock: FakeClock,
    serial: MockSerial,
    model: Rc<RefCell<AdsModel>>,
    drdy_pin: MockPin,
    button: MockPin,
    led: MockPin,
}

fn build(drdy: &SharedDrdy) -> (Harness, TestDevice<'_>) {
    let clock = FakeClock::at(1_000_000);
    let serial = MockSerial::new();
    let model = Rc::new(RefCell::new(AdsModel::new()));
    let drdy_pin = MockPin::new(true);
    let button = MockPin::new(true);
    let led = MockPin::new(false);

    let ads = Ads1299::new(
        MockSpi { model: Rc::clone(&model) },
        MockPin::new(true),
        MockPin::new(false),
        drdy_pin.clone(),
        NoDelay,
    );
    let device = Device::new(
        ads,
        drdy,
        serial.clone(),
        button.clone(),
        led.clone(),
        clock.clone(),
        NoWatchdog,
        DeviceConfig::default(),
    );

    let harness = Harness { clock, serial, model, drdy_pin, button, led };
    (harness, device)
}

fn edge(drdy: &SharedDrdy, clock: &FakeClock, t_us: u32) {
    clock.set_us(t_us);
    drdy.on_edge(t_us);
}

fn drain(device: &mut TestDevice<'_>) {
    for _ in 0..8 {
        device.service_tx();
    }
}

fn decode_packets(bytes: &[u8]) -> Vec<Packet> {
    bytes
        .split(|&b| b == 0)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            let mut raw = [0u8; 64];
            let len = cobs_decode(chunk, &mut raw).expect("well-formed COBS frame");
            parse_packet(&raw[..len]).expect("well-formed packet")
        })
        .collect()
}

fn sample_records(packets: &[Packet]) -> Vec<spindle_eeg_core::protocol::SampleRecord> {
    packets
        .iter()
        .filter_map(|p| match p {
            Packet::Sample(record) => Some(*record),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn boot_emits_init_ok_event() {
    let drdy = SharedDrdy::new();
    let (harness, mut device) = build(&drdy);

    device.boot();
    drain(&mut device);

    let packets = decode_packets(&harness.serial.take_tx());
    assert_eq!(
        packets,
        vec![Packet::Event { code: event_code::INIT_OK, a: 0x3E, b: 1, c: 0 }]
    );
}

#[test]
fn ping_prints_pong_and_no_packets() {
    let drdy = SharedDrdy::new();
    let (harness, mut device) = build(&drdy);
    device.boot();
    drain(&mut device);
    harness.serial.clear_tx();

    harness.serial.push_line("PING");
    device.tick();

    let text = harness.serial.tx_text();
    assert!(text.contains("# PONG"), "missing pong in {text:?}");
    assert!(!text.contains('\0'), "binary packet leaked into {text:?}");
}

#[test]
fn start_emits_stream_event_then_first_sample() {
    let drdy = SharedDrdy::new();
    let (harness, mut device) = build(&drdy);
    device.boot();
    drain(&mut device);
    harness.serial.clear_tx();

    harness.serial.push_line("START");
    device.tick();
    assert!(device.is_streaming());

    edge(&drdy, &harness.clock, 1_004_000);
    device.tick();
    drain(&mut device);

    let packets = decode_packets(&harness.serial.take_tx());
    assert_eq!(packets[0], Packet::Event { code: event_code::STREAM_STATE, a: 1, b: 0, c: 0 });

    let samples = sample_records(&packets);
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].sample_index, 0);
    assert_eq!(samples[0].t_us, 1_004_000);
    assert_eq!(samples[0].channels, [1, 2, 3, 4]);
    assert_eq!(samples[0].flags & sample_flags::STREAMING, sample_flags::STREAMING);
    assert_eq!(samples[0].flags & sample_flags::RECOVERED, 0);
    assert!(harness.led.is_set_high());
}

#[test]
fn sample_emitted_in_drdy_order_at_most_one_per_edge() {
    let drdy = SharedDrdy::new();
    let (harness, mut device) = build(&drdy);
    device.boot();
    harness.serial.push_line("START");
    device.tick();
    drain(&mut device);
    harness.serial.clear_tx();

    let mut t = 1_004_000;
    for _ in 0..5 {
        edge(&drdy, &harness.clock, t);
        device.tick();
        // A tick without a pending edge emits nothing.
        device.tick();
        t += 4000;
    }
    drain(&mut device);

    let samples = sample_records(&decode_packets(&harness.serial.take_tx()));
    assert_eq!(samples.len(), 5);
    for (i, record) in samples.iter().enumerate() {
        assert_eq!(record.sample_index, i as u32);
    }
}

#[test]
fn missed_edges_are_accounted_and_flagged() {
    let drdy = SharedDrdy::new();
    let (harness, mut device) = build(&drdy);
    device.boot();
    harness.serial.push_line("START");
    device.tick();
    drain(&mut device);
    harness.serial.clear_tx();

    // Three edges before the loop runs again: two are missed.
    drdy.on_edge(1_004_000);
    drdy.on_edge(1_008_000);
    edge(&drdy, &harness.clock, 1_012_000);
    device.tick();
    drain(&mut device);

    let samples = sample_records(&decode_packets(&harness.serial.take_tx()));
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].missed_drdy_frame, 2);
    assert_eq!(samples[0].flags & sample_flags::DRDY_MISSED, sample_flags::DRDY_MISSED);
}

#[test]
fn tx_overflow_drops_whole_packets_and_flags_once() {
    let drdy = SharedDrdy::new();
    let (harness, mut device) = build(&drdy);
    device.boot();
    harness.serial.push_line("START");
    device.tick();
    drain(&mut device);
    harness.serial.clear_tx();

    // Host stops reading: the ring fills, then every admission drops.
    harness.serial.set_available(0);
    let mut t = 1_004_000;
    for _ in 0..250 {
        edge(&drdy, &harness.clock, t);
        device.tick();
        t += 4000;
    }
    let stats = device.tx_stats();
    assert!(stats.packets_dropped_total > 0);
    assert!(stats.bytes_dropped_total > 0);
    let queued_before = device.tx_queued_bytes();

    // Host resumes: two more samples; only the first carries the sticky
    // overflow flag.
    harness.serial.set_available(usize::MAX);
    for _ in 0..2 {
        edge(&drdy, &harness.clock, t);
        device.tick();
        t += 4000;
    }
    drain(&mut device);

    let samples = sample_records(&decode_packets(&harness.serial.take_tx()));
    let flagged: Vec<_> = samples
        .iter()
        .filter(|r| r.flags & sample_flags::TX_OVERFLOW != 0)
        .collect();
    assert_eq!(flagged.len(), 1, "overflow flag must appear exactly once");
    assert!(queued_before > 0);
}

#[test]
fn drdy_stall_recovers_and_flags_next_sample() {
    let drdy = SharedDrdy::new();
    let (harness, mut device) = build(&drdy);
    device.boot();
    harness.serial.push_line("START");
    device.tick();

    // One good frame at t = 1.004s.
    edge(&drdy, &harness.clock, 1_004_000);
    device.tick();
    drain(&mut device);
    harness.serial.clear_tx();

    // A 20 ms gap is below the 32 ms stall threshold: no recovery.
    harness.clock.set_us(1_024_000);
    device.tick();
    assert_eq!(device.counters().recoveries_total, 0);

    // A 40 ms gap trips the stall detector.
    harness.clock.set_us(1_044_000);
    device.tick();
    assert_eq!(device.counters().recoveries_total, 1);
    assert!(device.is_streaming());
    drain(&mut device);

    let packets = decode_packets(&harness.serial.take_tx());
    assert!(packets.iter().any(|p| matches!(
        p,
        Packet::Error { code, a: _, b: 0 } if *code == error_code::DRDY_TIMEOUT
    )));
    harness.serial.clear_tx();

    // The first post-recovery sample carries the recovered flag and the
    // bumped total; the next one does not.
    let t0 = harness.clock.get_us().wrapping_add(4000);
    edge(&drdy, &harness.clock, t0);
    device.tick();
    edge(&drdy, &harness.clock, t0 + 4000);
    device.tick();
    drain(&mut device);

    let samples = sample_records(&decode_packets(&harness.serial.take_tx()));
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].sample_index, 0, "stream restart rewinds the index");
    assert_eq!(samples[0].flags & sample_flags::RECOVERED, sample_flags::RECOVERED);
    assert_eq!(samples[0].recoveries_total, 1);
    assert_eq!(samples[1].flags & sample_flags::RECOVERED, 0);
}

#[test]
fn invalid_status_header_is_flagged_but_still_delivered() {
    let drdy = SharedDrdy::new();
    let (harness, mut device) = build(&drdy);
    device.boot();
    harness.serial.push_line("START");
    device.tick();
    drain(&mut device);
    harness.serial.clear_tx();

    harness
        .model
        .borrow_mut()
        .frames
        .push_back(frame_bytes(0x40_0000, [5, 6, 7, 8]));

    edge(&drdy, &harness.clock, 1_004_000);
    device.tick();
    drain(&mut device);

    let samples = sample_records(&decode_packets(&harness.serial.take_tx()));
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].status24, 0x40_0000);
    assert_eq!(samples[0].flags & sample_flags::STATUS_INVALID, sample_flags::STATUS_INVALID);
    assert_eq!(device.counters().status_invalid_total, 1);
}

#[test]
fn lead_off_bits_are_counted_and_flagged() {
    let drdy = SharedDrdy::new();
    let (harness, mut device) = build(&drdy);
    device.boot();
    harness.serial.push_line("START");
    device.tick();
    drain(&mut device);
    harness.serial.clear_tx();

    harness
        .model
        .borrow_mut()
        .frames
        .push_back(frame_bytes(0xC0_0302, [5, 6, 7, 8]));

    edge(&drdy, &harness.clock, 1_004_000);
    device.tick();
    drain(&mut device);

    let samples = sample_records(&decode_packets(&harness.serial.take_tx()));
    assert_eq!(samples[0].flags & sample_flags::LEAD_OFF_ANY, sample_flags::LEAD_OFF_ANY);
    assert_eq!(device.counters().lead_off_any_total, 1);
}

#[test]
fn frame_read_failure_emits_error_and_skips_sample() {
    let drdy = SharedDrdy::new();
    let (harness, mut device) = build(&drdy);
    device.boot();
    harness.serial.push_line("START");
    device.tick();
    drain(&mut device);
    harness.serial.clear_tx();

    harness.model.borrow_mut().fail_frame_reads = true;
    edge(&drdy, &harness.clock, 1_004_000);
    device.tick();
    drain(&mut device);

    let packets = decode_packets(&harness.serial.take_tx());
    assert!(packets.iter().any(|p| matches!(
        p,
        Packet::Error { code, a: 0, b: 0 } if *code == error_code::FRAME_READ_FAILED
    )));
    assert!(sample_records(&packets).is_empty());
}

#[test]
fn init_failure_emits_error_packet() {
    let drdy = SharedDrdy::new();
    let (harness, mut device) = build(&drdy);
    harness.model.borrow_mut().id = 0x00; // bus stuck

    device.boot();
    drain(&mut device);

    let packets = decode_packets(&harness.serial.take_tx());
    assert_eq!(
        packets,
        vec![Packet::Error { code: error_code::INIT_FAILED, a: 0, b: 0 }]
    );
}

#[test]
fn readback_mismatch_fails_init() {
    let drdy = SharedDrdy::new();
    let (harness, mut device) = build(&drdy);
    // CONFIG3 always reads back wrong.
    harness.model.borrow_mut().stuck_reg = Some((0x03, 0x00));

    device.boot();
    drain(&mut device);

    let packets = decode_packets(&harness.serial.take_tx());
    assert_eq!(
        packets,
        vec![Packet::Error { code: error_code::INIT_FAILED, a: 0, b: 0 }]
    );

    // START cannot proceed either; it retries init and fails again.
    harness.serial.clear_tx();
    harness.serial.push_line("START");
    device.tick();
    assert!(!device.is_streaming());
}

#[test]
fn unknown_and_overlong_commands_are_rejected() {
    let drdy = SharedDrdy::new();
    let (harness, mut device) = build(&drdy);
    device.boot();
    drain(&mut device);
    harness.serial.clear_tx();

    harness.serial.push_line("bogus cmd");
    device.tick();
    assert!(harness.serial.tx_text().contains("# ERR UNKNOWN_CMD BOGUS CMD"));

    harness.serial.clear_tx();
    harness.serial.push_line(&"X".repeat(120));
    device.tick();
    assert!(harness.serial.tx_text().contains("# ERR CMD_TOO_LONG"));
}

#[test]
fn mode_switch_stops_streaming_first() {
    let drdy = SharedDrdy::new();
    let (harness, mut device) = build(&drdy);
    device.boot();
    harness.serial.push_line("START");
    device.tick();
    assert!(device.is_streaming());

    harness.serial.push_line("MODE CSV");
    device.tick();
    assert!(!device.is_streaming());
    assert_eq!(device.mode(), OutputMode::CsvDebug);
    let text = harness.serial.tx_text();
    assert!(text.contains("# OK MODE CSV"));
    assert!(text.contains("# WARN CSV_DEBUG_ONLY"));
}

#[test]
fn csv_mode_emits_header_and_rows() {
    let drdy = SharedDrdy::new();
    let (harness, mut device) = build(&drdy);
    device.boot();
    harness.serial.push_line("MODE CSV");
    device.tick();
    harness.serial.clear_tx();

    harness.serial.push_line("START");
    device.tick();
    edge(&drdy, &harness.clock, 1_004_000);
    device.tick();

    let text = harness.serial.tx_text();
    assert!(text.contains("sample,drdy_t_us,proc_t_us"), "missing header in {text:?}");
    assert!(text.contains("# STREAM_ON"));
    // index 0, drdy t, proc t, no interval yet, status in decimal
    assert!(
        text.contains(&format!("0,1004000,{},0,{}", harness.clock.get_us(), 0xC0_0000u32)),
        "missing row in {text:?}"
    );
}

#[test]
fn button_toggles_streaming_with_debounce() {
    let drdy = SharedDrdy::new();
    let (harness, mut device) = build(&drdy);
    device.boot();
    assert!(!device.is_streaming());

    // Press: HIGH -> LOW starts streaming.
    harness.button.set(false);
    device.tick();
    assert!(device.is_streaming());

    // Release and immediately press again: debounced away.
    harness.button.set(true);
    device.tick();
    harness.button.set(false);
    device.tick();
    assert!(device.is_streaming());

    // Press again after the debounce window: stops streaming.
    harness.button.set(true);
    device.tick();
    harness.clock.set_us(harness.clock.get_us().wrapping_add(300_000));
    harness.button.set(false);
    device.tick();
    assert!(!device.is_streaming());

    // The toggle flag rides on the next emitted sample.
    harness.clock.set_us(harness.clock.get_us().wrapping_add(300_000));
    harness.button.set(true);
    device.tick();
    harness.button.set(false);
    device.tick();
    assert!(device.is_streaming());
    harness.serial.clear_tx();

    let t = harness.clock.get_us().wrapping_add(4000);
    edge(&drdy, &harness.clock, t);
    device.tick();
    drain(&mut device);

    let samples = sample_records(&decode_packets(&harness.serial.take_tx()));
    assert_eq!(samples[0].flags & sample_flags::BUTTON_TOGGLED, sample_flags::BUTTON_TOGGLED);
}

#[test]
fn self_test_passes_and_restores_state() {
    let drdy = SharedDrdy::new();
    let (harness, mut device) = build(&drdy);
    device.boot();
    harness.serial.push_line("MODE CSV");
    device.tick();
    harness.serial.push_line("START");
    device.tick();
    assert!(device.is_streaming());
    harness.serial.clear_tx();

    {
        let mut model = harness.model.borrow_mut();
        // Square-wave test signal: peak-to-peak 100 counts on every channel.
        model.frame_gen = Some(Box::new(|counter| {
            let level = if counter % 2 == 0 { 0 } else { 100 };
            frame_bytes(0xC0_0000, [level; 4])
        }));
    }
    // DRDY held low so the test's polls return immediately; the auto-
    // stepping clock bounds the post-frame waits.
    harness.drdy_pin.set(false);
    harness.clock.set_auto_step(20);

    harness.serial.push_line("SELFTEST");
    device.tick();
    harness.clock.set_auto_step(0);

    let text = harness.serial.tx_text();
    assert!(text.contains("# SELFTEST RUNNING"));
    assert!(text.contains("# SELFTEST good_frames=32 status_bad=0 result=PASS"));
    assert!(text.contains("# SELFTEST PASS"));

    // Prior state restored: test signal off, lead-off off, streaming back on.
    assert!(device.is_streaming());
    let model = harness.model.borrow();
    assert_eq!(model.regs[0x02], 0xD0, "CONFIG2 back to normal");
    assert_eq!(model.regs[0x05], 0x60, "CH1SET back to electrode input");
    assert_eq!(model.regs[0x0F], 0x00, "LOFF_SENSP stays off");
}

#[test]
fn self_test_reports_event_in_binary_mode() {
    let drdy = SharedDrdy::new();
    let (harness, mut device) = build(&drdy);
    device.boot();
    drain(&mut device);
    harness.serial.clear_tx();

    {
        let mut model = harness.model.borrow_mut();
        model.frame_gen = Some(Box::new(|counter| {
            let level = if counter % 2 == 0 { -60 } else { 60 };
            frame_bytes(0xC0_0000, [level; 4])
        }));
    }
    harness.drdy_pin.set(false);
    harness.clock.set_auto_step(20);

    harness.serial.push_line("SELFTEST");
    device.tick();
    harness.clock.set_auto_step(0);
    drain(&mut device);

    // The two "# SELFTEST ..." text lines precede the event frame on the
    // wire; decode everything after the final one.
    let tx = harness.serial.take_tx();
    let marker = b"# SELFTEST PASS\n";
    let pos = tx
        .windows(marker.len())
        .position(|w| w == marker)
        .expect("self-test verdict line")
        + marker.len();

    let packets = decode_packets(&tx[pos..]);
    assert_eq!(
        packets,
        vec![Packet::Event { code: event_code::SELF_TEST, a: 1, b: 32, c: 0 }]
    );
}

#[test]
fn reinit_restarts_streaming() {
    let drdy = SharedDrdy::new();
    let (harness, mut device) = build(&drdy);
    device.boot();
    harness.serial.push_line("START");
    device.tick();
    assert!(device.is_streaming());

    harness.serial.push_line("REINIT");
    device.tick();
    assert!(device.is_streaming(), "REINIT resumes a running stream");
}
