//! DRDY edge accounting shared between the interrupt handler and the
//! main loop.
//!
//! The tracker is owned by the falling-edge ISR; the main loop only ever
//! sees it through snapshot functions that capture, clear, and return in
//! one critical section. `on_edge` does bounded work with no allocation
//! and no logging, so it is safe to call from interrupt context.
//!
//! ```ignore
//! static DRDY: SharedDrdy = SharedDrdy::new();
//!
//! // Platform ISR on the DRDY falling edge:
//! fn drdy_isr() {
//!     DRDY.on_edge(timer::now_us());
//! }
//! ```

use core::cell::RefCell;

use critical_section::Mutex;

/// Sentinel for min fields that have not yet seen a value.
const MIN_UNSET: u32 = u32::MAX;

/// Snapshot handed to the sample pipeline for one pending DRDY edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DrdySnapshot {
    /// Timestamp of the captured edge in microseconds
    pub timestamp_us: u32,
    /// Most recent inter-edge interval in microseconds
    pub interval_us: u32,
    /// Edges missed since the previous consumed snapshot
    pub missed_frame: u32,
    /// Total missed edges since boot
    pub missed_total: u32,
    /// Total edges since boot
    pub edges_total: u32,
}

/// Full timing statistics for diagnostic commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DrdyStats {
    /// Last inter-edge interval in microseconds
    pub interval_last_us: u32,
    /// Minimum interval seen (`u32::MAX` until the first interval)
    pub interval_min_us: u32,
    /// Maximum interval seen
    pub interval_max_us: u32,
    /// Last |interval - expected| jitter in microseconds
    pub jitter_last_us: u32,
    /// Minimum jitter seen (`u32::MAX` until the first interval)
    pub jitter_min_us: u32,
    /// Maximum jitter seen
    pub jitter_max_us: u32,
    /// Number of intervals accumulated
    pub interval_count: u32,
    /// Sum of all intervals
    pub interval_sum_us: u64,
    /// Sum of all jitter values
    pub jitter_sum_us: u64,
    /// Total edges since boot
    pub edges_total: u32,
    /// Total missed edges since boot
    pub missed_total: u32,
    /// Timestamp of the most recent edge
    pub last_edge_us: u32,
}

impl DrdyStats {
    /// Minimum interval with the unset sentinel mapped to 0 for display.
    #[must_use]
    pub const fn interval_min_display(&self) -> u32 {
        if self.interval_min_us == MIN_UNSET { 0 } else { self.interval_min_us }
    }

    /// Minimum jitter with the unset sentinel mapped to 0 for display.
    #[must_use]
    pub const fn jitter_min_display(&self) -> u32 {
        if self.jitter_min_us == MIN_UNSET { 0 } else { self.jitter_min_us }
    }

    /// Mean interval, 0 before the first interval.
    #[must_use]
    pub fn interval_avg_us(&self) -> u32 {
        if self.interval_count == 0 {
            0
        } else {
            (self.interval_sum_us / u64::from(self.interval_count)) as u32
        }
    }

    /// Mean jitter, 0 before the first interval.
    #[must_use]
    pub fn jitter_avg_us(&self) -> u32 {
        if self.interval_count == 0 {
            0
        } else {
            (self.jitter_sum_us / u64::from(self.interval_count)) as u32
        }
    }
}

struct Tracker {
    pending: bool,
    edges_total: u32,
    missed_total: u32,
    missed_current: u32,
    last_edge_us: u32,
    prev_edge_us: u32,
    interval_last_us: u32,
    interval_min_us: u32,
    interval_max_us: u32,
    interval_count: u32,
    interval_sum_us: u64,
    jitter_last_us: u32,
    jitter_min_us: u32,
    jitter_max_us: u32,
    jitter_sum_us: u64,
    expected_period_us: u32,
}

impl Tracker {
    const fn new() -> Self {
        Self {
            pending: false,
            edges_total: 0,
            missed_total: 0,
            missed_current: 0,
            last_edge_us: 0,
            prev_edge_us: 0,
            interval_last_us: 0,
            interval_min_us: MIN_UNSET,
            interval_max_us: 0,
            interval_count: 0,
            interval_sum_us: 0,
            jitter_last_us: 0,
            jitter_min_us: MIN_UNSET,
            jitter_max_us: 0,
            jitter_sum_us: 0,
            expected_period_us: 4000,
        }
    }

    fn on_edge(&mut self, now_us: u32) {
        self.edges_total = self.edges_total.wrapping_add(1);
        self.last_edge_us = now_us;

        if self.prev_edge_us != 0 {
            let dt = now_us.wrapping_sub(self.prev_edge_us);
            let jitter = dt.abs_diff(self.expected_period_us);

            self.interval_last_us = dt;
            if dt < self.interval_min_us {
                self.interval_min_us = dt;
            }
            if dt > self.interval_max_us {
                self.interval_max_us = dt;
            }
            self.interval_count = self.interval_count.wrapping_add(1);
            self.interval_sum_us += u64::from(dt);

            self.jitter_last_us = jitter;
            if jitter < self.jitter_min_us {
                self.jitter_min_us = jitter;
            }
            if jitter > self.jitter_max_us {
                self.jitter_max_us = jitter;
            }
            self.jitter_sum_us += u64::from(jitter);
        }

        self.prev_edge_us = now_us;

        if self.pending {
            self.missed_total = self.missed_total.wrapping_add(1);
            self.missed_current = self.missed_current.wrapping_add(1);
        } else {
            self.pending = true;
        }
    }

    /// Clears per-stream state; cumulative edge/missed totals survive.
    fn reset(&mut self, expected_period_us: u32) {
        self.pending = false;
        self.missed_current = 0;
        self.last_edge_us = 0;
        self.prev_edge_us = 0;
        self.interval_last_us = 0;
        self.interval_min_us = MIN_UNSET;
        self.interval_max_us = 0;
        self.interval_count = 0;
        self.interval_sum_us = 0;
        self.jitter_last_us = 0;
        self.jitter_min_us = MIN_UNSET;
        self.jitter_max_us = 0;
        self.jitter_sum_us = 0;
        self.expected_period_us = expected_period_us;
    }
}

/// The DRDY timing block, shareable with the interrupt handler.
///
/// Suitable for a `static`; all access goes through critical sections.
pub struct SharedDrdy {
    inner: Mutex<RefCell<Tracker>>,
}

impl SharedDrdy {
    /// Create a tracker with everything zeroed and min sentinels set.
    #[must_use]
    pub const fn new() -> Self {
        Self { inner: Mutex::new(RefCell::new(Tracker::new())) }
    }

    /// Record one falling edge. Call from the DRDY ISR.
    pub fn on_edge(&self, now_us: u32) {
        critical_section::with(|cs| {
            self.inner.borrow_ref_mut(cs).on_edge(now_us);
        });
    }

    /// Capture-and-clear the pending edge, if any.
    ///
    /// Returns `None` when no edge has fired since the last capture.
    /// Otherwise clears the pending flag and the per-frame missed count
    /// inside the same critical section and returns the snapshot.
    pub fn capture_pending(&self) -> Option<DrdySnapshot> {
        critical_section::with(|cs| {
            let mut t = self.inner.borrow_ref_mut(cs);
            if !t.pending {
                return None;
            }
            let snapshot = DrdySnapshot {
                timestamp_us: t.last_edge_us,
                interval_us: t.interval_last_us,
                missed_frame: t.missed_current,
                missed_total: t.missed_total,
                edges_total: t.edges_total,
            };
            t.pending = false;
            t.missed_current = 0;
            Some(snapshot)
        })
    }

    /// Snapshot the full timing block for diagnostics. Does not clear
    /// anything.
    pub fn capture_stats(&self) -> DrdyStats {
        critical_section::with(|cs| {
            let t = self.inner.borrow_ref(cs);
            DrdyStats {
                interval_last_us: t.interval_last_us,
                interval_min_us: t.interval_min_us,
                interval_max_us: t.interval_max_us,
                jitter_last_us: t.jitter_last_us,
                jitter_min_us: t.jitter_min_us,
                jitter_max_us: t.jitter_max_us,
                interval_count: t.interval_count,
                interval_sum_us: t.interval_sum_us,
                jitter_sum_us: t.jitter_sum_us,
                edges_total: t.edges_total,
                missed_total: t.missed_total,
                last_edge_us: t.last_edge_us,
            }
        })
    }

    /// Reset per-stream timing state for a new acquisition run.
    ///
    /// Cumulative edge and missed totals are preserved; the expected
    /// period used for jitter is updated to the new rate.
    pub fn reset(&self, expected_period_us: u32) {
        critical_section::with(|cs| {
            self.inner.borrow_ref_mut(cs).reset(expected_period_us);
        });
    }
}

impl Default for SharedDrdy {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
