//! Delays on the ARM generic timer.

use core::arch::asm;
use log::trace;
use msm_core::panel::mipi::Delay;

/// Read the physical counter (`CNTPCT_EL0`).
fn counter() -> u64 {
    let count: u64;
    // SAFETY: reading the counter has no side effects. EL1 access is enabled by firmware.
    unsafe {
        asm!("isb", "mrs {cnt}, CNTPCT_EL0", cnt = out(reg) count);
    }
    count
}

/// Read timer counter frequency register (`CNTFRQ_EL0`).
fn frequency() -> u32 {
    let freq: u64;
    // SAFETY: `CNTFRQ_EL0` is readable at every exception level and reading it has no side
    // effects.
    unsafe {
        asm!("mrs {val}, CNTFRQ_EL0", val = out(reg) freq);
    }
    freq as u32
}

/// Busy waits on the physical counter.
#[derive(Debug)]
pub struct CounterDelay {
    frequency: u64,
}

impl CounterDelay {
    /// Create a delay source from the counter frequency the firmware programmed.
    #[must_use]
    pub fn new() -> Self {
        let freq = frequency();
        trace!("counter at {freq} Hz");
        Self {
            frequency: freq.into(),
        }
    }

    fn spin_us(&self, us: u64) {
        let ticks = us.saturating_mul(self.frequency).div_ceil(1_000_000);
        let end = counter().saturating_add(ticks);
        while counter() < end {
            core::hint::spin_loop();
        }
    }
}

impl Default for CounterDelay {
    fn default() -> Self {
        Self::new()
    }
}

impl Delay for CounterDelay {
    fn msleep(&mut self, ms: u32) {
        self.spin_us(u64::from(ms) * 1000);
    }

    fn usleep_range(&mut self, min_us: u32, _max_us: u32) {
        self.spin_us(min_us.into());
    }
}
