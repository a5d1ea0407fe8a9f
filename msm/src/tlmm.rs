//! Reset lines on the Top Level Mode Multiplexer (TLMM), the Qualcomm GPIO controller.

use bitfield::bitfield;
use msm_core::panel::mipi::ResetLine;

/// Offset of a pin's register block from the one before it.
pub const DEFAULT_PIN_STRIDE: usize = 0x1000;

/// Offset of the in/out register within a pin's block.
const IO_OFFSET: usize = 0x4;

bitfield! {
    /// `GPIO_IN_OUT` register of one pin.
    #[derive(Copy, Clone)]
    struct InOut(u32);
    impl Debug;
    u8;
    output, set_output: 1;
}

/// A TLMM pin driven as a reset line.
pub struct TlmmResetLine {
    io: *mut u32,
    active_low: bool,
}

/// SAFETY: the pin's register is owned by this line.
unsafe impl Send for TlmmResetLine {}

impl TlmmResetLine {
    /// Drive pin `pin` of the TLMM mapped at `base`. An `active_low` line holds the panel in
    /// reset when it is driven low.
    ///
    /// # Safety
    /// `base` must be the mapped TLMM register space, `pin` must exist and already be
    /// configured as an output, and nothing else may drive it.
    pub unsafe fn new(base: *mut u8, pin: usize, stride: usize, active_low: bool) -> Self {
        Self {
            io: base.add(pin * stride + IO_OFFSET).cast(),
            active_low,
        }
    }
}

impl ResetLine for TlmmResetLine {
    fn set_asserted(&mut self, asserted: bool) {
        // SAFETY: `new` requires `io` to be this pin's register.
        unsafe {
            let mut reg = InOut(self.io.read_volatile());
            reg.set_output(asserted != self.active_low);
            self.io.write_volatile(reg.0);
        }
    }
}
