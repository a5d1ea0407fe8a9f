//! Memory mapped debug console.
//!
//! The boot loader leaves the serial port configured, so all that is needed to print is a
//! write to the transmit register.

use msm_core::logger::LogSink;

/// A console that prints by writing one byte at a time to a transmit register.
pub struct MmioConsole {
    tx: *mut u32,
}

/// SAFETY: the transmit register is only written through the logger, which serializes access
/// behind its lock.
unsafe impl Send for MmioConsole {}

impl MmioConsole {
    /// Create a console over the transmit register at `tx`.
    ///
    /// # Safety
    /// `tx` must be the mapped address of a transmit register that accepts one byte per 32-bit
    /// write, and nothing else may write to it while the console exists.
    pub unsafe fn new(tx: *mut u32) -> Self {
        Self { tx }
    }

    fn write_byte(&mut self, byte: u8) {
        // SAFETY: `new` requires `tx` to be a valid, exclusively owned register.
        unsafe {
            self.tx.write_volatile(u32::from(byte));
        }
    }
}

impl LogSink for MmioConsole {
    fn accept(&mut self, line: &[u8]) {
        for &byte in line {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
    }
}
