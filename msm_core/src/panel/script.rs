//! Panel command scripts.
//!
//! Panel vendors describe power sequences as a list of register writes with delays in between.
//! A [`Step`] slice holds such a list as plain data and [`replay`] sends it to the panel.

use itertools::Itertools;
use log::{debug, error};

use super::dsi::{self, DsiError, DsiHost};
use super::mipi::Delay;

/// A DCS command whose failure stops the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checked {
    /// Set the display brightness.
    SetDisplayBrightness(u16),
    /// Turn the display on.
    SetDisplayOn,
    /// Turn the display off.
    SetDisplayOff,
    /// Wake the panel from sleep.
    ExitSleepMode,
    /// Put the panel to sleep.
    EnterSleepMode,
}

impl Checked {
    fn send<H: DsiHost + ?Sized>(self, host: &mut H) -> Result<(), DsiError> {
        match self {
            Self::SetDisplayBrightness(level) => dsi::set_display_brightness(host, level),
            Self::SetDisplayOn => dsi::set_display_on(host),
            Self::SetDisplayOff => dsi::set_display_off(host),
            Self::ExitSleepMode => dsi::exit_sleep_mode(host),
            Self::EnterSleepMode => dsi::enter_sleep_mode(host),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::SetDisplayBrightness(_) => "set display brightness",
            Self::SetDisplayOn => "set display on",
            Self::SetDisplayOff => "set display off",
            Self::ExitSleepMode => "exit sleep mode",
            Self::EnterSleepMode => "enter sleep mode",
        }
    }
}

/// One step of a panel script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A generic write; the first byte is the register. Failures are ignored.
    Generic(&'static [u8]),
    /// A DCS write. Failures are ignored.
    Dcs {
        /// Command opcode.
        cmd: u8,
        /// Command parameters.
        payload: &'static [u8],
    },
    /// A DCS command whose failure aborts the script.
    Command(Checked),
    /// Wait for the given number of milliseconds.
    Sleep(u32),
}

/// Send `steps` to the panel in order.
///
/// # Errors
/// Returns the transport error of the first [`Step::Command`] that fails. Nothing after it is
/// sent.
pub fn replay<H, D>(host: &mut H, delay: &mut D, steps: &[Step]) -> Result<(), DsiError>
where
    H: DsiHost + ?Sized,
    D: Delay + ?Sized,
{
    for step in steps {
        match *step {
            Step::Generic(payload) => {
                let outcome = host.generic_write(payload);
                debug!("generic [{:02x}] -> {outcome:?}", payload.iter().format(" "));
            }
            Step::Dcs { cmd, payload } => {
                let outcome = host.dcs_write(cmd, payload);
                debug!("dcs {cmd:02x} [{:02x}] -> {outcome:?}", payload.iter().format(" "));
            }
            Step::Command(command) => {
                if let Err(e) = command.send(host) {
                    error!("Failed to {}: {e}", command.describe());
                    return Err(e);
                }
            }
            Step::Sleep(ms) => delay.msleep(ms),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{Event, Recorder};
    use super::*;
    use std::prelude::rust_2021::*;

    static SCRIPT: &[Step] = &[
        Step::Generic(&[0xb0, 0x00]),
        Step::Dcs {
            cmd: 0x53,
            payload: &[0x24],
        },
        Step::Command(Checked::SetDisplayOn),
        Step::Sleep(20),
        Step::Command(Checked::ExitSleepMode),
        Step::Sleep(120),
    ];

    #[test]
    fn replays_in_order() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut rec = Recorder::default();
        let mut delay = rec.clone();
        replay(&mut rec, &mut delay, SCRIPT).unwrap();
        assert_eq!(
            rec.events(),
            [
                Event::Generic(vec![0xb0, 0x00]),
                Event::Dcs(0x53, vec![0x24]),
                Event::Dcs(0x29, vec![]),
                Event::Sleep(20),
                Event::Dcs(0x11, vec![]),
                Event::Sleep(120),
            ]
        );
    }

    #[test]
    fn unchecked_failures_are_ignored() {
        let mut rec = Recorder::failing(|e| !matches!(e, Event::Dcs(0x29 | 0x11, _)));
        let mut delay = rec.clone();
        assert_eq!(replay(&mut rec, &mut delay, SCRIPT), Ok(()));
        assert_eq!(rec.events().len(), SCRIPT.len());
    }

    #[test]
    fn checked_failure_aborts() {
        let mut rec = Recorder::failing(|e| matches!(e, Event::Dcs(0x29, _)));
        let mut delay = rec.clone();
        assert_eq!(
            replay(&mut rec, &mut delay, SCRIPT),
            Err(Recorder::ERROR)
        );
        assert_eq!(
            rec.events(),
            [
                Event::Generic(vec![0xb0, 0x00]),
                Event::Dcs(0x53, vec![0x24]),
                Event::Dcs(0x29, vec![]),
            ]
        );
    }
}
