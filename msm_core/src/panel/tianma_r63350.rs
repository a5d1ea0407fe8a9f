//! Tianma 1080p video mode panel with a Renesas R63350 controller, as found in the Xiaomi Mi
//! Max 2 (oxygen).
//!
//! The command scripts come from the vendor's device tree and must be sent exactly as they are.

use super::dsi::{dcs, ModeFlags, PixelFormat};
use super::mipi::{Delay, DisplayMode, PanelInfo, ResetLine};
use super::script::{Checked, Step};
use crate::platform::OfMatch;

/// Name the driver registers under.
pub const DRIVER_NAME: &str = "tianma-r63350";

fn reset(line: &mut dyn ResetLine, delay: &mut dyn Delay) {
    line.set_asserted(true);
    delay.usleep_range(5000, 6000);
    line.set_asserted(false);
    delay.usleep_range(10000, 11000);
}

/// Sent on power on.
pub static POWER_ON: &[Step] = &[
    Step::Generic(&[0xb0, 0x00]),
    Step::Generic(&[0xd6, 0x01]),
    Step::Generic(&[0xc2, 0x31, 0xf7, 0x80, 0x17, 0x18, 0x00, 0x00, 0x08]),
    Step::Generic(&[
        0xd3, 0x1b, 0x33, 0x99, 0xbb, 0xb3, 0x33, 0x33, 0x33, 0x11, 0x00, 0x01, 0x00, 0x00, 0xd8,
        0xa0, 0x05, 0x3f, 0x3f, 0x33, 0x33, 0x72, 0x12, 0x8a, 0x57, 0x3d, 0xbc,
    ]),
    Step::Generic(&[
        0xc7, 0x00, 0x12, 0x1a, 0x25, 0x33, 0x42, 0x4c, 0x5c, 0x42, 0x4a, 0x55, 0x5f, 0x69, 0x6f,
        0x75, 0x00, 0x12, 0x1a, 0x25, 0x33, 0x42, 0x4c, 0x5c, 0x42, 0x4a, 0x55, 0x5f, 0x69, 0x6f,
        0x75,
    ]),
    Step::Generic(&[
        0xc8, 0x01, 0x00, 0xfe, 0x00, 0xfe, 0xc8, 0x00, 0x00, 0x02, 0x00, 0x00, 0xfc, 0x00, 0x04,
        0xfe, 0x04, 0x0d, 0xed, 0x00,
    ]),
    Step::Generic(&[0xb0, 0x03]),
    Step::Command(Checked::SetDisplayBrightness(0x00ff)),
    Step::Dcs {
        cmd: dcs::WRITE_CONTROL_DISPLAY,
        payload: &[0x24],
    },
    Step::Dcs {
        cmd: dcs::WRITE_POWER_SAVE,
        payload: &[0x00],
    },
    Step::Command(Checked::SetDisplayOn),
    Step::Sleep(20),
    Step::Command(Checked::ExitSleepMode),
    Step::Sleep(120),
];

/// Sent on power off.
pub static POWER_OFF: &[Step] = &[
    Step::Command(Checked::SetDisplayOff),
    Step::Sleep(20),
    Step::Generic(&[0xb0, 0x00]),
    Step::Generic(&[
        0xd3, 0x13, 0x33, 0x99, 0xb3, 0xb3, 0x33, 0x33, 0x33, 0x11, 0x00, 0x01, 0x00, 0x00, 0xd8,
        0xa0, 0x05, 0x3f, 0x3f, 0x33, 0x33, 0x72, 0x12, 0x8a, 0x57, 0x3d, 0xbc,
    ]),
    Step::Sleep(50),
    Step::Generic(&[0xb0, 0x03]),
    Step::Command(Checked::EnterSleepMode),
    Step::Sleep(50),
];

const HDISPLAY: u16 = 1080;
const HFP: u16 = 150;
const HSYNC: u16 = 10;
const HBP: u16 = 40;
const VDISPLAY: u16 = 1920;
const VFP: u16 = 24;
const VSYNC: u16 = 2;
const VBP: u16 = 21;
const HTOTAL: u16 = HDISPLAY + HFP + HSYNC + HBP;
const VTOTAL: u16 = VDISPLAY + VFP + VSYNC + VBP;

/// The panel's description.
pub static TIANMA_R63350: PanelInfo = PanelInfo {
    mode: DisplayMode {
        clock: HTOTAL as u32 * VTOTAL as u32 * 60 / 1000,
        hdisplay: HDISPLAY,
        hsync_start: HDISPLAY + HFP,
        hsync_end: HDISPLAY + HFP + HSYNC,
        htotal: HTOTAL,
        vdisplay: VDISPLAY,
        vsync_start: VDISPLAY + VFP,
        vsync_end: VDISPLAY + VFP + VSYNC,
        vtotal: VTOTAL,
        width_mm: 80,
        height_mm: 142,
    },
    lanes: 4,
    format: PixelFormat::Rgb888,
    // video | video burst | non-continuous clock
    mode_flags: ModeFlags::from_bits(0x403),
    reset,
    power_on: POWER_ON,
    power_off: POWER_OFF,
};

/// Devices handled by this driver.
pub static OF_MATCH: &[OfMatch<PanelInfo>] = &[OfMatch {
    compatible: b"xiaomi,oxygen-tianma-r63350",
    data: &TIANMA_R63350,
}];
