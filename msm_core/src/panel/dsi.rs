//! MIPI DSI host interface and Display Command Set (DCS) helpers.

use bitfield::bitfield;
use byteorder::{ByteOrder, LittleEndian};
#[cfg(test)]
use mockall::automock;
use snafu::Snafu;

/// DCS command opcodes (MIPI DCS 1.3, table 6).
pub mod dcs {
    /// Enter the minimum power state.
    pub const ENTER_SLEEP_MODE: u8 = 0x10;
    /// Leave the minimum power state.
    pub const EXIT_SLEEP_MODE: u8 = 0x11;
    /// Stop showing frame memory contents.
    pub const SET_DISPLAY_OFF: u8 = 0x28;
    /// Show frame memory contents.
    pub const SET_DISPLAY_ON: u8 = 0x29;
    /// Set the display brightness.
    pub const SET_DISPLAY_BRIGHTNESS: u8 = 0x51;
    /// Control brightness related display features.
    pub const WRITE_CONTROL_DISPLAY: u8 = 0x53;
    /// Select the content adaptive power saving mode.
    pub const WRITE_POWER_SAVE: u8 = 0x55;
}

/// Pixel format of the video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 24 bits per pixel.
    Rgb888,
    /// 18 bits per pixel, loosely packed.
    Rgb666,
    /// 18 bits per pixel, tightly packed.
    Rgb666Packed,
    /// 16 bits per pixel.
    Rgb565,
}

impl PixelFormat {
    /// Bits per pixel on the link.
    #[must_use]
    pub const fn bpp(self) -> u32 {
        match self {
            Self::Rgb888 | Self::Rgb666 => 24,
            Self::Rgb666Packed => 18,
            Self::Rgb565 => 16,
        }
    }
}

bitfield! {
    /// DSI link mode flags.
    #[derive(Copy, Clone, Default, Eq, PartialEq)]
    pub struct ModeFlags(u32);
    impl Debug;
    u32;
    video, set_video: 0;
    video_burst, set_video_burst: 1;
    clock_non_continuous, set_clock_non_continuous: 10;
}

impl ModeFlags {
    /// Flags from their raw bit pattern.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Video mode, with burst transfers if `burst`, and a clock lane that may stop between
    /// transfers if `non_continuous`.
    #[must_use]
    pub fn video_mode(burst: bool, non_continuous: bool) -> Self {
        let mut flags = Self(0);
        flags.set_video(true);
        flags.set_video_burst(burst);
        flags.set_clock_non_continuous(non_continuous);
        flags
    }

    /// Whether the panel runs in video mode rather than command mode.
    #[must_use]
    pub fn is_video(&self) -> bool {
        self.video()
    }

    /// Whether video is sent in bursts.
    #[must_use]
    pub fn is_burst(&self) -> bool {
        self.video_burst()
    }

    /// Whether the clock lane may stop between transfers.
    #[must_use]
    pub fn is_clock_non_continuous(&self) -> bool {
        self.clock_non_continuous()
    }
}

/// Errors reported by the DSI host.
#[derive(Debug, Snafu, Clone, Copy, PartialEq, Eq)]
pub enum DsiError {
    /// The link is not up.
    NotReady,
    /// The peripheral did not acknowledge in time.
    Timeout,
    /// The host controller reported a failure.
    #[snafu(display("transfer failed: {code}"))]
    Transfer {
        /// Host specific error code.
        code: i32,
    },
}

/// A DSI host controller with a peripheral attached on virtual channel 0.
#[cfg_attr(test, automock)]
pub trait DsiHost {
    /// Configure the link for the peripheral.
    ///
    /// # Errors
    /// Returns an error if the host cannot drive the requested configuration.
    fn attach(&mut self, lanes: u8, format: PixelFormat, flags: ModeFlags)
        -> Result<(), DsiError>;

    /// Send a generic write. The first byte is the register.
    ///
    /// # Errors
    /// Returns an error if the transfer failed.
    fn generic_write(&mut self, payload: &[u8]) -> Result<(), DsiError>;

    /// Send DCS command `cmd` with `payload`.
    ///
    /// # Errors
    /// Returns an error if the transfer failed.
    fn dcs_write(&mut self, cmd: u8, payload: &[u8]) -> Result<(), DsiError>;
}

/// Set the display brightness. The value is sent least significant byte first.
///
/// # Errors
/// Returns an error if the transfer failed.
pub fn set_display_brightness<H: DsiHost + ?Sized>(
    host: &mut H,
    brightness: u16,
) -> Result<(), DsiError> {
    let mut payload = [0u8; 2];
    LittleEndian::write_u16(&mut payload, brightness);
    host.dcs_write(dcs::SET_DISPLAY_BRIGHTNESS, &payload)
}

/// Turn the display on.
///
/// # Errors
/// Returns an error if the transfer failed.
pub fn set_display_on<H: DsiHost + ?Sized>(host: &mut H) -> Result<(), DsiError> {
    host.dcs_write(dcs::SET_DISPLAY_ON, &[])
}

/// Turn the display off.
///
/// # Errors
/// Returns an error if the transfer failed.
pub fn set_display_off<H: DsiHost + ?Sized>(host: &mut H) -> Result<(), DsiError> {
    host.dcs_write(dcs::SET_DISPLAY_OFF, &[])
}

/// Wake the panel from sleep.
///
/// # Errors
/// Returns an error if the transfer failed.
pub fn exit_sleep_mode<H: DsiHost + ?Sized>(host: &mut H) -> Result<(), DsiError> {
    host.dcs_write(dcs::EXIT_SLEEP_MODE, &[])
}

/// Put the panel to sleep.
///
/// # Errors
/// Returns an error if the transfer failed.
pub fn enter_sleep_mode<H: DsiHost + ?Sized>(host: &mut H) -> Result<(), DsiError> {
    host.dcs_write(dcs::ENTER_SLEEP_MODE, &[])
}
