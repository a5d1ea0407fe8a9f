//! Generic driver for simple MIPI DSI panels.
//!
//! Most phone panels differ only in their mode timings and the command scripts that switch
//! them on and off. A [`PanelInfo`] holds those and [`MipiDsiPanel`] does the rest.

use log::{error, info};
#[cfg(test)]
use mockall::automock;
use snafu::{OptionExt, ResultExt, Snafu};

use super::dsi::{DsiError, DsiHost, ModeFlags, PixelFormat};
use super::script::{replay, Step};
use crate::platform::{display_bytes, match_device, CompatibleList, OfMatch};

/// Sleeping delays.
#[cfg_attr(test, automock)]
pub trait Delay {
    /// Sleep for at least `ms` milliseconds.
    fn msleep(&mut self, ms: u32);

    /// Sleep for somewhere between `min_us` and `max_us` microseconds.
    fn usleep_range(&mut self, min_us: u32, max_us: u32);
}

/// The panel's reset line.
///
/// Values are logical: `true` holds the panel in reset, whatever the electrical polarity of the
/// line.
#[cfg_attr(test, automock)]
pub trait ResetLine {
    /// Drive the line.
    fn set_asserted(&mut self, asserted: bool);
}

/// A display mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayMode {
    /// Pixel clock in kHz.
    pub clock: u32,
    /// Visible width in pixels.
    pub hdisplay: u16,
    /// Start of horizontal sync.
    pub hsync_start: u16,
    /// End of horizontal sync.
    pub hsync_end: u16,
    /// Total line length.
    pub htotal: u16,
    /// Visible height in lines.
    pub vdisplay: u16,
    /// Start of vertical sync.
    pub vsync_start: u16,
    /// End of vertical sync.
    pub vsync_end: u16,
    /// Total frame length.
    pub vtotal: u16,
    /// Physical width in mm.
    pub width_mm: u16,
    /// Physical height in mm.
    pub height_mm: u16,
}

impl DisplayMode {
    /// Refresh rate in Hz, rounded to the nearest integer.
    #[must_use]
    pub fn refresh_rate(&self) -> u32 {
        let pixels = u64::from(self.htotal) * u64::from(self.vtotal);
        if pixels == 0 {
            return 0;
        }
        ((u64::from(self.clock) * 1000 + pixels / 2) / pixels) as u32
    }
}

/// Everything that distinguishes one panel from another.
pub struct PanelInfo {
    /// The only mode the panel supports.
    pub mode: DisplayMode,
    /// Number of data lanes.
    pub lanes: u8,
    /// Pixel format of the video stream.
    pub format: PixelFormat,
    /// Link mode.
    pub mode_flags: ModeFlags,
    /// Reset sequence, run before power on.
    pub reset: fn(&mut dyn ResetLine, &mut dyn Delay),
    /// Script that powers the panel on.
    pub power_on: &'static [Step],
    /// Script that powers the panel off.
    pub power_off: &'static [Step],
}

/// Errors reported by a panel.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum PanelError {
    /// The device is not one the driver supports.
    NoMatch,
    /// The DSI host could not be configured for the panel.
    Attach {
        /// Underlying error.
        source: DsiError,
    },
    /// The power on script failed.
    PowerOn {
        /// Underlying error.
        source: DsiError,
    },
}

/// A panel driven through a DSI host.
pub struct MipiDsiPanel<H, D, R> {
    info: &'static PanelInfo,
    host: H,
    delay: D,
    reset: R,
    prepared: bool,
}

impl<H: DsiHost, D: Delay, R: ResetLine> MipiDsiPanel<H, D, R> {
    /// Probe a panel with the given `compatible` property against `table`.
    ///
    /// The panel is held in reset and the host is configured for it.
    ///
    /// # Errors
    /// - [`PanelError::NoMatch`] if the device is not in `table`.
    /// - [`PanelError::Attach`] if the host cannot drive the panel.
    pub fn probe(
        table: &[OfMatch<PanelInfo>],
        compatible: CompatibleList,
        host: H,
        delay: D,
        reset: R,
    ) -> Result<Self, PanelError> {
        let info = match_device(table, compatible).context(NoMatchSnafu)?;
        let mut panel = Self::new(info, host, delay, reset);
        panel.reset.set_asserted(true);
        panel
            .host
            .attach(info.lanes, info.format, info.mode_flags)
            .context(AttachSnafu)?;
        info!(
            "attached panel {}",
            compatible.iter().next().map_or("?", display_bytes)
        );
        Ok(panel)
    }

    /// Wrap a panel described by `info`, without touching the hardware.
    pub fn new(info: &'static PanelInfo, host: H, delay: D, reset: R) -> Self {
        Self {
            info,
            host,
            delay,
            reset,
            prepared: false,
        }
    }

    /// Reset the panel and power it on. Does nothing if the panel is already on.
    ///
    /// # Errors
    /// [`PanelError::PowerOn`] if the power on script fails. The panel is put back in reset.
    pub fn prepare(&mut self) -> Result<(), PanelError> {
        if self.prepared {
            return Ok(());
        }

        (self.info.reset)(&mut self.reset, &mut self.delay);

        if let Err(e) = replay(&mut self.host, &mut self.delay, self.info.power_on) {
            error!("Failed to initialize panel: {e}");
            self.reset.set_asserted(true);
            return Err(e).context(PowerOnSnafu);
        }

        self.prepared = true;
        Ok(())
    }

    /// Power the panel off and hold it in reset. Does nothing if the panel is already off.
    ///
    /// A failing power off script is logged; the panel goes into reset either way.
    pub fn unprepare(&mut self) {
        if !self.prepared {
            return;
        }

        if let Err(e) = replay(&mut self.host, &mut self.delay, self.info.power_off) {
            error!("Failed to un-initialize panel: {e}");
        }

        self.reset.set_asserted(true);
        self.prepared = false;
    }

    /// Whether the panel is powered on.
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// The modes the panel supports.
    pub fn get_modes(&self) -> &'static [DisplayMode] {
        let info = self.info;
        core::slice::from_ref(&info.mode)
    }

    /// The panel's description.
    pub fn info(&self) -> &'static PanelInfo {
        self.info
    }

    /// Give back the resources the panel was using.
    pub fn into_parts(self) -> (H, D, R) {
        (self.host, self.delay, self.reset)
    }
}
