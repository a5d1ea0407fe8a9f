//! Platform device plumbing shared by the drivers.
//!
//! This covers the parts of device probing that every driver needs: matching a device's
//! `compatible` property against a driver's table of supported devices, and the clock and
//! interrupt resources a device may hold.

use core::ffi::CStr;

#[cfg(test)]
use mockall::automock;
use snafu::Snafu;

/// The identifier of an interrupt line.
pub type IrqId = u32;

/// The value of a device tree `compatible` property: a list of NUL terminated strings, most
/// specific first (see section 2.3.1 of the Devicetree Specification).
#[derive(Clone, Copy)]
pub struct CompatibleList<'dt> {
    /// The raw bytes of the property.
    pub data: &'dt [u8],
}

impl<'dt> CompatibleList<'dt> {
    /// Wrap the raw bytes of a `compatible` property.
    #[must_use]
    pub fn new(data: &'dt [u8]) -> Self {
        Self { data }
    }

    /// Iterate over the strings in the list.
    pub fn iter(&self) -> impl Iterator<Item = &'dt [u8]> {
        self.data
            .split(|b| *b == 0)
            .filter(|s| !s.is_empty())
    }

    /// Determine if `model` is exactly one of the strings in the list.
    #[must_use]
    pub fn contains(&self, model: &[u8]) -> bool {
        self.iter().any(|s| s == model)
    }
}

impl core::fmt::Debug for CompatibleList<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|s| core::str::from_utf8(s).unwrap_or("?")))
            .finish()
    }
}

/// One entry of a driver's match table: a `compatible` string and the data selected by it.
#[derive(Debug)]
pub struct OfMatch<T: 'static> {
    /// The `compatible` string this entry matches.
    pub compatible: &'static [u8],
    /// Driver specific data for devices that match.
    pub data: &'static T,
}

/// Find the match data for a device with the given `compatible` property.
///
/// The device's strings are tried in order, so the most specific compatible string that the
/// driver knows about wins.
#[must_use]
pub fn match_device<T: 'static>(
    table: &[OfMatch<T>],
    compatible: CompatibleList,
) -> Option<&'static T> {
    compatible.iter().find_map(|model| {
        table
            .iter()
            .find(|entry| entry.compatible == model)
            .map(|entry| entry.data)
    })
}

/// Errors reported by the platform when a driver asks for a resource.
#[derive(Debug, Snafu)]
pub enum ResourceError {
    /// The resource is not described for this device.
    NotFound,
    /// The provider of the resource has not probed yet.
    Defer,
    /// The platform ran out of memory while setting up the resource.
    OutOfMemory,
    /// The resource exists but could not be switched on.
    #[snafu(display("hardware failure: {code}"))]
    Hardware {
        /// Platform specific error code.
        code: i32,
    },
}

/// A clock that feeds a device.
#[cfg_attr(test, automock)]
pub trait Clock {
    /// Prepare and ungate the clock.
    ///
    /// # Errors
    /// Returns an error if the clock controller refuses to turn the clock on.
    fn prepare_enable(&self) -> Result<(), ResourceError>;

    /// Gate and unprepare the clock.
    fn disable_unprepare(&self);
}

/// What an interrupt handler did with an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// The interrupt was not from this device.
    None,
    /// The interrupt was handled.
    Handled,
}

/// How a threaded interrupt handler is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqMode {
    /// Keep the line masked until the threaded handler has finished.
    OneShot,
    /// Unmask the line as soon as the primary handler returns.
    Shared,
}

/// The platform device a driver is probing.
///
/// `C` is the clock type handed out by the platform's clock controller.
#[cfg_attr(test, automock(type C = MockClock;))]
pub trait PlatformDevice {
    /// The clock type handed out by the platform.
    type C: Clock;

    /// The name of the device, used to label its interrupt.
    fn name(&self) -> &'static str;

    /// The device's `compatible` property.
    fn compatible(&self) -> CompatibleList<'static>;

    /// Look up the interrupt at `index` in the device's `interrupts` property.
    ///
    /// # Errors
    /// [`ResourceError::NotFound`] if there is no such interrupt.
    fn irq(&self, index: usize) -> Result<IrqId, ResourceError>;

    /// Look up a clock by its `clock-names` entry.
    ///
    /// Returns `Ok(None)` if `optional` is true and the device has no such clock.
    ///
    /// # Errors
    /// Returns an error if a mandatory clock is missing or its provider is not ready.
    fn clock(&self, name: &'static str, optional: bool) -> Result<Option<Self::C>, ResourceError>;

    /// Request a threaded handler for `irq`. The handler is the driver's `handle_irq` method,
    /// which the platform invokes from its interrupt thread.
    ///
    /// # Errors
    /// Returns an error if the interrupt cannot be claimed.
    fn request_threaded_irq(
        &self,
        irq: IrqId,
        mode: IrqMode,
        name: &'static str,
    ) -> Result<(), ResourceError>;
}

/// Render a possibly NUL terminated byte string for logs.
pub(crate) fn display_bytes(bytes: &[u8]) -> &str {
    CStr::from_bytes_until_nul(bytes)
        .ok()
        .and_then(|s| s.to_str().ok())
        .or_else(|| core::str::from_utf8(bytes).ok())
        .unwrap_or("?")
}
