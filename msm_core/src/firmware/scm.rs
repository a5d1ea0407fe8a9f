//! The Secure Channel Manager transport.
//!
//! The transport is the mechanism that actually traps into the secure monitor. It is consumed
//! through [`SecureCall`] so that service clients can be driven by a stub in tests.

use bitfield::bitfield;
use log::{error, trace};
#[cfg(test)]
use mockall::automock;
use snafu::Snafu;

use super::smccc::{ScmDescriptor, ScmResponse};

/// Status returned in `x0` when the call completed.
pub const SCM_SUCCESS: i64 = 0;
/// Status returned in `x0` when a yielding call was interrupted and must be resumed.
pub const SCM_INTERRUPTED: i64 = 1;

/// Errors reported by the transport.
#[derive(Debug, Snafu, Clone, Copy, PartialEq, Eq)]
pub enum ScmError {
    /// The secure world reported a generic failure.
    Io,
    /// The secure world rejected an argument or address.
    InvalidArgument,
    /// The secure world does not implement the call.
    NotSupported,
    /// The secure world ran out of memory.
    OutOfMemory,
    /// The secure world is busy with another call.
    Busy,
}

/// Convert an SCM status returned in `x0` to a Rust [`Result`].
///
/// # Errors
/// Every non-zero status is an error. Codes that SCM does not define are reported as
/// [`ScmError::InvalidArgument`].
pub fn status_to_result(status: i64) -> Result<(), ScmError> {
    match status {
        SCM_SUCCESS => Ok(()),
        -1 => Err(ScmError::Io),
        -2 | -3 => Err(ScmError::InvalidArgument),
        -4 => Err(ScmError::NotSupported),
        -5 => Err(ScmError::OutOfMemory),
        -12 => Err(ScmError::Busy),
        _ => {
            error!("unknown SCM status {status}");
            Err(ScmError::InvalidArgument)
        }
    }
}

/// Registers `x0` to `x6` as passed into the secure world.
pub type ScmRegs = [u64; 7];

/// Register through which the secure world hands back the session of an interrupted call.
pub const SESSION_REG: usize = 6;

/// Drive one call to completion through `trap`.
///
/// `trap` enters the secure world with the given registers and returns `x0` to `x3` together
/// with `x6`. An interrupted call is resumed by trapping again with [`SCM_INTERRUPTED`] in `x0`
/// and the returned session in `x6`; the other registers are passed unchanged.
///
/// # Errors
/// The final status, converted with [`status_to_result`].
pub fn run_to_completion(
    mut regs: ScmRegs,
    mut trap: impl FnMut(&ScmRegs) -> ([u64; 4], u64),
) -> Result<ScmResponse, ScmError> {
    loop {
        let (out, session) = trap(&regs);
        let status = out[0] as i64;
        if status != SCM_INTERRUPTED {
            status_to_result(status)?;
            return Ok(ScmResponse {
                result: [out[1], out[2], out[3]],
            });
        }
        trace!("SCM call interrupted, resuming session {session:#x}");
        regs[0] = out[0];
        regs[SESSION_REG] = session;
    }
}

bitfield! {
    /// Capabilities of the SCM device, taken from its match data.
    #[derive(Copy, Clone, Default, Eq, PartialEq)]
    pub struct ScmFlags(u64);
    impl Debug;
    u64;
    has_spdm_smc, set_has_spdm_smc: 3;
}

impl ScmFlags {
    /// Flags for a device whose SPDM service is reached with SMC.
    #[must_use]
    pub fn spdm_smc() -> Self {
        let mut flags = Self(0);
        flags.set_has_spdm_smc(true);
        flags
    }

    /// Whether the SPDM service is reached with SMC. Without it, the service would have to be
    /// reached through the hypervisor.
    #[must_use]
    pub fn spdm_over_smc(&self) -> bool {
        self.has_spdm_smc()
    }
}

/// Mechanism interface for issuing SCM calls.
///
/// Calls may block, so they must only be issued from a context that may sleep.
#[cfg_attr(test, automock(type Device = ();))]
pub trait SecureCall {
    /// The device that owns the memory used for arguments that do not fit in registers.
    type Device;

    /// Issue `desc` to the secure world on behalf of `device` and wait for it to complete.
    ///
    /// # Errors
    /// Returns an error if the secure world reports a non-zero status.
    fn call(&self, device: &Self::Device, desc: &ScmDescriptor) -> Result<ScmResponse, ScmError>;
}
