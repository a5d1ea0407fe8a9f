//! SCM transport over the `smc` instruction.
//!
//! Register layout for an SCM call with the ARMv8 convention:
//!
//! | register | in                                                        | out      |
//! |----------|-----------------------------------------------------------|----------|
//! | `x0`     | function ID                                               | status   |
//! | `x1`     | arginfo                                                   | result 0 |
//! | `x2`     | argument 0                                                | result 1 |
//! | `x3`     | argument 1                                                | result 2 |
//! | `x4`     | argument 2                                                |          |
//! | `x5`     | argument 3, or the physical address of arguments 3 and up |          |
//! | `x6`     | session of an interrupted call, else 0                    | session  |
//!
//! Calls with more than [`REGISTER_ARGS`] arguments pass everything from argument 3 on in a
//! buffer owned by the SCM device, which is why [`SecureCall`] takes a device.

use core::arch::asm;

use log::{debug, trace};
use msm_core::firmware::{
    scm::{run_to_completion, ScmError, ScmFlags, ScmRegs, SecureCall},
    smccc::{CallType, Convention, ScmDescriptor, ScmResponse, MAX_ARGS, REGISTER_ARGS},
    spdm::{self, SpdmBridge},
};

/// Index of the first argument that travels in the buffer when the buffer is used.
const FIRST_EXT_ARG: usize = REGISTER_ARGS - 1;

/// Number of arguments the buffer must hold.
pub const EXT_ARGS: usize = MAX_ARGS - FIRST_EXT_ARG;

/// The SCM device's buffer for arguments that do not fit in registers.
pub struct ArgBuffer {
    virt: *mut u64,
    phys: u64,
}

/// SAFETY: the buffer is only written while issuing a call, and calls are serialized by their
/// callers.
unsafe impl Send for ArgBuffer {}

impl ArgBuffer {
    /// Wrap the buffer mapped at `virt`, whose physical address is `phys`.
    ///
    /// # Safety
    /// `virt` must point to [`EXT_ARGS`] writable `u64`s that are coherent with the secure
    /// world's view of `phys`, and nothing else may use them while the buffer exists.
    pub unsafe fn new(virt: *mut u64, phys: u64) -> Self {
        Self { virt, phys }
    }

    /// Store `args` for the secure world, which reads them little endian.
    fn fill(&self, args: &[u64]) {
        for (i, arg) in args.iter().take(EXT_ARGS).enumerate() {
            // SAFETY: `new` guarantees room for EXT_ARGS values.
            unsafe {
                self.virt.add(i).write_volatile(arg.to_le());
            }
        }
    }
}

/// Trap into the secure monitor. Returns `x0` to `x3` and `x6`.
///
/// # Safety
/// The secure world may read and write any memory whose address is passed in `regs`.
unsafe fn smc(regs: &ScmRegs) -> ([u64; 4], u64) {
    let mut out = [regs[0], regs[1], regs[2], regs[3]];
    let mut session = regs[6];
    asm!(
        "smc #0",
        inout("x0") out[0],
        inout("x1") out[1],
        inout("x2") out[2],
        inout("x3") out[3],
        inout("x4") regs[4] => _,
        inout("x5") regs[5] => _,
        inout("x6") session,
        lateout("x7") _,
        lateout("x8") _,
        lateout("x9") _,
        lateout("x10") _,
        lateout("x11") _,
        lateout("x12") _,
        lateout("x13") _,
        lateout("x14") _,
        lateout("x15") _,
        lateout("x16") _,
        lateout("x17") _,
        options(nostack)
    );
    (out, session)
}

/// The SMC conduit.
#[derive(Debug)]
pub struct SmcConduit {
    call_type: CallType,
}

impl SmcConduit {
    /// A conduit that issues yielding SMC64 calls, as SCM services expect.
    #[must_use]
    pub fn new() -> Self {
        Self {
            call_type: CallType::Yielding,
        }
    }
}

impl Default for SmcConduit {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureCall for SmcConduit {
    type Device = ArgBuffer;

    fn call(&self, device: &ArgBuffer, desc: &ScmDescriptor) -> Result<ScmResponse, ScmError> {
        let fn_id = desc.function_id(self.call_type, Convention::Smc64);
        let args = desc.args();

        let mut regs: ScmRegs = [0; 7];
        regs[0] = fn_id.bits().into();
        regs[1] = desc.arginfo.0.into();
        if args.len() > REGISTER_ARGS {
            regs[2..2 + FIRST_EXT_ARG].copy_from_slice(&args[..FIRST_EXT_ARG]);
            device.fill(&args[FIRST_EXT_ARG..]);
            regs[5] = device.phys;
        } else {
            regs[2..2 + args.len()].copy_from_slice(args);
        }

        trace!("SCM call {fn_id:?} arginfo {:#x}", regs[1]);

        // SAFETY: the only address passed is that of the device's argument buffer, which
        // `ArgBuffer::new` requires to be owned by it.
        run_to_completion(regs, |regs| unsafe { smc(regs) })
    }
}

/// Bring up the SPDM bridge over the SMC conduit.
///
/// # Errors
/// Any error from [`SpdmBridge::init`].
pub fn spdm_bridge(
    flags: ScmFlags,
    buffer: ArgBuffer,
) -> Result<SpdmBridge<SmcConduit>, spdm::Error> {
    let mut bridge = SpdmBridge::new(SmcConduit::new());
    let version = bridge.init(Some(buffer), flags)?;
    debug!("SPDM bridge up, version {version:#x}");
    Ok(bridge)
}
