//! Types for the SMC Calling Convention as used by the Qualcomm Secure Channel Manager (SCM).
//!
//! API Reference: <https://developer.arm.com/documentation/den0028>

use bitfield::bitfield;

/// Maximum number of arguments a single SCM call can carry.
pub const MAX_ARGS: usize = 10;

/// Number of arguments that fit in registers. The rest travel in a memory buffer.
pub const REGISTER_ARGS: usize = 4;

/// Number of result registers returned by an SCM call.
pub const MAX_RESULTS: usize = 3;

/// Whether the secure world may be preempted while servicing a call.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CallType {
    /// An atomic call that runs to completion with interrupts masked.
    Fast,
    /// A call that can be interrupted and later resumed.
    Yielding,
}

/// The register width convention of a call.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Convention {
    /// 32-bit arguments and results.
    Smc32,
    /// 64-bit arguments and results.
    Smc64,
}

/// Owning Entity Number (OEN) of the service being called.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Owner(pub u8);

impl Owner {
    /// Arm architecture calls.
    pub const ARM_ARCHITECTURE: Self = Self(0);
    /// CPU service calls.
    pub const CPU: Self = Self(1);
    /// Silicon partner (SiP) service calls.
    pub const SIP: Self = Self(2);
    /// Original equipment manufacturer service calls.
    pub const OEM: Self = Self(3);
    /// Standard secure service calls.
    pub const STANDARD_SECURE: Self = Self(4);
    /// Trusted OS calls.
    pub const TRUSTED_OS: Self = Self(50);
}

bitfield! {
    /// An SMCCC function identifier, passed to the secure monitor in `w0`.
    #[derive(Copy, Clone, Eq, PartialEq)]
    pub struct FunctionId(u32);
    impl Debug;
    u32;
    fast, set_fast: 31;
    smc64, set_smc64: 30;
    u8, oen, set_oen: 29, 24;
    u16, number, set_number: 15, 0;
}

impl FunctionId {
    /// Build a function ID for an SCM `service` / `command` pair.
    ///
    /// SCM packs the service into bits [15:8] of the function number and the command into bits
    /// [7:0].
    #[must_use]
    pub fn scm(
        call_type: CallType,
        convention: Convention,
        owner: Owner,
        service: u8,
        command: u8,
    ) -> Self {
        let mut id = FunctionId(0);
        id.set_fast(call_type == CallType::Fast);
        id.set_smc64(convention == Convention::Smc64);
        id.set_oen(owner.0 & 0x3f);
        id.set_number((u16::from(service) << 8) | u16::from(command));
        id
    }

    /// The raw value to place in `w0`.
    #[must_use]
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// The call type encoded in the ID.
    #[must_use]
    pub fn call_type(&self) -> CallType {
        if self.fast() {
            CallType::Fast
        } else {
            CallType::Yielding
        }
    }

    /// The calling convention encoded in the ID.
    #[must_use]
    pub fn convention(&self) -> Convention {
        if self.smc64() {
            Convention::Smc64
        } else {
            Convention::Smc32
        }
    }

    /// The owning entity encoded in the ID.
    #[must_use]
    pub fn owner(&self) -> Owner {
        Owner(self.oen())
    }

    /// The 16-bit function number.
    #[must_use]
    pub fn function_number(&self) -> u16 {
        self.number()
    }
}

/// How the secure world should interpret one argument.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ArgType {
    /// A plain value.
    Value = 0,
    /// The physical address of a read-only buffer.
    ReadOnly = 1,
    /// The physical address of a read-write buffer.
    ReadWrite = 2,
    /// A buffer size.
    BufferValue = 3,
}

/// The `arginfo` word passed alongside the arguments: the argument count in bits [3:0] and a
/// 2-bit [`ArgType`] per argument starting at bit 4.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ArgInfo(pub u32);

impl ArgInfo {
    /// `count` arguments, all of them plain values.
    #[must_use]
    pub const fn values(count: usize) -> Self {
        Self((count & 0xf) as u32)
    }

    /// Change the type of argument `index`.
    #[must_use]
    pub const fn with_type(self, index: usize, ty: ArgType) -> Self {
        let shift = 4 + 2 * index;
        Self((self.0 & !(0b11 << shift)) | ((ty as u32) << shift))
    }

    /// The number of arguments.
    #[must_use]
    pub const fn count(self) -> usize {
        (self.0 & 0xf) as usize
    }
}

/// One call into an SCM service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScmDescriptor {
    /// Service identifier.
    pub service: u8,
    /// Command identifier within the service.
    pub command: u8,
    /// Owning entity of the service.
    pub owner: Owner,
    /// Argument count and types.
    pub arginfo: ArgInfo,
    /// Argument values. Only the first `arginfo.count()` are meaningful.
    pub args: [u64; MAX_ARGS],
}

impl ScmDescriptor {
    /// A descriptor with all arguments zeroed.
    #[must_use]
    pub const fn new(service: u8, command: u8, owner: Owner, arginfo: ArgInfo) -> Self {
        Self {
            service,
            command,
            owner,
            arginfo,
            args: [0; MAX_ARGS],
        }
    }

    /// The arguments that are actually passed.
    #[must_use]
    pub fn args(&self) -> &[u64] {
        &self.args[..self.arginfo.count().min(MAX_ARGS)]
    }

    /// The function ID for this descriptor under the given call type and convention.
    #[must_use]
    pub fn function_id(&self, call_type: CallType, convention: Convention) -> FunctionId {
        FunctionId::scm(call_type, convention, self.owner, self.service, self.command)
    }
}

/// The result registers of a completed SCM call.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ScmResponse {
    /// The values of `x1..=x3` after the call.
    pub result: [u64; MAX_RESULTS],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spdm_function_id() {
        let id = FunctionId::scm(CallType::Yielding, Convention::Smc64, Owner::SIP, 0x09, 0x04);
        assert_eq!(id.0, 0x4200_0904);
        assert_eq!(id.call_type(), CallType::Yielding);
        assert_eq!(id.convention(), Convention::Smc64);
        assert_eq!(id.owner(), Owner::SIP);
        assert_eq!(id.function_number(), 0x0904);
    }

    #[test]
    fn fast_smc32_function_id() {
        let id = FunctionId::scm(CallType::Fast, Convention::Smc32, Owner::SIP, 0x01, 0x06);
        assert_eq!(id.0, 0x8200_0106);
    }

    #[test]
    fn arginfo_encoding() {
        assert_eq!(ArgInfo::values(6).0, 6);
        let info = ArgInfo::values(2).with_type(1, ArgType::ReadWrite);
        assert_eq!(info.0, 0x82);
        assert_eq!(info.count(), 2);
    }

    #[test]
    fn descriptor_exposes_counted_args() {
        let mut desc = ScmDescriptor::new(9, 4, Owner::SIP, ArgInfo::values(3));
        desc.args[..4].copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(desc.args(), [1, 2, 3]);
    }
}
