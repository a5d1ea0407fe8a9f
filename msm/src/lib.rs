//! AArch64 mechanisms for the Qualcomm MSM drivers.
//!
//! `msm_core` holds the driver logic and reaches hardware through traits. This crate implements
//! those traits on real hardware: the `smc` conduit into the secure monitor, the architected
//! timer for delays, TLMM GPIOs for reset lines and a memory mapped console for logging.
#![no_std]
#![deny(missing_docs)]

#[cfg(all(test, not(target_os = "none")))]
extern crate std;

pub mod console;
pub mod logging;
#[cfg(target_arch = "aarch64")]
pub mod smc;
#[cfg(target_arch = "aarch64")]
pub mod timer;
pub mod tlmm;
