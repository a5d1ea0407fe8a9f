//! Driver policy for Qualcomm MSM platform enablement.
//!
//! This crate contains the hardware independent half of three drivers: the SPDM secure-world
//! bridge, the SPDM interconnect bandwidth governor, and the Tianma R63350 DSI panel. Every
//! piece of hardware they touch is reached through a trait so that the logic can be tested on
//! the host. The `msm` crate provides the real mechanisms.
#![no_std]
#![deny(missing_docs)]

#[cfg(all(test, not(target_os = "none")))]
#[macro_use]
extern crate std;

pub mod firmware;
pub mod interconnect;
pub mod logger;
pub mod panel;
pub mod platform;
