//! Clients for services implemented by the secure world firmware.
//!
//! [`smccc`] holds the calling convention vocabulary, [`scm`] the transport seam through which
//! calls reach the secure monitor, and [`spdm`] the bandwidth monitoring service built on top.

pub mod scm;
pub mod smccc;
pub mod spdm;
