//! Client for the System Performance Dynamic Monitoring (SPDM) secure world service.
//!
//! SPDM is a hardware block that watches bus traffic and votes for bandwidth on its own. It is
//! owned by the secure world, so the kernel configures it through SCM calls. Every SPDM call
//! goes to the same service and command; the first argument selects the operation and the
//! argument vector is always six values wide.
//!
//! # Result values
//!
//! On success the transport hands back the first result register and this module returns it
//! unexamined. The secure world does not follow the usual "zero on success, negative on
//! failure" convention for these registers and what it does follow is not documented, so no
//! interpretation is attempted here. Callers that need to tell success from failure only have
//! the transport errors to go on.

use itertools::Itertools;
use log::{debug, error, info, trace};
use snafu::{ensure, ResultExt, Snafu};

use super::{
    scm::{ScmError, ScmFlags, SecureCall},
    smccc::{ArgInfo, Owner, ScmDescriptor},
};

/// The newest version of the service this client understands.
pub const MAX_VERSION: u64 = 0x20000;

/// SCM service ID of SPDM.
pub const SERVICE_ID: u8 = 0x09;

/// SCM command ID of SPDM. All operations use it.
pub const COMMAND_ID: u8 = 0x04;

/// Width of the argument vector. SPDM always takes exactly this many arguments.
pub const NUM_ARGS: usize = 6;

/// Maximum number of entries in a port or performance level list.
pub const MAX_LIST_LEN: usize = 3;

/// Vote multiplier passed with every bandwidth vote configuration.
const VOTE_MULTIPLIER: u64 = 2;

/// An SPDM operation, passed as the first argument of every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
#[allow(missing_docs)]
pub enum Command {
    GetBwAll = 1,
    GetBwSpecific = 2,
    Enable = 3,
    Disable = 4,
    CfgPorts = 5,
    CfgFilter = 6,
    CfgPerfLevel = 7,
    CfgRejectRateLow = 8,
    CfgRejectRateMed = 9,
    CfgRejectRateHigh = 10,
    CfgRespTimeLow = 11,
    CfgRespTimeMed = 12,
    CfgRespTimeHigh = 13,
    CfgCciRespTimeLow = 14,
    CfgCciRespTimeMed = 15,
    CfgCciRespTimeHigh = 16,
    CfgMaxCciFreq = 17,
    CfgBwVotes = 18,
    GetVersion = 19,
}

/// A value pair for each of the three performance levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Levels {
    /// Low performance level.
    pub low: [u32; 2],
    /// Medium performance level.
    pub med: [u32; 2],
    /// High performance level.
    pub high: [u32; 2],
}

impl Levels {
    /// The same pair for every level.
    #[must_use]
    pub const fn uniform(value: [u32; 2]) -> Self {
        Self {
            low: value,
            med: value,
            high: value,
        }
    }
}

/// Errors that can occur while talking to SPDM.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum Error {
    /// The bridge has not been initialized, or the service cannot be reached.
    NotSupported,
    /// The SMC path needs a device for its argument buffer and none was given.
    NoDevice,
    /// An argument was out of range, or the service version is too new.
    InvalidArgument,
    /// The transport failed to complete the call.
    Transport {
        /// Underlying error.
        source: ScmError,
    },
}

/// State of an initialized bridge.
struct Session<D> {
    device: Option<D>,
}

/// The SPDM bridge.
///
/// The bridge owns the SCM transport, so there is exactly one bridge per transport. It starts
/// out uninitialized and every operation fails with [`Error::NotSupported`] until
/// [`SpdmBridge::init`] succeeds.
///
/// Calls are not serialized here. The caller must not issue two calls at once.
pub struct SpdmBridge<T: SecureCall> {
    transport: T,
    session: Option<Session<T::Device>>,
}

impl<T: SecureCall> SpdmBridge<T> {
    /// Create an uninitialized bridge over `transport`.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            session: None,
        }
    }

    /// Bring the bridge up: check that SPDM is reachable over SMC and that the service is a
    /// version this client understands.
    ///
    /// Returns the service version. On failure the bridge is left uninitialized.
    ///
    /// # Errors
    /// - [`Error::NotSupported`] if `flags` say SPDM is only reachable through the hypervisor.
    /// - Any error from [`SpdmBridge::get_version`].
    pub fn init(&mut self, device: Option<T::Device>, flags: ScmFlags) -> Result<u64, Error> {
        if !flags.spdm_over_smc() {
            error!("HVC SPDM is not supported");
            return NotSupportedSnafu.fail();
        }

        self.session = Some(Session { device });

        match self.get_version(MAX_VERSION) {
            Ok(version) => Ok(version),
            Err(e) => {
                self.session = None;
                Err(e)
            }
        }
    }

    /// Whether [`SpdmBridge::init`] has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    /// Give the transport back, tearing the bridge down.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Check that a call can be issued, returning the device to issue it for.
    fn device(&self) -> Result<&T::Device, Error> {
        let session = self.session.as_ref().ok_or(Error::NotSupported)?;
        session.device.as_ref().ok_or(Error::NoDevice)
    }

    /// Issue one SPDM call. `args` is zero-extended to [`NUM_ARGS`] values.
    fn call(&self, args: &[u64]) -> Result<u64, Error> {
        let device = self.device()?;

        let mut desc =
            ScmDescriptor::new(SERVICE_ID, COMMAND_ID, Owner::SIP, ArgInfo::values(NUM_ARGS));
        for (slot, arg) in desc.args[..NUM_ARGS].iter_mut().zip(args) {
            *slot = *arg;
        }
        trace!("SPDM call [{:#x}]", desc.args().iter().format(", "));

        let response = self.transport.call(device, &desc).context(TransportSnafu)?;
        Ok(response.result[0])
    }

    /// Query the service version.
    ///
    /// # Errors
    /// - [`Error::InvalidArgument`] if the version is newer than `max_version`.
    /// - [`Error::NotSupported`], [`Error::NoDevice`] or [`Error::Transport`] if the query could
    ///   not be made.
    pub fn get_version(&self, max_version: u64) -> Result<u64, Error> {
        let version = self.call(&[Command::GetVersion as u64])?;
        if version > max_version {
            error!("SPDM version {version:#x} ({version}) is not supported");
            return InvalidArgumentSnafu.fail();
        }
        info!("SPDM Version {version:#x}");
        Ok(version)
    }

    /// Configure the bandwidth votes of `client`: `up` and `down` are the MB/s added or removed
    /// per step and `max` is the highest bandwidth the client can reach.
    ///
    /// # Errors
    /// Any error preventing the call; see the module documentation for the returned value.
    pub fn cfg_bw_votes(&self, client: u32, up: u32, down: u32, max: u32) -> Result<u64, Error> {
        self.call(&[
            Command::CfgBwVotes as u64,
            client.into(),
            up.into(),
            down.into(),
            max.into(),
            VOTE_MULTIPLIER,
        ])
    }

    /// Configure the CCI frequency (kHz) at which the hardware starts computing CCI response
    /// times.
    ///
    /// # Errors
    /// Any error preventing the call; see the module documentation for the returned value.
    pub fn cfg_cci_thresh(&self, client: u32, freq: u32) -> Result<u64, Error> {
        self.call(&[Command::CfgMaxCciFreq as u64, client.into(), freq.into()])
    }

    /// Read the current bandwidth vote of `client`.
    ///
    /// # Errors
    /// Any error preventing the call; see the module documentation for the returned value.
    pub fn get_client_bw(&self, client: u32) -> Result<u64, Error> {
        self.call(&[Command::GetBwSpecific as u64, client.into()])
    }

    /// Read the summed bandwidth vote of all clients.
    ///
    /// # Errors
    /// Any error preventing the call; see the module documentation for the returned value.
    pub fn get_all_bw(&self) -> Result<u64, Error> {
        self.call(&[Command::GetBwAll as u64])
    }

    /// Configure the bus ports `client` monitors.
    ///
    /// # Errors
    /// - [`Error::InvalidArgument`] if more than [`MAX_LIST_LEN`] ports are given. Nothing is
    ///   sent in that case.
    /// - Any error preventing the call.
    pub fn cfg_ports(&self, client: u32, ports: &[u32]) -> Result<u64, Error> {
        ensure!(ports.len() <= MAX_LIST_LEN, InvalidArgumentSnafu);

        let mut args = [0u64; NUM_ARGS];
        args[0] = Command::CfgPorts as u64;
        args[1] = client.into();
        args[2] = ports.len() as u64;
        for (slot, port) in args[3..].iter_mut().zip(ports) {
            *slot = (*port).into();
        }
        self.call(&args)
    }

    /// Configure `client` to monitor the single bus port `port`.
    ///
    /// # Errors
    /// Any error preventing the call; see the module documentation for the returned value.
    pub fn cfg_single_port(&self, client: u32, port: u32) -> Result<u64, Error> {
        self.call(&[Command::CfgPorts as u64, client.into(), 1, port.into()])
    }

    /// Configure the bandwidth filter of `client`: the up and down smoothing factors and the
    /// bucket size.
    ///
    /// # Errors
    /// Any error preventing the call; see the module documentation for the returned value.
    pub fn cfg_filter(
        &self,
        client: u32,
        alpha_up: u32,
        alpha_down: u32,
        bucket_size: u32,
    ) -> Result<u64, Error> {
        self.call(&[
            Command::CfgFilter as u64,
            client.into(),
            alpha_up.into(),
            alpha_down.into(),
            bucket_size.into(),
        ])
    }

    /// Configure the cut-over frequencies between performance levels.
    ///
    /// # Errors
    /// - [`Error::InvalidArgument`] if more than [`MAX_LIST_LEN`] frequencies are given. Nothing
    ///   is sent in that case.
    /// - Any error preventing the call.
    pub fn cfg_perflevel(&self, client: u32, freqs: &[u32]) -> Result<u64, Error> {
        ensure!(freqs.len() <= MAX_LIST_LEN, InvalidArgumentSnafu);

        let mut args = [0u64; 2 + MAX_LIST_LEN];
        args[0] = Command::CfgPerfLevel as u64;
        args[1] = client.into();
        for (slot, freq) in args[2..].iter_mut().zip(freqs) {
            *slot = (*freq).into();
        }
        self.call(&args)
    }

    fn cfg_level_cmd(&self, command: Command, client: u32, lo: u32, hi: u32) -> Result<u64, Error> {
        self.call(&[command as u64, client.into(), lo.into(), hi.into()])
    }

    /// Send one command per performance level. The outcome of each call is logged and
    /// otherwise ignored, so all three are always sent.
    fn cfg_trilevel(
        &self,
        commands: [Command; 3],
        client: u32,
        levels: &Levels,
    ) -> Result<(), Error> {
        self.device()?;

        for (command, [lo, hi]) in commands.into_iter().zip([levels.low, levels.med, levels.high]) {
            let outcome = self.cfg_level_cmd(command, client, lo, hi);
            debug!("{command:?} ({lo}, {hi}) -> {outcome:x?}");
        }
        Ok(())
    }

    /// Configure the CCI response time (µs) for each performance level, used by the hardware
    /// to raise the frequency threshold when the CCI is heavily loaded.
    ///
    /// # Errors
    /// [`Error::NotSupported`] or [`Error::NoDevice`] if no call can be issued. Failures of the
    /// individual calls are not reported.
    pub fn cfg_cci_resp_time(&self, client: u32, levels: &Levels) -> Result<(), Error> {
        self.cfg_trilevel(
            [
                Command::CfgCciRespTimeLow,
                Command::CfgCciRespTimeMed,
                Command::CfgCciRespTimeHigh,
            ],
            client,
            levels,
        )
    }

    /// Configure the rejection rate for each performance level.
    ///
    /// # Errors
    /// [`Error::NotSupported`] or [`Error::NoDevice`] if no call can be issued. Failures of the
    /// individual calls are not reported.
    pub fn cfg_reject_rate(&self, client: u32, levels: &Levels) -> Result<(), Error> {
        self.cfg_trilevel(
            [
                Command::CfgRejectRateLow,
                Command::CfgRejectRateMed,
                Command::CfgRejectRateHigh,
            ],
            client,
            levels,
        )
    }

    /// Configure the response time (µs) for each performance level.
    ///
    /// # Errors
    /// [`Error::NotSupported`] or [`Error::NoDevice`] if no call can be issued. Failures of the
    /// individual calls are not reported.
    pub fn cfg_resp_time(&self, client: u32, levels: &Levels) -> Result<(), Error> {
        self.cfg_trilevel(
            [
                Command::CfgRespTimeLow,
                Command::CfgRespTimeMed,
                Command::CfgRespTimeHigh,
            ],
            client,
            levels,
        )
    }

    /// Switch monitoring for `client` on or off.
    ///
    /// # Errors
    /// Any error preventing the call; see the module documentation for the returned value.
    pub fn enable(&self, client: u32, enable: bool) -> Result<u64, Error> {
        let command = if enable {
            Command::Enable
        } else {
            Command::Disable
        };
        // The last argument could carry the CCI clock rate; it is always sent as zero.
        self.call(&[command as u64, client.into(), 0])
    }
}

/// Stub transports for tests of SPDM clients.
#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};
    use std::vec::Vec;

    use super::*;
    use crate::firmware::scm::MockSecureCall;
    use crate::firmware::smccc::ScmResponse;

    /// The argument vectors seen by a recording transport, in order.
    pub type Calls = Arc<Mutex<Vec<[u64; NUM_ARGS]>>>;

    /// A transport that answers version queries with `version`, returns `result` for every
    /// other call, and records every argument vector it is given.
    pub fn recording_transport(version: u64, result: u64) -> (MockSecureCall, Calls) {
        let calls: Calls = Arc::default();
        let recorded = calls.clone();
        let mut transport = MockSecureCall::new();
        transport.expect_call().returning(move |_, desc| {
            assert_eq!(desc.service, SERVICE_ID);
            assert_eq!(desc.command, COMMAND_ID);
            assert_eq!(desc.owner, Owner::SIP);
            assert_eq!(desc.arginfo, ArgInfo::values(NUM_ARGS));
            let mut args = [0; NUM_ARGS];
            args.copy_from_slice(desc.args());
            recorded.lock().unwrap().push(args);
            let value = if args[0] == Command::GetVersion as u64 {
                version
            } else {
                result
            };
            Ok(ScmResponse {
                result: [value, 0, 0],
            })
        });
        (transport, calls)
    }

    /// An initialized bridge over a recording transport, with the version query forgotten.
    pub fn ready_bridge(result: u64) -> (SpdmBridge<MockSecureCall>, Calls) {
        let (transport, calls) = recording_transport(MAX_VERSION, result);
        let mut bridge = SpdmBridge::new(transport);
        bridge
            .init(Some(()), ScmFlags::spdm_smc())
            .expect("init bridge");
        calls.lock().unwrap().clear();
        (bridge, calls)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{ready_bridge, recording_transport};
    use super::*;
    use crate::firmware::scm::MockSecureCall;
    use test_case::test_case;

    const CFG_PORTS: u64 = Command::CfgPorts as u64;
    const CFG_PL: u64 = Command::CfgPerfLevel as u64;

    #[test_case(0x10000 ; "older version")]
    #[test_case(MAX_VERSION ; "newest version")]
    fn init_accepts_supported_version(version: u64) {
        let _ = env_logger::builder().is_test(true).try_init();
        let (transport, calls) = recording_transport(version, 0);
        let mut bridge = SpdmBridge::new(transport);
        assert_eq!(bridge.init(Some(()), ScmFlags::spdm_smc()), Ok(version));
        assert!(bridge.is_initialized());
        assert_eq!(
            *calls.lock().unwrap(),
            [[Command::GetVersion as u64, 0, 0, 0, 0, 0]]
        );
        assert_eq!(bridge.get_version(MAX_VERSION), Ok(version));
    }

    #[test]
    fn init_rejects_newer_version() {
        let (transport, _calls) = recording_transport(MAX_VERSION + 1, 0);
        let mut bridge = SpdmBridge::new(transport);
        assert_eq!(
            bridge.init(Some(()), ScmFlags::spdm_smc()),
            Err(Error::InvalidArgument)
        );
        assert!(!bridge.is_initialized());
        assert_eq!(bridge.enable(0, true), Err(Error::NotSupported));
    }

    #[test]
    fn init_refuses_hvc() {
        let mut transport = MockSecureCall::new();
        transport.expect_call().never();
        let mut bridge = SpdmBridge::new(transport);
        assert_eq!(
            bridge.init(Some(()), ScmFlags::default()),
            Err(Error::NotSupported)
        );
        assert!(!bridge.is_initialized());
    }

    #[test]
    fn init_without_device() {
        let mut transport = MockSecureCall::new();
        transport.expect_call().never();
        let mut bridge = SpdmBridge::new(transport);
        assert_eq!(
            bridge.init(None, ScmFlags::spdm_smc()),
            Err(Error::NoDevice)
        );
        assert!(!bridge.is_initialized());
    }

    #[test]
    fn init_propagates_transport_error() {
        let mut transport = MockSecureCall::new();
        transport
            .expect_call()
            .once()
            .returning(|_, _| Err(ScmError::NotSupported));
        let mut bridge = SpdmBridge::new(transport);
        assert_eq!(
            bridge.init(Some(()), ScmFlags::spdm_smc()),
            Err(Error::Transport {
                source: ScmError::NotSupported
            })
        );
        assert!(!bridge.is_initialized());
    }

    #[test]
    fn calls_before_init_are_not_supported() {
        let mut transport = MockSecureCall::new();
        transport.expect_call().never();
        let bridge = SpdmBridge::new(transport);
        let levels = Levels::uniform([1, 2]);

        assert_eq!(bridge.cfg_bw_votes(0, 1, 2, 3), Err(Error::NotSupported));
        assert_eq!(bridge.cfg_cci_thresh(0, 1), Err(Error::NotSupported));
        assert_eq!(bridge.get_client_bw(0), Err(Error::NotSupported));
        assert_eq!(bridge.get_all_bw(), Err(Error::NotSupported));
        assert_eq!(bridge.cfg_ports(0, &[1]), Err(Error::NotSupported));
        assert_eq!(bridge.cfg_single_port(0, 1), Err(Error::NotSupported));
        assert_eq!(bridge.cfg_filter(0, 1, 2, 3), Err(Error::NotSupported));
        assert_eq!(bridge.cfg_perflevel(0, &[1]), Err(Error::NotSupported));
        assert_eq!(bridge.cfg_reject_rate(0, &levels), Err(Error::NotSupported));
        assert_eq!(bridge.cfg_resp_time(0, &levels), Err(Error::NotSupported));
        assert_eq!(bridge.cfg_cci_resp_time(0, &levels), Err(Error::NotSupported));
        assert_eq!(bridge.enable(0, false), Err(Error::NotSupported));
        assert_eq!(bridge.get_version(MAX_VERSION), Err(Error::NotSupported));
    }

    #[test_case(&[] ; "no ports")]
    #[test_case(&[24] ; "one port")]
    #[test_case(&[24, 25, 26] ; "three ports")]
    fn cfg_ports_within_bound(ports: &[u32]) {
        let (bridge, calls) = ready_bridge(0);
        assert_eq!(bridge.cfg_ports(7, ports), Ok(0));

        let mut expected = [CFG_PORTS, 7, ports.len() as u64, 0, 0, 0];
        for (slot, port) in expected[3..].iter_mut().zip(ports) {
            *slot = u64::from(*port);
        }
        assert_eq!(*calls.lock().unwrap(), [expected]);
    }

    #[test_case(&[1, 2, 3, 4] ; "four entries")]
    #[test_case(&[1, 2, 3, 4, 5, 6, 7] ; "seven entries")]
    fn list_over_bound_is_rejected_without_call(list: &[u32]) {
        let (bridge, calls) = ready_bridge(0);
        assert_eq!(bridge.cfg_ports(0, list), Err(Error::InvalidArgument));
        assert_eq!(bridge.cfg_perflevel(0, list), Err(Error::InvalidArgument));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn cfg_perflevel_zero_fills() {
        let (bridge, calls) = ready_bridge(0);
        bridge.cfg_perflevel(0, &[260_000, 610_000]).expect("perflevel");
        assert_eq!(
            *calls.lock().unwrap(),
            [[CFG_PL, 0, 260_000, 610_000, 0, 0]]
        );
    }

    #[test]
    fn fixed_argument_layouts() {
        let (bridge, calls) = ready_bridge(0);
        bridge.cfg_bw_votes(1, 450, 6750, 6750).unwrap();
        bridge.cfg_cci_thresh(1, 1_036_800).unwrap();
        bridge.get_client_bw(1).unwrap();
        bridge.get_all_bw().unwrap();
        bridge.cfg_single_port(1, 24).unwrap();
        bridge.cfg_filter(1, 8, 15, 8).unwrap();
        bridge.enable(1, true).unwrap();
        bridge.enable(1, false).unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            [
                [Command::CfgBwVotes as u64, 1, 450, 6750, 6750, 2],
                [Command::CfgMaxCciFreq as u64, 1, 1_036_800, 0, 0, 0],
                [Command::GetBwSpecific as u64, 1, 0, 0, 0, 0],
                [Command::GetBwAll as u64, 0, 0, 0, 0, 0],
                [CFG_PORTS, 1, 1, 24, 0, 0],
                [Command::CfgFilter as u64, 1, 8, 15, 8, 0],
                [Command::Enable as u64, 1, 0, 0, 0, 0],
                [Command::Disable as u64, 1, 0, 0, 0, 0],
            ]
        );
    }

    #[test]
    fn raw_result_is_passed_through() {
        let (bridge, _calls) = ready_bridge(0xdead);
        assert_eq!(bridge.get_client_bw(0), Ok(0xdead));
        assert_eq!(bridge.enable(0, true), Ok(0xdead));
    }

    #[test]
    fn trilevel_sends_all_levels() {
        let (bridge, calls) = ready_bridge(0);
        let levels = Levels {
            low: [1, 2],
            med: [3, 4],
            high: [5, 6],
        };
        bridge.cfg_resp_time(0, &levels).unwrap();
        assert_eq!(
            *calls.lock().unwrap(),
            [
                [Command::CfgRespTimeLow as u64, 0, 1, 2, 0, 0],
                [Command::CfgRespTimeMed as u64, 0, 3, 4, 0, 0],
                [Command::CfgRespTimeHigh as u64, 0, 5, 6, 0, 0],
            ]
        );
    }

    #[test]
    fn trilevel_ignores_individual_failures() {
        let mut transport = MockSecureCall::new();
        transport
            .expect_call()
            .times(4)
            .returning(|_, desc| {
                if desc.args[0] == Command::GetVersion as u64 {
                    Ok(crate::firmware::smccc::ScmResponse::default())
                } else {
                    Err(ScmError::Io)
                }
            });
        let mut bridge = SpdmBridge::new(transport);
        bridge
            .init(Some(()), ScmFlags::spdm_smc())
            .expect("init bridge");

        assert_eq!(
            bridge.cfg_reject_rate(0, &Levels::uniform([5000, 5000])),
            Ok(())
        );
    }
}
