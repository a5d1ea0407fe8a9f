//! SPDM interconnect provider.
//!
//! The SPDM block sets the CPU bus bandwidth on its own, from the traffic it observes. The
//! kernel only has to switch it off while nobody needs the bus (during suspend, mostly) and
//! back on afterwards. Disabling the block sometimes makes it lose its configuration, so the
//! whole configuration is sent again every time it is switched back on.

use log::{debug, error, info, warn};
use snafu::{OptionExt, ResultExt, Snafu};

use super::{std_aggregate, units_to_bps, IccError, NodeDesc, NodeId, Provider, SpdmSnafu, Topology};
use crate::firmware::{
    scm::SecureCall,
    spdm::{self, Levels, SpdmBridge},
};
use crate::platform::{
    display_bytes, match_device, Clock, IrqId, IrqMode, IrqReturn, OfMatch, PlatformDevice,
    ResourceError,
};

/// SPDM client number of the CPU subsystem.
pub const CLIENT_CPU: u8 = 0;
/// SPDM client number of the GPU.
pub const CLIENT_GPU: u8 = 1;

/// Device tree index of the application processor master node.
pub const MASTER_APSS_SPDM_TZ: usize = 0;
/// Device tree index of the slave node.
pub const SLAVE_APSS_SPDM_TZ: usize = 1;
/// Number of nodes in the provider.
pub const NUM_NODES: usize = 2;

const TZ_APSS_SPDM: NodeId = 500;
const TZ_SLAVE_SPDM: NodeId = 501;

static APSS_SPDM_MAS: NodeDesc = NodeDesc {
    name: "apss_spdm_mas",
    id: TZ_APSS_SPDM,
    buswidth: 16,
    links: &[TZ_SLAVE_SPDM],
};

static SPDM_SLV: NodeDesc = NodeDesc {
    name: "spdm_slv",
    id: TZ_SLAVE_SPDM,
    buswidth: 16,
    links: &[],
};

/// The nodes of every SPDM provider, in device tree index order.
pub static SPDM_CPU_NODES: [&NodeDesc; NUM_NODES] = [&APSS_SPDM_MAS, &SPDM_SLV];

/// SoC specific SPDM tuning.
#[derive(Debug)]
pub struct SpdmTuning {
    /// SPDM client number.
    pub client: u8,
    /// Bus port monitored by the client.
    pub port: u8,
    /// Up factor of the bandwidth filter.
    pub alpha_up: u8,
    /// Down factor of the bandwidth filter.
    pub alpha_down: u8,
    /// Bucket size of the bandwidth filter.
    pub bucket_size: u8,
    /// Polling interval for down votes, in ms. The secure world does not take it.
    pub down_interval: u8,
    /// Bandwidth added per up step, in MB/s.
    pub bw_upstep: u16,
    /// Bandwidth removed per down step, in MB/s.
    pub bw_downstep: u16,
    /// Highest bandwidth the block may vote for, in MB/s.
    pub bw_max_vote: u16,
    /// CCI frequency (kHz) at which the hardware starts computing CCI response times.
    pub cci_resp_freq: u32,
    /// Cut-over frequencies between performance levels, in kHz.
    pub perflvl_freqs: &'static [u32],
    /// Rejection rate per performance level.
    pub reject_rate: &'static Levels,
    /// Response time (µs) per performance level.
    pub resp_us: &'static Levels,
    /// CCI response time (µs) per performance level.
    pub cci_resp_us: &'static Levels,
}

static REJECT_RATE_5K: Levels = Levels::uniform([5000, 5000]);
static RESP_US_10K: Levels = Levels::uniform([10000, 10000]);

/// Tuning for the MSM8998 CPU subsystem.
pub static MSM8998_SPDM_CPU: SpdmTuning = SpdmTuning {
    client: CLIENT_CPU,
    port: 24,
    alpha_up: 12,
    alpha_down: 15,
    bucket_size: 8,
    down_interval: 100,
    bw_upstep: 1000,
    bw_downstep: 1000,
    bw_max_vote: 10000,
    cci_resp_freq: 1_036_800,
    perflvl_freqs: &[260_000, 770_000],
    reject_rate: &REJECT_RATE_5K,
    resp_us: &RESP_US_10K,
    cci_resp_us: &RESP_US_10K,
};

/// Tuning for the SDM630 CPU subsystem.
pub static SDM630_SPDM_CPU: SpdmTuning = SpdmTuning {
    client: CLIENT_CPU,
    port: 24,
    alpha_up: 8,
    alpha_down: 15,
    bucket_size: 8,
    down_interval: 30,
    bw_upstep: 450,
    bw_downstep: 6750,
    bw_max_vote: 6750,
    cci_resp_freq: 1_036_800,
    perflvl_freqs: &[260_000, 610_000],
    reject_rate: &REJECT_RATE_5K,
    resp_us: &RESP_US_10K,
    cci_resp_us: &RESP_US_10K,
};

/// Tuning for the SDM660 CPU subsystem.
pub static SDM660_SPDM_CPU: SpdmTuning = SpdmTuning {
    client: CLIENT_CPU,
    port: 24,
    alpha_up: 8,
    alpha_down: 15,
    bucket_size: 8,
    down_interval: 30,
    bw_upstep: 450,
    bw_downstep: 8200,
    bw_max_vote: 8200,
    cci_resp_freq: 1_036_800,
    perflvl_freqs: &[260_000, 610_000],
    reject_rate: &REJECT_RATE_5K,
    resp_us: &RESP_US_10K,
    cci_resp_us: &RESP_US_10K,
};

/// Devices handled by this driver.
pub static SPDM_TZ_OF_MATCH: &[OfMatch<SpdmTuning>] = &[
    OfMatch {
        compatible: b"qcom,msm8998-spdm-cpu",
        data: &MSM8998_SPDM_CPU,
    },
    OfMatch {
        compatible: b"qcom,sdm630-spdm-cpu",
        data: &SDM630_SPDM_CPU,
    },
    OfMatch {
        compatible: b"qcom,sdm660-spdm-cpu",
        data: &SDM660_SPDM_CPU,
    },
];

/// Name the driver registers under.
pub const DRIVER_NAME: &str = "spdm-tz";

/// Errors that can occur while probing the provider.
#[derive(Debug, Snafu)]
pub enum ProbeError {
    /// The SPDM bridge is not up yet. Probe again later.
    ProbeDefer,
    /// The device has no usable interrupt.
    Irq {
        /// Underlying error.
        source: ResourceError,
    },
    /// A clock could not be acquired.
    #[snafu(display("failed to get clock {name}: {source}"))]
    Clock {
        /// The `clock-names` entry.
        name: &'static str,
        /// Underlying error.
        source: ResourceError,
    },
    /// The device is not one this driver supports.
    NoMatch,
    /// The core clock could not be switched on.
    ClockEnable {
        /// Underlying error.
        source: ResourceError,
    },
    /// The interrupt could not be claimed.
    RequestIrq {
        /// Underlying error.
        source: ResourceError,
    },
}

/// Log the outcome of one configuration call.
fn report<V: core::fmt::Debug>(what: &str, outcome: Result<V, spdm::Error>) {
    match outcome {
        Ok(ret) => debug!("{what} returned {ret:x?}"),
        Err(e) => error!("{what} failed: {e}"),
    }
}

/// A probed SPDM interconnect provider.
pub struct SpdmProvider<'b, T: SecureCall, C: Clock> {
    bridge: &'b SpdmBridge<T>,
    tuning: &'static SpdmTuning,
    core_clk: C,
    cci_clk: Option<C>,
    irq: IrqId,
    enabled: bool,
    topology: Topology<NUM_NODES>,
}

impl<'b, T: SecureCall, C: Clock> SpdmProvider<'b, T, C> {
    /// Probe the device `dev`, driving the SPDM block through `bridge`.
    ///
    /// The block starts out disabled. On success the core clock is running and the device's
    /// interrupt is routed to [`SpdmProvider::handle_irq`].
    ///
    /// # Errors
    /// - [`ProbeError::ProbeDefer`] if `bridge` is not initialized.
    /// - [`ProbeError::NoMatch`] if the device is not in [`SPDM_TZ_OF_MATCH`].
    /// - Any failure to acquire or enable the device's resources.
    pub fn probe<P: PlatformDevice<C = C>>(
        dev: &P,
        bridge: &'b SpdmBridge<T>,
    ) -> Result<Self, ProbeError> {
        if !bridge.is_initialized() {
            return ProbeDeferSnafu.fail();
        }

        let irq = dev.irq(0).context(IrqSnafu)?;

        let core_clk = dev
            .clock("core", false)
            .and_then(|clk| clk.ok_or(ResourceError::NotFound))
            .context(ClockSnafu { name: "core" })?;
        let cci_clk = dev.clock("cci", true).context(ClockSnafu { name: "cci" })?;

        let compatible = dev.compatible();
        let tuning = match_device(SPDM_TZ_OF_MATCH, compatible).context(NoMatchSnafu)?;

        core_clk.prepare_enable().context(ClockEnableSnafu)?;

        let provider = Self {
            bridge,
            tuning,
            core_clk,
            cci_clk,
            irq,
            enabled: false,
            topology: Topology::new(&SPDM_CPU_NODES),
        };

        if let Err(e) = dev.request_threaded_irq(irq, IrqMode::OneShot, dev.name()) {
            provider.core_clk.disable_unprepare();
            return Err(e).context(RequestIrqSnafu);
        }

        info!(
            "probed {} for {}",
            DRIVER_NAME,
            compatible.iter().next().map_or("?", display_bytes)
        );
        Ok(provider)
    }

    /// Switch the block off and release the core clock.
    pub fn remove(self) {
        report("disable", self.bridge.enable(self.tuning.client.into(), false));
        self.core_clk.disable_unprepare();
    }

    /// The tuning selected at probe.
    pub fn tuning(&self) -> &'static SpdmTuning {
        self.tuning
    }

    /// The CCI clock, if the device has one.
    pub fn cci_clock(&self) -> Option<&C> {
        self.cci_clk.as_ref()
    }

    /// Whether the block is currently switched on.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Handle the block's interrupt. It is not known to fire on any supported SoC.
    pub fn handle_irq(&self, irq: IrqId) -> IrqReturn {
        warn!("SPDM IRQ {irq} fired (registered {})", self.irq);
        IrqReturn::Handled
    }

    /// Send the complete configuration to the block and switch it on.
    ///
    /// The result of the first call decides whether the configuration is sent at all: if the
    /// bridge cannot issue it, nothing else can be issued either. Every later call is made
    /// regardless of how the previous ones went, and its outcome is only logged, because the
    /// values the secure world returns do not reliably tell success from failure.
    ///
    /// # Errors
    /// [`spdm::Error::NotSupported`] or [`spdm::Error::NoDevice`] if the bridge cannot issue calls.
    pub fn setup(&self) -> Result<(), spdm::Error> {
        let t = self.tuning;
        let b = self.bridge;
        let client = u32::from(t.client);

        match b.cfg_single_port(client, t.port.into()) {
            Err(e @ (spdm::Error::NotSupported | spdm::Error::NoDevice)) => {
                error!("cfg_single_port failed: {e}");
                return Err(e);
            }
            outcome => report("cfg_single_port", outcome),
        }

        report(
            "cfg_filter",
            b.cfg_filter(
                client,
                t.alpha_up.into(),
                t.alpha_down.into(),
                t.bucket_size.into(),
            ),
        );
        report("cfg_perflevel", b.cfg_perflevel(client, t.perflvl_freqs));
        report("cfg_reject_rate", b.cfg_reject_rate(client, t.reject_rate));
        report("cfg_resp_time", b.cfg_resp_time(client, t.resp_us));
        report("cfg_cci_resp_time", b.cfg_cci_resp_time(client, t.cci_resp_us));
        report("cfg_cci_thresh", b.cfg_cci_thresh(client, t.cci_resp_freq));
        report(
            "cfg_bw_votes",
            b.cfg_bw_votes(
                client,
                t.bw_upstep.into(),
                t.bw_downstep.into(),
                t.bw_max_vote.into(),
            ),
        );
        report("enable", b.enable(client, true));

        Ok(())
    }
}

impl<T: SecureCall, C: Clock> Provider<NUM_NODES> for SpdmProvider<'_, T, C> {
    fn topology(&self) -> &Topology<NUM_NODES> {
        &self.topology
    }

    fn topology_mut(&mut self) -> &mut Topology<NUM_NODES> {
        &mut self.topology
    }

    /// Switch the block on while any bandwidth is requested and off when none is.
    ///
    /// Only `src` matters. The bandwidth itself is chosen by the hardware.
    fn set(&mut self, src: usize, _dst: usize) -> Result<(), IccError> {
        let buswidth = self.topology.xlate(src)?.desc.buswidth;
        let (avg, peak) = std_aggregate(self.topology.iter());
        let rate = units_to_bps(avg.max(peak)) / u64::from(buswidth.max(1));

        if rate > 0 && !self.enabled {
            self.setup().context(SpdmSnafu)?;
            self.enabled = true;
            info!("SPDM enabled");
        } else if rate == 0 && self.enabled {
            self.enabled = false;
            info!("SPDM disabled");
        }

        report(
            "enable",
            self.bridge.enable(self.tuning.client.into(), self.enabled),
        );
        Ok(())
    }

    /// The block starts with no bandwidth vote and cannot be asked for its current one.
    fn get_bw(&self, _node: usize) -> (u32, u32) {
        (0, 0)
    }
}
