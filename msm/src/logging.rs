//! Driver logging mechanism.
use log::{debug, info, SetLoggerError};
use spin::once::Once;

use msm_core::logger::{build_time_log_level, Logger};

use crate::console::MmioConsole;

/// The global logger instance.
static LOGGER: Once<Logger<MmioConsole>> = Once::new();

/// Install the global logger, printing to `console`.
///
/// Only the first call installs a logger. Later calls drop their console and fail.
///
/// # Errors
/// Returns an error if a logger is already installed.
pub fn init_logging(console: MmioConsole) -> Result<(), SetLoggerError> {
    let level = build_time_log_level();
    log::set_logger(LOGGER.call_once(|| Logger::new(console, level)) as _)?;
    log::set_max_level(level);

    info!("\x1b[1mmsm\x1b[0m v{}", env!("CARGO_PKG_VERSION"));
    debug!("log level: {level}");
    Ok(())
}
