//! Console logger for the drivers.
//!
//! Each record is formatted into a fixed size line buffer on the stack and handed to the sink in
//! one piece, so lines from different callers never interleave. Records longer than the line
//! buffer are truncated and marked with `...`.
use core::fmt::Write;
use log::{Level, LevelFilter, Log, Metadata, Record};
use spin::Mutex;

/// Returns the ANSI color code for a given log level.
fn color_for_level(lvl: Level) -> &'static str {
    match lvl {
        Level::Error => "31",
        Level::Warn => "33",
        Level::Info => "32",
        Level::Debug => "34",
        Level::Trace => "35",
    }
}

/// Trait representing a sink that accepts complete log lines.
pub trait LogSink {
    /// Accepts one formatted line, including its trailing newline.
    fn accept(&mut self, line: &[u8]);
}

/// Maximum length in bytes of one formatted log line.
pub const MAX_LINE_SIZE: usize = 192;

const TRUNCATION_MARK: &[u8] = b"...\n";

/// A line being formatted.
struct LineBuffer {
    data: [u8; MAX_LINE_SIZE],
    len: usize,
    truncated: bool,
}

impl LineBuffer {
    const fn new() -> Self {
        Self {
            data: [0; MAX_LINE_SIZE],
            len: 0,
            truncated: false,
        }
    }

    /// The finished line. A truncated line ends with [`TRUNCATION_MARK`].
    fn finish(&mut self) -> &[u8] {
        if self.truncated {
            let start = MAX_LINE_SIZE - TRUNCATION_MARK.len();
            self.data[start..].copy_from_slice(TRUNCATION_MARK);
            self.len = MAX_LINE_SIZE;
        }
        &self.data[..self.len]
    }
}

impl Write for LineBuffer {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let s = s.as_bytes();
        let room = MAX_LINE_SIZE - self.len;
        let n = core::cmp::min(room, s.len());
        self.data[self.len..self.len + n].copy_from_slice(&s[..n]);
        self.len += n;
        if n < s.len() {
            self.truncated = true;
        }
        Ok(())
    }
}

/// A logger that writes each record to a sink behind a spin lock.
pub struct Logger<S> {
    sink: Mutex<S>,
    level_filter: LevelFilter,
}

impl<S: LogSink> Logger<S> {
    /// Creates a new `Logger` with the specified sink and log level filter.
    pub fn new(sink: S, level_filter: LevelFilter) -> Self {
        Self {
            sink: Mutex::new(sink),
            level_filter,
        }
    }

    /// The level filter this logger was created with.
    pub fn level_filter(&self) -> LevelFilter {
        self.level_filter
    }

    fn format_record(record: &Record, line: &mut LineBuffer) {
        let module_path = record.module_path().unwrap_or("unknown module");
        let line_number = record.line().unwrap_or(0);

        // LineBuffer never fails, it truncates.
        let _ = writeln!(
            line,
            "\x1b[{}m{:<5}\x1b[0m {}@{}| {}",
            color_for_level(record.level()),
            record.level(),
            module_path,
            line_number,
            record.args()
        );
    }
}

impl<S: LogSink + Send> Log for Logger<S> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level_filter
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut line = LineBuffer::new();
        Self::format_record(record, &mut line);
        self.sink.lock().accept(line.finish());
    }

    fn flush(&self) {}
}

/// Returns the logging [`LevelFilter`] set by the build-time environment variable `LOG_LEVEL`.
///
/// `LOG_LEVEL` can be "off", "error", "warn", "info", "debug" or "trace". If it is absent or has
/// some other value, debug builds log at `Debug` and release builds at `Info`.
pub const fn build_time_log_level() -> LevelFilter {
    let level = match option_env!("LOG_LEVEL") {
        Some(level) => level,
        None => "",
    };
    match level.as_bytes() {
        b"off" => LevelFilter::Off,
        b"error" => LevelFilter::Error,
        b"warn" => LevelFilter::Warn,
        b"info" => LevelFilter::Info,
        b"debug" => LevelFilter::Debug,
        b"trace" => LevelFilter::Trace,
        _ => {
            if cfg!(debug_assertions) {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{string::String, vec::Vec};

    // Test sink that collects log lines
    #[derive(Default)]
    struct TestSink {
        lines: Vec<Vec<u8>>,
    }

    impl LogSink for TestSink {
        fn accept(&mut self, line: &[u8]) {
            self.lines.push(line.to_vec());
        }
    }

    impl TestSink {
        fn lines_as_strings(&self) -> Vec<String> {
            self.lines
                .iter()
                .map(|msg| String::from_utf8_lossy(msg).into_owned())
                .collect()
        }
    }

    #[test]
    fn test_basic_logging() {
        let logger = Logger::new(TestSink::default(), LevelFilter::Info);

        let record = Record::builder()
            .args(format_args!("SPDM Version 0x20000"))
            .level(Level::Info)
            .target("test")
            .module_path(Some("msm_core::firmware::spdm"))
            .file(Some("spdm.rs"))
            .line(Some(42))
            .build();

        logger.log(&record);

        let lines = logger.sink.lock().lines_as_strings();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("SPDM Version 0x20000"));
        assert!(lines[0].contains("msm_core::firmware::spdm@42"));
        assert!(lines[0].ends_with('\n'));
    }

    #[test]
    fn test_log_level_filtering() {
        let logger = Logger::new(TestSink::default(), LevelFilter::Warn);

        let warn_record = Record::builder()
            .args(format_args!("warning"))
            .level(Level::Warn)
            .target("test")
            .build();

        let info_record = Record::builder()
            .args(format_args!("info"))
            .level(Level::Info)
            .target("test")
            .build();

        logger.log(&warn_record);
        logger.log(&info_record);

        let lines = logger.sink.lock().lines_as_strings();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("warning"));
    }

    #[test]
    fn test_long_line_is_truncated() {
        let logger = Logger::new(TestSink::default(), LevelFilter::Info);
        let long_message = "A".repeat(MAX_LINE_SIZE * 2);

        logger.log(
            &Record::builder()
                .args(format_args!("{long_message}"))
                .level(Level::Info)
                .target("test")
                .build(),
        );

        let sink = logger.sink.lock();
        assert_eq!(sink.lines.len(), 1);
        assert_eq!(sink.lines[0].len(), MAX_LINE_SIZE);
        assert!(sink.lines[0].ends_with(TRUNCATION_MARK));
    }

    #[test]
    fn test_all_log_levels() {
        let logger = Logger::new(TestSink::default(), LevelFilter::Trace);

        for level in &[
            Level::Error,
            Level::Warn,
            Level::Info,
            Level::Debug,
            Level::Trace,
        ] {
            logger.log(
                &Record::builder()
                    .args(format_args!("{level} message"))
                    .level(*level)
                    .target("test")
                    .build(),
            );
        }

        let lines = logger.sink.lock().lines_as_strings();

        assert_eq!(lines.len(), 5);
        assert!(lines.iter().any(|msg| msg.contains("ERROR")));
        assert!(lines.iter().any(|msg| msg.contains("WARN")));
        assert!(lines.iter().any(|msg| msg.contains("INFO")));
        assert!(lines.iter().any(|msg| msg.contains("DEBUG")));
        assert!(lines.iter().any(|msg| msg.contains("TRACE")));
    }
}
