//! A minimal, zero-dependency logging crate for the `cairn` runtime.
//!
//! This crate provides thread-safe logging with automatic module path detection,
//! colored terminal output, configurable log levels and a replaceable output
//! [`Sink`]. Allocator diagnostics (leak reports, contract violations) are all
//! routed through here, so embedding applications can redirect them.
//!
//! # Example
//!
//! ```
//! use cairn_log::{error, warn, info, debug, Level};
//!
//! // Set the minimum log level
//! cairn_log::set_level(Level::Debug);
//!
//! let status = "running";
//! info!("Application is {}", status);
//! debug!("Debug information: {:?}", vec![1, 2, 3]);
//! warn!("This is a warning");
//! error!("This is an error message");
//! ```

use std::fmt::Arguments;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

/// Environment variable read by [`init_from_env`].
pub const ENV_LEVEL: &str = "CAIRN_LOG";

/// Log levels representing the severity/priority of log messages.
///
/// `Levels` are ordered from most severe (Error) to least severe (Trace).
/// Lower numeric values indicate higher severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Error level - critical failures and errors
    Error = 0,
    /// Warning level - potentially harmful situations
    Warn = 1,
    /// Info level - informational messages
    Info = 2,
    /// Debug level - detailed diagnostic information
    Debug = 3,
    /// Trace level - most detailed tracing information
    Trace = 4,
}

impl Level {
    /// Returns the ANSI color code for this log level.
    const fn color_code(&self) -> &'static str {
        match self {
            Level::Error => "\x1b[31m",
            Level::Warn => "\x1b[33m",
            Level::Info => "\x1b[32m",
            Level::Debug => "\x1b[36m",
            Level::Trace => "\x1b[35m",
        }
    }

    /// Returns the string representation of this log level.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Level::Error,
            1 => Level::Warn,
            2 => Level::Info,
            3 => Level::Debug,
            _ => Level::Trace,
        }
    }

    /// Parses a string into a Level.
    ///
    /// # Example
    ///
    /// ```
    /// use cairn_log::Level;
    ///
    /// assert_eq!(Level::from_str("error"), Ok(Level::Error));
    /// assert_eq!(Level::from_str("INFO"), Ok(Level::Info));
    /// assert!(Level::from_str("invalid").is_err());
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.trim().to_uppercase().as_str() {
            "ERROR" => Ok(Level::Error),
            "WARN" | "WARNING" => Ok(Level::Warn),
            "INFO" => Ok(Level::Info),
            "DEBUG" => Ok(Level::Debug),
            "TRACE" => Ok(Level::Trace),
            _ => Err(format!("Invalid log level: {s}")),
        }
    }
}

/// A single log event handed to a [`Sink`].
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    /// Severity of the event.
    pub level: Level,
    /// Module path of the call site.
    pub target: &'a str,
    /// The formatted message.
    pub args: Arguments<'a>,
}

/// Destination for log records.
///
/// The default sink writes colored lines to stderr. Replace it with
/// [`set_sink`] to forward diagnostics elsewhere.
pub trait Sink: Send + Sync {
    /// Writes one record. Called only for records that pass the level filter.
    fn write(&self, record: &Record<'_>);
}

/// The default sink: `[LEVEL] target: message` on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl Sink for StderrSink {
    fn write(&self, record: &Record<'_>) {
        static RESET: &str = "\x1b[0m";

        let color = record.level.color_code();
        let level_str = record.level.as_str();
        eprintln!("{color}[{level_str}]{RESET} {}: {}", record.target, record.args);
    }
}

/// An owned copy of a record kept by [`CaptureSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRecord {
    /// Severity of the event.
    pub level: Level,
    /// Module path of the call site.
    pub target: String,
    /// The formatted message.
    pub message: String,
}

/// A sink that stores every record in memory, for tests and tooling.
#[derive(Debug, Default)]
pub struct CaptureSink {
    records: Mutex<Vec<CapturedRecord>>,
}

impl CaptureSink {
    /// Creates an empty capture sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all captured records.
    pub fn records(&self) -> Vec<CapturedRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns true if a record at `level` whose message contains `needle`
    /// was captured.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|r| r.level == level && r.message.contains(needle))
    }

    /// Drops every captured record.
    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Sink for CaptureSink {
    fn write(&self, record: &Record<'_>) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CapturedRecord {
                level: record.level,
                target: record.target.to_string(),
                message: record.args.to_string(),
            });
    }
}

/// The global logger instance.
///
/// This struct uses atomic operations for thread-safe level management.
/// It is intended to be used as a singleton via `get_logger()`.
pub struct Logger {
    level: AtomicU8,
    sink: RwLock<Option<Arc<dyn Sink>>>,
}

impl Logger {
    /// Creates a new logger with the specified minimum level.
    const fn new(level: Level) -> Self {
        Logger {
            level: AtomicU8::new(level as u8),
            sink: RwLock::new(None),
        }
    }

    /// Sets the minimum log level.
    ///
    /// Messages below this level will not be logged.
    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::SeqCst);
    }

    /// Returns the current minimum log level.
    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Checks if a message at the given level would be logged.
    pub fn enabled(&self, level: Level) -> bool {
        level as u8 <= self.level.load(Ordering::Relaxed)
    }

    /// Installs `sink`, returning the previously installed custom sink.
    pub fn set_sink(&self, sink: Arc<dyn Sink>) -> Option<Arc<dyn Sink>> {
        self.sink
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(sink)
    }

    /// Restores the default stderr sink.
    pub fn reset_sink(&self) -> Option<Arc<dyn Sink>> {
        self.sink
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn dispatch(&self, record: &Record<'_>) {
        let sink = self
            .sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match sink {
            Some(sink) => sink.write(record),
            None => StderrSink.write(record),
        }
    }
}

/// Global logger singleton.
static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Returns a reference to the global logger instance.
///
/// This initializes the logger on first call with `Level::Info` as the default level.
///
/// # Example
///
/// ```
/// use cairn_log::get_logger;
///
/// let logger = get_logger();
/// logger.set_level(cairn_log::Level::Debug);
/// ```
pub fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(|| Logger::new(Level::Info))
}

/// Sets the minimum log level for the global logger.
pub fn set_level(level: Level) {
    get_logger().set_level(level);
}

/// Sets the minimum log level from a string.
///
/// # Example
///
/// ```
/// use cairn_log::set_level_from_str;
///
/// set_level_from_str("debug").unwrap();
/// ```
pub fn set_level_from_str(s: &str) -> Result<(), String> {
    let level = Level::from_str(s)?;
    set_level(level);
    Ok(())
}

/// Configures the level from the `CAIRN_LOG` environment variable.
///
/// Returns the level that was applied, or `None` when the variable is unset
/// or does not name a level (the current level is then left untouched).
pub fn init_from_env() -> Option<Level> {
    let raw = std::env::var(ENV_LEVEL).ok()?;
    let level = Level::from_str(&raw).ok()?;
    set_level(level);
    Some(level)
}

/// Routes all subsequent records to `sink`.
pub fn set_sink(sink: Arc<dyn Sink>) -> Option<Arc<dyn Sink>> {
    get_logger().set_sink(sink)
}

/// Restores the default stderr sink.
pub fn reset_sink() -> Option<Arc<dyn Sink>> {
    get_logger().reset_sink()
}

/// Internal function that performs the actual logging.
///
/// This function is called by the log macros after checking if the level is enabled.
#[doc(hidden)]
pub fn __log_with_target(level: Level, target: &str, args: Arguments) {
    let logger = get_logger();
    if !logger.enabled(level) {
        return;
    }

    logger.dispatch(&Record {
        level,
        target,
        args,
    });
}

/// The primary logging macro.
///
/// Logs a message at the specified level. The macro automatically captures
/// the module path where it was called.
///
/// # Example
///
/// ```
/// use cairn_log::{log, Level};
///
/// # cairn_log::set_level(Level::Info);
/// log!(level: Level::Info, "This is an info message: {}", 42);
/// ```
#[macro_export]
macro_rules! log {
    (level: $level:expr, $($arg:tt)*) => {
        {
            if $crate::get_logger().enabled($level) {
                $crate::__log_with_target(
                    $level,
                    module_path!(),
                    format_args!($($arg)*)
                );
            }
        }
    };
}

/// Logs a message at the Error level.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Error, $($arg)*)
    };
}

/// Logs a message at the Warn level.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Warn, $($arg)*)
    };
}

/// Logs a message at the Info level.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Info, $($arg)*)
    };
}

/// Logs a message at the Debug level.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Debug, $($arg)*)
    };
}

/// Logs a message at the Trace level.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Trace, $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Error < Level::Warn);
        assert!(Level::Warn < Level::Info);
        assert!(Level::Info < Level::Debug);
        assert!(Level::Debug < Level::Trace);
    }

    #[test]
    fn test_level_from_str() {
        assert_eq!(Level::from_str("error"), Ok(Level::Error));
        assert_eq!(Level::from_str("WARN"), Ok(Level::Warn));
        assert_eq!(Level::from_str("warning"), Ok(Level::Warn));
        assert_eq!(Level::from_str(" Info "), Ok(Level::Info));
        assert_eq!(Level::from_str("DEBUG"), Ok(Level::Debug));
        assert_eq!(Level::from_str("trace"), Ok(Level::Trace));
        assert!(Level::from_str("invalid").is_err());
    }

    #[test]
    fn test_logger_level_filtering() {
        let logger = Logger::new(Level::Info);

        assert!(logger.enabled(Level::Error));
        assert!(logger.enabled(Level::Warn));
        assert!(logger.enabled(Level::Info));
        assert!(!logger.enabled(Level::Debug));
        assert!(!logger.enabled(Level::Trace));

        logger.set_level(Level::Trace);
        assert!(logger.enabled(Level::Trace));
        assert_eq!(logger.level(), Level::Trace);
    }

    #[test]
    fn test_private_logger_sink_routing() {
        let logger = Logger::new(Level::Debug);
        let capture = Arc::new(CaptureSink::new());
        logger.set_sink(capture.clone());

        logger.dispatch(&Record {
            level: Level::Warn,
            target: "cairn_log::tests",
            args: format_args!("stack release out of order: {}", 7),
        });

        let records = capture.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].target, "cairn_log::tests");
        assert!(capture.contains(Level::Warn, "out of order: 7"));
        assert!(!capture.contains(Level::Error, "out of order"));

        assert!(logger.reset_sink().is_some());
        capture.clear();
        assert!(capture.records().is_empty());
    }

    #[test]
    fn test_set_level_from_str() {
        assert!(set_level_from_str("invalid").is_err());
        set_level_from_str("info").unwrap();
        assert!(get_logger().enabled(Level::Info));
    }

    #[test]
    fn test_macros_basic() {
        info!("This is an info message");
        debug!("This debug message is filtered at the default level");
        trace!("{} {}", "formatted", 1);
    }
}
