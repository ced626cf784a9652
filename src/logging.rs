//! Structured logging setup for hosts embedding the pipeline
//!
//! Provides a timestamped, module-tagged logger with optional file output
//! and selective per-subsystem debug categories, so a host can turn on
//! verbose output for, say, the reporter without drowning in retry traces.

use chrono::Local;
use log::Level;
use log::{LevelFilter, Metadata, Record};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::{Once, RwLock};

/// Timestamp format for log entries
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Global initialization guard
static INIT_LOGGER: Once = Once::new();

/// Log verbosity, serializable for host configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        };
        write!(f, "{}", name)
    }
}

/// Debug flag categories for selective logging
#[derive(Debug, Clone, Default)]
pub struct DebugFlags {
    pub manager: bool,   // registry, classification, retry scheduling
    pub recovery: bool,  // action chains, history
    pub logger: bool,    // buffer, export, remote forwarding
    pub reporter: bool,  // queueing, flushes, stored backups
    pub platform: bool,  // transport and store implementations
    pub all: bool,       // enable all debug output
}

/// Global debug flags storage
static DEBUG_FLAGS: RwLock<DebugFlags> = RwLock::new(DebugFlags {
    manager: false,
    recovery: false,
    logger: false,
    reporter: false,
    platform: false,
    all: false,
});

/// Custom logger with console and optional file output
pub struct FaultlineLogger {
    /// File output for logs
    file: Option<Mutex<File>>,
    /// Log level filter
    level: LevelFilter,
    /// Whether to output to stderr
    console_output: bool,
}

impl log::Log for FaultlineLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        // Always allow warn and error
        if metadata.level() <= Level::Warn {
            return metadata.level() <= self.level;
        }

        if metadata.level() > self.level {
            return false;
        }

        // For debug level, also check debug flags
        if metadata.level() == Level::Debug {
            return should_log_debug(metadata.target());
        }

        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let timestamp = Local::now().format(TIMESTAMP_FORMAT);

        let level_str = match record.level() {
            Level::Error => "\x1B[31mERROR\x1B[0m", // Red
            Level::Warn => "\x1B[33mWARN \x1B[0m",  // Yellow
            Level::Info => "\x1B[32mINFO \x1B[0m",  // Green
            Level::Debug => "\x1B[36mDEBUG\x1B[0m", // Cyan
            Level::Trace => "\x1B[90mTRACE\x1B[0m", // Gray
        };

        let module = record.module_path().unwrap_or("<unknown>");
        let file_info = format!(
            "{}:{}",
            record.file().unwrap_or("<unknown>"),
            record.line().unwrap_or(0)
        );

        let console_entry = format!(
            "[{}] {} [{}] [{}] {}\n",
            timestamp,
            level_str,
            module,
            file_info,
            record.args()
        );

        // Plain format for file
        let file_entry = format!(
            "[{}] {} [{}] [{}] {}\n",
            timestamp,
            record.level(),
            module,
            file_info,
            record.args()
        );

        if self.console_output {
            let _ = io::stderr().write_all(console_entry.as_bytes());
        }

        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(file_entry.as_bytes());
                let _ = file.flush();
            }
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

/// Configure logging with the specified level and optionally a log file
///
/// The global logger can only be installed once per process; later calls
/// are no-ops.
pub fn configure_logging(
    level: LogLevel,
    log_file: Option<PathBuf>,
    console_output: bool,
) -> Result<(), String> {
    let mut result = Ok(());

    INIT_LOGGER.call_once(|| {
        let level_filter = match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        };

        let file = if let Some(path) = log_file.clone() {
            if let Some(parent) = path.parent() {
                if !parent.exists() {
                    if let Err(e) = std::fs::create_dir_all(parent) {
                        result = Err(format!("Failed to create log directory: {}", e));
                        return;
                    }
                }
            }

            match OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => Some(Mutex::new(file)),
                Err(e) => {
                    result = Err(format!("Failed to open log file: {}", e));
                    return;
                }
            }
        } else {
            None
        };

        let logger = Box::new(FaultlineLogger {
            file,
            level: level_filter,
            console_output,
        });

        if let Err(e) = log::set_boxed_logger(logger) {
            result = Err(format!("Failed to set logger: {}", e));
            return;
        }

        log::set_max_level(level_filter);

        log::info!("Logging initialized at level: {}", level);
        if let Some(path) = log_file {
            log::info!("Log file: {}", path.display());
        }
    });

    result
}

/// Set global debug flags for selective logging
pub fn set_debug_flags(flags: DebugFlags) {
    if let Ok(mut debug_flags) = DEBUG_FLAGS.write() {
        *debug_flags = flags;
    }
}

/// Check if a debug category should log based on the module path and global flags
pub fn should_log_debug(module_path: &str) -> bool {
    if let Ok(flags) = DEBUG_FLAGS.read() {
        if flags.all {
            return true;
        }

        if module_path.contains("::manager")
            || module_path.contains("::classify")
            || module_path.contains("::events")
        {
            return flags.manager;
        }
        if module_path.contains("::recovery") {
            return flags.recovery;
        }
        if module_path.contains("::logger") {
            return flags.logger;
        }
        if module_path.contains("::reporter") {
            return flags.reporter;
        }
        if module_path.contains("::platform") {
            return flags.platform;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_flags_gate_by_module_path() {
        set_debug_flags(DebugFlags {
            reporter: true,
            ..DebugFlags::default()
        });

        assert!(should_log_debug("faultline::reporter"));
        assert!(!should_log_debug("faultline::manager"));

        set_debug_flags(DebugFlags {
            all: true,
            ..DebugFlags::default()
        });
        assert!(should_log_debug("faultline::manager"));

        // Restore the quiet default for other tests
        set_debug_flags(DebugFlags::default());
    }

    #[test]
    #[ignore]
    // The global logger can only be initialized once per process. Run
    // manually to verify file creation.
    fn test_logger_creation() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("test.log");

        let result = configure_logging(LogLevel::Debug, Some(log_path.clone()), false);
        assert!(result.is_ok());

        log::info!("Test info message");
        assert!(log_path.exists());
    }
}
