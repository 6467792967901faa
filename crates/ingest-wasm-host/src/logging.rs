//! Logging host function implementation.
//!
//! Guest messages are re-emitted through `tracing` at the mapped severity,
//! tagged with `guest_log = true` and the session id so they can be filtered
//! apart from the host's own logs.

use tracing::{debug, error, info, trace, warn};

/// Severity of a guest log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Very verbose diagnostics.
    Trace,
    /// Debug-level messages.
    Debug,
    /// Informational messages.
    Info,
    /// Warning messages.
    Warn,
    /// Error messages.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Host implementation for the logging interface.
pub struct LoggingHost;

impl LoggingHost {
    /// Emit a guest message at the given level.
    ///
    /// # Arguments
    ///
    /// * `session_id` - The session the message came from
    /// * `level` - The log level
    /// * `message` - The log message
    pub fn log(session_id: &str, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => trace!(session_id, guest_log = true, "{}", message),
            LogLevel::Debug => debug!(session_id, guest_log = true, "{}", message),
            LogLevel::Info => info!(session_id, guest_log = true, "{}", message),
            LogLevel::Warn => warn!(session_id, guest_log = true, "{}", message),
            LogLevel::Error => error!(session_id, guest_log = true, "{}", message),
        }
    }
}

/// Convert a numeric guest log level to [`LogLevel`].
///
/// # Arguments
///
/// * `level` - Numeric log level (0=trace, 1=debug, 2=info, 3=warn, 4=error)
///
/// # Returns
///
/// The corresponding [`LogLevel`], defaulting to Info for unknown values.
pub fn level_from_i32(level: i32) -> LogLevel {
    match level {
        0 => LogLevel::Trace,
        1 => LogLevel::Debug,
        3 => LogLevel::Warn,
        4 => LogLevel::Error,
        _ => LogLevel::Info, // 2 and unknown values default to Info
    }
}

/// Convert a [`LogLevel`] to its numeric guest value.
pub fn level_to_i32(level: LogLevel) -> i32 {
    match level {
        LogLevel::Trace => 0,
        LogLevel::Debug => 1,
        LogLevel::Info => 2,
        LogLevel::Warn => 3,
        LogLevel::Error => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_i32() {
        assert_eq!(level_from_i32(0), LogLevel::Trace);
        assert_eq!(level_from_i32(1), LogLevel::Debug);
        assert_eq!(level_from_i32(2), LogLevel::Info);
        assert_eq!(level_from_i32(3), LogLevel::Warn);
        assert_eq!(level_from_i32(4), LogLevel::Error);
        assert_eq!(level_from_i32(99), LogLevel::Info); // Unknown defaults to Info
        assert_eq!(level_from_i32(-1), LogLevel::Info);
    }

    #[test]
    fn test_level_round_trip() {
        for level in [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ] {
            assert_eq!(level_from_i32(level_to_i32(level)), level);
        }
    }

    #[test]
    fn test_level_display() {
        assert_eq!(LogLevel::Trace.to_string(), "TRACE");
        assert_eq!(LogLevel::Warn.to_string(), "WARN");
    }

    #[test]
    fn test_log_without_subscriber_does_not_panic() {
        LoggingHost::log("session", LogLevel::Error, "guest failure");
        LoggingHost::log("session", LogLevel::Trace, "");
    }
}
