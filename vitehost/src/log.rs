//! Component log handed to every bootstrap step.
//!
//! Components never reach for a process-wide logger. They receive a
//! [`Logger`] and write scoped entries to it; the owner decides where the
//! entries end up (a channel drained by the CLI, or `tracing`).

use std::sync::OnceLock;

use time::{OffsetDateTime, UtcOffset};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedLog {
    pub timestamp: String,
    pub level: LogLevel,
    pub scope: String,
    pub message: String,
}

fn hms_timestamp(h: u8, m: u8, s: u8) -> String {
    format!("{:02}:{:02}:{:02}", h, m, s)
}

static LOCAL_OFFSET: OnceLock<UtcOffset> = OnceLock::new();

fn local_offset() -> UtcOffset {
    *LOCAL_OFFSET.get_or_init(|| UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC))
}

impl ScopedLog {
    pub fn at(level: LogLevel, scope: impl Into<String>, message: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc().to_offset(local_offset());
        Self {
            timestamp: hms_timestamp(now.hour(), now.minute(), now.second()),
            level,
            scope: scope.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ScopedLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {:<5} [{}] {}",
            self.timestamp, self.level, self.scope, self.message
        )
    }
}

#[derive(Debug, Clone)]
enum LogTarget {
    Channel(mpsc::UnboundedSender<ScopedLog>),
    Tracing,
}

/// Cloneable, scoped log handle.
#[derive(Debug, Clone)]
pub struct Logger {
    scope: String,
    target: LogTarget,
}

impl Logger {
    /// Entries are sent to `tx`. A closed receiver silently drops entries.
    pub fn channel(scope: impl Into<String>, tx: mpsc::UnboundedSender<ScopedLog>) -> Self {
        Self {
            scope: scope.into(),
            target: LogTarget::Channel(tx),
        }
    }

    /// Entries become `tracing` events carrying a `scope` field.
    pub fn tracing(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            target: LogTarget::Tracing,
        }
    }

    /// Same destination, different scope.
    pub fn scoped(&self, scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            target: self.target.clone(),
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match &self.target {
            LogTarget::Channel(tx) => {
                let _ = tx.send(ScopedLog::at(level, self.scope.clone(), message));
            }
            LogTarget::Tracing => match level {
                LogLevel::Debug => tracing::debug!(scope = %self.scope, "{}", message),
                LogLevel::Info => tracing::info!(scope = %self.scope, "{}", message),
                LogLevel::Warn => tracing::warn!(scope = %self.scope, "{}", message),
                LogLevel::Error => tracing::error!(scope = %self.scope, "{}", message),
            },
        }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }
}

/// Logger plus the receiving end of its channel.
pub fn channel_logger(scope: impl Into<String>) -> (Logger, mpsc::UnboundedReceiver<ScopedLog>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Logger::channel(scope, tx), rx)
}

/// Drain everything currently buffered in `rx`.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ScopedLog>) -> Vec<ScopedLog> {
    let mut out = Vec::new();
    while let Ok(entry) = rx.try_recv() {
        out.push(entry);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct CapturedOutput(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedOutput {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn log_level_display_pads_to_width() {
        assert_eq!(format!("{:<5}", LogLevel::Info), "INFO ");
        assert_eq!(format!("{:<5}", LogLevel::Error), "ERROR");
    }

    #[test]
    fn channel_logger_tags_entries_with_scope_and_level() {
        let (logger, mut rx) = channel_logger("vite");
        logger.info("VITE v5.0.0  ready in 300 ms");
        logger.error("something broke");

        let entries = drain(&mut rx);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].scope, "vite");
        assert_eq!(entries[0].level, LogLevel::Info);
        assert_eq!(entries[1].level, LogLevel::Error);
        assert_eq!(entries[1].message, "something broke");
    }

    #[test]
    fn scoped_logger_shares_destination() {
        let (logger, mut rx) = channel_logger("vitehost");
        logger.scoped("vite").warn("npm install done.");

        let entries = drain(&mut rx);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].scope, "vite");
        assert_eq!(entries[0].level, LogLevel::Warn);
    }

    #[test]
    fn closed_channel_does_not_panic() {
        let (logger, rx) = channel_logger("vite");
        drop(rx);
        logger.info("nobody listens");
    }

    #[test]
    fn scoped_log_display_matches_console_layout() {
        let entry = ScopedLog {
            timestamp: "12:00:01".to_string(),
            level: LogLevel::Warn,
            scope: "vite".to_string(),
            message: "hello".to_string(),
        };
        assert_eq!(entry.to_string(), "12:00:01 WARN  [vite] hello");
    }

    #[test]
    fn tracing_logger_maps_levels_and_carries_scope() {
        let output = CapturedOutput::default();
        let writer = output.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .without_time()
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let logger = Logger::tracing("vite");
            logger.debug("password generated");
            logger.info("VITE v5.0.0  ready in 300 ms");
            logger.warn("node_modules not found");
            logger.scoped("vitehost").error("launch failed");
        });

        let text = String::from_utf8(output.0.lock().clone()).unwrap();
        let line = |message: &str| {
            text.lines()
                .find(|l| l.contains(message))
                .unwrap_or_else(|| panic!("no event for {message:?} in:\n{text}"))
                .to_string()
        };

        let debug = line("password generated");
        assert!(debug.contains("DEBUG") && debug.contains("scope=vite"), "{debug}");
        let info = line("ready in 300 ms");
        assert!(info.contains("INFO") && info.contains("scope=vite"), "{info}");
        let warn = line("node_modules not found");
        assert!(warn.contains("WARN") && warn.contains("scope=vite"), "{warn}");
        let error = line("launch failed");
        assert!(error.contains("ERROR") && error.contains("scope=vitehost"), "{error}");
    }
}
