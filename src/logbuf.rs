//! In-memory log record accumulation; on exit the run's records are
//! prepended to the configured line-oriented log file.
//!
//! Records accumulate in memory during a run instead of streaming straight
//! to a terminal, so a run's entries land together at the head of the log
//! file rather than interleaved across a long-lived process.

use std::fmt;
use std::io::Write;
use std::path::Path;

use byte_unit::{Byte, UnitType};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::errors::*;

#[macro_export]
macro_rules! log_record {
    ($target:expr, $lvl:expr, $($arg:tt)+) => {
        $target.record($lvl, format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! log_error {
    ($target:expr, $($arg:tt)+) => ($crate::log_record!($target, $crate::logbuf::Level::Error, $($arg)+))
}

#[macro_export]
macro_rules! log_info {
    ($target:expr, $($arg:tt)+) => ($crate::log_record!($target, $crate::logbuf::Level::Info, $($arg)+))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
}

impl Level {
    fn as_char(self) -> char {
        match self {
            Level::Info => 'I',
            Level::Error => 'E',
        }
    }
}

/// One accumulated `Finish`/`Error`/`Remove`/... entry.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: Level,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Logger {
    records: Vec<LogRecord>,
}

impl Logger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, level: Level, args: fmt::Arguments<'_>) {
        self.records.push(LogRecord {
            level,
            message: args.to_string(),
        });
        match level {
            Level::Info => tracing::info!("{}", self.records.last().unwrap().message),
            Level::Error => tracing::error!("{}", self.records.last().unwrap().message),
        }
    }

    pub fn finish(&mut self, logdir: &str, name: &str) {
        self.record(Level::Info, format_args!("Finish {logdir} {name}"));
    }

    pub fn error(&mut self, name: &str, err: &Error) {
        self.record(Level::Error, format_args!("Error {name}: {err:#}"));
    }

    pub fn remove(&mut self, name: &str) {
        self.record(Level::Info, format_args!("Remove {name}"));
    }

    #[must_use]
    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    /// Render this run's records, one `<level-char> <rfc3339> <message>`
    /// line each, and prepend them to `path`'s existing contents.
    pub fn flush_prepend(&self, path: &Path) -> Result<()> {
        if self.records.is_empty() {
            return Ok(());
        }
        let now = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();

        let mut new_contents = String::new();
        for record in &self.records {
            new_contents.push(record.level.as_char());
            new_contents.push(' ');
            new_contents.push_str(&now);
            new_contents.push(' ');
            new_contents.push_str(&record.message);
            new_contents.push('\n');
        }

        let existing = std::fs::read_to_string(path).unwrap_or_default();
        new_contents.push_str(&existing);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory {}", parent.display()))?;
        }
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        file.write_all(new_contents.as_bytes())
            .with_context(|| format!("writing log file {}", path.display()))
    }
}

/// Human-readable byte count for log messages (`QuotaEngine`/`Cleaner`
/// report how much they freed/deleted).
#[must_use]
pub fn human_bytes(n: u64) -> String {
    Byte::from_u64(n)
        .get_appropriate_unit(UnitType::Binary)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_prepend_writes_newest_first() {
        let path = std::env::temp_dir().join(format!(
            "seedkeeper-logbuf-test-{}",
            std::process::id()
        ));
        std::fs::write(&path, "old line\n").unwrap();

        let mut logger = Logger::new();
        logger.finish("seed", "Some.Movie");
        logger.flush_prepend(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with('I'));
        assert!(contents.contains("Finish seed Some.Movie"));
        assert!(contents.ends_with("old line\n"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn empty_logger_does_not_touch_the_file() {
        let path = std::env::temp_dir().join(format!(
            "seedkeeper-logbuf-test-empty-{}",
            std::process::id()
        ));
        let logger = Logger::new();
        logger.flush_prepend(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn human_bytes_formats_binary_units() {
        assert!(human_bytes(1024).contains("KiB") || human_bytes(1024).contains("KB"));
    }
}
