//! Audit trail for webhook decisions
//!
//! Every decision the pipeline takes is written as one timestamped line:
//!
//! ```text
//! [2024-05-01 12:00:00] [INFO] Push event detected on branch 'main'
//! ```
//!
//! Where the lines go is behind the [`AuditSink`] trait so rotation or remote
//! shipping can be added without touching the decision logic.

pub mod file;

use chrono::{DateTime, Local};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

pub use file::FileAuditSink;

use crate::types::Result;

/// Severity of an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditLevel {
    Info,
    Warning,
    Error,
}

impl AuditLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditLevel::Info => "INFO",
            AuditLevel::Warning => "WARNING",
            AuditLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for AuditLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the audit log
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub timestamp: DateTime<Local>,
    pub level: AuditLevel,
    pub message: String,
}

impl AuditEntry {
    pub fn new(level: AuditLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            message: message.into(),
        }
    }

    /// `[<timestamp>] [<LEVEL>] <message>`
    pub fn render(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.message
        )
    }
}

/// Destination for audit entries
pub trait AuditSink: Send + Sync {
    fn append(&self, entry: &AuditEntry) -> Result<()>;
}

/// Per-request recorder
///
/// Mirrors each entry to `tracing` and remembers the last one written. A failing
/// sink is reported but never changes the request outcome.
pub struct AuditTrail {
    sink: Arc<dyn AuditSink>,
    last: Option<AuditEntry>,
}

impl AuditTrail {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink, last: None }
    }

    pub fn record(&mut self, level: AuditLevel, message: impl Into<String>) -> &AuditEntry {
        let entry = AuditEntry::new(level, message);

        match level {
            AuditLevel::Info => info!(target: "audit", "{}", entry.message),
            AuditLevel::Warning => warn!(target: "audit", "{}", entry.message),
            AuditLevel::Error => error!(target: "audit", "{}", entry.message),
        }

        if let Err(e) = self.sink.append(&entry) {
            error!(error = %e, "Failed to write audit entry");
        }

        self.last.insert(entry)
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.record(AuditLevel::Info, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.record(AuditLevel::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.record(AuditLevel::Error, message);
    }

    pub fn last(&self) -> Option<&AuditEntry> {
        self.last.as_ref()
    }
}

/// Sink keeping entries in memory, for assertions in tests
#[cfg(test)]
#[derive(Default)]
pub struct MemoryAuditSink {
    entries: parking_lot::Mutex<Vec<AuditEntry>>,
}

#[cfg(test)]
impl MemoryAuditSink {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .map(|e| e.message.clone())
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries.lock().iter().any(|e| e.message.contains(needle))
    }
}

#[cfg(test)]
impl AuditSink for MemoryAuditSink {
    fn append(&self, entry: &AuditEntry) -> Result<()> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn append(&self, _entry: &AuditEntry) -> Result<()> {
            Err(crate::types::Error::Application("disk full".to_string()))
        }
    }

    #[test]
    fn test_level_strings() {
        assert_eq!(AuditLevel::Info.as_str(), "INFO");
        assert_eq!(AuditLevel::Warning.as_str(), "WARNING");
        assert_eq!(AuditLevel::Error.to_string(), "ERROR");
    }

    #[test]
    fn test_render_format() {
        let entry = AuditEntry::new(AuditLevel::Warning, "something odd");
        let rendered = entry.render();

        // [YYYY-MM-DD HH:MM:SS] is 21 characters
        assert_eq!(&rendered[0..1], "[");
        assert_eq!(&rendered[20..21], "]");
        assert_eq!(&rendered[21..], " [WARNING] something odd");
    }

    #[test]
    fn test_trail_records_in_order_and_tracks_last() {
        let sink = Arc::new(MemoryAuditSink::default());
        let mut trail = AuditTrail::new(sink.clone());
        assert!(trail.last().is_none());

        trail.info("one");
        trail.warning("two");
        trail.error("three");

        assert_eq!(sink.messages(), vec!["one", "two", "three"]);
        let last = trail.last().unwrap();
        assert_eq!(last.level, AuditLevel::Error);
        assert_eq!(last.message, "three");
    }

    #[test]
    fn test_trail_survives_failing_sink() {
        let mut trail = AuditTrail::new(Arc::new(FailingSink));
        let entry = trail.record(AuditLevel::Info, "still recorded");
        assert_eq!(entry.message, "still recorded");
        assert_eq!(trail.last().unwrap().message, "still recorded");
    }
}
