// crates/update-relay-core/src/logging.rs
// ============================================================================
// Module: Structured Logging
// Description: JSON-lines log events and pluggable sinks.
// Purpose: Emit structured operational logs without a global subscriber.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Components log through a cloneable [`Logger`] that filters by level and
//! forwards [`LogEvent`] records to a [`LogSink`]. Sinks write one JSON
//! object per line to stderr or a file, discard events, or retain them in
//! memory for tests. Sink write failures are swallowed so logging never
//! fails a request.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Levels
// ============================================================================

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Verbose diagnostics.
    Debug,
    /// Normal operation.
    #[default]
    Info,
    /// Degraded but recoverable.
    Warn,
    /// Failed operation.
    Error,
}

impl LogLevel {
    /// Returns the lowercase level name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// One structured log record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    /// Event name.
    pub event: &'static str,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u128,
    /// Severity.
    pub level: LogLevel,
    /// Emitting component.
    pub component: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Additional structured fields.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

impl LogEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(
        event: &'static str,
        level: LogLevel,
        component: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event,
            timestamp_ms: now_millis(),
            level,
            component,
            message: message.into(),
            fields: Map::new(),
        }
    }

    /// Attaches a structured field.
    #[must_use]
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}

/// Milliseconds since the Unix epoch.
fn now_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or_default()
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Destination for log events.
pub trait LogSink: Send + Sync {
    /// Records one event.
    fn record(&self, event: &LogEvent);
}

/// Writes JSON lines to stderr.
#[derive(Debug, Default)]
pub struct StderrLogSink;

impl LogSink for StderrLogSink {
    fn record(&self, event: &LogEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let mut stderr = std::io::stderr();
            let _ = writeln!(&mut stderr, "{payload}");
        }
    }
}

/// Appends JSON lines to a file.
pub struct FileLogSink {
    /// Open log file.
    file: Mutex<File>,
}

impl FileLogSink {
    /// Opens (or creates) the log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the file cannot be opened.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl LogSink for FileLogSink {
    fn record(&self, event: &LogEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = writeln!(&mut *file, "{payload}");
        }
    }
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NoopLogSink;

impl LogSink for NoopLogSink {
    fn record(&self, _event: &LogEvent) {}
}

/// Retains events in memory.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    /// Recorded events.
    events: Mutex<Vec<LogEvent>>,
}

impl MemoryLogSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl LogSink for MemoryLogSink {
    fn record(&self, event: &LogEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event.clone());
    }
}

// ============================================================================
// SECTION: Logger
// ============================================================================

/// Level-filtering handle over a shared sink.
#[derive(Clone)]
pub struct Logger {
    /// Destination sink.
    sink: Arc<dyn LogSink>,
    /// Lowest level that is emitted.
    min_level: LogLevel,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("min_level", &self.min_level).finish_non_exhaustive()
    }
}

impl Logger {
    /// Creates a logger over a sink.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>, min_level: LogLevel) -> Self {
        Self {
            sink,
            min_level,
        }
    }

    /// Creates a logger that discards everything.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Arc::new(NoopLogSink), LogLevel::Error)
    }

    /// Returns true when events at `level` are emitted.
    #[must_use]
    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    /// Emits a prepared event when its level passes the filter.
    pub fn emit(&self, event: &LogEvent) {
        if self.enabled(event.level) {
            self.sink.record(event);
        }
    }

    /// Emits a `log` event with no extra fields.
    pub fn log(&self, level: LogLevel, component: &'static str, message: impl Into<String>) {
        if self.enabled(level) {
            self.sink.record(&LogEvent::new("log", level, component, message));
        }
    }

    /// Emits a debug message.
    pub fn debug(&self, component: &'static str, message: impl Into<String>) {
        self.log(LogLevel::Debug, component, message);
    }

    /// Emits an info message.
    pub fn info(&self, component: &'static str, message: impl Into<String>) {
        self.log(LogLevel::Info, component, message);
    }

    /// Emits a warning message.
    pub fn warn(&self, component: &'static str, message: impl Into<String>) {
        self.log(LogLevel::Warn, component, message);
    }

    /// Emits an error message.
    pub fn error(&self, component: &'static str, message: impl Into<String>) {
        self.log(LogLevel::Error, component, message);
    }
}
