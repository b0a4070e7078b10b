//! Retry progress reporting.
//!
//! The backoff executor announces every wait before it sleeps so the user
//! sees why a command is slow. Progress goes to **stderr** so stdout stays
//! parseable for scripts.

use std::io::Write;
use std::sync::Mutex;

/// A single progress event from the backoff executor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryEvent {
    /// About to wait `delay_ms` before retry number `attempt + 1`.
    Waiting {
        call: String,
        attempt: u32,
        delay_ms: u64,
        reason: String,
    },
    /// Retries ran out; the last error is being surfaced.
    GaveUp { call: String, attempts: u32 },
}

/// Receives retry progress. Implementations must not block.
pub trait RetryReporter: Send + Sync {
    fn report(&self, event: RetryEvent);
}

/// Human-friendly progress on stderr: "search page 3  retrying in 2.0s (attempt 2)".
pub struct StderrProgress;

impl RetryReporter for StderrProgress {
    fn report(&self, event: RetryEvent) {
        let line = match &event {
            RetryEvent::Waiting {
                call,
                attempt,
                delay_ms,
                reason,
            } => format!(
                "{}  retrying in {:.1}s (attempt {}): {}\n",
                call,
                *delay_ms as f64 / 1000.0,
                attempt + 1,
                reason
            ),
            RetryEvent::GaveUp { call, attempts } => {
                format!("{}  giving up after {} attempts\n", call, attempts)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl RetryReporter for JsonProgress {
    fn report(&self, event: RetryEvent) {
        let obj = match &event {
            RetryEvent::Waiting {
                call,
                attempt,
                delay_ms,
                reason,
            } => serde_json::json!({
                "event": "retry",
                "call": call,
                "attempt": attempt,
                "delay_ms": delay_ms,
                "reason": reason,
            }),
            RetryEvent::GaveUp { call, attempts } => serde_json::json!({
                "event": "gave_up",
                "call": call,
                "attempts": attempts,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl RetryReporter for NoProgress {
    fn report(&self, _event: RetryEvent) {}
}

/// Keeps every event in memory for later inspection.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<RetryEvent>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RetryEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl RetryReporter for RecordingProgress {
    fn report(&self, event: RetryEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse a `--progress` value: `auto`, `off`, `human`, or `json`.
    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "auto" => Ok(Self::default_for_tty()),
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => anyhow::bail!(
                "Unknown progress mode: '{}'. Use auto, off, human, or json.",
                other
            ),
        }
    }

    pub fn reporter(&self) -> Box<dyn RetryReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
