//! Structured JSON logger
//!
//! - One log line = one event
//! - `event` first, then `severity`, `ts`, then fields sorted by key
//! - Synchronous, no buffering
//! - Written to stderr; stdout carries command output

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{SecondsFormat, Utc};

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Debug-level detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Request failures
    Error = 3,
    /// Replica stopped serving
    Fatal = 4,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Severity::Trace,
            1 => Severity::Info,
            2 => Severity::Warn,
            3 => Severity::Error,
            _ => Severity::Fatal,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static MIN_SEVERITY: AtomicU8 = AtomicU8::new(Severity::Info as u8);

/// Process-wide structured logger
pub struct Logger;

impl Logger {
    /// Drop every line below `severity`
    pub fn set_min_severity(severity: Severity) {
        MIN_SEVERITY.store(severity as u8, Ordering::Relaxed);
    }

    pub fn min_severity() -> Severity {
        Severity::from_u8(MIN_SEVERITY.load(Ordering::Relaxed))
    }

    pub fn enabled(severity: Severity) -> bool {
        severity >= Self::min_severity()
    }

    /// Log an event with the given severity and fields
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if !Self::enabled(severity) {
            return;
        }
        let line = Self::render(severity, event, fields);
        let mut stderr = io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }

    fn render(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
        let mut output = String::with_capacity(256);
        output.push('{');
        Self::push_pair(&mut output, "event", event);
        output.push(',');
        Self::push_pair(&mut output, "severity", severity.as_str());
        output.push(',');
        let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        Self::push_pair(&mut output, "ts", &ts);

        let mut sorted: Vec<_> = fields.iter().collect();
        sorted.sort_by_key(|(key, _)| *key);
        for (key, value) in sorted {
            output.push(',');
            Self::push_pair(&mut output, key, value);
        }

        output.push_str("}\n");
        output
    }

    fn push_pair(output: &mut String, key: &str, value: &str) {
        // Serializing a &str cannot fail.
        output.push_str(&serde_json::to_string(key).unwrap_or_default());
        output.push(':');
        output.push_str(&serde_json::to_string(value).unwrap_or_default());
    }

    pub fn trace(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Trace, event, fields);
    }

    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Error, event, fields);
    }

    pub fn fatal(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Fatal, event, fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Trace < Severity::Info);
        assert!(Severity::Warn < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
        assert_eq!(Severity::from_u8(Severity::Warn as u8), Severity::Warn);
    }

    #[test]
    fn test_render_is_one_json_line() {
        let line = Logger::render(Severity::Info, "MODE_APPLIED", &[("mode", "strict")]);
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["event"], "MODE_APPLIED");
        assert_eq!(parsed["severity"], "INFO");
        assert_eq!(parsed["mode"], "strict");
        assert!(parsed["ts"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_event_first_then_sorted_fields() {
        let line = Logger::render(
            Severity::Warn,
            "TEST",
            &[("zebra", "1"), ("apple", "2"), ("mango", "3")],
        );
        let event = line.find("\"event\"").unwrap();
        let severity = line.find("\"severity\"").unwrap();
        let apple = line.find("apple").unwrap();
        let mango = line.find("mango").unwrap();
        let zebra = line.find("zebra").unwrap();
        assert!(event < severity);
        assert!(apple < mango && mango < zebra);
    }

    #[test]
    fn test_escapes_special_chars() {
        let line = Logger::render(Severity::Error, "TEST", &[("message", "say \"hi\"\nbye")]);
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["message"], "say \"hi\"\nbye");
    }
}
