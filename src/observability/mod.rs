//! Observability
//!
//! - Structured logging (JSON, one line per event)
//! - Typed events with a fixed severity
//! - Monotonic counters
//!
//! Observability never changes request outcomes.

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Log an event at its own severity
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_does_not_panic() {
        log_event(Event::NodeStarted, &[("shard", "group-1")]);
        log_event(Event::ReplicaHalted, &[]);
    }
}
