//! Fire-and-forget monitoring of curation outcomes.

use serde::Serialize;
use serde_json::Value;
use std::sync::mpsc::Sender;
use std::sync::Mutex;
use tracing::info;

/// Receives structured job events. Emitting never fails.
pub trait MonitoringSink: Send + Sync {
    fn emit(&self, job: &str, status: &str, context: &Value);
}

/// Logs each event as a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMonitor;

impl MonitoringSink for TracingMonitor {
    fn emit(&self, job: &str, status: &str, context: &Value) {
        info!(job, status, context = %context, "Monitor event");
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorEvent {
    pub job: String,
    pub status: String,
    pub context: Value,
}

/// Forwards events over a channel. Send failures are ignored.
pub struct ChannelMonitor {
    tx: Mutex<Sender<MonitorEvent>>,
}

impl ChannelMonitor {
    pub fn new(tx: Sender<MonitorEvent>) -> Self {
        Self { tx: Mutex::new(tx) }
    }
}

impl MonitoringSink for ChannelMonitor {
    fn emit(&self, job: &str, status: &str, context: &Value) {
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.send(MonitorEvent {
                job: job.to_string(),
                status: status.to_string(),
                context: context.clone(),
            });
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullMonitor;

impl MonitoringSink for NullMonitor {
    fn emit(&self, _job: &str, _status: &str, _context: &Value) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::mpsc;

    #[test]
    fn test_channel_monitor() {
        let (tx, rx) = mpsc::channel();
        let monitor = ChannelMonitor::new(tx);
        monitor.emit("vacation_curation", "rejected", &json!({"reason": "no_core_day"}));

        let event = rx.recv().unwrap();
        assert_eq!(event.job, "vacation_curation");
        assert_eq!(event.status, "rejected");
        assert_eq!(event.context["reason"], "no_core_day");
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let monitor = ChannelMonitor::new(tx);
        monitor.emit("vacation_curation", "selected", &json!({}));
        NullMonitor.emit("vacation_curation", "selected", &json!({}));
    }
}
