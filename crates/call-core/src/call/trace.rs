//! Per-call trace buffer
//!
//! Mutations of a call are appended as timestamped lines. The buffer is
//! flushed as one text block when it fills up and when the call is dropped.
//! Every committed state is also appended to a compact state path that is
//! attached to the flushed block.

use crate::types::{CallState, Substate};
use chrono::{DateTime, Utc};
use std::fmt::Write;

#[derive(Debug)]
pub struct CallTrace {
    entries: Vec<(DateTime<Utc>, String)>,
    state_path: Vec<(CallState, Substate)>,
    capacity: usize,
    redact: bool,
}

impl CallTrace {
    pub fn new(capacity: usize, redact: bool) -> Self {
        Self {
            entries: Vec::new(),
            state_path: Vec::new(),
            capacity: capacity.max(1),
            redact,
        }
    }

    /// Record a mutation. Returns the flushed text when the buffer filled up.
    pub fn record(&mut self, what: &str) -> Option<String> {
        self.push(what.to_string())
    }

    /// Record a mutation with its value. With redaction enabled only the
    /// name is kept.
    pub fn record_value(&mut self, what: &str, value: impl FnOnce() -> String) -> Option<String> {
        if self.redact {
            self.push(what.to_string())
        } else {
            self.push(format!("{}: {}", what, value()))
        }
    }

    pub fn record_state(&mut self, state: CallState, substate: Substate) {
        self.state_path.push((state, substate));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, message: String) -> Option<String> {
        self.entries.push((Utc::now(), message));
        if self.entries.len() >= self.capacity {
            self.flush()
        } else {
            None
        }
    }

    /// Render and clear the buffered entries and state path.
    ///
    /// Nothing is produced while both are empty.
    pub fn flush(&mut self) -> Option<String> {
        if self.entries.is_empty() && self.state_path.is_empty() {
            return None;
        }
        let mut out = String::from("CallTrace:\n");
        for (at, message) in self.entries.drain(..) {
            let _ = writeln!(out, "[{}] {}", at.format("%H:%M:%S%.3f"), message);
        }
        if !self.state_path.is_empty() {
            let path = self
                .state_path
                .drain(..)
                .map(|(state, substate)| format!("0x{:08x}_0x{:08x}", state.bits(), substate.bits()))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = write!(out, "StatePath: {}", path);
        }
        if out.ends_with('\n') {
            out.pop();
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_renders_entries_and_state_path() {
        let mut trace = CallTrace::new(10, false);
        trace.record("Call instance created");
        trace.record_value("dial_string_set", || "5551234567".into());
        trace.record_state(CallState::Connecting, Substate::CALLING);
        trace.record_state(CallState::Connected, Substate::CONFERENCING);

        let text = trace.flush().unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "CallTrace:");
        assert!(lines[1].ends_with("] Call instance created"));
        assert!(lines[2].ends_with("] dial_string_set: 5551234567"));
        assert_eq!(lines[3], "StatePath: 0x00000002_0x00000001, 0x00000004_0x00000040");
        assert!(trace.flush().is_none());
    }

    #[test]
    fn state_path_alone_is_flushed() {
        let mut trace = CallTrace::new(10, false);
        trace.record_state(CallState::Disconnected, Substate::NONE);

        let text = trace.flush().unwrap();
        assert_eq!(text, "CallTrace:\nStatePath: 0x00000080_0x00000000");
        assert!(trace.flush().is_none());
    }

    #[test]
    fn redaction_keeps_only_the_name() {
        let mut trace = CallTrace::new(10, true);
        trace.record_value("remote_ip_set", || "10.0.0.1".into());
        let text = trace.flush().unwrap();
        assert!(text.ends_with("] remote_ip_set"));
        assert!(!text.contains("10.0.0.1"));
    }

    #[test]
    fn overflow_flushes_automatically() {
        let mut trace = CallTrace::new(3, false);
        assert!(trace.record("a").is_none());
        assert!(trace.record("b").is_none());
        let flushed = trace.record("c").unwrap();
        assert_eq!(flushed.lines().count(), 4);
        assert!(trace.is_empty());
    }
}
