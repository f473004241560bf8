//! Diagnostic Sink
//!
//! Non-fatal problems (corrupt stored data, unreadable history entries,
//! issuer outages during reconciliation) are reported here instead of being
//! raised as errors. The default sink forwards to `tracing`.

use std::sync::{Arc, Mutex};
use tracing::warn;

/// Receiver for non-fatal warnings
pub trait DiagnosticSink: Send + Sync {
    /// Report a warning originating from `source`
    fn warn(&self, source: &str, message: &str);
}

/// Forwards warnings to `tracing::warn!`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn warn(&self, source: &str, message: &str) {
        warn!(source = source, "{}", message);
    }
}

/// Keeps warnings in memory, for hosts that surface them later
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<(String, String)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Warnings received so far, as (source, message)
    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticSink for MemorySink {
    fn warn(&self, source: &str, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((source.to_string(), message.to_string()));
        }
    }
}

/// The sink used when none is injected
pub fn default_sink() -> Arc<dyn DiagnosticSink> {
    Arc::new(TracingSink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());

        sink.warn("store", "corrupt file");
        let clone = sink.clone();
        clone.warn("history", "bad entry");

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.entries()[0], ("store".to_string(), "corrupt file".to_string()));
    }
}
