//! Error-reporting sink boundary.
//!
//! The orchestrator emits one structured diagnostic report per failed
//! proof attempt (platform, intent hash, selected candidate, raw error)
//! before collapsing the failure into the verification status. The sink
//! itself is a collaborator; the bounded in-memory implementation here is
//! what the client wires by default.

use crate::core::config::MAX_REPORT_ENTRIES;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// One diagnostic report: a message plus ordered context pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// Unix milliseconds at report time.
    pub timestamp_ms: u64,
    pub message: String,
    pub context: Vec<(String, String)>,
}

/// Accepts diagnostic reports. Implementations must tolerate being called
/// from any task.
pub trait ReportSink: Send + Sync {
    fn report(&self, message: &str, context: &[(String, String)]);
}

/// Bounded in-memory sink; oldest reports are dropped first.
#[derive(Clone, Default)]
pub struct BufferedReporter {
    entries: Arc<Mutex<VecDeque<Report>>>,
}

impl BufferedReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of retained reports, oldest first.
    pub fn reports(&self) -> Vec<Report> {
        self.entries.lock().unwrap().iter().cloned().collect()
    }
}

impl ReportSink for BufferedReporter {
    fn report(&self, message: &str, context: &[(String, String)]) {
        let timestamp_ms = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= MAX_REPORT_ENTRIES {
            entries.pop_front();
        }
        entries.push_back(Report {
            timestamp_ms,
            message: message.to_string(),
            context: context.to_vec(),
        });
    }
}
