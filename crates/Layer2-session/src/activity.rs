//! Activity tracking - last output time per session
//!
//! Updated from the output channel on every chunk, read by the idle detector.

use deck_foundation::SessionId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct ActivityRecord {
    last_output: Instant,
    has_output: bool,
    output_seq: u64,
}

/// Point-in-time view of a session's activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivitySample {
    /// Time since the last output chunk (or since the session began)
    pub idle_for: Duration,

    /// Whether the session has produced any output at all
    pub has_output: bool,

    /// Number of output chunks seen; only ever grows
    pub output_seq: u64,
}

#[derive(Debug, Default)]
pub struct ActivityTracker {
    records: Mutex<HashMap<SessionId, ActivityRecord>>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a session. Resets any previous record for the id.
    pub fn begin(&self, session_id: &SessionId) {
        self.records.lock().insert(
            session_id.clone(),
            ActivityRecord {
                last_output: Instant::now(),
                has_output: false,
                output_seq: 0,
            },
        );
    }

    /// Record an output chunk. Untracked sessions are ignored.
    pub fn touch(&self, session_id: &SessionId, len: usize) {
        if len == 0 {
            return;
        }
        if let Some(record) = self.records.lock().get_mut(session_id) {
            record.last_output = Instant::now();
            record.has_output = true;
            record.output_seq += 1;
        }
    }

    pub fn sample(&self, session_id: &SessionId) -> Option<ActivitySample> {
        let records = self.records.lock();
        let record = records.get(session_id)?;
        Some(ActivitySample {
            idle_for: record.last_output.elapsed(),
            has_output: record.has_output,
            output_seq: record.output_seq,
        })
    }

    pub fn remove(&self, session_id: &SessionId) {
        self.records.lock().remove(session_id);
    }

    pub fn tracked(&self) -> usize {
        self.records.lock().len()
    }
}
