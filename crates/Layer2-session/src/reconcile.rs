//! Reconciliation - align local bindings and task status with the backend
//!
//! ```text
//!   refresh board ─▶ list_sessions ─▶ forget bindings the backend lost
//!                                  ─▶ adopt unknown live sessions
//!                                  ─▶ running task without live session → completed
//! ```
//!
//! Holds the write side of the gate for the whole pass so idle ticks never see
//! half-corrected state. Spawns and kills do not take the gate; the pass works
//! from a registry snapshot taken before listing and leaves alone any task
//! that a spawn or kill touched since.

use crate::board::TaskBoard;
use crate::idle::ReconcileGate;
use crate::registry::SessionRegistry;
use deck_foundation::{Result, SessionBackend, SessionId, TaskId, TaskStatus};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What one pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Live backend sessions taken over
    pub adopted: Vec<TaskId>,

    /// Running tasks with no live session, moved to completed
    pub corrected: Vec<TaskId>,

    /// Local bindings whose session the backend no longer reports
    pub pruned: Vec<TaskId>,

    /// Live sessions whose task is not on the board
    pub orphaned: Vec<SessionId>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.adopted.is_empty()
            && self.corrected.is_empty()
            && self.pruned.is_empty()
            && self.orphaned.is_empty()
    }
}

pub struct Reconciler {
    backend: Arc<dyn SessionBackend>,
    board: Arc<TaskBoard>,
    registry: SessionRegistry,
    gate: ReconcileGate,
}

impl Reconciler {
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        registry: SessionRegistry,
        gate: ReconcileGate,
    ) -> Self {
        Self {
            backend,
            board: registry.board(),
            registry,
            gate,
        }
    }

    /// Run one pass. Fails only if the board or the session list cannot be read,
    /// in which case no binding or status is touched.
    pub async fn run(&self) -> Result<ReconcileReport> {
        let _guard = self.gate.write().await;
        let mut report = ReconcileReport::default();

        self.board.refresh().await?;
        let before = self.registry.snapshot();
        let sessions = self.backend.list_sessions().await?;

        let live: HashMap<TaskId, _> = sessions
            .iter()
            .filter(|info| info.is_live())
            .map(|info| (info.task_id, info))
            .collect();
        let live_sessions: HashSet<SessionId> = live
            .values()
            .map(|info| info.session_id.clone())
            .collect();

        debug!(reported = sessions.len(), live = live.len(), "Reconciling sessions");

        // Prune: only bindings the listing could have seen
        for (task_id, session_id) in before.bindings() {
            if !live_sessions.contains(&session_id)
                && self.registry.forget(task_id, &session_id, &before)
            {
                report.pruned.push(task_id);
            }
        }

        // Adopt
        for info in live.values() {
            let Some(task) = self.board.get(info.task_id).await else {
                warn!(task_id = %info.task_id, session_id = %info.session_id, "Live session for a task not on the board");
                report.orphaned.push(info.session_id.clone());
                continue;
            };
            if self.registry.adopt(info, task.initial_prompt(), &before) {
                report.adopted.push(info.task_id);
            }
        }

        // Correct
        for task_id in self.board.running_tasks().await {
            if live.contains_key(&task_id)
                || self.registry.session_for(task_id).is_some()
                || self.registry.changed_since(task_id, &before)
            {
                continue;
            }
            match self.board.set_status(task_id, TaskStatus::Completed).await {
                Ok(_) => report.corrected.push(task_id),
                Err(e) if e.is_benign() => {
                    debug!(task_id = %task_id, "Task gone during reconciliation");
                }
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "Status correction failed");
                }
            }
        }

        report.adopted.sort();
        report.pruned.sort();
        report.corrected.sort();
        report.orphaned.sort();

        info!(
            adopted = report.adopted.len(),
            corrected = report.corrected.len(),
            pruned = report.pruned.len(),
            orphaned = report.orphaned.len(),
            "Reconciliation finished"
        );
        Ok(report)
    }
}
