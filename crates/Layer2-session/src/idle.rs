//! Idle Detector - derives running/completed from output activity
//!
//! Polled on a fixed interval, never driven by individual events.
//!
//! - `running`, has produced output, quiet for the threshold → `completed`
//! - `completed`, new output since completion was observed → `running`
//!
//! Tasks without a bound session are never evaluated. Ticks are skipped while
//! reconciliation holds the gate.

use crate::activity::ActivitySample;
use crate::board::TaskBoard;
use crate::registry::SessionRegistry;
use deck_foundation::{SessionId, SessionSettings, TaskId, TaskStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

/// Shared between reconciliation (write) and idle ticks (read)
pub type ReconcileGate = Arc<RwLock<()>>;

#[derive(Debug, Clone)]
pub struct IdleConfig {
    pub threshold: Duration,
    pub poll_interval: Duration,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            threshold: Duration::from_millis(8_000),
            poll_interval: Duration::from_millis(1_000),
        }
    }
}

impl From<&SessionSettings> for IdleConfig {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            threshold: settings.idle_threshold(),
            poll_interval: settings.idle_poll_interval(),
        }
    }
}

/// Decide the next status for one session.
///
/// `completed_at_seq` is the output count recorded when the task was first seen
/// completed with this session; None means it has not been recorded yet.
pub fn evaluate(
    status: TaskStatus,
    sample: &ActivitySample,
    completed_at_seq: Option<u64>,
    threshold: Duration,
) -> Option<TaskStatus> {
    match status {
        TaskStatus::Running if sample.has_output && sample.idle_for >= threshold => {
            Some(TaskStatus::Completed)
        }
        TaskStatus::Completed => match completed_at_seq {
            Some(seq) if sample.output_seq > seq => Some(TaskStatus::Running),
            _ => None,
        },
        _ => None,
    }
}

/// What a tick changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdleTick {
    pub completed: Vec<TaskId>,
    pub resumed: Vec<TaskId>,
    pub skipped: bool,
}

pub struct IdleDetector {
    registry: SessionRegistry,
    board: Arc<TaskBoard>,
    gate: ReconcileGate,
    config: IdleConfig,
    /// task → (session, output count when completion was observed)
    marks: Mutex<HashMap<TaskId, (SessionId, u64)>>,
}

impl IdleDetector {
    pub fn new(registry: SessionRegistry, gate: ReconcileGate, config: IdleConfig) -> Self {
        Self {
            board: registry.board(),
            registry,
            gate,
            config,
            marks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &IdleConfig {
        &self.config
    }

    /// One poll over every bound session
    pub async fn tick(&self) -> IdleTick {
        let mut outcome = IdleTick::default();

        let Ok(_guard) = self.gate.try_read() else {
            trace!("Reconciliation in progress, skipping idle tick");
            outcome.skipped = true;
            return outcome;
        };

        let bindings = self.registry.live_bindings();
        self.prune_marks(&bindings);

        let activity = self.registry.activity();
        for (task_id, session_id) in bindings {
            let Some(sample) = activity.sample(&session_id) else {
                continue;
            };
            let Some(status) = self.board.status(task_id).await else {
                continue;
            };

            let mark = self.mark_for(task_id, &session_id);
            let Some(next) = evaluate(status, &sample, mark, self.config.threshold) else {
                if status == TaskStatus::Completed && mark.is_none() {
                    self.marks
                        .lock()
                        .insert(task_id, (session_id.clone(), sample.output_seq));
                }
                continue;
            };

            // The binding may have changed while the board was read
            if !self.registry.is_bound_to(task_id, &session_id) {
                continue;
            }

            match self.board.set_status(task_id, next).await {
                Ok(_) => {
                    debug!(task_id = %task_id, session_id = %session_id, from = %status, to = %next, idle_ms = sample.idle_for.as_millis() as u64, "Idle transition");
                    if next == TaskStatus::Completed {
                        self.marks
                            .lock()
                            .insert(task_id, (session_id, sample.output_seq));
                        outcome.completed.push(task_id);
                    } else {
                        self.marks.lock().remove(&task_id);
                        outcome.resumed.push(task_id);
                    }
                }
                Err(e) if e.is_benign() => {
                    debug!(task_id = %task_id, "Task gone during idle transition");
                }
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "Idle transition failed");
                }
            }
        }

        outcome
    }

    /// Run `tick` on the configured interval until the handle is aborted
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                self.tick().await;
            }
        })
    }

    fn mark_for(&self, task_id: TaskId, session_id: &SessionId) -> Option<u64> {
        self.marks
            .lock()
            .get(&task_id)
            .filter(|(marked, _)| marked == session_id)
            .map(|(_, seq)| *seq)
    }

    fn prune_marks(&self, bindings: &[(TaskId, SessionId)]) {
        self.marks.lock().retain(|task_id, (session_id, _)| {
            bindings
                .iter()
                .any(|(bound_task, bound_session)| bound_task == task_id && bound_session == session_id)
        });
    }
}
