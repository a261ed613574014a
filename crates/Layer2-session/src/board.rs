//! Task Board - local, eventually-consistent view of task status
//!
//! Every status change goes through [`TaskBoard::set_status`], which writes to
//! the store first and then updates the cache and notifies subscribers.

use chrono::{DateTime, Utc};
use deck_foundation::{Error, Project, ProjectId, Result, Task, TaskId, TaskStatus, TaskStore};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

/// Broadcast after every persisted status change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub at: DateTime<Utc>,
}

pub struct TaskBoard {
    store: Arc<dyn TaskStore>,
    tasks: RwLock<HashMap<TaskId, Task>>,
    events: broadcast::Sender<StatusChange>,
}

impl TaskBoard {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            store,
            tasks: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Reload every non-archived task from the store
    pub async fn refresh(&self) -> Result<Vec<Task>> {
        let loaded = self.store.list_tasks().await?;
        let mut tasks = self.tasks.write().await;
        tasks.clear();
        for task in loaded.iter().filter(|t| !t.status.is_archived()) {
            tasks.insert(task.id, task.clone());
        }
        debug!(count = tasks.len(), "Task board refreshed");
        Ok(loaded)
    }

    pub async fn get(&self, task_id: TaskId) -> Option<Task> {
        self.tasks.read().await.get(&task_id).cloned()
    }

    pub async fn status(&self, task_id: TaskId) -> Option<TaskStatus> {
        self.tasks.read().await.get(&task_id).map(|t| t.status)
    }

    /// Newest first
    pub async fn tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        tasks
    }

    pub async fn running_tasks(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.status == TaskStatus::Running)
            .map(|t| t.id)
            .collect();
        ids.sort();
        ids
    }

    /// Persist a status change.
    ///
    /// A task the store no longer knows is dropped from the board and reported
    /// as [`Error::StaleReference`].
    pub async fn set_status(&self, task_id: TaskId, status: TaskStatus) -> Result<Task> {
        let task = match self.store.update_task_status(task_id, status).await {
            Ok(task) => task,
            Err(Error::NotFound(_)) | Err(Error::StaleReference(_)) => {
                self.tasks.write().await.remove(&task_id);
                return Err(Error::StaleReference(format!("task {}", task_id)));
            }
            Err(e) => return Err(e),
        };

        {
            let mut tasks = self.tasks.write().await;
            if task.status.is_archived() {
                tasks.remove(&task_id);
            } else {
                tasks.insert(task_id, task.clone());
            }
        }

        info!(task_id = %task_id, status = %status, "Task status changed");
        // No receivers is fine
        let _ = self.events.send(StatusChange {
            task_id,
            status,
            at: Utc::now(),
        });

        Ok(task)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.events.subscribe()
    }

    pub async fn project(&self, project_id: ProjectId) -> Result<Option<Project>> {
        self.store.project(project_id).await
    }
}
