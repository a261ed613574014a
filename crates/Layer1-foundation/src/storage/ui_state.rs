//! UI state - where the board was left

use super::JsonStore;
use crate::core::{ProjectId, Task, TaskId};
use crate::Result;
use serde::{Deserialize, Serialize};

pub const UI_STATE_FILE: &str = "ui-state.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    #[serde(default)]
    pub last_task_id: Option<TaskId>,

    #[serde(default)]
    pub last_project_id: Option<ProjectId>,
}

impl UiState {
    /// Unreadable state is treated as empty
    pub fn load(store: &JsonStore) -> Self {
        store.load_or_default(UI_STATE_FILE)
    }

    pub fn save(&self, store: &JsonStore) -> Result<()> {
        store.save(UI_STATE_FILE, self)
    }

    pub fn select(&mut self, task: &Task) {
        self.last_task_id = Some(task.id);
        self.last_project_id = Some(task.project_id);
    }

    /// Task to reopen: the last one if still listed, else the newest task of the
    /// last project
    pub fn resume_target(&self, tasks: &[Task]) -> Option<TaskId> {
        let visible = || tasks.iter().filter(|t| !t.status.is_archived());

        if let Some(last) = self.last_task_id {
            if visible().any(|t| t.id == last) {
                return Some(last);
            }
        }

        let project = self.last_project_id?;
        visible()
            .filter(|t| t.project_id == project)
            .max_by_key(|t| (t.created_at, t.id))
            .map(|t| t.id)
    }
}
