//! Core Types - identifiers and records shared by every layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Identifiers
// ============================================================================

/// Persisted task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persisted project identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub i64);

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque backend session identifier, unique per spawn
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Task
// ============================================================================

/// Lifecycle status of a task as the UI sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Waiting,
    Running,
    Completed,
    Failed,
    Archived,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Waiting => "waiting",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Archived => "archived",
        }
    }

    /// Archived tasks are hidden from every listing except the archive view
    pub fn is_archived(&self) -> bool {
        matches!(self, TaskStatus::Archived)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "waiting" => Ok(TaskStatus::Waiting),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "archived" => Ok(TaskStatus::Archived),
            other => Err(crate::Error::InvalidInput(format!(
                "Invalid status: {}",
                other
            ))),
        }
    }
}

/// A unit of work, optionally backed by a live session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub name: String,

    /// Free-text prompt handed to the agent on spawn
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub summary: String,

    pub status: TaskStatus,

    #[serde(default)]
    pub iteration_count: u32,

    /// Dedicated git worktree, preferred over the project root when present
    pub worktree_path: Option<PathBuf>,
    pub branch_name: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: TaskId, project_id: ProjectId, name: impl Into<String>) -> Self {
        Self {
            id,
            project_id,
            name: name.into(),
            description: String::new(),
            summary: String::new(),
            status: TaskStatus::Waiting,
            iteration_count: 0,
            worktree_path: None,
            branch_name: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_worktree(mut self, path: impl Into<PathBuf>, branch: Option<String>) -> Self {
        self.worktree_path = Some(path.into());
        self.branch_name = branch;
        self
    }

    /// Prompt to pre-load into a fresh session, if any
    pub fn initial_prompt(&self) -> Option<String> {
        let trimmed = self.description.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// A project root that tasks run inside
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Session
// ============================================================================

/// Backend-side state of a session process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Running,
    Exited,
}

/// Live session record as reported by `list_sessions`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub task_id: TaskId,
    pub project_id: ProjectId,
    pub pid: Option<u32>,
    pub status: SessionState,
    pub working_dir: PathBuf,
    pub started_at_epoch: u64,
    pub uptime_secs: u64,
}

impl SessionInfo {
    pub fn is_live(&self) -> bool {
        matches!(self.status, SessionState::Running)
    }
}

/// Terminal dimensions in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSize {
    pub rows: u16,
    pub cols: u16,
}

impl TermSize {
    /// Smallest grid a terminal surface renders at
    pub const MIN: TermSize = TermSize { rows: 2, cols: 2 };

    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            rows: rows.max(1),
            cols: cols.max(1),
        }
    }

    /// False for collapsed containers, which measure 0x0 or close to it
    pub fn is_renderable(&self) -> bool {
        self.rows >= Self::MIN.rows && self.cols >= Self::MIN.cols
    }
}

impl Default for TermSize {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

/// Everything the backend needs to start an agent process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnRequest {
    pub task_id: TaskId,
    pub project_id: ProjectId,
    pub working_dir: PathBuf,
    pub initial_prompt: Option<String>,
    pub cli_command: String,
    pub model: Option<String>,
    pub size: TermSize,
}
