//! Shared test harness: an in-memory backend + task store

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use deck_foundation::{
    DeckConfig, Error, EventBridge, Project, ProjectId, Result, SessionBackend, SessionId,
    SessionInfo, SessionState, SpawnRequest, Task, TaskId, TaskStatus, TaskStore,
};
use deck_session::SessionHub;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Spawn(SpawnRequest),
    Kill(SessionId),
    Write(SessionId, Vec<u8>),
    Resize(SessionId, u16, u16),
    StartStream(SessionId),
    List,
}

/// Backend and task store in one, pushing events into a real EventBridge
pub struct MockBackend {
    bridge: Arc<EventBridge>,
    next_session: AtomicU64,

    tasks: Mutex<HashMap<TaskId, Task>>,
    projects: Mutex<HashMap<ProjectId, Project>>,
    sessions: Mutex<HashMap<SessionId, SessionInfo>>,

    calls: Mutex<Vec<Call>>,
    status_history: Mutex<Vec<(TaskId, TaskStatus)>>,

    pub fail_kill: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_list: AtomicBool,
    fail_spawn: Mutex<Option<String>>,
    /// The process dies while its output stream is being started
    pub exit_on_stream_start: AtomicBool,

    spawn_gate: Mutex<Option<Arc<Semaphore>>>,
    pub spawn_entered: Notify,
    list_gate: Mutex<Option<Arc<Semaphore>>>,
    pub list_entered: Notify,
}

impl MockBackend {
    pub fn new(bridge: Arc<EventBridge>) -> Arc<Self> {
        Arc::new(Self {
            bridge,
            next_session: AtomicU64::new(1),
            tasks: Mutex::new(HashMap::new()),
            projects: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            status_history: Mutex::new(Vec::new()),
            fail_kill: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            fail_list: AtomicBool::new(false),
            fail_spawn: Mutex::new(None),
            exit_on_stream_start: AtomicBool::new(false),
            spawn_gate: Mutex::new(None),
            spawn_entered: Notify::new(),
            list_gate: Mutex::new(None),
            list_entered: Notify::new(),
        })
    }

    // ------------------------------------------------------------------
    // Fixtures
    // ------------------------------------------------------------------

    pub fn add_project(&self, id: i64, path: &str) {
        self.projects.lock().insert(
            ProjectId(id),
            Project {
                id: ProjectId(id),
                name: format!("project {}", id),
                path: PathBuf::from(path),
                created_at: Utc::now(),
            },
        );
    }

    pub fn add_task(&self, task: Task) {
        self.tasks.lock().insert(task.id, task);
    }

    pub fn delete_task(&self, task_id: TaskId) {
        self.tasks.lock().remove(&task_id);
    }

    /// A session the backend reports without this process having spawned it
    pub fn add_live_session(&self, session_id: &str, task_id: i64, state: SessionState) -> SessionId {
        let session_id = SessionId::new(session_id);
        self.sessions.lock().insert(
            session_id.clone(),
            SessionInfo {
                session_id: session_id.clone(),
                task_id: TaskId(task_id),
                project_id: ProjectId(1),
                pid: Some(4242),
                status: state,
                working_dir: PathBuf::from("/repo"),
                started_at_epoch: 1_700_000_000,
                uptime_secs: 30,
            },
        );
        session_id
    }

    /// Drop a session from `list_sessions` without emitting an exit
    pub fn lose_session(&self, session_id: &SessionId) {
        self.sessions.lock().remove(session_id);
    }

    pub fn reject_spawns(&self, message: &str) {
        *self.fail_spawn.lock() = Some(message.to_string());
    }

    /// Park every spawn until a permit is added to the returned semaphore
    pub fn hold_spawns(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.spawn_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    /// Park every listing after it has read the sessions, until a permit is
    /// added. The caller then sees a listing older than the live state.
    pub fn hold_lists(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.list_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    // ------------------------------------------------------------------
    // Driving events
    // ------------------------------------------------------------------

    pub async fn output(&self, session_id: &SessionId, bytes: &[u8]) -> usize {
        self.bridge.emit_output(session_id, bytes.to_vec()).await
    }

    /// Process ends on its own
    pub async fn exit(&self, session_id: &SessionId) -> usize {
        self.sessions.lock().remove(session_id);
        self.bridge.emit_exit(session_id).await
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn spawn_requests(&self) -> Vec<SpawnRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Spawn(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn kills(&self) -> Vec<SessionId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Kill(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn stream_starts(&self, session_id: &SessionId) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::StartStream(id) if id == session_id))
            .count()
    }

    pub fn writes(&self, session_id: &SessionId) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Write(id, bytes) if id == *session_id => Some(bytes),
                _ => None,
            })
            .collect()
    }

    pub fn resizes(&self, session_id: &SessionId) -> Vec<(u16, u16)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Resize(id, rows, cols) if id == *session_id => Some((rows, cols)),
                _ => None,
            })
            .collect()
    }

    /// Sessions as `list_sessions` would report them, without recording a call
    pub fn list_sessions_now(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self.sessions.lock().values().cloned().collect();
        sessions.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        sessions
    }

    pub fn live_session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn status_of(&self, task_id: TaskId) -> Option<TaskStatus> {
        self.tasks.lock().get(&task_id).map(|t| t.status)
    }

    /// Every persisted status write for the task, in order
    pub fn history(&self, task_id: TaskId) -> Vec<TaskStatus> {
        self.status_history
            .lock()
            .iter()
            .filter(|(id, _)| *id == task_id)
            .map(|(_, status)| *status)
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl SessionBackend for MockBackend {
    async fn spawn_session(&self, request: SpawnRequest) -> Result<SessionId> {
        self.record(Call::Spawn(request.clone()));

        let gate = self.spawn_gate.lock().clone();
        if let Some(gate) = gate {
            self.spawn_entered.notify_one();
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        if let Some(message) = self.fail_spawn.lock().clone() {
            return Err(Error::backend("spawn_session", message));
        }

        let n = self.next_session.fetch_add(1, Ordering::SeqCst);
        let session_id = SessionId::new(format!("sess-{}", n));
        self.sessions.lock().insert(
            session_id.clone(),
            SessionInfo {
                session_id: session_id.clone(),
                task_id: request.task_id,
                project_id: request.project_id,
                pid: Some(1000 + n as u32),
                status: SessionState::Running,
                working_dir: request.working_dir,
                started_at_epoch: 1_700_000_000,
                uptime_secs: 0,
            },
        );
        Ok(session_id)
    }

    async fn kill_session(&self, session_id: &SessionId) -> Result<()> {
        self.record(Call::Kill(session_id.clone()));
        if self.fail_kill.load(Ordering::SeqCst) {
            return Err(Error::backend("kill_session", "process did not respond"));
        }
        self.sessions.lock().remove(session_id);
        Ok(())
    }

    async fn write_to_session(&self, session_id: &SessionId, data: &[u8]) -> Result<()> {
        self.record(Call::Write(session_id.clone(), data.to_vec()));
        Ok(())
    }

    async fn resize_session(&self, session_id: &SessionId, rows: u16, cols: u16) -> Result<()> {
        self.record(Call::Resize(session_id.clone(), rows, cols));
        Ok(())
    }

    async fn start_session_stream(&self, session_id: &SessionId) -> Result<()> {
        self.record(Call::StartStream(session_id.clone()));
        if self.exit_on_stream_start.load(Ordering::SeqCst) {
            self.exit(session_id).await;
        }
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        self.record(Call::List);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::backend("list_sessions", "backend unavailable"));
        }
        let sessions = self.list_sessions_now();

        let gate = self.list_gate.lock().clone();
        if let Some(gate) = gate {
            self.list_entered.notify_one();
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        Ok(sessions)
    }
}

#[async_trait]
impl TaskStore for MockBackend {
    async fn list_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.tasks.lock().values().cloned().collect())
    }

    async fn update_task_status(&self, task_id: TaskId, status: TaskStatus) -> Result<Task> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(Error::backend("update_task_status", "database is locked"));
        }
        let mut tasks = self.tasks.lock();
        let task = tasks
            .get_mut(&task_id)
            .ok_or_else(|| Error::NotFound(format!("task {}", task_id)))?;
        task.status = status;
        self.status_history.lock().push((task_id, status));
        Ok(task.clone())
    }

    async fn project(&self, project_id: ProjectId) -> Result<Option<Project>> {
        Ok(self.projects.lock().get(&project_id).cloned())
    }
}

// ----------------------------------------------------------------------
// Harness
// ----------------------------------------------------------------------

pub struct Harness {
    pub backend: Arc<MockBackend>,
    pub bridge: Arc<EventBridge>,
    pub hub: SessionHub,
}

impl Harness {
    pub fn new(config: DeckConfig) -> Self {
        init_tracing();
        let bridge = Arc::new(EventBridge::new());
        let backend = MockBackend::new(Arc::clone(&bridge));
        backend.add_project(1, "/repo");
        let hub = SessionHub::new(backend.clone(), backend.clone(), Arc::clone(&bridge), config);
        Self {
            backend,
            bridge,
            hub,
        }
    }

    /// Add a task to the store and reload the board
    pub async fn task(&self, id: i64, status: TaskStatus) -> Task {
        let task = Task::new(TaskId(id), ProjectId(1), format!("task {}", id))
            .with_description(format!("do thing {}", id))
            .with_status(status);
        self.backend.add_task(task.clone());
        self.hub.board().refresh().await.unwrap();
        task
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(DeckConfig::new())
    }
}

pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
