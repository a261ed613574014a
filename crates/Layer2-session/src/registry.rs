//! Session Registry - the task → session bindings
//!
//! Owns the rule that a task has at most one live session. Every binding holds
//! the subscription it was created with, so dropping a binding and dropping
//! its listeners happen together.
//!
//! Races only happen across awaits. Two guards cover them:
//! - a per-task epoch, bumped by every kill/spawn; a spawn whose epoch moved
//!   while the backend call was in flight discards its session
//! - local state is cleared before the backend kill is awaited, so a late exit
//!   event finds nothing to clean up and applies no status change

use crate::activity::ActivityTracker;
use crate::board::TaskBoard;
use crate::terminal::{Key, SurfaceId, TerminalCache, Viewport};
use deck_foundation::{
    DeckConfig, Error, EventBridge, ExitPolicy, ModelConfig, Result, SessionBackend, SessionId,
    SessionInfo, SpawnError, SpawnRequest, Subscription, Task, TaskId, TaskStatus, TermSize,
};
use futures::future;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

// ============================================================================
// Launch parameters
// ============================================================================

/// What a session was started with; reused by restart and model switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub working_dir: PathBuf,
    pub prompt: Option<String>,
    pub model: ModelConfig,
}

/// Per-call spawn overrides. Unset fields fall back to the task and config.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    pub working_dir: Option<PathBuf>,
    pub prompt: Option<String>,
    pub model: Option<ModelConfig>,
    pub size: Option<TermSize>,
}

impl SpawnOptions {
    /// Prompt taken from the task description
    pub fn for_task(task: &Task) -> Self {
        Self {
            prompt: task.initial_prompt(),
            ..Default::default()
        }
    }

    pub fn from_launch(launch: LaunchSpec) -> Self {
        Self {
            working_dir: Some(launch.working_dir),
            prompt: launch.prompt,
            model: Some(launch.model),
            size: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_size(mut self, size: TermSize) -> Self {
        self.size = Some(size);
        self
    }
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Status applied when a session ends on its own
    pub exit_policy: ExitPolicy,

    pub default_model: ModelConfig,

    /// PTY size requested at spawn
    pub default_size: TermSize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            exit_policy: ExitPolicy::default(),
            default_model: ModelConfig::default(),
            default_size: TermSize::default(),
        }
    }
}

impl RegistryConfig {
    pub fn from_config(config: &DeckConfig) -> Self {
        Self {
            exit_policy: config.session.exit_policy,
            default_model: config
                .default_model
                .as_deref()
                .map(ModelConfig::for_model_id)
                .unwrap_or_default(),
            default_size: TermSize::new(config.terminal.rows, config.terminal.cols),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

struct RegistryEntry {
    session_id: SessionId,
    launch: LaunchSpec,
    subscription: Subscription,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<TaskId, RegistryEntry>,
    epochs: HashMap<TaskId, u64>,
    /// Spawns between entry and return, per task
    spawning: HashMap<TaskId, usize>,
}

impl RegistryState {
    fn epoch(&self, task_id: TaskId) -> u64 {
        self.epochs.get(&task_id).copied().unwrap_or(0)
    }

    /// Spawned, killed, or mid-spawn since `since` was taken
    fn changed_since(&self, task_id: TaskId, since: &RegistrySnapshot) -> bool {
        self.spawning.contains_key(&task_id) || self.epoch(task_id) != since.epoch(task_id)
    }
}

/// Bindings and epochs at one instant.
///
/// Reconciliation compares against a snapshot taken before it lists backend
/// sessions, so spawns and kills that race the listing are left alone.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    bindings: HashMap<TaskId, SessionId>,
    epochs: HashMap<TaskId, u64>,
}

impl RegistrySnapshot {
    pub fn binding(&self, task_id: TaskId) -> Option<&SessionId> {
        self.bindings.get(&task_id)
    }

    /// Bindings at snapshot time, ordered by task id
    pub fn bindings(&self) -> Vec<(TaskId, SessionId)> {
        let mut bindings: Vec<(TaskId, SessionId)> = self
            .bindings
            .iter()
            .map(|(task_id, session_id)| (*task_id, session_id.clone()))
            .collect();
        bindings.sort_by_key(|(task_id, _)| *task_id);
        bindings
    }

    fn epoch(&self, task_id: TaskId) -> u64 {
        self.epochs.get(&task_id).copied().unwrap_or(0)
    }
}

/// Marks a task as mid-spawn until dropped
struct SpawnMark<'a> {
    state: &'a Mutex<RegistryState>,
    task_id: TaskId,
}

impl<'a> SpawnMark<'a> {
    fn new(state: &'a Mutex<RegistryState>, task_id: TaskId) -> Self {
        *state.lock().spawning.entry(task_id).or_insert(0) += 1;
        Self { state, task_id }
    }
}

impl Drop for SpawnMark<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if let Some(count) = state.spawning.get_mut(&self.task_id) {
            *count -= 1;
            if *count == 0 {
                state.spawning.remove(&self.task_id);
            }
        }
    }
}

struct RegistryInner {
    backend: Arc<dyn SessionBackend>,
    board: Arc<TaskBoard>,
    bridge: Arc<EventBridge>,
    terminals: Arc<TerminalCache>,
    activity: Arc<ActivityTracker>,
    config: RegistryConfig,
    state: Mutex<RegistryState>,
}

/// Session Registry - spawn, kill, restart and exit handling
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        board: Arc<TaskBoard>,
        bridge: Arc<EventBridge>,
        terminals: Arc<TerminalCache>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                backend,
                board,
                bridge,
                terminals,
                activity: Arc::new(ActivityTracker::new()),
                config,
                state: Mutex::new(RegistryState::default()),
            }),
        }
    }

    pub fn activity(&self) -> Arc<ActivityTracker> {
        Arc::clone(&self.inner.activity)
    }

    pub fn terminals(&self) -> Arc<TerminalCache> {
        Arc::clone(&self.inner.terminals)
    }

    pub fn board(&self) -> Arc<TaskBoard> {
        Arc::clone(&self.inner.board)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    // ========================================================================
    // Spawn
    // ========================================================================

    /// Start a session for `task`, replacing any session it already has.
    ///
    /// On success the binding, its listeners and its terminal surface exist
    /// before this returns, and the task is moved to `running` if it was not
    /// already (a failed status write is only logged).
    pub async fn spawn(&self, task: &Task, options: SpawnOptions) -> Result<SessionId> {
        let task_id = task.id;
        let working_dir = self.resolve_working_dir(task, &options).await?;
        let launch = LaunchSpec {
            working_dir,
            prompt: options.prompt,
            model: options
                .model
                .unwrap_or_else(|| self.inner.config.default_model.clone()),
        };

        let _mark = SpawnMark::new(&self.inner.state, task_id);
        self.kill(task_id).await;
        let epoch = self.bump_epoch(task_id);

        let request = SpawnRequest {
            task_id,
            project_id: task.project_id,
            working_dir: launch.working_dir.clone(),
            initial_prompt: launch.prompt.clone(),
            cli_command: launch.model.cli_command.clone(),
            model: Some(launch.model.model.clone()),
            size: options.size.unwrap_or(self.inner.config.default_size),
        };

        info!(
            task_id = %task_id,
            cli = %request.cli_command,
            model = %launch.model.model,
            working_dir = %request.working_dir.display(),
            "Spawning session"
        );

        let session_id = self
            .inner
            .backend
            .spawn_session(request)
            .await
            .map_err(into_spawn_error)?;

        if self.current_epoch(task_id) != epoch {
            warn!(task_id = %task_id, session_id = %session_id, "Spawn superseded, killing orphaned session");
            if let Err(e) = self.inner.backend.kill_session(&session_id).await {
                warn!(session_id = %session_id, error = %e, "Failed to kill orphaned session");
            }
            return Err(Error::Superseded { task_id });
        }

        if let Some(displaced) = self.bind(task_id, &session_id, launch) {
            warn!(task_id = %task_id, session_id = %displaced.session_id, "Replacing a session adopted during spawn");
            self.teardown(&displaced);
            if let Err(e) = self.inner.backend.kill_session(&displaced.session_id).await {
                warn!(session_id = %displaced.session_id, error = %e, "Failed to kill displaced session");
            }
        }
        info!(task_id = %task_id, session_id = %session_id, "Session bound");

        self.inner.terminals.ensure_stream_started(&session_id).await;

        if self.is_bound_to(task_id, &session_id) {
            let status = self
                .inner
                .board
                .status(task_id)
                .await
                .unwrap_or(task.status);
            // An exit during the read has already written its own status
            if status != TaskStatus::Running && self.is_bound_to(task_id, &session_id) {
                if let Err(e) = self
                    .inner
                    .board
                    .set_status(task_id, TaskStatus::Running)
                    .await
                {
                    warn!(task_id = %task_id, error = %e, "Session is live but status update failed");
                }
            }
        }

        Ok(session_id)
    }

    async fn resolve_working_dir(&self, task: &Task, options: &SpawnOptions) -> Result<PathBuf> {
        let candidate = match (&options.working_dir, &task.worktree_path) {
            (Some(dir), _) => Some(dir.clone()),
            (None, Some(dir)) => Some(dir.clone()),
            (None, None) => self
                .inner
                .board
                .project(task.project_id)
                .await?
                .map(|project| project.path),
        };

        match candidate {
            Some(dir) if !dir.as_os_str().is_empty() => Ok(dir),
            _ => Err(SpawnError::NoWorkingDirectory { task_id: task.id }.into()),
        }
    }

    /// Wire a session to a task. Returns the binding it replaced, if that
    /// binding was for a different session.
    fn bind(
        &self,
        task_id: TaskId,
        session_id: &SessionId,
        launch: LaunchSpec,
    ) -> Option<RegistryEntry> {
        let subscription = self.prepare(task_id, session_id);
        let displaced = self.inner.state.lock().entries.insert(
            task_id,
            RegistryEntry {
                session_id: session_id.clone(),
                launch,
                subscription,
            },
        );

        displaced.filter(|old| old.session_id != *session_id)
    }

    /// Activity clock, terminal surface and bridge listeners for a session
    /// about to be bound
    fn prepare(&self, task_id: TaskId, session_id: &SessionId) -> Subscription {
        self.inner.activity.begin(session_id);
        // Terminal listener first: on exit it prints the notice before teardown
        self.inner.terminals.open(session_id);
        self.subscribe(task_id, session_id)
    }

    fn subscribe(&self, task_id: TaskId, session_id: &SessionId) -> Subscription {
        let activity = Arc::clone(&self.inner.activity);
        let output_session = session_id.clone();
        let exit_session = session_id.clone();
        let registry = Arc::downgrade(&self.inner);

        self.inner.bridge.subscribe(
            session_id,
            "registry",
            move |bytes| {
                activity.touch(&output_session, bytes.len());
                future::ready(())
            },
            move || {
                let registry = registry.upgrade().map(|inner| SessionRegistry { inner });
                let session_id = exit_session.clone();
                async move {
                    if let Some(registry) = registry {
                        registry.handle_exit(task_id, &session_id).await;
                    }
                }
            },
        )
    }

    // ========================================================================
    // Kill / Restart / Archive
    // ========================================================================

    /// Kill the task's session. Returns false if none was bound.
    ///
    /// Local cleanup always completes; a failed backend kill is logged.
    pub async fn kill(&self, task_id: TaskId) -> bool {
        self.bump_epoch(task_id);

        let entry = self.inner.state.lock().entries.remove(&task_id);
        let Some(entry) = entry else {
            debug!(task_id = %task_id, "No session to kill");
            return false;
        };

        info!(task_id = %task_id, session_id = %entry.session_id, "Killing session");
        self.teardown(&entry);

        if let Err(e) = self.inner.backend.kill_session(&entry.session_id).await {
            warn!(task_id = %task_id, session_id = %entry.session_id, error = %e, "Backend kill failed");
        }
        true
    }

    /// Kill and respawn with the same working directory and prompt
    pub async fn restart(&self, task_id: TaskId) -> Result<SessionId> {
        let task = self.task(task_id).await?;
        let options = match self.launch_spec(task_id) {
            Some(launch) => SpawnOptions::from_launch(launch),
            None => SpawnOptions::for_task(&task),
        };
        info!(task_id = %task_id, "Restarting session");
        self.spawn(&task, options).await
    }

    /// Respawn with a different model, keeping directory and prompt
    pub async fn switch_model(&self, task_id: TaskId, model: ModelConfig) -> Result<SessionId> {
        let task = self.task(task_id).await?;
        info!(task_id = %task_id, cli = %model.cli_command, model = %model.model, "Switching model");
        let options = match self.launch_spec(task_id) {
            Some(launch) => SpawnOptions::from_launch(launch),
            None => SpawnOptions::for_task(&task),
        }
        .with_model(model);
        self.spawn(&task, options).await
    }

    /// Kill the session, then archive the task. A task that is already gone
    /// is not an error.
    pub async fn archive(&self, task_id: TaskId) -> Result<()> {
        self.kill(task_id).await;
        match self
            .inner
            .board
            .set_status(task_id, TaskStatus::Archived)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_benign() => {
                debug!(task_id = %task_id, "Task already gone while archiving");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Kill every bound session
    pub async fn shutdown(&self) {
        let tasks: Vec<TaskId> = self.inner.state.lock().entries.keys().copied().collect();
        info!(count = tasks.len(), "Shutting down sessions");
        for task_id in tasks {
            self.kill(task_id).await;
        }
    }

    // ========================================================================
    // Exit / Adopt
    // ========================================================================

    /// Natural exit of `session_id`. Only the call that removes the binding
    /// applies the exit policy; repeats and stale sessions are ignored.
    pub async fn handle_exit(&self, task_id: TaskId, session_id: &SessionId) -> bool {
        let entry = {
            let mut state = self.inner.state.lock();
            let current = state
                .entries
                .get(&task_id)
                .is_some_and(|entry| entry.session_id == *session_id);
            if current {
                state.entries.remove(&task_id)
            } else {
                None
            }
        };
        let Some(entry) = entry else {
            debug!(task_id = %task_id, session_id = %session_id, "Exit for a session that is no longer bound");
            return false;
        };

        self.teardown(&entry);
        drop(entry);

        let status = match self.inner.config.exit_policy {
            ExitPolicy::Complete => TaskStatus::Completed,
            ExitPolicy::Archive => TaskStatus::Archived,
        };
        info!(task_id = %task_id, session_id = %session_id, status = %status, "Session exited");

        match self.inner.board.set_status(task_id, status).await {
            Ok(_) => {}
            Err(e) if e.is_benign() => {
                debug!(task_id = %task_id, "Task gone before exit status applied");
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Exit status update failed");
            }
        }
        true
    }

    /// Take over a live session found on the backend. Its stream is already
    /// running, so it is marked started rather than started again.
    ///
    /// Refused if the task was spawned or killed after `since`, or is being
    /// spawned now.
    pub fn adopt(
        &self,
        info: &SessionInfo,
        prompt: Option<String>,
        since: &RegistrySnapshot,
    ) -> bool {
        match self.session_for(info.task_id) {
            Some(bound) if bound == info.session_id => return false,
            Some(bound) => {
                warn!(
                    task_id = %info.task_id,
                    bound = %bound,
                    reported = %info.session_id,
                    "Task already bound to another session, not adopting"
                );
                return false;
            }
            None => {}
        }
        if self.changed_since(info.task_id, since) {
            debug!(task_id = %info.task_id, session_id = %info.session_id, "Task changed during refresh, not adopting");
            return false;
        }

        let entry = RegistryEntry {
            session_id: info.session_id.clone(),
            launch: LaunchSpec {
                working_dir: info.working_dir.clone(),
                prompt,
                model: self.inner.config.default_model.clone(),
            },
            subscription: self.prepare(info.task_id, &info.session_id),
        };
        let rejected = {
            let mut state = self.inner.state.lock();
            if state.entries.contains_key(&info.task_id)
                || state.changed_since(info.task_id, since)
            {
                Some(entry)
            } else {
                state.entries.insert(info.task_id, entry);
                None
            }
        };
        if let Some(entry) = rejected {
            debug!(task_id = %info.task_id, session_id = %info.session_id, "Task bound during adopt, backing out");
            self.teardown(&entry);
            return false;
        }
        self.inner.terminals.mark_stream_started(&info.session_id);

        info!(task_id = %info.task_id, session_id = %info.session_id, pid = ?info.pid, "Adopted live session");
        true
    }

    /// Drop a binding whose session the backend no longer reports. The
    /// backend process is not touched.
    ///
    /// Only a binding that is unchanged since `since` is dropped.
    pub fn forget(
        &self,
        task_id: TaskId,
        session_id: &SessionId,
        since: &RegistrySnapshot,
    ) -> bool {
        let entry = {
            let mut state = self.inner.state.lock();
            let current = state
                .entries
                .get(&task_id)
                .is_some_and(|entry| entry.session_id == *session_id)
                && !state.changed_since(task_id, since);
            if current {
                state.entries.remove(&task_id)
            } else {
                None
            }
        };
        match entry {
            Some(entry) => {
                info!(task_id = %task_id, session_id = %session_id, "Forgetting vanished session");
                self.teardown(&entry);
                true
            }
            None => false,
        }
    }

    fn teardown(&self, entry: &RegistryEntry) {
        entry.subscription.unsubscribe();
        self.inner.terminals.destroy(&entry.session_id);
        self.inner.activity.remove(&entry.session_id);
    }

    // ========================================================================
    // Terminal
    // ========================================================================

    /// Show the task's session in the viewport
    pub async fn attach(&self, task_id: TaskId, viewport: &Viewport) -> Result<SurfaceId> {
        let session_id = self.require_session(task_id)?;
        Ok(self.inner.terminals.attach(&session_id, viewport).await)
    }

    pub fn detach(&self, viewport: &Viewport) -> Option<SessionId> {
        self.inner.terminals.detach(viewport)
    }

    pub fn write_input(&self, task_id: TaskId, bytes: impl Into<Vec<u8>>) -> Result<()> {
        let session_id = self.require_session(task_id)?;
        self.inner.terminals.write(&session_id, bytes);
        Ok(())
    }

    pub fn send_key(&self, task_id: TaskId, key: Key) -> Result<()> {
        let session_id = self.require_session(task_id)?;
        self.inner.terminals.send_key(&session_id, key);
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn session_for(&self, task_id: TaskId) -> Option<SessionId> {
        self.inner
            .state
            .lock()
            .entries
            .get(&task_id)
            .map(|entry| entry.session_id.clone())
    }

    pub fn task_for(&self, session_id: &SessionId) -> Option<TaskId> {
        self.inner
            .state
            .lock()
            .entries
            .iter()
            .find(|(_, entry)| entry.session_id == *session_id)
            .map(|(task_id, _)| *task_id)
    }

    pub fn is_bound_to(&self, task_id: TaskId, session_id: &SessionId) -> bool {
        self.session_for(task_id).as_ref() == Some(session_id)
    }

    pub fn launch_spec(&self, task_id: TaskId) -> Option<LaunchSpec> {
        self.inner
            .state
            .lock()
            .entries
            .get(&task_id)
            .map(|entry| entry.launch.clone())
    }

    /// Current bindings, ordered by task id
    pub fn live_bindings(&self) -> Vec<(TaskId, SessionId)> {
        let mut bindings: Vec<(TaskId, SessionId)> = self
            .inner
            .state
            .lock()
            .entries
            .iter()
            .map(|(task_id, entry)| (*task_id, entry.session_id.clone()))
            .collect();
        bindings.sort_by_key(|(task_id, _)| *task_id);
        bindings
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.inner.state.lock();
        RegistrySnapshot {
            bindings: state
                .entries
                .iter()
                .map(|(task_id, entry)| (*task_id, entry.session_id.clone()))
                .collect(),
            epochs: state.epochs.clone(),
        }
    }

    /// Whether the task was spawned or killed after `since`, or is mid-spawn
    pub fn changed_since(&self, task_id: TaskId, since: &RegistrySnapshot) -> bool {
        self.inner.state.lock().changed_since(task_id, since)
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn require_session(&self, task_id: TaskId) -> Result<SessionId> {
        self.session_for(task_id)
            .ok_or_else(|| Error::NotFound(format!("no live session for task {}", task_id)))
    }

    async fn task(&self, task_id: TaskId) -> Result<Task> {
        self.inner
            .board
            .get(task_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("task {}", task_id)))
    }

    fn bump_epoch(&self, task_id: TaskId) -> u64 {
        let mut state = self.inner.state.lock();
        let epoch = state.epochs.entry(task_id).or_insert(0);
        *epoch += 1;
        *epoch
    }

    fn current_epoch(&self, task_id: TaskId) -> u64 {
        self.inner.state.lock().epoch(task_id)
    }
}

/// Backend spawn failures surface as `SpawnError::Rejected` with the backend's
/// own message
fn into_spawn_error(error: Error) -> Error {
    match error {
        Error::Spawn(_) => error,
        Error::Backend { message, .. } => Error::Spawn(SpawnError::Rejected(message)),
        other => Error::Spawn(SpawnError::Rejected(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_message_passes_through() {
        let err = into_spawn_error(Error::backend("spawn_session", "claude: command not found"));
        match err {
            Error::Spawn(SpawnError::Rejected(message)) => {
                assert_eq!(message, "claude: command not found")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_registry_config_from_deck_config() {
        let config = DeckConfig::new()
            .default_model("gpt-5.1-codex-mini")
            .exit_policy(ExitPolicy::Archive);
        let registry_config = RegistryConfig::from_config(&config);

        assert_eq!(registry_config.exit_policy, ExitPolicy::Archive);
        assert_eq!(registry_config.default_model.cli_command, "codex");
    }

    #[test]
    fn test_options_from_launch_keep_prompt_and_dir() {
        let launch = LaunchSpec {
            working_dir: PathBuf::from("/repo"),
            prompt: Some("fix it".into()),
            model: ModelConfig::default(),
        };
        let options = SpawnOptions::from_launch(launch.clone())
            .with_model(ModelConfig::for_model_id("claude-haiku-4-5"));

        assert_eq!(options.working_dir, Some(launch.working_dir));
        assert_eq!(options.prompt.as_deref(), Some("fix it"));
        assert_eq!(options.model.unwrap().model, "claude-haiku-4-5");
    }
}
