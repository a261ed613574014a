//! Session Hub - wires the coordinator together for the host application
//!
//! Startup order matters: reconciliation finishes before the idle detector
//! starts, so no idle tick ever evaluates an uncorrected status.

use crate::board::TaskBoard;
use crate::idle::{IdleConfig, IdleDetector, ReconcileGate};
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::registry::{RegistryConfig, SessionRegistry, SpawnOptions};
use crate::terminal::{TerminalCache, TerminalCacheConfig};
use deck_foundation::{
    DeckConfig, Error, EventBridge, JsonStore, ModelConfig, Result, SessionBackend, SessionId,
    TaskId, TaskStore, TermSize, UiState,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of [`SessionHub::startup`]
#[derive(Debug, Clone, Default)]
pub struct StartupReport {
    pub reconcile: ReconcileReport,

    /// Task the UI should reopen, if any
    pub resume: Option<TaskId>,
}

pub struct SessionHub {
    config: DeckConfig,
    bridge: Arc<EventBridge>,
    board: Arc<TaskBoard>,
    registry: SessionRegistry,
    reconciler: Reconciler,
    idle: Arc<IdleDetector>,
    idle_task: Mutex<Option<JoinHandle<()>>>,
    ui_store: Option<JsonStore>,
    ui_state: Mutex<UiState>,
}

impl SessionHub {
    /// `bridge` is the one the backend driver emits session events into
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        store: Arc<dyn TaskStore>,
        bridge: Arc<EventBridge>,
        config: DeckConfig,
    ) -> Self {
        let board = Arc::new(TaskBoard::new(store));
        let terminals = Arc::new(TerminalCache::new(
            Arc::clone(&backend),
            Arc::clone(&bridge),
            TerminalCacheConfig {
                default_size: TermSize::new(config.terminal.rows, config.terminal.cols),
                scrollback: config.terminal.scrollback,
            },
        ));
        let registry = SessionRegistry::new(
            Arc::clone(&backend),
            Arc::clone(&board),
            Arc::clone(&bridge),
            terminals,
            RegistryConfig::from_config(&config),
        );

        let gate: ReconcileGate = Arc::new(RwLock::new(()));
        let reconciler = Reconciler::new(backend, registry.clone(), Arc::clone(&gate));
        let idle = Arc::new(IdleDetector::new(
            registry.clone(),
            gate,
            IdleConfig::from(&config.session),
        ));

        Self {
            config,
            bridge,
            board,
            registry,
            reconciler,
            idle,
            idle_task: Mutex::new(None),
            ui_store: None,
            ui_state: Mutex::new(UiState::default()),
        }
    }

    /// Persist and restore the last selection in `store`
    pub fn with_ui_store(mut self, store: JsonStore) -> Self {
        self.ui_state = Mutex::new(UiState::load(&store));
        self.ui_store = Some(store);
        self
    }

    pub fn config(&self) -> &DeckConfig {
        &self.config
    }

    pub fn bridge(&self) -> Arc<EventBridge> {
        Arc::clone(&self.bridge)
    }

    pub fn board(&self) -> Arc<TaskBoard> {
        Arc::clone(&self.board)
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn idle_detector(&self) -> Arc<IdleDetector> {
        Arc::clone(&self.idle)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Reconcile, then start idle detection and pick the task to resume
    pub async fn startup(&self) -> Result<StartupReport> {
        let reconcile = self.reconciler.run().await?;
        self.start_idle_detector();

        let tasks = self.board.tasks().await;
        let resume = self.ui_state.lock().resume_target(&tasks);

        info!(tasks = tasks.len(), live = self.registry.len(), resume = ?resume, "Session hub started");
        Ok(StartupReport { reconcile, resume })
    }

    /// Manual data refresh
    pub async fn refresh(&self) -> Result<ReconcileReport> {
        self.reconciler.run().await
    }

    pub fn start_idle_detector(&self) {
        let mut slot = self.idle_task.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        debug!(interval_ms = self.idle.config().poll_interval.as_millis() as u64, "Starting idle detector");
        *slot = Some(Arc::clone(&self.idle).spawn());
    }

    /// Stop idle detection and kill every session
    pub async fn shutdown(&self) {
        let handle = self.idle_task.lock().take();
        if let Some(handle) = handle {
            handle.abort();
        }
        self.registry.shutdown().await;
        info!("Session hub stopped");
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    /// Spawn a session for a task on the board, optionally with a model
    pub async fn spawn_task(&self, task_id: TaskId, model: Option<ModelConfig>) -> Result<SessionId> {
        let task = self
            .board
            .get(task_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("task {}", task_id)))?;

        let mut options = SpawnOptions::for_task(&task);
        if let Some(model) = model {
            options = options.with_model(model);
        }
        self.registry.spawn(&task, options).await
    }

    /// Remember the selection for the next startup. Failing to persist it is
    /// only logged.
    pub async fn select_task(&self, task_id: TaskId) -> Result<()> {
        let task = self
            .board
            .get(task_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("task {}", task_id)))?;

        let state = {
            let mut state = self.ui_state.lock();
            state.select(&task);
            state.clone()
        };

        if let Some(store) = &self.ui_store {
            if let Err(e) = state.save(store) {
                warn!(error = %e, "Failed to persist UI state");
            }
        }
        Ok(())
    }

    pub fn ui_state(&self) -> UiState {
        self.ui_state.lock().clone()
    }
}
