//! # deck-foundation
//!
//! Deck의 기반 레이어:
//! - Core: ID, 태스크/세션 레코드, 백엔드 trait (SessionBackend, TaskStore)
//! - Event: 세션별 출력/종료 채널 (EventBridge)
//! - Config: DeckConfig, 모델 카탈로그
//! - Storage: JsonStore, UI 상태
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  deck-session (registry, terminal cache, idle, board)   │
//! └──────────┬──────────────────────────────┬───────────────┘
//!            │ SessionBackend / TaskStore   │ subscribe
//!            ▼                              ▼
//!   ┌──────────────────┐          ┌──────────────────────┐
//!   │ PTY host + DB    │──emit──▶ │ EventBridge          │
//!   │ (external)       │          │ session-output-{id}  │
//!   └──────────────────┘          │ session-exit-{id}    │
//!                                 └──────────────────────┘
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod event;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result, SpawnError};

// ============================================================================
// Core
// ============================================================================
pub use core::{
    // Identifiers
    ProjectId,
    SessionId,
    TaskId,
    // Records
    Project,
    SessionInfo,
    SessionState,
    SpawnRequest,
    Task,
    TaskStatus,
    TermSize,
    // Traits
    SessionBackend,
    TaskStore,
};

// ============================================================================
// Config
// ============================================================================
pub use config::{
    CodingInterface, DeckConfig, ExitPolicy, ModelConfig, ModelEntry, SessionSettings,
    TerminalSettings, CODING_INTERFACES, DECK_CONFIG_FILE, DEFAULT_CLI, DEFAULT_MODEL,
};

// ============================================================================
// Storage
// ============================================================================
pub use storage::{JsonStore, UiState, UI_STATE_FILE};

// ============================================================================
// Event
// ============================================================================
pub use event::{
    exit_channel, output_channel, ChannelEvent, EventBridge, EventBridgeConfig, EventHandler,
    ListenerId, Subscription,
};
