//! Core Module - 식별자, 레코드, 백엔드 계약
//!
//! ## 구조
//!
//! - `types.rs`: 데이터 타입 (Task, SessionInfo, SpawnRequest ...)
//! - `traits.rs`: 인터페이스 (SessionBackend, TaskStore)
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              session coordinator             │
//! │        (deck-session: registry, cache)       │
//! └──────────────┬───────────────────┬───────────┘
//!                │ requests          │ events
//!                ▼                   ▲
//!     ┌────────────────────┐  ┌──────────────┐
//!     │ SessionBackend     │  │ EventBridge  │
//!     │ TaskStore          │  │ (channels)   │
//!     └────────────────────┘  └──────────────┘
//! ```

pub mod traits;
pub mod types;

// ============================================================================
// Types (types.rs)
// ============================================================================

// Identifiers
pub use types::{ProjectId, SessionId, TaskId};

// Task & project records
pub use types::{Project, Task, TaskStatus};

// Session records
pub use types::{SessionInfo, SessionState, SpawnRequest, TermSize};

// ============================================================================
// Traits (traits.rs)
// ============================================================================

pub use traits::{SessionBackend, TaskStore};
