//! Error types for Deck
//!
//! 워크스페이스의 모든 실패 가능한 작업은 [`Result`]를 반환합니다.
//! 호출자가 다루는 방식에 따라 구분:
//!
//! - spawn 실패는 사용자에게 표시
//! - 세션이 사라진 뒤의 백엔드 명령 실패는 로그만 남기고 버림
//! - 오래된 참조는 무해한 경합이므로 무시

use crate::core::TaskId;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// 태스크 세션을 시작하지 못한 이유
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpawnError {
    /// 태스크와 프로젝트 모두 작업 디렉토리가 없음
    #[error("no working directory for task {task_id}")]
    NoWorkingDirectory { task_id: TaskId },

    /// 백엔드가 spawn 요청을 거부함. 메시지는 그대로 전달
    #[error("{0}")]
    Rejected(String),
}

/// Deck 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 세션 생명주기 관련
    // ========================================================================
    #[error("Spawn failed: {0}")]
    Spawn(#[from] SpawnError),

    #[error("Backend command {command} failed: {message}")]
    Backend { command: String, message: String },

    #[error("Stale reference: {0}")]
    StaleReference(String),

    #[error("Spawn for task {task_id} superseded by a concurrent kill or respawn")]
    Superseded { task_id: TaskId },

    // ========================================================================
    // 설정/저장소 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // 일반
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 동시 kill/archive/respawn과의 경합. 호출자는 무시
    pub fn is_benign(&self) -> bool {
        matches!(self, Error::StaleReference(_) | Error::Superseded { .. })
    }

    /// 사용자에게 보여줄 에러인지 여부
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::Spawn(_) | Error::NotFound(_) | Error::InvalidInput(_) | Error::Config(_)
        )
    }

    /// 백엔드 명령 에러 헬퍼
    pub fn backend(command: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Backend {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Spawn 거부 헬퍼
    pub fn spawn_rejected(message: impl Into<String>) -> Self {
        Error::Spawn(SpawnError::Rejected(message.into()))
    }
}

// ============================================================================
// From implementations
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
