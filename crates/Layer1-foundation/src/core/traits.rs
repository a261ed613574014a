//! Core Traits - 세션 코디네이터가 사용하는 백엔드 인터페이스
//!
//! 두 trait 모두 비동기 요청/응답 방식입니다. 출력과 종료 알림은 여기를
//! 거치지 않고, 백엔드를 구동하는 쪽이 [`EventBridge`](crate::event::EventBridge)에
//! 직접 넣습니다.

use super::types::{Project, ProjectId, SessionId, SessionInfo, SpawnRequest, Task, TaskId, TaskStatus};
use crate::Result;
use async_trait::async_trait;

/// 에이전트 세션을 호스팅하는 프로세스/PTY 백엔드
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// 새 에이전트 프로세스 시작, 세션 ID 반환
    async fn spawn_session(&self, request: SpawnRequest) -> Result<SessionId>;

    /// 세션 프로세스 종료
    async fn kill_session(&self, session_id: &SessionId) -> Result<()>;

    /// 세션 PTY에 원시 입력 바이트 쓰기
    async fn write_to_session(&self, session_id: &SessionId, data: &[u8]) -> Result<()>;

    /// 세션 PTY 크기 변경
    async fn resize_session(&self, session_id: &SessionId, rows: u16, cols: u16) -> Result<()>;

    /// 세션 출력 이벤트 전송 시작. 세션당 한 번 호출
    async fn start_session_stream(&self, session_id: &SessionId) -> Result<()>;

    /// 백엔드가 현재 알고 있는 세션 목록
    async fn list_sessions(&self) -> Result<Vec<SessionInfo>>;
}

/// 태스크/프로젝트 저장소 (코디네이터가 필요한 호출만 노출)
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// 전체 프로젝트의 보관되지 않은 태스크
    async fn list_tasks(&self) -> Result<Vec<Task>>;

    /// 상태 변경 저장. 태스크가 없으면 실패
    async fn update_task_status(&self, task_id: TaskId, status: TaskStatus) -> Result<Task>;

    /// 태스크 작업 디렉토리 결정용 프로젝트 조회
    async fn project(&self, project_id: ProjectId) -> Result<Option<Project>>;
}
