//! Idle detection on a paused clock

mod common;

use common::{settle, Harness};
use deck_foundation::{SessionState, TaskId, TaskStatus};
use deck_session::{IdleConfig, IdleDetector, ReconcileGate};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::advance;

#[tokio::test(start_paused = true)]
async fn test_idle_round_trip() {
    let h = Harness::default();
    let task = h.task(1, TaskStatus::Waiting).await;
    let idle = h.hub.idle_detector();
    let s1 = h.hub.spawn_task(task.id, None).await.unwrap();

    h.backend.output(&s1, b"thinking...").await;
    advance(Duration::from_secs(9)).await;

    let tick = idle.tick().await;
    assert_eq!(tick.completed, vec![task.id]);
    assert_eq!(h.hub.board().status(task.id).await, Some(TaskStatus::Completed));

    // Quiet completed task stays completed
    advance(Duration::from_secs(30)).await;
    assert_eq!(idle.tick().await, Default::default());

    h.backend.output(&s1, b"more output").await;
    let tick = idle.tick().await;
    assert_eq!(tick.resumed, vec![task.id]);

    advance(Duration::from_secs(9)).await;
    assert_eq!(idle.tick().await.completed, vec![task.id]);

    assert_eq!(
        h.backend.history(task.id),
        vec![
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Running,
            TaskStatus::Completed,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_silent_session_never_completes() {
    let h = Harness::default();
    let task = h.task(1, TaskStatus::Waiting).await;
    h.hub.spawn_task(task.id, None).await.unwrap();

    advance(Duration::from_secs(600)).await;

    assert_eq!(h.hub.idle_detector().tick().await, Default::default());
    assert_eq!(h.hub.board().status(task.id).await, Some(TaskStatus::Running));
}

#[tokio::test(start_paused = true)]
async fn test_below_threshold_stays_running() {
    let h = Harness::default();
    let task = h.task(1, TaskStatus::Waiting).await;
    let s1 = h.hub.spawn_task(task.id, None).await.unwrap();

    h.backend.output(&s1, b"x").await;
    advance(Duration::from_secs(5)).await;

    assert!(h.hub.idle_detector().tick().await.completed.is_empty());
    assert_eq!(h.backend.history(task.id), vec![TaskStatus::Running]);
}

#[tokio::test(start_paused = true)]
async fn test_tick_skipped_while_gate_held() {
    let h = Harness::default();
    let task = h.task(1, TaskStatus::Waiting).await;
    let s1 = h.hub.spawn_task(task.id, None).await.unwrap();
    h.backend.output(&s1, b"x").await;
    advance(Duration::from_secs(9)).await;

    let gate: ReconcileGate = Arc::new(RwLock::new(()));
    let idle = IdleDetector::new(h.hub.registry().clone(), Arc::clone(&gate), IdleConfig::default());

    let guard = gate.write().await;
    let tick = idle.tick().await;
    assert!(tick.skipped);
    assert!(tick.completed.is_empty());
    drop(guard);

    assert_eq!(idle.tick().await.completed, vec![task.id]);
}

#[tokio::test(start_paused = true)]
async fn test_unbound_task_is_never_evaluated() {
    let h = Harness::default();
    h.task(1, TaskStatus::Running).await;

    advance(Duration::from_secs(60)).await;

    assert_eq!(h.hub.idle_detector().tick().await, Default::default());
    assert!(h.backend.history(TaskId(1)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_detector_loop_completes_task() {
    let h = Harness::default();
    let task = h.task(1, TaskStatus::Waiting).await;
    h.hub.startup().await.unwrap();

    let s1 = h.hub.spawn_task(task.id, None).await.unwrap();
    h.backend.output(&s1, b"done, waiting for input").await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    settle().await;

    assert_eq!(h.hub.board().status(task.id).await, Some(TaskStatus::Completed));
    assert_eq!(
        h.backend.history(task.id),
        vec![TaskStatus::Running, TaskStatus::Completed]
    );

    h.hub.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_adopted_completed_task_resumes_on_output() {
    let h = Harness::default();
    h.task(1, TaskStatus::Completed).await;
    let live = h.backend.add_live_session("sess-a", 1, SessionState::Running);

    let report = h.hub.refresh().await.unwrap();
    assert_eq!(report.adopted, vec![TaskId(1)]);

    let idle = h.hub.idle_detector();
    assert_eq!(idle.tick().await, Default::default());

    h.backend.output(&live, b"user typed a follow-up").await;
    assert_eq!(idle.tick().await.resumed, vec![TaskId(1)]);
    assert_eq!(h.backend.status_of(TaskId(1)), Some(TaskStatus::Running));
}
