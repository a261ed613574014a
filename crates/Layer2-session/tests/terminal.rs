//! Terminal surfaces driven through the registry

mod common;

use common::{settle, Harness};
use deck_foundation::{Error, TaskId, TaskStatus, TermSize};
use deck_session::{Key, Viewport};

#[tokio::test]
async fn test_reattach_keeps_surface_and_content() {
    let h = Harness::default();
    let task = h.task(1, TaskStatus::Waiting).await;
    let registry = h.hub.registry();
    let s1 = h.hub.spawn_task(task.id, None).await.unwrap();
    let viewport = Viewport::new(TermSize::new(30, 100));

    let first = registry.attach(task.id, &viewport).await.unwrap();
    h.backend.output(&s1, b"hello from agent").await;

    assert_eq!(registry.detach(&viewport), Some(s1.clone()));
    h.backend.output(&s1, b"\r\nwhile hidden").await;

    let second = registry.attach(task.id, &viewport).await.unwrap();
    assert_eq!(first, second);
    let contents = viewport.contents();
    assert!(contents.contains("hello from agent"));
    assert!(contents.contains("while hidden"));
}

#[tokio::test]
async fn test_output_before_attach_is_kept() {
    let h = Harness::default();
    let task = h.task(1, TaskStatus::Waiting).await;
    let s1 = h.hub.spawn_task(task.id, None).await.unwrap();

    h.backend.output(&s1, b"early banner").await;

    let viewport = Viewport::new(TermSize::default());
    h.hub.registry().attach(task.id, &viewport).await.unwrap();
    assert!(viewport.contents().contains("early banner"));
}

#[tokio::test]
async fn test_exit_destroys_surface() {
    let h = Harness::default();
    let task = h.task(1, TaskStatus::Waiting).await;
    let registry = h.hub.registry();
    let s1 = h.hub.spawn_task(task.id, None).await.unwrap();
    let viewport = Viewport::new(TermSize::default());
    registry.attach(task.id, &viewport).await.unwrap();
    let surface = viewport.surface().unwrap();

    h.backend.output(&s1, b"all done").await;
    h.backend.exit(&s1).await;

    assert!(viewport.is_empty());
    assert!(!registry.terminals().contains(&s1));
    assert!(registry.terminals().visible_session().is_none());

    let surface = surface.lock();
    assert!(surface.has_ended());
    let contents = surface.contents();
    assert!(contents.contains("all done"));
    assert_eq!(contents.matches("[Session ended]").count(), 1);
}

#[tokio::test]
async fn test_utf8_split_across_chunks() {
    let h = Harness::default();
    let task = h.task(1, TaskStatus::Waiting).await;
    let s1 = h.hub.spawn_task(task.id, None).await.unwrap();
    let viewport = Viewport::new(TermSize::default());
    h.hub.registry().attach(task.id, &viewport).await.unwrap();

    let bytes = "héllo ✓ok".as_bytes();
    h.backend.output(&s1, &bytes[..2]).await;
    h.backend.output(&s1, &bytes[2..8]).await;
    h.backend.output(&s1, &bytes[8..]).await;

    assert!(viewport.contents().contains("héllo ✓ok"));
}

#[tokio::test]
async fn test_keystrokes_arrive_in_order() {
    let h = Harness::default();
    let task = h.task(1, TaskStatus::Waiting).await;
    let registry = h.hub.registry();
    let s1 = h.hub.spawn_task(task.id, None).await.unwrap();

    registry.write_input(task.id, "fix the bug").unwrap();
    registry.send_key(task.id, Key::ShiftEnter).unwrap();
    registry.write_input(task.id, "and add a test").unwrap();
    registry.send_key(task.id, Key::Enter).unwrap();
    settle().await;

    assert_eq!(
        h.backend.writes(&s1),
        vec![
            b"fix the bug".to_vec(),
            b"\x1b[200~\n\x1b[201~".to_vec(),
            b"and add a test".to_vec(),
            b"\r".to_vec(),
        ]
    );
}

#[tokio::test]
async fn test_attach_unbound_task_fails() {
    let h = Harness::default();
    h.task(1, TaskStatus::Waiting).await;
    let viewport = Viewport::new(TermSize::default());

    let err = h.hub.registry().attach(TaskId(1), &viewport).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert!(h.hub.registry().write_input(TaskId(1), "x").is_err());
}

#[tokio::test]
async fn test_stream_started_once_then_resized() {
    let h = Harness::default();
    let task = h.task(1, TaskStatus::Waiting).await;
    let registry = h.hub.registry();
    let s1 = h.hub.spawn_task(task.id, None).await.unwrap();
    let viewport = Viewport::new(TermSize::new(30, 100));

    registry.attach(task.id, &viewport).await.unwrap();
    registry.detach(&viewport);
    registry.attach(task.id, &viewport).await.unwrap();
    settle().await;

    assert_eq!(h.backend.stream_starts(&s1), 1);
    assert_eq!(
        h.backend.resizes(&s1),
        vec![(24, 80), (30, 100), (30, 100)]
    );
}

#[tokio::test]
async fn test_switching_tasks_keeps_one_visible() {
    let h = Harness::default();
    let a = h.task(1, TaskStatus::Waiting).await;
    let b = h.task(2, TaskStatus::Waiting).await;
    let registry = h.hub.registry();
    let sa = h.hub.spawn_task(a.id, None).await.unwrap();
    let sb = h.hub.spawn_task(b.id, None).await.unwrap();
    let viewport = Viewport::new(TermSize::default());

    registry.attach(a.id, &viewport).await.unwrap();
    registry.attach(b.id, &viewport).await.unwrap();
    assert_eq!(registry.terminals().visible_session(), Some(sb));

    // Hidden session keeps rendering
    h.backend.output(&sa, b"background work").await;
    registry.attach(a.id, &viewport).await.unwrap();
    assert!(viewport.contents().contains("background work"));
    assert_eq!(registry.terminals().len(), 2);
}
