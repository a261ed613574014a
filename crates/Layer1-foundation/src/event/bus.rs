//! Event Bridge - 세션별 이름 채널
//!
//! 백엔드가 출력 청크와 종료 알림을 브리지에 넣고, 세션 소비자는
//! 세션 ID에서 파생된 두 채널에 핸들러를 등록합니다.
//!
//! 전달 규칙:
//! - 각 발행은 채널의 활성 핸들러마다 정확히 한 번 전달
//! - 한 채널의 핸들러는 등록 순서대로, 한 번에 하나의 발행씩 실행
//! - `session-exit-{id}` 발행 이후 해당 세션의 출력은 버림

use super::types::{exit_channel, output_channel, ChannelEvent};
use crate::core::SessionId;
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

// ============================================================================
// Listener
// ============================================================================

/// 리스너 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// 타입 소거된 채널 핸들러
pub type EventHandler = Arc<dyn Fn(ChannelEvent) -> BoxFuture<'static, ()> + Send + Sync>;

struct RegisteredListener {
    name: String,
    channel: String,
    handler: EventHandler,
    active: Arc<AtomicBool>,
}

#[derive(Default)]
struct ListenerTable {
    listeners: HashMap<ListenerId, RegisteredListener>,
    channels: HashMap<String, Vec<ListenerId>>,
}

// ============================================================================
// EventBridge
// ============================================================================

/// 이벤트 브리지 설정
#[derive(Debug, Clone)]
pub struct EventBridgeConfig {
    /// 출력 억제를 위해 기억할 종료 세션 ID 수
    pub closed_capacity: usize,

    /// 모든 발행을 trace 로그로 기록
    pub debug_mode: bool,
}

impl Default for EventBridgeConfig {
    fn default() -> Self {
        Self {
            closed_capacity: 4096,
            debug_mode: false,
        }
    }
}

#[derive(Default)]
struct ClosedSessions {
    order: VecDeque<SessionId>,
    set: HashSet<SessionId>,
}

/// 이벤트 브리지
///
/// ```ignore
/// let bridge = Arc::new(EventBridge::new());
/// let sub = bridge.subscribe(
///     &session_id,
///     "terminal",
///     |chunk| async move { /* render */ },
///     || async { /* session ended */ },
/// );
/// bridge.emit_output(&session_id, b"hello".to_vec()).await;
/// sub.unsubscribe();
/// ```
pub struct EventBridge {
    config: EventBridgeConfig,
    table: RwLock<ListenerTable>,
    closed: Mutex<ClosedSessions>,
    listener_counter: AtomicU64,
    event_count: AtomicU64,
}

impl EventBridge {
    pub fn new() -> Self {
        Self::with_config(EventBridgeConfig::default())
    }

    pub fn with_config(config: EventBridgeConfig) -> Self {
        Self {
            config,
            table: RwLock::new(ListenerTable::default()),
            closed: Mutex::new(ClosedSessions::default()),
            listener_counter: AtomicU64::new(0),
            event_count: AtomicU64::new(0),
        }
    }

    /// 채널 이름에 핸들러 등록
    pub fn listen(
        &self,
        channel: impl Into<String>,
        name: impl Into<String>,
        handler: EventHandler,
    ) -> ListenerId {
        let id = ListenerId::new(self.listener_counter.fetch_add(1, Ordering::SeqCst));
        let channel = channel.into();
        let name = name.into();

        debug!(listener_id = %id, listener_name = %name, channel = %channel, "Registering channel listener");

        let mut table = self.table.write();
        table.channels.entry(channel.clone()).or_default().push(id);
        table.listeners.insert(
            id,
            RegisteredListener {
                name,
                channel,
                handler,
                active: Arc::new(AtomicBool::new(true)),
            },
        );

        id
    }

    /// 핸들러 제거. 이미 없으면 false 반환
    pub fn unlisten(&self, id: ListenerId) -> bool {
        let mut table = self.table.write();
        let Some(listener) = table.listeners.remove(&id) else {
            return false;
        };

        // 진행 중인 발행이 핸들러를 쥐고 있을 수 있음. 플래그로 중단
        listener.active.store(false, Ordering::SeqCst);

        if let Some(ids) = table.channels.get_mut(&listener.channel) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                table.channels.remove(&listener.channel);
            }
        }

        debug!(listener_id = %id, listener_name = %listener.name, "Unregistered channel listener");
        true
    }

    /// 한 세션의 출력/종료 핸들러 등록
    pub fn subscribe<O, OF, X, XF>(
        self: &Arc<Self>,
        session_id: &SessionId,
        name: &str,
        on_output: O,
        on_exit: X,
    ) -> Subscription
    where
        O: Fn(Arc<[u8]>) -> OF + Send + Sync + 'static,
        OF: Future<Output = ()> + Send + 'static,
        X: Fn() -> XF + Send + Sync + 'static,
        XF: Future<Output = ()> + Send + 'static,
    {
        let output_handler: EventHandler = Arc::new(move |event| match event {
            ChannelEvent::Output(bytes) => on_output(bytes).boxed(),
            ChannelEvent::Exit => future::ready(()).boxed(),
        });
        let exit_handler: EventHandler = Arc::new(move |event| match event {
            ChannelEvent::Exit => on_exit().boxed(),
            ChannelEvent::Output(_) => future::ready(()).boxed(),
        });

        let output = self.listen(output_channel(session_id), format!("{}:output", name), output_handler);
        let exit = self.listen(exit_channel(session_id), format!("{}:exit", name), exit_handler);

        Subscription {
            session_id: session_id.clone(),
            output,
            exit,
            bridge: Arc::downgrade(self),
            released: AtomicBool::new(false),
        }
    }

    /// `channel`의 모든 활성 핸들러에 순서대로 전달.
    /// 전달받은 핸들러 수를 반환합니다.
    pub async fn emit(&self, channel: &str, event: ChannelEvent) -> usize {
        let event_count = self.event_count.fetch_add(1, Ordering::SeqCst);

        if self.config.debug_mode {
            trace!(channel = %channel, exit = event.is_exit(), "Emitting event #{}", event_count + 1);
        }

        // 스냅샷: 핸들러가 테이블 교착 없이 구독/해제 가능
        let targets: Vec<(EventHandler, Arc<AtomicBool>)> = {
            let table = self.table.read();
            table
                .channels
                .get(channel)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| table.listeners.get(id))
                        .map(|l| (Arc::clone(&l.handler), Arc::clone(&l.active)))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut delivered = 0;
        for (handler, active) in targets {
            if !active.load(Ordering::SeqCst) {
                continue;
            }
            handler(event.clone()).await;
            delivered += 1;
        }

        delivered
    }

    /// 세션 출력 청크 발행. 세션 종료 후에는 버림
    pub async fn emit_output(&self, session_id: &SessionId, bytes: impl Into<Arc<[u8]>>) -> usize {
        if self.is_closed(session_id) {
            trace!(session_id = %session_id, "Dropping output after exit");
            return 0;
        }
        self.emit(&output_channel(session_id), ChannelEvent::output(bytes))
            .await
    }

    /// 세션 종료 알림 발행. 첫 호출만 전달
    pub async fn emit_exit(&self, session_id: &SessionId) -> usize {
        if !self.close(session_id) {
            debug!(session_id = %session_id, "Ignoring repeated exit notification");
            return 0;
        }
        self.emit(&exit_channel(session_id), ChannelEvent::Exit).await
    }

    /// 이 세션의 종료 알림이 발행되었는지 여부
    pub fn is_closed(&self, session_id: &SessionId) -> bool {
        self.closed.lock().set.contains(session_id)
    }

    fn close(&self, session_id: &SessionId) -> bool {
        let mut closed = self.closed.lock();
        if !closed.set.insert(session_id.clone()) {
            return false;
        }
        closed.order.push_back(session_id.clone());
        while closed.order.len() > self.config.closed_capacity {
            if let Some(oldest) = closed.order.pop_front() {
                closed.set.remove(&oldest);
            }
        }
        true
    }

    /// 채널에 등록된 핸들러 수
    pub fn listener_count(&self, channel: &str) -> usize {
        self.table
            .read()
            .channels
            .get(channel)
            .map(|ids| ids.len())
            .unwrap_or(0)
    }

    /// 전체 채널에 등록된 핸들러 수
    pub fn total_listeners(&self) -> usize {
        self.table.read().listeners.len()
    }

    /// 지금까지의 총 발행 수
    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::SeqCst)
    }
}

impl Default for EventBridge {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// 한 세션의 출력 + 종료 핸들러 핸들
///
/// `unsubscribe`는 여러 번 호출해도 안전하며, drop 시에도 구독 해제됩니다.
pub struct Subscription {
    session_id: SessionId,
    output: ListenerId,
    exit: ListenerId,
    bridge: Weak<EventBridge>,
    released: AtomicBool,
}

impl Subscription {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn is_active(&self) -> bool {
        !self.released.load(Ordering::SeqCst)
    }

    pub fn unsubscribe(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(bridge) = self.bridge.upgrade() {
            bridge.unlisten(self.output);
            bridge.unlisten(self.exit);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("session_id", &self.session_id)
            .field("active", &self.is_active())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
