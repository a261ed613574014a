//! Terminal Cache - one surface per session, at most one visible
//!
//! ```text
//!   open(S) ──▶ surface + output subscription + input pump   (cached, hidden)
//!   attach(S, viewport) ──▶ detach current, mount S, refit, start stream once
//!   detach(viewport) ──▶ unmount only; surface keeps receiving output
//!   destroy(S) ──▶ unsubscribe, stop pump, unmount, forget stream state
//! ```

use super::input::{encode_key, encode_paste, Key};
use super::surface::{SurfaceId, TerminalSurface};
use deck_foundation::{EventBridge, SessionBackend, SessionId, Subscription, TermSize};
use futures::future;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

/// Surface shared between the cache, its output listener and any viewport
pub type SharedSurface = Arc<Mutex<TerminalSurface>>;

// ============================================================================
// Viewport
// ============================================================================

/// The visible terminal region. Clones refer to the same region.
#[derive(Clone)]
pub struct Viewport {
    inner: Arc<Mutex<ViewportState>>,
}

struct ViewportState {
    size: TermSize,
    mounted: Option<(SessionId, SharedSurface)>,
}

impl Viewport {
    pub fn new(size: TermSize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ViewportState {
                size,
                mounted: None,
            })),
        }
    }

    pub fn size(&self) -> TermSize {
        self.inner.lock().size
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.inner.lock().mounted.as_ref().map(|(id, _)| id.clone())
    }

    pub fn surface(&self) -> Option<SharedSurface> {
        self.inner.lock().mounted.as_ref().map(|(_, s)| Arc::clone(s))
    }

    pub fn surface_id(&self) -> Option<SurfaceId> {
        self.surface().map(|s| s.lock().id())
    }

    /// Screen text of the mounted surface, empty when nothing is mounted
    pub fn contents(&self) -> String {
        self.surface()
            .map(|s| s.lock().contents())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().mounted.is_none()
    }

    fn same(&self, other: &Viewport) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn set_size(&self, size: TermSize) {
        self.inner.lock().size = size;
    }

    fn mount(&self, session_id: SessionId, surface: SharedSurface) {
        self.inner.lock().mounted = Some((session_id, surface));
    }

    fn mounted(&self) -> Option<(SessionId, SharedSurface)> {
        self.inner
            .lock()
            .mounted
            .as_ref()
            .map(|(id, s)| (id.clone(), Arc::clone(s)))
    }

    fn unmount(&self) -> Option<SessionId> {
        self.inner.lock().mounted.take().map(|(id, _)| id)
    }
}

impl std::fmt::Debug for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Viewport")
            .field("size", &self.size())
            .field("session_id", &self.session_id())
            .finish()
    }
}

// ============================================================================
// Input pump
// ============================================================================

#[derive(Debug)]
enum InputCommand {
    Write(Vec<u8>),
    Resize(TermSize),
}

/// Forwards input for one session in order. Ends when the sender is dropped.
async fn run_input_pump(
    backend: Arc<dyn SessionBackend>,
    session_id: SessionId,
    mut rx: mpsc::UnboundedReceiver<InputCommand>,
) {
    while let Some(command) = rx.recv().await {
        let result = match &command {
            InputCommand::Write(bytes) => backend.write_to_session(&session_id, bytes).await,
            InputCommand::Resize(size) => {
                backend
                    .resize_session(&session_id, size.rows, size.cols)
                    .await
            }
        };
        if let Err(e) = result {
            warn!(session_id = %session_id, error = %e, "Terminal input not delivered");
        }
    }
    trace!(session_id = %session_id, "Input pump stopped");
}

// ============================================================================
// TerminalCache
// ============================================================================

#[derive(Debug, Clone)]
pub struct TerminalCacheConfig {
    /// Size of surfaces created before they are first attached
    pub default_size: TermSize,

    pub scrollback: usize,
}

impl Default for TerminalCacheConfig {
    fn default() -> Self {
        Self {
            default_size: TermSize::default(),
            scrollback: 10_000,
        }
    }
}

struct CachedTerminal {
    surface: SharedSurface,
    input: mpsc::UnboundedSender<InputCommand>,
    subscription: Subscription,
}

pub struct TerminalCache {
    backend: Arc<dyn SessionBackend>,
    bridge: Arc<EventBridge>,
    config: TerminalCacheConfig,
    terminals: Mutex<HashMap<SessionId, CachedTerminal>>,
    started: Mutex<HashSet<SessionId>>,
    visible: Mutex<Option<Viewport>>,
}

impl TerminalCache {
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        bridge: Arc<EventBridge>,
        config: TerminalCacheConfig,
    ) -> Self {
        Self {
            backend,
            bridge,
            config,
            terminals: Mutex::new(HashMap::new()),
            started: Mutex::new(HashSet::new()),
            visible: Mutex::new(None),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Get the session's surface, creating and wiring it if needed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(&self, session_id: &SessionId) -> SharedSurface {
        let mut terminals = self.terminals.lock();
        if let Some(cached) = terminals.get(session_id) {
            return Arc::clone(&cached.surface);
        }

        let surface: SharedSurface = Arc::new(Mutex::new(TerminalSurface::new(
            session_id.clone(),
            self.config.default_size,
            self.config.scrollback,
        )));

        let on_output = Arc::clone(&surface);
        let on_exit = Arc::clone(&surface);
        let subscription = self.bridge.subscribe(
            session_id,
            "terminal",
            move |bytes| {
                on_output.lock().process(&bytes);
                future::ready(())
            },
            move || {
                on_exit.lock().mark_ended();
                future::ready(())
            },
        );

        let (input, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_input_pump(
            Arc::clone(&self.backend),
            session_id.clone(),
            rx,
        ));

        debug!(session_id = %session_id, surface_id = %surface.lock().id(), "Terminal surface created");

        terminals.insert(
            session_id.clone(),
            CachedTerminal {
                surface: Arc::clone(&surface),
                input,
                subscription,
            },
        );
        surface
    }

    /// Show a session in the viewport, replacing whatever was visible
    pub async fn attach(&self, session_id: &SessionId, viewport: &Viewport) -> SurfaceId {
        let previous = self.visible.lock().take();
        if let Some(previous) = previous {
            previous.unmount();
        }
        viewport.unmount();

        let surface = self.open(session_id);
        let (surface_id, size) = {
            let mut surface = surface.lock();
            surface.resize(viewport.size());
            (surface.id(), surface.size())
        };

        viewport.mount(session_id.clone(), surface);
        *self.visible.lock() = Some(viewport.clone());
        debug!(session_id = %session_id, surface_id = %surface_id, "Terminal attached");

        self.ensure_stream_started(session_id).await;

        // The surface may have been hidden at a stale size. A collapsed
        // viewport keeps the surface's last grid.
        self.send(session_id, InputCommand::Resize(size));

        surface_id
    }

    /// Hide the viewport's surface without destroying it
    pub fn detach(&self, viewport: &Viewport) -> Option<SessionId> {
        {
            let mut visible = self.visible.lock();
            if visible.as_ref().is_some_and(|v| v.same(viewport)) {
                *visible = None;
            }
        }
        let detached = viewport.unmount();
        if let Some(session_id) = &detached {
            debug!(session_id = %session_id, "Terminal detached");
        }
        detached
    }

    /// Tear down a session's surface. Returns false if it was not cached.
    pub fn destroy(&self, session_id: &SessionId) -> bool {
        let removed = self.terminals.lock().remove(session_id);
        self.started.lock().remove(session_id);

        let shown = {
            let mut visible = self.visible.lock();
            let showing = visible
                .as_ref()
                .is_some_and(|v| v.session_id().as_ref() == Some(session_id));
            if showing {
                visible.take()
            } else {
                None
            }
        };
        if let Some(viewport) = shown {
            viewport.unmount();
        }

        match removed {
            Some(cached) => {
                cached.subscription.unsubscribe();
                // dropping `cached.input` stops the pump
                debug!(session_id = %session_id, "Terminal surface destroyed");
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Stream start
    // ========================================================================

    /// Ask the backend to start pushing output, once per session.
    ///
    /// Sessions without a cached surface are skipped. A failed start is logged
    /// and may be retried by a later call.
    pub async fn ensure_stream_started(&self, session_id: &SessionId) -> bool {
        if !self.contains(session_id) {
            return false;
        }
        let first = self.started.lock().insert(session_id.clone());
        if !first {
            return false;
        }

        match self.backend.start_session_stream(session_id).await {
            Ok(()) => {
                debug!(session_id = %session_id, "Output stream started");
                if let Some(surface) = self.surface(session_id) {
                    let size = surface.lock().size();
                    self.send(session_id, InputCommand::Resize(size));
                }
                true
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Failed to start output stream");
                self.started.lock().remove(session_id);
                false
            }
        }
    }

    /// Record a stream the backend is already pushing (adopted sessions)
    pub fn mark_stream_started(&self, session_id: &SessionId) {
        self.started.lock().insert(session_id.clone());
    }

    pub fn is_stream_started(&self, session_id: &SessionId) -> bool {
        self.started.lock().contains(session_id)
    }

    // ========================================================================
    // Input
    // ========================================================================

    /// Forward raw input bytes, fire-and-forget
    pub fn write(&self, session_id: &SessionId, bytes: impl Into<Vec<u8>>) {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return;
        }
        self.send(session_id, InputCommand::Write(bytes));
    }

    pub fn send_key(&self, session_id: &SessionId, key: Key) {
        match encode_key(key) {
            Some(bytes) => self.write(session_id, bytes),
            None => trace!(?key, "Key has no terminal encoding"),
        }
    }

    pub fn paste(&self, session_id: &SessionId, text: &str) {
        self.write(session_id, encode_paste(text));
    }

    /// Refit the viewport and whatever is mounted in it
    pub fn resize(&self, viewport: &Viewport, size: TermSize) {
        viewport.set_size(size);
        if let Some((session_id, surface)) = viewport.mounted() {
            let changed = surface.lock().resize(size);
            if changed {
                self.send(&session_id, InputCommand::Resize(size));
            }
        }
    }

    fn send(&self, session_id: &SessionId, command: InputCommand) {
        let terminals = self.terminals.lock();
        let Some(cached) = terminals.get(session_id) else {
            debug!(session_id = %session_id, "Dropping input for unknown session");
            return;
        };
        if cached.input.send(command).is_err() {
            warn!(session_id = %session_id, "Input pump is gone");
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.terminals.lock().contains_key(session_id)
    }

    pub fn surface(&self, session_id: &SessionId) -> Option<SharedSurface> {
        self.terminals
            .lock()
            .get(session_id)
            .map(|cached| Arc::clone(&cached.surface))
    }

    pub fn visible_session(&self) -> Option<SessionId> {
        self.visible.lock().as_ref().and_then(|v| v.session_id())
    }

    pub fn len(&self) -> usize {
        self.terminals.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
