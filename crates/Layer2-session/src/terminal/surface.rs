//! Terminal surface - a vt100 screen fed by one session's output
//!
//! The parser keeps decoder state between calls, so multi-byte characters split
//! across output chunks render correctly.

use deck_foundation::{SessionId, TermSize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;
use vt100::Parser;

/// Printed once when the session's process is gone
pub const SESSION_ENDED_NOTICE: &str = "\r\n\x1b[90m[Session ended]\x1b[0m\r\n";

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a surface instance, stable across detach/attach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(u64);

impl SurfaceId {
    fn next() -> Self {
        Self(NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "surface-{}", self.0)
    }
}

pub struct TerminalSurface {
    id: SurfaceId,
    session_id: SessionId,
    parser: Parser,
    size: TermSize,
    bytes_seen: u64,
    ended: bool,
}

impl TerminalSurface {
    /// Sizes too small to render fall back to the default grid
    pub fn new(session_id: SessionId, size: TermSize, scrollback: usize) -> Self {
        let size = if size.is_renderable() {
            size
        } else {
            TermSize::default()
        };
        Self {
            id: SurfaceId::next(),
            session_id,
            parser: Parser::new(size.rows, size.cols, scrollback),
            size,
            bytes_seen: 0,
            ended: false,
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn size(&self) -> TermSize {
        self.size
    }

    /// Total output bytes rendered so far
    pub fn bytes_seen(&self) -> u64 {
        self.bytes_seen
    }

    pub fn has_ended(&self) -> bool {
        self.ended
    }

    /// Feed raw session output
    pub fn process(&mut self, bytes: &[u8]) {
        self.bytes_seen += bytes.len() as u64;
        self.parser.process(bytes);
    }

    /// Write the session-ended line. Later calls do nothing.
    pub fn mark_ended(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.parser.process(SESSION_ENDED_NOTICE.as_bytes());
    }

    /// Refit to new dimensions. Returns whether the size changed.
    ///
    /// Sizes too small to render are ignored and the current grid is kept.
    pub fn resize(&mut self, size: TermSize) -> bool {
        if !size.is_renderable() {
            trace!(
                session_id = %self.session_id,
                rows = size.rows,
                cols = size.cols,
                "Ignoring collapsed size"
            );
            return false;
        }
        if size == self.size {
            return false;
        }
        self.size = size;
        self.parser.screen_mut().set_size(size.rows, size.cols);
        true
    }

    /// Visible screen text
    pub fn contents(&self) -> String {
        self.parser.screen().contents()
    }
}

impl std::fmt::Debug for TerminalSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalSurface")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .field("size", &self.size)
            .field("bytes_seen", &self.bytes_seen)
            .finish()
    }
}
