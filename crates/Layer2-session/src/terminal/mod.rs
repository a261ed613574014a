//! Terminal - cached per-session surfaces and input forwarding
//!
//! - `surface.rs` - vt100-backed screen for one session
//! - `cache.rs` - surface cache, single visible viewport, ordered input pump
//! - `input.rs` - key encoding

mod cache;
mod input;
mod surface;

pub use cache::{SharedSurface, TerminalCache, TerminalCacheConfig, Viewport};
pub use input::{encode_key, encode_paste, Key, SHIFT_ENTER};
pub use surface::{SurfaceId, TerminalSurface, SESSION_ENDED_NOTICE};
