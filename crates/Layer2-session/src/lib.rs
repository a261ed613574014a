//! # deck-session
//!
//! Session lifecycle and streaming coordinator for Deck.
//! Binds each task to at most one live agent session, renders session output
//! into cached terminal surfaces, derives task status from output activity and
//! reconciles local status against the backend.
//!
//! ## Features
//!
//! - Spawn / kill / restart / model switch with at-most-one session per task
//! - Exit handling with a configurable completed/archived policy
//! - Terminal surfaces that survive detach and are destroyed with their session
//! - Idle detection (running ⇄ completed) on a fixed poll
//! - Startup/refresh reconciliation with live-session adoption

pub mod activity;
pub mod board;
pub mod hub;
pub mod idle;
pub mod reconcile;
pub mod registry;
pub mod terminal;

pub use activity::{ActivitySample, ActivityTracker};
pub use board::{StatusChange, TaskBoard};
pub use hub::{SessionHub, StartupReport};
pub use idle::{evaluate as evaluate_idle, IdleConfig, IdleDetector, IdleTick, ReconcileGate};
pub use reconcile::{ReconcileReport, Reconciler};
pub use registry::{LaunchSpec, RegistryConfig, RegistrySnapshot, SessionRegistry, SpawnOptions};

// Terminal
pub use terminal::{
    encode_key, encode_paste, Key, SharedSurface, SurfaceId, TerminalCache, TerminalCacheConfig,
    TerminalSurface, Viewport, SESSION_ENDED_NOTICE, SHIFT_ENTER,
};
