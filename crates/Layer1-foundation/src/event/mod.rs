//! Event System - 세션별 출력/종료 채널
//!
//! 백엔드 쪽이 PTY 출력과 종료 알림을 보내고, 세션 코디네이터는
//! 세션마다 두 채널을 구독합니다.
//!
//! ## 아키텍처
//!
//! ```text
//! backend ──emit_output(id, bytes)──▶ session-output-{id} ──▶ activity, terminal
//!         ──emit_exit(id)───────────▶ session-exit-{id}   ──▶ registry.handle_exit
//! ```
//!
//! ## 사용법
//!
//! ```ignore
//! use deck_foundation::event::EventBridge;
//!
//! let bridge = Arc::new(EventBridge::new());
//! let sub = bridge.subscribe(&session_id, "registry", on_output, on_exit);
//!
//! bridge.emit_output(&session_id, chunk).await;
//! bridge.emit_exit(&session_id).await;
//!
//! sub.unsubscribe();
//! ```

pub mod bus;
pub mod types;

pub use bus::{EventBridge, EventBridgeConfig, EventHandler, ListenerId, Subscription};

pub use types::{
    exit_channel, output_channel, ChannelEvent, EXIT_CHANNEL_PREFIX, OUTPUT_CHANNEL_PREFIX,
};
