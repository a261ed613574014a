//! Storage module for Deck
//!
//! - `json`: JSON documents under the global/project config dirs
//! - `ui_state`: last selection, used to resume the UI where it was left

mod json;
mod ui_state;

pub use json::{JsonStore, GLOBAL_DIR_NAME, PROJECT_DIR_NAME};
pub use ui_state::{UiState, UI_STATE_FILE};
