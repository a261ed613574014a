//! Config - coordinator settings
//!
//! - `deck.rs` - DeckConfig (idle detection, exit policy, terminal defaults)
//! - `models.rs` - coding interface / model catalog

mod deck;
mod models;

pub use deck::{DeckConfig, ExitPolicy, SessionSettings, TerminalSettings, DECK_CONFIG_FILE};
pub use models::{
    interface_for_model, is_known_model, CodingInterface, ModelConfig, ModelEntry,
    CODING_INTERFACES, DEFAULT_CLI, DEFAULT_MODEL,
};
