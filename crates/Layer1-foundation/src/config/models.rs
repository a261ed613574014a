//! Model Catalog - coding interfaces and the models each one accepts
//!
//! A model id picks both the CLI to launch and the `--model` value passed to it.

use serde::{Deserialize, Serialize};

/// A coding CLI and its selectable models
#[derive(Debug, Clone, Copy)]
pub struct CodingInterface {
    pub id: &'static str,
    pub name: &'static str,
    pub cli_command: &'static str,
    pub models: &'static [ModelEntry],
}

#[derive(Debug, Clone, Copy)]
pub struct ModelEntry {
    pub id: &'static str,
    pub name: &'static str,
}

pub const DEFAULT_CLI: &str = "claude";
pub const DEFAULT_MODEL: &str = "claude-opus-4-6";

pub const CODING_INTERFACES: &[CodingInterface] = &[
    CodingInterface {
        id: "claude",
        name: "Claude Code",
        cli_command: "claude",
        models: &[
            ModelEntry { id: "claude-opus-4-6", name: "Opus 4.6" },
            ModelEntry { id: "claude-sonnet-4-5", name: "Sonnet 4.5" },
            ModelEntry { id: "claude-haiku-4-5", name: "Haiku 4.5" },
        ],
    },
    CodingInterface {
        id: "codex",
        name: "Codex",
        cli_command: "codex",
        models: &[
            ModelEntry { id: "gpt-5.3-codex", name: "GPT-5.3 Codex" },
            ModelEntry { id: "gpt-5.2-codex", name: "GPT-5.2 Codex" },
            ModelEntry { id: "gpt-5.1-codex-max", name: "GPT-5.1 Codex Max" },
            ModelEntry { id: "gpt-5.2", name: "GPT-5.2" },
            ModelEntry { id: "gpt-5.1-codex-mini", name: "GPT-5.1 Codex Mini" },
        ],
    },
];

/// What a session is launched with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub cli_command: String,
    pub model: String,
}

impl ModelConfig {
    /// Resolve a model id. Unknown ids go to the default CLI unchanged.
    pub fn for_model_id(model_id: &str) -> Self {
        let cli_command = interface_for_model(model_id)
            .map(|iface| iface.cli_command)
            .unwrap_or(DEFAULT_CLI);

        Self {
            cli_command: cli_command.to_string(),
            model: model_id.to_string(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::for_model_id(DEFAULT_MODEL)
    }
}

pub fn interface_for_model(model_id: &str) -> Option<&'static CodingInterface> {
    CODING_INTERFACES
        .iter()
        .find(|iface| iface.models.iter().any(|m| m.id == model_id))
}

pub fn is_known_model(model_id: &str) -> bool {
    interface_for_model(model_id).is_some()
}
