//! Deck Config - coordinator settings
//!
//! `config.json` is read from the global store first, then from the project
//! store; project values win.

use crate::storage::JsonStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Config file name
pub const DECK_CONFIG_FILE: &str = "config.json";

// ============================================================================
// Deck Config
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Model id used for new sessions when none is chosen
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub terminal: TerminalSettings,
}

impl DeckConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// Global + current project, merged
    pub fn load() -> Result<Self> {
        let global = JsonStore::global().ok();
        let project = JsonStore::current_project().ok();
        Self::load_from(global.as_ref(), project.as_ref())
    }

    /// Merge whichever stores are given, in order, then validate
    pub fn load_from(global: Option<&JsonStore>, project: Option<&JsonStore>) -> Result<Self> {
        let mut config = Self::new();

        for store in [global, project].into_iter().flatten() {
            if let Some(layer) = store.load_optional::<DeckConfig>(DECK_CONFIG_FILE)? {
                config.merge(layer);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, store: &JsonStore) -> Result<()> {
        store.save(DECK_CONFIG_FILE, self)
    }

    pub fn save_global(&self) -> Result<()> {
        self.save_to(&JsonStore::global()?)
    }

    pub fn save_project(&self) -> Result<()> {
        self.save_to(&JsonStore::current_project()?)
    }

    // ========================================================================
    // Merge / Validate
    // ========================================================================

    /// `other` wins for anything it sets away from the default
    pub fn merge(&mut self, other: DeckConfig) {
        if other.default_model.is_some() {
            self.default_model = other.default_model;
        }
        self.session.merge(other.session);
        self.terminal.merge(other.terminal);
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.idle_threshold_ms == 0 {
            return Err(Error::Config("session.idleThresholdMs must be > 0".into()));
        }
        if self.session.idle_poll_interval_ms == 0 {
            return Err(Error::Config("session.idlePollIntervalMs must be > 0".into()));
        }
        if self.terminal.rows == 0 || self.terminal.cols == 0 {
            return Err(Error::Config(format!(
                "terminal size must be non-zero, got {}x{}",
                self.terminal.rows, self.terminal.cols
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn exit_policy(mut self, policy: ExitPolicy) -> Self {
        self.session.exit_policy = policy;
        self
    }
}

// ============================================================================
// Session Settings
// ============================================================================

/// What happens to a task whose session ends on its own
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitPolicy {
    /// Mark the task completed; it stays on the board
    #[default]
    Complete,
    /// Archive the task
    Archive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    /// Quiet period after which a running task counts as completed
    #[serde(default = "default_idle_threshold_ms")]
    pub idle_threshold_ms: u64,

    #[serde(default = "default_idle_poll_interval_ms")]
    pub idle_poll_interval_ms: u64,

    #[serde(default)]
    pub exit_policy: ExitPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_threshold_ms: default_idle_threshold_ms(),
            idle_poll_interval_ms: default_idle_poll_interval_ms(),
            exit_policy: ExitPolicy::default(),
        }
    }
}

impl SessionSettings {
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.idle_threshold_ms)
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms)
    }

    fn merge(&mut self, other: SessionSettings) {
        if other.idle_threshold_ms != default_idle_threshold_ms() {
            self.idle_threshold_ms = other.idle_threshold_ms;
        }
        if other.idle_poll_interval_ms != default_idle_poll_interval_ms() {
            self.idle_poll_interval_ms = other.idle_poll_interval_ms;
        }
        if other.exit_policy != ExitPolicy::default() {
            self.exit_policy = other.exit_policy;
        }
    }
}

// ============================================================================
// Terminal Settings
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalSettings {
    #[serde(default = "default_rows")]
    pub rows: u16,

    #[serde(default = "default_cols")]
    pub cols: u16,

    /// Lines kept above the visible screen
    #[serde(default = "default_scrollback")]
    pub scrollback: usize,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            rows: default_rows(),
            cols: default_cols(),
            scrollback: default_scrollback(),
        }
    }
}

impl TerminalSettings {
    fn merge(&mut self, other: TerminalSettings) {
        if other.rows != default_rows() {
            self.rows = other.rows;
        }
        if other.cols != default_cols() {
            self.cols = other.cols;
        }
        if other.scrollback != default_scrollback() {
            self.scrollback = other.scrollback;
        }
    }
}

// ============================================================================
// Defaults
// ============================================================================

fn default_version() -> u32 {
    1
}

fn default_idle_threshold_ms() -> u64 {
    8_000
}

fn default_idle_poll_interval_ms() -> u64 {
    1_000
}

fn default_rows() -> u16 {
    24
}

fn default_cols() -> u16 {
    80
}

fn default_scrollback() -> usize {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config: DeckConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.session.idle_threshold_ms, 8_000);
        assert_eq!(config.session.idle_poll_interval_ms, 1_000);
        assert_eq!(config.session.exit_policy, ExitPolicy::Complete);
        assert_eq!((config.terminal.rows, config.terminal.cols), (24, 80));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_project_overrides_global() {
        let global_dir = TempDir::new().unwrap();
        let project_dir = TempDir::new().unwrap();
        let global = JsonStore::new(global_dir.path());
        let project = JsonStore::new(project_dir.path());

        global
            .save(
                DECK_CONFIG_FILE,
                &serde_json::json!({
                    "defaultModel": "claude-sonnet-4-5",
                    "session": { "idleThresholdMs": 5000 }
                }),
            )
            .unwrap();
        project
            .save(
                DECK_CONFIG_FILE,
                &serde_json::json!({
                    "defaultModel": "gpt-5.2-codex",
                    "session": { "exitPolicy": "archive" }
                }),
            )
            .unwrap();

        let config = DeckConfig::load_from(Some(&global), Some(&project)).unwrap();
        assert_eq!(config.default_model.as_deref(), Some("gpt-5.2-codex"));
        assert_eq!(config.session.idle_threshold_ms, 5000);
        assert_eq!(config.session.exit_policy, ExitPolicy::Archive);
    }

    #[test]
    fn test_missing_files_yield_defaults() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path());
        let config = DeckConfig::load_from(Some(&store), None).unwrap();
        assert!(config.default_model.is_none());
    }

    #[test]
    fn test_saved_config_loads_back() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path());
        DeckConfig::new()
            .default_model("claude-haiku-4-5")
            .exit_policy(ExitPolicy::Archive)
            .save_to(&store)
            .unwrap();

        let raw = std::fs::read_to_string(store.file_path(DECK_CONFIG_FILE)).unwrap();
        assert!(raw.contains("\"exitPolicy\": \"archive\""));

        let config = DeckConfig::load_from(Some(&store), None).unwrap();
        assert_eq!(config.default_model.as_deref(), Some("claude-haiku-4-5"));
        assert_eq!(config.session.exit_policy, ExitPolicy::Archive);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = DeckConfig::new();
        config.session.idle_poll_interval_ms = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
