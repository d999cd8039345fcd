/// Reconciliation settings shared by the library and the CLI.
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::parser::{DEFAULT_BOARD_KEY, DEFAULT_WORKFLOW_WORDS};
use crate::types::{MarkerPolicy, PolicyEntry, DEFAULT_COMPLETE_MARKER, DEFAULT_INCOMPLETE_MARKER};

/// Upper bound applied to every delay setting (one hour).
pub const MAX_DELAY_MS: u64 = 3_600_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// Column -> marker rules, in order. Matching is case-insensitive.
    #[serde(default)]
    pub policy: Vec<PolicyEntry>,
    #[serde(default = "default_incomplete_marker")]
    pub incomplete_marker: String,
    #[serde(default = "default_complete_marker")]
    pub complete_marker: String,
    /// Revert custom -> complete marker regressions made by external editors.
    #[serde(default = "default_true")]
    pub protect_normalization: bool,
    /// How long a document ignores change notifications after our own write.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Minimum delay between two writes to the same document.
    #[serde(default = "default_min_write_interval_ms")]
    pub min_write_interval_ms: u64,
    /// Soft deadline for the host to reflect a write.
    #[serde(default = "default_index_wait_ms")]
    pub index_wait_ms: u64,
    #[serde(default = "default_board_key")]
    pub board_key: String,
    #[serde(default = "default_workflow_words")]
    pub workflow_words: Vec<String>,
}

fn default_incomplete_marker() -> String {
    DEFAULT_INCOMPLETE_MARKER.to_string()
}

fn default_complete_marker() -> String {
    DEFAULT_COMPLETE_MARKER.to_string()
}

fn default_true() -> bool {
    true
}

fn default_cooldown_ms() -> u64 {
    300
}

fn default_min_write_interval_ms() -> u64 {
    1000
}

fn default_index_wait_ms() -> u64 {
    1000
}

fn default_board_key() -> String {
    DEFAULT_BOARD_KEY.to_string()
}

fn default_workflow_words() -> Vec<String> {
    DEFAULT_WORKFLOW_WORDS.iter().map(|w| w.to_string()).collect()
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            policy: Vec::new(),
            incomplete_marker: default_incomplete_marker(),
            complete_marker: default_complete_marker(),
            protect_normalization: default_true(),
            cooldown_ms: default_cooldown_ms(),
            min_write_interval_ms: default_min_write_interval_ms(),
            index_wait_ms: default_index_wait_ms(),
            board_key: default_board_key(),
            workflow_words: default_workflow_words(),
        }
    }
}

impl SyncSettings {
    /// Build the marker policy described by these settings.
    pub fn marker_policy(&self) -> MarkerPolicy {
        let mut policy = MarkerPolicy::new(&self.incomplete_marker, &self.complete_marker);
        for entry in &self.policy {
            policy.set(&entry.column, &entry.marker);
        }
        policy
    }

    pub fn cooldown(&self) -> Duration {
        clamped(self.cooldown_ms)
    }

    pub fn min_write_interval(&self) -> Duration {
        clamped(self.min_write_interval_ms)
    }

    pub fn index_wait(&self) -> Duration {
        clamped(self.index_wait_ms)
    }
}

fn clamped(ms: u64) -> Duration {
    Duration::from_millis(ms.min(MAX_DELAY_MS))
}
