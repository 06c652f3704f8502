//! Shared types used across paasmon crates.

use serde::{Deserialize, Serialize};

/// Lifecycle state of an application as reported by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AppState {
    #[default]
    Started,
    Stopped,
}

/// Identity of a watched application.
///
/// Everything except `instances` is fixed for the lifetime of a watcher.
/// A rename or a move to another space produces a new watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    pub guid: String,
    pub name: String,
    /// Desired instance count.
    pub instances: u32,
    pub space_url: String,
    #[serde(default)]
    pub state: AppState,
}

impl App {
    pub fn is_started(&self) -> bool {
        self.state == AppState::Started
    }

    /// Whether `other` would export under different identity labels.
    pub fn labels_differ(&self, other: &App) -> bool {
        self.name != other.name || self.space_url != other.space_url
    }
}
