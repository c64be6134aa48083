//! Load progress observation.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// States a load passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    Staging,
    TableCheck,
    Create,
    Skip,
    DropRecreate,
    Loading,
    Verify,
    Done,
    Failed,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Staging => "staging",
            LoadState::TableCheck => "table_check",
            LoadState::Create => "create",
            LoadState::Skip => "skip",
            LoadState::DropRecreate => "drop_recreate",
            LoadState::Loading => "loading",
            LoadState::Verify => "verify",
            LoadState::Done => "done",
            LoadState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadState::Done | LoadState::Failed)
    }

    /// Whether `next` may follow this state. `Failed` may follow any
    /// non-terminal state.
    pub fn can_transition_to(&self, next: LoadState) -> bool {
        use LoadState::*;
        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Staging, TableCheck)
                | (TableCheck, Create | Skip | DropRecreate)
                | (Create | Skip | DropRecreate, Loading)
                | (Loading, Verify)
                | (Verify, Done)
        )
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives state transitions and warnings from a running load.
pub trait LoadObserver: Send + Sync {
    fn on_transition(&self, table: &str, from: Option<LoadState>, to: LoadState);

    fn on_warning(&self, table: &str, message: &str);
}

/// Observer emitting `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl LoadObserver for TracingObserver {
    fn on_transition(&self, table: &str, from: Option<LoadState>, to: LoadState) {
        match from {
            Some(from) => info!(table, %from, %to, "Load state changed"),
            None => info!(table, %to, "Load started"),
        }
    }

    fn on_warning(&self, table: &str, message: &str) {
        warn!(table, "{message}");
    }
}
