//! Snapshot persistence for resume-after-restart.
//!
//! The engine holds the canonical `ProjectState` and snapshots the full
//! aggregate between stages; nothing is ever reconstructed from deltas.
//! Snapshots are pretty-printed JSON so humans can read them. A missing
//! or corrupt snapshot is not an error — it means "start fresh".

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::core::errors::{OrchestratorError, Result};
use crate::state::ProjectState;

pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Store rooted at `data_dir`; the snapshot lives at
    /// `{data_dir}/state.json`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: data_dir.into().join("state.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a consistent snapshot. Goes through a temp file + rename so
    /// a crash mid-write never corrupts the previous snapshot.
    pub async fn save(&self, state: &ProjectState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| OrchestratorError::io("create snapshot dir", e))?;
        }

        let json = serde_json::to_string_pretty(state).map_err(|e| {
            OrchestratorError::Snapshot {
                operation: "serialize",
                path: self.path.clone(),
                source: Box::new(e),
            }
        })?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await.map_err(|e| OrchestratorError::Snapshot {
            operation: "write",
            path: tmp.clone(),
            source: Box::new(e),
        })?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| OrchestratorError::Snapshot {
                operation: "rename",
                path: self.path.clone(),
                source: Box::new(e),
            })?;

        debug!(path = %self.path.display(), "state snapshot saved");
        Ok(())
    }

    /// Load the last snapshot, or `None` when there is nothing usable.
    pub async fn load(&self) -> Option<ProjectState> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(_) => {
                debug!(path = %self.path.display(), "no snapshot found, starting fresh");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(state) => {
                debug!(path = %self.path.display(), "state snapshot loaded");
                Some(state)
            }
            Err(err) => {
                warn!(path = %self.path.display(), %err, "corrupt snapshot, starting fresh");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Phase, Ticket, TicketKind};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn save_and_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());

        let mut state = ProjectState::new("demo", ".", "reqs");
        state.phase = Phase::Development;
        state.sprint_number = 3;
        state.tickets.push(Ticket::new("t1", "d", TicketKind::Chore));

        store.save(&state).await.unwrap();
        let restored = store.load().await.unwrap();
        assert_eq!(restored, state);
    }

    #[tokio::test]
    async fn missing_snapshot_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn corrupt_snapshot_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        tokio::fs::write(store.path(), "{not json").await.unwrap();
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn snapshot_is_human_readable_json() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        store
            .save(&ProjectState::new("demo", ".", "reqs"))
            .await
            .unwrap();
        let raw = tokio::fs::read_to_string(store.path()).await.unwrap();
        assert!(raw.contains("\"project_name\": \"demo\""));
        assert!(raw.contains("\"phase\": \"planning\""));
    }
}
