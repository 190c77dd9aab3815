use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Governs when the engine takes automatic snapshots, beyond whatever
/// explicit `create_snapshot` calls the caller makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotBehavior {
    /// No automatic snapshots; the caller drives entirely.
    None,
    /// After a successful open, take a snapshot named `"auto"` on a
    /// background worker. See [`crate::Engine::load`] for the exact
    /// handshake that avoids racing the caller's first command.
    AfterRestore,
    /// On `close()`, take a snapshot named `"auto"` before sealing the
    /// journal.
    OnShutdown,
}

impl Default for SnapshotBehavior {
    fn default() -> Self {
        SnapshotBehavior::None
    }
}

/// The engine's configuration, fixed at construction time (I6): once
/// an `Engine` is built, nothing mutates this value again. It is a
/// plain, cloneable data struct — wiring up the collaborator instances
/// (storage, journal, authorizer) is [`crate::EngineBuilder`]'s job,
/// not this struct's, mirroring the teacher's split between a scalar
/// options struct and the builder that wires up the running database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfiguration {
    /// Backing-store location. Mandatory.
    pub location: PathBuf,
    /// Clone each command before `execute` so in-place mutation inside
    /// a command's fields (if any) does not affect the copy already
    /// handed to the journal.
    pub clone_commands: bool,
    /// Deep-clone query and command return values before returning
    /// them, so the caller cannot retain a reference into live model
    /// state.
    pub clone_results: bool,
    /// Automatic snapshot policy.
    pub snapshot_behavior: SnapshotBehavior,
    /// Maximum wait on any lock acquisition before failing with
    /// `Error::Timeout`.
    pub lock_timeout: Duration,
}

impl EngineConfiguration {
    /// Starts a configuration rooted at `location` with the engine's
    /// defaults: no automatic cloning, no automatic snapshots, a 30
    /// second lock timeout.
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            clone_commands: false,
            clone_results: false,
            snapshot_behavior: SnapshotBehavior::None,
            lock_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_conservative() {
        let config = EngineConfiguration::new("/tmp/db");
        assert!(!config.clone_commands);
        assert!(!config.clone_results);
        assert_eq!(config.snapshot_behavior, SnapshotBehavior::None);
    }
}
