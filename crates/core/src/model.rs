use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::authorizer::Authorizer;

/// The sole mutable state of a prevalence engine.
///
/// A `Model` is an arbitrary, application-defined aggregate root. The
/// engine treats it as opaque except that it must be serializable
/// (for snapshotting) and deterministic under [`Command`](crate::Command)
/// application.
///
/// Both lifecycle hooks default to doing nothing; override
/// [`snapshot_restored`](Model::snapshot_restored) to re-wire transient
/// state (caches, non-serialized indexes) after a snapshot load, and
/// [`journal_restored`](Model::journal_restored) once replay of the
/// journal has caught the model up to its pre-crash state.
pub trait Model: Serialize + DeserializeOwned + Send + 'static {
    /// Called once, immediately after a snapshot has been deserialized
    /// into this model and installed, before any journal entries are
    /// replayed.
    fn snapshot_restored(&mut self) {}

    /// Called once restore has finished replaying every journal entry
    /// since the loaded snapshot.
    fn journal_restored(&mut self) {}

    /// Capability probe: a model may itself implement [`Authorizer`],
    /// in which case authorization decisions can depend on model
    /// state. Returning `None` (the default) tells the engine to fall
    /// back to the configured default authorizer.
    ///
    /// This is a runtime capability check rather than inheritance,
    /// per the dynamic-dispatch design note in the specification: a
    /// model that wants to double as an authorizer implements
    /// `Authorizer` and overrides this method to return `Some(self)`.
    fn as_authorizer(&self) -> Option<&dyn Authorizer> {
        None
    }
}
