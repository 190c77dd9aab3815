use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::model::Model;

/// A read-only function over the model.
///
/// Queries are transient: they are never journaled and never appear
/// in a snapshot. Unlike [`Command`](crate::Command), a `Query` needs
/// no `Serialize` bound on itself — only its `Output` must round-trip
/// through the serializer, and only when `EngineConfiguration::clone_results`
/// is enabled.
pub trait Query<M: Model> {
    /// The value returned to the caller.
    type Output: Serialize + DeserializeOwned + Send + 'static;

    /// Reads `model` and produces a result. Runs under the engine's
    /// shared read lock; other queries may run concurrently, but no
    /// command can be mutating `model` at the same time.
    fn execute(&self, model: &M) -> Self::Output;
}
