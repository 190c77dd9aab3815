use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CommandError;
use crate::model::Model;

/// A deterministic, serializable mutation of the model.
///
/// A `Command` runs in two phases against a fixed `Model` type `M`:
///
/// - [`prepare`](Command::prepare) runs under the engine's upgrade
///   lock (concurrent readers still allowed). It must be
///   side-effect-free and may only validate against the model,
///   returning [`CommandError`] to refuse the operation cleanly with
///   no mutation to roll back.
/// - [`execute`](Command::execute) runs under the engine's exclusive
///   write lock, immediately after a successful `prepare`. It may
///   mutate `model` and must be total given that `prepare` succeeded:
///   any error it returns is treated as a partial mutation that the
///   engine rolls back by reloading from the last snapshot and
///   replaying the journal (which does not include this command,
///   since it had not yet been appended).
///
/// A single `Engine<M, C>` is generic over exactly one command type
/// `C` per model — in practice a user-defined enum with one variant
/// per logical command, since the journal stores a single homogeneous
/// (but internally polymorphic) sequence of `C` values. This is the
/// idiomatic translation of "many Command subclasses sharing one
/// abstract base class, polymorphically serialized".
pub trait Command<M: Model>: Serialize + DeserializeOwned + Clone + Send + Sync + Debug + 'static {
    /// The value returned to the caller on success.
    type Output: Serialize + DeserializeOwned + Send + 'static;

    /// Side-effect-free validation against the model. Runs under the
    /// upgrade lock; may read `model` but must not mutate it. The
    /// default accepts every command.
    fn prepare(&self, _model: &M) -> Result<(), CommandError> {
        Ok(())
    }

    /// Applies the mutation. Runs under the exclusive write lock,
    /// immediately after a successful `prepare`.
    fn execute(&self, model: &mut M) -> Result<Self::Output, CommandError>;

    /// Re-applies this command during journal replay.
    ///
    /// Semantically equivalent to `execute`, but called with no
    /// caller waiting on the result and no journal append to follow.
    /// Override this when `execute` has a side effect that is not
    /// deterministic on replay (e.g. it reads a wall clock or calls
    /// out to the network) — the override can perform the
    /// deterministic part only. The default forwards to `execute` and
    /// discards the output, propagating any error: a command that
    /// throws during replay aborts engine open (`ReplayFailed`), since
    /// skipping it would violate deterministic replay.
    fn redo(&self, model: &mut M) -> Result<(), CommandError> {
        self.execute(model).map(|_| ())
    }
}
