use std::sync::Arc;

use parking_lot::Mutex;

use prevalence_core::{CallerIdentity, Command, CommandError, Error, Model, OperationType, Query, Result};
use prevalence_journal::CommandJournal;
use prevalence_lock::RwUpgradeLock;
use prevalence_serializer::Serializer;
use prevalence_storage::{JournalSegmentInfo, Storage};

use crate::background::spawn_after_restore;
use crate::config::{EngineConfiguration, SnapshotBehavior};
use crate::restore::restore;
use crate::state::{Lifecycle, LifecycleState};

/// How `Engine::open` should obtain the model before publishing the
/// engine. Internal — callers go through `EngineBuilder`.
pub(crate) enum OpenMode<M> {
    /// Storage must already exist.
    Load,
    /// Storage must not already exist; `constructor` builds the
    /// initial model.
    Create(Box<dyn FnOnce() -> M>),
    /// Load if storage exists, otherwise behave like `Create`.
    LoadOrCreate(Box<dyn FnOnce() -> M>),
}

/// Composes a [`Model`], one [`Command`](prevalence_core::Command) sum
/// type `C`, a [`Serializer`] `S`, and the `Storage`/`CommandJournal`/
/// `Authorizer` collaborators into a running prevalent-system engine.
///
/// `model` is guarded by a plain `parking_lot::Mutex` in addition to
/// `lock`: every access path already holds the appropriate
/// `RwUpgradeLock` guard before touching the model, so the mutex is
/// never contended in practice. It exists purely to give Rust's
/// aliasing rules a legal way to hand out `&mut M` during
/// `execute`/`redo` without `unsafe` — the actual exclusion work is
/// done by `lock`.
pub struct Engine<M, C, S = prevalence_serializer::RmpSerializer>
where
    M: Model,
    C: Command<M>,
    S: Serializer,
{
    model: Arc<Mutex<M>>,
    lock: Arc<RwUpgradeLock>,
    storage: Arc<dyn Storage>,
    journal: Arc<dyn CommandJournal>,
    authorizer: Arc<dyn prevalence_core::Authorizer>,
    serializer: Arc<S>,
    config: EngineConfiguration,
    identity_provider: Option<Arc<dyn Fn() -> CallerIdentity + Send + Sync>>,
    lifecycle: Lifecycle,
    _marker: std::marker::PhantomData<C>,
}

// Kept in a separate impl block that fixes `S = RmpSerializer` rather
// than folding these into the `impl<M, C, S>` block below: `S` plays
// no part in any of these four signatures, so leaving them generic
// over it would force every call site to pin `S` with a turbofish
// just to satisfy the compiler, for a parameter that can only ever be
// `RmpSerializer` here anyway (mirroring `HashMap::new()`'s own split
// from `HashMap<K, V, S>`'s general impl).
impl<M, C> Engine<M, C, prevalence_serializer::RmpSerializer>
where
    M: Model,
    C: Command<M>,
{
    /// Opens an existing location. Shorthand for
    /// `EngineBuilder::new().location(config.location).load()` built
    /// from an already-assembled [`EngineConfiguration`].
    pub fn load(config: EngineConfiguration) -> Result<Self> {
        crate::builder::EngineBuilder::new()
            .location(config.location)
            .clone_commands(config.clone_commands)
            .clone_results(config.clone_results)
            .snapshot_behavior(config.snapshot_behavior)
            .lock_timeout(config.lock_timeout)
            .load()
    }

    /// Requires that storage does not already exist; writes an
    /// initial snapshot of `initial_model`, then loads. Shorthand
    /// built from an already-assembled [`EngineConfiguration`].
    pub fn create(initial_model: M, config: EngineConfiguration) -> Result<Self> {
        crate::builder::EngineBuilder::new()
            .location(config.location)
            .clone_commands(config.clone_commands)
            .clone_results(config.clone_results)
            .snapshot_behavior(config.snapshot_behavior)
            .lock_timeout(config.lock_timeout)
            .create(initial_model)
    }

    /// Loads if storage exists, otherwise creates using `constructor()`.
    /// Shorthand built from an already-assembled [`EngineConfiguration`].
    pub fn load_or_create(constructor: impl FnOnce() -> M + 'static, config: EngineConfiguration) -> Result<Self> {
        crate::builder::EngineBuilder::new()
            .location(config.location)
            .clone_commands(config.clone_commands)
            .clone_results(config.clone_results)
            .snapshot_behavior(config.snapshot_behavior)
            .lock_timeout(config.lock_timeout)
            .load_or_create(constructor)
    }

    /// Starts a fluent [`EngineBuilder`] for full control over
    /// collaborator wiring.
    pub fn builder() -> crate::builder::EngineBuilder<M, C, prevalence_serializer::RmpSerializer> {
        crate::builder::EngineBuilder::new()
    }
}

impl<M, C, S> Engine<M, C, S>
where
    M: Model,
    C: Command<M>,
    S: Serializer + 'static,
{
    pub(crate) fn open(
        config: EngineConfiguration,
        storage: Arc<dyn Storage>,
        journal: Arc<dyn CommandJournal>,
        default_authorizer: Arc<dyn prevalence_core::Authorizer>,
        serializer: S,
        identity_provider: Option<Arc<dyn Fn() -> CallerIdentity + Send + Sync>>,
        mode: OpenMode<M>,
    ) -> Result<Self> {
        let serializer = Arc::new(serializer);

        if storage.exists() {
            storage.verify_can_load()?;
        }

        let constructor: Option<Box<dyn FnOnce() -> M>> = match mode {
            OpenMode::Load => None,
            OpenMode::Create(ctor) => {
                if storage.exists() {
                    return Err(Error::AlreadyExists);
                }
                let initial = ctor();
                let bytes = serializer.serialize(&initial)?;
                storage.create(&bytes)?;
                None
            }
            OpenMode::LoadOrCreate(ctor) => {
                if !storage.exists() {
                    let initial = ctor();
                    let bytes = serializer.serialize(&initial)?;
                    storage.create(&bytes)?;
                }
                None
            }
        };

        let model = restore::<M, C, S>(storage.as_ref(), journal.as_ref(), serializer.as_ref(), constructor)?;
        let uses_model_authorizer = model.as_authorizer().is_some();

        journal.open()?;

        let model = Arc::new(Mutex::new(model));
        // Resolved once here, per spec.md §4.5: if the model itself
        // implements the authorizer capability, use it — wrapped so it
        // can be held as `Arc<dyn Authorizer>` alongside the model it
        // borrows from on every check, since the model's final address
        // isn't stable until it is boxed into the engine above.
        let authorizer: Arc<dyn prevalence_core::Authorizer> = if uses_model_authorizer {
            Arc::new(ModelBackedAuthorizer {
                model: Arc::clone(&model),
            })
        } else {
            default_authorizer
        };

        let lock = Arc::new(RwUpgradeLock::new());
        let lifecycle = Lifecycle::new();

        let engine = Engine {
            model,
            lock,
            storage,
            journal,
            authorizer,
            serializer,
            config,
            identity_provider,
            lifecycle,
            _marker: std::marker::PhantomData,
        };

        if engine.config.snapshot_behavior == SnapshotBehavior::AfterRestore {
            spawn_after_restore::<M, C, S>(
                Arc::clone(&engine.lock),
                Arc::clone(&engine.model),
                Arc::clone(&engine.storage),
                Arc::clone(&engine.journal),
                Arc::clone(&engine.serializer),
                engine.config.lock_timeout,
            );
        }

        engine.lifecycle.set(LifecycleState::Running);
        Ok(engine)
    }

    fn throw_if_disposed(&self) -> Result<()> {
        if self.lifecycle.get() == LifecycleState::Closed {
            return Err(Error::Disposed);
        }
        Ok(())
    }

    fn caller_identity(&self) -> CallerIdentity {
        match &self.identity_provider {
            Some(provider) => provider(),
            None => CallerIdentity::anonymous(),
        }
    }

    /// Implements `spec.md` §4.6.2: authorize, take the read lock,
    /// evaluate `query`, optionally clone the result, release.
    pub fn execute_query<Q: Query<M>>(&self, query: Q) -> Result<Q::Output> {
        self.throw_if_disposed()?;
        let caller = self.caller_identity();
        let type_name = std::any::type_name::<Q>();
        if !self.authorizer.allows(OperationType::Query(type_name), &caller) {
            return Err(Error::Unauthorized(type_name.to_string()));
        }

        let guard = match self.lock.enter_read(self.config.lock_timeout) {
            Ok(guard) => guard,
            Err(err) => {
                self.throw_if_disposed()?;
                return Err(err.into());
            }
        };

        let result = {
            let model = self.model.lock();
            query.execute(&model)
        };
        drop(guard);

        if self.config.clone_results {
            Ok(self.serializer.clone_value(&result)?)
        } else {
            Ok(result)
        }
    }

    /// Implements `spec.md` §4.6.3: authorize, optionally clone the
    /// command, take the upgrade lock, `prepare`, promote to the write
    /// lock, `execute`, append to the journal, release. A deliberate
    /// refusal (`Error::CommandRefused`) performs no rollback; any
    /// other execution failure triggers a full restore and surfaces
    /// as `Error::CommandFailed`.
    pub fn execute_command(&self, command: C) -> Result<C::Output> {
        self.throw_if_disposed()?;
        let caller = self.caller_identity();
        let type_name = std::any::type_name::<C>();
        if !self.authorizer.allows(OperationType::Command(type_name), &caller) {
            return Err(Error::Unauthorized(type_name.to_string()));
        }

        let original_for_journal = command.clone();
        let command = if self.config.clone_commands {
            self.serializer.clone_value(&command)?
        } else {
            command
        };

        let upgrade_guard = match self.lock.enter_upgrade(self.config.lock_timeout) {
            Ok(guard) => guard,
            Err(err) => {
                self.throw_if_disposed()?;
                return Err(err.into());
            }
        };

        let prepare_result = {
            let model = self.model.lock();
            command.prepare(&model)
        };
        if let Err(err) = prepare_result {
            drop(upgrade_guard);
            return Err(Error::CommandRefused(err));
        }

        let write_guard = match upgrade_guard.enter_write(self.config.lock_timeout) {
            Ok(guard) => guard,
            Err(err) => {
                self.throw_if_disposed()?;
                return Err(err.into());
            }
        };

        let execute_result = {
            let mut model = self.model.lock();
            command.execute(&mut model)
        };

        let result = match execute_result {
            Ok(result) => result,
            Err(err) => {
                self.rollback_after_failed_command();
                drop(write_guard);
                return Err(Error::CommandFailed {
                    message: "command execution failed, state rolled back".to_string(),
                    cause: Box::new(err),
                });
            }
        };

        let journal_payload = self.serializer.serialize(&original_for_journal)?;
        let append_result = self.journal.append(&journal_payload);
        drop(write_guard);
        append_result?;

        if self.config.clone_results {
            Ok(self.serializer.clone_value(&result)?)
        } else {
            Ok(result)
        }
    }

    fn rollback_after_failed_command(&self) {
        match restore::<M, C, S>(
            self.storage.as_ref(),
            self.journal.as_ref(),
            self.serializer.as_ref(),
            None,
        ) {
            Ok(fresh_model) => {
                *self.model.lock() = fresh_model;
            }
            Err(err) => {
                tracing::error!(?err, "rollback restore failed after command failure");
            }
        }
    }

    /// Implements `spec.md` §4.6.4: take the read lock (so the model
    /// cannot change mid-serialize), write the snapshot, rotate the
    /// journal to a fresh segment tied to it, release. Snapshots may
    /// run concurrently with queries but block commands.
    pub fn create_snapshot(&self, name: Option<&str>) -> Result<()> {
        self.throw_if_disposed()?;
        let guard = self.lock.enter_read(self.config.lock_timeout)?;
        let bytes = {
            let model = self.model.lock();
            self.serializer.serialize(&*model)?
        };
        // The snapshot must be tagged with the segment the journal
        // resumes from *after* rotation, not the one active while it
        // was taken — otherwise replay would re-apply every command
        // already folded into the snapshot bytes. Segment numbering is
        // a single-writer monotonic sequence, so the next id is
        // predictable without having created the segment yet; per
        // spec.md §4.6.4 the write must still precede the rotation.
        let segment = JournalSegmentInfo {
            segment_id: self.journal.current_segment() + 1,
        };
        self.storage.write_snapshot(&bytes, name.unwrap_or("auto"), segment)?;
        self.journal.create_next_segment()?;
        drop(guard);
        Ok(())
    }

    /// Seals the engine. If `SnapshotBehavior::OnShutdown` is
    /// configured, takes a snapshot (under the upgrade lock, so
    /// readers still drain normally) before sealing the journal under
    /// the write lock. A second call is a no-op; further operations
    /// fail with `Error::Disposed`.
    pub fn close(&self) -> Result<()> {
        if !self.lifecycle.begin_closing() {
            return Ok(());
        }

        if self.config.snapshot_behavior == SnapshotBehavior::OnShutdown {
            let upgrade_guard = self.lock.enter_upgrade(self.config.lock_timeout)?;
            let bytes = {
                let model = self.model.lock();
                self.serializer.serialize(&*model)?
            };
            let segment = JournalSegmentInfo {
                segment_id: self.journal.current_segment() + 1,
            };
            self.storage.write_snapshot(&bytes, "auto", segment)?;
            self.journal.create_next_segment()?;
            let write_guard = upgrade_guard.enter_write(self.config.lock_timeout)?;
            self.journal.close()?;
            drop(write_guard);
        } else {
            let _write_guard = self
                .lock
                .enter_upgrade(self.config.lock_timeout)?
                .enter_write(self.config.lock_timeout)?;
            self.journal.close()?;
        }

        self.lifecycle.set(LifecycleState::Closed);
        Ok(())
    }
}

impl<M, C, S> Drop for Engine<M, C, S>
where
    M: Model,
    C: Command<M>,
    S: Serializer,
{
    fn drop(&mut self) {
        if self.lifecycle.get() != LifecycleState::Closed {
            if let Err(err) = self.close() {
                tracing::warn!(?err, "error closing engine during drop");
            }
        }
    }
}

/// Forwards authorization decisions to a model that implements
/// `Authorizer` itself, resolved once at construction per `spec.md`
/// §4.5 ("if the Model itself implements the authorizer capability,
/// use it"). Holds the same `Arc<Mutex<M>>` the engine already owns
/// rather than a raw borrow, since the model's address is not stable
/// until it is boxed into the engine.
struct ModelBackedAuthorizer<M> {
    model: Arc<Mutex<M>>,
}

impl<M: Model> prevalence_core::Authorizer for ModelBackedAuthorizer<M> {
    fn allows(&self, operation: OperationType<'_>, caller: &CallerIdentity) -> bool {
        let model = self.model.lock();
        match model.as_authorizer() {
            Some(authorizer) => authorizer.allows(operation, caller),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Counter {
        n: i64,
    }
    impl Model for Counter {}

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum CounterCommand {
        Increment { by: i64 },
        SetThenFail { value: i64 },
        Refuse,
    }

    impl Command<Counter> for CounterCommand {
        type Output = i64;

        fn prepare(&self, _model: &Counter) -> std::result::Result<(), CommandError> {
            if matches!(self, CounterCommand::Refuse) {
                return Err(CommandError::new("invalid"));
            }
            Ok(())
        }

        fn execute(&self, model: &mut Counter) -> std::result::Result<Self::Output, CommandError> {
            match self {
                CounterCommand::Increment { by } => {
                    model.n += by;
                    Ok(model.n)
                }
                CounterCommand::SetThenFail { value } => {
                    model.n = *value;
                    Err(CommandError::new("boom"))
                }
                CounterCommand::Refuse => unreachable!("prepare already refused"),
            }
        }
    }

    struct GetN;
    impl Query<Counter> for GetN {
        type Output = i64;
        fn execute(&self, model: &Counter) -> Self::Output {
            model.n
        }
    }

    #[test]
    fn create_execute_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfiguration::new(dir.path());
        {
            let engine: Engine<Counter, CounterCommand, prevalence_serializer::RmpSerializer> =
                Engine::create(Counter { n: 0 }, config.clone()).unwrap();
            let result = engine.execute_command(CounterCommand::Increment { by: 3 }).unwrap();
            assert_eq!(result, 3);
            engine.close().unwrap();
        }
        let engine: Engine<Counter, CounterCommand, prevalence_serializer::RmpSerializer> =
            Engine::load(config).unwrap();
        let n = engine.execute_query(GetN).unwrap();
        assert_eq!(n, 3);
    }

    #[test]
    fn rollback_on_execute_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfiguration::new(dir.path());
        let engine: Engine<Counter, CounterCommand, prevalence_serializer::RmpSerializer> =
            Engine::create(Counter { n: 5 }, config).unwrap();

        let result = engine.execute_command(CounterCommand::SetThenFail { value: 99 });
        assert!(matches!(result, Err(Error::CommandFailed { .. })));

        let n = engine.execute_query(GetN).unwrap();
        assert_eq!(n, 5);
    }

    #[test]
    fn user_refusal_is_not_rolled_back_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfiguration::new(dir.path());
        let engine: Engine<Counter, CounterCommand, prevalence_serializer::RmpSerializer> =
            Engine::create(Counter { n: 5 }, config).unwrap();

        let result = engine.execute_command(CounterCommand::Refuse);
        assert!(matches!(result, Err(Error::CommandRefused(_))));

        let n = engine.execute_query(GetN).unwrap();
        assert_eq!(n, 5);
    }

    #[test]
    fn snapshot_does_not_cause_double_replay_on_reopen() {
        // Regression test for a rotation/segment-tagging bug: the
        // snapshot must be tagged with the segment the journal
        // resumes from *after* rotation, never the one active while
        // it was taken, or replay re-applies commands already folded
        // into the snapshot bytes.
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfiguration::new(dir.path());
        {
            let engine: Engine<Counter, CounterCommand, prevalence_serializer::RmpSerializer> =
                Engine::create(Counter { n: 0 }, config.clone()).unwrap();
            engine.execute_command(CounterCommand::Increment { by: 3 }).unwrap();
            engine.create_snapshot(None).unwrap();
            engine.execute_command(CounterCommand::Increment { by: 2 }).unwrap();
            engine.close().unwrap();
        }
        let engine: Engine<Counter, CounterCommand, prevalence_serializer::RmpSerializer> =
            Engine::load(config).unwrap();
        let n = engine.execute_query(GetN).unwrap();
        assert_eq!(n, 5, "snapshot command must not be replayed a second time");
    }

    #[test]
    fn create_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfiguration::new(dir.path());
        let _engine: Engine<Counter, CounterCommand, prevalence_serializer::RmpSerializer> =
            Engine::create(Counter { n: 0 }, config.clone()).unwrap();
        let second = Engine::<Counter, CounterCommand, prevalence_serializer::RmpSerializer>::create(
            Counter { n: 0 },
            config,
        );
        assert!(matches!(second, Err(Error::AlreadyExists)));
    }

    #[test]
    fn disposed_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfiguration::new(dir.path());
        let engine: Engine<Counter, CounterCommand, prevalence_serializer::RmpSerializer> =
            Engine::create(Counter { n: 0 }, config).unwrap();
        engine.close().unwrap();
        let result = engine.execute_query(GetN);
        assert!(matches!(result, Err(Error::Disposed)));
    }
}
