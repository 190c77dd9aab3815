use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use prevalence_authorizer::AllowAll;
use prevalence_core::{CallerIdentity, Command, Model, Result};
use prevalence_journal::{CommandJournal, SegmentedFileJournal};
use prevalence_serializer::{RmpSerializer, Serializer};
use prevalence_storage::{FileStorage, Storage};

use crate::config::{EngineConfiguration, SnapshotBehavior};
use crate::engine::{Engine, OpenMode};

/// Fluent configuration for opening an [`Engine`].
///
/// Each of the specification's five `*Factory` config fields
/// (`serializerFactory`, `storageFactory`, `lockFactory`,
/// `journalFactory`, `authorizerFactory`) becomes either a constructor
/// argument here — `Storage`/`CommandJournal`/`Authorizer`, supplied
/// as trait objects, since they are object-safe — or a generic type
/// parameter on `Engine` itself (`Serializer`). There is no
/// `lockFactory`: `RwUpgradeLock` is a concrete type, since the
/// specification names exactly one lock strategy and nothing in
/// `spec.md` calls for swapping it.
pub struct EngineBuilder<M, C, S = RmpSerializer>
where
    M: Model,
    C: Command<M>,
    S: Serializer,
{
    location: Option<PathBuf>,
    clone_commands: bool,
    clone_results: bool,
    snapshot_behavior: SnapshotBehavior,
    lock_timeout: Duration,
    storage: Option<Arc<dyn Storage>>,
    journal: Option<Arc<dyn CommandJournal>>,
    authorizer: Option<Arc<dyn prevalence_core::Authorizer>>,
    serializer: S,
    identity_provider: Option<Arc<dyn Fn() -> CallerIdentity + Send + Sync>>,
    _marker: PhantomData<(M, C)>,
}

impl<M, C> EngineBuilder<M, C, RmpSerializer>
where
    M: Model,
    C: Command<M>,
{
    /// Starts a builder with the engine's defaults: `RmpSerializer`,
    /// `FileStorage`/`SegmentedFileJournal` rooted at `.location(..)`,
    /// `AllowAll` authorization, a 30 second lock timeout, anonymous
    /// caller identity, and no automatic cloning or snapshotting.
    pub fn new() -> Self {
        Self {
            location: None,
            clone_commands: false,
            clone_results: false,
            snapshot_behavior: SnapshotBehavior::None,
            lock_timeout: Duration::from_secs(30),
            storage: None,
            journal: None,
            authorizer: None,
            serializer: RmpSerializer,
            identity_provider: None,
            _marker: PhantomData,
        }
    }
}

impl<M, C> Default for EngineBuilder<M, C, RmpSerializer>
where
    M: Model,
    C: Command<M>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M, C, S> EngineBuilder<M, C, S>
where
    M: Model,
    C: Command<M>,
    S: Serializer,
{
    /// Sets the backing-store location. Mandatory unless both
    /// `.storage(..)` and `.journal(..)` are supplied directly.
    pub fn location(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// See `EngineConfiguration::clone_commands`.
    pub fn clone_commands(mut self, enabled: bool) -> Self {
        self.clone_commands = enabled;
        self
    }

    /// See `EngineConfiguration::clone_results`.
    pub fn clone_results(mut self, enabled: bool) -> Self {
        self.clone_results = enabled;
        self
    }

    /// See [`SnapshotBehavior`].
    pub fn snapshot_behavior(mut self, behavior: SnapshotBehavior) -> Self {
        self.snapshot_behavior = behavior;
        self
    }

    /// See `EngineConfiguration::lock_timeout`.
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Overrides the default `FileStorage` with a caller-supplied
    /// implementation.
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Overrides the default `SegmentedFileJournal` with a
    /// caller-supplied implementation.
    pub fn journal(mut self, journal: Arc<dyn CommandJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Overrides the default `AllowAll` authorizer. Ignored if the
    /// model itself implements `Authorizer` and returns `Some` from
    /// `as_authorizer` — the model's capability takes precedence, per
    /// `spec.md` §4.5.
    pub fn authorizer(mut self, authorizer: Arc<dyn prevalence_core::Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    /// Supplies the mechanism the engine uses to resolve the current
    /// caller's identity on every `Execute` call. Defaults to always
    /// returning `CallerIdentity::anonymous()`.
    pub fn identity_provider(
        mut self,
        provider: Arc<dyn Fn() -> CallerIdentity + Send + Sync>,
    ) -> Self {
        self.identity_provider = Some(provider);
        self
    }

    /// Swaps the serializer type. Consumes `self` because the builder
    /// is generic over `S`; the returned builder carries the new type
    /// parameter.
    pub fn serializer<S2: Serializer>(self, serializer: S2) -> EngineBuilder<M, C, S2> {
        EngineBuilder {
            location: self.location,
            clone_commands: self.clone_commands,
            clone_results: self.clone_results,
            snapshot_behavior: self.snapshot_behavior,
            lock_timeout: self.lock_timeout,
            storage: self.storage,
            journal: self.journal,
            authorizer: self.authorizer,
            serializer,
            identity_provider: self.identity_provider,
            _marker: PhantomData,
        }
    }

    fn build_config(&self) -> Result<EngineConfiguration> {
        let location = self
            .location
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(EngineConfiguration {
            location,
            clone_commands: self.clone_commands,
            clone_results: self.clone_results,
            snapshot_behavior: self.snapshot_behavior,
            lock_timeout: self.lock_timeout,
        })
    }

    fn resolve_collaborators(
        &self,
        config: &EngineConfiguration,
    ) -> Result<(Arc<dyn Storage>, Arc<dyn CommandJournal>)> {
        let storage = self
            .storage
            .clone()
            .unwrap_or_else(|| Arc::new(FileStorage::new(&config.location)));
        let journal = match &self.journal {
            Some(j) => j.clone(),
            None => Arc::new(SegmentedFileJournal::new(config.location.join("journal"))?) as Arc<dyn CommandJournal>,
        };
        Ok((storage, journal))
    }

    fn resolve_authorizer(&self) -> Arc<dyn prevalence_core::Authorizer> {
        self.authorizer
            .clone()
            .unwrap_or_else(|| Arc::new(AllowAll) as Arc<dyn prevalence_core::Authorizer>)
    }

    /// Opens an existing location. Fails with `Error::IncompatibleStorage`
    /// if storage is absent or fails `verify_can_load`.
    pub fn load(self) -> Result<Engine<M, C, S>> {
        let config = self.build_config()?;
        let (storage, journal) = self.resolve_collaborators(&config)?;
        let authorizer = self.resolve_authorizer();
        Engine::open(
            config,
            storage,
            journal,
            authorizer,
            self.serializer,
            self.identity_provider.clone(),
            OpenMode::Load,
        )
    }

    /// Requires that storage does not already exist; writes an
    /// initial snapshot of `initial_model`, then loads.
    pub fn create(self, initial_model: M) -> Result<Engine<M, C, S>> {
        let config = self.build_config()?;
        let (storage, journal) = self.resolve_collaborators(&config)?;
        let authorizer = self.resolve_authorizer();
        Engine::open(
            config,
            storage,
            journal,
            authorizer,
            self.serializer,
            self.identity_provider.clone(),
            OpenMode::Create(Box::new(move || initial_model)),
        )
    }

    /// Loads if storage already exists, otherwise creates using
    /// `constructor()`.
    pub fn load_or_create(self, constructor: impl FnOnce() -> M + 'static) -> Result<Engine<M, C, S>> {
        let config = self.build_config()?;
        let (storage, journal) = self.resolve_collaborators(&config)?;
        let authorizer = self.resolve_authorizer();
        Engine::open(
            config,
            storage,
            journal,
            authorizer,
            self.serializer,
            self.identity_provider.clone(),
            OpenMode::LoadOrCreate(Box::new(constructor)),
        )
    }
}
