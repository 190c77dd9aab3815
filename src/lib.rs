//! # prevalence
//!
//! An embedded, in-memory object database engine built on the
//! *prevalent system* pattern: your application's entire state lives
//! in one in-process object graph (the [`Model`]), and durability
//! comes from journaling the deterministic [`Command`]s that mutate it,
//! periodically checkpointed by snapshots. On restart, the latest
//! snapshot is loaded and the journal entries written since are
//! replayed to reconstruct the exact pre-crash state.
//!
//! Reads are expressed as [`Query`]s, which never mutate the model and
//! are never journaled.
//!
//! # Quick start
//!
//! ```no_run
//! use prevalence::{Command, CommandError, Engine, EngineConfiguration, Model, Query};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Counter {
//!     n: i64,
//! }
//! impl Model for Counter {}
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! enum CounterCommand {
//!     Increment { by: i64 },
//! }
//!
//! impl Command<Counter> for CounterCommand {
//!     type Output = i64;
//!     fn execute(&self, model: &mut Counter) -> Result<Self::Output, CommandError> {
//!         match self {
//!             CounterCommand::Increment { by } => {
//!                 model.n += by;
//!                 Ok(model.n)
//!             }
//!         }
//!     }
//! }
//!
//! struct GetN;
//! impl Query<Counter> for GetN {
//!     type Output = i64;
//!     fn execute(&self, model: &Counter) -> i64 {
//!         model.n
//!     }
//! }
//!
//! fn main() -> prevalence::Result<()> {
//!     let config = EngineConfiguration::new("./my-db");
//!     let engine: Engine<Counter, CounterCommand> =
//!         Engine::load_or_create(|| Counter { n: 0 }, config)?;
//!
//!     let total = engine.execute_command(CounterCommand::Increment { by: 3 })?;
//!     assert_eq!(total, engine.execute_query(GetN)?);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! An application supplies three things: a [`Model`] (the aggregate
//! root), a [`Command`] sum type (one variant per mutation your
//! application performs), and as many [`Query`] types as it needs for
//! reads. Everything else — locking discipline, the on-disk journal
//! and snapshot format, crash recovery, rollback-on-failure — is
//! handled by [`Engine`].
//!
//! The collaborators the engine composes are split into their own
//! crates and are each independently pluggable via [`EngineBuilder`]:
//!
//! | Concern | Trait | Default |
//! |---|---|---|
//! | Durable command log | `prevalence_journal::CommandJournal` | `prevalence_journal::SegmentedFileJournal` |
//! | Snapshot storage | `prevalence_storage::Storage` | `prevalence_storage::FileStorage` |
//! | (De)serialization | `prevalence_serializer::Serializer` | `prevalence_serializer::RmpSerializer` |
//! | Authorization | [`Authorizer`] | [`AllowAll`] |
//!
//! This crate re-exports the surface applications actually build
//! against; reach into `prevalence_storage`, `prevalence_journal`, or
//! `prevalence_serializer` directly only when supplying a custom
//! collaborator implementation.

#![warn(missing_docs)]

pub use prevalence_authorizer::{AllowAll, DenyUnlisted};
pub use prevalence_core::{
    Authorizer, CallerIdentity, Command, CommandError, Error, Model, OperationType, Query, Result,
};
pub use prevalence_engine::{Engine, EngineBuilder, EngineConfiguration, SnapshotBehavior};
pub use prevalence_serializer::{RmpSerializer, Serializer, SerializerError};
