//! The prevalent-system engine: composes a [`prevalence_core::Model`],
//! a single [`prevalence_core::Command`] sum type, a
//! [`prevalence_serializer::Serializer`], and the
//! `Storage`/`CommandJournal`/`Authorizer` collaborators into a running
//! engine implementing the restore, execute, snapshot, and close
//! protocols described by the specification this crate implements.
//!
//! Most applications start from [`EngineBuilder`] (or the shorthand
//! factories on [`Engine`] itself — [`Engine::load`], [`Engine::create`],
//! [`Engine::load_or_create`]) rather than constructing an [`Engine`]
//! directly.

#![warn(missing_docs)]

mod background;
mod builder;
mod config;
mod engine;
mod restore;
mod state;

pub use builder::EngineBuilder;
pub use config::{EngineConfiguration, SnapshotBehavior};
pub use engine::Engine;
