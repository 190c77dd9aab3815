//! Shared contract types for the prevalence engine.
//!
//! This crate defines the collaborator contracts every other crate in
//! the workspace builds against:
//!
//! - [`Model`], [`Command`], [`Query`] — the user-authored types that
//!   make up an application built on the engine.
//! - [`CallerIdentity`], [`OperationType`] — the authorization surface.
//! - [`Error`] — the unified error type returned by the engine.
//!
//! None of the concrete engine machinery (locking, journaling,
//! storage, serialization) lives here; this crate only defines the
//! seams other crates implement against.

#![warn(missing_docs)]

mod authorizer;
mod command;
mod error;
mod model;
mod query;

pub use authorizer::{Authorizer, CallerIdentity, OperationType};
pub use command::Command;
pub use error::{CommandError, Error, Result};
pub use model::Model;
pub use query::Query;
