use std::fmt;
use thiserror::Error;

/// Result alias used throughout the engine's public API.
pub type Result<T> = std::result::Result<T, Error>;

/// A command-signalled refusal: `prepare` or `execute` rejected the
/// operation deliberately. Carries a message and an optional
/// underlying cause, mirroring `std::error::Error`'s source chain.
#[derive(Debug)]
pub struct CommandError {
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl CommandError {
    /// Creates a refusal with no underlying cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a refusal wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as _)
    }
}

/// The unified error type returned by the engine's public API.
///
/// Every variant corresponds to one row of the error-kinds table in
/// the specification. Only [`Error::CommandFailed`] triggers a
/// rollback (the model is reloaded from the last snapshot and the
/// journal is replayed); every other variant leaves the model
/// untouched and simply propagates to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Raised by any operation after `close()` has completed.
    #[error("engine is disposed")]
    Disposed,

    /// The authorizer denied this operation. No lock was taken and no
    /// cloning occurred before this was raised.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A lock acquisition (`enter_read`/`enter_upgrade`/`enter_write`)
    /// exceeded the configured timeout.
    #[error("lock acquisition timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The command's `prepare` or `execute` returned this refusal
    /// deliberately. The model is unmodified by contract — no
    /// rollback is performed.
    #[error("command refused: {0}")]
    CommandRefused(#[source] CommandError),

    /// `execute` threw an exception other than a deliberate refusal
    /// after having (possibly) mutated the model. The model has been
    /// rolled back to its pre-command state by a full restore; the
    /// original cause is attached.
    #[error("command failed, state rolled back: {message}")]
    CommandFailed {
        /// Human-readable description of the failure.
        message: String,
        /// The error that triggered the rollback.
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// Restore found no snapshot in storage and no constructor was
    /// supplied to build an initial model.
    #[error("no initial snapshot and no constructor supplied")]
    NoInitialSnapshot,

    /// A journaled command threw during replay. Fatal to engine open.
    #[error("replay failed: {0}")]
    ReplayFailed(#[source] CommandError),

    /// Interior (non-tail) journal damage was detected. Fatal to
    /// engine open.
    #[error("journal corrupt: {0}")]
    JournalCorrupt(String),

    /// `verify_can_load` rejected the storage location. Fatal to
    /// engine open.
    #[error("incompatible storage: {0}")]
    IncompatibleStorage(String),

    /// The storage location already exists where `create` requires it
    /// to be absent.
    #[error("storage location already populated")]
    AlreadyExists,

    /// A byte-level I/O failure in storage or the journal.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A serializer failure (encode or decode).
    #[error("serialization error: {0}")]
    Serialization(#[from] prevalence_serializer::SerializerError),
}

impl From<prevalence_lock::LockError> for Error {
    fn from(err: prevalence_lock::LockError) -> Self {
        match err {
            prevalence_lock::LockError::Timeout(timeout) => Error::Timeout(timeout),
        }
    }
}

impl From<prevalence_storage::StorageError> for Error {
    fn from(err: prevalence_storage::StorageError) -> Self {
        match err {
            prevalence_storage::StorageError::Incompatible(msg) => Error::IncompatibleStorage(msg),
            prevalence_storage::StorageError::AlreadyExists => Error::AlreadyExists,
            prevalence_storage::StorageError::Io(e) => Error::Io(e),
        }
    }
}

impl From<prevalence_journal::JournalError> for Error {
    fn from(err: prevalence_journal::JournalError) -> Self {
        match err {
            prevalence_journal::JournalError::Corrupt(msg) => Error::JournalCorrupt(msg),
            prevalence_journal::JournalError::Io(e) => Error::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_error_displays_message() {
        let err = CommandError::new("invalid state");
        assert_eq!(err.to_string(), "invalid state");
    }

    #[test]
    fn command_error_chains_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = CommandError::with_source("wrapped", io_err);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn disposed_displays() {
        assert_eq!(Error::Disposed.to_string(), "engine is disposed");
    }
}
