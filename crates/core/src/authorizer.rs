use std::fmt;

/// Opaque caller identity consulted for authorization decisions.
///
/// The engine resolves the current caller's identity on every
/// `Execute` call and hands it to the configured [`Authorizer`]. The
/// mechanism by which an identity is established (thread-local
/// context, a request-scoped value, a constant for single-tenant
/// embedding) is external to the engine — see
/// `EngineBuilder::identity_provider` in `prevalence-engine`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallerIdentity(String);

impl CallerIdentity {
    /// Wraps an arbitrary identity string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identity used when no identity provider is configured.
    pub fn anonymous() -> Self {
        Self::new("anonymous")
    }

    /// The wrapped identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Classifies an operation for the purposes of authorization.
///
/// The name is the monomorphized `Command`/`Query` type name (via
/// `std::any::type_name`), so authorizers can make per-operation-type
/// decisions without the engine needing a registry of operation
/// identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType<'a> {
    /// A mutating operation — the named `Command` type.
    Command(&'a str),
    /// A read-only operation — the named `Query` type.
    Query(&'a str),
}

impl fmt::Display for OperationType<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationType::Command(name) => write!(f, "command {name}"),
            OperationType::Query(name) => write!(f, "query {name}"),
        }
    }
}

/// Decides whether a caller may execute a given operation.
///
/// Authorization is checked before any locking or cloning happens — an
/// unauthorized call must be cheap and must leave no side effects.
/// Implementations live in `prevalence-authorizer`; this trait is
/// defined here so that [`crate::Model`] can probe for it without a
/// dependency cycle.
pub trait Authorizer: Send + Sync {
    /// Returns `true` if `caller` may execute an operation of kind
    /// `operation`.
    fn allows(&self, operation: OperationType<'_>, caller: &CallerIdentity) -> bool;
}
