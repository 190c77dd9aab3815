//! Built-in [`Authorizer`] implementations.
//!
//! These cover the two extremes the specification calls out —
//! unconditional allow, and an explicit allow-list — mirroring the
//! access-control-as-injected-config shape of a two-mode read/write
//! gate, generalized from "read or write" to "which named operation".
//! A `Model` wanting finer-grained rules implements [`Authorizer`]
//! itself and returns it from `Model::as_authorizer`.

#![warn(missing_docs)]

use std::collections::HashSet;

pub use prevalence_core::{Authorizer, CallerIdentity, OperationType};

/// Allows every operation, for every caller. The default when an
/// engine is built without an explicit authorizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn allows(&self, _operation: OperationType<'_>, _caller: &CallerIdentity) -> bool {
        true
    }
}

/// Denies any operation whose name was not explicitly added to the
/// allow-list, regardless of caller. Useful for locking an engine down
/// to a known-safe subset of its `Command`/`Query` types.
#[derive(Debug, Clone, Default)]
pub struct DenyUnlisted {
    allowed: HashSet<String>,
}

impl DenyUnlisted {
    /// An authorizer that denies everything until operations are
    /// added with [`DenyUnlisted::allow`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `operation_name` (as produced by `std::any::type_name`) to
    /// the allow-list.
    pub fn allow(mut self, operation_name: impl Into<String>) -> Self {
        self.allowed.insert(operation_name.into());
        self
    }
}

impl Authorizer for DenyUnlisted {
    fn allows(&self, operation: OperationType<'_>, _caller: &CallerIdentity) -> bool {
        let name = match operation {
            OperationType::Command(name) => name,
            OperationType::Query(name) => name,
        };
        self.allowed.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_all_allows_everything() {
        let auth = AllowAll;
        let caller = CallerIdentity::anonymous();
        assert!(auth.allows(OperationType::Command("anything"), &caller));
        assert!(auth.allows(OperationType::Query("anything"), &caller));
    }

    #[test]
    fn deny_unlisted_only_allows_added_names() {
        let auth = DenyUnlisted::new().allow("Deposit");
        let caller = CallerIdentity::anonymous();
        assert!(auth.allows(OperationType::Command("Deposit"), &caller));
        assert!(!auth.allows(OperationType::Command("Withdraw"), &caller));
        assert!(!auth.allows(OperationType::Query("Balance"), &caller));
    }
}
