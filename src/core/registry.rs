//! Capability table for contracts the platform treats specially.
//!
//! Anything not registered here is an ordinary user contract.

use std::collections::HashMap;

/// Reserved lifecycle-management contract.
pub const LIFECYCLE_CONTRACT: &str = "lscc";
/// Default endorsement authority.
pub const ENDORSEMENT_CONTRACT: &str = "escc";
/// Default validation contract.
pub const VALIDATION_CONTRACT: &str = "vscc";
/// Channel configuration contract.
pub const CONFIGURATION_CONTRACT: &str = "cscc";
/// Ledger query contract.
pub const QUERY_CONTRACT: &str = "qscc";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContractCapabilities {
    pub is_system: bool,
    /// Manages install / deploy / upgrade of other contracts.
    pub is_lifecycle: bool,
    /// May be the target of an external proposal.
    pub invokable_externally: bool,
    /// May be called from another contract.
    pub invokable_cc2cc: bool,
}

impl ContractCapabilities {
    /// Capabilities of an ordinary user contract.
    pub const fn user() -> Self {
        Self {
            is_system: false,
            is_lifecycle: false,
            invokable_externally: true,
            invokable_cc2cc: true,
        }
    }

    pub const fn system(invokable_externally: bool, invokable_cc2cc: bool) -> Self {
        Self {
            is_system: true,
            is_lifecycle: false,
            invokable_externally,
            invokable_cc2cc,
        }
    }

    pub const fn lifecycle() -> Self {
        Self {
            is_system: true,
            is_lifecycle: true,
            invokable_externally: true,
            invokable_cc2cc: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    entries: HashMap<String, ContractCapabilities>,
}

impl ContractRegistry {
    /// An empty registry: every contract is a user contract.
    pub fn new() -> Self {
        Self::default()
    }

    /// The platform's built-in system contracts.
    pub fn with_platform_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(LIFECYCLE_CONTRACT, ContractCapabilities::lifecycle());
        registry.register(CONFIGURATION_CONTRACT, ContractCapabilities::system(true, false));
        registry.register(QUERY_CONTRACT, ContractCapabilities::system(true, true));
        registry.register(ENDORSEMENT_CONTRACT, ContractCapabilities::system(false, false));
        registry.register(VALIDATION_CONTRACT, ContractCapabilities::system(false, false));
        registry
    }

    pub fn register(&mut self, name: &str, capabilities: ContractCapabilities) {
        self.entries.insert(name.to_string(), capabilities);
    }

    pub fn capabilities(&self, name: &str) -> ContractCapabilities {
        self.entries.get(name).copied().unwrap_or_else(ContractCapabilities::user)
    }

    pub fn is_system(&self, name: &str) -> bool {
        self.capabilities(name).is_system
    }

    pub fn is_lifecycle(&self, name: &str) -> bool {
        self.capabilities(name).is_lifecycle
    }

    /// System contracts that must never be the direct target of a proposal.
    pub fn is_system_and_not_invokable_externally(&self, name: &str) -> bool {
        let caps = self.capabilities(name);
        caps.is_system && !caps.invokable_externally
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_defaults() {
        let registry = ContractRegistry::with_platform_defaults();
        assert!(registry.is_lifecycle(LIFECYCLE_CONTRACT));
        assert!(registry.is_system(QUERY_CONTRACT));
        assert!(registry.is_system_and_not_invokable_externally(ENDORSEMENT_CONTRACT));
        assert!(registry.is_system_and_not_invokable_externally(VALIDATION_CONTRACT));
        assert!(!registry.is_system_and_not_invokable_externally(LIFECYCLE_CONTRACT));
    }

    #[test]
    fn test_unknown_names_are_user_contracts() {
        let registry = ContractRegistry::with_platform_defaults();
        assert_eq!(registry.capabilities("mycc"), ContractCapabilities::user());
        assert!(!registry.is_system("mycc"));
        assert!(!registry.is_system_and_not_invokable_externally("mycc"));
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = ContractRegistry::new();
        registry.register("custom_escc", ContractCapabilities::system(false, false));
        assert!(registry.is_system_and_not_invokable_externally("custom_escc"));
        assert!(!registry.is_system(LIFECYCLE_CONTRACT));
    }
}
