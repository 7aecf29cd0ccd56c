//! Chaincode definitions and their resolution for an invocation.
//!
//! Definitions are looked up per request through the active simulator, so the
//! lookup sees the same state the simulation is about to run against. Nothing
//! is cached between requests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::ledger::TxSimulator;
use crate::core::proposal::unmarshal;
use crate::core::registry::{ENDORSEMENT_CONTRACT, LIFECYCLE_CONTRACT, VALIDATION_CONTRACT};
use crate::error::{EndorserError, Result};

/// What the lifecycle contract records for an instantiated chaincode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaincodeDefinition {
    pub name: String,
    pub version: String,
    /// Name of the system contract that endorses this chaincode's proposals.
    #[serde(default)]
    pub endorsement_authority: String,
    #[serde(default)]
    pub validation_plugin: String,
    #[serde(default)]
    pub instantiation_policy: Option<Vec<u8>>,
    /// Fingerprint of the installed code package.
    #[serde(default)]
    pub id: Vec<u8>,
}

impl ChaincodeDefinition {
    /// A definition using the platform's default endorsement and validation.
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            endorsement_authority: ENDORSEMENT_CONTRACT.to_string(),
            validation_plugin: VALIDATION_CONTRACT.to_string(),
            instantiation_policy: None,
            id: Vec::new(),
        }
    }
}

/// Ledger-backed source of chaincode definitions.
pub trait DefinitionStore: Send + Sync {
    /// Fails with [`EndorserError::ContractNotInstantiated`] when no definition exists.
    fn chaincode_definition(
        &self,
        simulator: Option<&dyn TxSimulator>,
        channel_id: &str,
        tx_id: &str,
        name: &str,
    ) -> Result<ChaincodeDefinition>;
}

/// Reads definitions that the lifecycle contract stored in its own namespace,
/// keyed by chaincode name.
#[derive(Debug, Clone, Copy, Default)]
pub struct LifecycleDefinitionStore;

impl DefinitionStore for LifecycleDefinitionStore {
    fn chaincode_definition(
        &self,
        simulator: Option<&dyn TxSimulator>,
        channel_id: &str,
        tx_id: &str,
        name: &str,
    ) -> Result<ChaincodeDefinition> {
        let not_instantiated = |reason: String| EndorserError::ContractNotInstantiated {
            name: name.to_string(),
            reason,
        };

        let simulator = simulator.ok_or_else(|| {
            not_instantiated(format!("no ledger context for channel '{}'", channel_id))
        })?;
        let bytes = simulator
            .get_state(LIFECYCLE_CONTRACT, name)
            .map_err(|e| {
                not_instantiated(format!("could not read definition of '{}': {}", name, e))
            })?
            .ok_or_else(|| {
                not_instantiated(format!("could not find chaincode with name '{}'", name))
            })?;
        let definition: ChaincodeDefinition = unmarshal(&bytes)
            .map_err(|e| not_instantiated(format!("malformed definition for '{}': {}", name, e)))?;

        debug!(
            tx_id = %tx_id,
            chaincode = %name,
            version = %definition.version,
            "resolved chaincode definition"
        );
        Ok(definition)
    }
}

/// A chaincode package present on this peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledChaincode {
    pub name: String,
    pub version: String,
    /// Policy recorded in the package at install time, if any.
    pub instantiation_policy: Option<Vec<u8>>,
}

/// Chaincodes installed on this peer's file system.
pub trait InstalledChaincodes: Send + Sync {
    fn installed(&self, name: &str, version: &str) -> Option<InstalledChaincode>;
}

#[derive(Debug, Default)]
pub struct MemoryChaincodeInstalls {
    packages: RwLock<HashMap<(String, String), InstalledChaincode>>,
}

impl MemoryChaincodeInstalls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, package: InstalledChaincode) {
        if let Ok(mut packages) = self.packages.write() {
            packages.insert((package.name.clone(), package.version.clone()), package);
        }
    }
}

impl InstalledChaincodes for MemoryChaincodeInstalls {
    fn installed(&self, name: &str, version: &str) -> Option<InstalledChaincode> {
        self.packages
            .read()
            .ok()?
            .get(&(name.to_string(), version.to_string()))
            .cloned()
    }
}

/// Resolves the definition of a user chaincode and checks it against the
/// locally installed package.
#[derive(Clone)]
pub struct DefinitionResolver {
    store: Arc<dyn DefinitionStore>,
    installs: Arc<dyn InstalledChaincodes>,
}

impl DefinitionResolver {
    pub fn new(store: Arc<dyn DefinitionStore>, installs: Arc<dyn InstalledChaincodes>) -> Self {
        Self { store, installs }
    }

    pub fn resolve(
        &self,
        simulator: Option<&dyn TxSimulator>,
        channel_id: &str,
        tx_id: &str,
        name: &str,
    ) -> Result<ChaincodeDefinition> {
        let definition = self.store.chaincode_definition(simulator, channel_id, tx_id, name)?;
        self.check_instantiation_policy(&definition)?;
        Ok(definition)
    }

    /// The chaincode must be installed here, and a policy recorded in the
    /// installed package must match the one on the ledger byte for byte.
    pub fn check_instantiation_policy(&self, definition: &ChaincodeDefinition) -> Result<()> {
        let package = self.installs.installed(&definition.name, &definition.version).ok_or_else(|| {
            EndorserError::ChaincodeNotInstalled {
                name: definition.name.clone(),
                version: definition.version.clone(),
            }
        })?;

        match &package.instantiation_policy {
            Some(policy) if definition.instantiation_policy.as_ref() != Some(policy) => {
                Err(EndorserError::InstantiationPolicyViolation(format!(
                    "instantiation policy of {}:{} does not match the installed package",
                    definition.name, definition.version
                )))
            }
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for DefinitionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionResolver").finish_non_exhaustive()
    }
}
