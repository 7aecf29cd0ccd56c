//! Checks a validated proposal must pass before any execution happens.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use anyhow::{anyhow, bail};
use tracing::warn;

use crate::core::ledger::Ledger;
use crate::core::proposal::SignedProposal;
use crate::core::registry::ContractRegistry;
use crate::error::{EndorserError, Result};

/// Resource name checked for proposals to application chaincodes.
pub const PROPOSE_RESOURCE: &str = "PROPOSE";

/// Whether a proposal targets a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelScope<'a> {
    /// No channel: node-local queries that can never become transactions.
    Chainless,
    Channel(&'a str),
}

pub fn check_channel_scope(channel_id: &str) -> ChannelScope<'_> {
    if channel_id.is_empty() {
        ChannelScope::Chainless
    } else {
        ChannelScope::Channel(channel_id)
    }
}

/// Refuses proposals addressed to system contracts that only the peer itself may call.
pub fn reject_if_not_invokable_externally(
    registry: &ContractRegistry,
    chaincode: &str,
    creator: &[u8],
) -> Result<()> {
    if registry.is_system_and_not_invokable_externally(chaincode) {
        warn!(
            chaincode = %chaincode,
            creator = %hex::encode(creator),
            "attempt to invoke a reserved system chaincode"
        );
        return Err(EndorserError::AccessDenied(format!(
            "chaincode {} cannot be invoked through a proposal",
            chaincode
        )));
    }
    Ok(())
}

/// Refuses a transaction id already committed on the channel.
///
/// Best effort only: two identical proposals racing through here can both
/// pass. The ledger enforces uniqueness when the transaction is committed.
pub fn reject_if_duplicate(ledger: &dyn Ledger, tx_id: &str, creator: &[u8]) -> Result<()> {
    if ledger.transaction_exists(tx_id)? {
        return Err(EndorserError::DuplicateTransaction {
            tx_id: tx_id.to_string(),
            creator: hex::encode(creator),
        });
    }
    Ok(())
}

/// Policy evaluator for channel resources.
pub trait AclProvider: Send + Sync {
    fn check_acl(
        &self,
        resource: &str,
        channel_id: &str,
        signed: &SignedProposal,
    ) -> anyhow::Result<()>;
}

/// Applies the channel writers policy to application chaincode proposals.
/// System contracts enforce their own access control.
pub fn check_access(
    acl: &dyn AclProvider,
    registry: &ContractRegistry,
    chaincode: &str,
    channel_id: &str,
    signed: &SignedProposal,
) -> Result<()> {
    if registry.is_system(chaincode) {
        return Ok(());
    }
    acl.check_acl(PROPOSE_RESOURCE, channel_id, signed)
        .map_err(|e| EndorserError::AccessDenied(format!("{:#}", e)))
}

/// Allows identities listed as writers of a channel. Unknown channels deny everyone.
#[derive(Debug, Default)]
pub struct ChannelWritersAcl {
    writers: RwLock<HashMap<String, HashSet<Vec<u8>>>>,
}

impl ChannelWritersAcl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_writer(&self, channel_id: &str, identity: Vec<u8>) {
        if let Ok(mut writers) = self.writers.write() {
            writers.entry(channel_id.to_string()).or_default().insert(identity);
        }
    }

    pub fn remove_writer(&self, channel_id: &str, identity: &[u8]) {
        if let Ok(mut writers) = self.writers.write() {
            if let Some(set) = writers.get_mut(channel_id) {
                set.remove(identity);
            }
        }
    }
}

impl AclProvider for ChannelWritersAcl {
    fn check_acl(
        &self,
        resource: &str,
        channel_id: &str,
        signed: &SignedProposal,
    ) -> anyhow::Result<()> {
        let creator = signed
            .proposal()
            .and_then(|p| p.header())
            .and_then(|h| h.signature_header())
            .map_err(|e| anyhow!("failed to extract creator: {}", e))?
            .creator;

        let writers = self.writers.read().map_err(|_| anyhow!("acl lock poisoned"))?;
        let allowed = writers.get(channel_id).map(|set| set.contains(&creator)).unwrap_or(false);
        if !allowed {
            bail!(
                "failed evaluating policy on resource {} for channel {}: \
                 creator {} is not a channel writer",
                resource,
                channel_id,
                hex::encode(&creator)
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::core::proposal::{
        create_signed_proposal, ChaincodeId, ChaincodeInput, ChaincodeInvocationSpec, ChaincodeType,
    };
    use crate::core::registry::{ENDORSEMENT_CONTRACT, LIFECYCLE_CONTRACT};
    use crate::core::rwset::TxSimulationResults;
    use crate::core::state::MemoryLedger;
    use crate::signer::LocalSigner;

    fn signed_by(signer: &LocalSigner) -> SignedProposal {
        let input = ChaincodeInput::from_strs(&["f"]);
        let id = ChaincodeId::named("mycc");
        let spec = ChaincodeInvocationSpec::new(ChaincodeType::Golang, id, input);
        create_signed_proposal(signer, "ch", &spec, BTreeMap::new()).unwrap().0
    }

    #[test]
    fn test_channel_scope() {
        assert_eq!(check_channel_scope(""), ChannelScope::Chainless);
        assert_eq!(check_channel_scope("ch"), ChannelScope::Channel("ch"));
    }

    #[test]
    fn test_reserved_contracts_are_refused() {
        let registry = ContractRegistry::with_platform_defaults();
        let check =
            |chaincode| reject_if_not_invokable_externally(&registry, chaincode, b"creator");
        let expected = "chaincode escc cannot be invoked through a proposal".to_string();
        assert_eq!(check(ENDORSEMENT_CONTRACT).unwrap_err(), EndorserError::AccessDenied(expected));
        assert!(check(LIFECYCLE_CONTRACT).is_ok());
        assert!(check("mycc").is_ok());
    }

    #[test]
    fn test_duplicate_detection() {
        let ledger = MemoryLedger::new("ch");
        assert!(reject_if_duplicate(&ledger, "tx1", b"c").is_ok());

        ledger.commit("tx1", &TxSimulationResults::default()).unwrap();
        let err = reject_if_duplicate(&ledger, "tx1", b"c").unwrap_err();
        assert!(matches!(
            err,
            EndorserError::DuplicateTransaction { ref tx_id, .. } if tx_id == "tx1"
        ));
    }

    #[test]
    fn test_writers_acl() {
        let registry = ContractRegistry::with_platform_defaults();
        let acl = ChannelWritersAcl::new();
        let writer = LocalSigner::generate();
        let outsider = LocalSigner::generate();
        acl.add_writer("ch", writer.identity());

        assert!(check_access(&acl, &registry, "mycc", "ch", &signed_by(&writer)).is_ok());

        let err = check_access(&acl, &registry, "mycc", "ch", &signed_by(&outsider)).unwrap_err();
        assert!(matches!(
            err,
            EndorserError::AccessDenied(ref msg) if msg.contains(PROPOSE_RESOURCE)
        ));

        // system contracts are exempt
        let outsider_signed = signed_by(&outsider);
        assert!(check_access(&acl, &registry, LIFECYCLE_CONTRACT, "ch", &outsider_signed).is_ok());

        acl.remove_writer("ch", &writer.identity());
        assert!(check_access(&acl, &registry, "mycc", "ch", &signed_by(&writer)).is_err());
    }
}
