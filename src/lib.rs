pub mod config;
pub mod core;
pub mod error;
pub mod metrics;
pub mod signature;
pub mod signer;

pub use config::EndorserConfig;
pub use error::{EndorserError, Result};
pub use metrics::{CounterSnapshot, NopMetrics, ProposalCounters, ProposalEvent, ProposalMetrics};
pub use signature::{hash_bytes, sha256, sign_bytes, verify_bytes};
pub use signer::LocalSigner;

// Pipeline API exports
pub use crate::core::{Endorser, EndorserBuilder};
pub use crate::core::admission::{AclProvider, ChannelWritersAcl, PROPOSE_RESOURCE};
pub use crate::core::decoration::{DecorationChain, Decorator};
pub use crate::core::definition::{
    ChaincodeDefinition, DefinitionResolver, DefinitionStore, InstalledChaincode,
    InstalledChaincodes, LifecycleDefinitionStore, MemoryChaincodeInstalls,
};
pub use crate::core::escc::EndorsementContract;
pub use crate::core::execution::{
    ChaincodeExecutor, ChaincodeTarget, ExecutionContext, ExecutionError, ExecutionOutput,
};
pub use crate::core::ledger::{
    HistoryQueryExecutor, KeyModification, Ledger, LedgerError, LedgerProvider, LedgerResult,
    SimulatorGuard, TxSimulator,
};
pub use crate::core::outcome::ProposalOutcome;
pub use crate::core::private_data::{MemoryPrivateDataStore, PrivateDataDistributor};
pub use crate::core::proposal::{
    compute_tx_id, create_signed_proposal, create_signed_proposal_with_nonce, marshal, unmarshal,
    ChaincodeDeploymentSpec, ChaincodeHeaderExtension, ChaincodeId, ChaincodeInput,
    ChaincodeInvocationSpec, ChaincodeSpec, ChaincodeType, ChannelHeader, Header, HeaderType,
    Proposal, SignatureHeader, SignedProposal,
};
pub use crate::core::registry::{
    ContractCapabilities, ContractRegistry, CONFIGURATION_CONTRACT, ENDORSEMENT_CONTRACT,
    LIFECYCLE_CONTRACT, QUERY_CONTRACT, VALIDATION_CONTRACT,
};
pub use crate::core::response::{
    ChaincodeAction, ChaincodeEvent, Endorsement, ProposalResponse, ProposalResponsePayload,
    Response, ERROR, ERROR_THRESHOLD, OK,
};
pub use crate::core::rwset::{TxPvtReadWriteSet, TxReadWriteSet, TxSimulationResults};
pub use crate::core::simulation::SimulationOutput;
pub use crate::core::state::{MemoryLedger, MemoryLedgerProvider};
pub use crate::core::system::{SystemContract, SystemContractDispatcher};
pub use crate::core::validation::{ProposalValidator, SignedProposalValidator, ValidatedProposal};
