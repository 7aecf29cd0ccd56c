//! Execution engine seam: what the pipeline hands to a chaincode and what it
//! gets back.
//!
//! The context is passed explicitly; the simulator and history executor are
//! present only for channel-scoped proposals.

use thiserror::Error;

use crate::core::ledger::{HistoryQueryExecutor, LedgerError, TxSimulator};
use crate::core::proposal::{ChaincodeDeploymentSpec, ChaincodeInput, Proposal, SignedProposal};
use crate::core::response::{ChaincodeEvent, Response};

/// Errors produced by the execution layer. Any of these aborts the request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("execution engine failure: {0}")]
    Engine(String),

    #[error("chaincode initialization failed (status: {status}, message: {message})")]
    InitFailed { status: i32, message: String },

    #[error("attempting to deploy a system chaincode {0}")]
    SystemContractDeploy(String),

    #[error("malformed deployment spec: {0}")]
    MalformedDeploymentSpec(String),

    #[error("unknown system chaincode: {0}")]
    UnknownSystemContract(String),
}

impl From<LedgerError> for ExecutionError {
    fn from(err: LedgerError) -> Self {
        ExecutionError::Engine(err.to_string())
    }
}

/// Response and optional event returned by a chaincode.
pub type ExecutionOutput = (Response, Option<ChaincodeEvent>);

/// The chaincode being called and the version it runs at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChaincodeTarget {
    pub name: String,
    pub version: String,
    pub is_system: bool,
}

/// Per-request state shared by every execution of one proposal.
#[derive(Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub channel_id: &'a str,
    pub tx_id: &'a str,
    pub signed_proposal: &'a SignedProposal,
    pub proposal: &'a Proposal,
    pub simulator: Option<&'a dyn TxSimulator>,
    pub history: Option<&'a dyn HistoryQueryExecutor>,
}

impl<'a> ExecutionContext<'a> {
    pub fn is_chainless(&self) -> bool {
        self.channel_id.is_empty()
    }

    /// The bound simulator, for chaincodes that need ledger access.
    pub fn simulator(&self) -> Result<&'a dyn TxSimulator, ExecutionError> {
        self.simulator.ok_or_else(|| {
            ExecutionError::Engine(format!("no transaction simulator bound for tx {}", self.tx_id))
        })
    }

    pub fn history(&self) -> Result<&'a dyn HistoryQueryExecutor, ExecutionError> {
        self.history.ok_or_else(|| {
            ExecutionError::Engine(format!("no history query executor bound for tx {}", self.tx_id))
        })
    }
}

impl std::fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("channel_id", &self.channel_id)
            .field("tx_id", &self.tx_id)
            .field("simulator", &self.simulator.is_some())
            .field("history", &self.history.is_some())
            .finish()
    }
}

/// Runs chaincode. Implementations own sandboxing and launching.
pub trait ChaincodeExecutor: Send + Sync {
    /// Invokes `target` with `input`.
    fn execute(
        &self,
        ctx: &ExecutionContext<'_>,
        target: &ChaincodeTarget,
        input: &ChaincodeInput,
    ) -> Result<ExecutionOutput, ExecutionError>;

    /// Launches and initializes a freshly deployed or upgraded chaincode.
    fn deploy(
        &self,
        ctx: &ExecutionContext<'_>,
        target: &ChaincodeTarget,
        spec: &ChaincodeDeploymentSpec,
    ) -> Result<ExecutionOutput, ExecutionError>;
}
