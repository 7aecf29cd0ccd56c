use thiserror::Error;

/// Every way an endorsement request can fail.
///
/// Only [`EndorserError::ChannelNotFound`] is fatal in the sense that no
/// proposal response is produced; every other variant is converted into a
/// 500-class response (or, for [`EndorserError::Chaincode`], travels next to a
/// fully formed one).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndorserError {
    #[error("invalid proposal: {0}")]
    InvalidProposal(String),

    #[error("failed to look up the ledger for channel {0}")]
    ChannelNotFound(String),

    #[error("duplicate transaction found [{tx_id}]. Creator [{creator}]")]
    DuplicateTransaction { tx_id: String, creator: String },

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error(
        "{reason}: make sure the chaincode {name} has been successfully instantiated and try again"
    )]
    ContractNotInstantiated { name: String, reason: String },

    #[error("chaincode {name}:{version} is not installed on this peer")]
    ChaincodeNotInstalled { name: String, version: String },

    #[error("instantiation policy violation: {0}")]
    InstantiationPolicyViolation(String),

    #[error("unsupported chaincode type: {0}")]
    UnsupportedChaincodeType(String),

    #[error("malformed invocation: {0}")]
    MalformedInvocation(String),

    #[error("simulator error: {0}")]
    Simulator(String),

    #[error(transparent)]
    Execution(#[from] crate::core::execution::ExecutionError),

    #[error("private data distribution failed: {0}")]
    PrivateDataDistributionFailed(String),

    #[error("endorsement error: {0}")]
    Endorsement(String),

    #[error("endorsement authority refused the proposal (status: {status}, message: {message})")]
    EndorsementRejected { status: i32, message: String },

    #[error("chaincode error (status: {status}, message: {message})")]
    Chaincode { status: i32, message: String },

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EndorserError {
    /// True for failures that leave nothing to respond with (the channel itself is unknown).
    pub fn is_fatal(&self) -> bool {
        matches!(self, EndorserError::ChannelNotFound(_))
    }

    /// True when the business logic ran and declined the proposal.
    pub fn is_chaincode_error(&self) -> bool {
        matches!(self, EndorserError::Chaincode { .. })
    }
}

pub type Result<T> = std::result::Result<T, EndorserError>;

impl From<secp256k1::Error> for EndorserError {
    fn from(err: secp256k1::Error) -> Self {
        EndorserError::Crypto(err.to_string())
    }
}

impl From<serde_json::Error> for EndorserError {
    fn from(err: serde_json::Error) -> Self {
        EndorserError::Serialization(err.to_string())
    }
}

impl From<crate::core::ledger::LedgerError> for EndorserError {
    fn from(err: crate::core::ledger::LedgerError) -> Self {
        EndorserError::Simulator(err.to_string())
    }
}
