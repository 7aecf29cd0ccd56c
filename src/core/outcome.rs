//! Result of processing one proposal.

use crate::core::response::ProposalResponse;
use crate::error::EndorserError;
use crate::metrics::ProposalEvent;

/// Every evaluated proposal ends in exactly one of these, each carrying a
/// response for the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalOutcome {
    /// Processed successfully. Endorsed, except for chainless proposals.
    Success(ProposalResponse),
    /// The chaincode ran and returned an error-class status. The response is
    /// fully formed; it is endorsed when the status is below 500.
    ChaincodeError { response: ProposalResponse, error: EndorserError },
    /// The pipeline or the endorsement authority refused the proposal.
    /// The response carries a 500-class status and no endorsement.
    Rejected { response: ProposalResponse, error: EndorserError },
}

impl ProposalOutcome {
    pub(crate) fn rejected(error: EndorserError) -> Self {
        ProposalOutcome::Rejected { response: ProposalResponse::from_error(&error), error }
    }

    pub fn response(&self) -> &ProposalResponse {
        match self {
            ProposalOutcome::Success(response)
            | ProposalOutcome::ChaincodeError { response, .. }
            | ProposalOutcome::Rejected { response, .. } => response,
        }
    }

    pub fn error(&self) -> Option<&EndorserError> {
        match self {
            ProposalOutcome::Success(_) => None,
            ProposalOutcome::ChaincodeError { error, .. }
            | ProposalOutcome::Rejected { error, .. } => Some(error),
        }
    }

    pub fn into_parts(self) -> (ProposalResponse, Option<EndorserError>) {
        match self {
            ProposalOutcome::Success(response) => (response, None),
            ProposalOutcome::ChaincodeError { response, error }
            | ProposalOutcome::Rejected { response, error } => (response, Some(error)),
        }
    }

    pub fn status(&self) -> i32 {
        self.response().response.status
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProposalOutcome::Success(_))
    }

    pub fn is_chaincode_error(&self) -> bool {
        matches!(self, ProposalOutcome::ChaincodeError { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, ProposalOutcome::Rejected { .. })
    }

    pub(crate) fn event(&self) -> ProposalEvent {
        match self {
            ProposalOutcome::Success(_) => ProposalEvent::Succeeded,
            ProposalOutcome::ChaincodeError { .. } => ProposalEvent::ChaincodeError,
            ProposalOutcome::Rejected { .. } => ProposalEvent::Rejected,
        }
    }
}
