//! Execution responses and the proposal-response artifact handed to the client.

use serde::{Deserialize, Serialize};

use crate::core::proposal::{marshal, unmarshal, ChaincodeId};
use crate::error::{EndorserError, Result};
use crate::signature::{sha256, verify_bytes};
use crate::signer::LocalSigner;

/// Successful execution.
pub const OK: i32 = 200;
/// Statuses at or above this are errors; below it a response may be committed.
pub const ERROR_THRESHOLD: i32 = 400;
/// Validation / infrastructure error class.
pub const ERROR: i32 = 500;

/// Version stamped on every produced proposal response.
pub const PROPOSAL_RESPONSE_VERSION: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Response {
    pub status: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub payload: Vec<u8>,
}

impl Response {
    pub fn success(payload: Vec<u8>) -> Self {
        Self { status: OK, message: "OK".to_string(), payload }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { status: ERROR, message: message.into(), payload: Vec::new() }
    }

    pub fn with_status(status: i32, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), payload: Vec::new() }
    }

    /// True for any status at or above [`ERROR_THRESHOLD`].
    pub fn is_error_class(&self) -> bool {
        self.status >= ERROR_THRESHOLD
    }
}

/// Event emitted by a chaincode; carried opaquely into the endorsement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChaincodeEvent {
    pub chaincode_id: String,
    pub tx_id: String,
    pub event_name: String,
    #[serde(default)]
    pub payload: Vec<u8>,
}

/// What a chaincode invocation produced, as committed to by the endorsement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChaincodeAction {
    /// Serialized public read/write set.
    pub results: Vec<u8>,
    /// Serialized [`ChaincodeEvent`], empty if none.
    pub events: Vec<u8>,
    pub response: Response,
    pub chaincode_id: ChaincodeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProposalResponsePayload {
    pub proposal_hash: Vec<u8>,
    /// Serialized [`ChaincodeAction`].
    pub extension: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endorsement {
    /// Serialized identity of the endorsing peer.
    pub endorser: Vec<u8>,
    /// Signature over `payload || endorser`.
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalResponse {
    pub version: i32,
    pub response: Response,
    /// Serialized [`ProposalResponsePayload`]; empty for bare responses.
    #[serde(default)]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub endorsement: Option<Endorsement>,
}

impl ProposalResponse {
    /// A response carrying nothing but an execution outcome.
    pub fn bare(response: Response) -> Self {
        Self {
            version: PROPOSAL_RESPONSE_VERSION,
            response,
            payload: Vec::new(),
            endorsement: None,
        }
    }

    /// A 500-class response describing a pipeline failure.
    pub fn from_error(err: &EndorserError) -> Self {
        Self::bare(Response::error(err.to_string()))
    }

    pub fn is_endorsed(&self) -> bool {
        self.endorsement.is_some()
    }

    pub fn response_payload(&self) -> Result<ProposalResponsePayload> {
        unmarshal(&self.payload)
    }

    pub fn chaincode_action(&self) -> Result<ChaincodeAction> {
        unmarshal(&self.response_payload()?.extension)
    }

    /// Checks the endorsement signature against the payload and endorser identity.
    /// A response without an endorsement never verifies.
    pub fn verify_endorsement(&self) -> Result<bool> {
        match &self.endorsement {
            None => Ok(false),
            Some(endorsement) => {
                let signed = signed_bytes(&self.payload, &endorsement.endorser);
                verify_bytes(&endorsement.endorser, &signed, &endorsement.signature)
            }
        }
    }
}

fn signed_bytes(payload: &[u8], endorser: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(payload.len() + endorser.len());
    data.extend_from_slice(payload);
    data.extend_from_slice(endorser);
    data
}

/// Hash of the proposal an endorsement commits to.
///
/// Covers the header, the invocation input and the visibility mask. The
/// transient map is stripped from the payload so that endorser-only data
/// never reaches the hash recorded on the ledger.
pub fn proposal_hash(header: &[u8], payload: &[u8], visibility: &[u8]) -> Result<Vec<u8>> {
    let payload: crate::core::proposal::ChaincodeProposalPayload =
        unmarshal(payload).map_err(|e| {
            let message = format!("failed to extract chaincode proposal payload: {}", e);
            EndorserError::InvalidProposal(message)
        })?;
    let mut data = Vec::with_capacity(header.len() + payload.input.len() + visibility.len());
    data.extend_from_slice(header);
    data.extend_from_slice(&payload.input);
    data.extend_from_slice(visibility);
    Ok(sha256(&data).to_vec())
}

fn build_payload(
    header: &[u8],
    payload: &[u8],
    response: &Response,
    results: &[u8],
    events: &[u8],
    chaincode_id: &ChaincodeId,
    visibility: &[u8],
) -> Result<Vec<u8>> {
    let action = ChaincodeAction {
        results: results.to_vec(),
        events: events.to_vec(),
        response: response.clone(),
        chaincode_id: chaincode_id.clone(),
    };
    let prp = ProposalResponsePayload {
        proposal_hash: proposal_hash(header, payload, visibility)?,
        extension: marshal(&action)?,
    };
    marshal(&prp)
}

/// Creates an endorsed proposal response signed by `signer`.
#[allow(clippy::too_many_arguments)]
pub fn create_proposal_response(
    header: &[u8],
    payload: &[u8],
    response: &Response,
    results: &[u8],
    events: &[u8],
    chaincode_id: &ChaincodeId,
    visibility: &[u8],
    signer: &LocalSigner,
) -> Result<ProposalResponse> {
    let prp_bytes =
        build_payload(header, payload, response, results, events, chaincode_id, visibility)?;
    let endorser = signer.identity();
    let signature = signer.sign(&signed_bytes(&prp_bytes, &endorser))?;

    Ok(ProposalResponse {
        version: PROPOSAL_RESPONSE_VERSION,
        response: Response {
            status: response.status,
            message: response.message.clone(),
            payload: Vec::new(),
        },
        payload: prp_bytes,
        endorsement: Some(Endorsement { endorser, signature }),
    })
}

/// Creates the unendorsed response returned when a chaincode failed: it
/// carries everything the chaincode produced but no endorsement.
pub fn create_proposal_response_failure(
    header: &[u8],
    payload: &[u8],
    response: &Response,
    results: &[u8],
    events: &[u8],
    chaincode_id: &ChaincodeId,
    visibility: &[u8],
) -> Result<ProposalResponse> {
    let prp_bytes =
        build_payload(header, payload, response, results, events, chaincode_id, visibility)?;
    Ok(ProposalResponse {
        version: PROPOSAL_RESPONSE_VERSION,
        response: response.clone(),
        payload: prp_bytes,
        endorsement: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use crate::core::proposal::ChaincodeProposalPayload;

    fn payload_with_transient(value: &[u8]) -> Vec<u8> {
        let mut transient_map = BTreeMap::new();
        transient_map.insert("secret".to_string(), value.to_vec());
        marshal(&ChaincodeProposalPayload { input: b"input".to_vec(), transient_map }).unwrap()
    }

    #[test]
    fn test_status_classes() {
        assert!(!Response::success(Vec::new()).is_error_class());
        assert!(Response::with_status(404, "nf").is_error_class());
        assert!(Response::error("boom").is_error_class());
        assert_eq!(Response::error("boom").status, ERROR);
    }

    #[test]
    fn test_proposal_hash_ignores_transient_map() {
        let a = proposal_hash(b"hdr", &payload_with_transient(b"one"), b"").unwrap();
        let b = proposal_hash(b"hdr", &payload_with_transient(b"two"), b"").unwrap();
        let c = proposal_hash(b"other", &payload_with_transient(b"one"), b"").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_endorsed_response_verifies_and_detects_tampering() {
        let signer = LocalSigner::generate();
        let response = Response::success(b"value".to_vec());
        let ccid = ChaincodeId {
            name: "mycc".to_string(),
            version: "1.0".to_string(),
            path: String::new(),
        };
        let payload = payload_with_transient(b"x");
        let mut resp = create_proposal_response(
            b"hdr", &payload, &response, b"rwset", b"", &ccid, b"", &signer,
        )
        .unwrap();

        assert!(resp.is_endorsed());
        assert!(resp.verify_endorsement().unwrap());
        let action = resp.chaincode_action().unwrap();
        assert_eq!(action.results, b"rwset".to_vec());
        assert_eq!(action.chaincode_id, ccid);

        resp.payload.push(b'!');
        assert!(!resp.verify_endorsement().unwrap());
    }

    #[test]
    fn test_failure_response_has_no_endorsement() {
        let response = Response::error("chaincode failed");
        let payload = payload_with_transient(b"x");
        let ccid = ChaincodeId::named("cc");
        let resp =
            create_proposal_response_failure(b"hdr", &payload, &response, b"", b"", &ccid, b"")
                .unwrap();
        assert!(!resp.is_endorsed());
        assert!(!resp.verify_endorsement().unwrap());
        assert_eq!(resp.response.status, ERROR);
        assert!(!resp.payload.is_empty());
    }

    #[test]
    fn test_from_error_is_500_class() {
        let resp = ProposalResponse::from_error(&EndorserError::AccessDenied("nope".to_string()));
        assert_eq!(resp.response.status, ERROR);
        assert!(resp.response.message.contains("nope"));
        assert!(resp.payload.is_empty());
    }
}
