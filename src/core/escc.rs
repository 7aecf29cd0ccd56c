//! Default endorsement authority.
//!
//! Signs exactly what it is handed. It never re-executes or re-reads state,
//! so every peer running it over the same simulation produces the same
//! payload, differing only in the signature block.
//!
//! Arguments:
//! - `args[0]`: function name (unused)
//! - `args[1]`: serialized proposal header
//! - `args[2]`: serialized chaincode proposal payload
//! - `args[3]`: serialized id of the executed chaincode
//! - `args[4]`: serialized chaincode response
//! - `args[5]`: public simulation results
//! - `args[6]`: serialized chaincode event (optional)
//! - `args[7]`: payload visibility (optional)

use std::sync::Arc;

use tracing::debug;

use crate::core::execution::{ExecutionContext, ExecutionError, ExecutionOutput};
use crate::core::proposal::{marshal, unmarshal, ChaincodeId, ChaincodeInput};
use crate::core::response::{create_proposal_response, Response, ERROR};
use crate::core::system::SystemContract;
use crate::error::Result;
use crate::signer::LocalSigner;

const MIN_ARGS: usize = 6;
const MAX_ARGS: usize = 8;

pub struct EndorsementContract {
    signer: Arc<LocalSigner>,
}

impl EndorsementContract {
    pub fn new(signer: Arc<LocalSigner>) -> Self {
        Self { signer }
    }

    fn endorse(&self, args: &[Vec<u8>]) -> std::result::Result<Vec<u8>, String> {
        if args.len() < MIN_ARGS {
            return Err(format!(
                "incorrect number of arguments (expected a minimum of {}, provided {})",
                MIN_ARGS,
                args.len()
            ));
        }
        if args.len() > MAX_ARGS {
            return Err(format!(
                "incorrect number of arguments (expected a maximum of {}, provided {})",
                MAX_ARGS,
                args.len()
            ));
        }

        let header = &args[1];
        if header.is_empty() {
            return Err("serialized header object is empty".to_string());
        }
        let payload = &args[2];
        if payload.is_empty() {
            return Err("serialized chaincode proposal payload is empty".to_string());
        }
        let chaincode_id: ChaincodeId =
            unmarshal(&args[3]).map_err(|e| format!("failed to unmarshal chaincode id: {}", e))?;
        let response: Response = unmarshal(&args[4])
            .map_err(|e| format!("failed to unmarshal chaincode response: {}", e))?;
        if response.status >= ERROR {
            return Err(format!(
                "status code less than {} will be endorsed, received status code: {}",
                ERROR, response.status
            ));
        }
        let results = &args[5];
        let events = args.get(6).map(Vec::as_slice).unwrap_or_default();
        let visibility = args.get(7).map(Vec::as_slice).unwrap_or_default();

        self.sign(header, payload, &response, results, events, &chaincode_id, visibility)
            .map_err(|e| format!("could not create the proposal response: {}", e))
    }

    #[allow(clippy::too_many_arguments)]
    fn sign(
        &self,
        header: &[u8],
        payload: &[u8],
        response: &Response,
        results: &[u8],
        events: &[u8],
        chaincode_id: &ChaincodeId,
        visibility: &[u8],
    ) -> Result<Vec<u8>> {
        let prop_response = create_proposal_response(
            header,
            payload,
            response,
            results,
            events,
            chaincode_id,
            visibility,
            &self.signer,
        )?;
        marshal(&prop_response)
    }
}

impl SystemContract for EndorsementContract {
    fn invoke(
        &self,
        ctx: &ExecutionContext<'_>,
        input: &ChaincodeInput,
    ) -> std::result::Result<ExecutionOutput, ExecutionError> {
        match self.endorse(&input.args) {
            Ok(bytes) => {
                debug!(tx_id = %ctx.tx_id, "proposal response signed");
                Ok((Response::success(bytes), None))
            }
            Err(message) => Ok((Response::error(message), None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::core::proposal::{ChaincodeProposalPayload, Proposal, SignedProposal};
    use crate::core::response::ProposalResponse;

    fn contract() -> (EndorsementContract, Arc<LocalSigner>) {
        let signer = Arc::new(LocalSigner::generate());
        (EndorsementContract::new(signer.clone()), signer)
    }

    fn args(response: &Response) -> Vec<Vec<u8>> {
        let payload = ChaincodeProposalPayload {
            input: b"input".to_vec(),
            transient_map: BTreeMap::new(),
        };
        let chaincode_id = ChaincodeId {
            name: "mycc".to_string(),
            version: "1.0".to_string(),
            path: String::new(),
        };
        vec![
            Vec::new(),
            b"header".to_vec(),
            marshal(&payload).unwrap(),
            marshal(&chaincode_id).unwrap(),
            marshal(response).unwrap(),
            b"results".to_vec(),
            Vec::new(),
            Vec::new(),
        ]
    }

    fn invoke(contract: &EndorsementContract, args: Vec<Vec<u8>>) -> Response {
        let proposal = Proposal { header: Vec::new(), payload: Vec::new(), extension: Vec::new() };
        let signed = SignedProposal { proposal_bytes: Vec::new(), signature: Vec::new() };
        let ctx = ExecutionContext {
            channel_id: "ch",
            tx_id: "tx",
            signed_proposal: &signed,
            proposal: &proposal,
            simulator: None,
            history: None,
        };
        contract.invoke(&ctx, &ChaincodeInput { args, decorations: BTreeMap::new() }).unwrap().0
    }

    #[test]
    fn test_signs_successful_response() {
        let (contract, signer) = contract();
        let res = invoke(&contract, args(&Response::success(b"value".to_vec())));
        assert_eq!(res.status, 200);

        let prop_response: ProposalResponse = unmarshal(&res.payload).unwrap();
        assert!(prop_response.verify_endorsement().unwrap());
        assert_eq!(prop_response.endorsement.unwrap().endorser, signer.identity());
    }

    #[test]
    fn test_endorses_chaincode_errors_below_500() {
        let (contract, _) = contract();
        let res = invoke(&contract, args(&Response::with_status(404, "not found")));
        assert_eq!(res.status, 200);
    }

    #[test]
    fn test_refuses_500_class_responses() {
        let (contract, _) = contract();
        let res = invoke(&contract, args(&Response::error("boom")));
        assert_eq!(res.status, ERROR);
        assert!(res.message.contains("received status code: 500"));
    }

    #[test]
    fn test_argument_count_is_checked() {
        let (contract, _) = contract();
        let mut too_few = args(&Response::success(Vec::new()));
        too_few.truncate(5);
        assert_eq!(invoke(&contract, too_few).status, ERROR);

        let mut too_many = args(&Response::success(Vec::new()));
        too_many.push(Vec::new());
        assert_eq!(invoke(&contract, too_many).status, ERROR);

        let mut minimal = args(&Response::success(Vec::new()));
        minimal.truncate(6);
        assert_eq!(invoke(&contract, minimal).status, 200);
    }
}
