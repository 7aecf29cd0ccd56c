//! Structural and cryptographic checks on incoming signed proposals.

use crate::core::proposal::{
    compute_tx_id, unmarshal, ChaincodeHeaderExtension, ChannelHeader, HeaderType, Proposal,
    SignatureHeader, SignedProposal,
};
use crate::error::{EndorserError, Result};
use crate::signature::verify_bytes;

/// A proposal whose signature and structure have been verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedProposal {
    pub proposal: Proposal,
    pub channel_header: ChannelHeader,
    pub signature_header: SignatureHeader,
    pub extension: ChaincodeHeaderExtension,
}

impl ValidatedProposal {
    pub fn channel_id(&self) -> &str {
        &self.channel_header.channel_id
    }

    pub fn tx_id(&self) -> &str {
        &self.channel_header.tx_id
    }

    pub fn chaincode_name(&self) -> &str {
        &self.extension.chaincode_id.name
    }
}

/// Authenticates and parses a signed proposal. The pipeline trusts the
/// returned parts for the rest of the request.
pub trait ProposalValidator: Send + Sync {
    fn validate(&self, signed: &SignedProposal) -> Result<ValidatedProposal>;
}

/// Checks the creator's signature, the header type, and that the transaction
/// id is bound to the nonce and creator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignedProposalValidator;

fn invalid(context: &str, err: impl std::fmt::Display) -> EndorserError {
    EndorserError::InvalidProposal(format!("{}: {}", context, err))
}

impl ProposalValidator for SignedProposalValidator {
    fn validate(&self, signed: &SignedProposal) -> Result<ValidatedProposal> {
        if signed.proposal_bytes.is_empty() {
            return Err(EndorserError::InvalidProposal("nil proposal".to_string()));
        }
        let proposal = signed.proposal().map_err(|e| invalid("failed to decode proposal", e))?;
        let header = proposal.header().map_err(|e| invalid("failed to decode header", e))?;
        let channel_header = header
            .channel_header()
            .map_err(|e| invalid("failed to decode channel header", e))?;
        let signature_header = header
            .signature_header()
            .map_err(|e| invalid("failed to decode signature header", e))?;

        match channel_header.header_type {
            HeaderType::EndorserTransaction | HeaderType::Config => {}
            other => {
                let message = format!("unsupported header type {:?}", other);
                return Err(EndorserError::InvalidProposal(message));
            }
        }

        if signature_header.creator.is_empty() {
            return Err(EndorserError::InvalidProposal("creator is empty".to_string()));
        }
        if signature_header.nonce.is_empty() {
            return Err(EndorserError::InvalidProposal("nonce is empty".to_string()));
        }

        let creator = &signature_header.creator;
        let verified = verify_bytes(creator, &signed.proposal_bytes, &signed.signature)
            .map_err(|e| invalid("signature check failed", e))?;
        if !verified {
            return Err(EndorserError::InvalidProposal(
                "signature is not valid for creator".to_string(),
            ));
        }

        if channel_header.tx_id.is_empty() {
            return Err(EndorserError::InvalidProposal(
                "invalid txID. It must be different from the empty string".to_string(),
            ));
        }
        let expected = compute_tx_id(&signature_header.nonce, &signature_header.creator);
        if channel_header.tx_id != expected {
            return Err(EndorserError::InvalidProposal(format!(
                "invalid txID. Computed [{}], got [{}]",
                expected, channel_header.tx_id
            )));
        }

        let extension: ChaincodeHeaderExtension = unmarshal(&channel_header.extension)
            .map_err(|e| invalid("failed to decode chaincode header extension", e))?;
        if extension.chaincode_id.name.is_empty() {
            return Err(EndorserError::InvalidProposal("chaincode id is empty".to_string()));
        }

        Ok(ValidatedProposal {
            proposal,
            channel_header,
            signature_header,
            extension,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::core::proposal::{
        create_signed_proposal, marshal, ChaincodeId, ChaincodeInput, ChaincodeInvocationSpec,
        ChaincodeType, Header,
    };
    use crate::signer::LocalSigner;

    fn spec(name: &str) -> ChaincodeInvocationSpec {
        let input = ChaincodeInput::from_strs(&["get", "a"]);
        ChaincodeInvocationSpec::new(ChaincodeType::Golang, ChaincodeId::named(name), input)
    }

    fn propose(signer: &LocalSigner, name: &str) -> (SignedProposal, String) {
        create_signed_proposal(signer, "ch", &spec(name), BTreeMap::new()).unwrap()
    }

    fn resign(signer: &LocalSigner, proposal: &Proposal) -> SignedProposal {
        let proposal_bytes = marshal(proposal).unwrap();
        let signature = signer.sign(&proposal_bytes).unwrap();
        SignedProposal { proposal_bytes, signature }
    }

    fn with_channel_header(
        signer: &LocalSigner,
        edit: impl FnOnce(&mut ChannelHeader),
    ) -> SignedProposal {
        let (signed, _) = propose(signer, "mycc");
        let mut proposal = signed.proposal().unwrap();
        let mut header = proposal.header().unwrap();
        let mut chdr = header.channel_header().unwrap();
        edit(&mut chdr);
        header.channel_header = marshal(&chdr).unwrap();
        proposal.header = marshal::<Header>(&header).unwrap();
        resign(signer, &proposal)
    }

    #[test]
    fn test_valid_proposal_is_parsed() {
        let signer = LocalSigner::generate();
        let (signed, tx_id) = propose(&signer, "mycc");

        let validated = SignedProposalValidator.validate(&signed).unwrap();
        assert_eq!(validated.channel_id(), "ch");
        assert_eq!(validated.tx_id(), tx_id);
        assert_eq!(validated.chaincode_name(), "mycc");
        assert_eq!(validated.signature_header.creator, signer.identity());
    }

    #[test]
    fn test_garbage_is_rejected() {
        let signed = SignedProposal {
            proposal_bytes: b"not a proposal".to_vec(),
            signature: Vec::new(),
        };
        let result = SignedProposalValidator.validate(&signed);
        assert!(matches!(result, Err(EndorserError::InvalidProposal(_))));

        let empty = SignedProposal { proposal_bytes: Vec::new(), signature: Vec::new() };
        let result = SignedProposalValidator.validate(&empty);
        assert!(matches!(result, Err(EndorserError::InvalidProposal(_))));
    }

    #[test]
    fn test_foreign_signature_is_rejected() {
        let signer = LocalSigner::generate();
        let other = LocalSigner::generate();
        let (mut signed, _) = propose(&signer, "mycc");
        signed.signature = other.sign(&signed.proposal_bytes).unwrap();

        let err = SignedProposalValidator.validate(&signed).unwrap_err();
        assert!(err.to_string().contains("signature"));
    }

    #[test]
    fn test_unbound_tx_id_is_rejected() {
        let signer = LocalSigner::generate();
        let signed = with_channel_header(&signer, |chdr| chdr.tx_id = "forged".to_string());
        let err = SignedProposalValidator.validate(&signed).unwrap_err();
        assert!(err.to_string().contains("invalid txID"));

        let signed = with_channel_header(&signer, |chdr| chdr.tx_id.clear());
        let err = SignedProposalValidator.validate(&signed).unwrap_err();
        assert!(err.to_string().contains("empty string"));
    }

    #[test]
    fn test_message_header_type_is_rejected() {
        let signer = LocalSigner::generate();
        let signed = with_channel_header(&signer, |chdr| chdr.header_type = HeaderType::Message);
        let err = SignedProposalValidator.validate(&signed).unwrap_err();
        assert!(err.to_string().contains("unsupported header type"));

        let signed = with_channel_header(&signer, |chdr| chdr.header_type = HeaderType::Config);
        assert!(SignedProposalValidator.validate(&signed).is_ok());
    }

    #[test]
    fn test_empty_chaincode_name_is_rejected() {
        let signer = LocalSigner::generate();
        let (signed, _) = propose(&signer, "");
        let err = SignedProposalValidator.validate(&signed).unwrap_err();
        assert!(err.to_string().contains("chaincode id is empty"));
    }
}
