//! Proposal envelope and chaincode invocation model.
//!
//! Every nested message travels as canonical JSON bytes (see [`marshal`]),
//! so that signatures and hashes are computed over exactly what was sent.
//! A [`SignedProposal`] wraps the serialized [`Proposal`]; the proposal's
//! header and payload are themselves serialized messages.

use std::collections::BTreeMap;

use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{EndorserError, Result};
use crate::signature::sha256;
use crate::signer::LocalSigner;

/// Number of random bytes in a client nonce.
pub const NONCE_LEN: usize = 24;

/// Serializes a message into the platform's canonical encoding.
pub fn marshal<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Parses a message from the platform's canonical encoding.
pub fn unmarshal<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Transaction id bound to a nonce and creator: `hex(sha256(nonce || creator))`.
pub fn compute_tx_id(nonce: &[u8], creator: &[u8]) -> String {
    let mut data = Vec::with_capacity(nonce.len() + creator.len());
    data.extend_from_slice(nonce);
    data.extend_from_slice(creator);
    hex::encode(sha256(&data))
}

/// Language / packaging of a chaincode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChaincodeType {
    #[default]
    Undefined,
    Golang,
    Node,
    Car,
    Java,
}

impl std::fmt::Display for ChaincodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChaincodeType::Undefined => "undefined",
            ChaincodeType::Golang => "golang",
            ChaincodeType::Node => "node",
            ChaincodeType::Car => "car",
            ChaincodeType::Java => "java",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChaincodeId {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub path: String,
}

impl ChaincodeId {
    pub fn named(name: &str) -> Self {
        Self { name: name.to_string(), ..Default::default() }
    }
}

impl std::fmt::Display for ChaincodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.version.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:{}", self.name, self.version)
        }
    }
}

/// Arguments to a chaincode call plus the decorations attached by the
/// decoration chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChaincodeInput {
    pub args: Vec<Vec<u8>>,
    #[serde(default)]
    pub decorations: BTreeMap<String, Vec<u8>>,
}

impl ChaincodeInput {
    pub fn from_strs(args: &[&str]) -> Self {
        Self {
            args: args.iter().map(|a| a.as_bytes().to_vec()).collect(),
            decorations: BTreeMap::new(),
        }
    }

    /// First argument interpreted as a function name.
    pub fn function(&self) -> Option<&str> {
        self.args.first().and_then(|a| std::str::from_utf8(a).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChaincodeSpec {
    #[serde(default)]
    pub chaincode_type: ChaincodeType,
    pub chaincode_id: ChaincodeId,
    pub input: ChaincodeInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChaincodeInvocationSpec {
    pub chaincode_spec: ChaincodeSpec,
}

impl ChaincodeInvocationSpec {
    pub fn new(
        chaincode_type: ChaincodeType,
        chaincode_id: ChaincodeId,
        input: ChaincodeInput,
    ) -> Self {
        Self {
            chaincode_spec: ChaincodeSpec { chaincode_type, chaincode_id, input },
        }
    }
}

/// Deployment (install / instantiate / upgrade) payload embedded in a
/// lifecycle contract invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChaincodeDeploymentSpec {
    pub chaincode_spec: ChaincodeSpec,
    #[serde(default)]
    pub code_package: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderType {
    Message,
    Config,
    EndorserTransaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelHeader {
    pub header_type: HeaderType,
    pub version: i32,
    pub channel_id: String,
    pub tx_id: String,
    #[serde(default)]
    pub epoch: u64,
    /// Serialized [`ChaincodeHeaderExtension`].
    #[serde(default)]
    pub extension: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureHeader {
    /// Serialized identity of the submitting client.
    pub creator: Vec<u8>,
    pub nonce: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Serialized [`ChannelHeader`].
    pub channel_header: Vec<u8>,
    /// Serialized [`SignatureHeader`].
    pub signature_header: Vec<u8>,
}

impl Header {
    pub fn channel_header(&self) -> Result<ChannelHeader> {
        unmarshal(&self.channel_header)
    }

    pub fn signature_header(&self) -> Result<SignatureHeader> {
        unmarshal(&self.signature_header)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChaincodeHeaderExtension {
    pub chaincode_id: ChaincodeId,
    /// Visibility mask for the proposal payload in the final transaction.
    #[serde(default)]
    pub payload_visibility: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChaincodeProposalPayload {
    /// Serialized [`ChaincodeInvocationSpec`].
    pub input: Vec<u8>,
    /// Data that is only visible to the endorsers, never to the ledger.
    #[serde(default)]
    pub transient_map: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Serialized [`Header`].
    pub header: Vec<u8>,
    /// Serialized [`ChaincodeProposalPayload`].
    pub payload: Vec<u8>,
    #[serde(default)]
    pub extension: Vec<u8>,
}

impl Proposal {
    pub fn header(&self) -> Result<Header> {
        unmarshal(&self.header)
    }

    pub fn chaincode_payload(&self) -> Result<ChaincodeProposalPayload> {
        unmarshal(&self.payload)
    }

    /// Extracts the invocation spec carried by the payload.
    pub fn invocation_spec(&self) -> Result<ChaincodeInvocationSpec> {
        let payload = self.chaincode_payload()?;
        unmarshal(&payload.input)
    }
}

/// A client-signed proposal. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedProposal {
    pub proposal_bytes: Vec<u8>,
    pub signature: Vec<u8>,
}

impl SignedProposal {
    pub fn proposal(&self) -> Result<Proposal> {
        unmarshal(&self.proposal_bytes)
    }
}

/// Builds and signs a proposal invoking `spec` on `channel_id`.
///
/// Returns the signed proposal and its transaction id, which is bound to a
/// fresh random nonce and the signer's identity.
pub fn create_signed_proposal(
    signer: &LocalSigner,
    channel_id: &str,
    spec: &ChaincodeInvocationSpec,
    transient_map: BTreeMap<String, Vec<u8>>,
) -> Result<(SignedProposal, String)> {
    let mut nonce = vec![0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    create_signed_proposal_with_nonce(signer, channel_id, spec, transient_map, nonce)
}

/// Same as [`create_signed_proposal`] with a caller-chosen nonce.
pub fn create_signed_proposal_with_nonce(
    signer: &LocalSigner,
    channel_id: &str,
    spec: &ChaincodeInvocationSpec,
    transient_map: BTreeMap<String, Vec<u8>>,
    nonce: Vec<u8>,
) -> Result<(SignedProposal, String)> {
    if nonce.is_empty() {
        return Err(EndorserError::InvalidProposal("nonce must be non-empty".to_string()));
    }
    let creator = signer.identity();
    let tx_id = compute_tx_id(&nonce, &creator);

    let extension = ChaincodeHeaderExtension {
        chaincode_id: spec.chaincode_spec.chaincode_id.clone(),
        payload_visibility: Vec::new(),
    };
    let channel_header = ChannelHeader {
        header_type: HeaderType::EndorserTransaction,
        version: 1,
        channel_id: channel_id.to_string(),
        tx_id: tx_id.clone(),
        epoch: 0,
        extension: marshal(&extension)?,
    };
    let header = Header {
        channel_header: marshal(&channel_header)?,
        signature_header: marshal(&SignatureHeader { creator, nonce })?,
    };
    let payload = ChaincodeProposalPayload {
        input: marshal(spec)?,
        transient_map,
    };
    let proposal = Proposal {
        header: marshal(&header)?,
        payload: marshal(&payload)?,
        extension: Vec::new(),
    };

    let proposal_bytes = marshal(&proposal)?;
    let signature = signer.sign(&proposal_bytes)?;
    Ok((SignedProposal { proposal_bytes, signature }, tx_id))
}
