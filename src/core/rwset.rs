//! Read/write sets produced by a transaction simulation.
//!
//! All collections are ordered (namespace, collection, key) so the serialized
//! public bytes are identical on every peer that simulated the same reads and
//! writes.

use serde::{Deserialize, Serialize};

use crate::core::proposal::marshal;
use crate::error::Result;

/// Position of a committed value: block number and transaction index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Height {
    pub block_num: u64,
    pub tx_num: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvRead {
    pub key: String,
    /// `None` when the key did not exist at simulation time.
    pub version: Option<Height>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvWrite {
    pub key: String,
    pub is_delete: bool,
    pub value: Vec<u8>,
}

/// Hash of a private write, published in the public read/write set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvWriteHash {
    pub key_hash: Vec<u8>,
    pub is_delete: bool,
    pub value_hash: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionHashedReadWriteSet {
    pub collection: String,
    pub hashed_writes: Vec<KvWriteHash>,
    /// Hash of the serialized private collection write set.
    pub pvt_rwset_hash: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NsReadWriteSet {
    pub namespace: String,
    pub reads: Vec<KvRead>,
    pub writes: Vec<KvWrite>,
    #[serde(default)]
    pub collection_hashed_rwsets: Vec<CollectionHashedReadWriteSet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TxReadWriteSet {
    pub ns_rwsets: Vec<NsReadWriteSet>,
}

impl TxReadWriteSet {
    pub fn namespace(&self, namespace: &str) -> Option<&NsReadWriteSet> {
        self.ns_rwsets.iter().find(|ns| ns.namespace == namespace)
    }

    pub fn is_empty(&self) -> bool {
        self.ns_rwsets.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionPvtReadWriteSet {
    pub collection: String,
    pub writes: Vec<KvWrite>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NsPvtReadWriteSet {
    pub namespace: String,
    pub collection_pvt_rwsets: Vec<CollectionPvtReadWriteSet>,
}

/// Confidential subset of a simulation, distributed only to authorized peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TxPvtReadWriteSet {
    pub ns_pvt_rwsets: Vec<NsPvtReadWriteSet>,
}

impl TxPvtReadWriteSet {
    pub fn is_empty(&self) -> bool {
        self.ns_pvt_rwsets
            .iter()
            .flat_map(|ns| &ns.collection_pvt_rwsets)
            .all(|c| c.writes.is_empty())
    }
}

/// Everything a simulation yielded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TxSimulationResults {
    pub public: TxReadWriteSet,
    pub private: Option<TxPvtReadWriteSet>,
}

impl TxSimulationResults {
    /// Serialized public read/write set; the bytes an endorsement signs over.
    pub fn public_simulation_bytes(&self) -> Result<Vec<u8>> {
        marshal(&self.public)
    }

    pub fn contains_private_writes(&self) -> bool {
        self.private.as_ref().map(|p| !p.is_empty()).unwrap_or(false)
    }
}
