//! Hand-off of private read/write sets to the distribution collaborator.

use std::sync::Mutex;

use tracing::{debug, error};

use crate::core::rwset::TxPvtReadWriteSet;
use crate::core::Endorser;
use crate::error::{EndorserError, Result};

/// Replicates private data to the peers authorized to hold it.
pub trait PrivateDataDistributor: Send + Sync {
    fn distribute_private_data(
        &self,
        channel_id: &str,
        tx_id: &str,
        private: &TxPvtReadWriteSet,
    ) -> anyhow::Result<()>;
}

impl<F> PrivateDataDistributor for F
where
    F: Fn(&str, &str, &TxPvtReadWriteSet) -> anyhow::Result<()> + Send + Sync,
{
    fn distribute_private_data(
        &self,
        channel_id: &str,
        tx_id: &str,
        private: &TxPvtReadWriteSet,
    ) -> anyhow::Result<()> {
        self(channel_id, tx_id, private)
    }
}

/// A private data set handed over for one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedPrivateData {
    pub channel_id: String,
    pub tx_id: String,
    pub private: TxPvtReadWriteSet,
}

/// Keeps distributed private data in memory, standing in for the transient
/// store of a single-peer deployment.
#[derive(Debug, Default)]
pub struct MemoryPrivateDataStore {
    entries: Mutex<Vec<DistributedPrivateData>>,
}

impl MemoryPrivateDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tx_id: &str) -> Option<DistributedPrivateData> {
        self.entries.lock().ok()?.iter().find(|e| e.tx_id == tx_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PrivateDataDistributor for MemoryPrivateDataStore {
    fn distribute_private_data(
        &self,
        channel_id: &str,
        tx_id: &str,
        private: &TxPvtReadWriteSet,
    ) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("private data store lock poisoned"))?;
        entries.push(DistributedPrivateData {
            channel_id: channel_id.to_string(),
            tx_id: tx_id.to_string(),
            private: private.clone(),
        });
        Ok(())
    }
}

impl Endorser {
    /// Distributes the private subset of a simulation. A failure here means no
    /// endorsement may be produced for the transaction.
    pub(crate) fn distribute_private_data(
        &self,
        channel_id: &str,
        tx_id: &str,
        private: &TxPvtReadWriteSet,
    ) -> Result<()> {
        debug!(tx_id = %tx_id, channel = %channel_id, "distributing private data");
        self.distributor
            .distribute_private_data(channel_id, tx_id, private)
            .map_err(|e| {
                let reason = format!("{:#}", e);
                error!(
                    tx_id = %tx_id,
                    channel = %channel_id,
                    error = %reason,
                    "private data distribution failed"
                );
                EndorserError::PrivateDataDistributionFailed(reason)
            })
    }
}
