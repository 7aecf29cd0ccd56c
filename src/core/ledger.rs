//! Ledger collaborators used by the pipeline: channel ledgers, per-transaction
//! simulators and history queries.
//!
//! The pipeline never looks inside these; it opens, uses and releases them.

use std::sync::Arc;

use thiserror::Error;

use crate::core::rwset::{Height, TxSimulationResults};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("channel does not exist: {0}")]
    ChannelNotFound(String),

    #[error("transaction simulator already released for tx {0}")]
    SimulatorReleased(String),

    #[error("ledger error: {0}")]
    Other(String),
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Looks up channel ledgers.
pub trait LedgerProvider: Send + Sync {
    fn ledger(&self, channel_id: &str) -> Option<Arc<dyn Ledger>>;
}

/// A single channel's ledger.
pub trait Ledger: Send + Sync {
    /// Whether a transaction with this id has been committed.
    fn transaction_exists(&self, tx_id: &str) -> LedgerResult<bool>;

    /// Opens a simulation context for one transaction. The caller owns it
    /// exclusively and must release it exactly once.
    fn new_tx_simulator(&self, tx_id: &str) -> LedgerResult<Box<dyn TxSimulator>>;

    fn new_history_query_executor(&self) -> LedgerResult<Box<dyn HistoryQueryExecutor>>;
}

/// Per-transaction view of world state that records reads and writes.
pub trait TxSimulator: Send + Sync {
    fn tx_id(&self) -> &str;

    fn get_state(&self, namespace: &str, key: &str) -> LedgerResult<Option<Vec<u8>>>;

    fn set_state(&self, namespace: &str, key: &str, value: Vec<u8>) -> LedgerResult<()>;

    fn delete_state(&self, namespace: &str, key: &str) -> LedgerResult<()>;

    fn get_private_data(
        &self,
        namespace: &str,
        collection: &str,
        key: &str,
    ) -> LedgerResult<Option<Vec<u8>>>;

    fn set_private_data(
        &self,
        namespace: &str,
        collection: &str,
        key: &str,
        value: Vec<u8>,
    ) -> LedgerResult<()>;

    /// Read/write sets accumulated so far.
    fn simulation_results(&self) -> LedgerResult<TxSimulationResults>;

    /// Releases the simulator. Further use returns [`LedgerError::SimulatorReleased`].
    fn done(&self);
}

/// A historic modification of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyModification {
    pub tx_id: String,
    pub height: Height,
    pub value: Option<Vec<u8>>,
}

pub trait HistoryQueryExecutor: Send + Sync {
    fn history_for_key(&self, namespace: &str, key: &str) -> LedgerResult<Vec<KeyModification>>;
}

/// Scoped ownership of a [`TxSimulator`].
///
/// Dropping the guard releases the simulator, so early returns, errors and
/// unwinding panics all release it the same way, exactly once.
pub struct SimulatorGuard {
    inner: Box<dyn TxSimulator>,
}

impl SimulatorGuard {
    pub fn new(inner: Box<dyn TxSimulator>) -> Self {
        Self { inner }
    }

    pub fn simulator(&self) -> &dyn TxSimulator {
        self.inner.as_ref()
    }
}

impl Drop for SimulatorGuard {
    fn drop(&mut self) {
        self.inner.done();
    }
}
