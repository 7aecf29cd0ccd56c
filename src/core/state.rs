//! In-memory channel ledgers.
//!
//! Reference implementation of the ledger collaborators: versioned public
//! state, private collection state, key history and the set of committed
//! transaction ids. Simulators read committed state only (no read-your-own
//! writes) and buffer their writes until [`MemoryLedger::commit`].
//!
//! # Determinism
//! State maps are ordered, so simulation results are a pure function of the
//! committed state and the sequence of simulator calls.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::core::ledger::{
    HistoryQueryExecutor, KeyModification, Ledger, LedgerError, LedgerProvider, LedgerResult,
    TxSimulator,
};
use crate::core::proposal::marshal;
use crate::core::rwset::{
    CollectionHashedReadWriteSet, CollectionPvtReadWriteSet, Height, KvRead, KvWrite, KvWriteHash,
    NsPvtReadWriteSet, NsReadWriteSet, TxPvtReadWriteSet, TxReadWriteSet, TxSimulationResults,
};
use crate::signature::sha256;

type StateKey = (String, String);
type PrivateKey = (String, String, String);
type CollectionWrites = BTreeMap<String, Vec<KvWrite>>;

fn poisoned() -> LedgerError {
    LedgerError::Other("ledger state lock poisoned".to_string())
}

#[derive(Debug, Clone)]
struct VersionedValue {
    value: Vec<u8>,
    height: Height,
}

#[derive(Debug, Default)]
struct LedgerData {
    public: BTreeMap<StateKey, VersionedValue>,
    private: BTreeMap<PrivateKey, Vec<u8>>,
    history: BTreeMap<StateKey, Vec<KeyModification>>,
    committed: HashSet<String>,
    next_block: u64,
}

/// Thread-safe in-memory ledger for one channel.
#[derive(Debug)]
pub struct MemoryLedger {
    channel_id: String,
    data: Arc<RwLock<LedgerData>>,
    simulators_opened: Arc<AtomicUsize>,
    simulators_released: Arc<AtomicUsize>,
}

impl MemoryLedger {
    pub fn new(channel_id: &str) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            data: Arc::new(RwLock::new(LedgerData::default())),
            simulators_opened: Arc::new(AtomicUsize::new(0)),
            simulators_released: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Commits the simulation results of `tx_id` as a one-transaction block.
    /// Returns the block number.
    pub fn commit(&self, tx_id: &str, results: &TxSimulationResults) -> LedgerResult<u64> {
        let mut data = self.data.write().map_err(|_| poisoned())?;
        if data.committed.contains(tx_id) {
            return Err(LedgerError::Other(format!("transaction {} already committed", tx_id)));
        }
        let height = Height { block_num: data.next_block, tx_num: 0 };

        for ns in &results.public.ns_rwsets {
            for write in &ns.writes {
                let key = (ns.namespace.clone(), write.key.clone());
                let value = if write.is_delete {
                    data.public.remove(&key);
                    None
                } else {
                    let value = VersionedValue { value: write.value.clone(), height };
                    data.public.insert(key.clone(), value);
                    Some(write.value.clone())
                };
                data.history.entry(key).or_default().push(KeyModification {
                    tx_id: tx_id.to_string(),
                    height,
                    value,
                });
            }
        }

        if let Some(private) = &results.private {
            for ns in &private.ns_pvt_rwsets {
                for coll in &ns.collection_pvt_rwsets {
                    for write in &coll.writes {
                        let key =
                            (ns.namespace.clone(), coll.collection.clone(), write.key.clone());
                        if write.is_delete {
                            data.private.remove(&key);
                        } else {
                            data.private.insert(key, write.value.clone());
                        }
                    }
                }
            }
        }

        data.committed.insert(tx_id.to_string());
        data.next_block += 1;
        Ok(height.block_num)
    }

    /// Writes a value directly, outside of any transaction. Intended for seeding state.
    pub fn put_state(&self, namespace: &str, key: &str, value: Vec<u8>) -> LedgerResult<()> {
        let mut data = self.data.write().map_err(|_| poisoned())?;
        let height = Height { block_num: data.next_block, tx_num: 0 };
        let key = (namespace.to_string(), key.to_string());
        data.public.insert(key, VersionedValue { value, height });
        data.next_block += 1;
        Ok(())
    }

    pub fn get_state(&self, namespace: &str, key: &str) -> Option<Vec<u8>> {
        let data = self.data.read().ok()?;
        data.public.get(&(namespace.to_string(), key.to_string())).map(|v| v.value.clone())
    }

    pub fn get_private_data(
        &self,
        namespace: &str,
        collection: &str,
        key: &str,
    ) -> Option<Vec<u8>> {
        let data = self.data.read().ok()?;
        data.private
            .get(&(namespace.to_string(), collection.to_string(), key.to_string()))
            .cloned()
    }

    /// Number of simulators handed out so far.
    pub fn simulators_opened(&self) -> usize {
        self.simulators_opened.load(Ordering::SeqCst)
    }

    /// Number of `done()` calls received from simulators.
    pub fn simulators_released(&self) -> usize {
        self.simulators_released.load(Ordering::SeqCst)
    }
}

impl Ledger for MemoryLedger {
    fn transaction_exists(&self, tx_id: &str) -> LedgerResult<bool> {
        let data = self.data.read().map_err(|_| poisoned())?;
        Ok(data.committed.contains(tx_id))
    }

    fn new_tx_simulator(&self, tx_id: &str) -> LedgerResult<Box<dyn TxSimulator>> {
        self.simulators_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySimulator {
            tx_id: tx_id.to_string(),
            data: Arc::clone(&self.data),
            buffer: Mutex::new(SimulationBuffer::default()),
            released: AtomicBool::new(false),
            release_counter: Arc::clone(&self.simulators_released),
        }))
    }

    fn new_history_query_executor(&self) -> LedgerResult<Box<dyn HistoryQueryExecutor>> {
        Ok(Box::new(MemoryHistory { data: Arc::clone(&self.data) }))
    }
}

#[derive(Debug, Default)]
struct SimulationBuffer {
    reads: BTreeMap<StateKey, Option<Height>>,
    /// `None` marks a delete.
    writes: BTreeMap<StateKey, Option<Vec<u8>>>,
    private_writes: BTreeMap<PrivateKey, Option<Vec<u8>>>,
}

fn kv_write(key: &str, value: &Option<Vec<u8>>) -> KvWrite {
    KvWrite {
        key: key.to_string(),
        is_delete: value.is_none(),
        value: value.clone().unwrap_or_default(),
    }
}

fn namespace_set<'a>(
    namespaces: &'a mut BTreeMap<String, NsReadWriteSet>,
    ns: &str,
) -> &'a mut NsReadWriteSet {
    namespaces.entry(ns.to_string()).or_insert_with(|| NsReadWriteSet {
        namespace: ns.to_string(),
        reads: Vec::new(),
        writes: Vec::new(),
        collection_hashed_rwsets: Vec::new(),
    })
}

/// Simulator over a [`MemoryLedger`].
pub struct MemorySimulator {
    tx_id: String,
    data: Arc<RwLock<LedgerData>>,
    buffer: Mutex<SimulationBuffer>,
    released: AtomicBool,
    release_counter: Arc<AtomicUsize>,
}

impl MemorySimulator {
    fn check_live(&self) -> LedgerResult<()> {
        if self.released.load(Ordering::SeqCst) {
            return Err(LedgerError::SimulatorReleased(self.tx_id.clone()));
        }
        Ok(())
    }

    fn build_private(buffer: &SimulationBuffer) -> BTreeMap<String, CollectionWrites> {
        let mut grouped: BTreeMap<String, CollectionWrites> = BTreeMap::new();
        for ((ns, coll, key), value) in &buffer.private_writes {
            grouped
                .entry(ns.clone())
                .or_default()
                .entry(coll.clone())
                .or_default()
                .push(kv_write(key, value));
        }
        grouped
    }
}

impl TxSimulator for MemorySimulator {
    fn tx_id(&self) -> &str {
        &self.tx_id
    }

    fn get_state(&self, namespace: &str, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        self.check_live()?;
        let state_key = (namespace.to_string(), key.to_string());
        let committed = {
            let data = self.data.read().map_err(|_| poisoned())?;
            data.public.get(&state_key).cloned()
        };
        let mut buffer = self.buffer.lock().map_err(|_| poisoned())?;
        buffer.reads.entry(state_key).or_insert(committed.as_ref().map(|v| v.height));
        Ok(committed.map(|v| v.value))
    }

    fn set_state(&self, namespace: &str, key: &str, value: Vec<u8>) -> LedgerResult<()> {
        self.check_live()?;
        let mut buffer = self.buffer.lock().map_err(|_| poisoned())?;
        buffer.writes.insert((namespace.to_string(), key.to_string()), Some(value));
        Ok(())
    }

    fn delete_state(&self, namespace: &str, key: &str) -> LedgerResult<()> {
        self.check_live()?;
        let mut buffer = self.buffer.lock().map_err(|_| poisoned())?;
        buffer.writes.insert((namespace.to_string(), key.to_string()), None);
        Ok(())
    }

    fn get_private_data(
        &self,
        namespace: &str,
        collection: &str,
        key: &str,
    ) -> LedgerResult<Option<Vec<u8>>> {
        self.check_live()?;
        let data = self.data.read().map_err(|_| poisoned())?;
        Ok(data
            .private
            .get(&(namespace.to_string(), collection.to_string(), key.to_string()))
            .cloned())
    }

    fn set_private_data(
        &self,
        namespace: &str,
        collection: &str,
        key: &str,
        value: Vec<u8>,
    ) -> LedgerResult<()> {
        self.check_live()?;
        let mut buffer = self.buffer.lock().map_err(|_| poisoned())?;
        buffer
            .private_writes
            .insert((namespace.to_string(), collection.to_string(), key.to_string()), Some(value));
        Ok(())
    }

    fn simulation_results(&self) -> LedgerResult<TxSimulationResults> {
        self.check_live()?;
        let buffer = self.buffer.lock().map_err(|_| poisoned())?;

        let mut namespaces: BTreeMap<String, NsReadWriteSet> = BTreeMap::new();
        for ((ns, key), version) in &buffer.reads {
            let read = KvRead { key: key.clone(), version: *version };
            namespace_set(&mut namespaces, ns).reads.push(read);
        }
        for ((ns, key), value) in &buffer.writes {
            namespace_set(&mut namespaces, ns).writes.push(kv_write(key, value));
        }

        let grouped = Self::build_private(&buffer);
        let mut ns_pvt_rwsets = Vec::new();
        for (ns, collections) in grouped {
            let mut collection_pvt_rwsets = Vec::new();
            for (collection, writes) in collections {
                let coll_set = CollectionPvtReadWriteSet { collection: collection.clone(), writes };
                let coll_bytes =
                    marshal(&coll_set).map_err(|e| LedgerError::Other(e.to_string()))?;
                let pvt_rwset_hash = sha256(&coll_bytes).to_vec();
                let hashed_writes = coll_set
                    .writes
                    .iter()
                    .map(|w| KvWriteHash {
                        key_hash: sha256(w.key.as_bytes()).to_vec(),
                        is_delete: w.is_delete,
                        value_hash: if w.is_delete {
                            Vec::new()
                        } else {
                            sha256(&w.value).to_vec()
                        },
                    })
                    .collect();
                namespace_set(&mut namespaces, &ns)
                    .collection_hashed_rwsets
                    .push(CollectionHashedReadWriteSet {
                        collection,
                        hashed_writes,
                        pvt_rwset_hash,
                    });
                collection_pvt_rwsets.push(coll_set);
            }
            ns_pvt_rwsets.push(NsPvtReadWriteSet { namespace: ns, collection_pvt_rwsets });
        }

        let private = if ns_pvt_rwsets.is_empty() {
            None
        } else {
            Some(TxPvtReadWriteSet { ns_pvt_rwsets })
        };

        Ok(TxSimulationResults {
            public: TxReadWriteSet { ns_rwsets: namespaces.into_values().collect() },
            private,
        })
    }

    fn done(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.release_counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct MemoryHistory {
    data: Arc<RwLock<LedgerData>>,
}

impl HistoryQueryExecutor for MemoryHistory {
    fn history_for_key(&self, namespace: &str, key: &str) -> LedgerResult<Vec<KeyModification>> {
        let data = self.data.read().map_err(|_| poisoned())?;
        Ok(data
            .history
            .get(&(namespace.to_string(), key.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// Registry of in-memory channel ledgers.
#[derive(Debug, Default)]
pub struct MemoryLedgerProvider {
    ledgers: RwLock<HashMap<String, Arc<MemoryLedger>>>,
}

impl MemoryLedgerProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or returns the existing) ledger for `channel_id`.
    pub fn create_ledger(&self, channel_id: &str) -> LedgerResult<Arc<MemoryLedger>> {
        let mut ledgers = self.ledgers.write().map_err(|_| poisoned())?;
        Ok(Arc::clone(
            ledgers
                .entry(channel_id.to_string())
                .or_insert_with(|| Arc::new(MemoryLedger::new(channel_id))),
        ))
    }

    pub fn memory_ledger(&self, channel_id: &str) -> Option<Arc<MemoryLedger>> {
        self.ledgers.read().ok()?.get(channel_id).cloned()
    }
}

impl LedgerProvider for MemoryLedgerProvider {
    fn ledger(&self, channel_id: &str) -> Option<Arc<dyn Ledger>> {
        self.memory_ledger(channel_id).map(|l| l as Arc<dyn Ledger>)
    }
}
