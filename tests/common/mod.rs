//! Shared fixtures for pipeline tests: a scriptable chaincode engine, a
//! lifecycle contract, and a harness wiring them to an in-memory ledger.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ledger_endorser::*;

pub const CHANNEL: &str = "testchannel";
pub const CC: &str = "mycc";
pub const CC_VERSION: &str = "1.0";

/// User chaincode engine driven by the first argument:
///
/// - `put k v`, `get k`, `del k`
/// - `private coll k v`: private write
/// - `event name`: success with a chaincode event
/// - `history k`: number of committed modifications of `k`
/// - `decorations`: echoes the decorations it received
/// - `fail status message`: returns that status
/// - `crash`: engine-level error
/// - `panic`: panics inside the engine
///
/// On deploy, `init k v ...` writes the pairs and `badinit` fails with 500.
#[derive(Debug, Default)]
pub struct TestEngine {
    executions: AtomicUsize,
    deployments: AtomicUsize,
}

impl TestEngine {
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn deployments(&self) -> usize {
        self.deployments.load(Ordering::SeqCst)
    }
}

fn arg(input: &ChaincodeInput, i: usize) -> String {
    input.args.get(i).map(|a| String::from_utf8_lossy(a).into_owned()).unwrap_or_default()
}

impl ChaincodeExecutor for TestEngine {
    fn execute(
        &self,
        ctx: &ExecutionContext<'_>,
        target: &ChaincodeTarget,
        input: &ChaincodeInput,
    ) -> std::result::Result<ExecutionOutput, ExecutionError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let ns = target.name.as_str();
        let response = match input.function().unwrap_or_default() {
            "put" => {
                ctx.simulator()?.set_state(ns, &arg(input, 1), arg(input, 2).into_bytes())?;
                Response::success(Vec::new())
            }
            "get" => {
                let value = ctx.simulator()?.get_state(ns, &arg(input, 1))?;
                Response::success(value.unwrap_or_default())
            }
            "del" => {
                ctx.simulator()?.delete_state(ns, &arg(input, 1))?;
                Response::success(Vec::new())
            }
            "private" => {
                ctx.simulator()?.set_private_data(ns, &arg(input, 1), &arg(input, 2), arg(input, 3).into_bytes())?;
                Response::success(Vec::new())
            }
            "event" => {
                let event = ChaincodeEvent {
                    chaincode_id: ns.to_string(),
                    tx_id: ctx.tx_id.to_string(),
                    event_name: arg(input, 1),
                    payload: b"event-payload".to_vec(),
                };
                return Ok((Response::success(Vec::new()), Some(event)));
            }
            "history" => {
                let mods = ctx.history()?.history_for_key(ns, &arg(input, 1))?;
                Response::success(mods.len().to_string().into_bytes())
            }
            "decorations" => Response::success(serde_json::to_vec(&input.decorations).unwrap_or_default()),
            "fail" => Response::with_status(arg(input, 1).parse().unwrap_or(500), arg(input, 2)),
            "crash" => return Err(ExecutionError::Engine("chaincode container crashed".to_string())),
            "panic" => panic!("chaincode panicked"),
            other => Response::error(format!("unknown function {}", other)),
        };
        Ok((response, None))
    }

    fn deploy(
        &self,
        ctx: &ExecutionContext<'_>,
        target: &ChaincodeTarget,
        spec: &ChaincodeDeploymentSpec,
    ) -> std::result::Result<ExecutionOutput, ExecutionError> {
        self.deployments.fetch_add(1, Ordering::SeqCst);
        let input = &spec.chaincode_spec.input;
        match input.function().unwrap_or_default() {
            "badinit" => Ok((Response::error("init failed"), None)),
            _ => {
                let simulator = ctx.simulator()?;
                for pair in input.args[1..].chunks(2) {
                    if let [key, value] = pair {
                        simulator.set_state(&target.name, &String::from_utf8_lossy(key), value.clone())?;
                    }
                }
                Ok((Response::success(Vec::new()), None))
            }
        }
    }
}

/// Lifecycle contract: records a definition for every deploy / upgrade.
pub struct TestLifecycle;

impl SystemContract for TestLifecycle {
    fn invoke(&self, ctx: &ExecutionContext<'_>, input: &ChaincodeInput) -> std::result::Result<ExecutionOutput, ExecutionError> {
        match input.function().unwrap_or_default() {
            "install" => Ok((Response::success(Vec::new()), None)),
            "deploy" | "upgrade" => {
                let Some(package) = input.args.get(2) else {
                    return Ok((Response::error("missing deployment spec"), None));
                };
                let Ok(spec) = unmarshal::<ChaincodeDeploymentSpec>(package) else {
                    return Ok((Response::error("invalid deployment spec"), None));
                };
                let id = &spec.chaincode_spec.chaincode_id;
                let definition = ChaincodeDefinition::new(&id.name, &id.version);
                let bytes = serde_json::to_vec(&definition).map_err(|e| ExecutionError::Engine(e.to_string()))?;
                ctx.simulator()?.set_state(LIFECYCLE_CONTRACT, &id.name, bytes.clone())?;
                Ok((Response::success(bytes), None))
            }
            other => Ok((Response::error(format!("unknown lifecycle function {}", other)), None)),
        }
    }
}

/// Node-local configuration query, usable without a channel.
pub struct TestChannelQuery;

impl SystemContract for TestChannelQuery {
    fn invoke(&self, _ctx: &ExecutionContext<'_>, _input: &ChaincodeInput) -> std::result::Result<ExecutionOutput, ExecutionError> {
        Ok((Response::success(CHANNEL.as_bytes().to_vec()), None))
    }
}

/// Endorsement authority that refuses everything.
pub struct RefusingAuthority;

impl SystemContract for RefusingAuthority {
    fn invoke(&self, _ctx: &ExecutionContext<'_>, _input: &ChaincodeInput) -> std::result::Result<ExecutionOutput, ExecutionError> {
        Ok((Response::error("endorsement policy not satisfied"), None))
    }
}

/// Endorsement authority that refuses with a client-error status.
pub struct ForbiddingAuthority;

impl SystemContract for ForbiddingAuthority {
    fn invoke(
        &self,
        _ctx: &ExecutionContext<'_>,
        _input: &ChaincodeInput,
    ) -> std::result::Result<ExecutionOutput, ExecutionError> {
        Ok((Response::with_status(403, "endorser identity not authorized"), None))
    }
}

/// Failure injected into the test channel's ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerFault {
    None,
    /// `new_history_query_executor` fails.
    HistoryUnavailable,
    /// Simulators fail to produce their read/write sets.
    ResultsUnavailable,
}

/// Wraps a memory ledger and fails one step on demand. Simulators still
/// come from the inner ledger, so its open/release counters stay accurate.
pub struct FaultyLedger {
    inner: Arc<MemoryLedger>,
    fault: LedgerFault,
}

impl Ledger for FaultyLedger {
    fn transaction_exists(&self, tx_id: &str) -> LedgerResult<bool> {
        self.inner.transaction_exists(tx_id)
    }

    fn new_tx_simulator(&self, tx_id: &str) -> LedgerResult<Box<dyn TxSimulator>> {
        let inner = self.inner.new_tx_simulator(tx_id)?;
        Ok(Box::new(FaultySimulator { inner, fault: self.fault }))
    }

    fn new_history_query_executor(&self) -> LedgerResult<Box<dyn HistoryQueryExecutor>> {
        if self.fault == LedgerFault::HistoryUnavailable {
            return Err(LedgerError::Other("history database unavailable".to_string()));
        }
        self.inner.new_history_query_executor()
    }
}

struct FaultySimulator {
    inner: Box<dyn TxSimulator>,
    fault: LedgerFault,
}

impl TxSimulator for FaultySimulator {
    fn tx_id(&self) -> &str {
        self.inner.tx_id()
    }

    fn get_state(&self, namespace: &str, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        self.inner.get_state(namespace, key)
    }

    fn set_state(&self, namespace: &str, key: &str, value: Vec<u8>) -> LedgerResult<()> {
        self.inner.set_state(namespace, key, value)
    }

    fn delete_state(&self, namespace: &str, key: &str) -> LedgerResult<()> {
        self.inner.delete_state(namespace, key)
    }

    fn get_private_data(
        &self,
        namespace: &str,
        collection: &str,
        key: &str,
    ) -> LedgerResult<Option<Vec<u8>>> {
        self.inner.get_private_data(namespace, collection, key)
    }

    fn set_private_data(
        &self,
        namespace: &str,
        collection: &str,
        key: &str,
        value: Vec<u8>,
    ) -> LedgerResult<()> {
        self.inner.set_private_data(namespace, collection, key, value)
    }

    fn simulation_results(&self) -> LedgerResult<TxSimulationResults> {
        if self.fault == LedgerFault::ResultsUnavailable {
            return Err(LedgerError::Other("state database unavailable".to_string()));
        }
        self.inner.simulation_results()
    }

    fn done(&self) {
        self.inner.done()
    }
}

/// Serves a single [`FaultyLedger`] for [`CHANNEL`].
pub struct FaultyLedgers {
    ledger: Arc<FaultyLedger>,
}

impl LedgerProvider for FaultyLedgers {
    fn ledger(&self, channel_id: &str) -> Option<Arc<dyn Ledger>> {
        if channel_id != CHANNEL {
            return None;
        }
        let ledger: Arc<dyn Ledger> = self.ledger.clone();
        Some(ledger)
    }
}

/// Channel writers ACL that counts evaluations.
#[derive(Debug, Default)]
pub struct CountingAcl {
    pub inner: ChannelWritersAcl,
    checks: AtomicUsize,
}

impl CountingAcl {
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

impl AclProvider for CountingAcl {
    fn check_acl(&self, resource: &str, channel_id: &str, signed: &SignedProposal) -> anyhow::Result<()> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.inner.check_acl(resource, channel_id, signed)
    }
}

pub struct Harness {
    pub endorser: Endorser,
    pub ledger: Arc<MemoryLedger>,
    pub client: LocalSigner,
    pub peer: Arc<LocalSigner>,
    pub engine: Arc<TestEngine>,
    pub acl: Arc<CountingAcl>,
    pub installs: Arc<MemoryChaincodeInstalls>,
    pub private_store: Arc<MemoryPrivateDataStore>,
    pub counters: Arc<ProposalCounters>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(|builder| builder)
    }

    /// Builds the default harness, letting the caller adjust the builder last.
    pub fn with(customize: impl FnOnce(EndorserBuilder) -> EndorserBuilder) -> Self {
        Self::build(LedgerFault::None, customize)
    }

    /// Builds the default harness over a channel ledger that fails as `fault` says.
    pub fn with_fault(fault: LedgerFault) -> Self {
        Self::build(fault, |builder| builder)
    }

    fn build(
        fault: LedgerFault,
        customize: impl FnOnce(EndorserBuilder) -> EndorserBuilder,
    ) -> Self {
        let memory = Arc::new(MemoryLedgerProvider::new());
        let ledger = memory.create_ledger(CHANNEL).unwrap();
        let ledgers: Arc<dyn LedgerProvider> = match fault {
            LedgerFault::None => memory,
            fault => Arc::new(FaultyLedgers {
                ledger: Arc::new(FaultyLedger { inner: ledger.clone(), fault }),
            }),
        };
        let client = LocalSigner::generate();
        let peer = Arc::new(LocalSigner::generate());
        let engine = Arc::new(TestEngine::default());
        let acl = Arc::new(CountingAcl::default());
        acl.inner.add_writer(CHANNEL, client.identity());
        let installs = Arc::new(MemoryChaincodeInstalls::new());
        let private_store = Arc::new(MemoryPrivateDataStore::new());
        let counters = Arc::new(ProposalCounters::new());

        let builder = Endorser::builder(ledgers, engine.clone(), peer.clone())
            .acl(acl.clone())
            .installed_chaincodes(installs.clone())
            .private_data_distributor(private_store.clone())
            .metrics(counters.clone())
            .system_contract(
                LIFECYCLE_CONTRACT,
                ContractCapabilities::lifecycle(),
                Arc::new(TestLifecycle),
            )
            .system_contract(
                CONFIGURATION_CONTRACT,
                ContractCapabilities::system(true, false),
                Arc::new(TestChannelQuery),
            );
        let endorser = customize(builder).build().unwrap();

        Self { endorser, ledger, client, peer, engine, acl, installs, private_store, counters }
    }

    /// Records `definition` on the ledger and installs a matching package.
    pub fn instantiate_definition(&self, definition: &ChaincodeDefinition, installed_policy: Option<Vec<u8>>) {
        self.ledger
            .put_state(LIFECYCLE_CONTRACT, &definition.name, marshal(definition).unwrap())
            .unwrap();
        self.installs.install(InstalledChaincode {
            name: definition.name.clone(),
            version: definition.version.clone(),
            instantiation_policy: installed_policy,
        });
    }

    pub fn instantiate(&self, name: &str, version: &str) {
        self.instantiate_definition(&ChaincodeDefinition::new(name, version), None);
    }

    pub fn spec(chaincode: &str, args: &[&str]) -> ChaincodeInvocationSpec {
        ChaincodeInvocationSpec::new(ChaincodeType::Golang, ChaincodeId::named(chaincode), ChaincodeInput::from_strs(args))
    }

    pub fn propose_spec(&self, channel: &str, spec: &ChaincodeInvocationSpec) -> (SignedProposal, String) {
        create_signed_proposal(&self.client, channel, spec, BTreeMap::new()).unwrap()
    }

    pub fn propose(&self, chaincode: &str, args: &[&str]) -> (SignedProposal, String) {
        self.propose_spec(CHANNEL, &Self::spec(chaincode, args))
    }

    pub fn process(&self, signed: &SignedProposal) -> ProposalOutcome {
        self.endorser.process_proposal(signed).unwrap()
    }

    /// Commits the public read/write set endorsed in `response`.
    pub fn commit(&self, tx_id: &str, response: &ProposalResponse) {
        let action = response.chaincode_action().unwrap();
        let public: TxReadWriteSet = unmarshal(&action.results).unwrap();
        self.ledger.commit(tx_id, &TxSimulationResults { public, private: None }).unwrap();
    }

    pub fn assert_simulators_balanced(&self) {
        assert_eq!(
            self.ledger.simulators_opened(),
            self.ledger.simulators_released(),
            "every opened simulator must be released exactly once"
        );
    }
}

/// A lifecycle `deploy` (or `upgrade`) spec for `name:version` whose
/// initialization input is `init_args`.
pub fn lifecycle_spec(function: &str, name: &str, version: &str, chaincode_type: ChaincodeType, init_args: &[&str]) -> ChaincodeInvocationSpec {
    let deployment = ChaincodeDeploymentSpec {
        chaincode_spec: ChaincodeSpec {
            chaincode_type,
            chaincode_id: ChaincodeId { name: name.to_string(), version: version.to_string(), path: String::new() },
            input: ChaincodeInput::from_strs(init_args),
        },
        code_package: b"package".to_vec(),
    };
    ChaincodeInvocationSpec::new(
        ChaincodeType::Golang,
        ChaincodeId::named(LIFECYCLE_CONTRACT),
        ChaincodeInput {
            args: vec![function.as_bytes().to_vec(), CHANNEL.as_bytes().to_vec(), marshal(&deployment).unwrap()],
            decorations: BTreeMap::new(),
        },
    )
}
