// Proposal endorsement pipeline.
//
// A signed proposal moves through
//   validation -> admission -> resolution -> simulation
//   -> (private data distribution) -> endorsement -> response
// and always ends in a `ProposalOutcome`, except when the target channel is
// unknown.
//
// INVARIANTS:
// - A transaction simulator is opened only for channel-scoped proposals,
//   after admission, and is released exactly once through `SimulatorGuard`.
// - Private data is distributed before the public read/write set is
//   serialized; a distribution failure means no endorsement.
// - Nothing is ever committed here.

pub mod admission;
pub mod decoration;
pub mod definition;
pub mod endorsement;
pub mod escc;
pub mod execution;
pub mod ledger;
pub mod outcome;
pub mod private_data;
pub mod proposal;
pub mod registry;
pub mod response;
pub mod rwset;
pub mod simulation;
pub mod state;
pub mod system;
pub mod validation;

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::config::EndorserConfig;
use crate::core::admission::{
    check_access, check_channel_scope, reject_if_duplicate, reject_if_not_invokable_externally,
    AclProvider, ChannelScope, ChannelWritersAcl,
};
use crate::core::decoration::DecorationChain;
use crate::core::definition::{
    DefinitionResolver, DefinitionStore, InstalledChaincodes, LifecycleDefinitionStore,
    MemoryChaincodeInstalls,
};
use crate::core::endorsement::EndorsementResult;
use crate::core::escc::EndorsementContract;
use crate::core::execution::{ChaincodeExecutor, ExecutionContext};
use crate::core::ledger::{LedgerProvider, SimulatorGuard};
use crate::core::outcome::ProposalOutcome;
use crate::core::private_data::{MemoryPrivateDataStore, PrivateDataDistributor};
use crate::core::proposal::{marshal, ChaincodeHeaderExtension, SignedProposal};
use crate::core::registry::{ContractCapabilities, ContractRegistry, ENDORSEMENT_CONTRACT};
use crate::core::response::{
    create_proposal_response_failure, ProposalResponse, Response, ERROR, ERROR_THRESHOLD,
};
use crate::core::system::{SystemContract, SystemContractDispatcher};
use crate::core::validation::{ProposalValidator, SignedProposalValidator, ValidatedProposal};
use crate::error::{EndorserError, Result};
use crate::metrics::{NopMetrics, ProposalEvent, ProposalMetrics};
use crate::signer::LocalSigner;

/// The endorsing peer's proposal processor.
///
/// All collaborators are injected through [`EndorserBuilder`]. An `Endorser`
/// holds no per-request state and can serve concurrent proposals.
pub struct Endorser {
    pub(crate) config: EndorserConfig,
    pub(crate) validator: Arc<dyn ProposalValidator>,
    pub(crate) ledgers: Arc<dyn LedgerProvider>,
    pub(crate) acl: Arc<dyn AclProvider>,
    pub(crate) registry: ContractRegistry,
    pub(crate) resolver: DefinitionResolver,
    pub(crate) executor: Arc<dyn ChaincodeExecutor>,
    pub(crate) decorations: DecorationChain,
    pub(crate) distributor: Arc<dyn PrivateDataDistributor>,
    pub(crate) metrics: Arc<dyn ProposalMetrics>,
}

impl Endorser {
    /// Starts building an endorser around a ledger provider, the user
    /// chaincode engine and this peer's signing identity.
    pub fn builder(
        ledgers: Arc<dyn LedgerProvider>,
        user_engine: Arc<dyn ChaincodeExecutor>,
        signer: Arc<LocalSigner>,
    ) -> EndorserBuilder {
        EndorserBuilder::new(ledgers, user_engine, signer)
    }

    pub fn config(&self) -> &EndorserConfig {
        &self.config
    }

    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    /// Processes a signed proposal.
    ///
    /// Returns `Err` only when the proposal names a channel this peer has no
    /// ledger for. Every other failure is reported as an outcome carrying a
    /// response for the client.
    pub fn process_proposal(&self, signed: &SignedProposal) -> Result<ProposalOutcome> {
        self.metrics.record(ProposalEvent::Received);
        let result = self.process(signed);
        match &result {
            Ok(outcome) => self.metrics.record(outcome.event()),
            Err(_) => self.metrics.record(ProposalEvent::ChannelNotFound),
        }
        result
    }

    fn process(&self, signed: &SignedProposal) -> Result<ProposalOutcome> {
        let validated = match self.validator.validate(signed) {
            Ok(validated) => validated,
            Err(err) => {
                warn!(error = %err, "proposal failed validation");
                return Ok(ProposalOutcome::rejected(err));
            }
        };
        let ValidatedProposal {
            proposal,
            channel_header,
            signature_header,
            extension,
        } = &validated;
        let chaincode = extension.chaincode_id.name.as_str();
        let creator = signature_header.creator.as_slice();

        if let Err(err) = reject_if_not_invokable_externally(&self.registry, chaincode, creator) {
            return Ok(ProposalOutcome::rejected(err));
        }

        let tx_id = channel_header.tx_id.as_str();
        if tx_id.is_empty() {
            return Ok(ProposalOutcome::rejected(EndorserError::InvalidProposal(
                "invalid txID. It must be different from the empty string".to_string(),
            )));
        }
        let channel_id = channel_header.channel_id.as_str();
        debug!(
            tx_id = %tx_id,
            channel = %channel_id,
            chaincode = %chaincode,
            "processing proposal"
        );

        let ledger = match check_channel_scope(channel_id) {
            ChannelScope::Chainless => None,
            ChannelScope::Channel(channel) => {
                let ledger = self.ledgers.ledger(channel).ok_or_else(|| {
                    error!(tx_id = %tx_id, channel = %channel, "channel not found");
                    EndorserError::ChannelNotFound(channel.to_string())
                })?;
                let admitted = reject_if_duplicate(ledger.as_ref(), tx_id, creator).and_then(|_| {
                    check_access(self.acl.as_ref(), &self.registry, chaincode, channel, signed)
                });
                if let Err(err) = admitted {
                    warn!(
                        tx_id = %tx_id,
                        channel = %channel,
                        error = %err,
                        "proposal refused at admission"
                    );
                    return Ok(ProposalOutcome::rejected(err));
                }
                Some(ledger)
            }
        };

        let (guard, history) = match &ledger {
            None => (None, None),
            Some(ledger) => {
                let guard = match ledger.new_tx_simulator(tx_id) {
                    Ok(simulator) => SimulatorGuard::new(simulator),
                    Err(err) => return Ok(ProposalOutcome::rejected(err.into())),
                };
                let history = match ledger.new_history_query_executor() {
                    Ok(history) => history,
                    Err(err) => return Ok(ProposalOutcome::rejected(err.into())),
                };
                (Some(guard), Some(history))
            }
        };

        let ctx = ExecutionContext {
            channel_id,
            tx_id,
            signed_proposal: signed,
            proposal,
            simulator: guard.as_ref().map(SimulatorGuard::simulator),
            history: history.as_deref(),
        };
        Ok(self.simulate_and_endorse(&ctx, extension))
    }

    fn simulate_and_endorse(
        &self,
        ctx: &ExecutionContext<'_>,
        extension: &ChaincodeHeaderExtension,
    ) -> ProposalOutcome {
        let chaincode_id = &extension.chaincode_id;
        let simulation = match self.simulate_proposal(ctx, chaincode_id) {
            Ok(simulation) => simulation,
            Err(err) => {
                error!(
                    tx_id = %ctx.tx_id,
                    chaincode = %chaincode_id,
                    error = %err,
                    "simulation failed"
                );
                return ProposalOutcome::rejected(err);
            }
        };
        let response = &simulation.response;
        let chaincode_error = || EndorserError::Chaincode {
            status: response.status,
            message: response.message.clone(),
        };

        if response.status >= ERROR {
            error!(
                tx_id = %ctx.tx_id,
                chaincode = %chaincode_id,
                status = response.status,
                "simulation resulted in chaincode error"
            );
            let failure = simulation
                .event
                .as_ref()
                .map(marshal)
                .transpose()
                .and_then(|events| {
                    create_proposal_response_failure(
                        &ctx.proposal.header,
                        &ctx.proposal.payload,
                        response,
                        &simulation.results,
                        &events.unwrap_or_default(),
                        chaincode_id,
                        &extension.payload_visibility,
                    )
                });
            return match failure {
                Ok(prop_response) => ProposalOutcome::ChaincodeError {
                    response: prop_response,
                    error: chaincode_error(),
                },
                Err(err) => ProposalOutcome::rejected(err),
            };
        }

        // chainless proposals cannot become transactions and are not endorsed
        if ctx.is_chainless() {
            let prop_response = ProposalResponse::bare(response.clone());
            if response.status >= ERROR_THRESHOLD {
                return ProposalOutcome::ChaincodeError {
                    response: prop_response,
                    error: chaincode_error(),
                };
            }
            return ProposalOutcome::Success(prop_response);
        }

        let visibility = &extension.payload_visibility;
        match self.endorse_proposal(ctx, chaincode_id, &simulation, visibility) {
            Err(err) => {
                error!(
                    tx_id = %ctx.tx_id,
                    chaincode = %chaincode_id,
                    error = %err,
                    "endorsement failed"
                );
                ProposalOutcome::rejected(err)
            }
            Ok(EndorsementResult::Refused(refusal)) => {
                let error = EndorserError::EndorsementRejected {
                    status: refusal.status,
                    message: refusal.message.clone(),
                };
                // the client sees a server error whatever status the authority used
                let status = refusal.status.max(ERROR);
                ProposalOutcome::Rejected {
                    error,
                    response: ProposalResponse::bare(Response { status, ..refusal }),
                }
            }
            Ok(EndorsementResult::Endorsed(mut prop_response)) => {
                if response.status >= ERROR_THRESHOLD {
                    debug!(
                        tx_id = %ctx.tx_id,
                        status = response.status,
                        "endorsed a chaincode error"
                    );
                    return ProposalOutcome::ChaincodeError {
                        response: prop_response,
                        error: chaincode_error(),
                    };
                }
                prop_response.response.payload = response.payload.clone();
                ProposalOutcome::Success(prop_response)
            }
        }
    }
}

impl std::fmt::Debug for Endorser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endorser")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("decorations", &self.decorations)
            .finish_non_exhaustive()
    }
}

/// Assembles an [`Endorser`].
///
/// Defaults: signature-checking validator, platform system contracts with
/// the built-in endorsement contract, an ACL that denies every application
/// proposal until writers are granted, ledger-backed definitions with no
/// chaincode installed, in-memory private data store, no decorators, and no
/// metrics.
pub struct EndorserBuilder {
    config: EndorserConfig,
    ledgers: Arc<dyn LedgerProvider>,
    user_engine: Arc<dyn ChaincodeExecutor>,
    signer: Arc<LocalSigner>,
    validator: Arc<dyn ProposalValidator>,
    acl: Arc<dyn AclProvider>,
    registry: ContractRegistry,
    system_contracts: Vec<(String, Arc<dyn SystemContract>)>,
    definitions: Arc<dyn DefinitionStore>,
    installs: Arc<dyn InstalledChaincodes>,
    decorations: DecorationChain,
    distributor: Arc<dyn PrivateDataDistributor>,
    metrics: Arc<dyn ProposalMetrics>,
}

impl EndorserBuilder {
    pub fn new(
        ledgers: Arc<dyn LedgerProvider>,
        user_engine: Arc<dyn ChaincodeExecutor>,
        signer: Arc<LocalSigner>,
    ) -> Self {
        Self {
            config: EndorserConfig::default(),
            ledgers,
            user_engine,
            signer,
            validator: Arc::new(SignedProposalValidator),
            acl: Arc::new(ChannelWritersAcl::new()),
            registry: ContractRegistry::with_platform_defaults(),
            system_contracts: Vec::new(),
            definitions: Arc::new(LifecycleDefinitionStore),
            installs: Arc::new(MemoryChaincodeInstalls::new()),
            decorations: DecorationChain::new(),
            distributor: Arc::new(MemoryPrivateDataStore::new()),
            metrics: Arc::new(NopMetrics),
        }
    }

    pub fn config(mut self, config: EndorserConfig) -> Self {
        self.config = config;
        self
    }

    pub fn validator(mut self, validator: Arc<dyn ProposalValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn acl(mut self, acl: Arc<dyn AclProvider>) -> Self {
        self.acl = acl;
        self
    }

    /// Registers an in-process system contract. Registering under an existing
    /// name replaces both its capabilities and its implementation.
    pub fn system_contract(
        mut self,
        name: &str,
        capabilities: ContractCapabilities,
        contract: Arc<dyn SystemContract>,
    ) -> Self {
        self.registry.register(name, ContractCapabilities { is_system: true, ..capabilities });
        self.system_contracts.push((name.to_string(), contract));
        self
    }

    pub fn definition_store(mut self, definitions: Arc<dyn DefinitionStore>) -> Self {
        self.definitions = definitions;
        self
    }

    pub fn installed_chaincodes(mut self, installs: Arc<dyn InstalledChaincodes>) -> Self {
        self.installs = installs;
        self
    }

    pub fn decorations(mut self, decorations: DecorationChain) -> Self {
        self.decorations = decorations;
        self
    }

    pub fn private_data_distributor(
        mut self,
        distributor: Arc<dyn PrivateDataDistributor>,
    ) -> Self {
        self.distributor = distributor;
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn ProposalMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn build(self) -> Result<Endorser> {
        self.config.validate()?;

        let mut dispatcher = SystemContractDispatcher::new(self.user_engine);
        dispatcher.register(ENDORSEMENT_CONTRACT, Arc::new(EndorsementContract::new(self.signer)));
        for (name, contract) in self.system_contracts {
            dispatcher.register(&name, contract);
        }

        let authority = &self.config.default_endorsement_authority;
        if !self.registry.is_system(authority) || !dispatcher.contains(authority) {
            return Err(EndorserError::Config(format!(
                "default endorsement authority {} is not a registered system chaincode",
                authority
            )));
        }

        Ok(Endorser {
            config: self.config,
            validator: self.validator,
            ledgers: self.ledgers,
            acl: self.acl,
            registry: self.registry,
            resolver: DefinitionResolver::new(self.definitions, self.installs),
            executor: Arc::new(dispatcher),
            decorations: self.decorations,
            distributor: self.distributor,
            metrics: self.metrics,
        })
    }
}
