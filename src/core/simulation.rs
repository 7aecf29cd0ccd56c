//! Simulated execution of a proposal.

use tracing::{debug, error};

use crate::config::EndorserConfig;
use crate::core::definition::ChaincodeDefinition;
use crate::core::execution::{ChaincodeTarget, ExecutionContext, ExecutionError, ExecutionOutput};
use crate::core::proposal::{
    unmarshal, ChaincodeDeploymentSpec, ChaincodeId, ChaincodeInput, ChaincodeInvocationSpec,
};
use crate::core::registry::ContractRegistry;
use crate::core::response::{ChaincodeEvent, Response, ERROR_THRESHOLD};
use crate::core::Endorser;
use crate::error::{EndorserError, Result};

/// Lifecycle functions that carry a deployment spec, with its argument index.
const INSTALL: (&str, usize) = ("install", 1);
const DEPLOY: (&str, usize) = ("deploy", 2);
const UPGRADE: (&str, usize) = ("upgrade", 2);

/// What a simulation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationOutput {
    /// `None` for system contracts.
    pub definition: Option<ChaincodeDefinition>,
    /// Version the chaincode ran at.
    pub version: String,
    pub response: Response,
    /// Serialized public read/write set; empty for chainless proposals.
    pub results: Vec<u8>,
    pub event: Option<ChaincodeEvent>,
}

/// Refuses lifecycle operations whose deployment spec targets a disabled
/// chaincode type. Anything that is not install / deploy / upgrade on the
/// lifecycle contract passes untouched.
pub fn reject_unsupported_chaincode_type(
    registry: &ContractRegistry,
    config: &EndorserConfig,
    chaincode: &str,
    spec: &ChaincodeInvocationSpec,
) -> Result<()> {
    if !registry.is_lifecycle(chaincode) {
        return Ok(());
    }
    let args = &spec.chaincode_spec.input.args;
    let arg_no = match args.first().map(Vec::as_slice) {
        Some(f) if f == INSTALL.0.as_bytes() => INSTALL.1,
        Some(f) if f == DEPLOY.0.as_bytes() => DEPLOY.1,
        Some(f) if f == UPGRADE.0.as_bytes() => UPGRADE.1,
        _ => return Ok(()),
    };
    let package = args.get(arg_no).ok_or_else(|| {
        let message = format!("too few arguments passed. expected {}", arg_no + 1);
        EndorserError::MalformedInvocation(message)
    })?;
    let deployment: ChaincodeDeploymentSpec = unmarshal(package).map_err(|e| {
        EndorserError::MalformedInvocation(format!("failed to decode deployment spec: {}", e))
    })?;

    let chaincode_type = deployment.chaincode_spec.chaincode_type;
    if config.is_disabled(chaincode_type) {
        return Err(EndorserError::UnsupportedChaincodeType(format!(
            "{} chaincode is not supported on this platform",
            chaincode_type
        )));
    }
    Ok(())
}

/// The deployment spec of a deploy or upgrade call to the lifecycle contract.
fn lifecycle_deployment<'a>(
    registry: &ContractRegistry,
    chaincode: &str,
    input: &'a ChaincodeInput,
) -> Option<&'a [u8]> {
    if !registry.is_lifecycle(chaincode) || input.args.len() < 3 {
        return None;
    }
    let function = input.args[0].as_slice();
    if function == DEPLOY.0.as_bytes() || function == UPGRADE.0.as_bytes() {
        Some(input.args[DEPLOY.1].as_slice())
    } else {
        None
    }
}

impl Endorser {
    /// Runs one chaincode (system or user) under the request's simulator.
    ///
    /// A deploy or upgrade through the lifecycle contract also initializes the
    /// deployed chaincode under the same simulator, so both land in a single
    /// read/write set. Any failure of that second step fails the call.
    pub(crate) fn call_chaincode(
        &self,
        ctx: &ExecutionContext<'_>,
        chaincode: &str,
        version: &str,
        input: ChaincodeInput,
    ) -> Result<ExecutionOutput> {
        debug!(
            tx_id = %ctx.tx_id,
            channel = %ctx.channel_id,
            chaincode = %chaincode,
            version = %version,
            "calling chaincode"
        );

        let target = ChaincodeTarget {
            name: chaincode.to_string(),
            version: version.to_string(),
            is_system: self.registry.is_system(chaincode),
        };
        let input = self.decorations.apply(ctx.proposal, input);
        let (response, event) = self.executor.execute(ctx, &target, &input)?;

        if response.status >= ERROR_THRESHOLD {
            return Ok((response, None));
        }

        if let Some(package) = lifecycle_deployment(&self.registry, chaincode, &input) {
            let deployment: ChaincodeDeploymentSpec = unmarshal(package)
                .map_err(|e| ExecutionError::MalformedDeploymentSpec(e.to_string()))?;
            let deployed = &deployment.chaincode_spec.chaincode_id;
            if self.registry.is_system(&deployed.name) {
                let target = format!("{}/{}", deployed.name, ctx.channel_id);
                return Err(ExecutionError::SystemContractDeploy(target).into());
            }

            let deploy_target = ChaincodeTarget {
                name: deployed.name.clone(),
                version: deployed.version.clone(),
                is_system: false,
            };
            let (init, _) = self.executor.deploy(ctx, &deploy_target, &deployment)?;
            if init.status >= ERROR_THRESHOLD {
                let failure = ExecutionError::InitFailed {
                    status: init.status,
                    message: init.message,
                };
                return Err(failure.into());
            }
            debug!(tx_id = %ctx.tx_id, chaincode = %deployed, "deployed chaincode initialized");
        }

        Ok((response, event))
    }

    /// Resolves the chaincode, runs it, and collects what the simulator
    /// recorded. Private data is distributed before the public read/write set
    /// is serialized.
    pub(crate) fn simulate_proposal(
        &self,
        ctx: &ExecutionContext<'_>,
        chaincode_id: &ChaincodeId,
    ) -> Result<SimulationOutput> {
        debug!(tx_id = %ctx.tx_id, channel = %ctx.channel_id, "simulating proposal");
        let name = chaincode_id.name.as_str();

        let spec = ctx.proposal.invocation_spec().map_err(|e| {
            let message = format!("failed to extract chaincode invocation spec: {}", e);
            EndorserError::MalformedInvocation(message)
        })?;
        reject_unsupported_chaincode_type(&self.registry, &self.config, name, &spec)?;

        let (definition, version) = if self.registry.is_system(name) {
            (None, self.config.platform_version.clone())
        } else {
            let definition =
                self.resolver.resolve(ctx.simulator, ctx.channel_id, ctx.tx_id, name)?;
            let version = definition.version.clone();
            (Some(definition), version)
        };

        let (response, event) = self
            .call_chaincode(ctx, name, &version, spec.chaincode_spec.input)
            .map_err(|err| {
                error!(
                    tx_id = %ctx.tx_id,
                    chaincode = %chaincode_id,
                    error = %err,
                    "failed to invoke chaincode"
                );
                err
            })?;

        let mut results = Vec::new();
        if let Some(simulator) = ctx.simulator {
            let simulation = simulator.simulation_results()?;
            if let Some(private) = simulation.private.as_ref().filter(|p| !p.is_empty()) {
                self.distribute_private_data(ctx.channel_id, ctx.tx_id, private)?;
            }
            results = simulation.public_simulation_bytes()?;
        }

        Ok(SimulationOutput { definition, version, response, results, event })
    }
}
