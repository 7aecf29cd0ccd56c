//! In-process system contracts and the executor that routes to them.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::core::execution::{
    ChaincodeExecutor, ChaincodeTarget, ExecutionContext, ExecutionError, ExecutionOutput,
};
use crate::core::proposal::{ChaincodeDeploymentSpec, ChaincodeInput};

/// A contract compiled into the peer.
pub trait SystemContract: Send + Sync {
    fn invoke(
        &self,
        ctx: &ExecutionContext<'_>,
        input: &ChaincodeInput,
    ) -> Result<ExecutionOutput, ExecutionError>;
}

/// Routes system targets to registered in-process contracts and everything
/// else to the user chaincode engine.
pub struct SystemContractDispatcher {
    contracts: HashMap<String, Arc<dyn SystemContract>>,
    user_engine: Arc<dyn ChaincodeExecutor>,
}

impl SystemContractDispatcher {
    pub fn new(user_engine: Arc<dyn ChaincodeExecutor>) -> Self {
        Self { contracts: HashMap::new(), user_engine }
    }

    pub fn register(&mut self, name: &str, contract: Arc<dyn SystemContract>) {
        self.contracts.insert(name.to_string(), contract);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.contracts.contains_key(name)
    }
}

impl ChaincodeExecutor for SystemContractDispatcher {
    fn execute(
        &self,
        ctx: &ExecutionContext<'_>,
        target: &ChaincodeTarget,
        input: &ChaincodeInput,
    ) -> Result<ExecutionOutput, ExecutionError> {
        match self.contracts.get(&target.name) {
            Some(contract) => {
                debug!(
                    chaincode = %target.name,
                    tx_id = %ctx.tx_id,
                    "dispatching to system contract"
                );
                contract.invoke(ctx, input)
            }
            None if target.is_system => {
                Err(ExecutionError::UnknownSystemContract(target.name.clone()))
            }
            None => self.user_engine.execute(ctx, target, input),
        }
    }

    fn deploy(
        &self,
        ctx: &ExecutionContext<'_>,
        target: &ChaincodeTarget,
        spec: &ChaincodeDeploymentSpec,
    ) -> Result<ExecutionOutput, ExecutionError> {
        if target.is_system || self.contains(&target.name) {
            let deployed = format!("{}/{}", target.name, ctx.channel_id);
            return Err(ExecutionError::SystemContractDeploy(deployed));
        }
        self.user_engine.deploy(ctx, target, spec)
    }
}
