//! Invoking the endorsement authority over a finished simulation.

use tracing::{debug, warn};

use crate::core::execution::ExecutionContext;
use crate::core::proposal::{marshal, unmarshal, ChaincodeId, ChaincodeInput};
use crate::core::response::{ProposalResponse, Response, ERROR_THRESHOLD};
use crate::core::simulation::SimulationOutput;
use crate::core::Endorser;
use crate::error::{EndorserError, Result};

/// What the endorsement authority returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EndorsementResult {
    Endorsed(ProposalResponse),
    /// The authority answered with an error-class status.
    Refused(Response),
}

fn endorsement_failure(context: &str, err: impl std::fmt::Display) -> EndorserError {
    EndorserError::Endorsement(format!("{}: {}", context, err))
}

impl Endorser {
    /// Selects the endorsement authority for the chaincode and asks it to
    /// sign the simulation. The authority attests to exactly the bytes it is
    /// given and never recomputes them.
    pub(crate) fn endorse_proposal(
        &self,
        ctx: &ExecutionContext<'_>,
        chaincode_id: &ChaincodeId,
        simulation: &SimulationOutput,
        visibility: &[u8],
    ) -> Result<EndorsementResult> {
        let authority = match &simulation.definition {
            None => self.config.default_endorsement_authority.clone(),
            Some(definition) if definition.endorsement_authority.is_empty() => {
                return Err(EndorserError::Endorsement(format!(
                    "no endorsement authority specified for chaincode {}",
                    definition.name
                )));
            }
            Some(definition) => definition.endorsement_authority.clone(),
        };
        if !self.registry.is_system(&authority) {
            return Err(EndorserError::Endorsement(format!(
                "endorsement authority {} is not a system chaincode",
                authority
            )));
        }
        debug!(
            tx_id = %ctx.tx_id,
            chaincode = %chaincode_id,
            authority = %authority,
            "endorsing proposal"
        );

        let events = match &simulation.event {
            Some(event) => {
                marshal(event).map_err(|e| endorsement_failure("failed to marshal event bytes", e))?
            }
            None => Vec::new(),
        };
        let response_bytes = marshal(&simulation.response)
            .map_err(|e| endorsement_failure("failed to marshal response bytes", e))?;
        let pinned = ChaincodeId { version: simulation.version.clone(), ..chaincode_id.clone() };
        let chaincode_id_bytes = marshal(&pinned)
            .map_err(|e| endorsement_failure("failed to marshal chaincode id", e))?;

        let input = ChaincodeInput {
            args: vec![
                Vec::new(),
                ctx.proposal.header.clone(),
                ctx.proposal.payload.clone(),
                chaincode_id_bytes,
                response_bytes,
                simulation.results.clone(),
                events,
                visibility.to_vec(),
            ],
            decorations: Default::default(),
        };
        let version = &self.config.platform_version;
        let (response, _) = self.call_chaincode(ctx, &authority, version, input)?;

        if response.status >= ERROR_THRESHOLD {
            warn!(
                tx_id = %ctx.tx_id,
                authority = %authority,
                status = response.status,
                message = %response.message,
                "endorsement refused"
            );
            return Ok(EndorsementResult::Refused(response));
        }

        let prop_response: ProposalResponse = unmarshal(&response.payload)
            .map_err(|e| endorsement_failure("failed to unpack proposal response", e))?;
        Ok(EndorsementResult::Endorsed(prop_response))
    }
}
