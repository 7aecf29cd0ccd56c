//! Ordered, statically composed transformers over chaincode input.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::proposal::{ChaincodeInput, Proposal};

/// Pure transformation of chaincode input, given the proposal it belongs to.
pub type Decorator = Arc<dyn Fn(&Proposal, ChaincodeInput) -> ChaincodeInput + Send + Sync>;

#[derive(Clone, Default)]
pub struct DecorationChain {
    decorators: Vec<Decorator>,
}

impl DecorationChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a decorator; decorators run in insertion order.
    pub fn with<F>(mut self, decorator: F) -> Self
    where
        F: Fn(&Proposal, ChaincodeInput) -> ChaincodeInput + Send + Sync + 'static,
    {
        self.decorators.push(Arc::new(decorator));
        self
    }

    pub fn len(&self) -> usize {
        self.decorators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decorators.is_empty()
    }

    /// Clears any client-supplied decorations, then threads the input
    /// through every decorator in order.
    pub fn apply(&self, proposal: &Proposal, mut input: ChaincodeInput) -> ChaincodeInput {
        input.decorations = BTreeMap::new();
        self.decorators.iter().fold(input, |acc, decorate| decorate(proposal, acc))
    }
}

impl std::fmt::Debug for DecorationChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecorationChain")
            .field("decorators", &self.decorators.len())
            .finish()
    }
}
