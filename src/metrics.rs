//! Proposal throughput counters.
//!
//! The collector is owned by whoever embeds the endorser and handed to it at
//! construction; there is no process-wide registry.

use std::sync::atomic::{AtomicU64, Ordering};

/// Terminal and entry events of the proposal pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProposalEvent {
    Received,
    /// Processed successfully (endorsed unless chainless).
    Succeeded,
    /// The chaincode ran and declined the proposal.
    ChaincodeError,
    /// Refused by the pipeline or the endorsement authority.
    Rejected,
    /// The channel was unknown; nothing was evaluated.
    ChannelNotFound,
}

pub trait ProposalMetrics: Send + Sync {
    fn record(&self, event: ProposalEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopMetrics;

impl ProposalMetrics for NopMetrics {
    fn record(&self, _event: ProposalEvent) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterSnapshot {
    pub received: u64,
    pub succeeded: u64,
    pub chaincode_errors: u64,
    pub rejected: u64,
    pub channel_not_found: u64,
}

impl CounterSnapshot {
    /// Requests that reached a terminal state.
    pub fn completed(&self) -> u64 {
        self.succeeded + self.chaincode_errors + self.rejected + self.channel_not_found
    }
}

#[derive(Debug, Default)]
pub struct ProposalCounters {
    received: AtomicU64,
    succeeded: AtomicU64,
    chaincode_errors: AtomicU64,
    rejected: AtomicU64,
    channel_not_found: AtomicU64,
}

impl ProposalCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            received: self.received.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            chaincode_errors: self.chaincode_errors.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            channel_not_found: self.channel_not_found.load(Ordering::Relaxed),
        }
    }
}

impl ProposalMetrics for ProposalCounters {
    fn record(&self, event: ProposalEvent) {
        let counter = match event {
            ProposalEvent::Received => &self.received,
            ProposalEvent::Succeeded => &self.succeeded,
            ProposalEvent::ChaincodeError => &self.chaincode_errors,
            ProposalEvent::Rejected => &self.rejected,
            ProposalEvent::ChannelNotFound => &self.channel_not_found,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
