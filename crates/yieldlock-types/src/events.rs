//! Event bus for protocol state changes
//!
//! Components publish [`ProtocolEvent`]s wrapped in an [`EventEnvelope`] that records the
//! emitting component and the clock time. Payload names and fields are part of the public
//! contract and must not change.

use crate::{Address, Amount, PoolId, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// Events buffered per subscriber before the oldest are dropped
const EVENT_BUFFER: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProtocolEvent {
    PoolAdded {
        pid: PoolId,
        underlying_token: Address,
        gauge: Address,
    },
    Deposited {
        account: Address,
        pid: PoolId,
        amount: Amount,
    },
    Withdrawn {
        account: Address,
        pid: PoolId,
        amount: Amount,
    },
    RewardAdded {
        amount: Amount,
    },
    Staked {
        account: Address,
        amount: Amount,
    },
    RewardPaid {
        account: Address,
        amount: Amount,
    },
    FeesChanged {
        platform_fee_bps: u32,
        profit_fee_bps: u32,
    },
    SystemShutdown,
    PoolShutDown {
        pid: PoolId,
    },
    TreasuryChanged {
        treasury: Address,
    },
    VotingPowerDelegated {
        delegate: Address,
    },
    VotingPowerCleared,
}

impl ProtocolEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolEvent::PoolAdded { .. } => "PoolAdded",
            ProtocolEvent::Deposited { .. } => "Deposited",
            ProtocolEvent::Withdrawn { .. } => "Withdrawn",
            ProtocolEvent::RewardAdded { .. } => "RewardAdded",
            ProtocolEvent::Staked { .. } => "Staked",
            ProtocolEvent::RewardPaid { .. } => "RewardPaid",
            ProtocolEvent::FeesChanged { .. } => "FeesChanged",
            ProtocolEvent::SystemShutdown => "SystemShutdown",
            ProtocolEvent::PoolShutDown { .. } => "PoolShutDown",
            ProtocolEvent::TreasuryChanged { .. } => "TreasuryChanged",
            ProtocolEvent::VotingPowerDelegated { .. } => "VotingPowerDelegated",
            ProtocolEvent::VotingPowerCleared => "VotingPowerCleared",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub emitter: Address,
    pub timestamp: Timestamp,
    pub event: ProtocolEvent,
}

/// Broadcast bus shared by all components of one deployment.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    pub fn emit(&self, emitter: Address, timestamp: Timestamp, event: ProtocolEvent) {
        trace!(emitter = %emitter, event = event.name(), "Event emitted");
        // No subscribers is not an error
        let _ = self.tx.send(EventEnvelope {
            emitter,
            timestamp,
            event,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains everything currently buffered in `rx`.
pub fn drain(rx: &mut broadcast::Receiver<EventEnvelope>) -> Vec<EventEnvelope> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(envelope) => events.push(envelope),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    events
}
