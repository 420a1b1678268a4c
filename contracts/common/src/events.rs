//! Engine Events
//!
//! Observations recorded while an operation executes. Events emitted inside
//! an operation that later fails are discarded together with the rest of
//! its effects.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::types::{Address, Asset};

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Aggregation Events (0x01 - 0x1F)
    Invocation = 0x01,
    Reward = 0x02,
    FlashLoan = 0x03,

    // Reserve Pool Events (0x20 - 0x3F)
    Mint = 0x20,
    Redeem = 0x21,

    // Administrative Events (0x80 - 0x9F)
    AdapterRegistered = 0x80,
    AdapterRemoved = 0x81,
    FeeScheduleUpdated = 0x82,
    FeeVaultUpdated = 0x83,
    PoolPaused = 0x84,
    PoolUnpaused = 0x85,
    OwnerChanged = 0x86,
}

/// Main event enum containing all engine events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum FlashEvent {
    // ============ Aggregation Events ============

    /// Emitted when funds are forwarded to an invoke target
    Invocation {
        target: Address,
        value_forwarded: u64,
        amount: u64,
    },

    /// Emitted when a flash loan settles
    Reward {
        asset: Asset,
        platform_reward: u64,
        pool_reward: u64,
    },

    /// Emitted by an external lending pool on each flash loan
    FlashLoan {
        receiver: Address,
        asset: Asset,
        amount: u64,
        premium: u64,
    },

    // ============ Reserve Pool Events ============

    /// Emitted when shares are minted against a deposit
    Mint {
        holder: Address,
        asset_amount: u64,
        share_amount: u64,
    },

    /// Emitted when shares are burned for a withdrawal
    Redeem {
        holder: Address,
        asset_amount: u64,
        share_amount: u64,
    },

    // ============ Administrative Events ============

    /// Emitted when an adapter is appended to an asset's route
    AdapterRegistered {
        asset: Asset,
        backend: Address,
        position: u32,
    },

    /// Emitted when an adapter is removed from an asset's route
    AdapterRemoved {
        asset: Asset,
        backend: Address,
    },

    /// Emitted when fee rates change
    FeeScheduleUpdated {
        platform_fee_bips: u64,
        pool_fee_bips: u64,
    },

    /// Emitted when the fee vault changes
    FeeVaultUpdated {
        old_vault: Address,
        new_vault: Address,
    },

    /// Emitted when a pool is paused
    PoolPaused { by: Address },

    /// Emitted when a pool is unpaused
    PoolUnpaused { by: Address },

    /// Emitted when ownership changes
    OwnerChanged {
        old_owner: Address,
        new_owner: Address,
    },
}

impl FlashEvent {
    /// Get the event type for filtering
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Invocation { .. } => EventType::Invocation,
            Self::Reward { .. } => EventType::Reward,
            Self::FlashLoan { .. } => EventType::FlashLoan,
            Self::Mint { .. } => EventType::Mint,
            Self::Redeem { .. } => EventType::Redeem,
            Self::AdapterRegistered { .. } => EventType::AdapterRegistered,
            Self::AdapterRemoved { .. } => EventType::AdapterRemoved,
            Self::FeeScheduleUpdated { .. } => EventType::FeeScheduleUpdated,
            Self::FeeVaultUpdated { .. } => EventType::FeeVaultUpdated,
            Self::PoolPaused { .. } => EventType::PoolPaused,
            Self::PoolUnpaused { .. } => EventType::PoolUnpaused,
            Self::OwnerChanged { .. } => EventType::OwnerChanged,
        }
    }

    /// Serialize event to bytes for storage/transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize event from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// An event together with the component that emitted it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct EventRecord {
    pub emitter: Address,
    pub event: FlashEvent,
}

/// Event log for collecting events during execution
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { records: Vec::new() }
    }

    /// Emit an event (add to log)
    pub fn emit(&mut self, emitter: Address, event: FlashEvent) {
        self.records.push(EventRecord { emitter, event });
    }

    /// Get all records
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&EventRecord> {
        self.records
            .iter()
            .filter(|r| r.event.event_type() == event_type)
            .collect()
    }

    /// Events emitted by one component
    pub fn emitted_by(&self, emitter: &Address) -> Vec<&FlashEvent> {
        self.records
            .iter()
            .filter(|r| r.emitter == *emitter)
            .map(|r| &r.event)
            .collect()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record past `len` (rollback)
    pub fn truncate(&mut self, len: usize) {
        self.records.truncate(len);
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.records.clear();
    }
}
