//! Core Types for flashvault
//!
//! Addresses, assets and the configuration records shared by every
//! component of the engine.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::fees::{
    DEFAULT_AGGREGATOR_FEE_BIPS, DEFAULT_LENDING_PREMIUM_BIPS, MAX_FEE_BIPS,
};
use crate::errors::{FlashError, FlashResult};
use crate::fees::FeeSchedule;

/// Type alias for addresses (32-byte hash)
pub type Address = [u8; 32];

/// The all-zero address, never a valid owner or vault
pub const ZERO_ADDRESS: Address = [0u8; 32];

/// Derive a deployment address from a domain separator, the deployer and a nonce
pub fn derive_address(domain: &[u8], deployer: &Address, nonce: u64) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(deployer);
    hasher.update(nonce.to_le_bytes());
    hasher.finalize().into()
}

// ============ Assets ============

/// Fungible resource moved by the engine
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub enum Asset {
    /// The chain's native currency
    Native,
    /// A contract-addressed token
    Token(Address),
}

impl Asset {
    /// Returns true for the native currency sentinel
    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native)
    }
}

// ============ Configuration ============

/// Configuration for a reserve pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ReservePoolConfig {
    /// Asset held by the pool
    pub asset: Asset,
    /// Administrative owner
    pub owner: Address,
    /// Platform and pool fee rates for flash loans
    pub fee_schedule: FeeSchedule,
    /// Recipient of the platform share of each reward
    pub fee_vault: Address,
}

impl ReservePoolConfig {
    /// Config with default fee schedule
    pub fn new(asset: Asset, owner: Address, fee_vault: Address) -> Self {
        Self {
            asset,
            owner,
            fee_schedule: FeeSchedule::default(),
            fee_vault,
        }
    }

    /// Builder-style override of the fee schedule
    pub fn with_fees(mut self, platform_fee_bips: u64, pool_fee_bips: u64) -> Self {
        self.fee_schedule = FeeSchedule::new(platform_fee_bips, pool_fee_bips);
        self
    }

    pub fn validate(&self) -> FlashResult<()> {
        validate_owner_and_vault(&self.owner, &self.fee_vault)?;
        self.fee_schedule.validate()
    }
}

/// Configuration for an aggregator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct AggregatorConfig {
    /// Administrative owner
    pub owner: Address,
    /// Platform cut over the aggregate principal
    pub platform_fee_bips: u64,
    /// Recipient of the platform cut
    pub fee_vault: Address,
}

impl AggregatorConfig {
    pub fn new(owner: Address, fee_vault: Address) -> Self {
        Self {
            owner,
            platform_fee_bips: DEFAULT_AGGREGATOR_FEE_BIPS,
            fee_vault,
        }
    }

    pub fn with_platform_fee(mut self, platform_fee_bips: u64) -> Self {
        self.platform_fee_bips = platform_fee_bips;
        self
    }

    pub fn validate(&self) -> FlashResult<()> {
        validate_owner_and_vault(&self.owner, &self.fee_vault)?;
        validate_bips(self.platform_fee_bips)
    }
}

/// Configuration for an external lending pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct LendingPoolConfig {
    /// Administrative owner
    pub owner: Address,
    /// Flash loan premium
    pub premium_bips: u64,
}

impl LendingPoolConfig {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            premium_bips: DEFAULT_LENDING_PREMIUM_BIPS,
        }
    }

    pub fn with_premium(mut self, premium_bips: u64) -> Self {
        self.premium_bips = premium_bips;
        self
    }

    pub fn validate(&self) -> FlashResult<()> {
        if self.owner == ZERO_ADDRESS {
            return Err(FlashError::InvalidAddress { reason: "owner is the zero address" });
        }
        validate_bips(self.premium_bips)
    }
}

/// Reject fee rates above the protocol maximum
pub fn validate_bips(bips: u64) -> FlashResult<()> {
    if bips > MAX_FEE_BIPS {
        return Err(FlashError::InvalidFee { bips, maximum: MAX_FEE_BIPS });
    }
    Ok(())
}

fn validate_owner_and_vault(owner: &Address, fee_vault: &Address) -> FlashResult<()> {
    if *owner == ZERO_ADDRESS {
        return Err(FlashError::InvalidAddress { reason: "owner is the zero address" });
    }
    if *fee_vault == ZERO_ADDRESS {
        return Err(FlashError::InvalidAddress { reason: "fee vault is the zero address" });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_address_is_deterministic() {
        let a = derive_address(b"domain", &[1u8; 32], 0);
        let b = derive_address(b"domain", &[1u8; 32], 0);
        let c = derive_address(b"domain", &[1u8; 32], 1);
        let d = derive_address(b"other", &[1u8; 32], 0);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_ne!(a, ZERO_ADDRESS);
    }

    #[test]
    fn test_config_validation() {
        let ok = ReservePoolConfig::new(Asset::Native, [1u8; 32], [2u8; 32]);
        assert!(ok.validate().is_ok());

        let zero_owner = ReservePoolConfig::new(Asset::Native, ZERO_ADDRESS, [2u8; 32]);
        assert!(matches!(zero_owner.validate(), Err(FlashError::InvalidAddress { .. })));

        let greedy = ReservePoolConfig::new(Asset::Native, [1u8; 32], [2u8; 32])
            .with_fees(MAX_FEE_BIPS, 1);
        assert!(matches!(greedy.validate(), Err(FlashError::InvalidFee { .. })));

        let aggregator = AggregatorConfig::new([1u8; 32], [2u8; 32]).with_platform_fee(MAX_FEE_BIPS + 1);
        assert!(aggregator.validate().is_err());

        assert!(LendingPoolConfig::new([1u8; 32]).validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip_borsh() {
        let config = ReservePoolConfig::new(Asset::Token([9u8; 32]), [1u8; 32], [2u8; 32])
            .with_fees(4, 5);
        let bytes = borsh::to_vec(&config).unwrap();
        let restored: ReservePoolConfig = borsh::from_slice(&bytes).unwrap();
        assert_eq!(config, restored);
    }
}
