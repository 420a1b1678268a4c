//! Liquidity Adapters
//!
//! Uniform capability over the two backend kinds an aggregator can draw
//! from. Adapters hold no accounting of their own; every invariant lives
//! in the backend or in the aggregator.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::{FlashError, FlashResult};
use crate::lending_pool;
use crate::reserve_pool;
use crate::runtime::{FlashReceipt, Runtime};
use crate::types::{Address, Asset};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum LiquidityAdapter {
    /// Single-asset share pool with push settlement
    InternalReservePool { pool: Address },
    /// Multi-asset lending pool with pull settlement
    ExternalAdapter { lending_pool: Address },
}

impl LiquidityAdapter {
    /// Address of the backend the adapter draws from
    pub fn backend(&self) -> Address {
        match self {
            Self::InternalReservePool { pool } => *pool,
            Self::ExternalAdapter { lending_pool } => *lending_pool,
        }
    }

    /// Fails unless the backend exists and can serve `asset`
    pub fn check_asset(&self, rt: &Runtime, asset: &Asset) -> FlashResult<()> {
        match self {
            Self::InternalReservePool { pool } => {
                let actual = rt.reserve_pool(pool)?.asset();
                if actual != *asset {
                    return Err(FlashError::AssetMismatch { expected: *asset, actual });
                }
                Ok(())
            }
            Self::ExternalAdapter { lending_pool } => rt.lending_pool(lending_pool).map(|_| ()),
        }
    }

    /// Amount currently drawable (0 if paused)
    pub fn max_liquidity(&self, rt: &Runtime, asset: &Asset) -> FlashResult<u64> {
        match self {
            Self::InternalReservePool { pool } => {
                if rt.reserve_pool(pool)?.asset() != *asset {
                    return Ok(0);
                }
                reserve_pool::max_liquidity(rt, pool)
            }
            Self::ExternalAdapter { lending_pool } => {
                lending_pool::available_liquidity(rt, lending_pool, asset)
            }
        }
    }

    /// Fee the backend will require for drawing `amount`
    pub fn quote_fee(&self, rt: &Runtime, _asset: &Asset, amount: u64) -> FlashResult<u64> {
        match self {
            Self::InternalReservePool { pool } => reserve_pool::reserved_fee(rt, pool, amount),
            Self::ExternalAdapter { lending_pool } => rt.lending_pool(lending_pool)?.quote_premium(amount),
        }
    }

    /// Borrow `amount` for `borrower`; the backend calls `borrower` back
    /// with `payload` and enforces its own settlement
    pub fn draw(
        &self,
        rt: &mut Runtime,
        borrower: &Address,
        asset: &Asset,
        amount: u64,
        payload: &[u8],
    ) -> FlashResult<FlashReceipt> {
        match self {
            Self::InternalReservePool { pool } => {
                reserve_pool::flash_invoke(rt, pool, borrower, borrower, amount, payload)
            }
            Self::ExternalAdapter { lending_pool } => {
                lending_pool::flash_loan(rt, lending_pool, borrower, borrower, asset, amount, payload)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LendingPoolConfig, ReservePoolConfig};

    const TOKEN: Asset = Asset::Token([9u8; 32]);
    const OTHER: Asset = Asset::Token([8u8; 32]);

    fn owner() -> Address {
        [1u8; 32]
    }

    #[test]
    fn test_capacity_and_quotes() {
        let mut rt = Runtime::new();
        let pool = rt
            .deploy_reserve_pool(&owner(), ReservePoolConfig::new(TOKEN, owner(), [2u8; 32]).with_fees(2, 3))
            .unwrap();
        let lending = rt
            .deploy_lending_pool(&owner(), LendingPoolConfig::new(owner()).with_premium(9))
            .unwrap();
        rt.mint(&TOKEN, &owner(), 3_000).unwrap();
        reserve_pool::deposit(&mut rt, &pool, &owner(), 1_000).unwrap();
        lending_pool::supply(&mut rt, &lending, &owner(), &TOKEN, 2_000).unwrap();

        let internal = LiquidityAdapter::InternalReservePool { pool };
        let external = LiquidityAdapter::ExternalAdapter { lending_pool: lending };

        assert_eq!(internal.backend(), pool);
        assert_eq!(internal.max_liquidity(&rt, &TOKEN).unwrap(), 1_000);
        assert_eq!(internal.max_liquidity(&rt, &OTHER).unwrap(), 0);
        assert_eq!(external.max_liquidity(&rt, &TOKEN).unwrap(), 2_000);
        assert_eq!(external.max_liquidity(&rt, &OTHER).unwrap(), 0);

        assert_eq!(internal.quote_fee(&rt, &TOKEN, 20_000).unwrap(), 10);
        assert_eq!(external.quote_fee(&rt, &TOKEN, 20_000).unwrap(), 18);

        assert!(internal.check_asset(&rt, &TOKEN).is_ok());
        assert_eq!(
            internal.check_asset(&rt, &OTHER),
            Err(FlashError::AssetMismatch { expected: OTHER, actual: TOKEN })
        );
        assert!(external.check_asset(&rt, &OTHER).is_ok());
    }
}
