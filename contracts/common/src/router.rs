//! Route Planning
//!
//! Greedy fill over an asset's adapters in registration order: each adapter
//! contributes `min(remaining, max_liquidity)` until the request is covered.
//! Planning never moves funds, so the same function backs both the
//! repayment estimate and the real invoke.

use crate::adapter::LiquidityAdapter;
use crate::errors::FlashResult;
use crate::math::{safe_add, safe_sub};
use crate::runtime::Runtime;
use crate::types::Asset;

/// One adapter's share of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteLeg {
    pub adapter: LiquidityAdapter,
    pub amount: u64,
    /// Backend fee quoted for `amount`
    pub fee: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoutePlan {
    pub legs: Vec<RouteLeg>,
    /// Part of the request no adapter could cover
    pub shortfall: u64,
}

impl RoutePlan {
    pub fn is_complete(&self) -> bool {
        self.shortfall == 0
    }

    /// Sum of leg amounts
    pub fn routed(&self) -> FlashResult<u64> {
        self.legs.iter().try_fold(0u64, |acc, leg| safe_add(acc, leg.amount))
    }

    /// Sum of backend fees
    pub fn total_fees(&self) -> FlashResult<u64> {
        self.legs.iter().try_fold(0u64, |acc, leg| safe_add(acc, leg.fee))
    }
}

pub fn plan_route(
    rt: &Runtime,
    adapters: &[LiquidityAdapter],
    asset: &Asset,
    amount: u64,
) -> FlashResult<RoutePlan> {
    let mut legs = Vec::new();
    let mut remaining = amount;

    for adapter in adapters {
        if remaining == 0 {
            break;
        }
        let capacity = remaining.min(adapter.max_liquidity(rt, asset)?);
        if capacity == 0 {
            continue;
        }
        let fee = adapter.quote_fee(rt, asset, capacity)?;
        legs.push(RouteLeg { adapter: *adapter, amount: capacity, fee });
        remaining = safe_sub(remaining, capacity)?;
    }

    Ok(RoutePlan { legs, shortfall: remaining })
}

/// Sum of `max_liquidity` over `adapters`, saturating at `u64::MAX`
pub fn total_liquidity(rt: &Runtime, adapters: &[LiquidityAdapter], asset: &Asset) -> FlashResult<u64> {
    let mut total = 0u64;
    for adapter in adapters {
        total = total.saturating_add(adapter.max_liquidity(rt, asset)?);
    }
    Ok(total)
}
