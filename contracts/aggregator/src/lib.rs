//! Flash Loan Aggregator Contract
//!
//! Entry point for the aggregator: borsh-encoded actions that change state
//! (invoke and administration) and read-only queries that back quoting.
//!
//! ## Queries
//!
//! - `TotalLiquidity`: what a single invoke could borrow right now
//! - `EstimateRepayment`: exactly what an invoke of the amount must return
//! - `Route`: which adapters an invoke would draw and how much from each

use borsh::{BorshDeserialize, BorshSerialize};
use log::debug;
use serde::{Deserialize, Serialize};

use flashvault_common::{
    adapter::LiquidityAdapter,
    aggregator::{self, InvokeReceipt, InvokeRequest},
    errors::{FlashError, FlashResult},
    runtime::Runtime,
    types::{Address, Asset},
};

// ============ Actions ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum AggregatorAction {
    Invoke(InvokeRequest),
    RegisterAdapter { asset: Asset, adapter: LiquidityAdapter },
    RemoveAdapter { asset: Asset, backend: Address },
    SetPlatformFee { bips: u64 },
    SetFeeVault { vault: Address },
    TransferOwnership { new_owner: Address },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregatorOutcome {
    Invoked(InvokeReceipt),
    /// Position of the new adapter in its asset's route
    AdapterRegistered(u32),
    Updated,
}

pub fn encode_action(action: &AggregatorAction) -> Vec<u8> {
    borsh::to_vec(action).unwrap_or_default()
}

pub fn decode_action(bytes: &[u8]) -> FlashResult<AggregatorAction> {
    borsh::from_slice(bytes).map_err(|_| FlashError::InvalidWitness)
}

/// Main entry point
pub fn execute(
    rt: &mut Runtime,
    aggregator: &Address,
    caller: &Address,
    action: &AggregatorAction,
) -> FlashResult<AggregatorOutcome> {
    debug!("aggregator action {:?}", action);
    match action {
        AggregatorAction::Invoke(request) => {
            aggregator::invoke(rt, aggregator, caller, request).map(AggregatorOutcome::Invoked)
        }
        AggregatorAction::RegisterAdapter { asset, adapter } => {
            aggregator::register_adapter(rt, aggregator, caller, asset, *adapter)
                .map(AggregatorOutcome::AdapterRegistered)
        }
        AggregatorAction::RemoveAdapter { asset, backend } => {
            aggregator::remove_adapter(rt, aggregator, caller, asset, backend).map(|_| AggregatorOutcome::Updated)
        }
        AggregatorAction::SetPlatformFee { bips } => {
            aggregator::set_platform_fee(rt, aggregator, caller, *bips).map(|_| AggregatorOutcome::Updated)
        }
        AggregatorAction::SetFeeVault { vault } => {
            aggregator::set_fee_vault(rt, aggregator, caller, vault).map(|_| AggregatorOutcome::Updated)
        }
        AggregatorAction::TransferOwnership { new_owner } => {
            aggregator::transfer_ownership(rt, aggregator, caller, new_owner).map(|_| AggregatorOutcome::Updated)
        }
    }
}

pub fn execute_encoded(
    rt: &mut Runtime,
    aggregator: &Address,
    caller: &Address,
    bytes: &[u8],
) -> FlashResult<AggregatorOutcome> {
    let action = decode_action(bytes)?;
    execute(rt, aggregator, caller, &action)
}

// ============ Queries ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum AggregatorQuery {
    TotalLiquidity { asset: Asset },
    EstimateRepayment { asset: Asset, amount: u64 },
    Route { asset: Asset, amount: u64 },
    Adapters { asset: Asset },
}

/// One leg of a quoted route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct QuotedLeg {
    pub backend: Address,
    pub amount: u64,
    pub fee: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum QueryResponse {
    Amount(u64),
    Route { legs: Vec<QuotedLeg>, shortfall: u64 },
    Adapters(Vec<LiquidityAdapter>),
}

pub fn query(rt: &Runtime, aggregator: &Address, query: &AggregatorQuery) -> FlashResult<QueryResponse> {
    match query {
        AggregatorQuery::TotalLiquidity { asset } => {
            aggregator::total_liquidity(rt, aggregator, asset).map(QueryResponse::Amount)
        }
        AggregatorQuery::EstimateRepayment { asset, amount } => {
            aggregator::estimate_repayment_amount(rt, aggregator, asset, *amount).map(QueryResponse::Amount)
        }
        AggregatorQuery::Route { asset, amount } => {
            let plan = aggregator::plan_route(rt, aggregator, asset, *amount)?;
            let legs = plan
                .legs
                .iter()
                .map(|leg| QuotedLeg {
                    backend: leg.adapter.backend(),
                    amount: leg.amount,
                    fee: leg.fee,
                })
                .collect();
            Ok(QueryResponse::Route { legs, shortfall: plan.shortfall })
        }
        AggregatorQuery::Adapters { asset } => {
            let adapters = rt.aggregator(aggregator)?.adapters(asset).to_vec();
            Ok(QueryResponse::Adapters(adapters))
        }
    }
}

pub fn query_encoded(rt: &Runtime, aggregator: &Address, bytes: &[u8]) -> FlashResult<QueryResponse> {
    let decoded: AggregatorQuery = borsh::from_slice(bytes).map_err(|_| FlashError::InvalidWitness)?;
    query(rt, aggregator, &decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashvault_common::reserve_pool;
    use flashvault_common::runtime::{CallContext, FlashBorrower, FlashLoan};
    use flashvault_common::types::{AggregatorConfig, LendingPoolConfig, ReservePoolConfig};
    use flashvault_common::lending_pool;

    const TOKEN: Asset = Asset::Token([0xCD; 32]);
    const POOL_SIZE: u64 = 1_000_000;

    fn owner() -> Address {
        [1u8; 32]
    }

    fn fee_vault() -> Address {
        [2u8; 32]
    }

    fn target() -> Address {
        [3u8; 32]
    }

    struct Repayer;

    impl FlashBorrower for Repayer {
        fn on_flash_loan(&mut self, ctx: &mut CallContext<'_>, loan: &FlashLoan) -> FlashResult<()> {
            ctx.transfer(&loan.asset, &loan.lender, loan.repayment()?)
        }
    }

    struct Setup {
        rt: Runtime,
        aggregator: Address,
        pool: Address,
        lending: Address,
    }

    fn setup() -> Setup {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut rt = Runtime::new();

        let pool = rt
            .deploy_reserve_pool(&owner(), ReservePoolConfig::new(TOKEN, owner(), fee_vault()).with_fees(2, 3))
            .unwrap();
        let lending = rt
            .deploy_lending_pool(&owner(), LendingPoolConfig::new(owner()).with_premium(9))
            .unwrap();
        rt.mint(&TOKEN, &owner(), 2 * POOL_SIZE).unwrap();
        reserve_pool::deposit(&mut rt, &pool, &owner(), POOL_SIZE).unwrap();
        lending_pool::supply(&mut rt, &lending, &owner(), &TOKEN, POOL_SIZE).unwrap();

        let config = AggregatorConfig::new(owner(), fee_vault()).with_platform_fee(2);
        let aggregator = rt.deploy_aggregator(&owner(), config).unwrap();

        rt.mint(&TOKEN, &target(), 100_000).unwrap();
        rt.register_borrower(target(), Repayer).unwrap();

        Setup { rt, aggregator, pool, lending }
    }

    fn register_both(s: &mut Setup) {
        let actions = [
            AggregatorAction::RegisterAdapter {
                asset: TOKEN,
                adapter: LiquidityAdapter::InternalReservePool { pool: s.pool },
            },
            AggregatorAction::RegisterAdapter {
                asset: TOKEN,
                adapter: LiquidityAdapter::ExternalAdapter { lending_pool: s.lending },
            },
        ];
        for (i, action) in actions.iter().enumerate() {
            let bytes = encode_action(action);
            assert_eq!(
                execute_encoded(&mut s.rt, &s.aggregator, &owner(), &bytes).unwrap(),
                AggregatorOutcome::AdapterRegistered(i as u32)
            );
        }
    }

    #[test]
    fn test_invoke_matches_estimate() {
        let mut s = setup();
        register_both(&mut s);

        let estimate = query(&s.rt, &s.aggregator, &AggregatorQuery::EstimateRepayment {
            asset: TOKEN,
            amount: 1_500_000,
        })
        .unwrap();
        // pool: 1e6 * 5 bips = 500, lending: 5e5 * 9 bips = 450, platform: 1.5e6 * 2 bips = 300
        assert_eq!(estimate, QueryResponse::Amount(1_501_250));

        let action = AggregatorAction::Invoke(InvokeRequest::new(TOKEN, 1_500_000, target()));
        let outcome = execute(&mut s.rt, &s.aggregator, &[9u8; 32], &action).unwrap();

        match outcome {
            AggregatorOutcome::Invoked(receipt) => {
                assert_eq!(QueryResponse::Amount(receipt.repayment().unwrap()), estimate);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(s.rt.balance_of(&TOKEN, &target()), 100_000 - 1_250);
    }

    #[test]
    fn test_route_query() {
        let mut s = setup();
        register_both(&mut s);

        let response = query(&s.rt, &s.aggregator, &AggregatorQuery::Route { asset: TOKEN, amount: 2_500_000 }).unwrap();

        assert_eq!(
            response,
            QueryResponse::Route {
                legs: vec![
                    QuotedLeg { backend: s.pool, amount: POOL_SIZE, fee: 500 },
                    QuotedLeg { backend: s.lending, amount: POOL_SIZE, fee: 900 },
                ],
                shortfall: 500_000,
            }
        );
        assert_eq!(
            query(&s.rt, &s.aggregator, &AggregatorQuery::TotalLiquidity { asset: TOKEN }).unwrap(),
            QueryResponse::Amount(2 * POOL_SIZE)
        );
    }

    #[test]
    fn test_encoded_query_and_adapters() {
        let mut s = setup();
        register_both(&mut s);

        let bytes = borsh::to_vec(&AggregatorQuery::Adapters { asset: TOKEN }).unwrap();
        match query_encoded(&s.rt, &s.aggregator, &bytes).unwrap() {
            QueryResponse::Adapters(adapters) => assert_eq!(adapters.len(), 2),
            other => panic!("unexpected response {:?}", other),
        }
        assert_eq!(query_encoded(&s.rt, &s.aggregator, &[0xFF]), Err(FlashError::InvalidWitness));
    }

    #[test]
    fn test_admin_actions_require_owner() {
        let mut s = setup();
        register_both(&mut s);
        let stranger = [7u8; 32];

        let remove = AggregatorAction::RemoveAdapter { asset: TOKEN, backend: s.pool };
        assert!(matches!(
            execute(&mut s.rt, &s.aggregator, &stranger, &remove),
            Err(FlashError::Unauthorized { .. })
        ));
        execute(&mut s.rt, &s.aggregator, &owner(), &remove).unwrap();
        assert_eq!(s.rt.aggregator(&s.aggregator).unwrap().adapters(&TOKEN).len(), 1);

        execute(&mut s.rt, &s.aggregator, &owner(), &AggregatorAction::SetPlatformFee { bips: 0 }).unwrap();
        assert_eq!(
            query(&s.rt, &s.aggregator, &AggregatorQuery::EstimateRepayment { asset: TOKEN, amount: 10_000 }).unwrap(),
            QueryResponse::Amount(10_009)
        );

        execute(&mut s.rt, &s.aggregator, &owner(), &AggregatorAction::SetFeeVault { vault: stranger }).unwrap();
        execute(&mut s.rt, &s.aggregator, &owner(), &AggregatorAction::TransferOwnership { new_owner: stranger })
            .unwrap();
        assert_eq!(s.rt.aggregator(&s.aggregator).unwrap().config().owner, stranger);
    }

    #[test]
    fn test_malformed_action_rejected() {
        let mut s = setup();
        assert_eq!(
            execute_encoded(&mut s.rt, &s.aggregator, &owner(), &[0xEE, 0x01]),
            Err(FlashError::InvalidWitness)
        );
    }
}
