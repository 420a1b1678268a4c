//! Reserve Pool Contract
//!
//! Entry point for a single-asset reserve pool. Liquidity providers deposit
//! the pool's asset for shares, redeem shares for a proportional part of the
//! reserve, and anyone may borrow the whole reserve for the duration of one
//! callback as long as it comes back with the fee.
//!
//! Actions arrive borsh-encoded and each one runs as its own transaction.

use borsh::{BorshDeserialize, BorshSerialize};
use log::debug;
use serde::{Deserialize, Serialize};

use flashvault_common::{
    errors::{FlashError, FlashResult},
    fees::FeeSchedule,
    reserve_pool,
    runtime::{FlashReceipt, Runtime},
    types::{Address, Asset},
};

// ============ Actions ============

/// Operations a caller can submit to a reserve pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum PoolAction {
    /// Deposit underlying for shares
    Deposit { amount: u64 },
    /// Burn shares for underlying
    Withdraw { shares: u64 },
    /// Receive exactly `amount` underlying, burning shares rounded up
    WithdrawUnderlying { amount: u64 },
    /// Lend `amount` to `target` for one callback
    FlashInvoke { target: Address, amount: u64, payload: Vec<u8> },
    SetFeeSchedule { platform_fee_bips: u64, pool_fee_bips: u64 },
    SetFeeVault { vault: Address },
    Pause,
    Unpause,
    TransferOwnership { new_owner: Address },
}

/// Result of a dispatched action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolOutcome {
    SharesMinted(u64),
    AssetsPaid(u64),
    SharesBurned(u64),
    FlashSettled(FlashReceipt),
    /// Administrative change applied
    Updated,
}

pub fn encode_action(action: &PoolAction) -> Vec<u8> {
    borsh::to_vec(action).unwrap_or_default()
}

pub fn decode_action(bytes: &[u8]) -> FlashResult<PoolAction> {
    borsh::from_slice(bytes).map_err(|_| FlashError::InvalidWitness)
}

// ============ Dispatch ============

/// Main entry point
pub fn execute(rt: &mut Runtime, pool: &Address, caller: &Address, action: &PoolAction) -> FlashResult<PoolOutcome> {
    debug!("reserve pool action {:?}", action);
    match action {
        PoolAction::Deposit { amount } => {
            reserve_pool::deposit(rt, pool, caller, *amount).map(PoolOutcome::SharesMinted)
        }
        PoolAction::Withdraw { shares } => {
            reserve_pool::withdraw(rt, pool, caller, *shares).map(PoolOutcome::AssetsPaid)
        }
        PoolAction::WithdrawUnderlying { amount } => {
            reserve_pool::withdraw_underlying(rt, pool, caller, *amount).map(PoolOutcome::SharesBurned)
        }
        PoolAction::FlashInvoke { target, amount, payload } => {
            reserve_pool::flash_invoke(rt, pool, caller, target, *amount, payload).map(PoolOutcome::FlashSettled)
        }
        PoolAction::SetFeeSchedule { platform_fee_bips, pool_fee_bips } => {
            let schedule = FeeSchedule::new(*platform_fee_bips, *pool_fee_bips);
            reserve_pool::set_fee_schedule(rt, pool, caller, schedule).map(|_| PoolOutcome::Updated)
        }
        PoolAction::SetFeeVault { vault } => {
            reserve_pool::set_fee_vault(rt, pool, caller, vault).map(|_| PoolOutcome::Updated)
        }
        PoolAction::Pause => reserve_pool::pause(rt, pool, caller).map(|_| PoolOutcome::Updated),
        PoolAction::Unpause => reserve_pool::unpause(rt, pool, caller).map(|_| PoolOutcome::Updated),
        PoolAction::TransferOwnership { new_owner } => {
            reserve_pool::transfer_ownership(rt, pool, caller, new_owner).map(|_| PoolOutcome::Updated)
        }
    }
}

/// Decode and run a borsh-encoded action
pub fn execute_encoded(rt: &mut Runtime, pool: &Address, caller: &Address, bytes: &[u8]) -> FlashResult<PoolOutcome> {
    let action = decode_action(bytes)?;
    execute(rt, pool, caller, &action)
}

// ============ Views ============

/// Aggregate view of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PoolSummary {
    pub asset: Asset,
    pub total_reserve: u64,
    pub total_supply: u64,
    /// Drawable right now (0 while paused)
    pub max_liquidity: u64,
    pub paused: bool,
}

pub fn summary(rt: &Runtime, pool: &Address) -> FlashResult<PoolSummary> {
    let state = rt.reserve_pool(pool)?;
    Ok(PoolSummary {
        asset: state.asset(),
        total_reserve: reserve_pool::total_reserve(rt, pool)?,
        total_supply: state.total_supply(),
        max_liquidity: reserve_pool::max_liquidity(rt, pool)?,
        paused: state.is_paused(),
    })
}

/// Shares held by `holder` and the underlying they redeem for
pub fn position(rt: &Runtime, pool: &Address, holder: &Address) -> FlashResult<(u64, u64)> {
    let shares = rt.reserve_pool(pool)?.share_balance(holder);
    Ok((shares, reserve_pool::underlying_of(rt, pool, holder)?))
}

/// Fee a flash loan of `amount` must return on top of the principal
pub fn quote_fee(rt: &Runtime, pool: &Address, amount: u64) -> FlashResult<u64> {
    reserve_pool::reserved_fee(rt, pool, amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashvault_common::runtime::{CallContext, FlashBorrower, FlashLoan};
    use flashvault_common::types::ReservePoolConfig;

    const TOKEN: Asset = Asset::Token([0xAB; 32]);
    const ONE_TOKEN: u64 = 100_000_000;

    fn owner() -> Address {
        [1u8; 32]
    }

    fn vault() -> Address {
        [2u8; 32]
    }

    fn alice() -> Address {
        [3u8; 32]
    }

    fn borrower() -> Address {
        [4u8; 32]
    }

    struct Repayer;

    impl FlashBorrower for Repayer {
        fn on_flash_loan(&mut self, ctx: &mut CallContext<'_>, loan: &FlashLoan) -> FlashResult<()> {
            ctx.transfer(&loan.asset, &loan.lender, loan.repayment()?)
        }
    }

    fn setup() -> (Runtime, Address) {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut rt = Runtime::new();
        let config = ReservePoolConfig::new(TOKEN, owner(), vault()).with_fees(2, 3);
        let pool = rt.deploy_reserve_pool(&owner(), config).unwrap();
        rt.mint(&TOKEN, &alice(), 10 * ONE_TOKEN).unwrap();
        rt.mint(&TOKEN, &borrower(), ONE_TOKEN).unwrap();
        rt.register_borrower(borrower(), Repayer).unwrap();
        (rt, pool)
    }

    #[test]
    fn test_deposit_and_withdraw_encoded() {
        let (mut rt, pool) = setup();

        let deposit = encode_action(&PoolAction::Deposit { amount: 5 * ONE_TOKEN });
        assert_eq!(
            execute_encoded(&mut rt, &pool, &alice(), &deposit).unwrap(),
            PoolOutcome::SharesMinted(5 * ONE_TOKEN)
        );
        assert_eq!(position(&rt, &pool, &alice()).unwrap(), (5 * ONE_TOKEN, 5 * ONE_TOKEN));

        let withdraw = encode_action(&PoolAction::Withdraw { shares: 2 * ONE_TOKEN });
        assert_eq!(
            execute_encoded(&mut rt, &pool, &alice(), &withdraw).unwrap(),
            PoolOutcome::AssetsPaid(2 * ONE_TOKEN)
        );
        assert_eq!(rt.balance_of(&TOKEN, &alice()), 7 * ONE_TOKEN);
    }

    #[test]
    fn test_flash_invoke_grows_reserve() {
        let (mut rt, pool) = setup();
        execute(&mut rt, &pool, &alice(), &PoolAction::Deposit { amount: ONE_TOKEN }).unwrap();

        let action = PoolAction::FlashInvoke {
            target: borrower(),
            amount: ONE_TOKEN,
            payload: b"arb".to_vec(),
        };
        let outcome = execute(&mut rt, &pool, &borrower(), &action).unwrap();

        // 1e8 * 5 / 1e4 = 50_000: 20_000 to the vault, 30_000 stays
        let fee = quote_fee(&rt, &pool, ONE_TOKEN).unwrap();
        assert_eq!(fee, 50_000);
        match outcome {
            PoolOutcome::FlashSettled(receipt) => assert_eq!(receipt.fee, fee),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(rt.balance_of(&TOKEN, &vault()), 20_000);
        assert_eq!(summary(&rt, &pool).unwrap().total_reserve, ONE_TOKEN + 30_000);
    }

    #[test]
    fn test_withdraw_underlying_burns_rounded_up() {
        let (mut rt, pool) = setup();
        execute(&mut rt, &pool, &alice(), &PoolAction::Deposit { amount: 1_000 }).unwrap();
        // R = 1_500, S = 1_000
        rt.transfer(&TOKEN, &alice(), &pool, 500).unwrap();

        let outcome = execute(&mut rt, &pool, &alice(), &PoolAction::WithdrawUnderlying { amount: 100 }).unwrap();

        // 100 * 1000 / 1500 = 66.6 -> 67
        assert_eq!(outcome, PoolOutcome::SharesBurned(67));
    }

    #[test]
    fn test_admin_actions() {
        let (mut rt, pool) = setup();

        assert!(matches!(
            execute(&mut rt, &pool, &alice(), &PoolAction::Pause),
            Err(FlashError::Unauthorized { .. })
        ));
        execute(&mut rt, &pool, &owner(), &PoolAction::Pause).unwrap();
        assert!(summary(&rt, &pool).unwrap().paused);
        assert_eq!(
            execute(&mut rt, &pool, &alice(), &PoolAction::Deposit { amount: 1 }),
            Err(FlashError::PoolPaused)
        );
        execute(&mut rt, &pool, &owner(), &PoolAction::Unpause).unwrap();

        let fees = PoolAction::SetFeeSchedule { platform_fee_bips: 1, pool_fee_bips: 8 };
        execute(&mut rt, &pool, &owner(), &fees).unwrap();
        assert_eq!(quote_fee(&rt, &pool, 10_000).unwrap(), 9);

        execute(&mut rt, &pool, &owner(), &PoolAction::SetFeeVault { vault: [9u8; 32] }).unwrap();
        assert_eq!(rt.reserve_pool(&pool).unwrap().fee_vault(), [9u8; 32]);

        execute(&mut rt, &pool, &owner(), &PoolAction::TransferOwnership { new_owner: alice() }).unwrap();
        assert!(execute(&mut rt, &pool, &owner(), &PoolAction::Pause).is_err());
        assert!(execute(&mut rt, &pool, &alice(), &PoolAction::Pause).is_ok());
    }

    #[test]
    fn test_malformed_action_rejected() {
        let (mut rt, pool) = setup();
        assert_eq!(
            execute_encoded(&mut rt, &pool, &alice(), &[0xFF, 0x00]),
            Err(FlashError::InvalidWitness)
        );
        assert_eq!(decode_action(&[]), Err(FlashError::InvalidWitness));
    }
}
