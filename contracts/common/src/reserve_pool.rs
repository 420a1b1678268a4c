//! Reserve Pool
//!
//! Single-asset vault issuing proportional shares and lending its balance
//! through `flash_invoke`.
//!
//! ## Key Features
//!
//! - **Reserve is the balance**: the pool's reserve is whatever the ledger
//!   says it holds, so untracked transfers raise the share price for
//!   everyone already in the pool
//! - **Floor-rounded issuance**: later depositors get
//!   `floor(amount * S / R)` shares
//! - **Exact settlement**: a flash loan settles only if the pool ends at
//!   `start + reward` to the unit; shortfall and surplus both fail
//! - **Reentrancy guard**: deposits, withdrawals and new flash loans are
//!   refused while a flash loan is out
//! - **Pause**: a paused pool refuses deposits and loans; withdrawals stay open

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::access_control::{validate_new_owner, Owned};
use crate::errors::{AmountErrorReason, FlashError, FlashResult};
use crate::events::FlashEvent;
use crate::fees::FeeSchedule;
use crate::guard::ReentrancyGuard;
use crate::math::{assets_for_shares, safe_add, safe_sub, shares_for_assets, shares_for_deposit};
use crate::runtime::{FlashLoan, FlashReceipt, Runtime, Settlement};
use crate::types::{Address, Asset, ReservePoolConfig, ZERO_ADDRESS};

// ============ State ============

/// Persistent pool state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ReservePoolState {
    pub config: ReservePoolConfig,
    /// Outstanding shares
    pub total_shares: u64,
    /// holder -> shares (absent means zero)
    pub shares: BTreeMap<Address, u64>,
    pub paused: bool,
}

impl ReservePoolState {
    pub fn new(config: ReservePoolConfig) -> Self {
        Self {
            config,
            total_shares: 0,
            shares: BTreeMap::new(),
            paused: false,
        }
    }

    pub fn share_balance(&self, holder: &Address) -> u64 {
        self.shares.get(holder).copied().unwrap_or(0)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// A deployed pool: persistent state plus its in-flight guard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservePool {
    state: ReservePoolState,
    guard: ReentrancyGuard,
}

impl Owned for ReservePool {
    fn owner(&self) -> Address {
        self.state.config.owner
    }
}

impl ReservePool {
    pub fn new(config: ReservePoolConfig) -> Self {
        Self::restore(ReservePoolState::new(config))
    }

    /// Rebuild from persisted state; guards always restart idle
    pub fn restore(state: ReservePoolState) -> Self {
        Self {
            state,
            guard: ReentrancyGuard::new(),
        }
    }

    pub fn state(&self) -> &ReservePoolState {
        &self.state
    }

    pub fn asset(&self) -> Asset {
        self.state.config.asset
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        self.state.config.fee_schedule
    }

    pub fn fee_vault(&self) -> Address {
        self.state.config.fee_vault
    }

    pub fn total_supply(&self) -> u64 {
        self.state.total_shares
    }

    pub fn share_balance(&self, holder: &Address) -> u64 {
        self.state.share_balance(holder)
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    pub fn guard(&self) -> &ReentrancyGuard {
        &self.guard
    }

    fn mint_shares(&mut self, holder: &Address, shares: u64) -> FlashResult<()> {
        let balance = safe_add(self.share_balance(holder), shares)?;
        self.state.total_shares = safe_add(self.state.total_shares, shares)?;
        self.state.shares.insert(*holder, balance);
        Ok(())
    }

    fn burn_shares(&mut self, holder: &Address, shares: u64) -> FlashResult<()> {
        let held = self.share_balance(holder);
        if held < shares {
            return Err(FlashError::InsufficientShares { held, requested: shares });
        }
        self.state.total_shares = safe_sub(self.state.total_shares, shares)?;
        if held == shares {
            self.state.shares.remove(holder);
        } else {
            self.state.shares.insert(*holder, held - shares);
        }
        Ok(())
    }
}

// ============ Views ============

/// Asset balance held by the pool
pub fn total_reserve(rt: &Runtime, pool: &Address) -> FlashResult<u64> {
    let asset = rt.reserve_pool(pool)?.asset();
    Ok(rt.balance_of(&asset, pool))
}

/// Amount currently available to flash borrowers (0 while paused)
pub fn max_liquidity(rt: &Runtime, pool: &Address) -> FlashResult<u64> {
    if rt.reserve_pool(pool)?.is_paused() {
        return Ok(0);
    }
    total_reserve(rt, pool)
}

/// Reward a flash loan of `amount` must return on top of the principal
pub fn reserved_fee(rt: &Runtime, pool: &Address, amount: u64) -> FlashResult<u64> {
    rt.reserve_pool(pool)?.fee_schedule().reserved_fee(amount)
}

/// Asset value of a holder's shares at the current price
pub fn underlying_of(rt: &Runtime, pool: &Address, holder: &Address) -> FlashResult<u64> {
    let state = rt.reserve_pool(pool)?;
    let held = state.share_balance(holder);
    if held == 0 {
        return Ok(0);
    }
    assets_for_shares(held, state.total_supply(), total_reserve(rt, pool)?)
}

// ============ Operations ============

/// Refuse the call if a flash loan is out, tainting that loan
fn ensure_fresh(rt: &mut Runtime, pool: &Address) -> FlashResult<()> {
    if rt.reserve_pool(pool)?.guard().is_idle() {
        return Ok(());
    }
    rt.flag_reentry(pool);
    Err(FlashError::NotFreshEnvironment)
}

/// Deposit `amount` of the pool's asset, returning the shares minted
pub fn deposit(rt: &mut Runtime, pool: &Address, caller: &Address, amount: u64) -> FlashResult<u64> {
    rt.atomically(|rt| {
        ensure_fresh(rt, pool)?;
        if amount == 0 {
            return Err(FlashError::ZeroAmount);
        }

        let state = rt.reserve_pool(pool)?;
        if state.is_paused() {
            return Err(FlashError::PoolPaused);
        }
        let asset = state.asset();
        let total_shares = state.total_supply();
        let reserve_before = rt.balance_of(&asset, pool);

        let minted = shares_for_deposit(amount, total_shares, reserve_before)?;
        if minted == 0 {
            return Err(FlashError::InvalidAmount {
                amount,
                reason: AmountErrorReason::TooSmall,
            });
        }

        rt.move_funds(&asset, caller, pool, amount)?;
        rt.reserve_pool_mut(pool)?.mint_shares(caller, minted)?;
        rt.emit(*pool, FlashEvent::Mint {
            holder: *caller,
            asset_amount: amount,
            share_amount: minted,
        });

        info!("deposit {} -> {} shares (reserve before {})", amount, minted, reserve_before);
        Ok(minted)
    })
}

/// Burn `shares`, paying out `floor(shares * R / S)`
pub fn withdraw(rt: &mut Runtime, pool: &Address, caller: &Address, shares: u64) -> FlashResult<u64> {
    rt.atomically(|rt| {
        ensure_fresh(rt, pool)?;
        if shares == 0 {
            return Err(FlashError::ZeroAmount);
        }

        let state = rt.reserve_pool(pool)?;
        let total_shares = state.total_supply();
        if total_shares == 0 {
            return Err(FlashError::NoSupply);
        }
        let held = state.share_balance(caller);
        if held < shares {
            return Err(FlashError::InsufficientShares { held, requested: shares });
        }
        let asset = state.asset();

        let payout = assets_for_shares(shares, total_shares, rt.balance_of(&asset, pool))?;
        redeem(rt, pool, caller, &asset, shares, payout)?;

        info!("withdraw {} shares -> {}", shares, payout);
        Ok(payout)
    })
}

/// Pay out exactly `amount`, burning `ceil(amount * S / R)` shares
pub fn withdraw_underlying(rt: &mut Runtime, pool: &Address, caller: &Address, amount: u64) -> FlashResult<u64> {
    rt.atomically(|rt| {
        ensure_fresh(rt, pool)?;
        if amount == 0 {
            return Err(FlashError::ZeroAmount);
        }

        let state = rt.reserve_pool(pool)?;
        let total_shares = state.total_supply();
        if total_shares == 0 {
            return Err(FlashError::NoSupply);
        }
        let held = state.share_balance(caller);
        let asset = state.asset();
        let reserve = rt.balance_of(&asset, pool);
        if amount > reserve {
            return Err(FlashError::InsufficientReserve { available: reserve, requested: amount });
        }

        let burned = shares_for_assets(amount, total_shares, reserve)?;
        if held < burned {
            return Err(FlashError::InsufficientShares { held, requested: burned });
        }
        redeem(rt, pool, caller, &asset, burned, amount)?;

        info!("withdraw {} underlying -> burned {} shares", amount, burned);
        Ok(burned)
    })
}

fn redeem(
    rt: &mut Runtime,
    pool: &Address,
    holder: &Address,
    asset: &Asset,
    shares: u64,
    payout: u64,
) -> FlashResult<()> {
    rt.reserve_pool_mut(pool)?.burn_shares(holder, shares)?;
    rt.move_funds(asset, pool, holder, payout)?;
    rt.emit(*pool, FlashEvent::Redeem {
        holder: *holder,
        asset_amount: payout,
        share_amount: shares,
    });
    Ok(())
}

/// Lend `amount` to `target`, call it with `payload`, and require the pool
/// to end at exactly `start + reward`
pub fn flash_invoke(
    rt: &mut Runtime,
    pool: &Address,
    caller: &Address,
    target: &Address,
    amount: u64,
    payload: &[u8],
) -> FlashResult<FlashReceipt> {
    rt.atomically(|rt| {
        ensure_fresh(rt, pool)?;
        if amount == 0 {
            return Err(FlashError::ZeroAmount);
        }

        let state = rt.reserve_pool(pool)?;
        if state.is_paused() {
            return Err(FlashError::PoolPaused);
        }
        let asset = state.asset();
        let fee_vault = state.fee_vault();
        let split = state.fee_schedule().split(amount)?;
        let reward = split.total();

        let start = rt.balance_of(&asset, pool);
        if amount > start {
            return Err(FlashError::InsufficientReserve { available: start, requested: amount });
        }

        // Idle -> Drawing
        rt.reserve_pool_mut(pool)?.guard.enter()?;
        rt.clear_reentry(pool);
        rt.move_funds(&asset, pool, target, amount)?;

        let loan = FlashLoan {
            lender: *pool,
            initiator: *caller,
            asset,
            amount,
            fee: reward,
            value: 0,
            payload: payload.to_vec(),
            settlement: Settlement::Push,
        };
        rt.call_borrower(target, &loan)?;

        // Drawing -> Verifying
        rt.reserve_pool_mut(pool)?.guard.begin_verification()?;
        if rt.take_reentry(pool) {
            return Err(FlashError::NotFreshEnvironment);
        }

        let expected = safe_add(start, reward)?;
        let actual = rt.balance_of(&asset, pool);
        if actual != expected {
            warn!("flash loan of {} settled at {}, expected {}", amount, actual, expected);
            return Err(FlashError::IncorrectEndingBalance { expected, actual });
        }

        rt.move_funds(&asset, pool, &fee_vault, split.platform)?;
        rt.emit(*pool, FlashEvent::Reward {
            asset,
            platform_reward: split.platform,
            pool_reward: split.pool,
        });

        // Verifying -> Idle
        rt.reserve_pool_mut(pool)?.guard.release();
        debug!("flash loan of {} settled, reward {:?}", amount, split);

        Ok(FlashReceipt {
            lender: *pool,
            asset,
            amount,
            fee: reward,
        })
    })
}

// ============ Administration ============

pub fn set_fee_schedule(
    rt: &mut Runtime,
    pool: &Address,
    caller: &Address,
    schedule: FeeSchedule,
) -> FlashResult<()> {
    rt.atomically(|rt| {
        rt.reserve_pool(pool)?.ensure_owner(caller)?;
        schedule.validate()?;
        rt.reserve_pool_mut(pool)?.state.config.fee_schedule = schedule;
        rt.emit(*pool, FlashEvent::FeeScheduleUpdated {
            platform_fee_bips: schedule.platform_fee_bips,
            pool_fee_bips: schedule.pool_fee_bips,
        });
        Ok(())
    })
}

pub fn set_fee_vault(rt: &mut Runtime, pool: &Address, caller: &Address, vault: &Address) -> FlashResult<()> {
    rt.atomically(|rt| {
        let state = rt.reserve_pool(pool)?;
        state.ensure_owner(caller)?;
        if *vault == ZERO_ADDRESS {
            return Err(FlashError::InvalidAddress { reason: "fee vault is the zero address" });
        }
        let old_vault = state.fee_vault();
        rt.reserve_pool_mut(pool)?.state.config.fee_vault = *vault;
        rt.emit(*pool, FlashEvent::FeeVaultUpdated { old_vault, new_vault: *vault });
        Ok(())
    })
}

pub fn pause(rt: &mut Runtime, pool: &Address, caller: &Address) -> FlashResult<()> {
    set_paused(rt, pool, caller, true)
}

pub fn unpause(rt: &mut Runtime, pool: &Address, caller: &Address) -> FlashResult<()> {
    set_paused(rt, pool, caller, false)
}

fn set_paused(rt: &mut Runtime, pool: &Address, caller: &Address, paused: bool) -> FlashResult<()> {
    rt.atomically(|rt| {
        let state = rt.reserve_pool(pool)?;
        state.ensure_owner(caller)?;
        if state.is_paused() == paused {
            return Ok(());
        }
        rt.reserve_pool_mut(pool)?.state.paused = paused;
        let event = if paused {
            FlashEvent::PoolPaused { by: *caller }
        } else {
            FlashEvent::PoolUnpaused { by: *caller }
        };
        rt.emit(*pool, event);
        Ok(())
    })
}

pub fn transfer_ownership(
    rt: &mut Runtime,
    pool: &Address,
    caller: &Address,
    new_owner: &Address,
) -> FlashResult<()> {
    rt.atomically(|rt| {
        rt.reserve_pool(pool)?.ensure_owner(caller)?;
        validate_new_owner(new_owner)?;
        rt.reserve_pool_mut(pool)?.state.config.owner = *new_owner;
        rt.emit(*pool, FlashEvent::OwnerChanged { old_owner: *caller, new_owner: *new_owner });
        Ok(())
    })
}
