//! Flash Loan Aggregator
//!
//! Routes one request across several liquidity adapters, hands the combined
//! funds to a single target and settles every backend atomically.
//!
//! ## Session flow
//!
//! Draws nest: the aggregator borrows from adapter 0, whose callback borrows
//! from adapter 1, and so on. The innermost callback forwards everything to
//! the target, then the stack unwinds and each backend checks its own
//! repayment. A failure anywhere aborts the whole invoke and the runtime
//! discards the draws already made.
//!
//! ```text
//! invoke ─ draw(0) ─> on_lender_callback(0) ─ draw(1) ─> ... ─> target
//!        <─ settle(0) <─────────────────────── settle(1) <─ ... <─┘
//! ```
//!
//! Every draw carries a step id derived from the session nonce, so a lender
//! callback that the aggregator did not ask for is rejected.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::access_control::{validate_new_owner, Owned};
use crate::adapter::LiquidityAdapter;
use crate::constants::{domains, limits::MAX_ADAPTERS_PER_ASSET};
use crate::errors::{AmountErrorReason, FlashError, FlashResult};
use crate::events::FlashEvent;
use crate::math::{bips_of, safe_add};
use crate::router::{self, RouteLeg, RoutePlan};
use crate::runtime::{FlashLoan, Runtime, Settlement};
use crate::types::{validate_bips, Address, AggregatorConfig, Asset, ZERO_ADDRESS};

// ============ Adapter Registry ============

/// Ordered adapters per asset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct AdapterRegistry {
    routes: BTreeMap<Asset, Vec<LiquidityAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapters for `asset` in registration order
    pub fn adapters(&self, asset: &Asset) -> &[LiquidityAdapter] {
        self.routes.get(asset).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        self.routes.keys()
    }

    /// Append `adapter` to the route for `asset`, returning its position
    pub fn register(&mut self, asset: Asset, adapter: LiquidityAdapter) -> FlashResult<u32> {
        let route = self.routes.entry(asset).or_default();
        if route.iter().any(|a| a.backend() == adapter.backend()) {
            return Err(FlashError::InvalidAddress { reason: "backend already registered for asset" });
        }
        if route.len() >= MAX_ADAPTERS_PER_ASSET {
            return Err(FlashError::InvalidAmount {
                amount: route.len() as u64,
                reason: AmountErrorReason::TooLarge,
            });
        }
        route.push(adapter);
        Ok((route.len() - 1) as u32)
    }

    /// Remove the adapter backed by `backend`, keeping the others in order
    pub fn remove(&mut self, asset: &Asset, backend: &Address) -> FlashResult<LiquidityAdapter> {
        let not_found = FlashError::AdapterNotFound { asset: *asset, backend: *backend };
        let route = self.routes.get_mut(asset).ok_or(not_found.clone())?;
        let index = route
            .iter()
            .position(|a| a.backend() == *backend)
            .ok_or(not_found)?;
        let removed = route.remove(index);
        if route.is_empty() {
            self.routes.remove(asset);
        }
        Ok(removed)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

// ============ Requests ============

/// Parameters of one `invoke`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct InvokeRequest {
    pub asset: Asset,
    pub amount: u64,
    pub target: Address,
    pub payload: Vec<u8>,
    /// Native value the caller attaches and the target receives
    pub value: u64,
}

impl InvokeRequest {
    pub fn new(asset: Asset, amount: u64, target: Address) -> Self {
        Self {
            asset,
            amount,
            target,
            payload: Vec::new(),
            value: 0,
        }
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_value(mut self, value: u64) -> Self {
        self.value = value;
        self
    }
}

/// Settled invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokeReceipt {
    pub amount: u64,
    /// Sum of backend fees
    pub adapter_fees: u64,
    /// Aggregator cut sent to the fee vault
    pub platform_fee: u64,
    /// Number of adapters drawn
    pub legs: usize,
}

impl InvokeReceipt {
    /// What the target paid back
    pub fn repayment(&self) -> FlashResult<u64> {
        safe_add(safe_add(self.amount, self.adapter_fees)?, self.platform_fee)
    }
}

// ============ Aggregator ============

/// In-flight session; its presence is the aggregator's guard
#[derive(Debug, Clone, PartialEq, Eq)]
struct Session {
    caller: Address,
    request: InvokeRequest,
    legs: Vec<RouteLeg>,
    nonce: u64,
    /// Draw whose lender callback is expected next
    pending_step: Option<usize>,
    /// Aggregator balance of the asset before the invoke
    start_balance: u64,
    platform_fee: u64,
}

impl Session {
    fn adapter_fees(&self) -> FlashResult<u64> {
        self.legs.iter().try_fold(0u64, |acc, leg| safe_add(acc, leg.fee))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregator {
    config: AggregatorConfig,
    registry: AdapterRegistry,
    session: Option<Session>,
    sessions_started: u64,
}

impl Owned for Aggregator {
    fn owner(&self) -> Address {
        self.config.owner
    }
}

impl Aggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self::restore(config, AdapterRegistry::new())
    }

    /// Rebuild from persisted configuration and registry
    pub fn restore(config: AggregatorConfig, registry: AdapterRegistry) -> Self {
        Self {
            config,
            registry,
            session: None,
            sessions_started: 0,
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn adapters(&self, asset: &Asset) -> &[LiquidityAdapter] {
        self.registry.adapters(asset)
    }

    /// True while an invoke is running
    pub fn is_in_flight(&self) -> bool {
        self.session.is_some()
    }
}

/// Payload identifying draw `index` of session `nonce`
pub fn step_id(aggregator: &Address, nonce: u64, index: usize) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(domains::AGGREGATION_STEP);
    hasher.update(aggregator);
    hasher.update(nonce.to_le_bytes());
    hasher.update((index as u64).to_le_bytes());
    hasher.finalize().into()
}

// ============ Views ============

/// Sum of `max_liquidity` over the asset's adapters (0 if none)
pub fn total_liquidity(rt: &Runtime, aggregator: &Address, asset: &Asset) -> FlashResult<u64> {
    let adapters = rt.aggregator(aggregator)?.adapters(asset);
    router::total_liquidity(rt, adapters, asset)
}

/// Route `amount` without drawing
pub fn plan_route(rt: &Runtime, aggregator: &Address, asset: &Asset, amount: u64) -> FlashResult<RoutePlan> {
    let adapters = rt.aggregator(aggregator)?.adapters(asset);
    router::plan_route(rt, adapters, asset, amount)
}

/// Principal plus every fee an invoke of `amount` would charge
pub fn estimate_repayment_amount(rt: &Runtime, aggregator: &Address, asset: &Asset, amount: u64) -> FlashResult<u64> {
    let state = rt.aggregator(aggregator)?;
    let adapters = state.adapters(asset);
    if adapters.is_empty() {
        return Err(FlashError::NoLiquidityForToken { asset: *asset });
    }

    let available = router::total_liquidity(rt, adapters, asset)?;
    if amount > available {
        return Err(FlashError::NotEnoughLiquidity { requested: amount, available });
    }

    let plan = router::plan_route(rt, adapters, asset, amount)?;
    let platform_fee = bips_of(amount, state.config.platform_fee_bips)?;
    safe_add(safe_add(amount, plan.total_fees()?)?, platform_fee)
}

// ============ Invoke ============

/// Borrow `request.amount` across the registered adapters and hand it to
/// `request.target`, which must repay `amount + fees` before returning
pub fn invoke(
    rt: &mut Runtime,
    aggregator: &Address,
    caller: &Address,
    request: &InvokeRequest,
) -> FlashResult<InvokeReceipt> {
    rt.atomically(|rt| {
        let (in_flight, platform_fee_bips, fee_vault, nonce) = {
            let state = rt.aggregator(aggregator)?;
            (
                state.is_in_flight(),
                state.config.platform_fee_bips,
                state.config.fee_vault,
                state.sessions_started,
            )
        };
        if in_flight {
            rt.flag_reentry(aggregator);
            return Err(FlashError::NotFreshEnvironment);
        }
        if request.amount == 0 {
            return Err(FlashError::ZeroAmount);
        }
        if request.target == *aggregator {
            return Err(FlashError::CannotInvokeSelf);
        }

        let asset = request.asset;
        let plan = plan_route(rt, aggregator, &asset, request.amount)?;
        if !plan.is_complete() {
            return Err(FlashError::InsufficientLiquidity {
                requested: request.amount,
                available: plan.routed()?,
            });
        }
        let platform_fee = bips_of(request.amount, platform_fee_bips)?;
        let start_balance = rt.balance_of(&asset, aggregator);

        if request.value > 0 {
            rt.move_funds(&Asset::Native, caller, aggregator, request.value)?;
        }

        let session = Session {
            caller: *caller,
            request: request.clone(),
            legs: plan.legs,
            nonce,
            pending_step: None,
            start_balance,
            platform_fee,
        };
        let adapter_fees = session.adapter_fees()?;
        let legs = session.legs.len();
        {
            let state = rt.aggregator_mut(aggregator)?;
            state.sessions_started += 1;
            state.session = Some(session);
        }
        rt.clear_reentry(aggregator);
        debug!("invoke of {} {:?} routed over {} adapters", request.amount, asset, legs);

        run_step(rt, aggregator, 0)?;

        // Every backend is settled; what is left over is the platform cut
        let expected = safe_add(start_balance, platform_fee)?;
        let actual = rt.balance_of(&asset, aggregator);
        if actual != expected {
            warn!("aggregator holds {} after settlement, expected {}", actual, expected);
            return Err(FlashError::IncorrectEndingBalance { expected, actual });
        }
        rt.move_funds(&asset, aggregator, &fee_vault, platform_fee)?;

        rt.emit(*aggregator, FlashEvent::Reward {
            asset,
            platform_reward: platform_fee,
            pool_reward: adapter_fees,
        });
        rt.aggregator_mut(aggregator)?.session = None;

        info!(
            "invoke settled: {} {:?}, adapter fees {}, platform fee {}",
            request.amount, asset, adapter_fees, platform_fee
        );
        Ok(InvokeReceipt {
            amount: request.amount,
            adapter_fees,
            platform_fee,
            legs,
        })
    })
}

fn current_session(rt: &Runtime, aggregator: &Address) -> FlashResult<Session> {
    rt.aggregator(aggregator)?
        .session
        .clone()
        .ok_or(FlashError::UnexpectedCallback)
}

fn set_pending_step(rt: &mut Runtime, aggregator: &Address, step: Option<usize>) -> FlashResult<()> {
    let state = rt.aggregator_mut(aggregator)?;
    let session = state.session.as_mut().ok_or(FlashError::UnexpectedCallback)?;
    session.pending_step = step;
    Ok(())
}

/// Draw leg `index`, or call the target once every leg is out
fn run_step(rt: &mut Runtime, aggregator: &Address, index: usize) -> FlashResult<()> {
    let session = current_session(rt, aggregator)?;
    let Some(leg) = session.legs.get(index).copied() else {
        return call_target(rt, aggregator, &session);
    };

    set_pending_step(rt, aggregator, Some(index))?;
    let id = step_id(aggregator, session.nonce, index);
    trace!("step {}: drawing {} from {:02x?}", index, leg.amount, &leg.adapter.backend()[..4]);

    leg.adapter
        .draw(rt, aggregator, &session.request.asset, leg.amount, &id)
        .map(|_| ())
}

/// Entry point for lenders calling the aggregator back during a draw
pub(crate) fn on_lender_callback(rt: &mut Runtime, aggregator: &Address, loan: &FlashLoan) -> FlashResult<()> {
    let session = current_session(rt, aggregator)?;
    let index = session.pending_step.ok_or(FlashError::InvalidStep)?;
    let leg = session.legs.get(index).ok_or(FlashError::InvalidStep)?;

    if loan.lender != leg.adapter.backend()
        || loan.asset != session.request.asset
        || loan.amount != leg.amount
        || loan.payload.as_slice() != step_id(aggregator, session.nonce, index).as_slice()
    {
        warn!("rejected lender callback for step {}", index);
        return Err(FlashError::InvalidStep);
    }

    set_pending_step(rt, aggregator, None)?;
    run_step(rt, aggregator, index + 1)?;

    match loan.settlement {
        Settlement::Push => rt.move_funds(&loan.asset, aggregator, &loan.lender, loan.repayment()?),
        // Lender collects on its own once we return
        Settlement::Pull => Ok(()),
    }
}

/// Forward the drawn funds and attached value to the target and check that
/// it paid back principal plus every fee
fn call_target(rt: &mut Runtime, aggregator: &Address, session: &Session) -> FlashResult<()> {
    let request = &session.request;
    rt.move_funds(&request.asset, aggregator, &request.target, request.amount)?;
    if request.value > 0 {
        rt.move_funds(&Asset::Native, aggregator, &request.target, request.value)?;
    }
    rt.emit(*aggregator, FlashEvent::Invocation {
        target: request.target,
        value_forwarded: request.value,
        amount: request.amount,
    });

    let fee = safe_add(session.adapter_fees()?, session.platform_fee)?;
    let loan = FlashLoan {
        lender: *aggregator,
        initiator: session.caller,
        asset: request.asset,
        amount: request.amount,
        fee,
        value: request.value,
        payload: request.payload.clone(),
        settlement: Settlement::Push,
    };
    rt.call_borrower(&request.target, &loan)?;

    if rt.take_reentry(aggregator) {
        return Err(FlashError::NotFreshEnvironment);
    }

    let expected = safe_add(session.start_balance, loan.repayment()?)?;
    let actual = rt.balance_of(&request.asset, aggregator);
    if actual != expected {
        warn!("target repaid to {}, expected {}", actual, expected);
        return Err(FlashError::IncorrectEndingBalance { expected, actual });
    }
    Ok(())
}

// ============ Administration ============

fn ensure_admin(rt: &mut Runtime, aggregator: &Address, caller: &Address) -> FlashResult<()> {
    let state = rt.aggregator(aggregator)?;
    state.ensure_owner(caller)?;
    let in_flight = state.is_in_flight();
    if in_flight {
        rt.flag_reentry(aggregator);
        return Err(FlashError::NotFreshEnvironment);
    }
    Ok(())
}

pub fn register_adapter(
    rt: &mut Runtime,
    aggregator: &Address,
    caller: &Address,
    asset: &Asset,
    adapter: LiquidityAdapter,
) -> FlashResult<u32> {
    rt.atomically(|rt| {
        ensure_admin(rt, aggregator, caller)?;
        adapter.check_asset(rt, asset)?;
        let position = rt.aggregator_mut(aggregator)?.registry.register(*asset, adapter)?;
        rt.emit(*aggregator, FlashEvent::AdapterRegistered {
            asset: *asset,
            backend: adapter.backend(),
            position,
        });
        info!("adapter {:02x?} registered at position {}", &adapter.backend()[..4], position);
        Ok(position)
    })
}

pub fn remove_adapter(
    rt: &mut Runtime,
    aggregator: &Address,
    caller: &Address,
    asset: &Asset,
    backend: &Address,
) -> FlashResult<()> {
    rt.atomically(|rt| {
        ensure_admin(rt, aggregator, caller)?;
        rt.aggregator_mut(aggregator)?.registry.remove(asset, backend)?;
        rt.emit(*aggregator, FlashEvent::AdapterRemoved { asset: *asset, backend: *backend });
        Ok(())
    })
}

pub fn set_platform_fee(rt: &mut Runtime, aggregator: &Address, caller: &Address, bips: u64) -> FlashResult<()> {
    rt.atomically(|rt| {
        ensure_admin(rt, aggregator, caller)?;
        validate_bips(bips)?;
        rt.aggregator_mut(aggregator)?.config.platform_fee_bips = bips;
        rt.emit(*aggregator, FlashEvent::FeeScheduleUpdated {
            platform_fee_bips: bips,
            pool_fee_bips: 0,
        });
        Ok(())
    })
}

pub fn set_fee_vault(rt: &mut Runtime, aggregator: &Address, caller: &Address, vault: &Address) -> FlashResult<()> {
    rt.atomically(|rt| {
        ensure_admin(rt, aggregator, caller)?;
        if *vault == ZERO_ADDRESS {
            return Err(FlashError::InvalidAddress { reason: "fee vault is the zero address" });
        }
        let state = rt.aggregator_mut(aggregator)?;
        let old_vault = state.config.fee_vault;
        state.config.fee_vault = *vault;
        rt.emit(*aggregator, FlashEvent::FeeVaultUpdated { old_vault, new_vault: *vault });
        Ok(())
    })
}

pub fn transfer_ownership(
    rt: &mut Runtime,
    aggregator: &Address,
    caller: &Address,
    new_owner: &Address,
) -> FlashResult<()> {
    rt.atomically(|rt| {
        ensure_admin(rt, aggregator, caller)?;
        validate_new_owner(new_owner)?;
        rt.aggregator_mut(aggregator)?.config.owner = *new_owner;
        rt.emit(*aggregator, FlashEvent::OwnerChanged { old_owner: *caller, new_owner: *new_owner });
        Ok(())
    })
}
