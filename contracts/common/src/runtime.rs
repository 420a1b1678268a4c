//! Execution Runtime
//!
//! Hosts every deployed component, the balance ledger and the event log,
//! and gives each public operation a transaction boundary.
//!
//! ## Key Features
//!
//! - **Atomic operations**: `atomically` takes a checkpoint, runs the body and
//!   rolls every journaled mutation back if it returns `Err`. Checkpoints
//!   nest, so a borrower that swallows a failed inner call keeps the outer
//!   operation alive with the inner effects discarded.
//! - **Callback dispatch**: lenders hand control to borrowers through
//!   `call_borrower`. An aggregator address is answered by the aggregator
//!   itself; any other address must host a registered `FlashBorrower`.
//! - **Caller identity**: borrowers act through a `CallContext` bound to
//!   their own address and can only move their own funds.
//!
//! Borrower objects keep their own memory outside the journal.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, trace, warn};

use crate::aggregator::{self, Aggregator, InvokeRequest, InvokeReceipt};
use crate::constants::domains;
use crate::errors::{FlashError, FlashResult};
use crate::events::{EventLog, FlashEvent};
use crate::journal::{Checkpoint, Journal, JournalEntry, Ledger};
use crate::lending_pool::{self, LendingPool};
use crate::math::{safe_add, safe_sub};
use crate::reserve_pool::{self, ReservePool};
use crate::types::{
    derive_address, Address, AggregatorConfig, Asset, LendingPoolConfig, ReservePoolConfig,
    ZERO_ADDRESS,
};

// ============ Callback Interface ============

/// How a lender collects repayment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Borrower transfers principal + fee back before returning
    Push,
    /// Lender collects principal + fee from the borrower after it returns
    Pull,
}

/// Terms handed to a borrower callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashLoan {
    /// Component that sent the funds
    pub lender: Address,
    /// Account that requested the loan
    pub initiator: Address,
    pub asset: Asset,
    pub amount: u64,
    /// Fee owed on top of `amount`
    pub fee: u64,
    /// Native value forwarded alongside the loan
    pub value: u64,
    pub payload: Vec<u8>,
    pub settlement: Settlement,
}

impl FlashLoan {
    /// amount + fee
    pub fn repayment(&self) -> FlashResult<u64> {
        safe_add(self.amount, self.fee)
    }
}

/// Outcome of a settled flash loan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashReceipt {
    pub lender: Address,
    pub asset: Asset,
    pub amount: u64,
    pub fee: u64,
}

/// Callback target of a flash loan or invoke
pub trait FlashBorrower {
    /// Runs while the loan is outstanding. For `Settlement::Push` loans the
    /// lender's balance must equal its pre-loan balance plus the fee when
    /// this returns.
    fn on_flash_loan(&mut self, ctx: &mut CallContext<'_>, loan: &FlashLoan) -> FlashResult<()>;
}

// ============ Runtime ============

pub struct Runtime {
    ledger: Ledger,
    journal: Journal,
    events: EventLog,
    reserve_pools: BTreeMap<Address, ReservePool>,
    lending_pools: BTreeMap<Address, LendingPool>,
    aggregators: BTreeMap<Address, Aggregator>,
    /// `None` while the borrower's callback is running
    borrowers: BTreeMap<Address, Option<Box<dyn FlashBorrower>>>,
    /// Components that rejected a reentrant call during their current session
    reentry_flags: BTreeSet<Address>,
    depth: usize,
    nonce: u64,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            ledger: Ledger::new(),
            journal: Journal::new(),
            events: EventLog::new(),
            reserve_pools: BTreeMap::new(),
            lending_pools: BTreeMap::new(),
            aggregators: BTreeMap::new(),
            borrowers: BTreeMap::new(),
            reentry_flags: BTreeSet::new(),
            depth: 0,
            nonce: 0,
        }
    }

    // ============ Deployment ============

    pub fn deploy_reserve_pool(&mut self, deployer: &Address, config: ReservePoolConfig) -> FlashResult<Address> {
        config.validate()?;
        let address = self.next_address(domains::RESERVE_POOL, deployer);
        info!("reserve pool {:02x?} deployed for {:?}", &address[..4], config.asset);
        self.reserve_pools.insert(address, ReservePool::new(config));
        Ok(address)
    }

    pub fn deploy_lending_pool(&mut self, deployer: &Address, config: LendingPoolConfig) -> FlashResult<Address> {
        config.validate()?;
        let address = self.next_address(domains::LENDING_POOL, deployer);
        info!("lending pool {:02x?} deployed", &address[..4]);
        self.lending_pools.insert(address, LendingPool::new(config));
        Ok(address)
    }

    pub fn deploy_aggregator(&mut self, deployer: &Address, config: AggregatorConfig) -> FlashResult<Address> {
        config.validate()?;
        let address = self.next_address(domains::AGGREGATOR, deployer);
        info!("aggregator {:02x?} deployed", &address[..4]);
        self.aggregators.insert(address, Aggregator::new(config));
        Ok(address)
    }

    /// Install callback code at `address`
    pub fn register_borrower<B>(&mut self, address: Address, borrower: B) -> FlashResult<()>
    where
        B: FlashBorrower + 'static,
    {
        if address == ZERO_ADDRESS {
            return Err(FlashError::InvalidAddress { reason: "borrower at the zero address" });
        }
        if self.is_component(&address) {
            return Err(FlashError::InvalidAddress { reason: "address hosts an engine component" });
        }
        self.borrowers.insert(address, Some(Box::new(borrower)));
        Ok(())
    }

    fn next_address(&mut self, domain: &[u8], deployer: &Address) -> Address {
        let address = derive_address(domain, deployer, self.nonce);
        self.nonce += 1;
        address
    }

    pub fn is_component(&self, address: &Address) -> bool {
        self.reserve_pools.contains_key(address)
            || self.lending_pools.contains_key(address)
            || self.aggregators.contains_key(address)
    }

    // ============ Assets ============

    pub fn balance_of(&self, asset: &Asset, account: &Address) -> u64 {
        self.ledger.balance(asset, account)
    }

    /// Credit new units to `account` (genesis allocation)
    pub fn mint(&mut self, asset: &Asset, account: &Address, amount: u64) -> FlashResult<()> {
        self.atomically(|rt| {
            let balance = safe_add(rt.ledger.balance(asset, account), amount)?;
            rt.write_balance(*asset, *account, balance);
            Ok(())
        })
    }

    /// Move `amount` of `asset` owned by `from`
    pub fn transfer(&mut self, asset: &Asset, from: &Address, to: &Address, amount: u64) -> FlashResult<()> {
        self.atomically(|rt| rt.move_funds(asset, from, to, amount))
    }

    pub(crate) fn move_funds(&mut self, asset: &Asset, from: &Address, to: &Address, amount: u64) -> FlashResult<()> {
        self.ledger.ensure_balance(asset, from, amount)?;
        if from == to || amount == 0 {
            return Ok(());
        }
        let from_balance = safe_sub(self.ledger.balance(asset, from), amount)?;
        let to_balance = safe_add(self.ledger.balance(asset, to), amount)?;
        self.write_balance(*asset, *from, from_balance);
        self.write_balance(*asset, *to, to_balance);
        trace!("transfer {} {:?}: {:02x?} -> {:02x?}", amount, asset, &from[..4], &to[..4]);
        Ok(())
    }

    fn write_balance(&mut self, asset: Asset, account: Address, amount: u64) {
        let previous = self.ledger.set(asset, account, amount);
        self.journal.record(JournalEntry::Balance { asset, account, previous });
    }

    // ============ Components ============

    pub fn reserve_pool(&self, address: &Address) -> FlashResult<&ReservePool> {
        self.reserve_pools.get(address).ok_or(FlashError::PoolNotFound { pool: *address })
    }

    pub fn lending_pool(&self, address: &Address) -> FlashResult<&LendingPool> {
        self.lending_pools.get(address).ok_or(FlashError::PoolNotFound { pool: *address })
    }

    pub fn aggregator(&self, address: &Address) -> FlashResult<&Aggregator> {
        self.aggregators
            .get(address)
            .ok_or(FlashError::AggregatorNotFound { aggregator: *address })
    }

    pub(crate) fn reserve_pool_mut(&mut self, address: &Address) -> FlashResult<&mut ReservePool> {
        let pool = self
            .reserve_pools
            .get_mut(address)
            .ok_or(FlashError::PoolNotFound { pool: *address })?;
        self.journal.record(JournalEntry::ReservePool {
            address: *address,
            previous: Box::new(pool.clone()),
        });
        Ok(pool)
    }

    pub(crate) fn lending_pool_mut(&mut self, address: &Address) -> FlashResult<&mut LendingPool> {
        let pool = self
            .lending_pools
            .get_mut(address)
            .ok_or(FlashError::PoolNotFound { pool: *address })?;
        self.journal.record(JournalEntry::LendingPool {
            address: *address,
            previous: Box::new(pool.clone()),
        });
        Ok(pool)
    }

    pub(crate) fn aggregator_mut(&mut self, address: &Address) -> FlashResult<&mut Aggregator> {
        let aggregator = self
            .aggregators
            .get_mut(address)
            .ok_or(FlashError::AggregatorNotFound { aggregator: *address })?;
        self.journal.record(JournalEntry::Aggregator {
            address: *address,
            previous: Box::new(aggregator.clone()),
        });
        Ok(aggregator)
    }

    // ============ Events ============

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub(crate) fn emit(&mut self, emitter: Address, event: FlashEvent) {
        self.events.emit(emitter, event);
    }

    // ============ Reentry Flags ============

    /// Record that `component` turned away a reentrant call
    pub(crate) fn flag_reentry(&mut self, component: &Address) {
        warn!("reentrant call rejected by {:02x?}", &component[..4]);
        self.reentry_flags.insert(*component);
    }

    pub(crate) fn clear_reentry(&mut self, component: &Address) {
        self.reentry_flags.remove(component);
    }

    pub(crate) fn take_reentry(&mut self, component: &Address) -> bool {
        self.reentry_flags.remove(component)
    }

    // ============ Transactions ============

    /// Run `op` as one unit: all of its effects survive, or none do
    pub fn atomically<T, F>(&mut self, op: F) -> FlashResult<T>
    where
        F: FnOnce(&mut Self) -> FlashResult<T>,
    {
        let checkpoint = self.checkpoint();
        self.depth += 1;
        let result = op(self);
        self.depth -= 1;

        match result {
            Ok(value) => {
                if self.depth == 0 {
                    self.journal.clear();
                }
                Ok(value)
            }
            Err(err) => {
                debug!("rolling back to depth {} after {}", self.depth, err.code());
                self.revert_to(checkpoint);
                Err(err)
            }
        }
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            journal_len: self.journal.len(),
            events_len: self.events.len(),
        }
    }

    fn revert_to(&mut self, checkpoint: Checkpoint) {
        for entry in self.journal.unwind(checkpoint.journal_len) {
            match entry {
                JournalEntry::Balance { asset, account, previous } => {
                    self.ledger.set(asset, account, previous);
                }
                JournalEntry::ReservePool { address, previous } => {
                    self.reserve_pools.insert(address, *previous);
                }
                JournalEntry::LendingPool { address, previous } => {
                    self.lending_pools.insert(address, *previous);
                }
                JournalEntry::Aggregator { address, previous } => {
                    self.aggregators.insert(address, *previous);
                }
            }
        }
        self.events.truncate(checkpoint.events_len);
    }

    // ============ Callbacks ============

    pub(crate) fn call_borrower(&mut self, target: &Address, loan: &FlashLoan) -> FlashResult<()> {
        if self.aggregators.contains_key(target) {
            return aggregator::on_lender_callback(self, target, loan);
        }

        let slot = self
            .borrowers
            .get_mut(target)
            .ok_or(FlashError::UnknownTarget { target: *target })?;
        let mut borrower = slot
            .take()
            .ok_or(FlashError::CallbackInProgress { target: *target })?;

        debug!(
            "calling borrower {:02x?} with {} {:?} (fee {})",
            &target[..4],
            loan.amount,
            loan.asset,
            loan.fee
        );
        let result = {
            let mut ctx = CallContext { rt: self, this: *target };
            borrower.on_flash_loan(&mut ctx, loan)
        };

        if let Some(slot) = self.borrowers.get_mut(target) {
            *slot = Some(borrower);
        }
        result
    }
}

// ============ Call Context ============

/// A borrower's view of the runtime while its callback runs
pub struct CallContext<'a> {
    rt: &'a mut Runtime,
    this: Address,
}

impl<'a> CallContext<'a> {
    /// Address of the running borrower
    pub fn this(&self) -> Address {
        self.this
    }

    /// Read-only access for views
    pub fn runtime(&self) -> &Runtime {
        &*self.rt
    }

    pub fn balance(&self, asset: &Asset) -> u64 {
        self.rt.balance_of(asset, &self.this)
    }

    pub fn transfer(&mut self, asset: &Asset, to: &Address, amount: u64) -> FlashResult<()> {
        self.rt.transfer(asset, &self.this, to, amount)
    }

    pub fn deposit(&mut self, pool: &Address, amount: u64) -> FlashResult<u64> {
        reserve_pool::deposit(self.rt, pool, &self.this, amount)
    }

    pub fn withdraw(&mut self, pool: &Address, shares: u64) -> FlashResult<u64> {
        reserve_pool::withdraw(self.rt, pool, &self.this, shares)
    }

    pub fn withdraw_underlying(&mut self, pool: &Address, amount: u64) -> FlashResult<u64> {
        reserve_pool::withdraw_underlying(self.rt, pool, &self.this, amount)
    }

    pub fn flash_invoke(
        &mut self,
        pool: &Address,
        target: &Address,
        amount: u64,
        payload: &[u8],
    ) -> FlashResult<FlashReceipt> {
        reserve_pool::flash_invoke(self.rt, pool, &self.this, target, amount, payload)
    }

    pub fn flash_loan(
        &mut self,
        lending_pool: &Address,
        receiver: &Address,
        asset: &Asset,
        amount: u64,
        payload: &[u8],
    ) -> FlashResult<FlashReceipt> {
        lending_pool::flash_loan(self.rt, lending_pool, &self.this, receiver, asset, amount, payload)
    }

    pub fn invoke(&mut self, aggregator: &Address, request: &InvokeRequest) -> FlashResult<InvokeReceipt> {
        aggregator::invoke(self.rt, aggregator, &self.this, request)
    }
}
