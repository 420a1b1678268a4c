//! Error Types for flashvault
//!
//! Every failure aborts the whole operation it occurred in. The runtime
//! rolls back all transfers and share mutations before the error reaches
//! the caller, so an `Err` always means "nothing happened".

use thiserror::Error;

use crate::types::{Address, Asset};

/// Result type alias for flashvault operations
pub type FlashResult<T> = Result<T, FlashError>;

/// Main error enum for all engine errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlashError {
    // ============ Routing Errors ============
    /// Routing could not cover the request during an invoke
    #[error("insufficient liquidity: requested {requested}, routable {available}")]
    InsufficientLiquidity { requested: u64, available: u64 },

    /// Requested amount exceeds total liquidity (estimate view)
    #[error("not enough liquidity: requested {requested}, total {available}")]
    NotEnoughLiquidity { requested: u64, available: u64 },

    /// Asset has no registered adapters
    #[error("no liquidity registered for asset {asset:?}")]
    NoLiquidityForToken { asset: Asset },

    // ============ Settlement Errors ============
    /// Repayment was not exactly principal + reward
    #[error("incorrect ending balance: expected {expected}, actual {actual}")]
    IncorrectEndingBalance { expected: u64, actual: u64 },

    // ============ Guard Errors ============
    /// A session is already in flight on this pool or aggregator
    #[error("not a fresh environment: session already in flight")]
    NotFreshEnvironment,

    /// Target of an invoke is the aggregator itself
    #[error("aggregator cannot invoke itself")]
    CannotInvokeSelf,

    /// Lender callback received outside of a session
    #[error("unexpected lender callback")]
    UnexpectedCallback,

    /// Lender callback carried the wrong step identifier or lender
    #[error("invalid aggregation step")]
    InvalidStep,

    /// Borrower callback is already running further up the stack
    #[error("borrower {target:?} is already executing a callback")]
    CallbackInProgress { target: Address },

    // ============ Pool Errors ============
    /// Holder owns fewer shares than requested
    #[error("insufficient shares: held {held}, requested {requested}")]
    InsufficientShares { held: u64, requested: u64 },

    /// Pool has no outstanding shares
    #[error("pool has no share supply")]
    NoSupply,

    /// Request exceeds the pool's reserve
    #[error("insufficient reserve: available {available}, requested {requested}")]
    InsufficientReserve { available: u64, requested: u64 },

    /// Pool is paused
    #[error("pool is paused")]
    PoolPaused,

    // ============ Amount Errors ============
    /// Zero amount not allowed
    #[error("zero amount not allowed")]
    ZeroAmount,

    /// Invalid amount provided
    #[error("invalid amount {amount}: {reason:?}")]
    InvalidAmount { amount: u64, reason: AmountErrorReason },

    /// Transfer source lacks funds
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: u64, requested: u64 },

    // ============ Authorization Errors ============
    /// Caller is not the owner of the administered component
    #[error("unauthorized: expected {expected:?}, got {actual:?}")]
    Unauthorized { expected: Address, actual: Address },

    // ============ Lookup Errors ============
    /// No reserve pool at the address
    #[error("reserve pool not found")]
    PoolNotFound { pool: Address },

    /// No aggregator at the address
    #[error("aggregator not found")]
    AggregatorNotFound { aggregator: Address },

    /// No adapter registered for the asset at that backend
    #[error("adapter not found")]
    AdapterNotFound { asset: Asset, backend: Address },

    /// Adapter or pool is bound to a different asset
    #[error("asset mismatch: expected {expected:?}, got {actual:?}")]
    AssetMismatch { expected: Asset, actual: Asset },

    /// Callback target has no registered borrower
    #[error("unknown callback target")]
    UnknownTarget { target: Address },

    // ============ Math Errors ============
    /// Arithmetic overflow occurred
    #[error("arithmetic overflow")]
    Overflow,

    /// Arithmetic underflow occurred
    #[error("arithmetic underflow")]
    Underflow,

    /// Division by zero
    #[error("division by zero")]
    DivisionByZero,

    // ============ Configuration Errors ============
    /// Fee rate above the accepted maximum
    #[error("invalid fee: {bips} bips exceeds maximum {maximum}")]
    InvalidFee { bips: u64, maximum: u64 },

    /// Invalid address (e.g., zero address)
    #[error("invalid address: {reason}")]
    InvalidAddress { reason: &'static str },

    /// Encoded action could not be decoded
    #[error("invalid witness data")]
    InvalidWitness,
}

/// Reasons for amount-related errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountErrorReason {
    /// Amount is zero when non-zero required
    Zero,
    /// Amount exceeds maximum
    TooLarge,
    /// Amount too small to have an effect (e.g. mints zero shares)
    TooSmall,
}

impl FlashError {
    /// Returns a stable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientLiquidity { .. } => "E001_INSUFFICIENT_LIQUIDITY",
            Self::NotEnoughLiquidity { .. } => "E002_NOT_ENOUGH_LIQUIDITY",
            Self::NoLiquidityForToken { .. } => "E003_NO_LIQUIDITY_FOR_TOKEN",
            Self::IncorrectEndingBalance { .. } => "E010_INCORRECT_ENDING_BALANCE",
            Self::NotFreshEnvironment => "E020_NOT_FRESH_ENVIRONMENT",
            Self::CannotInvokeSelf => "E021_CANNOT_INVOKE_SELF",
            Self::UnexpectedCallback => "E022_UNEXPECTED_CALLBACK",
            Self::InvalidStep => "E023_INVALID_STEP",
            Self::CallbackInProgress { .. } => "E024_CALLBACK_IN_PROGRESS",
            Self::InsufficientShares { .. } => "E030_INSUFFICIENT_SHARES",
            Self::NoSupply => "E031_NO_SUPPLY",
            Self::InsufficientReserve { .. } => "E032_INSUFFICIENT_RESERVE",
            Self::PoolPaused => "E033_POOL_PAUSED",
            Self::ZeroAmount => "E040_ZERO_AMOUNT",
            Self::InvalidAmount { .. } => "E041_INVALID_AMOUNT",
            Self::InsufficientBalance { .. } => "E042_INSUFFICIENT_BALANCE",
            Self::Unauthorized { .. } => "E050_UNAUTHORIZED",
            Self::PoolNotFound { .. } => "E060_POOL_NOT_FOUND",
            Self::AggregatorNotFound { .. } => "E061_AGGREGATOR_NOT_FOUND",
            Self::AdapterNotFound { .. } => "E062_ADAPTER_NOT_FOUND",
            Self::AssetMismatch { .. } => "E063_ASSET_MISMATCH",
            Self::UnknownTarget { .. } => "E064_UNKNOWN_TARGET",
            Self::Overflow => "E080_OVERFLOW",
            Self::Underflow => "E081_UNDERFLOW",
            Self::DivisionByZero => "E082_DIV_ZERO",
            Self::InvalidFee { .. } => "E090_INVALID_FEE",
            Self::InvalidAddress { .. } => "E091_INVALID_ADDRESS",
            Self::InvalidWitness => "E092_INVALID_WITNESS",
        }
    }

    /// Returns true if a fresh call with different inputs can succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InsufficientLiquidity { .. } => true, // Borrow less
            Self::NotEnoughLiquidity { .. } => true,
            Self::InsufficientBalance { .. } => true,   // Get more funds
            Self::IncorrectEndingBalance { .. } => true, // Repay exactly
            Self::PoolPaused => true,                    // Wait for unpause
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_error_codes_unique() {
        let errors = [
            FlashError::InsufficientLiquidity { requested: 1, available: 0 },
            FlashError::NotEnoughLiquidity { requested: 1, available: 0 },
            FlashError::NoLiquidityForToken { asset: Asset::Native },
            FlashError::IncorrectEndingBalance { expected: 1, actual: 2 },
            FlashError::NotFreshEnvironment,
            FlashError::CannotInvokeSelf,
            FlashError::InsufficientShares { held: 0, requested: 1 },
            FlashError::NoSupply,
            FlashError::InsufficientReserve { available: 0, requested: 1 },
            FlashError::ZeroAmount,
            FlashError::Overflow,
        ];

        let codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        let unique: BTreeSet<_> = codes.iter().collect();
        assert_eq!(codes.len(), unique.len(), "Error codes must be unique");
    }

    #[test]
    fn test_display_carries_amounts() {
        let err = FlashError::IncorrectEndingBalance { expected: 1_005, actual: 1_004 };
        assert_eq!(err.to_string(), "incorrect ending balance: expected 1005, actual 1004");
        assert!(err.is_recoverable());
        assert!(!FlashError::NotFreshEnvironment.is_recoverable());
    }
}
