//! Protocol Constants
//!
//! All magic numbers and default configuration values for flashvault.
//!
//! # Network Configuration
//!
//! Use feature flags to compile for different networks:
//! - `mainnet` - Production fee defaults
//! - Default (no feature) - Testnet fee defaults (cheaper loans for testing)
//!
//! ```toml
//! # For mainnet deployment:
//! flashvault-common = { path = "...", features = ["mainnet"] }
//! ```

/// Fee Configuration (in basis points, 100 = 1%)
pub mod fees {
    /// Basis points denominator
    pub const BPS_DENOMINATOR: u64 = 10_000;

    /// Upper bound accepted for any single fee rate (10%)
    pub const MAX_FEE_BIPS: u64 = 1_000;

    /// Default platform cut charged by a reserve pool
    /// - Mainnet: 0.05%
    /// - Testnet: 0.02%
    #[cfg(feature = "mainnet")]
    pub const DEFAULT_PLATFORM_FEE_BIPS: u64 = 5;
    #[cfg(not(feature = "mainnet"))]
    pub const DEFAULT_PLATFORM_FEE_BIPS: u64 = 2;

    /// Default pool cut kept by a reserve pool for its share holders
    /// - Mainnet: 0.06%
    /// - Testnet: 0.03%
    #[cfg(feature = "mainnet")]
    pub const DEFAULT_POOL_FEE_BIPS: u64 = 6;
    #[cfg(not(feature = "mainnet"))]
    pub const DEFAULT_POOL_FEE_BIPS: u64 = 3;

    /// Default aggregator platform cut over the aggregate principal
    #[cfg(feature = "mainnet")]
    pub const DEFAULT_AGGREGATOR_FEE_BIPS: u64 = 6;
    #[cfg(not(feature = "mainnet"))]
    pub const DEFAULT_AGGREGATOR_FEE_BIPS: u64 = 0;

    /// Default premium of an external lending pool (0.09%, Aave v2 style)
    pub const DEFAULT_LENDING_PREMIUM_BIPS: u64 = 9;
}

/// Operational limits
pub mod limits {
    /// Maximum adapters registered per asset on one aggregator
    pub const MAX_ADAPTERS_PER_ASSET: usize = 16;
}

/// Domain separators for hashing
pub mod domains {
    /// Address derivation for reserve pools
    pub const RESERVE_POOL: &[u8] = b"flashvault/reserve-pool/v1";

    /// Address derivation for external lending pools
    pub const LENDING_POOL: &[u8] = b"flashvault/lending-pool/v1";

    /// Address derivation for aggregators
    pub const AGGREGATOR: &[u8] = b"flashvault/aggregator/v1";

    /// Step identifiers handed to lenders during an aggregation session
    pub const AGGREGATION_STEP: &[u8] = b"flashvault/aggregation-step/v1";
}
