//! Access Control Module
//!
//! Owner-gated administration for pools and aggregators.
//!
//! ## Key Features
//!
//! - **Single owner**: every administered component carries one owner address
//! - **Uniform rejection**: non-owners get `Unauthorized { expected, actual }`
//! - **Ownership transfer**: the owner may hand control to a non-zero address

use crate::errors::{FlashError, FlashResult};
use crate::types::{Address, ZERO_ADDRESS};

/// Component with an administrative owner
pub trait Owned {
    fn owner(&self) -> Address;

    /// Fails with `Unauthorized` unless `caller` is the owner
    fn ensure_owner(&self, caller: &Address) -> FlashResult<()> {
        ensure_owner(&self.owner(), caller)
    }
}

pub fn ensure_owner(owner: &Address, caller: &Address) -> FlashResult<()> {
    if owner != caller {
        return Err(FlashError::Unauthorized {
            expected: *owner,
            actual: *caller,
        });
    }
    Ok(())
}

/// Check a proposed new owner
pub fn validate_new_owner(new_owner: &Address) -> FlashResult<()> {
    if *new_owner == ZERO_ADDRESS {
        return Err(FlashError::InvalidAddress { reason: "new owner is the zero address" });
    }
    Ok(())
}
