//! Reentrancy Guard
//!
//! Single-flight state machine held by every component that hands control
//! to untrusted code mid-operation.
//!
//! ```text
//! Idle --enter--> Drawing --begin_verification--> Verifying --release--> Idle
//! ```
//!
//! Idle is both the initial and the terminal phase. A failed operation never
//! calls `release`: the runtime restores the component's pre-operation state,
//! which carries the guard back to Idle along with everything else.

use log::trace;

use crate::errors::{FlashError, FlashResult};

/// Phase of an in-flight flash session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuardPhase {
    #[default]
    Idle,
    /// Funds are out with the callback target
    Drawing,
    /// Callback returned, repayment under inspection
    Verifying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReentrancyGuard {
    phase: GuardPhase,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> GuardPhase {
        self.phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase == GuardPhase::Idle
    }

    /// Fails with `NotFreshEnvironment` unless no session is in flight
    pub fn ensure_idle(&self) -> FlashResult<()> {
        if self.is_idle() {
            Ok(())
        } else {
            Err(FlashError::NotFreshEnvironment)
        }
    }

    /// Idle -> Drawing
    pub fn enter(&mut self) -> FlashResult<()> {
        self.ensure_idle()?;
        trace!("guard: Idle -> Drawing");
        self.phase = GuardPhase::Drawing;
        Ok(())
    }

    /// Drawing -> Verifying
    pub fn begin_verification(&mut self) -> FlashResult<()> {
        if self.phase != GuardPhase::Drawing {
            return Err(FlashError::NotFreshEnvironment);
        }
        trace!("guard: Drawing -> Verifying");
        self.phase = GuardPhase::Verifying;
        Ok(())
    }

    /// Verifying -> Idle (settled)
    pub fn release(&mut self) {
        trace!("guard: {:?} -> Idle", self.phase);
        self.phase = GuardPhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cycle() {
        let mut guard = ReentrancyGuard::new();
        assert!(guard.is_idle());

        guard.enter().unwrap();
        assert_eq!(guard.phase(), GuardPhase::Drawing);

        guard.begin_verification().unwrap();
        assert_eq!(guard.phase(), GuardPhase::Verifying);

        guard.release();
        assert!(guard.is_idle());
    }

    #[test]
    fn test_nested_enter_rejected() {
        let mut guard = ReentrancyGuard::new();
        guard.enter().unwrap();
        assert_eq!(guard.enter(), Err(FlashError::NotFreshEnvironment));
        assert_eq!(guard.ensure_idle(), Err(FlashError::NotFreshEnvironment));

        guard.begin_verification().unwrap();
        assert_eq!(guard.enter(), Err(FlashError::NotFreshEnvironment));
    }

    #[test]
    fn test_verification_requires_drawing() {
        let mut guard = ReentrancyGuard::new();
        assert_eq!(guard.begin_verification(), Err(FlashError::NotFreshEnvironment));
    }
}
