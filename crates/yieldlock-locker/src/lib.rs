//! Locking aggregator.
//!
//! [`CrvDepositor`] takes CRV from depositors, locks it through the custodial proxy for the
//! maximum escrow duration and mints a 1:1 liquid wrapped token. Deposits that do not lock
//! immediately pay a small incentive to whoever later pushes the pending balance into the
//! escrow.

pub mod depositor;

pub use depositor::{CrvDepositor, LockerParams};
