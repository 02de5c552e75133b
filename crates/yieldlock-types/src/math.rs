//! Fixed-point helpers shared by the fee engine and the reward ledgers.
//!
//! Amounts are `u128`. Reward-per-share values carry an extra [`SCALE`] factor, so the
//! intermediate products in `rate * elapsed * SCALE` and `shares * delta_rps` need more than
//! 128 bits. [`mul_div`] computes `a * b / denominator` through a 256-bit intermediate.

use crate::{Amount, ProtocolError, Result};

/// Fixed-point scale for reward-per-share accumulators.
pub const SCALE: u128 = 1_000_000_000_000_000_000;

/// Basis-point denominator for every fee in the protocol.
pub const FEE_DENOMINATOR: u128 = 10_000;

/// Full 256-bit product of two u128 values as `(hi, lo)`.
fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = u64::MAX as u128;
    let (a_lo, a_hi) = (a & MASK, a >> 64);
    let (b_lo, b_hi) = (b & MASK, b >> 64);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    let mid = (ll >> 64) + (lh & MASK) + (hl & MASK);
    let lo = (ll & MASK) | (mid << 64);
    let hi = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    (hi, lo)
}

/// `a * b / denominator`, rounded down. `None` on a zero denominator or when the quotient
/// does not fit in 128 bits.
pub fn mul_div(a: u128, b: u128, denominator: u128) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    if let Some(product) = a.checked_mul(b) {
        return Some(product / denominator);
    }

    let (hi, lo) = widening_mul(a, b);
    if hi >= denominator {
        return None;
    }

    // Restoring long division; `rem < denominator` holds at the top of every step.
    let mut rem = hi;
    let mut quotient: u128 = 0;
    for bit in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> bit) & 1);
        quotient <<= 1;
        if carry == 1 || rem >= denominator {
            rem = rem.wrapping_sub(denominator);
            quotient |= 1;
        }
    }
    Some(quotient)
}

/// [`mul_div`] that reports overflow as a protocol error.
pub fn checked_mul_div(a: u128, b: u128, denominator: u128) -> Result<u128> {
    mul_div(a, b, denominator).ok_or(ProtocolError::MathOverflow)
}

/// `amount * bps / FEE_DENOMINATOR`.
pub fn bps_of(amount: Amount, bps: u32) -> Result<Amount> {
    checked_mul_div(amount, bps as u128, FEE_DENOMINATOR)
}

pub fn checked_add(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_add(b).ok_or(ProtocolError::MathOverflow)
}

pub fn checked_sub(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_sub(b).ok_or(ProtocolError::MathOverflow)
}
