//! Release arithmetic.
//!
//! Kept free of ledger access: the caller passes the raised total at the
//! instant of verification and the escrow balance it may draw from.

use crate::Error;

/// Amount released for a milestone worth `percentage` of `funds_raised`.
///
/// Floors toward zero: `10_001 * 30 / 100 == 3_000`. Fails when the result is
/// zero or exceeds `available`.
pub fn compute_release(funds_raised: i128, percentage: u32, available: i128) -> Result<i128, Error> {
    let release = funds_raised
        .checked_mul(i128::from(percentage))
        .ok_or(Error::ArithmeticOverflow)?
        / 100;

    if release <= 0 {
        return Err(Error::NothingToRelease);
    }
    if release > available {
        return Err(Error::InsufficientBalance);
    }
    Ok(release)
}
