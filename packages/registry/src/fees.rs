//! Fee computation
//!
//! Fees are expressed in basis points of the gross amount. Division truncates
//! toward zero, so `net + fee == gross` holds exactly for every split.

use crate::error::RegistryError;

/// Basis point denominator (10000 bps = 100%).
pub const BPS_DENOMINATOR: u128 = 10_000;

/// The gross/fee/net decomposition of one transfer amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    pub gross: u128,
    pub fee: u128,
    pub net: u128,
}

/// Compute the fee for a gross amount at the given rate.
pub fn fee_for(gross: u128, fee_rate_bps: u32) -> Result<u128, RegistryError> {
    gross
        .checked_mul(fee_rate_bps as u128)
        .map(|scaled| scaled / BPS_DENOMINATOR)
        .ok_or(RegistryError::AmountOverflow)
}

/// Split a gross amount into fee and net portions.
pub fn split(gross: u128, fee_rate_bps: u32) -> Result<FeeSplit, RegistryError> {
    let fee = fee_for(gross, fee_rate_bps)?;
    Ok(FeeSplit {
        gross,
        fee,
        net: gross - fee,
    })
}
