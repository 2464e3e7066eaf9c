//! Linear bonding curve pricing
//!
//! Spot price is `initial_price + slope * s` where `s` is the token's
//! virtual supply. Buys and sells integrate the price over the supply
//! they move, then the factory fee is taken from the native side.

use rust_decimal::prelude::*;
use rust_decimal::MathematicalOps;
use serde::{Deserialize, Serialize};

use crate::types::TradeSide;

const BPS: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BondingCurve {
    /// Price of the first token, in native currency
    #[serde(default = "default_initial_price")]
    pub initial_price: Decimal,
    /// Price increase per token of virtual supply
    #[serde(default = "default_slope")]
    pub slope: Decimal,
    /// Factory fee in basis points, charged on the native amount
    #[serde(default = "default_fee_bps")]
    pub fee_bps: u32,
}

impl Default for BondingCurve {
    fn default() -> Self {
        Self {
            initial_price: default_initial_price(),
            slope: default_slope(),
            fee_bps: default_fee_bps(),
        }
    }
}

fn default_initial_price() -> Decimal { Decimal::new(1, 5) } // 0.00001
fn default_slope() -> Decimal { Decimal::new(1, 10) }
fn default_fee_bps() -> u32 { 100 }

impl BondingCurve {
    pub fn spot_price(&self, supply: Decimal) -> Decimal {
        self.initial_price + self.slope * supply
    }

    fn fee_multiplier(&self) -> Decimal {
        Decimal::from(BPS.saturating_sub(self.fee_bps.min(BPS))) / Decimal::from(BPS)
    }

    /// Gross native cost of moving supply from `supply` to `supply + tokens`
    pub fn buy_cost(&self, supply: Decimal, tokens: Decimal) -> Decimal {
        self.initial_price * tokens + self.slope * (supply * tokens + tokens * tokens / Decimal::TWO)
    }

    /// Tokens received for spending `native_amount`, fee included.
    ///
    /// Solves `slope/2 * t^2 + spot * t = net` for `t`.
    pub fn tokens_for_native(&self, supply: Decimal, native_amount: Decimal) -> Option<Decimal> {
        if native_amount <= Decimal::ZERO {
            return Some(Decimal::ZERO);
        }
        let net = native_amount.checked_mul(self.fee_multiplier())?;
        let spot = self.spot_price(supply);

        if self.slope.is_zero() {
            if spot.is_zero() {
                return None;
            }
            return net.checked_div(spot);
        }

        let discriminant = spot.checked_mul(spot)? + Decimal::TWO.checked_mul(self.slope)?.checked_mul(net)?;
        let root = discriminant.sqrt()?;
        (root - spot).checked_div(self.slope)
    }

    /// Native received for selling `tokens`, fee deducted.
    /// `None` when selling more than the virtual supply.
    pub fn sell_proceeds(&self, supply: Decimal, tokens: Decimal) -> Option<Decimal> {
        if tokens > supply || tokens < Decimal::ZERO {
            return None;
        }
        let gross = self.initial_price * tokens + self.slope * (supply * tokens - tokens * tokens / Decimal::TWO);
        gross.checked_mul(self.fee_multiplier())
    }

    /// Local estimate matching the shape of an on-chain quote:
    /// tokens out for a buy, native out for a sell.
    pub fn estimate(&self, side: TradeSide, supply: Decimal, amount: Decimal) -> Option<Decimal> {
        match side {
            TradeSide::Buy => self.tokens_for_native(supply, amount),
            TradeSide::Sell => self.sell_proceeds(supply, amount),
        }
    }
}

/// Relative deviation between two quotes in basis points
pub fn deviation_bps(local: Decimal, quoted: Decimal) -> Decimal {
    if quoted.is_zero() {
        return if local.is_zero() { Decimal::ZERO } else { Decimal::MAX };
    }
    ((local - quoted).abs() / quoted.abs()) * Decimal::from(BPS)
}

/// Accept the on-chain quote only if it agrees with the local estimate
/// within `tolerance_bps`. Returns the measured deviation on rejection.
pub fn verify_quote(local: Decimal, quoted: Decimal, tolerance_bps: u32) -> Result<(), Decimal> {
    let deviation = deviation_bps(local, quoted);
    if deviation > Decimal::from(tolerance_bps) {
        Err(deviation)
    } else {
        Ok(())
    }
}

/// Minimum acceptable output after slippage
pub fn apply_slippage(expected_out: Decimal, slippage_bps: u32) -> Decimal {
    let keep = Decimal::from(BPS.saturating_sub(slippage_bps.min(BPS))) / Decimal::from(BPS);
    expected_out * keep
}
