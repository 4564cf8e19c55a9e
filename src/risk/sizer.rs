//! Kelly Criterion position sizing for binary markets.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use super::RiskError;

/// Estimated probability edge for a trade.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeEstimate {
    /// Estimated true probability for the outcome being traded.
    pub probability: Decimal,
    /// Confidence in the estimate, in [0, 1].
    pub confidence: Decimal,
}

impl EdgeEstimate {
    pub fn new(probability: Decimal, confidence: Decimal) -> Result<Self, RiskError> {
        if probability < Decimal::ZERO || probability > Decimal::ONE {
            return Err(RiskError::ProbabilityOutOfRange(probability));
        }
        if confidence < Decimal::ZERO || confidence > Decimal::ONE {
            return Err(RiskError::InvalidInput("confidence must be in [0, 1]"));
        }
        Ok(Self {
            probability,
            confidence,
        })
    }
}

/// Result of a sizing calculation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionSizeResult {
    /// Probability edge: true probability − market price.
    pub edge: Decimal,
    /// Full Kelly fraction before fractional/confidence scaling.
    pub kelly_full: Decimal,
    /// Final fraction after fractional Kelly, confidence, and clamping.
    pub kelly_adjusted: Decimal,
    /// Dollar amount to allocate: bankroll × kelly_adjusted.
    pub notional: Decimal,
    /// Whole contracts implied by notional / price (floor).
    pub contracts: u64,
}

/// Kelly sizer for a contract priced at P in (0, 1) paying $1.
///
/// Net-odds ratio b = (1 − P) / P, full Kelly f* = (p·b − q) / b, then
/// fractional Kelly × confidence, clamped to [0, max_position_pct].
#[derive(Clone, Debug)]
pub struct KellyPositionSizer {
    kelly_fraction: Decimal,
    max_position_pct: Decimal,
    min_edge: Decimal,
}

impl KellyPositionSizer {
    pub fn new(
        kelly_fraction: Decimal,
        max_position_pct: Decimal,
        min_edge: Decimal,
    ) -> Result<Self, RiskError> {
        if kelly_fraction <= Decimal::ZERO || kelly_fraction > Decimal::ONE {
            return Err(RiskError::InvalidConfig("kelly_fraction must be in (0, 1]"));
        }
        if max_position_pct <= Decimal::ZERO || max_position_pct > Decimal::ONE {
            return Err(RiskError::InvalidConfig("max_position_pct must be in (0, 1]"));
        }
        if min_edge < Decimal::ZERO || min_edge >= Decimal::ONE {
            return Err(RiskError::InvalidConfig("min_edge must be in [0, 1)"));
        }
        Ok(Self {
            kelly_fraction,
            max_position_pct,
            min_edge,
        })
    }

    /// Size a bet on the outcome priced at `market_price`.
    ///
    /// Returns `Ok(None)` when the trade should be skipped: edge below the
    /// minimum, non-positive full Kelly, or a size that rounds to zero
    /// contracts. Invalid inputs are errors.
    pub fn calculate_position_size(
        &self,
        bankroll: Decimal,
        market_price: Decimal,
        edge: EdgeEstimate,
    ) -> Result<Option<PositionSizeResult>, RiskError> {
        if bankroll <= Decimal::ZERO {
            return Err(RiskError::InvalidInput("bankroll must be > 0"));
        }
        if market_price <= Decimal::ZERO || market_price >= Decimal::ONE {
            return Err(RiskError::InvalidInput(
                "market_price must be between 0 and 1 (exclusive)",
            ));
        }

        let implied_edge = edge.probability - market_price;
        if implied_edge.abs() < self.min_edge {
            debug!(edge = %implied_edge, min_edge = %self.min_edge, "below min edge");
            return Ok(None);
        }

        let p = edge.probability;
        let q = Decimal::ONE - p;
        let b = (Decimal::ONE - market_price) / market_price;
        let kelly_full = (p * b - q) / b;
        if kelly_full <= Decimal::ZERO {
            debug!(kelly = %kelly_full, "non-positive full Kelly");
            return Ok(None);
        }

        let mut kelly_adjusted = kelly_full * self.kelly_fraction * edge.confidence;
        if kelly_adjusted < Decimal::ZERO {
            kelly_adjusted = Decimal::ZERO;
        }
        if kelly_adjusted > self.max_position_pct {
            kelly_adjusted = self.max_position_pct;
        }

        let notional = bankroll * kelly_adjusted;
        if notional <= Decimal::ZERO {
            return Ok(None);
        }

        let contracts = contracts_from_notional(notional, market_price)?;
        if contracts == 0 {
            return Ok(None);
        }

        Ok(Some(PositionSizeResult {
            edge: implied_edge,
            kelly_full,
            kelly_adjusted,
            notional,
            contracts,
        }))
    }
}

/// Convert a USD notional to whole contracts at `price`, flooring.
pub fn contracts_from_notional(notional: Decimal, price: Decimal) -> Result<u64, RiskError> {
    if price <= Decimal::ZERO {
        return Err(RiskError::InvalidInput("price must be > 0"));
    }
    if notional <= Decimal::ZERO {
        return Ok(0);
    }
    Ok((notional / price).floor().to_u64().unwrap_or(0))
}
