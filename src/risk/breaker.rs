//! Circuit breaker safety controls: daily loss limit, max drawdown from the
//! high-water mark, and manual emergency stop.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};

use super::RiskError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    Open,
    Tripped,
}

/// Point-in-time breaker report for health surfaces.
#[derive(Clone, Debug, Serialize)]
pub struct CircuitBreakerStatus {
    pub state: CircuitState,
    pub trip_reason: Option<String>,
    pub trip_time: Option<DateTime<Utc>>,
    pub day: NaiveDate,
    pub day_start_equity: Decimal,
    pub daily_pnl: Decimal,
    pub high_water_mark: Decimal,
    pub drawdown_pct: Decimal,
}

/// Emergency stop mechanism. Updated with current equity (cash +
/// mark-to-market) once per tick and after executions. Once tripped, no
/// equity update re-opens it — reset is manual only.
pub struct CircuitBreaker {
    daily_loss_limit: Decimal,
    max_drawdown_pct: Decimal,

    state: CircuitState,
    trip_reason: Option<String>,
    trip_time: Option<DateTime<Utc>>,

    day: NaiveDate,
    day_start_equity: Decimal,
    daily_pnl: Decimal,
    high_water_mark: Decimal,
}

impl CircuitBreaker {
    pub fn new(
        daily_loss_limit: Decimal,
        max_drawdown_pct: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Self, RiskError> {
        if daily_loss_limit < Decimal::ZERO {
            return Err(RiskError::InvalidConfig("daily_loss_limit must be >= 0"));
        }
        if max_drawdown_pct < Decimal::ZERO || max_drawdown_pct > Decimal::ONE {
            return Err(RiskError::InvalidConfig("max_drawdown_pct must be in [0, 1]"));
        }
        Ok(Self {
            daily_loss_limit,
            max_drawdown_pct,
            state: CircuitState::Open,
            trip_reason: None,
            trip_time: None,
            day: now.date_naive(),
            day_start_equity: Decimal::ZERO,
            daily_pnl: Decimal::ZERO,
            high_water_mark: Decimal::ZERO,
        })
    }

    /// Set the starting equity baseline and high-water mark.
    pub fn initialize(
        &mut self,
        starting_equity: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), RiskError> {
        if starting_equity < Decimal::ZERO {
            return Err(RiskError::InvalidInput("starting_equity must be >= 0"));
        }
        self.day = now.date_naive();
        self.day_start_equity = starting_equity;
        self.daily_pnl = Decimal::ZERO;
        self.high_water_mark = starting_equity;
        info!(starting_equity = %starting_equity, day = %self.day, "circuit breaker baseline set");
        Ok(())
    }

    /// Whether new risk-taking is allowed, with the trip reason when not.
    pub fn can_trade(&self) -> (bool, Option<&str>) {
        match self.state {
            CircuitState::Tripped => (false, self.trip_reason.as_deref()),
            CircuitState::Open => (true, None),
        }
    }

    /// Manually trip the breaker.
    pub fn emergency_stop(&mut self, reason: &str, now: DateTime<Utc>) {
        self.trip(reason.to_string(), now);
    }

    /// Manually re-open after a trip.
    pub fn reset(&mut self) {
        self.state = CircuitState::Open;
        self.trip_reason = None;
        self.trip_time = None;
        warn!("circuit breaker reset");
    }

    /// Update breaker state from current equity.
    ///
    /// A UTC date change resets the daily baseline. The high-water mark only
    /// ratchets up. Limits are enforced once; further updates on a tripped
    /// breaker only refresh the PnL bookkeeping.
    pub fn update(&mut self, current_equity: Decimal, now: DateTime<Utc>) {
        if current_equity < Decimal::ZERO {
            // Equity should not be negative; log loudly rather than tripping
            // on corrupt input.
            error!(equity = %current_equity, "breaker update with negative equity");
            return;
        }

        let today = now.date_naive();
        if today != self.day {
            self.day = today;
            self.day_start_equity = current_equity;
            self.daily_pnl = Decimal::ZERO;
            info!(day = %self.day, equity = %current_equity, "breaker day reset");
        }

        if current_equity > self.high_water_mark {
            self.high_water_mark = current_equity;
        }

        self.daily_pnl = current_equity - self.day_start_equity;
        let drawdown_pct = if self.high_water_mark > Decimal::ZERO {
            (self.high_water_mark - current_equity) / self.high_water_mark
        } else {
            Decimal::ZERO
        };

        if self.state == CircuitState::Tripped {
            return;
        }

        if self.daily_pnl < -self.daily_loss_limit {
            let reason = format!("Daily loss limit exceeded: {:.2}", self.daily_pnl);
            self.trip(reason, now);
            return;
        }
        if drawdown_pct > self.max_drawdown_pct {
            let reason = format!("Max drawdown exceeded: {:.1}%", drawdown_pct * Decimal::ONE_HUNDRED);
            self.trip(reason, now);
        }
    }

    pub fn daily_pnl(&self) -> Decimal {
        self.daily_pnl
    }

    pub fn status(&self) -> CircuitBreakerStatus {
        let current_equity = self.day_start_equity + self.daily_pnl;
        let drawdown_pct = if self.high_water_mark > Decimal::ZERO {
            (self.high_water_mark - current_equity) / self.high_water_mark
        } else {
            Decimal::ZERO
        };
        CircuitBreakerStatus {
            state: self.state,
            trip_reason: self.trip_reason.clone(),
            trip_time: self.trip_time,
            day: self.day,
            day_start_equity: self.day_start_equity,
            daily_pnl: self.daily_pnl,
            high_water_mark: self.high_water_mark,
            drawdown_pct,
        }
    }

    fn trip(&mut self, reason: String, now: DateTime<Utc>) {
        self.state = CircuitState::Tripped;
        error!(reason = %reason, "CIRCUIT BREAKER TRIPPED");
        self.trip_reason = Some(reason);
        self.trip_time = Some(now);
    }
}
