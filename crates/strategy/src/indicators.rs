//! Gap, volatility band and session VWAP.
//!
//! All three read the current session's bars only. The band uses the sample
//! standard deviation (N−1 divisor) and is explicitly not-ready until
//! `lookback` closes exist.

use chrono::{DateTime, Utc};
use gapfade_core::{Bar, EngineError};
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};

/// Overnight gap, computed once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapReading {
    pub prior_close: Decimal,
    pub today_open: Decimal,
    /// `(open − prior_close) / prior_close`; negative means gap down.
    pub gap_pct: Decimal,
}

impl GapReading {
    /// Gap from the first session bar's open.
    ///
    /// # Errors
    /// `InsufficientData` if the prior close is missing or non-positive, or no
    /// session bar exists yet.
    pub fn compute(prior_close: Option<Decimal>, bars: &[Bar]) -> Result<Self, EngineError> {
        let today_open = bars
            .first()
            .map(|bar| bar.open)
            .ok_or_else(|| EngineError::InsufficientData("no session bars yet".into()))?;
        Self::from_prices(prior_close, today_open)
    }

    /// # Errors
    /// `InsufficientData` if the prior close is missing or non-positive.
    pub fn from_prices(prior_close: Option<Decimal>, today_open: Decimal) -> Result<Self, EngineError> {
        let prior_close = prior_close
            .ok_or_else(|| EngineError::InsufficientData("prior close unavailable".into()))?;
        if prior_close <= Decimal::ZERO {
            return Err(EngineError::InsufficientData(format!(
                "prior close must be positive, got {prior_close}"
            )));
        }
        Ok(Self {
            prior_close,
            today_open,
            gap_pct: (today_open - prior_close) / prior_close,
        })
    }
}

/// Rolling mean ± k·σ over the last `lookback` closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    pub mean: Decimal,
    pub std_dev: Decimal,
    pub upper: Decimal,
    pub lower: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BandReading {
    NotReady { available: usize, required: usize },
    Ready(Band),
}

impl BandReading {
    #[must_use]
    pub const fn ready(&self) -> Option<&Band> {
        match self {
            Self::Ready(band) => Some(band),
            Self::NotReady { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Band over the most recent `lookback` closes in `bars`.
#[must_use]
pub fn compute_band(bars: &[Bar], lookback: usize, mult: Decimal) -> BandReading {
    let not_ready = BandReading::NotReady {
        available: bars.len(),
        required: lookback.max(2),
    };
    if lookback < 2 || bars.len() < lookback {
        return not_ready;
    }

    let window = &bars[bars.len() - lookback..];
    let n = Decimal::from(lookback);
    let mean = window.iter().map(|b| b.close).sum::<Decimal>() / n;
    let sum_sq: Decimal = window
        .iter()
        .map(|b| {
            let d = b.close - mean;
            d * d
        })
        .sum();
    let variance = sum_sq / (n - Decimal::ONE);
    let Some(std_dev) = variance.sqrt() else {
        return not_ready;
    };

    BandReading::Ready(Band {
        mean,
        std_dev,
        upper: mean + mult * std_dev,
        lower: mean - mult * std_dev,
    })
}

/// Session VWAP accumulated bar by bar.
///
/// Keeps Σ(price·volume) and Σ(volume) rather than a running ratio. Rebuilds
/// from scratch when the supplied history no longer extends what was seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VwapAccumulator {
    price_volume: Decimal,
    volume: Decimal,
    bars_seen: usize,
    last_timestamp: Option<DateTime<Utc>>,
}

impl VwapAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds in bars not yet seen.
    pub fn update(&mut self, bars: &[Bar]) {
        if !self.extends(bars) {
            tracing::debug!(
                seen = self.bars_seen,
                supplied = bars.len(),
                "Bar history changed, rebuilding VWAP"
            );
            *self = Self::default();
        }
        for bar in &bars[self.bars_seen..] {
            self.price_volume += bar.volume_weighted_price() * bar.volume;
            self.volume += bar.volume;
        }
        self.bars_seen = bars.len();
        self.last_timestamp = bars.last().map(|b| b.timestamp);
    }

    /// `None` until some volume has traded.
    #[must_use]
    pub fn value(&self) -> Option<Decimal> {
        if self.volume.is_zero() {
            None
        } else {
            Some(self.price_volume / self.volume)
        }
    }

    #[must_use]
    pub const fn bars_seen(&self) -> usize {
        self.bars_seen
    }

    fn extends(&self, bars: &[Bar]) -> bool {
        if bars.len() < self.bars_seen {
            return false;
        }
        match (self.bars_seen, self.last_timestamp) {
            (0, _) => true,
            (n, Some(ts)) => bars[n - 1].timestamp == ts,
            (_, None) => false,
        }
    }
}
