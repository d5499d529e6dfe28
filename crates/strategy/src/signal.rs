use crate::indicators::{BandReading, GapReading};
use gapfade_core::{ExitReason, Position, Side, StrategyConfig};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-tick evaluation result. At most one per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    NoSignal,
    EnterLong,
    EnterShort,
    ExitToVwap,
    ExitToMean,
    ExitStopLoss,
}

impl Signal {
    #[must_use]
    pub const fn entry_side(self) -> Option<Side> {
        match self {
            Self::EnterLong => Some(Side::Long),
            Self::EnterShort => Some(Side::Short),
            _ => None,
        }
    }

    #[must_use]
    pub const fn exit_reason(self) -> Option<ExitReason> {
        match self {
            Self::ExitStopLoss => Some(ExitReason::StopLoss),
            Self::ExitToMean => Some(ExitReason::MeanReversion),
            Self::ExitToVwap => Some(ExitReason::VwapReversion),
            _ => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoSignal => "no_signal",
            Self::EnterLong => "enter_long",
            Self::EnterShort => "enter_short",
            Self::ExitToVwap => "exit_to_vwap",
            Self::ExitToMean => "exit_to_mean",
            Self::ExitStopLoss => "exit_stop_loss",
        };
        f.write_str(s)
    }
}

/// Gap-fade entry and exit rules.
///
/// Entry fades a large overnight gap once price stretches beyond the band
/// in the gap's direction. Exits are checked in priority order: stop, mean,
/// VWAP.
#[derive(Debug, Clone)]
pub struct GapFadeSignals {
    gap_threshold: Decimal,
    use_mean_exit: bool,
    use_vwap_exit: bool,
}

impl GapFadeSignals {
    #[must_use]
    pub fn new(gap_threshold: Decimal, use_mean_exit: bool, use_vwap_exit: bool) -> Self {
        Self {
            gap_threshold,
            use_mean_exit,
            use_vwap_exit,
        }
    }

    #[must_use]
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self::new(config.gap_threshold, config.use_mean_exit, config.use_vwap_exit)
    }

    /// Gap down and price at or below the lower band: long.
    /// Gap up and price at or above the upper band: short.
    #[must_use]
    pub fn entry(&self, price: Decimal, gap: &GapReading, band: &BandReading) -> Signal {
        let Some(band) = band.ready() else {
            return Signal::NoSignal;
        };

        let long = gap.gap_pct <= -self.gap_threshold && price <= band.lower;
        let short = gap.gap_pct >= self.gap_threshold && price >= band.upper;

        match (long, short) {
            (true, false) => {
                tracing::info!(
                    price = %price,
                    lower = %band.lower,
                    gap_pct = %gap.gap_pct,
                    "Gap-down fade signal"
                );
                Signal::EnterLong
            }
            (false, true) => {
                tracing::info!(
                    price = %price,
                    upper = %band.upper,
                    gap_pct = %gap.gap_pct,
                    "Gap-up fade signal"
                );
                Signal::EnterShort
            }
            (true, true) => {
                tracing::warn!(
                    price = %price,
                    gap_pct = %gap.gap_pct,
                    upper = %band.upper,
                    lower = %band.lower,
                    "Long and short entry both matched; skipping"
                );
                Signal::NoSignal
            }
            (false, false) => Signal::NoSignal,
        }
    }

    /// First matching exit for the open position.
    #[must_use]
    pub fn exit(
        &self,
        price: Decimal,
        position: &Position,
        band: &BandReading,
        vwap: Option<Decimal>,
    ) -> Signal {
        if position.stop_hit(price) {
            tracing::warn!(
                side = %position.side,
                price = %price,
                stop = %position.stop_price,
                "Stop loss hit"
            );
            return Signal::ExitStopLoss;
        }

        if self.use_mean_exit {
            if let Some(band) = band.ready() {
                if position.reached(price, band.mean) {
                    tracing::info!(price = %price, mean = %band.mean, "Price reverted to band mean");
                    return Signal::ExitToMean;
                }
            }
        }

        if self.use_vwap_exit {
            if let Some(vwap) = vwap {
                if position.reached(price, vwap) {
                    tracing::info!(price = %price, vwap = %vwap, "Price reverted to VWAP");
                    return Signal::ExitToVwap;
                }
            }
        }

        Signal::NoSignal
    }
}
