use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One OHLCV bar. Session history is ordered oldest-first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    /// Per-bar VWAP when the data provider supplies one.
    #[serde(default)]
    pub vwap: Option<Decimal>,
}

impl Bar {
    /// (high + low + close) / 3
    #[must_use]
    pub fn typical_price(&self) -> Decimal {
        (self.high + self.low + self.close) / Decimal::from(3)
    }

    /// Price used when accumulating session VWAP.
    #[must_use]
    pub fn volume_weighted_price(&self) -> Decimal {
        self.vwap.unwrap_or_else(|| self.typical_price())
    }
}

/// Direction of a position. Exit rules are written once against `sign()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    #[must_use]
    pub const fn sign(self) -> Decimal {
        match self {
            Self::Long => Decimal::ONE,
            Self::Short => Decimal::NEGATIVE_ONE,
        }
    }

    /// Order side that opens a position in this direction.
    #[must_use]
    pub const fn entry_order(self) -> OrderSide {
        match self {
            Self::Long => OrderSide::Buy,
            Self::Short => OrderSide::Sell,
        }
    }

    /// Order side that closes a position in this direction.
    #[must_use]
    pub const fn exit_order(self) -> OrderSide {
        match self {
            Self::Long => OrderSide::Sell,
            Self::Short => OrderSide::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    MeanReversion,
    VwapReversion,
    EndOfDay,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StopLoss => write!(f, "stop_loss"),
            Self::MeanReversion => write!(f, "mean_reversion"),
            Self::VwapReversion => write!(f, "vwap_reversion"),
            Self::EndOfDay => write!(f, "end_of_day"),
        }
    }
}

/// The single decision emitted per tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    NoAction,
    EnterLong { quantity: Decimal },
    EnterShort { quantity: Decimal },
    ExitPosition { reason: ExitReason },
    FlattenAll,
}

impl Intent {
    #[must_use]
    pub const fn is_entry(&self) -> bool {
        matches!(self, Self::EnterLong { .. } | Self::EnterShort { .. })
    }

    #[must_use]
    pub const fn is_no_action(&self) -> bool {
        matches!(self, Self::NoAction)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAction => write!(f, "no_action"),
            Self::EnterLong { quantity } => write!(f, "enter_long({quantity})"),
            Self::EnterShort { quantity } => write!(f, "enter_short({quantity})"),
            Self::ExitPosition { reason } => write!(f, "exit({reason})"),
            Self::FlattenAll => write!(f, "flatten_all"),
        }
    }
}

/// A market order handed to the execution collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    /// Price the decision was made at; used as the fill price when the
    /// broker does not report one.
    pub reference_price: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of carrying out an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionReport {
    /// Broker accepted the order.
    Filled {
        order_id: String,
        avg_price: Option<Decimal>,
    },
    /// Order submission suppressed by dry-run mode. Treated as acknowledged.
    DryRun,
    /// Submission failed or the broker refused the order.
    Rejected { reason: String },
}

impl ExecutionReport {
    /// True for `Filled` and `DryRun`.
    #[must_use]
    pub const fn is_acknowledged(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }

    #[must_use]
    pub fn fill_price(&self) -> Option<Decimal> {
        match self {
            Self::Filled { avg_price, .. } => *avg_price,
            Self::DryRun | Self::Rejected { .. } => None,
        }
    }
}
