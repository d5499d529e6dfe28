use crate::events::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The single open position. Only exists while the session is in trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub stop_price: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Opens a position with its stop `stop_pct` away from entry, against
    /// the position's direction.
    #[must_use]
    pub fn open(
        side: Side,
        entry_price: Decimal,
        quantity: Decimal,
        stop_pct: Decimal,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            side,
            entry_price,
            quantity,
            stop_price: stop_price(side, entry_price, stop_pct),
            opened_at,
        }
    }

    /// Long: price at or below stop. Short: price at or above stop.
    #[must_use]
    pub fn stop_hit(&self, price: Decimal) -> bool {
        (price - self.stop_price) * self.side.sign() <= Decimal::ZERO
    }

    /// True once price has moved back to `level` in the position's favour.
    #[must_use]
    pub fn reached(&self, price: Decimal, level: Decimal) -> bool {
        (price - level) * self.side.sign() >= Decimal::ZERO
    }

    #[must_use]
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        (price - self.entry_price) * self.quantity * self.side.sign()
    }
}

/// `entry × (1 − stop_pct)` for longs, `entry × (1 + stop_pct)` for shorts.
#[must_use]
pub fn stop_price(side: Side, entry_price: Decimal, stop_pct: Decimal) -> Decimal {
    entry_price * (Decimal::ONE - side.sign() * stop_pct)
}
