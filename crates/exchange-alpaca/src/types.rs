//! Wire types for the Alpaca v2 REST APIs.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use gapfade_core::{trading_date, Bar, OrderEvent, OrderSide, SessionWindow};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaBar {
    pub t: DateTime<Utc>,
    pub o: Decimal,
    pub h: Decimal,
    pub l: Decimal,
    pub c: Decimal,
    pub v: Decimal,
    #[serde(default)]
    pub vw: Option<Decimal>,
}

impl From<AlpacaBar> for Bar {
    fn from(bar: AlpacaBar) -> Self {
        Self {
            timestamp: bar.t,
            open: bar.o,
            high: bar.h,
            low: bar.l,
            close: bar.c,
            volume: bar.v,
            vwap: bar.vw,
        }
    }
}

/// One page of `GET /v2/stocks/{symbol}/bars`.
#[derive(Debug, Deserialize)]
pub struct BarsPage {
    /// `null` when the range has no bars.
    #[serde(default)]
    pub bars: Option<Vec<AlpacaBar>>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub daily_bar: Option<AlpacaBar>,
    #[serde(default)]
    pub prev_daily_bar: Option<AlpacaBar>,
}

impl Snapshot {
    /// Close of the last session before `session_date`.
    ///
    /// Before the open the snapshot's daily bar is still the previous
    /// session; after the open it is today's and the prior close moves to
    /// `prevDailyBar`.
    #[must_use]
    pub fn prior_close(&self, session_date: NaiveDate) -> Option<Decimal> {
        [self.daily_bar.as_ref(), self.prev_daily_bar.as_ref()]
            .into_iter()
            .flatten()
            .find(|bar| trading_date(bar.t) < session_date)
            .map(|bar| bar.c)
    }
}

#[derive(Debug, Deserialize)]
pub struct LatestQuote {
    pub quote: Quote,
}

#[derive(Debug, Deserialize)]
pub struct Quote {
    pub ap: Decimal,
    pub bp: Decimal,
}

impl Quote {
    /// Bid/ask midpoint. IEX often quotes one side as zero; the other side
    /// is used alone then.
    #[must_use]
    pub fn mid(&self) -> Option<Decimal> {
        match (self.bp > Decimal::ZERO, self.ap > Decimal::ZERO) {
            (true, true) => Some((self.ap + self.bp) / Decimal::TWO),
            (true, false) => Some(self.bp),
            (false, true) => Some(self.ap),
            (false, false) => None,
        }
    }
}

/// One day of `GET /v2/calendar`. Times are New York wall clock, "HH:MM".
#[derive(Debug, Deserialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub open: String,
    pub close: String,
}

impl CalendarDay {
    /// Regular-hours window of this day, `None` if the times don't parse.
    #[must_use]
    pub fn window(&self) -> Option<SessionWindow> {
        let open = NaiveTime::parse_from_str(&self.open, "%H:%M").ok()?;
        let close = NaiveTime::parse_from_str(&self.close, "%H:%M").ok()?;
        SessionWindow::eastern(self.date, open, close)
    }
}

#[derive(Debug, Deserialize)]
pub struct Account {
    pub equity: Decimal,
}

#[derive(Debug, Serialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub qty: String,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: &'static str,
    pub time_in_force: &'static str,
}

impl OrderRequest {
    #[must_use]
    pub fn market(order: &OrderEvent) -> Self {
        Self {
            symbol: order.symbol.clone(),
            qty: order.quantity.normalize().to_string(),
            side: order.side,
            order_type: "market",
            time_in_force: "day",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderResponse {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub filled_avg_price: Option<Decimal>,
}

impl OrderResponse {
    /// Statuses in which the order will never fill.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        matches!(self.status.as_str(), "rejected" | "canceled" | "expired")
    }
}

/// One entry of the multi-status body of `DELETE /v2/positions`.
#[derive(Debug, Deserialize)]
pub struct ClosePositionResult {
    pub symbol: String,
    pub status: u16,
    #[serde(default)]
    pub body: serde_json::Value,
}

impl ClosePositionResult {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}
