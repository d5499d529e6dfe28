use crate::events::{Bar, ExecutionReport, OrderEvent};
use crate::market_hours::SessionWindow;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

/// Market data needed once per tick. Implementations own their retries.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Trading session on `date`, `None` when the market is closed that day.
    ///
    /// Sources without an exchange calendar get the regular weekday session.
    async fn session_window(&self, date: NaiveDate) -> Result<Option<SessionWindow>> {
        Ok(SessionWindow::regular(date))
    }

    /// Close of the regular session before `session_date`.
    async fn prior_close(&self, symbol: &str, session_date: NaiveDate) -> Result<Option<Decimal>>;

    /// Bars of the current session up to `now`, oldest first.
    async fn session_bars(
        &self,
        symbol: &str,
        window: &SessionWindow,
        now: DateTime<Utc>,
    ) -> Result<Vec<Bar>>;

    async fn latest_price(&self, symbol: &str) -> Result<Option<Decimal>>;
}

/// Carries intents out at the broker.
#[async_trait]
pub trait ExecutionHandler: Send + Sync {
    async fn account_equity(&self) -> Result<Decimal>;

    async fn submit_order(&mut self, order: OrderEvent) -> Result<ExecutionReport>;

    /// Cancel open orders and close every position.
    async fn close_all_positions(&mut self) -> Result<ExecutionReport>;
}
