use crate::client::AlpacaClient;
use crate::types::{BarsPage, CalendarDay, LatestQuote, Snapshot};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use gapfade_core::{Bar, MarketDataSource, SessionWindow};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Largest page Alpaca serves; a full session of minute bars fits in one.
const PAGE_LIMIT: u32 = 10_000;
/// Guard against a provider that keeps returning page tokens.
const MAX_PAGES: usize = 20;

/// Market data from the Alpaca data API.
pub struct AlpacaMarketData {
    client: Arc<AlpacaClient>,
}

impl AlpacaMarketData {
    #[must_use]
    pub const fn new(client: Arc<AlpacaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MarketDataSource for AlpacaMarketData {
    /// Exchange calendar from the trading API; covers holidays and early closes.
    async fn session_window(&self, date: NaiveDate) -> Result<Option<SessionWindow>> {
        let day = date.format("%Y-%m-%d").to_string();
        let days: Vec<CalendarDay> = self
            .client
            .get_trading("/v2/calendar", &[("start", day.clone()), ("end", day)])
            .await?;
        match days.into_iter().find(|d| d.date == date) {
            Some(calendar) => {
                let window = calendar.window().ok_or_else(|| {
                    anyhow!(
                        "unparseable calendar hours {}-{} for {date}",
                        calendar.open,
                        calendar.close
                    )
                })?;
                tracing::debug!(%date, open = %window.open, close = %window.close, "Session calendar");
                Ok(Some(window))
            }
            None => {
                tracing::info!(%date, "Market closed per exchange calendar");
                Ok(None)
            }
        }
    }

    async fn prior_close(&self, symbol: &str, session_date: NaiveDate) -> Result<Option<Decimal>> {
        let snapshot: Snapshot = self
            .client
            .get_data(
                &format!("/v2/stocks/{symbol}/snapshot"),
                &[("feed", self.client.feed().to_string())],
            )
            .await?;
        let close = snapshot.prior_close(session_date);
        if close.is_none() {
            tracing::warn!(symbol, %session_date, "Snapshot has no prior session bar");
        }
        Ok(close)
    }

    async fn session_bars(
        &self,
        symbol: &str,
        window: &SessionWindow,
        now: DateTime<Utc>,
    ) -> Result<Vec<Bar>> {
        let end = now.min(window.close);
        if end <= window.open {
            return Ok(Vec::new());
        }

        let endpoint = format!("/v2/stocks/{symbol}/bars");
        let mut bars = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut query = vec![
                ("timeframe", "1Min".to_string()),
                ("start", rfc3339(window.open)),
                ("end", rfc3339(end)),
                ("limit", PAGE_LIMIT.to_string()),
                ("adjustment", "raw".to_string()),
                ("feed", self.client.feed().to_string()),
            ];
            if let Some(token) = page_token.take() {
                query.push(("page_token", token));
            }

            let page: BarsPage = self.client.get_data(&endpoint, &query).await?;
            bars.extend(page.bars.unwrap_or_default().into_iter().map(Bar::from));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        bars.sort_by_key(|b| b.timestamp);
        tracing::debug!(symbol, count = bars.len(), "Fetched session bars");
        Ok(bars)
    }

    async fn latest_price(&self, symbol: &str) -> Result<Option<Decimal>> {
        let latest: LatestQuote = self
            .client
            .get_data(
                &format!("/v2/stocks/{symbol}/quotes/latest"),
                &[("feed", self.client.feed().to_string())],
            )
            .await?;
        Ok(latest.quote.mid())
    }
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
