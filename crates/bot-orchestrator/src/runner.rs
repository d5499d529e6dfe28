//! Polling loop: gather inputs, run one engine tick, carry out the intent,
//! report the outcome back. Ticks never overlap and shutdown is only
//! observed between them.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use gapfade_core::{
    next_session_open, trading_date, AppConfig, ExecutionHandler, ExecutionReport,
    MarketDataSource, OrderEvent, RuntimeConfig, SessionWindow,
};
use gapfade_strategy::{PendingIntent, Session, SessionEngine, SessionState, TickInput, TickRecord};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub struct SessionRunner<D, E> {
    engine: SessionEngine,
    data: D,
    execution: E,
    runtime: RuntimeConfig,
    session: Session,
    prior_close: Option<(NaiveDate, Decimal)>,
    window: Option<(NaiveDate, Option<SessionWindow>)>,
}

impl<D: MarketDataSource, E: ExecutionHandler> SessionRunner<D, E> {
    /// # Errors
    /// Fails if the strategy configuration is invalid.
    pub fn new(config: &AppConfig, data: D, execution: E, now: DateTime<Utc>) -> Result<Self> {
        let engine = SessionEngine::new(config.strategy.clone())
            .context("invalid strategy configuration")?;
        let session = engine.start_session(now);
        Ok(Self {
            engine,
            data,
            execution,
            runtime: config.runtime.clone(),
            session,
            prior_close: None,
            window: None,
        })
    }

    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub const fn execution(&self) -> &E {
        &self.execution
    }

    /// Runs until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// # Errors
    /// Propagates tick-protocol violations, which indicate a bug.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let config = self.engine.config();
        info!(
            symbol = %config.symbol,
            poll_secs = self.runtime.poll_interval_secs,
            max_trades = config.max_trades_per_day,
            gap_threshold = %config.gap_threshold,
            stop_pct = %config.stop_pct,
            dry_run = config.dry_run,
            "Gap fade runner started"
        );
        let now = Utc::now();
        let window = self.session_window(trading_date(now)).await;
        if !window.is_some_and(|w| w.is_open(now)) {
            if let Some(open) = next_session_open(now) {
                info!(next_open = %open, "Market closed, waiting for the next session");
            }
        }

        let mut interval = tokio::time::interval(Duration::from_secs(self.runtime.poll_interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            self.tick(Utc::now()).await?;

            if *shutdown.borrow() {
                break;
            }
        }

        info!("Shutdown requested");
        self.shutdown().await;
        Ok(())
    }

    /// One full tick at `now`.
    ///
    /// Data failures are logged and the tick proceeds without that input so
    /// time-driven transitions still happen.
    ///
    /// # Errors
    /// Only on tick-protocol violations.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<TickRecord> {
        let symbol = self.engine.config().symbol.clone();
        let window = self.session_window(trading_date(now)).await;
        let market_open = window.is_some_and(|w| w.is_open(now));

        let bars = match window {
            Some(w) if market_open => self
                .data
                .session_bars(&symbol, &w, now)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Failed to fetch session bars");
                    Vec::new()
                }),
            _ => Vec::new(),
        };

        let price = if market_open {
            match self.data.latest_price(&symbol).await {
                Ok(Some(p)) => Some(p),
                Ok(None) => bars.last().map(|b| b.close),
                Err(e) => {
                    warn!(error = %e, "Failed to fetch latest price, using last close");
                    bars.last().map(|b| b.close)
                }
            }
        } else {
            None
        };

        let state = self.session.state();
        let prior_close = if market_open && state == SessionState::Idle {
            self.prior_close(&symbol, trading_date(now)).await
        } else {
            None
        };

        let equity = if market_open && matches!(state, SessionState::Idle | SessionState::Armed) {
            self.execution
                .account_equity()
                .await
                .map_err(|e| warn!(error = %e, "Failed to fetch account equity"))
                .ok()
        } else {
            None
        };

        let input = TickInput {
            now,
            window,
            price,
            bars: &bars,
            prior_close,
            equity,
        };
        let step = self.engine.on_tick(&self.session, &input)?;
        step.record.log();
        self.session = step.session;

        if let Some(pending) = self.session.pending().cloned() {
            let report = self.execute(&symbol, pending, now).await;
            self.session = self.engine.on_report(&self.session, &report, now)?;
        }

        Ok(step.record)
    }

    async fn execute(
        &mut self,
        symbol: &str,
        pending: PendingIntent,
        now: DateTime<Utc>,
    ) -> ExecutionReport {
        let result = match pending {
            PendingIntent::Entry {
                side,
                quantity,
                reference_price,
            } => {
                let order = OrderEvent {
                    symbol: symbol.to_string(),
                    side: side.entry_order(),
                    quantity,
                    reference_price: Some(reference_price),
                    timestamp: now,
                };
                self.execution.submit_order(order).await
            }
            PendingIntent::Exit { reason } => match self.session.position() {
                Some(position) => {
                    debug!(reason = %reason, "Submitting exit order");
                    let order = OrderEvent {
                        symbol: symbol.to_string(),
                        side: position.side.exit_order(),
                        quantity: position.quantity,
                        reference_price: None,
                        timestamp: now,
                    };
                    self.execution.submit_order(order).await
                }
                None => self.execution.close_all_positions().await,
            },
            PendingIntent::Flatten => self.execution.close_all_positions().await,
        };

        result.unwrap_or_else(|e| {
            error!(error = %e, "Execution failed");
            ExecutionReport::Rejected {
                reason: format!("{e:#}"),
            }
        })
    }

    async fn prior_close(&mut self, symbol: &str, date: NaiveDate) -> Option<Decimal> {
        if let Some((cached_date, close)) = self.prior_close {
            if cached_date == date {
                return Some(close);
            }
        }
        match self.data.prior_close(symbol, date).await {
            Ok(Some(close)) => {
                self.prior_close = Some((date, close));
                Some(close)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to fetch prior close");
                None
            }
        }
    }

    /// Calendar window for `date`, cached once the source answers. On a
    /// calendar failure the regular session is used and the lookup is retried
    /// next tick.
    async fn session_window(&mut self, date: NaiveDate) -> Option<SessionWindow> {
        if let Some((cached_date, window)) = self.window {
            if cached_date == date {
                return window;
            }
        }
        match self.data.session_window(date).await {
            Ok(window) => {
                self.window = Some((date, window));
                window
            }
            Err(e) => {
                warn!(error = %e, %date, "Failed to fetch session calendar, assuming regular hours");
                SessionWindow::regular(date)
            }
        }
    }

    async fn shutdown(&mut self) {
        if !self.runtime.flatten_on_shutdown {
            return;
        }
        info!("Closing all positions before exit");
        match self.execution.close_all_positions().await {
            Ok(report) if report.is_acknowledged() => info!("Positions closed"),
            Ok(report) => error!(?report, "Failed to close positions on shutdown"),
            Err(e) => error!(error = %e, "Failed to close positions on shutdown"),
        }
    }
}
