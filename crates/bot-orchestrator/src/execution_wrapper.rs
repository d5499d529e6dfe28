use anyhow::Result;
use async_trait::async_trait;
use gapfade_alpaca::{AlpacaClient, AlpacaExecutionHandler, DryRunExecutionHandler};
use gapfade_core::{ExecutionHandler, ExecutionReport, OrderEvent};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Execution handler chosen at startup from `strategy.dry_run`.
///
/// Each variant wraps a concrete handler, so the runner stays generic over
/// one type whichever mode is configured.
///
/// # Safety
///
/// The `DryRun` variant physically cannot submit orders; it only reads
/// account equity through the wrapped live handler.
pub enum ExecutionMode {
    /// Orders go to the broker (paper account).
    Live(Box<AlpacaExecutionHandler>),
    /// Orders are logged and acknowledged locally.
    DryRun(DryRunExecutionHandler<AlpacaExecutionHandler>),
}

impl ExecutionMode {
    #[must_use]
    pub fn new(client: Arc<AlpacaClient>, dry_run: bool) -> Self {
        let live = AlpacaExecutionHandler::new(client);
        if dry_run {
            Self::DryRun(DryRunExecutionHandler::new(live))
        } else {
            Self::Live(Box::new(live))
        }
    }

    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        matches!(self, Self::DryRun(_))
    }
}

#[async_trait]
impl ExecutionHandler for ExecutionMode {
    async fn account_equity(&self) -> Result<Decimal> {
        match self {
            Self::Live(handler) => handler.account_equity().await,
            Self::DryRun(handler) => handler.account_equity().await,
        }
    }

    async fn submit_order(&mut self, order: OrderEvent) -> Result<ExecutionReport> {
        match self {
            Self::Live(handler) => handler.submit_order(order).await,
            Self::DryRun(handler) => handler.submit_order(order).await,
        }
    }

    async fn close_all_positions(&mut self) -> Result<ExecutionReport> {
        match self {
            Self::Live(handler) => handler.close_all_positions().await,
            Self::DryRun(handler) => handler.close_all_positions().await,
        }
    }
}
