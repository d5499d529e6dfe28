use anyhow::Result;
use async_trait::async_trait;
use gapfade_core::{ExecutionHandler, ExecutionReport, OrderEvent};
use rust_decimal::Decimal;

/// Execution handler that never sends orders.
///
/// Account equity is still read from the wrapped handler so sizing matches
/// live mode. Orders and flattens are logged and acknowledged with
/// [`ExecutionReport::DryRun`].
///
/// # Safety
///
/// `submit_order` and `close_all_positions` make **zero API calls**.
pub struct DryRunExecutionHandler<E> {
    inner: E,
}

impl<E: ExecutionHandler> DryRunExecutionHandler<E> {
    #[must_use]
    pub const fn new(inner: E) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<E: ExecutionHandler> ExecutionHandler for DryRunExecutionHandler<E> {
    async fn account_equity(&self) -> Result<Decimal> {
        self.inner.account_equity().await
    }

    async fn submit_order(&mut self, order: OrderEvent) -> Result<ExecutionReport> {
        tracing::info!(
            symbol = %order.symbol,
            side = %order.side,
            qty = %order.quantity,
            reference_price = ?order.reference_price,
            "[DRY RUN] Would submit market order"
        );
        Ok(ExecutionReport::DryRun)
    }

    async fn close_all_positions(&mut self) -> Result<ExecutionReport> {
        tracing::info!("[DRY RUN] Would close all positions");
        Ok(ExecutionReport::DryRun)
    }
}
