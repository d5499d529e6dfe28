use crate::client::AlpacaClient;
use crate::types::{Account, ClosePositionResult, OrderRequest, OrderResponse};
use anyhow::Result;
use async_trait::async_trait;
use gapfade_core::{ExecutionHandler, ExecutionReport, OrderEvent};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Submits market orders to the Alpaca trading API.
pub struct AlpacaExecutionHandler {
    client: Arc<AlpacaClient>,
}

impl AlpacaExecutionHandler {
    #[must_use]
    pub const fn new(client: Arc<AlpacaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExecutionHandler for AlpacaExecutionHandler {
    async fn account_equity(&self) -> Result<Decimal> {
        let account: Account = self.client.get_trading("/v2/account", &[]).await?;
        Ok(account.equity)
    }

    async fn submit_order(&mut self, order: OrderEvent) -> Result<ExecutionReport> {
        let request = OrderRequest::market(&order);
        let response: OrderResponse = self.client.post_trading("/v2/orders", &request).await?;
        Ok(order_report(&order, response))
    }

    async fn close_all_positions(&mut self) -> Result<ExecutionReport> {
        let results: Vec<ClosePositionResult> = self
            .client
            .delete_trading("/v2/positions", &[("cancel_orders", "true".to_string())])
            .await?;
        Ok(close_all_report(&results))
    }
}

fn order_report(order: &OrderEvent, response: OrderResponse) -> ExecutionReport {
    if response.is_dead() {
        tracing::error!(
            order_id = %response.id,
            status = %response.status,
            symbol = %order.symbol,
            "Order not accepted"
        );
        return ExecutionReport::Rejected {
            reason: format!("order {} {}", response.id, response.status),
        };
    }
    tracing::info!(
        order_id = %response.id,
        status = %response.status,
        symbol = %order.symbol,
        side = %order.side,
        qty = %order.quantity,
        "Order submitted"
    );
    ExecutionReport::Filled {
        order_id: response.id,
        avg_price: response.filled_avg_price,
    }
}

fn close_all_report(results: &[ClosePositionResult]) -> ExecutionReport {
    let failed: Vec<String> = results
        .iter()
        .filter(|r| !r.is_success())
        .map(|r| format!("{} ({}): {}", r.symbol, r.status, r.body))
        .collect();
    if !failed.is_empty() {
        return ExecutionReport::Rejected {
            reason: format!("close failed for {}", failed.join(", ")),
        };
    }

    let order_ids: Vec<&str> = results
        .iter()
        .filter_map(|r| r.body.get("id").and_then(serde_json::Value::as_str))
        .collect();
    tracing::info!(positions = results.len(), "All positions closed");
    ExecutionReport::Filled {
        order_id: order_ids.join(","),
        avg_price: None,
    }
}
