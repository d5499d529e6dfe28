pub mod execution_wrapper;
pub mod runner;

pub use execution_wrapper::ExecutionMode;
pub use runner::SessionRunner;

use anyhow::Result;
use chrono::Utc;
use gapfade_alpaca::{AlpacaClient, AlpacaMarketData};
use gapfade_core::AppConfig;
use std::sync::Arc;

/// Runner wired to Alpaca for data and execution.
///
/// # Errors
/// Fails on invalid configuration or if the HTTP client cannot be built.
pub fn alpaca_runner(config: &AppConfig) -> Result<SessionRunner<AlpacaMarketData, ExecutionMode>> {
    let client = Arc::new(AlpacaClient::new(&config.broker)?);
    let data = AlpacaMarketData::new(Arc::clone(&client));
    let execution = ExecutionMode::new(client, config.strategy.dry_run);
    if execution.is_dry_run() {
        tracing::warn!("Dry-run mode: orders will be logged, not submitted");
    }
    SessionRunner::new(config, data, execution, Utc::now())
}
