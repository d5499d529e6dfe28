pub mod client;
pub mod data_provider;
pub mod dry_run;
pub mod execution;
pub mod types;

pub use client::AlpacaClient;
pub use data_provider::AlpacaMarketData;
pub use dry_run::DryRunExecutionHandler;
pub use execution::AlpacaExecutionHandler;
