pub mod config;
pub mod config_loader;
pub mod error;
pub mod events;
pub mod market_hours;
pub mod position;
pub mod position_sizing;
pub mod traits;

pub use config::{AppConfig, BrokerConfig, RuntimeConfig, StrategyConfig};
pub use config_loader::ConfigLoader;
pub use error::EngineError;
pub use events::{Bar, ExecutionReport, ExitReason, Intent, OrderEvent, OrderSide, Side};
pub use market_hours::{next_session_open, trading_date, SessionWindow};
pub use position::Position;
pub use position_sizing::{calculate_position_size, SizingParams};
pub use traits::{ExecutionHandler, MarketDataSource};
