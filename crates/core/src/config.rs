use crate::error::EngineError;
use crate::position_sizing::SizingParams;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl AppConfig {
    /// Validates every section.
    ///
    /// # Errors
    /// Returns `Configuration` describing the first invalid value.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.strategy.validate()?;
        self.broker.validate()?;
        self.runtime.validate()
    }
}

/// Strategy parameters. Defaults match the production deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub symbol: String,
    pub max_trades_per_day: u32,
    /// Fraction of equity risked per trade.
    pub risk_pct: Decimal,
    /// Minimum absolute overnight gap, as a fraction (0.005 = 0.5%).
    pub gap_threshold: Decimal,
    pub band_lookback: usize,
    pub band_mult: Decimal,
    pub entry_window_minutes: u32,
    pub stop_pct: Decimal,
    pub use_vwap_exit: bool,
    pub use_mean_exit: bool,
    /// Cap on position notional as a fraction of equity.
    ///
    /// Defaults to 10%, which binds before the risk formula at tight stops:
    /// with $100k equity and a 1% stop at 98.4 the formula alone gives 1016
    /// shares, the default cap 101. Set to `None` for the bare formula.
    pub max_position_pct: Option<Decimal>,
    pub fractional: bool,
    /// Minutes before the close at which open positions are flattened.
    pub flatten_buffer_minutes: u32,
    pub dry_run: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            symbol: "SPY".to_string(),
            max_trades_per_day: 5,
            risk_pct: Decimal::new(1, 2),
            gap_threshold: Decimal::new(5, 3),
            band_lookback: 20,
            band_mult: Decimal::TWO,
            entry_window_minutes: 30,
            stop_pct: Decimal::new(1, 2),
            use_vwap_exit: true,
            use_mean_exit: false,
            max_position_pct: Some(Decimal::new(10, 2)),
            fractional: false,
            flatten_buffer_minutes: 5,
            dry_run: false,
        }
    }
}

impl StrategyConfig {
    #[must_use]
    pub fn sizing(&self) -> SizingParams {
        SizingParams {
            risk_pct: self.risk_pct,
            stop_pct: self.stop_pct,
            max_position_pct: self.max_position_pct,
            fractional: self.fractional,
        }
    }

    /// # Errors
    /// Returns `Configuration` describing the first invalid value.
    pub fn validate(&self) -> Result<(), EngineError> {
        let unit = Decimal::ZERO..=Decimal::ONE;

        if self.symbol.trim().is_empty() {
            return Err(invalid("symbol must not be empty"));
        }
        if self.max_trades_per_day == 0 {
            return Err(invalid("max_trades_per_day must be at least 1"));
        }
        if self.risk_pct <= Decimal::ZERO || !unit.contains(&self.risk_pct) {
            return Err(invalid(format!("risk_pct must be in (0, 1], got {}", self.risk_pct)));
        }
        if self.gap_threshold <= Decimal::ZERO || self.gap_threshold >= Decimal::ONE {
            return Err(invalid(format!(
                "gap_threshold must be in (0, 1), got {}",
                self.gap_threshold
            )));
        }
        // Sample standard deviation needs at least two observations.
        if self.band_lookback < 2 {
            return Err(invalid(format!(
                "band_lookback must be at least 2, got {}",
                self.band_lookback
            )));
        }
        if self.band_mult <= Decimal::ZERO {
            return Err(invalid(format!("band_mult must be positive, got {}", self.band_mult)));
        }
        if self.entry_window_minutes == 0 {
            return Err(invalid("entry_window_minutes must be at least 1"));
        }
        if self.stop_pct <= Decimal::ZERO || self.stop_pct >= Decimal::ONE {
            return Err(invalid(format!("stop_pct must be in (0, 1), got {}", self.stop_pct)));
        }
        if let Some(max_pct) = self.max_position_pct {
            if max_pct <= Decimal::ZERO || !unit.contains(&max_pct) {
                return Err(invalid(format!(
                    "max_position_pct must be in (0, 1], got {max_pct}"
                )));
            }
        }
        if self.entry_window_minutes + self.flatten_buffer_minutes >= REGULAR_SESSION_MINUTES {
            return Err(invalid(
                "entry_window_minutes + flatten_buffer_minutes must fit inside the session",
            ));
        }
        Ok(())
    }
}

const REGULAR_SESSION_MINUTES: u32 = 390;

/// Brokerage and market-data endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub trading_url: String,
    pub data_url: String,
    /// Market-data feed; free and paper accounts only get "iex".
    pub feed: String,
    pub paper: bool,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    #[serde(skip_serializing)]
    pub api_secret: Option<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            trading_url: "https://paper-api.alpaca.markets".to_string(),
            data_url: "https://data.alpaca.markets".to_string(),
            feed: "iex".to_string(),
            paper: true,
            api_key: None,
            api_secret: None,
        }
    }
}

impl BrokerConfig {
    /// # Errors
    /// Returns `Configuration` for live mode, missing credentials or URLs.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.paper {
            return Err(invalid(
                "live trading is disabled in this version; set broker.paper = true",
            ));
        }
        if self.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(invalid(
                "API key not found; set ALPACA_KEY (or APCA_API_KEY_ID)",
            ));
        }
        if self.api_secret.as_deref().map_or(true, str::is_empty) {
            return Err(invalid(
                "API secret not found; set ALPACA_SECRET (or APCA_API_SECRET_KEY)",
            ));
        }
        if self.trading_url.is_empty() || self.data_url.is_empty() {
            return Err(invalid("trading_url and data_url must be set"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub poll_interval_secs: u64,
    /// Close every open position when the process is asked to stop.
    pub flatten_on_shutdown: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            flatten_on_shutdown: true,
        }
    }
}

impl RuntimeConfig {
    /// # Errors
    /// Returns `Configuration` if the poll interval is zero.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.poll_interval_secs == 0 {
            return Err(invalid("poll_interval_secs must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> EngineError {
    EngineError::Configuration(msg.into())
}
