use crate::config::AppConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

/// Environment prefix for overrides, e.g. `GAPFADE_STRATEGY__STOP_PCT=0.02`.
pub const ENV_PREFIX: &str = "GAPFADE_";

const KEY_VARS: [&str; 2] = ["ALPACA_KEY", "APCA_API_KEY_ID"];
const SECRET_VARS: [&str; 2] = ["ALPACA_SECRET", "APCA_API_SECRET_KEY"];

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration by layering defaults, the TOML file at `path` (if it
    /// exists), `GAPFADE_`-prefixed environment variables and broker
    /// credentials, then validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed, a value has the wrong
    /// type, or validation fails.
    pub fn load(path: &str) -> Result<AppConfig> {
        let config = Self::figment(path)
            .extract::<AppConfig>()
            .with_context(|| format!("failed to read configuration from {path}"))?;
        let config = with_credentials(config);
        config.validate()?;
        Ok(config)
    }

    /// Same layering as [`ConfigLoader::load`] without validation, for
    /// displaying what would be used.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or a value has the wrong type.
    pub fn load_unvalidated(path: &str) -> Result<AppConfig> {
        let config = Self::figment(path)
            .extract::<AppConfig>()
            .with_context(|| format!("failed to read configuration from {path}"))?;
        Ok(with_credentials(config))
    }

    fn figment(path: &str) -> Figment {
        if std::path::Path::new(path).exists() {
            tracing::debug!(path, "Loading configuration file");
        } else {
            tracing::warn!(path, "Config file not found, using defaults and environment");
        }
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}

fn with_credentials(mut config: AppConfig) -> AppConfig {
    if config.broker.api_key.is_none() {
        config.broker.api_key = first_env(&KEY_VARS);
    }
    if config.broker.api_secret.is_none() {
        config.broker.api_secret = first_env(&SECRET_VARS);
    }
    config
}

fn first_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rust_decimal_macros::dec;

    #[test]
    fn toml_and_env_layer_over_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "Config.toml",
                r#"
                [strategy]
                symbol = "QQQ"
                max_trades_per_day = 3
                stop_pct = 0.02
                "#,
            )?;
            jail.set_env("GAPFADE_STRATEGY__MAX_TRADES_PER_DAY", "2");
            jail.set_env("GAPFADE_STRATEGY__DRY_RUN", "true");
            jail.set_env("ALPACA_KEY", "k");
            jail.set_env("ALPACA_SECRET", "s");

            let config = ConfigLoader::load("Config.toml").expect("config loads");
            assert_eq!(config.strategy.symbol, "QQQ");
            assert_eq!(config.strategy.max_trades_per_day, 2);
            assert_eq!(config.strategy.stop_pct, dec!(0.02));
            assert!(config.strategy.dry_run);
            assert_eq!(config.strategy.band_lookback, 20);
            assert_eq!(config.broker.api_key.as_deref(), Some("k"));
            Ok(())
        });
    }

    #[test]
    fn sdk_credential_names_are_accepted() {
        Jail::expect_with(|jail| {
            jail.set_env("APCA_API_KEY_ID", "sdk-key");
            jail.set_env("APCA_API_SECRET_KEY", "sdk-secret");
            let config = ConfigLoader::load("missing.toml").expect("defaults load");
            assert_eq!(config.broker.api_key.as_deref(), Some("sdk-key"));
            assert_eq!(config.broker.api_secret.as_deref(), Some("sdk-secret"));
            Ok(())
        });
    }

    #[test]
    fn invalid_values_are_fatal() {
        Jail::expect_with(|jail| {
            jail.set_env("ALPACA_KEY", "k");
            jail.set_env("ALPACA_SECRET", "s");
            jail.set_env("GAPFADE_STRATEGY__BAND_LOOKBACK", "1");
            assert!(ConfigLoader::load("missing.toml").is_err());
            Ok(())
        });
    }
}
