use crate::error::ConfigError;
use crate::settings::Config;
use rust_decimal::Decimal;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use settings::{OracleConfig, TradingConfig};

/// Loads the application configuration from the `config.toml` file.
///
/// This function is the primary entry point for this crate. It reads the configuration file,
/// deserializes it into our strongly-typed `Config` struct, and returns it.
pub fn load_config() -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        // Tells the builder to look for a file named `config.toml`
        .add_source(config::File::with_name("config.toml"))
        // Secrets such as the oracle API key may be overridden from the
        // environment, e.g. TRADESIM_ORACLE__API_KEY.
        .add_source(config::Environment::with_prefix("TRADESIM").separator("__"))
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.trading.starting_cash < Decimal::ZERO {
        return Err(ConfigError::ValidationError(
            "trading.starting_cash must not be negative".to_string(),
        ));
    }
    if config.oracle.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "oracle.timeout_secs must be at least 1".to_string(),
        ));
    }
    Ok(())
}
