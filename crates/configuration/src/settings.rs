use rust_decimal::Decimal;
use serde::Deserialize;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub oracle: OracleConfig,
    pub trading: TradingConfig,
}

/// Connection parameters for the external price oracle (Alpha Vantage).
#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// The base URL of the quote endpoint, e.g. "https://www.alphavantage.co".
    pub base_url: String,
    /// The API key issued by the provider.
    pub api_key: String,
    /// Per-request timeout in seconds. A quote that takes longer than this
    /// is treated as unavailable.
    pub timeout_secs: u64,
}

/// Parameters governing account provisioning and order settlement.
#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// The cash balance a newly created account starts with.
    pub starting_cash: Decimal,
}
