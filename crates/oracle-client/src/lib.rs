use crate::error::OracleError;
use crate::responses::{ExchangeRateEnvelope, GlobalQuoteEnvelope};
use async_trait::async_trait;
use configuration::OracleConfig;
use core_types::AssetType;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

pub mod error;
pub mod responses;

/// The generic, abstract interface to a price-quoting service.
///
/// The execution engine and the valuator depend only on this contract, so the
/// underlying implementation (live HTTP client or fixture) can be swapped out.
/// The oracle is an untrusted dependency: any call may fail, and the caller
/// must treat unavailability as a normal outcome.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Returns the current unit price for the given asset symbol.
    async fn quote(&self, symbol: &str, asset_type: AssetType) -> Result<Decimal, OracleError>;
}

/// A concrete `PriceOracle` backed by the Alpha Vantage HTTP API.
///
/// Stocks are priced through the `GLOBAL_QUOTE` endpoint; crypto assets are
/// expected to follow the `<BASE>USD` symbol convention and are priced
/// through `CURRENCY_EXCHANGE_RATE`.
#[derive(Clone)]
pub struct AlphaVantageClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AlphaVantageClient {
    pub fn new(config: &OracleConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .expect("Failed to build reqwest client"),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    async fn get_quote_payload<T: DeserializeOwned>(
        &self,
        params: &[(&str, &str)],
    ) -> Result<T, OracleError> {
        let url = format!("{}/query", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(OracleError::Api(format!(
                "quote request failed with HTTP {status}: {text}"
            )));
        }

        serde_json::from_str::<T>(&text).map_err(|e| OracleError::Deserialization(e.to_string()))
    }

    fn parse_price(symbol: &str, raw: &str) -> Result<Decimal, OracleError> {
        Decimal::from_str(raw.trim()).map_err(|_| {
            OracleError::Deserialization(format!("unparseable price '{raw}' for {symbol}"))
        })
    }

    async fn quote_stock(&self, symbol: &str) -> Result<Decimal, OracleError> {
        let payload: GlobalQuoteEnvelope = self
            .get_quote_payload(&[("function", "GLOBAL_QUOTE"), ("symbol", symbol)])
            .await?;

        check_soft_failure(payload.note, payload.information, payload.error_message)?;

        let raw = payload
            .global_quote
            .and_then(|q| q.price)
            .ok_or_else(|| OracleError::MissingPrice(symbol.to_string()))?;
        Self::parse_price(symbol, &raw)
    }

    async fn quote_crypto(&self, symbol: &str) -> Result<Decimal, OracleError> {
        // Crypto symbols are quoted as <BASE>USD currency pairs; anything
        // else cannot be mapped onto the exchange-rate endpoint.
        let base = symbol
            .strip_suffix("USD")
            .filter(|base| !base.is_empty())
            .ok_or_else(|| OracleError::UnsupportedSymbol(symbol.to_string()))?;

        let payload: ExchangeRateEnvelope = self
            .get_quote_payload(&[
                ("function", "CURRENCY_EXCHANGE_RATE"),
                ("from_currency", base),
                ("to_currency", "USD"),
            ])
            .await?;

        check_soft_failure(payload.note, payload.information, payload.error_message)?;

        let raw = payload
            .exchange_rate
            .and_then(|r| r.rate)
            .ok_or_else(|| OracleError::MissingPrice(symbol.to_string()))?;
        Self::parse_price(symbol, &raw)
    }
}

fn check_soft_failure(
    note: Option<String>,
    information: Option<String>,
    error_message: Option<String>,
) -> Result<(), OracleError> {
    // Rate limits arrive under "Note" (legacy) or "Information" (current).
    if let Some(note) = note.or(information) {
        return Err(OracleError::RateLimited(note));
    }
    if let Some(message) = error_message {
        return Err(OracleError::Api(message));
    }
    Ok(())
}

#[async_trait]
impl PriceOracle for AlphaVantageClient {
    async fn quote(&self, symbol: &str, asset_type: AssetType) -> Result<Decimal, OracleError> {
        let price = match asset_type {
            AssetType::Stock => self.quote_stock(symbol).await?,
            AssetType::Crypto => self.quote_crypto(symbol).await?,
        };
        tracing::debug!(%symbol, %price, "Fetched quote from Alpha Vantage.");
        Ok(price)
    }
}

/// A `PriceOracle` that serves a fixed price table. Symbols without an entry
/// are reported as unavailable, which makes outage paths easy to exercise.
#[derive(Debug, Clone, Default)]
pub struct StaticOracle {
    prices: HashMap<String, Decimal>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, symbol: &str, price: Decimal) -> Self {
        self.prices.insert(symbol.to_uppercase(), price);
        self
    }
}

#[async_trait]
impl PriceOracle for StaticOracle {
    async fn quote(&self, symbol: &str, _asset_type: AssetType) -> Result<Decimal, OracleError> {
        self.prices
            .get(&symbol.to_uppercase())
            .copied()
            .ok_or_else(|| OracleError::MissingPrice(symbol.to_string()))
    }
}
