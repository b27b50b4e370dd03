use serde::Deserialize;

// Alpha Vantage reports soft failures (rate limits, bad keys) as 200 OK
// bodies with a "Note"/"Information"/"Error Message" field instead of the
// requested payload, so every envelope carries those alongside the data.

/// The response envelope of a `GLOBAL_QUOTE` request (stock prices).
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalQuoteEnvelope {
    #[serde(rename = "Global Quote")]
    pub global_quote: Option<GlobalQuote>,
    #[serde(rename = "Note")]
    pub note: Option<String>,
    #[serde(rename = "Information")]
    pub information: Option<String>,
    #[serde(rename = "Error Message")]
    pub error_message: Option<String>,
}

/// The quote body of a `GLOBAL_QUOTE` response. Prices arrive as strings.
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalQuote {
    #[serde(rename = "01. symbol")]
    pub symbol: Option<String>,
    #[serde(rename = "05. price")]
    pub price: Option<String>,
}

/// The response envelope of a `CURRENCY_EXCHANGE_RATE` request (crypto
/// quoted against USD).
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeRateEnvelope {
    #[serde(rename = "Realtime Currency Exchange Rate")]
    pub exchange_rate: Option<ExchangeRate>,
    #[serde(rename = "Note")]
    pub note: Option<String>,
    #[serde(rename = "Information")]
    pub information: Option<String>,
    #[serde(rename = "Error Message")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeRate {
    #[serde(rename = "1. From_Currency Code")]
    pub from_currency: Option<String>,
    #[serde(rename = "5. Exchange Rate")]
    pub rate: Option<String>,
}
