use thiserror::Error;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Network error while requesting a quote: {0}")]
    Network(#[from] reqwest::Error),

    #[error("The oracle rejected the request due to rate limiting: {0}")]
    RateLimited(String),

    #[error("The oracle reported an error: {0}")]
    Api(String),

    #[error("Failed to deserialize the oracle response: {0}")]
    Deserialization(String),

    #[error("The oracle response did not contain a price for {0}")]
    MissingPrice(String),

    #[error("Symbol format '{0}' is not supported for pricing")]
    UnsupportedSymbol(String),
}

impl OracleError {
    /// True when the failure was caused by provider rate limiting. Callers
    /// keep this distinction in their logs for backoff tuning even though it
    /// surfaces to end users as plain unavailability.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, OracleError::RateLimited(_))
    }
}
