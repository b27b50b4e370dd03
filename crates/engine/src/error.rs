use ledger::LedgerError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Everything that can go wrong while placing an order. All variants are
/// recoverable at the caller; none is fatal to the process.
#[derive(Error, Debug)]
pub enum OrderError {
    #[error("Invalid quantity '{0}': must be a positive decimal number")]
    InvalidQuantity(String),

    #[error("Invalid order type '{0}'. Must be 'buy' or 'sell'.")]
    InvalidOrderType(String),

    #[error("Asset '{0}' not found")]
    AssetNotFound(String),

    #[error("Could not retrieve a current price for {0}. Order cannot be placed.")]
    PriceUnavailable(String),

    #[error("Insufficient funds: order costs {required}, cash balance is {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    #[error("Insufficient holdings to sell {requested} (currently held: {held})")]
    InsufficientHoldings { requested: Decimal, held: Decimal },

    #[error("The account was modified concurrently while the order was in flight; retry")]
    ConcurrentModification,

    #[error("The order could not be persisted: {0}")]
    Persistence(#[from] LedgerError),
}

#[derive(Error, Debug)]
pub enum ValuationError {
    #[error("Failed to read the ledger while valuing the portfolio: {0}")]
    Ledger(#[from] LedgerError),
}
