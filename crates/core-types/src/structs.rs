use crate::enums::{AssetType, OrderSide};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A simulated trading account. The cash balance is the single source of
/// truth for buying power and is mutated only by order settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub account_id: Uuid,
    /// Never negative. Stored with full decimal precision; rounded to
    /// two fractional digits only for display.
    pub cash_balance: Decimal,
}

/// Immutable reference data describing a tradable instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub asset_id: Uuid,
    /// Uppercase ticker, e.g. "AAPL" or "BTCUSD".
    pub symbol: String,
    pub name: String,
    pub asset_type: AssetType,
}

/// An account's current position in one asset.
///
/// A holding row exists only while its quantity is strictly positive; it is
/// created on the first buy and deleted by the sell that brings the quantity
/// to exactly zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Holding {
    pub account_id: Uuid,
    pub asset_id: Uuid,
    pub quantity: Decimal,
    /// Quantity-weighted average purchase price. Recomputed on every buy,
    /// left untouched by sells.
    pub average_cost: Decimal,
}

/// An immutable record of one settled order. Append-only: trades are never
/// updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: Uuid,
    pub account_id: Uuid,
    pub asset_id: Uuid,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price_at_execution: Decimal,
    pub executed_at: DateTime<Utc>,
}

/// The raw order input as received from the caller (e.g. the HTTP layer).
///
/// `order_type` and `quantity` are kept as strings on purpose: validating
/// them is the first responsibility of the execution engine, and each has
/// its own distinct failure mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub order_type: String,
    pub quantity: String,
}
