use crate::error::ValuationError;
use ledger::LedgerStore;
use oracle_client::PriceOracle;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Percentage return of a position, with the degenerate cases made explicit.
///
/// A zero-cost basis has no well-defined percentage return, so those cases
/// are sentinels rather than numbers; no arithmetic is possible on them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PnlPercent {
    Value(Decimal),
    /// Zero cost and zero profit: the ratio is meaningless.
    NotApplicable,
    /// Zero cost, positive profit.
    PlusInfinity,
    /// Zero cost, negative profit.
    MinusInfinity,
    /// No current price, so no profit figure to take a ratio of.
    Unavailable,
}

impl PnlPercent {
    fn from_parts(profit_loss: Decimal, cost: Decimal) -> Self {
        if cost.is_zero() {
            if profit_loss.is_zero() {
                PnlPercent::NotApplicable
            } else if profit_loss > Decimal::ZERO {
                PnlPercent::PlusInfinity
            } else {
                PnlPercent::MinusInfinity
            }
        } else {
            PnlPercent::Value(round_display(profit_loss / cost * Decimal::ONE_HUNDRED))
        }
    }
}

impl fmt::Display for PnlPercent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PnlPercent::Value(pct) => write!(f, "{pct}"),
            PnlPercent::NotApplicable | PnlPercent::Unavailable => f.write_str("N/A"),
            PnlPercent::PlusInfinity => f.write_str("+Inf"),
            PnlPercent::MinusInfinity => f.write_str("-Inf"),
        }
    }
}

impl Serialize for PnlPercent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The valued state of one holding. Monetary figures are display values,
/// rounded to two fractional digits half-up; `None` means the oracle could
/// not price the asset right now.
#[derive(Debug, Clone, Serialize)]
pub struct HoldingReport {
    pub asset_id: Uuid,
    pub symbol: String,
    pub name: String,
    pub quantity: Decimal,
    pub average_cost: Decimal,
    pub current_price: Option<Decimal>,
    pub holding_cost: Decimal,
    pub current_value: Option<Decimal>,
    pub profit_loss: Option<Decimal>,
    pub profit_loss_percent: PnlPercent,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSummary {
    /// Market value of the holdings the oracle could price.
    pub total_value: Decimal,
    /// Cost basis of all holdings, priced or not.
    pub total_cost: Decimal,
    pub overall_profit_loss: Decimal,
    pub overall_profit_loss_percent: PnlPercent,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioReport {
    pub cash_balance: Decimal,
    pub holdings: Vec<HoldingReport>,
    pub summary: PortfolioSummary,
}

fn round_display(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Computes valued portfolio reports from the ledger and the price oracle.
///
/// Valuation is a pure read: it takes a snapshot of the holdings, never
/// mutates ledger state, and never takes the settlement lock.
pub struct PortfolioValuator {
    store: Arc<dyn LedgerStore>,
    oracle: Arc<dyn PriceOracle>,
}

impl PortfolioValuator {
    pub fn new(store: Arc<dyn LedgerStore>, oracle: Arc<dyn PriceOracle>) -> Self {
        Self { store, oracle }
    }

    /// Values every holding of the account at current oracle prices.
    ///
    /// A holding the oracle cannot price still contributes its cost to the
    /// aggregate; its market-value fields are reported as unavailable
    /// instead of failing the whole report.
    pub async fn value_portfolio(
        &self,
        account_id: Uuid,
    ) -> Result<PortfolioReport, ValuationError> {
        let account = self.store.account(account_id).await?;
        let holdings = self.store.holdings(account_id).await?;

        let mut rows = Vec::with_capacity(holdings.len());
        let mut total_value = Decimal::ZERO;
        let mut total_cost = Decimal::ZERO;

        for holding in holdings {
            if holding.quantity <= Decimal::ZERO {
                // Settlement deletes emptied holdings, so this indicates a
                // corrupted row. Tolerate it rather than failing the report.
                tracing::warn!(
                    %account_id,
                    asset_id = %holding.asset_id,
                    quantity = %holding.quantity,
                    "Skipping holding with non-positive quantity."
                );
                continue;
            }

            let Some(asset) = self.store.asset_by_id(holding.asset_id).await? else {
                tracing::error!(
                    %account_id,
                    asset_id = %holding.asset_id,
                    "Holding references an unknown asset; skipping."
                );
                continue;
            };

            let holding_cost = holding.average_cost * holding.quantity;
            total_cost += holding_cost;

            let price = match self.oracle.quote(&asset.symbol, asset.asset_type).await {
                Ok(price) if price > Decimal::ZERO => Some(price),
                Ok(price) => {
                    tracing::warn!(symbol = %asset.symbol, %price, "Oracle returned a non-positive price; treating as unavailable.");
                    None
                }
                Err(e) if e.is_rate_limited() => {
                    tracing::warn!(symbol = %asset.symbol, error = %e, "Oracle rate limit hit during valuation.");
                    None
                }
                Err(e) => {
                    tracing::warn!(symbol = %asset.symbol, error = %e, "Could not price holding for valuation.");
                    None
                }
            };

            let (current_value, profit_loss, percent) = match price {
                Some(price) => {
                    let current_value = price * holding.quantity;
                    total_value += current_value;
                    let profit_loss = current_value - holding_cost;
                    (
                        Some(round_display(current_value)),
                        Some(round_display(profit_loss)),
                        PnlPercent::from_parts(profit_loss, holding_cost),
                    )
                }
                None => (None, None, PnlPercent::Unavailable),
            };

            rows.push(HoldingReport {
                asset_id: asset.asset_id,
                symbol: asset.symbol,
                name: asset.name,
                quantity: holding.quantity,
                average_cost: round_display(holding.average_cost),
                current_price: price.map(round_display),
                holding_cost: round_display(holding_cost),
                current_value,
                profit_loss,
                profit_loss_percent: percent,
            });
        }

        let overall_profit_loss = total_value - total_cost;
        let summary = PortfolioSummary {
            total_value: round_display(total_value),
            total_cost: round_display(total_cost),
            overall_profit_loss: round_display(overall_profit_loss),
            overall_profit_loss_percent: PnlPercent::from_parts(overall_profit_loss, total_cost),
        };

        Ok(PortfolioReport {
            cash_balance: round_display(account.cash_balance),
            holdings: rows,
            summary,
        })
    }
}
