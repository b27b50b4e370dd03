use crate::cost_basis::{self, CostBasis};
use crate::error::OrderError;
use core_types::{OrderRequest, OrderSide, Trade};
use ledger::{HoldingChange, LedgerStore, TradeDraft};
use oracle_client::PriceOracle;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Orchestrates the settlement of market orders against the ledger.
///
/// The engine owns references to its two collaborators and nothing else;
/// it is constructed once and shared by reference. All account and holding
/// state lives in the ledger store.
pub struct ExecutionEngine {
    store: Arc<dyn LedgerStore>,
    oracle: Arc<dyn PriceOracle>,
}

impl ExecutionEngine {
    pub fn new(store: Arc<dyn LedgerStore>, oracle: Arc<dyn PriceOracle>) -> Self {
        Self { store, oracle }
    }

    /// Validates, prices, and settles one market order, returning the
    /// appended trade record.
    ///
    /// Validation failures are reported in a fixed order: quantity, order
    /// type, asset existence, price availability, then holdings (sell) or
    /// funds (buy). The oracle is consulted before the account lock is
    /// taken so a slow quote never serializes unrelated orders; the
    /// funds/holdings preconditions are re-validated against the locked
    /// ledger state, and an adverse change between the two reads fails the
    /// order with `ConcurrentModification`. Settlement itself is
    /// all-or-nothing: cash, holding, and trade are committed together or
    /// not at all.
    pub async fn place_order(
        &self,
        account_id: Uuid,
        request: &OrderRequest,
    ) -> Result<Trade, OrderError> {
        let quantity = Decimal::from_str(request.quantity.trim())
            .ok()
            .filter(|q| *q > Decimal::ZERO)
            .ok_or_else(|| OrderError::InvalidQuantity(request.quantity.clone()))?;

        let side = OrderSide::from_str(&request.order_type)
            .map_err(|_| OrderError::InvalidOrderType(request.order_type.clone()))?;

        let asset = self
            .store
            .asset_by_symbol(&request.symbol)
            .await?
            .ok_or_else(|| OrderError::AssetNotFound(request.symbol.clone()))?;

        // Advisory snapshot, read without the account lock. It decides
        // which precondition failure the caller sees; the authoritative
        // check happens again inside the settlement below.
        let account = self.store.account(account_id).await?;
        let holding = self.store.holding(account_id, asset.asset_id).await?;

        let price = match self.oracle.quote(&asset.symbol, asset.asset_type).await {
            Ok(price) if price > Decimal::ZERO => price,
            Ok(price) => {
                tracing::error!(symbol = %asset.symbol, %price, "Oracle returned a non-positive price.");
                return Err(OrderError::PriceUnavailable(asset.symbol));
            }
            Err(e) if e.is_rate_limited() => {
                tracing::warn!(symbol = %asset.symbol, error = %e, "Oracle rate limit hit while pricing order.");
                return Err(OrderError::PriceUnavailable(asset.symbol));
            }
            Err(e) => {
                tracing::error!(symbol = %asset.symbol, error = %e, "Oracle quote failed while pricing order.");
                return Err(OrderError::PriceUnavailable(asset.symbol));
            }
        };

        let gross = price * quantity;
        let held = holding.as_ref().map_or(Decimal::ZERO, |h| h.quantity);
        match side {
            OrderSide::Sell if held < quantity => {
                return Err(OrderError::InsufficientHoldings {
                    requested: quantity,
                    held,
                });
            }
            OrderSide::Buy if account.cash_balance < gross => {
                return Err(OrderError::InsufficientFunds {
                    required: gross,
                    available: account.cash_balance,
                });
            }
            _ => {}
        }

        // Exclusive account-scoped lock from here until commit.
        let tx = self
            .store
            .begin_settlement(account_id, asset.asset_id)
            .await?;

        let locked_basis = tx.holding().map(|h| CostBasis {
            quantity: h.quantity,
            average_cost: h.average_cost,
        });
        let locked_cash = tx.account().cash_balance;

        let (new_cash, change) = match side {
            OrderSide::Sell => {
                let locked_held = locked_basis.map_or(Decimal::ZERO, |b| b.quantity);
                if locked_held < quantity {
                    tracing::warn!(
                        %account_id,
                        symbol = %asset.symbol,
                        %quantity,
                        %locked_held,
                        "Holding shrank between quote and settlement; rejecting sell."
                    );
                    return Err(OrderError::ConcurrentModification);
                }
                let change = match cost_basis::apply_sell(locked_basis.as_ref(), quantity)? {
                    Some(remaining) => HoldingChange::Upsert {
                        quantity: remaining.quantity,
                        average_cost: remaining.average_cost,
                    },
                    None => HoldingChange::Remove,
                };
                (locked_cash + gross, change)
            }
            OrderSide::Buy => {
                if locked_cash < gross {
                    tracing::warn!(
                        %account_id,
                        symbol = %asset.symbol,
                        %gross,
                        %locked_cash,
                        "Cash balance shrank between quote and settlement; rejecting buy."
                    );
                    return Err(OrderError::ConcurrentModification);
                }
                let basis = cost_basis::apply_buy(locked_basis.as_ref(), price, quantity);
                (
                    locked_cash - gross,
                    HoldingChange::Upsert {
                        quantity: basis.quantity,
                        average_cost: basis.average_cost,
                    },
                )
            }
        };

        let trade = tx
            .commit(
                new_cash,
                change,
                TradeDraft {
                    side,
                    quantity,
                    price,
                },
            )
            .await?;

        tracing::info!(
            %account_id,
            symbol = %asset.symbol,
            side = %trade.side,
            quantity = %trade.quantity,
            price = %trade.price_at_execution,
            "Order settled."
        );
        Ok(trade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use core_types::{Asset, AssetType};
    use ledger::MemoryLedger;
    use oracle_client::error::OracleError;
    use oracle_client::StaticOracle;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn request(symbol: &str, order_type: &str, quantity: &str) -> OrderRequest {
        OrderRequest {
            symbol: symbol.to_string(),
            order_type: order_type.to_string(),
            quantity: quantity.to_string(),
        }
    }

    async fn setup(starting_cash: Decimal) -> (Arc<MemoryLedger>, Uuid, Asset) {
        let ledger = Arc::new(MemoryLedger::new());
        let account = ledger.create_account(starting_cash).await.unwrap();
        let asset = ledger
            .insert_asset("AAPL", "Apple Inc.", AssetType::Stock)
            .await
            .unwrap();
        (ledger, account.account_id, asset)
    }

    fn engine_with(ledger: &Arc<MemoryLedger>, oracle: StaticOracle) -> ExecutionEngine {
        ExecutionEngine::new(Arc::clone(ledger) as Arc<dyn LedgerStore>, Arc::new(oracle))
    }

    #[tokio::test]
    async fn test_buy_then_buy_then_sell_scenario() {
        let (ledger, account_id, asset) = setup(dec!(10000.00)).await;

        let engine = engine_with(&ledger, StaticOracle::new().with_price("AAPL", dec!(100.00)));
        engine
            .place_order(account_id, &request("AAPL", "buy", "10"))
            .await
            .unwrap();
        assert_eq!(
            ledger.account(account_id).await.unwrap().cash_balance,
            dec!(9000.00)
        );
        let holding = ledger
            .holding(account_id, asset.asset_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(holding.quantity, dec!(10));
        assert_eq!(holding.average_cost, dec!(100.00));

        let engine = engine_with(&ledger, StaticOracle::new().with_price("AAPL", dec!(110.00)));
        engine
            .place_order(account_id, &request("AAPL", "buy", "5"))
            .await
            .unwrap();
        let holding = ledger
            .holding(account_id, asset.asset_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(holding.quantity, dec!(15));
        assert_eq!(holding.average_cost, dec!(103.33333333));

        let engine = engine_with(&ledger, StaticOracle::new().with_price("AAPL", dec!(120.00)));
        let trade = engine
            .place_order(account_id, &request("AAPL", "sell", "15"))
            .await
            .unwrap();
        assert_eq!(trade.side, OrderSide::Sell);
        assert_eq!(trade.price_at_execution, dec!(120.00));

        // 10000 - 10*100 - 5*110 + 15*120 = 10250, exactly.
        assert_eq!(
            ledger.account(account_id).await.unwrap().cash_balance,
            dec!(10250.00)
        );
        assert!(ledger
            .holding(account_id, asset.asset_id)
            .await
            .unwrap()
            .is_none());
        assert_eq!(ledger.trades(account_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_cash_reconciles_exactly_over_many_orders() {
        let (ledger, account_id, _asset) = setup(dec!(10000.00)).await;
        let price = dec!(3.33333333);
        let engine = engine_with(&ledger, StaticOracle::new().with_price("AAPL", price));

        let mut expected = dec!(10000.00);
        for _ in 0..50 {
            engine
                .place_order(account_id, &request("AAPL", "buy", "0.00000007"))
                .await
                .unwrap();
            expected -= price * dec!(0.00000007);
        }
        for _ in 0..10 {
            engine
                .place_order(account_id, &request("AAPL", "sell", "0.00000021"))
                .await
                .unwrap();
            expected += price * dec!(0.00000021);
        }

        assert_eq!(
            ledger.account(account_id).await.unwrap().cash_balance,
            expected
        );
    }

    #[tokio::test]
    async fn test_invalid_quantity_is_rejected_without_side_effects() {
        let (ledger, account_id, _asset) = setup(dec!(10000.00)).await;
        let engine = engine_with(&ledger, StaticOracle::new().with_price("AAPL", dec!(100)));

        for bad in ["0", "-5", "abc", "", "1.0e3"] {
            let err = engine
                .place_order(account_id, &request("AAPL", "buy", bad))
                .await
                .unwrap_err();
            assert!(matches!(err, OrderError::InvalidQuantity(_)), "input: {bad}");
        }
        assert!(ledger.trades(account_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_order_type_is_rejected() {
        let (ledger, account_id, _asset) = setup(dec!(10000.00)).await;
        let engine = engine_with(&ledger, StaticOracle::new().with_price("AAPL", dec!(100)));

        let err = engine
            .place_order(account_id, &request("AAPL", "market_buy", "1"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidOrderType(_)));
    }

    #[tokio::test]
    async fn test_unknown_asset_is_rejected() {
        let (ledger, account_id, _asset) = setup(dec!(10000.00)).await;
        let engine = engine_with(&ledger, StaticOracle::new().with_price("TSLA", dec!(100)));

        let err = engine
            .place_order(account_id, &request("TSLA", "buy", "1"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::AssetNotFound(_)));
    }

    #[tokio::test]
    async fn test_unavailable_price_fails_order_without_side_effects() {
        let (ledger, account_id, _asset) = setup(dec!(10000.00)).await;
        // Oracle knows nothing about AAPL.
        let engine = engine_with(&ledger, StaticOracle::new());

        let err = engine
            .place_order(account_id, &request("AAPL", "buy", "1"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::PriceUnavailable(_)));
        assert_eq!(
            ledger.account(account_id).await.unwrap().cash_balance,
            dec!(10000.00)
        );
        assert!(ledger.trades(account_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overspending_fails_and_mutates_nothing() {
        let (ledger, account_id, asset) = setup(dec!(500.00)).await;
        let engine = engine_with(&ledger, StaticOracle::new().with_price("AAPL", dec!(100.00)));

        let err = engine
            .place_order(account_id, &request("AAPL", "buy", "6"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::InsufficientFunds { required, available }
                if required == dec!(600.00) && available == dec!(500.00)
        ));

        assert_eq!(
            ledger.account(account_id).await.unwrap().cash_balance,
            dec!(500.00)
        );
        assert!(ledger
            .holding(account_id, asset.asset_id)
            .await
            .unwrap()
            .is_none());
        assert!(ledger.trades(account_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overselling_fails_and_mutates_nothing() {
        let (ledger, account_id, _asset) = setup(dec!(10000.00)).await;
        let engine = engine_with(&ledger, StaticOracle::new().with_price("AAPL", dec!(100.00)));

        engine
            .place_order(account_id, &request("AAPL", "buy", "10"))
            .await
            .unwrap();

        let err = engine
            .place_order(account_id, &request("AAPL", "sell", "11"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::InsufficientHoldings { requested, held }
                if requested == dec!(11) && held == dec!(10)
        ));

        assert_eq!(
            ledger.account(account_id).await.unwrap().cash_balance,
            dec!(9000.00)
        );
        assert_eq!(ledger.trades(account_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_sell_keeps_average_cost() {
        let (ledger, account_id, asset) = setup(dec!(10000.00)).await;
        let engine = engine_with(&ledger, StaticOracle::new().with_price("AAPL", dec!(100.00)));

        engine
            .place_order(account_id, &request("AAPL", "buy", "10"))
            .await
            .unwrap();
        let engine = engine_with(&ledger, StaticOracle::new().with_price("AAPL", dec!(150.00)));
        engine
            .place_order(account_id, &request("AAPL", "sell", "4"))
            .await
            .unwrap();

        let holding = ledger
            .holding(account_id, asset.asset_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(holding.quantity, dec!(6));
        assert_eq!(holding.average_cost, dec!(100.00));
    }

    /// An oracle that drains the account's holding through a competing
    /// settlement the first time it is asked for a quote. This lands the
    /// mutation exactly between the engine's advisory snapshot and its
    /// locked re-validation.
    struct RacingOracle {
        ledger: Arc<MemoryLedger>,
        account_id: Uuid,
        asset_id: Uuid,
        fired: AtomicBool,
    }

    #[async_trait]
    impl PriceOracle for RacingOracle {
        async fn quote(&self, _symbol: &str, _at: AssetType) -> Result<Decimal, OracleError> {
            if !self.fired.swap(true, Ordering::SeqCst) {
                let tx = self
                    .ledger
                    .begin_settlement(self.account_id, self.asset_id)
                    .await
                    .unwrap();
                let cash = tx.account().cash_balance;
                let qty = tx.holding().unwrap().quantity;
                tx.commit(
                    cash + qty * dec!(100.00),
                    HoldingChange::Remove,
                    TradeDraft {
                        side: OrderSide::Sell,
                        quantity: qty,
                        price: dec!(100.00),
                    },
                )
                .await
                .unwrap();
            }
            Ok(dec!(100.00))
        }
    }

    #[tokio::test]
    async fn test_adverse_change_between_quote_and_lock_is_rejected() {
        let (ledger, account_id, asset) = setup(dec!(10000.00)).await;
        let engine = engine_with(&ledger, StaticOracle::new().with_price("AAPL", dec!(100.00)));
        engine
            .place_order(account_id, &request("AAPL", "buy", "10"))
            .await
            .unwrap();

        let racing = Arc::new(RacingOracle {
            ledger: Arc::clone(&ledger),
            account_id,
            asset_id: asset.asset_id,
            fired: AtomicBool::new(false),
        });
        let engine = ExecutionEngine::new(
            Arc::clone(&ledger) as Arc<dyn LedgerStore>,
            racing as Arc<dyn PriceOracle>,
        );

        let err = engine
            .place_order(account_id, &request("AAPL", "sell", "10"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::ConcurrentModification));

        // The competing sell settled; the engine's order left no trace.
        assert!(ledger
            .holding(account_id, asset.asset_id)
            .await
            .unwrap()
            .is_none());
        assert_eq!(ledger.trades(account_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_racing_sells_never_go_negative() {
        let (ledger, account_id, asset) = setup(dec!(10000.00)).await;
        let engine = Arc::new(engine_with(
            &ledger,
            StaticOracle::new().with_price("AAPL", dec!(100.00)),
        ));
        engine
            .place_order(account_id, &request("AAPL", "buy", "10"))
            .await
            .unwrap();

        let a = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.place_order(account_id, &request("AAPL", "sell", "10")).await }
        });
        let b = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.place_order(account_id, &request("AAPL", "sell", "10")).await }
        });

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one racing sell may settle");
        for result in [a, b] {
            if let Err(err) = result {
                assert!(matches!(
                    err,
                    OrderError::ConcurrentModification
                        | OrderError::InsufficientHoldings { .. }
                ));
            }
        }

        assert!(ledger
            .holding(account_id, asset.asset_id)
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            ledger.account(account_id).await.unwrap().cash_balance,
            dec!(10000.00)
        );
    }
}
