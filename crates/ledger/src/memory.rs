use crate::error::LedgerError;
use crate::store::{HoldingChange, LedgerStore, SettlementTx, TradeDraft};
use async_trait::async_trait;
use chrono::Utc;
use core_types::{Account, Asset, AssetType, Holding, Trade};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<Uuid, Account>,
    assets: HashMap<Uuid, Asset>,
    symbols: HashMap<String, Uuid>,
    holdings: HashMap<(Uuid, Uuid), Holding>,
    trades: Vec<Trade>,
}

/// An in-memory `LedgerStore` with the same settlement semantics as the
/// PostgreSQL backend: one writer per account at a time, all-or-nothing
/// commits, append-only trades. Used by the test suite and for offline runs.
#[derive(Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    account_locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        // The state mutex is only held for plain map operations, never
        // across an await point, so poisoning implies a bug elsewhere.
        self.state.lock().expect("ledger state mutex poisoned")
    }

    fn account_lock(&self, account_id: Uuid) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .account_locks
            .lock()
            .expect("account lock table mutex poisoned");
        locks
            .entry(account_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn create_account(&self, starting_cash: Decimal) -> Result<Account, LedgerError> {
        let account = Account {
            account_id: Uuid::new_v4(),
            cash_balance: starting_cash,
        };
        self.state()
            .accounts
            .insert(account.account_id, account.clone());
        Ok(account)
    }

    async fn account(&self, account_id: Uuid) -> Result<Account, LedgerError> {
        self.state()
            .accounts
            .get(&account_id)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(account_id))
    }

    async fn insert_asset(
        &self,
        symbol: &str,
        name: &str,
        asset_type: AssetType,
    ) -> Result<Asset, LedgerError> {
        let symbol = symbol.to_uppercase();
        let mut state = self.state();
        if state.symbols.contains_key(&symbol) {
            return Err(LedgerError::DuplicateAsset(symbol));
        }
        let asset = Asset {
            asset_id: Uuid::new_v4(),
            symbol: symbol.clone(),
            name: name.to_string(),
            asset_type,
        };
        state.symbols.insert(symbol, asset.asset_id);
        state.assets.insert(asset.asset_id, asset.clone());
        Ok(asset)
    }

    async fn assets(&self) -> Result<Vec<Asset>, LedgerError> {
        let mut assets: Vec<Asset> = self.state().assets.values().cloned().collect();
        assets.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(assets)
    }

    async fn asset_by_symbol(&self, symbol: &str) -> Result<Option<Asset>, LedgerError> {
        let state = self.state();
        Ok(state
            .symbols
            .get(&symbol.to_uppercase())
            .and_then(|id| state.assets.get(id))
            .cloned())
    }

    async fn asset_by_id(&self, asset_id: Uuid) -> Result<Option<Asset>, LedgerError> {
        Ok(self.state().assets.get(&asset_id).cloned())
    }

    async fn holding(
        &self,
        account_id: Uuid,
        asset_id: Uuid,
    ) -> Result<Option<Holding>, LedgerError> {
        Ok(self.state().holdings.get(&(account_id, asset_id)).cloned())
    }

    async fn holdings(&self, account_id: Uuid) -> Result<Vec<Holding>, LedgerError> {
        Ok(self
            .state()
            .holdings
            .values()
            .filter(|h| h.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn trades(&self, account_id: Uuid) -> Result<Vec<Trade>, LedgerError> {
        // Trades are appended chronologically; history reads newest first.
        Ok(self
            .state()
            .trades
            .iter()
            .rev()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn begin_settlement(
        &self,
        account_id: Uuid,
        asset_id: Uuid,
    ) -> Result<Box<dyn SettlementTx>, LedgerError> {
        let lock = self.account_lock(account_id);
        let guard = lock.lock_owned().await;

        let (account, holding) = {
            let state = self.state();
            let account = state
                .accounts
                .get(&account_id)
                .cloned()
                .ok_or(LedgerError::AccountNotFound(account_id))?;
            let holding = state.holdings.get(&(account_id, asset_id)).cloned();
            (account, holding)
        };

        Ok(Box::new(MemorySettlement {
            state: Arc::clone(&self.state),
            _guard: guard,
            account_id,
            asset_id,
            account,
            holding,
        }))
    }
}

/// One in-flight settlement against the in-memory ledger. The owned guard
/// keeps the account lock held until commit or drop; nothing is written to
/// shared state before `commit`.
struct MemorySettlement {
    state: Arc<Mutex<LedgerState>>,
    _guard: OwnedMutexGuard<()>,
    account_id: Uuid,
    asset_id: Uuid,
    account: Account,
    holding: Option<Holding>,
}

#[async_trait]
impl SettlementTx for MemorySettlement {
    fn account(&self) -> &Account {
        &self.account
    }

    fn holding(&self) -> Option<&Holding> {
        self.holding.as_ref()
    }

    async fn commit(
        self: Box<Self>,
        new_cash: Decimal,
        change: HoldingChange,
        draft: TradeDraft,
    ) -> Result<Trade, LedgerError> {
        let mut state = self.state.lock().expect("ledger state mutex poisoned");

        let account = state
            .accounts
            .get_mut(&self.account_id)
            .ok_or(LedgerError::AccountNotFound(self.account_id))?;
        account.cash_balance = new_cash;

        match change {
            HoldingChange::Upsert {
                quantity,
                average_cost,
            } => {
                state.holdings.insert(
                    (self.account_id, self.asset_id),
                    Holding {
                        account_id: self.account_id,
                        asset_id: self.asset_id,
                        quantity,
                        average_cost,
                    },
                );
            }
            HoldingChange::Remove => {
                state.holdings.remove(&(self.account_id, self.asset_id));
            }
        }

        let trade = Trade {
            trade_id: Uuid::new_v4(),
            account_id: self.account_id,
            asset_id: self.asset_id,
            side: draft.side,
            quantity: draft.quantity,
            price_at_execution: draft.price,
            executed_at: Utc::now(),
        };
        state.trades.push(trade.clone());
        Ok(trade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::OrderSide;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    async fn seeded_ledger() -> (Arc<MemoryLedger>, Account, Asset) {
        let ledger = Arc::new(MemoryLedger::new());
        let account = ledger.create_account(dec!(10000)).await.unwrap();
        let asset = ledger
            .insert_asset("aapl", "Apple Inc.", AssetType::Stock)
            .await
            .unwrap();
        (ledger, account, asset)
    }

    #[tokio::test]
    async fn test_commit_applies_cash_holding_and_trade_together() {
        let (ledger, account, asset) = seeded_ledger().await;

        let tx = ledger
            .begin_settlement(account.account_id, asset.asset_id)
            .await
            .unwrap();
        assert_eq!(tx.account().cash_balance, dec!(10000));
        assert!(tx.holding().is_none());

        let trade = tx
            .commit(
                dec!(9000),
                HoldingChange::Upsert {
                    quantity: dec!(10),
                    average_cost: dec!(100),
                },
                TradeDraft {
                    side: OrderSide::Buy,
                    quantity: dec!(10),
                    price: dec!(100),
                },
            )
            .await
            .unwrap();

        assert_eq!(trade.side, OrderSide::Buy);
        let account = ledger.account(account.account_id).await.unwrap();
        assert_eq!(account.cash_balance, dec!(9000));
        let holding = ledger
            .holding(trade.account_id, trade.asset_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(holding.quantity, dec!(10));
        assert_eq!(holding.average_cost, dec!(100));
        assert_eq!(ledger.trades(trade.account_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dropping_settlement_rolls_back() {
        let (ledger, account, asset) = seeded_ledger().await;

        let tx = ledger
            .begin_settlement(account.account_id, asset.asset_id)
            .await
            .unwrap();
        drop(tx);

        let account = ledger.account(account.account_id).await.unwrap();
        assert_eq!(account.cash_balance, dec!(10000));
        assert!(ledger.trades(account.account_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_deletes_the_holding_row() {
        let (ledger, account, asset) = seeded_ledger().await;

        let tx = ledger
            .begin_settlement(account.account_id, asset.asset_id)
            .await
            .unwrap();
        tx.commit(
            dec!(9000),
            HoldingChange::Upsert {
                quantity: dec!(10),
                average_cost: dec!(100),
            },
            TradeDraft {
                side: OrderSide::Buy,
                quantity: dec!(10),
                price: dec!(100),
            },
        )
        .await
        .unwrap();

        let tx = ledger
            .begin_settlement(account.account_id, asset.asset_id)
            .await
            .unwrap();
        assert_eq!(tx.holding().unwrap().quantity, dec!(10));
        tx.commit(
            dec!(10200),
            HoldingChange::Remove,
            TradeDraft {
                side: OrderSide::Sell,
                quantity: dec!(10),
                price: dec!(120),
            },
        )
        .await
        .unwrap();

        assert!(ledger
            .holding(account.account_id, asset.asset_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_settlements_for_one_account_are_serialized() {
        let (ledger, account, asset) = seeded_ledger().await;

        let first = ledger
            .begin_settlement(account.account_id, asset.asset_id)
            .await
            .unwrap();

        let ledger_clone = Arc::clone(&ledger);
        let account_id = account.account_id;
        let asset_id = asset.asset_id;
        let second = tokio::spawn(async move {
            ledger_clone
                .begin_settlement(account_id, asset_id)
                .await
                .unwrap()
        });

        // The second settlement must block behind the account lock.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_finished());

        drop(first);
        let tx = second.await.unwrap();
        assert_eq!(tx.account().cash_balance, dec!(10000));
    }
}
