use crate::error::LedgerError;
use crate::store::{HoldingChange, LedgerStore, SettlementTx, TradeDraft};
use async_trait::async_trait;
use chrono::Utc;
use core_types::{Account, Asset, AssetType, Holding, Trade};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgRow, Postgres};
use sqlx::{Row, Transaction};
use uuid::Uuid;

/// The PostgreSQL-backed ledger. It encapsulates all SQL queries and data
/// access logic behind the `LedgerStore` contract.
#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    /// Creates a new `PgLedger` with a shared database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn asset_from_row(row: &PgRow) -> Result<Asset, LedgerError> {
    let type_str: String = row.get("asset_type");
    let asset_type: AssetType = type_str
        .parse()
        .map_err(|_| LedgerError::CorruptRow(format!("unknown asset type '{type_str}'")))?;
    Ok(Asset {
        asset_id: row.get("asset_id"),
        symbol: row.get("symbol"),
        name: row.get("name"),
        asset_type,
    })
}

fn trade_from_row(row: &PgRow) -> Result<Trade, LedgerError> {
    let side_str: String = row.get("side");
    let side = side_str
        .parse()
        .map_err(|_| LedgerError::CorruptRow(format!("unknown trade side '{side_str}'")))?;
    Ok(Trade {
        trade_id: row.get("trade_id"),
        account_id: row.get("account_id"),
        asset_id: row.get("asset_id"),
        side,
        quantity: row.get("quantity"),
        price_at_execution: row.get("price_at_execution"),
        executed_at: row.get("executed_at"),
    })
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn create_account(&self, starting_cash: Decimal) -> Result<Account, LedgerError> {
        let account = Account {
            account_id: Uuid::new_v4(),
            cash_balance: starting_cash,
        };
        sqlx::query("INSERT INTO accounts (account_id, cash_balance) VALUES ($1, $2)")
            .bind(account.account_id)
            .bind(account.cash_balance)
            .execute(&self.pool)
            .await?;
        Ok(account)
    }

    async fn account(&self, account_id: Uuid) -> Result<Account, LedgerError> {
        sqlx::query_as::<_, Account>(
            "SELECT account_id, cash_balance FROM accounts WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(LedgerError::AccountNotFound(account_id))
    }

    async fn insert_asset(
        &self,
        symbol: &str,
        name: &str,
        asset_type: AssetType,
    ) -> Result<Asset, LedgerError> {
        let asset = Asset {
            asset_id: Uuid::new_v4(),
            symbol: symbol.to_uppercase(),
            name: name.to_string(),
            asset_type,
        };
        sqlx::query("INSERT INTO assets (asset_id, symbol, name, asset_type) VALUES ($1, $2, $3, $4)")
            .bind(asset.asset_id)
            .bind(&asset.symbol)
            .bind(&asset.name)
            .bind(asset.asset_type.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| match e.as_database_error() {
                Some(db) if db.is_unique_violation() => LedgerError::DuplicateAsset(asset.symbol.clone()),
                _ => LedgerError::Database(e),
            })?;
        Ok(asset)
    }

    async fn assets(&self) -> Result<Vec<Asset>, LedgerError> {
        let rows =
            sqlx::query("SELECT asset_id, symbol, name, asset_type FROM assets ORDER BY symbol ASC")
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(asset_from_row).collect()
    }

    async fn asset_by_symbol(&self, symbol: &str) -> Result<Option<Asset>, LedgerError> {
        let row = sqlx::query("SELECT asset_id, symbol, name, asset_type FROM assets WHERE symbol = $1")
            .bind(symbol.to_uppercase())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(asset_from_row).transpose()
    }

    async fn asset_by_id(&self, asset_id: Uuid) -> Result<Option<Asset>, LedgerError> {
        let row = sqlx::query("SELECT asset_id, symbol, name, asset_type FROM assets WHERE asset_id = $1")
            .bind(asset_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(asset_from_row).transpose()
    }

    async fn holding(
        &self,
        account_id: Uuid,
        asset_id: Uuid,
    ) -> Result<Option<Holding>, LedgerError> {
        let holding = sqlx::query_as::<_, Holding>(
            r#"
            SELECT account_id, asset_id, quantity, average_cost
            FROM holdings
            WHERE account_id = $1 AND asset_id = $2
            "#,
        )
        .bind(account_id)
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(holding)
    }

    async fn holdings(&self, account_id: Uuid) -> Result<Vec<Holding>, LedgerError> {
        let holdings = sqlx::query_as::<_, Holding>(
            "SELECT account_id, asset_id, quantity, average_cost FROM holdings WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(holdings)
    }

    async fn trades(&self, account_id: Uuid) -> Result<Vec<Trade>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT trade_id, account_id, asset_id, side, quantity, price_at_execution, executed_at
            FROM trades
            WHERE account_id = $1
            ORDER BY executed_at DESC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(trade_from_row).collect()
    }

    async fn begin_settlement(
        &self,
        account_id: Uuid,
        asset_id: Uuid,
    ) -> Result<Box<dyn SettlementTx>, LedgerError> {
        let mut tx = self.pool.begin().await?;

        // Row-level lock on the account serializes all settlements for it.
        // The lock is released by COMMIT or by the implicit rollback when
        // the transaction is dropped.
        let account = sqlx::query_as::<_, Account>(
            "SELECT account_id, cash_balance FROM accounts WHERE account_id = $1 FOR UPDATE",
        )
        .bind(account_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(LedgerError::AccountNotFound(account_id))?;

        let holding = sqlx::query_as::<_, Holding>(
            r#"
            SELECT account_id, asset_id, quantity, average_cost
            FROM holdings
            WHERE account_id = $1 AND asset_id = $2
            FOR UPDATE
            "#,
        )
        .bind(account_id)
        .bind(asset_id)
        .fetch_optional(&mut *tx)
        .await?;

        tracing::debug!(%account_id, %asset_id, "Settlement transaction opened.");

        Ok(Box::new(PgSettlement {
            tx,
            account_id,
            asset_id,
            account,
            holding,
        }))
    }
}

/// One in-flight settlement against PostgreSQL. Holds the open transaction
/// and the rows read under `FOR UPDATE`.
struct PgSettlement {
    tx: Transaction<'static, Postgres>,
    account_id: Uuid,
    asset_id: Uuid,
    account: Account,
    holding: Option<Holding>,
}

#[async_trait]
impl SettlementTx for PgSettlement {
    fn account(&self) -> &Account {
        &self.account
    }

    fn holding(&self) -> Option<&Holding> {
        self.holding.as_ref()
    }

    async fn commit(
        mut self: Box<Self>,
        new_cash: Decimal,
        change: HoldingChange,
        draft: TradeDraft,
    ) -> Result<Trade, LedgerError> {
        sqlx::query("UPDATE accounts SET cash_balance = $1 WHERE account_id = $2")
            .bind(new_cash)
            .bind(self.account_id)
            .execute(&mut *self.tx)
            .await?;

        match change {
            HoldingChange::Upsert {
                quantity,
                average_cost,
            } => {
                sqlx::query(
                    r#"
                    INSERT INTO holdings (account_id, asset_id, quantity, average_cost)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (account_id, asset_id)
                    DO UPDATE SET quantity = EXCLUDED.quantity, average_cost = EXCLUDED.average_cost
                    "#,
                )
                .bind(self.account_id)
                .bind(self.asset_id)
                .bind(quantity)
                .bind(average_cost)
                .execute(&mut *self.tx)
                .await?;
            }
            HoldingChange::Remove => {
                sqlx::query("DELETE FROM holdings WHERE account_id = $1 AND asset_id = $2")
                    .bind(self.account_id)
                    .bind(self.asset_id)
                    .execute(&mut *self.tx)
                    .await?;
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
        sqlx::query(
            r#"
            INSERT INTO trades (trade_id, account_id, asset_id, side, quantity, price_at_execution, executed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(trade.trade_id)
        .bind(trade.account_id)
        .bind(trade.asset_id)
        .bind(trade.side.as_str())
        .bind(trade.quantity)
        .bind(trade.price_at_execution)
        .bind(trade.executed_at)
        .execute(&mut *self.tx)
        .await?;

        self.tx.commit().await?;
        Ok(trade)
    }
}
