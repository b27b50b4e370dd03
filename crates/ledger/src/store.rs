use crate::LedgerError;
use async_trait::async_trait;
use core_types::{Account, Asset, AssetType, Holding, OrderSide, Trade};
use rust_decimal::Decimal;
use uuid::Uuid;

/// The new holding state to persist when a settlement commits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HoldingChange {
    /// Create or overwrite the holding row with the given position.
    Upsert {
        quantity: Decimal,
        average_cost: Decimal,
    },
    /// Delete the holding row. Issued by the sell that brings the quantity
    /// to exactly zero.
    Remove,
}

/// The trade record to append when a settlement commits. The store assigns
/// the trade id and execution timestamp.
#[derive(Debug, Clone, Copy)]
pub struct TradeDraft {
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
}

/// The abstract contract between the ledger and the rest of the system.
///
/// All lookups are explicit and keyed; callers never traverse object graphs.
/// The only write path for cash, holdings, and trades is `begin_settlement`,
/// which hands out the exclusive transaction boundary object.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Creates a new account with the given opening cash balance.
    async fn create_account(&self, starting_cash: Decimal) -> Result<Account, LedgerError>;

    /// Fetches an account by id.
    async fn account(&self, account_id: Uuid) -> Result<Account, LedgerError>;

    /// Registers a new tradable asset. Symbols are stored uppercase.
    async fn insert_asset(
        &self,
        symbol: &str,
        name: &str,
        asset_type: AssetType,
    ) -> Result<Asset, LedgerError>;

    /// Lists all known assets, ordered by symbol.
    async fn assets(&self) -> Result<Vec<Asset>, LedgerError>;

    /// Looks up an asset by symbol. The lookup is case-insensitive.
    async fn asset_by_symbol(&self, symbol: &str) -> Result<Option<Asset>, LedgerError>;

    /// Looks up an asset by id.
    async fn asset_by_id(&self, asset_id: Uuid) -> Result<Option<Asset>, LedgerError>;

    /// Fetches one holding of an account, if it exists.
    async fn holding(
        &self,
        account_id: Uuid,
        asset_id: Uuid,
    ) -> Result<Option<Holding>, LedgerError>;

    /// Fetches a snapshot of all holdings of an account.
    async fn holdings(&self, account_id: Uuid) -> Result<Vec<Holding>, LedgerError>;

    /// Fetches the trade history of an account, newest first.
    async fn trades(&self, account_id: Uuid) -> Result<Vec<Trade>, LedgerError>;

    /// Opens the settlement transaction for one order.
    ///
    /// This acquires the exclusive account-scoped lock and returns the fresh
    /// account and holding state read under that lock. The lock is held until
    /// the returned object is committed or dropped.
    async fn begin_settlement(
        &self,
        account_id: Uuid,
        asset_id: Uuid,
    ) -> Result<Box<dyn SettlementTx>, LedgerError>;
}

/// The explicit transaction boundary for order settlement.
///
/// Exposes the locked pre-state so the engine can re-validate its
/// preconditions against it, then applies cash, holding, and trade changes
/// as one atomic unit. Dropping the object without calling `commit` rolls
/// the transaction back.
#[async_trait]
pub trait SettlementTx: Send {
    /// The account row as read under the lock.
    fn account(&self) -> &Account;

    /// The holding row for the settled asset as read under the lock.
    fn holding(&self) -> Option<&Holding>;

    /// Atomically writes the new cash balance, the holding change, and the
    /// trade record, then releases the lock. Returns the appended trade.
    async fn commit(
        self: Box<Self>,
        new_cash: Decimal,
        change: HoldingChange,
        draft: TradeDraft,
    ) -> Result<Trade, LedgerError>;
}
